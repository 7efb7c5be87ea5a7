#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use eval_pulse::log_buffer::LogEntry;
use eval_pulse::types::{Project, ProjectDetails, Severity, Stage, Submission, SubmissionRecord};

/// Creates a `Submission` with minimal defaults.
///
/// Team name is `"Team {id}"`, file ref `"{id}.pptx"`, everything else empty.
pub fn make_submission(id: &str, stage: Stage) -> Submission {
    Submission {
        id: id.to_string(),
        team_name: format!("Team {}", id),
        file_ref: format!("{}.pptx", id),
        stage,
        ..Default::default()
    }
}

/// A completed submission carrying `score`.
pub fn make_scored(id: &str, score: f64) -> Submission {
    Submission {
        score: Some(score),
        ..make_submission(id, Stage::Completed)
    }
}

/// A completed submission carrying evaluator `flags`.
pub fn make_flagged(id: &str, flags: &[&str]) -> Submission {
    Submission {
        flags: flags.iter().map(|f| f.to_string()).collect(),
        ..make_submission(id, Stage::Completed)
    }
}

/// Wire record as the backend would return it, with `status` as the raw label.
pub fn make_record(id: &str, status: &str) -> SubmissionRecord {
    SubmissionRecord {
        submission_id: id.to_string(),
        processing_status: status.to_string(),
        team_name: Some(format!("Team {}", id)),
        drive_file_name: Some(format!("{}.pptx", id)),
        drive_file_url: None,
        file_size_bytes: None,
        slide_count: None,
        error_message: None,
        score: None,
        flags: Vec::new(),
    }
}

/// Project payload whose records all share the same status label.
pub fn make_details(project_id: &str, statuses: &[(&str, &str)]) -> ProjectDetails {
    ProjectDetails {
        project: make_project(project_id),
        submissions: statuses
            .iter()
            .map(|(id, status)| make_record(id, status))
            .collect(),
    }
}

pub fn make_project(project_id: &str) -> Project {
    Project {
        project_id: project_id.to_string(),
        project_name: format!("Project {}", project_id),
        ..Default::default()
    }
}

/// Fixed instant `2026-02-10T12:00:00Z` plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn make_entry(secs: i64, severity: Severity, message: &str) -> LogEntry {
    LogEntry::new(at(secs), severity, message)
}

/// Temp dir with `eval-pulse.toml` containing `contents`.
pub fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("eval-pulse.toml");
    fs::write(&path, contents).expect("write config");
    (dir, path)
}
