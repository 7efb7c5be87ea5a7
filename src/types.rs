use std::fmt;

use serde::{Deserialize, Serialize};

// --- Enums ---

/// Processing phase of a single submission.
///
/// Declaration order is the forward order of the pipeline; `Failed` sits
/// outside it and is reachable from any non-terminal stage.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Pending,
    Ingesting,
    Visualizing,
    Chunking,
    Evaluating,
    Completed,
    Failed,
}

impl Stage {
    /// The natural pipeline, in order.
    pub const PIPELINE: [Stage; 6] = [
        Stage::Pending,
        Stage::Ingesting,
        Stage::Visualizing,
        Stage::Chunking,
        Stage::Evaluating,
        Stage::Completed,
    ];

    /// Position in the forward pipeline. `Failed` has no position.
    pub fn rank(&self) -> Option<usize> {
        Stage::PIPELINE.iter().position(|s| s == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Started but not finished: everything between `Pending` and the terminal stages.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Stage::Ingesting | Stage::Visualizing | Stage::Chunking | Stage::Evaluating
        )
    }

    /// The next stage on the natural pipeline, if any.
    pub fn successor(&self) -> Option<Stage> {
        let rank = self.rank()?;
        Stage::PIPELINE.get(rank + 1).copied()
    }

    /// Validates a single natural edge.
    ///
    /// Rules:
    /// - Forward progression one step at a time: Pending -> Ingesting -> ... -> Completed
    /// - Any non-terminal stage can move to Failed
    /// - Completed and Failed have no natural exits
    pub fn is_valid_transition(&self, to: &Stage) -> bool {
        if *to == Stage::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(*to)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Pending => "Pending",
            Stage::Ingesting => "Ingesting",
            Stage::Visualizing => "Visualizing",
            Stage::Chunking => "Chunking",
            Stage::Evaluating => "Evaluating",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse a backend status label.
///
/// `processing` is the coarse label the ingestion worker writes while a file
/// is being handled; it maps to the first in-flight stage.
pub fn parse_stage(s: &str) -> Result<Stage, String> {
    match s.trim().to_lowercase().as_str() {
        "pending" | "queued" => Ok(Stage::Pending),
        "processing" | "ingesting" => Ok(Stage::Ingesting),
        "visualizing" => Ok(Stage::Visualizing),
        "chunking" => Ok(Stage::Chunking),
        "evaluating" => Ok(Stage::Evaluating),
        "completed" => Ok(Stage::Completed),
        "failed" => Ok(Stage::Failed),
        _ => Err(format!(
            "Invalid stage '{}': expected pending, processing, ingesting, visualizing, chunking, evaluating, completed, or failed",
            s
        )),
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Flag,
    Error,
}

// --- Domain structs ---

/// One unit of work in a batch, as tracked locally.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Submission {
    pub id: String,
    pub team_name: String,
    pub file_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub stage: Stage,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub slide_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Evaluation score, present once the evaluator has produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Evaluator warnings raised against this submission.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl Submission {
    /// Build the local record from a wire record and an already-validated stage.
    pub fn from_record(record: &SubmissionRecord, stage: Stage) -> Self {
        Submission {
            id: record.submission_id.clone(),
            team_name: record.team_name.clone().unwrap_or_default(),
            file_ref: record.drive_file_name.clone().unwrap_or_default(),
            file_url: record.drive_file_url.clone(),
            stage,
            size_bytes: record.file_size_bytes.unwrap_or(0),
            slide_count: record.slide_count.unwrap_or(0),
            failure_reason: record.error_message.clone(),
            score: record.score,
            flags: record.flags.clone(),
        }
    }
}

// --- Wire structs ---

/// Submission row as returned by `GET projects/{id}/details`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub processing_status: String,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub drive_file_name: Option<String>,
    #[serde(default)]
    pub drive_file_url: Option<String>,
    #[serde(default)]
    pub file_size_bytes: Option<u64>,
    #[serde(default)]
    pub slide_count: Option<u32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, alias = "total_score")]
    pub score: Option<f64>,
    /// Warnings raised by the evaluator, e.g. suspected generated text.
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub drive_folder_url: Option<String>,
}

/// Authoritative batch snapshot for one project.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectDetails {
    pub project: Project,
    pub submissions: Vec<SubmissionRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Slide {
    pub slide_id: String,
    pub slide_number: u32,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub complexity_score: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SlidesResponse {
    #[serde(default)]
    pub slides: Vec<Slide>,
}

/// Reply of `POST projects/{id}/start-processing`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessingStarted {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub queued: u32,
}
