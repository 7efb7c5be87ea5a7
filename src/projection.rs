//! Read-only mapping from tracker state to renderable view models.
//!
//! Nothing here mutates state or touches the network.

use std::f64::consts::PI;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::{BatchSnapshot, BatchTotals};
use crate::ep_error::EpError;
use crate::log_buffer::{LogBuffer, LogEntry};
use crate::synchronizer::{DetailState, SyncState};
use crate::types::{Severity, Slide, Stage, Submission};

pub const RING_RADIUS: f64 = 120.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const NO_VALUE: &str = "—";

// --- Progress ring ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProgressRing {
    pub percent_label: String,
    /// Active stage, or "Finalizing..." once the run has left the working stages.
    pub stage_label: String,
    pub circumference: f64,
    pub dash_offset: f64,
}

pub fn progress_ring(percent: u8, stage: Stage) -> ProgressRing {
    let percent = percent.min(100);
    let circumference = 2.0 * PI * RING_RADIUS;
    let stage_label = match stage {
        Stage::Pending => Stage::Ingesting.label().to_string(),
        s if s.is_in_flight() => s.label().to_string(),
        _ => "Finalizing...".to_string(),
    };
    ProgressRing {
        percent_label: format!("{}%", percent),
        stage_label,
        circumference,
        dash_offset: circumference - f64::from(percent) / 100.0 * circumference,
    }
}

// --- Console ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConsoleLine {
    /// `[HH:MM:SS]`, 24-hour.
    pub time_label: String,
    pub message: String,
    pub class: &'static str,
}

pub fn severity_class(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "text-red-400",
        Severity::Success => "text-green-400",
        Severity::Flag => "text-yellow-400",
        Severity::Info => "text-gray-300",
    }
}

pub fn console_line(entry: &LogEntry) -> ConsoleLine {
    ConsoleLine {
        time_label: format!("[{}]", entry.timestamp.format("%H:%M:%S")),
        message: entry.message.clone(),
        class: severity_class(entry.severity),
    }
}

/// Oldest first, exactly as buffered.
pub fn console_lines(log: &LogBuffer) -> Vec<ConsoleLine> {
    log.entries().map(console_line).collect()
}

// --- Stat cards ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StatCard {
    pub label: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<&'static str>,
}

impl StatCard {
    fn new(label: &'static str, value: impl Into<String>) -> Self {
        Self {
            label,
            value: value.into(),
            sub: None,
            class: None,
        }
    }
}

/// Cards of the live processing view.
pub fn processing_stats(snapshot: &BatchSnapshot) -> Vec<StatCard> {
    let avg = snapshot
        .avg_score
        .map(|score| format!("{:.1}", score))
        .unwrap_or_else(|| NO_VALUE.to_string());
    vec![
        StatCard::new("PPTs Scanned", snapshot.scanned.to_string()),
        StatCard {
            class: Some("text-yellow-400"),
            ..StatCard::new("AI Flags", snapshot.flags.to_string())
        },
        StatCard::new("Avg. Score", avg),
    ]
}

/// Cards of the project detail view.
pub fn detail_stats(totals: &BatchTotals) -> Vec<StatCard> {
    vec![
        StatCard::new("Submissions", totals.submissions.to_string()),
        StatCard::new("Slides Extracted", totals.slides.to_string()),
        StatCard {
            sub: (totals.failed > 0).then(|| format!("{} failed", totals.failed)),
            ..StatCard::new("Completed", totals.completed.to_string())
        },
        StatCard::new("Total Size", format!("{} MB", format_mb(totals.total_bytes))),
    ]
}

pub fn format_mb(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / BYTES_PER_MB)
}

// --- Rows ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Badge {
    pub label: &'static str,
    pub class: &'static str,
    pub dot_class: &'static str,
}

pub fn badge(stage: Stage) -> Badge {
    match stage {
        Stage::Completed => Badge {
            label: stage.label(),
            class: "bg-green-500/10 text-green-400 border-green-500/20",
            dot_class: "bg-green-400",
        },
        Stage::Failed => Badge {
            label: stage.label(),
            class: "bg-red-500/10 text-red-400 border-red-500/20",
            dot_class: "bg-red-400",
        },
        Stage::Pending => Badge {
            label: stage.label(),
            class: "bg-yellow-500/10 text-yellow-400 border-yellow-500/20",
            dot_class: "bg-yellow-400",
        },
        _ => Badge {
            label: stage.label(),
            class: "bg-blue-500/10 text-blue-400 border-blue-500/20",
            dot_class: "bg-blue-400 animate-pulse",
        },
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RowView {
    /// 1-based, zero-padded to two digits.
    pub index: String,
    pub submission_id: String,
    pub title: String,
    pub file_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub badge: Badge,
    pub slides: u32,
    pub size_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One row per submission, in the order the server returned them.
pub fn rows(submissions: &[Submission]) -> Vec<RowView> {
    submissions
        .iter()
        .enumerate()
        .map(|(idx, s)| RowView {
            index: format!("{:02}", idx + 1),
            submission_id: s.id.clone(),
            title: if s.team_name.is_empty() {
                s.file_ref.clone()
            } else {
                s.team_name.clone()
            },
            file_ref: s.file_ref.clone(),
            file_url: s.file_url.clone(),
            badge: badge(s.stage),
            slides: s.slide_count,
            size_label: if s.size_bytes == 0 {
                NO_VALUE.to_string()
            } else {
                format!("{} MB", format_mb(s.size_bytes))
            },
            failure_reason: s.failure_reason.clone(),
        })
        .collect()
}

// --- Sync indicator ---

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum IndicatorMode {
    /// Polling with work outstanding.
    Live { in_flight: u32 },
    /// Not polling and not finished.
    Paused,
    Complete,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SyncIndicator {
    pub mode: IndicatorMode,
    /// e.g. "3 processing — auto-refreshing"; absent when nothing is in flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

pub fn sync_indicator(state: SyncState, totals: &BatchTotals) -> SyncIndicator {
    let mode = match state {
        SyncState::Polling | SyncState::Backoff => IndicatorMode::Live {
            in_flight: totals.in_flight,
        },
        SyncState::Stopped if totals.in_flight == 0 => IndicatorMode::Complete,
        SyncState::Stopped | SyncState::Idle => IndicatorMode::Paused,
    };
    let caption = match mode {
        IndicatorMode::Live { in_flight } if in_flight > 0 => {
            Some(format!("{} processing — auto-refreshing", in_flight))
        }
        _ => None,
    };
    SyncIndicator { mode, caption }
}

/// Header tag of the processing view.
pub fn run_header(paused: bool) -> &'static str {
    if paused {
        "PAUSED"
    } else {
        "LIVE EXECUTING"
    }
}

/// Transient fetch-error message. Never blocks the view; it expires on its own.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ErrorBanner {
    pub text: String,
    pub raised_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ErrorBanner {
    pub fn new(error: &EpError, raised_at: DateTime<Utc>, dismiss_after: Duration) -> Self {
        let ttl = chrono::Duration::from_std(dismiss_after).unwrap_or(chrono::Duration::zero());
        Self {
            text: error.banner_text(),
            raised_at,
            expires_at: raised_at + ttl,
        }
    }

    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// --- Expanded submission ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SlideCard {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    pub text: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SubmissionDetailView {
    Extracting { message: &'static str },
    ExtractionFailed { message: &'static str },
    Empty { message: &'static str },
    Slides { heading: String, cards: Vec<SlideCard> },
}

/// Expanded row. The stage decides first; slides only matter once extraction is done.
pub fn submission_detail(stage: Stage, slides: &[Slide]) -> SubmissionDetailView {
    if stage == Stage::Pending || stage.is_in_flight() {
        return SubmissionDetailView::Extracting {
            message: "Extracting content — check back soon…",
        };
    }
    if stage == Stage::Failed {
        return SubmissionDetailView::ExtractionFailed {
            message: "Extraction failed. Use Re-Evaluate All to retry.",
        };
    }
    if slides.is_empty() {
        return SubmissionDetailView::Empty {
            message: "No slide data found yet.",
        };
    }

    let heading = format!(
        "{} slide{} extracted",
        slides.len(),
        if slides.len() == 1 { "" } else { "s" }
    );
    let cards = slides
        .iter()
        .map(|slide| SlideCard {
            title: format!("Slide {}", slide.slide_number),
            complexity: slide
                .complexity_score
                .filter(|c| c.is_finite())
                .map(|c| format!("complexity {:.0}%", c * 100.0)),
            text: slide
                .text_content
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("(no text content)")
                .to_string(),
        })
        .collect();
    SubmissionDetailView::Slides { heading, cards }
}

// --- Whole detail page ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DetailPage {
    pub title: String,
    pub indicator: SyncIndicator,
    pub stats: Vec<StatCard>,
    pub rows: Vec<RowView>,
    pub console: Vec<ConsoleLine>,
}

pub fn detail_page(state: &DetailState) -> DetailPage {
    DetailPage {
        title: state
            .project
            .as_ref()
            .map(|p| p.project_name.clone())
            .unwrap_or_default(),
        indicator: sync_indicator(state.state, &state.totals),
        stats: detail_stats(&state.totals),
        rows: rows(&state.submissions),
        console: state.logs.iter().map(console_line).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_offset_spans_full_circle() {
        let empty = progress_ring(0, Stage::Pending);
        assert!((empty.dash_offset - empty.circumference).abs() < 1e-9);
        let full = progress_ring(100, Stage::Completed);
        assert!(full.dash_offset.abs() < 1e-9);
        assert_eq!(full.stage_label, "Finalizing...");
    }

    #[test]
    fn mb_has_one_decimal() {
        assert_eq!(format_mb(0), "0.0");
        assert_eq!(format_mb(1_572_864), "1.5");
    }
}
