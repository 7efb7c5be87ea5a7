use serde::Serialize;

use crate::types::{Stage, Submission};

// --- Public types ---

/// Where a snapshot's percentage comes from. A view uses exactly one.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "percent")]
pub enum ProgressSource {
    /// Share of submissions in a terminal stage, from backend records.
    Authoritative,
    /// Scalar owned by the local simulator.
    Simulated(f64),
}

/// Batch-level figures derived from the current submissions.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BatchSnapshot {
    pub scanned: u32,
    pub flags: u32,
    /// `None` until at least one completed submission carries a score.
    pub avg_score: Option<f64>,
    pub progress_percent: u8,
    pub source: ProgressSource,
}

impl BatchSnapshot {
    pub fn empty(source: ProgressSource) -> Self {
        Self {
            scanned: 0,
            flags: 0,
            avg_score: None,
            progress_percent: 0,
            source,
        }
    }
}

/// Counters for the detail view's stat row.
#[derive(Serialize, Clone, Debug, PartialEq, Default)]
pub struct BatchTotals {
    pub submissions: u32,
    pub slides: u64,
    pub completed: u32,
    pub failed: u32,
    /// Pending or in one of the working stages.
    pub in_flight: u32,
    pub total_bytes: u64,
}

// --- Pure functions ---

/// Derive a snapshot from `batch` alone.
///
/// Pure: same inputs, same snapshot. The console has no say in it.
pub fn summarize(batch: &[Submission], source: ProgressSource) -> BatchSnapshot {
    let scanned = batch.iter().filter(|s| is_scanned(s.stage)).count() as u32;
    let flagged = batch.iter().filter(|s| !s.flags.is_empty()).count() as u32;

    let scores: Vec<f64> = batch
        .iter()
        .filter(|s| s.stage == Stage::Completed)
        .filter_map(|s| s.score)
        .filter(|score| score.is_finite())
        .collect();
    let avg_score = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    let progress_percent = match source {
        ProgressSource::Authoritative => authoritative_percent(batch),
        ProgressSource::Simulated(percent) => floor_percent(percent),
    };

    BatchSnapshot {
        scanned,
        flags: flagged,
        avg_score,
        progress_percent,
        source,
    }
}

pub fn summarize_totals(batch: &[Submission]) -> BatchTotals {
    batch.iter().fold(BatchTotals::default(), |mut totals, s| {
        totals.submissions += 1;
        totals.slides += u64::from(s.slide_count);
        totals.total_bytes += s.size_bytes;
        match s.stage {
            Stage::Completed => totals.completed += 1,
            Stage::Failed => totals.failed += 1,
            _ => totals.in_flight += 1,
        }
        totals
    })
}

/// True once the whole batch is done. An empty batch has nothing left to do.
pub fn all_terminal(batch: &[Submission]) -> bool {
    batch.iter().all(|s| s.stage.is_terminal())
}

fn is_scanned(stage: Stage) -> bool {
    matches!(
        stage,
        Stage::Visualizing | Stage::Chunking | Stage::Evaluating | Stage::Completed
    )
}

fn authoritative_percent(batch: &[Submission]) -> u8 {
    if batch.is_empty() {
        return 0;
    }
    let done = batch.iter().filter(|s| s.stage.is_terminal()).count();
    (done * 100 / batch.len()) as u8
}

fn floor_percent(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.clamp(0.0, 100.0).floor() as u8
}

// --- Incremental aggregator ---

/// Recomputes the snapshot once per merge and keeps the percentage from
/// regressing within a run.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    floor: u8,
    last: Option<BatchSnapshot>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, batch: &[Submission], source: ProgressSource) -> &BatchSnapshot {
        let mut snapshot = summarize(batch, source);
        snapshot.progress_percent = snapshot.progress_percent.max(self.floor);
        self.floor = snapshot.progress_percent;
        self.last.insert(snapshot)
    }

    /// Start a new run: the floor drops back to zero.
    pub fn reset(&mut self) {
        self.floor = 0;
        self.last = None;
    }

    pub fn last(&self) -> Option<&BatchSnapshot> {
        self.last.as_ref()
    }

    /// Lowest percentage the next snapshot of this run may report.
    pub fn floor(&self) -> u8 {
        self.floor
    }
}
