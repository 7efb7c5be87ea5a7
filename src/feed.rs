use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::stage::VISUALIZING_AFTER;
use crate::types::Severity;

/// What one simulator tick contributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedTick {
    /// Increment of the progress scalar. Negative steps are treated as zero.
    pub step: f64,
    /// Console line to append, if any.
    pub log: Option<(Severity, String)>,
    /// Score given to a submission if this tick completes one.
    pub score: Option<f64>,
}

impl FeedTick {
    pub fn step(step: f64) -> Self {
        Self {
            step,
            ..Default::default()
        }
    }

    pub fn with_log(mut self, severity: Severity, message: impl Into<String>) -> Self {
        self.log = Some((severity, message.into()));
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Source of local progress events while no backend signal exists.
pub trait ProgressFeed: Send {
    /// Produce the next tick given the current progress scalar.
    fn next_tick(&mut self, percent: f64) -> FeedTick;
}

// --- Random feed ---

/// Feed driven by a random source: bounded random steps, occasional log
/// lines, scores in 7.0..=9.0.
pub struct RandomFeed<R: Rng + Send> {
    rng: R,
    max_step: f64,
    log_probability: f64,
}

impl<R: Rng + Send> RandomFeed<R> {
    pub fn new(rng: R, max_step: f64, log_probability: f64) -> Self {
        Self {
            rng,
            max_step: max_step.max(0.0),
            log_probability: log_probability.clamp(0.0, 1.0),
        }
    }

    fn pick_log(&mut self, percent: f64) -> (Severity, String) {
        if percent < VISUALIZING_AFTER {
            return (Severity::Info, "Ingesting PDF Buffer...".to_string());
        }
        match self.rng.random_range(0..6) {
            0 => (
                Severity::Info,
                format!("Vectorizing Slide {}...", self.rng.random_range(1..=10)),
            ),
            1 => (
                Severity::Success,
                format!(
                    "Team_{}: Architecture verified.",
                    self.rng.random_range(0..100)
                ),
            ),
            2 => (
                Severity::Info,
                "RAG Retrieval: Found 3 matching citations.".to_string(),
            ),
            3 => (
                Severity::Info,
                "Analysing revenue model feasibility...".to_string(),
            ),
            4 => (
                Severity::Flag,
                "Warning: High probability of generic LLM text detected.".to_string(),
            ),
            _ => (
                Severity::Info,
                "Token limit optimized for Gemini Flash.".to_string(),
            ),
        }
    }
}

impl RandomFeed<StdRng> {
    /// Reproducible feed for a given seed.
    pub fn seeded(seed: u64, max_step: f64, log_probability: f64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), max_step, log_probability)
    }

    pub fn from_os_rng(max_step: f64, log_probability: f64) -> Self {
        Self::new(StdRng::from_os_rng(), max_step, log_probability)
    }
}

impl<R: Rng + Send> ProgressFeed for RandomFeed<R> {
    fn next_tick(&mut self, percent: f64) -> FeedTick {
        let step = self.rng.random::<f64>() * self.max_step;
        let log = if self.rng.random_bool(self.log_probability) {
            Some(self.pick_log(percent + step))
        } else {
            None
        };
        let score = (70.0 + self.rng.random::<f64>() * 20.0).round() / 10.0;
        FeedTick {
            step,
            log,
            score: Some(score),
        }
    }
}

// --- Scripted feed ---

/// Replays a fixed sequence of ticks, then idles with zero-step ticks.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeed {
    ticks: VecDeque<FeedTick>,
}

impl ScriptedFeed {
    pub fn new(ticks: Vec<FeedTick>) -> Self {
        Self {
            ticks: ticks.into(),
        }
    }

    /// `count` identical ticks of `step` with no logs or scores.
    pub fn steady(step: f64, count: usize) -> Self {
        Self::new(vec![FeedTick::step(step); count])
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

impl ProgressFeed for ScriptedFeed {
    fn next_tick(&mut self, _percent: f64) -> FeedTick {
        self.ticks.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_feeds_are_reproducible() {
        let mut a = RandomFeed::seeded(7, 1.5, 0.3);
        let mut b = RandomFeed::seeded(7, 1.5, 0.3);
        for i in 0..50 {
            let percent = i as f64 * 2.0;
            assert_eq!(a.next_tick(percent), b.next_tick(percent));
        }
    }

    #[test]
    fn random_steps_stay_within_bound() {
        let mut feed = RandomFeed::seeded(42, 1.5, 0.3);
        for _ in 0..500 {
            let tick = feed.next_tick(50.0);
            assert!((0.0..=1.5).contains(&tick.step), "step {}", tick.step);
            let score = tick.score.unwrap();
            assert!((7.0..=9.0).contains(&score), "score {}", score);
        }
    }

    #[test]
    fn early_logs_are_ingestion_only() {
        let mut feed = RandomFeed::seeded(3, 0.1, 1.0);
        for _ in 0..20 {
            let (severity, message) = feed.next_tick(0.0).log.unwrap();
            assert_eq!(severity, Severity::Info);
            assert_eq!(message, "Ingesting PDF Buffer...");
        }
    }

    #[test]
    fn zero_probability_never_logs() {
        let mut feed = RandomFeed::seeded(9, 1.0, 0.0);
        assert!((0..100).all(|_| feed.next_tick(60.0).log.is_none()));
    }

    #[test]
    fn scripted_feed_idles_when_exhausted() {
        let mut feed = ScriptedFeed::new(vec![FeedTick::step(4.0)]);
        assert_eq!(feed.next_tick(0.0).step, 4.0);
        assert_eq!(feed.remaining(), 0);
        assert_eq!(feed.next_tick(4.0), FeedTick::default());
    }
}
