use std::ops::ControlFlow;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, BatchSnapshot, ProgressSource};
use crate::feed::ProgressFeed;
use crate::log_buffer::{LogBuffer, LogEntry};
use crate::stage::{advance, StageEvent, COMPLETED_AT};
use crate::timer::{spawn_ticker, TaskHandle};
use crate::types::{Severity, Stage, Submission};
use crate::{log_debug, log_warn};

/// Result of one simulator tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Paused or already finished; nothing moved.
    Idle,
    Advanced {
        percent: f64,
        stage: Stage,
        /// `(from, to)` when the view stage changed on this tick.
        transition: Option<(Stage, Stage)>,
    },
    /// This tick completed the run. Reported exactly once.
    Finished,
}

/// Everything the processing view renders, copied out after each tick.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SimulatorView {
    pub stage: Stage,
    pub percent: f64,
    pub snapshot: BatchSnapshot,
    pub logs: Vec<LogEntry>,
    /// Submissions completed so far, oldest first.
    pub processed: Vec<String>,
    pub paused: bool,
    pub finished: bool,
}

/// Local progress driver for the processing view.
///
/// Owns its progress scalar; the batch it walks through is a local copy that
/// no backend merge touches.
pub struct Simulator<F: ProgressFeed> {
    feed: F,
    stage: Stage,
    percent: f64,
    batch: Vec<Submission>,
    completed_cards: usize,
    logs: LogBuffer,
    aggregator: Aggregator,
    paused: bool,
    finished: bool,
}

impl<F: ProgressFeed> Simulator<F> {
    /// Every submission of `batch` restarts from `Pending`.
    pub fn new(feed: F, batch: Vec<Submission>, log_capacity: usize) -> Self {
        let batch: Vec<Submission> = batch
            .into_iter()
            .map(|mut s| {
                s.stage = Stage::Pending;
                s.score = None;
                s.failure_reason = None;
                s.flags.clear();
                s
            })
            .collect();
        let logs = LogBuffer::with_capacity(log_capacity);
        let mut aggregator = Aggregator::new();
        aggregator.update(&batch, ProgressSource::Simulated(0.0));
        Self {
            feed,
            stage: Stage::Pending,
            percent: 0.0,
            batch,
            completed_cards: 0,
            logs,
            aggregator,
            paused: false,
            finished: false,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.paused || self.finished {
            return TickOutcome::Idle;
        }

        let feed_tick = self.feed.next_tick(self.percent);
        let step = if feed_tick.step.is_finite() {
            feed_tick.step.max(0.0)
        } else {
            0.0
        };
        self.percent = (self.percent + step).clamp(0.0, COMPLETED_AT);

        let previous = self.stage;
        match advance(previous, &StageEvent::ProgressTick(self.percent)) {
            Ok(next) => self.stage = next,
            Err(e) => log_warn!("[simulator] {}", e),
        }

        if let Some((severity, message)) = feed_tick.log {
            let mut entry = LogEntry::now(severity, message);
            if let Some(active) = self.batch.get_mut(self.completed_cards) {
                if severity == Severity::Flag {
                    active.flags.push(entry.message.clone());
                }
                entry = entry.for_submission(active.id.clone());
            }
            self.logs.append(entry);
        }

        let due = cards_due(self.percent, self.batch.len());
        while self.completed_cards < due {
            let card = &mut self.batch[self.completed_cards];
            card.stage = advance(card.stage, &StageEvent::ProgressTick(COMPLETED_AT))
                .unwrap_or(Stage::Completed);
            card.score = feed_tick.score;
            log_debug!("[simulator] {} processed", card.id);
            self.completed_cards += 1;
        }

        if let Some(active) = self.batch.get_mut(self.completed_cards) {
            if let Ok(next) = advance(active.stage, &StageEvent::ProgressTick(self.percent)) {
                active.stage = next;
            }
        }

        self.aggregator
            .update(&self.batch, ProgressSource::Simulated(self.percent));

        if self.stage == Stage::Completed {
            self.finished = true;
            return TickOutcome::Finished;
        }

        TickOutcome::Advanced {
            percent: self.percent,
            stage: self.stage,
            transition: (previous != self.stage).then_some((previous, self.stage)),
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn batch(&self) -> &[Submission] {
        &self.batch
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        self.aggregator
            .last()
            .cloned()
            .unwrap_or_else(|| BatchSnapshot::empty(ProgressSource::Simulated(self.percent)))
    }

    pub fn view(&self) -> SimulatorView {
        SimulatorView {
            stage: self.stage,
            percent: self.percent,
            snapshot: self.snapshot(),
            logs: self.logs.entries().cloned().collect(),
            processed: self.batch[..self.completed_cards]
                .iter()
                .map(|s| s.id.clone())
                .collect(),
            paused: self.paused,
            finished: self.finished,
        }
    }
}

/// Submissions that should be complete at `percent`: each one owns an equal
/// share of the run.
fn cards_due(percent: f64, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let due = (percent / COMPLETED_AT * total as f64).floor() as usize;
    due.min(total)
}

// --- Background driver ---

/// A running simulator: a cancellable ticker plus the channels the view reads
/// and writes.
pub struct SimulatorHandle {
    task: TaskHandle<u64>,
    view: watch::Receiver<SimulatorView>,
    pause: watch::Sender<bool>,
}

impl SimulatorHandle {
    pub fn view(&self) -> SimulatorView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified after every tick.
    pub fn subscribe(&self) -> watch::Receiver<SimulatorView> {
        self.view.clone()
    }

    pub fn pause(&self) {
        let _ = self.pause.send(true);
    }

    pub fn resume(&self) {
        let _ = self.pause.send(false);
    }

    /// Stops ticking. Idempotent.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Wait until the run finishes or is cancelled; returns the final view.
    pub async fn finished(self) -> SimulatorView {
        let view = self.view.clone();
        self.task.join().await;
        let last = view.borrow().clone();
        last
    }
}

/// Drive `simulator` every `tick` until it finishes or `cancel` fires.
pub fn spawn_simulator<F>(
    mut simulator: Simulator<F>,
    tick: Duration,
    cancel: CancellationToken,
) -> SimulatorHandle
where
    F: ProgressFeed + 'static,
{
    let (view_tx, view_rx) = watch::channel(simulator.view());
    let (pause_tx, pause_rx) = watch::channel(false);

    let task = spawn_ticker(tick, cancel, move |_| {
        simulator.set_paused(*pause_rx.borrow());
        let outcome = simulator.tick();
        if outcome != TickOutcome::Idle {
            let _ = view_tx.send(simulator.view());
        } else if view_tx.borrow().paused != simulator.is_paused() {
            let _ = view_tx.send(simulator.view());
        }
        if simulator.is_finished() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    SimulatorHandle {
        task,
        view: view_rx,
        pause: pause_tx,
    }
}
