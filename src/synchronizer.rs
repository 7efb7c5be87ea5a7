use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{
    all_terminal, summarize_totals, Aggregator, BatchSnapshot, BatchTotals, ProgressSource,
};
use crate::client::{self, StatusSource};
use crate::ep_error::EpError;
use crate::log_buffer::{LogBuffer, LogEntry, DEFAULT_CAPACITY};
use crate::stage::{advance, StageEvent};
use crate::timer::TaskHandle;
use crate::types::{ProcessingStarted, Project, ProjectDetails, Severity, Stage, Submission};
use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// --- Public types ---

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Polling,
    Backoff,
    Stopped,
}

/// Poll bookkeeping for one open detail view.
#[derive(Clone, Debug, PartialEq)]
pub struct PollState {
    pub interval: Duration,
    pub active: bool,
    pub last_error: Option<EpError>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    /// Fixed cadence for both regular polls and retries after a failure.
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            log_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// What the poll loop does after a fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum PollDecision {
    /// Work still in flight: fetch again after the interval.
    Continue(Duration),
    /// Fetch failed: retry after the interval.
    Retry(Duration),
    /// Every submission is terminal; polling stopped. Returned once per run.
    Complete,
    /// The synchronizer was stopped while the fetch was out; result dropped.
    Halted,
}

/// Notifications for whoever renders the detail view.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    Updated(BatchSnapshot),
    FetchFailed(EpError),
    Completed(BatchSnapshot),
    Stopped,
}

/// Copy of everything the detail view renders.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailState {
    pub state: SyncState,
    pub poll: PollState,
    pub project: Option<Project>,
    pub submissions: Vec<Submission>,
    pub snapshot: BatchSnapshot,
    pub totals: BatchTotals,
    pub logs: Vec<LogEntry>,
}

// --- State machine ---

/// Poll state machine for one project's batch.
///
/// Sole owner of the batch's submissions: stage changes go through the stage
/// model here and nowhere else.
pub struct Synchronizer {
    project_id: String,
    config: SyncConfig,
    state: SyncState,
    poll: PollState,
    project: Option<Project>,
    submissions: Vec<Submission>,
    logs: LogBuffer,
    aggregator: Aggregator,
    seen_flags: HashSet<(String, String)>,
    in_flight: bool,
    completion_sent: bool,
}

impl Synchronizer {
    pub fn new(project_id: impl Into<String>, config: SyncConfig) -> Self {
        let logs = LogBuffer::with_capacity(config.log_capacity);
        let poll = PollState {
            interval: config.interval,
            active: false,
            last_error: None,
        };
        Self {
            project_id: project_id.into(),
            config,
            state: SyncState::Idle,
            poll,
            project: None,
            submissions: Vec::new(),
            logs,
            aggregator: Aggregator::new(),
            seen_flags: HashSet::new(),
            in_flight: false,
            completion_sent: false,
        }
    }

    /// `Idle -> Polling`. Returns false (and changes nothing) from any other state.
    pub fn start(&mut self) -> bool {
        if self.state != SyncState::Idle {
            return false;
        }
        log_info!("[sync] {} polling every {:?}", self.project_id, self.poll.interval);
        self.state = SyncState::Polling;
        self.poll.active = true;
        true
    }

    /// `Stopped` from any state. Idempotent; returns true if this call stopped it.
    pub fn stop(&mut self) -> bool {
        if self.state == SyncState::Stopped {
            return false;
        }
        log_info!("[sync] {} stopped", self.project_id);
        self.state = SyncState::Stopped;
        self.poll.active = false;
        true
    }

    /// Claim the single fetch slot. A retry from `Backoff` goes back to `Polling`.
    pub fn begin_fetch(&mut self) -> Result<(), EpError> {
        if self.in_flight {
            return Err(EpError::FetchInFlight);
        }
        match self.state {
            SyncState::Polling => {}
            SyncState::Backoff => self.state = SyncState::Polling,
            SyncState::Idle | SyncState::Stopped => return Err(EpError::NotPolling),
        }
        self.in_flight = true;
        Ok(())
    }

    /// Release the fetch slot without applying a result (fetch was cancelled).
    pub fn abandon_fetch(&mut self) {
        self.in_flight = false;
    }

    /// Apply the outcome of the fetch claimed by `begin_fetch`.
    pub fn finish_fetch(&mut self, result: Result<ProjectDetails, EpError>) -> PollDecision {
        self.in_flight = false;
        if self.state == SyncState::Stopped {
            log_debug!("[sync] {} dropping late fetch result", self.project_id);
            return PollDecision::Halted;
        }

        match result {
            Ok(details) => {
                self.merge(details);
                self.poll.last_error = None;
                self.state = SyncState::Polling;

                if all_terminal(&self.submissions) {
                    self.state = SyncState::Stopped;
                    self.poll.active = false;
                    if self.completion_sent {
                        return PollDecision::Halted;
                    }
                    self.completion_sent = true;
                    log_info!(
                        "[sync] {} batch finished ({} submissions)",
                        self.project_id,
                        self.submissions.len()
                    );
                    return PollDecision::Complete;
                }
                PollDecision::Continue(self.poll.interval)
            }
            Err(e) => {
                log_warn!("[sync] {} fetch failed: {}", self.project_id, e);
                self.state = SyncState::Backoff;
                self.poll.last_error = Some(e);
                PollDecision::Retry(self.poll.interval)
            }
        }
    }

    /// One fetch against `source`, bounded by the configured timeout.
    pub async fn poll_once<S: StatusSource>(&mut self, source: &S) -> Result<PollDecision, EpError> {
        self.begin_fetch()?;
        let timeout = self.config.fetch_timeout;
        let result = match tokio::time::timeout(timeout, source.project_details(&self.project_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(EpError::FetchTimeout(timeout)),
        };
        Ok(self.finish_fetch(result))
    }

    /// Replace the whole set with the fetched records, passing each stage
    /// through the stage model against the previous one.
    fn merge(&mut self, details: ProjectDetails) {
        let first_load = self.project.is_none();
        let mut merged = Vec::with_capacity(details.submissions.len());

        for record in &details.submissions {
            let previous = self
                .submissions
                .iter()
                .find(|s| s.id == record.submission_id)
                .map(|s| s.stage);
            let from = previous.unwrap_or(Stage::Pending);
            let event = StageEvent::ExternalStatus(record.processing_status.clone());

            let stage = match advance(from, &event) {
                Ok(stage) => stage,
                Err(e) => {
                    log_warn!("[sync] {}: {}", record.submission_id, e);
                    self.logs.append(
                        LogEntry::now(
                            Severity::Error,
                            format!("Ignored status '{}' ({})", record.processing_status, from),
                        )
                        .for_submission(record.submission_id.clone()),
                    );
                    from
                }
            };

            let submission = Submission::from_record(record, stage);
            if let Some(previous) = previous {
                if previous != stage {
                    self.logs.append(transition_entry(&submission, previous));
                }
            }
            for flag in &record.flags {
                let key = (submission.id.clone(), flag.clone());
                if self.seen_flags.insert(key) {
                    self.logs.append(
                        LogEntry::now(Severity::Flag, format!("{}: {}", display_name(&submission), flag))
                            .for_submission(submission.id.clone()),
                    );
                }
            }
            merged.push(submission);
        }

        if first_load {
            self.logs.append(LogEntry::now(
                Severity::Info,
                format!("Loaded {} submissions", merged.len()),
            ));
        }

        self.project = Some(details.project);
        self.submissions = merged;
        self.aggregator
            .update(&self.submissions, ProgressSource::Authoritative);
    }

    /// Explicit re-evaluation of one submission. Other submissions are untouched.
    ///
    /// Starts a new run: the progress floor and completion latch are cleared
    /// and a stopped synchronizer resumes polling to watch the submission.
    pub fn reset_submission(&mut self, submission_id: &str) -> Option<Stage> {
        let submission = self.submissions.iter_mut().find(|s| s.id == submission_id)?;
        let previous = reset_stage(submission);
        let entry = LogEntry::now(
            Severity::Info,
            format!("{}: reset to Pending (was {})", display_name(submission), previous),
        )
        .for_submission(submission.id.clone());
        self.logs.append(entry);
        self.seen_flags.retain(|(id, _)| id != submission_id);
        self.aggregator.reset();
        self.aggregator
            .update(&self.submissions, ProgressSource::Authoritative);
        self.completion_sent = false;
        if self.state == SyncState::Stopped {
            self.poll.active = true;
            self.state = SyncState::Polling;
            log_info!("[sync] {} polling resumed after reset", self.project_id);
        }
        Some(Stage::Pending)
    }

    /// Start a new run after a re-evaluation: every submission back to
    /// `Pending`, progress floor cleared, polling resumed.
    pub fn restart(&mut self) {
        for submission in &mut self.submissions {
            reset_stage(submission);
        }
        self.seen_flags.clear();
        self.logs.append(LogEntry::now(
            Severity::Info,
            format!("Re-evaluation started for {} submissions", self.submissions.len()),
        ));
        self.aggregator.reset();
        self.aggregator
            .update(&self.submissions, ProgressSource::Authoritative);
        self.completion_sent = false;
        self.in_flight = false;
        self.poll.last_error = None;
        self.poll.active = true;
        self.state = SyncState::Polling;
        log_info!("[sync] {} re-evaluation started", self.project_id);
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn poll_state(&self) -> &PollState {
        &self.poll
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        self.aggregator
            .last()
            .cloned()
            .unwrap_or_else(|| BatchSnapshot::empty(ProgressSource::Authoritative))
    }

    pub fn detail_state(&self) -> DetailState {
        DetailState {
            state: self.state,
            poll: self.poll.clone(),
            project: self.project.clone(),
            submissions: self.submissions.clone(),
            snapshot: self.snapshot(),
            totals: summarize_totals(&self.submissions),
            logs: self.logs.entries().cloned().collect(),
        }
    }
}

/// Returns the stage the submission had before the reset.
fn reset_stage(submission: &mut Submission) -> Stage {
    let previous = submission.stage;
    submission.stage = advance(previous, &StageEvent::ResetToPending).unwrap_or(Stage::Pending);
    submission.failure_reason = None;
    submission.score = None;
    submission.flags.clear();
    previous
}

fn display_name(submission: &Submission) -> &str {
    if submission.team_name.is_empty() {
        &submission.id
    } else {
        &submission.team_name
    }
}

fn transition_entry(submission: &Submission, previous: Stage) -> LogEntry {
    let name = display_name(submission);
    let (severity, message) = match submission.stage {
        Stage::Completed => (Severity::Success, format!("{}: evaluation completed", name)),
        Stage::Failed => (
            Severity::Error,
            match &submission.failure_reason {
                Some(reason) => format!("{}: failed ({})", name, reason),
                None => format!("{}: failed", name),
            },
        ),
        stage => (Severity::Info, format!("{}: {} -> {}", name, previous, stage)),
    };
    LogEntry::now(severity, message).for_submission(submission.id.clone())
}

// --- Command enum ---

pub enum SyncCommand {
    GetState {
        reply: oneshot::Sender<DetailState>,
    },
    Refresh {
        reply: oneshot::Sender<Result<PollDecision, EpError>>,
    },
    ReEvaluate {
        reply: oneshot::Sender<Result<ProcessingStarted, EpError>>,
    },
}

// --- SyncHandle ---

#[derive(Clone)]
pub struct SyncHandle {
    sender: mpsc::Sender<SyncCommand>,
    cancel: CancellationToken,
}

impl SyncHandle {
    async fn send_command<T>(
        &self,
        command: SyncCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, EpError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| EpError::ShutDown)?;
        rx.await.map_err(|_| EpError::ShutDown)
    }

    /// Current detail state, as rendered by the view.
    pub async fn view(&self) -> Result<DetailState, EpError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SyncCommand::GetState { reply }, rx).await
    }

    /// Fetch now instead of waiting for the next scheduled poll.
    pub async fn refresh(&self) -> Result<PollDecision, EpError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SyncCommand::Refresh { reply }, rx).await?
    }

    /// Reset every submission on the backend, queue processing, and resume polling.
    pub async fn reevaluate(&self) -> Result<ProcessingStarted, EpError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SyncCommand::ReEvaluate { reply }, rx)
            .await?
    }

    /// Stop polling and end the task. Idempotent; also cancels an in-flight fetch.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.sender.is_closed()
    }
}

// --- Actor implementation ---

const CHANNEL_CAPACITY: usize = 32;

/// Start polling in a background task that owns `sync`.
///
/// The task ends when `stop()` is called, `cancel` fires, or every handle is
/// dropped; it resolves to the final detail state.
pub fn spawn_synchronizer<S: StatusSource + 'static>(
    source: Arc<S>,
    sync: Synchronizer,
    cancel: CancellationToken,
) -> (
    SyncHandle,
    mpsc::UnboundedReceiver<SyncEvent>,
    TaskHandle<DetailState>,
) {
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = SyncHandle {
        sender,
        cancel: cancel.clone(),
    };
    let join = tokio::spawn(run_synchronizer(
        source,
        sync,
        receiver,
        events_tx,
        cancel.clone(),
    ));
    (handle, events_rx, TaskHandle::new(cancel, join))
}

async fn run_synchronizer<S: StatusSource>(
    source: Arc<S>,
    mut sync: Synchronizer,
    mut receiver: mpsc::Receiver<SyncCommand>,
    events: mpsc::UnboundedSender<SyncEvent>,
    cancel: CancellationToken,
) -> DetailState {
    let mut next_due = if sync.start() || sync.state() == SyncState::Polling {
        Some(Instant::now())
    } else {
        None
    };

    loop {
        let due = next_due;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = receiver.recv() => {
                let Some(command) = command else {
                    break;
                };
                match handle_command(command, &mut sync, source.as_ref(), &events, &cancel).await {
                    CommandEffect::Reschedule(at) => next_due = at,
                    CommandEffect::Keep => {}
                    CommandEffect::Cancelled => break,
                }
            }
            _ = sleep_until_due(due), if due.is_some() => {
                match fetch_cancellable(&mut sync, source.as_ref(), &cancel).await {
                    Some(Ok(decision)) => next_due = apply_decision(&sync, decision, &events),
                    Some(Err(e)) => {
                        log_debug!("[sync] poll skipped: {}", e);
                        next_due = None;
                    }
                    None => break,
                }
            }
        }
    }

    sync.stop();
    let _ = events.send(SyncEvent::Stopped);
    sync.detail_state()
}

enum CommandEffect {
    Reschedule(Option<Instant>),
    Keep,
    Cancelled,
}

async fn handle_command<S: StatusSource>(
    command: SyncCommand,
    sync: &mut Synchronizer,
    source: &S,
    events: &mpsc::UnboundedSender<SyncEvent>,
    cancel: &CancellationToken,
) -> CommandEffect {
    match command {
        SyncCommand::GetState { reply } => {
            let _ = reply.send(sync.detail_state());
            CommandEffect::Keep
        }
        SyncCommand::Refresh { reply } => match fetch_cancellable(sync, source, cancel).await {
            Some(Ok(decision)) => {
                let next = apply_decision(sync, decision.clone(), events);
                let _ = reply.send(Ok(decision));
                CommandEffect::Reschedule(next)
            }
            Some(Err(e)) => {
                let _ = reply.send(Err(e));
                CommandEffect::Keep
            }
            None => CommandEffect::Cancelled,
        },
        SyncCommand::ReEvaluate { reply } => {
            let project_id = sync.project_id().to_string();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = client::reevaluate(source, &project_id) => Some(result),
            };
            match outcome {
                Some(Ok(started)) => {
                    sync.restart();
                    let _ = events.send(SyncEvent::Updated(sync.snapshot()));
                    let _ = reply.send(Ok(started));
                    CommandEffect::Reschedule(Some(Instant::now()))
                }
                Some(Err(e)) => {
                    log_warn!("[sync] re-evaluation of {} failed: {}", project_id, e);
                    let _ = reply.send(Err(e));
                    CommandEffect::Keep
                }
                None => CommandEffect::Cancelled,
            }
        }
    }
}

/// `None` when cancelled mid-fetch; the fetch slot is released and nothing is applied.
async fn fetch_cancellable<S: StatusSource>(
    sync: &mut Synchronizer,
    source: &S,
    cancel: &CancellationToken,
) -> Option<Result<PollDecision, EpError>> {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = sync.poll_once(source) => Some(result),
    };
    if outcome.is_none() {
        sync.abandon_fetch();
    }
    outcome
}

fn apply_decision(
    sync: &Synchronizer,
    decision: PollDecision,
    events: &mpsc::UnboundedSender<SyncEvent>,
) -> Option<Instant> {
    match decision {
        PollDecision::Continue(after) => {
            let _ = events.send(SyncEvent::Updated(sync.snapshot()));
            Some(Instant::now() + after)
        }
        PollDecision::Retry(after) => {
            if let Some(e) = &sync.poll_state().last_error {
                let _ = events.send(SyncEvent::FetchFailed(e.clone()));
            }
            Some(Instant::now() + after)
        }
        PollDecision::Complete => {
            let snapshot = sync.snapshot();
            let _ = events.send(SyncEvent::Updated(snapshot.clone()));
            let _ = events.send(SyncEvent::Completed(snapshot));
            None
        }
        PollDecision::Halted => None,
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
