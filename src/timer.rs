use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Handle to a view-owned background task.
///
/// Cancelling (explicitly or by dropping the handle) stops the task before
/// its next callback; no callback runs after `cancel()` returns and the task
/// observes the token.
pub struct TaskHandle<T> {
    cancel: CancellationToken,
    join: Option<JoinHandle<T>>,
}

impl<T> TaskHandle<T> {
    pub fn new(cancel: CancellationToken, join: JoinHandle<T>) -> Self {
        Self {
            cancel,
            join: Some(join),
        }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the task to end. `None` if it panicked or was aborted.
    pub async fn join(mut self) -> Option<T> {
        let join = self.join.take()?;
        join.await.ok()
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Run `on_tick` every `period` until it breaks or `cancel` fires.
///
/// The first callback happens one period after spawning. Missed ticks are
/// skipped rather than replayed in a burst. Resolves to the number of
/// callbacks made.
pub fn spawn_ticker<F>(period: Duration, cancel: CancellationToken, mut on_tick: F) -> TaskHandle<u64>
where
    F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    let token = cancel.clone();
    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval() completes its first tick immediately
        interval.tick().await;

        let mut count = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    count += 1;
                    if on_tick(count).is_break() {
                        break;
                    }
                }
            }
        }
        count
    });
    TaskHandle::new(cancel, join)
}
