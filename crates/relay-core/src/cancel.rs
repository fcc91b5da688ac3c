//! Composable cooperative cancellation.
//!
//! A `CancellationSignal` is a write-once trigger flag plus a list of
//! dependent signals. Triggering pushes the state down to every linked
//! child and wakes every task awaiting the signal; nothing polls.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// What caused a signal to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelSource {
    /// The caller walked away (client abort).
    Caller,
    /// A deadline registered with `trigger_after` elapsed.
    Timeout,
    /// A fail-fast aggregation short-circuited on a sibling's outcome.
    FailFast,
}

impl CancelSource {
    /// Get the name of this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Timeout => "timeout",
            Self::FailFast => "fail_fast",
        }
    }
}

impl fmt::Display for CancelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SignalState {
    source: OnceLock<CancelSource>,
    token: CancellationToken,
    children: Mutex<Vec<Weak<SignalState>>>,
}

impl SignalState {
    fn new() -> Self {
        Self {
            source: OnceLock::new(),
            token: CancellationToken::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn trigger(&self, source: CancelSource) -> bool {
        if self.source.set(source).is_err() {
            return false;
        }
        self.token.cancel();

        let children = {
            let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *children)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.trigger(source);
        }
        true
    }

    fn attach(&self, child: &Arc<SignalState>) {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock: a concurrent trigger either sees this child
        // in the list or has already recorded its source.
        if let Some(source) = self.source.get().copied() {
            drop(children);
            child.trigger(source);
            return;
        }
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(child));
    }
}

/// Cooperative cancellation handle.
///
/// Clones share state. The trigger state transitions exactly once, from
/// not-triggered to a terminal `CancelSource`; later triggers are no-ops.
#[derive(Clone)]
pub struct CancellationSignal {
    state: Arc<SignalState>,
}

impl CancellationSignal {
    /// Create a new, not-triggered signal.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    /// A detached signal that nothing will ever trigger.
    ///
    /// Passing this to an I/O call is equivalent to not passing a signal at
    /// all: the call runs to completion regardless of upstream cancellation.
    pub fn none() -> Self {
        Self::new()
    }

    /// Create a signal that triggers as soon as any of `parents` triggers.
    ///
    /// The child records the source of whichever parent fired first. A
    /// parent that is already triggered triggers the child immediately.
    pub fn link<'a>(parents: impl IntoIterator<Item = &'a CancellationSignal>) -> Self {
        let linked = Self::new();
        for parent in parents {
            parent.state.attach(&linked.state);
        }
        linked
    }

    /// Create a child that triggers when this signal does.
    ///
    /// Triggering the child does not affect this signal.
    pub fn child(&self) -> Self {
        Self::link([self])
    }

    /// Trigger with the given source.
    ///
    /// Returns `true` if this call performed the transition (first writer wins).
    pub fn trigger(&self, source: CancelSource) -> bool {
        self.state.trigger(source)
    }

    /// Trigger as a caller abort.
    pub fn cancel(&self) -> bool {
        self.trigger(CancelSource::Caller)
    }

    /// Schedule a `Timeout` trigger after `duration`.
    ///
    /// The timer task exits early if the signal triggers from any other
    /// source, and is aborted when the returned guard is dropped. Must be
    /// called from within a Tokio runtime.
    pub fn trigger_after(&self, duration: Duration) -> TimerGuard {
        let signal = self.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    if signal.trigger(CancelSource::Timeout) {
                        tracing::debug!(timeout_ms = duration.as_millis() as u64, "deadline elapsed");
                    }
                }
                _ = signal.state.token.cancelled() => {}
            }
        });
        TimerGuard {
            handle: Some(task.abort_handle()),
        }
    }

    /// Check whether the signal has triggered.
    pub fn is_triggered(&self) -> bool {
        self.state.source.get().is_some()
    }

    /// Get the source that triggered this signal, if any.
    pub fn triggering_source(&self) -> Option<CancelSource> {
        self.state.source.get().copied()
    }

    /// Wait until the signal triggers and return its source.
    pub async fn triggered(&self) -> CancelSource {
        self.state.token.cancelled().await;
        // The source is always recorded before the token fires.
        self.triggering_source().unwrap_or(CancelSource::Caller)
    }

    /// Sleep for `duration` unless the signal triggers first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CancelSource> {
        self.run_until_triggered(tokio::time::sleep(duration)).await
    }

    /// Drive `fut` to completion unless the signal triggers first.
    ///
    /// An already-triggered signal wins without polling `fut`.
    pub async fn run_until_triggered<F>(&self, fut: F) -> Result<F::Output, CancelSource>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            source = self.triggered() => Err(source),
            output = fut => Ok(output),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("source", &self.triggering_source())
            .finish()
    }
}

/// Disarms a pending `trigger_after` timer when dropped.
#[must_use = "dropping the guard disarms the timeout"]
#[derive(Debug)]
pub struct TimerGuard {
    handle: Option<AbortHandle>,
}

impl TimerGuard {
    /// Disarm the timer now.
    pub fn disarm(mut self) {
        self.abort();
    }

    /// Check whether the timer task is still pending.
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.abort();
    }
}
