//! Request lifecycle tracking.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle phases for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Request received, signal derived.
    Start,
    /// Iterative or fan-out work dispatched.
    Dispatched,
    /// The request signal triggered.
    Triggered(String),
    /// Response classified and returned.
    Completion,
}

impl LifecyclePhase {
    fn key(&self) -> String {
        match self {
            Self::Start => "start".to_string(),
            Self::Dispatched => "dispatched".to_string(),
            Self::Triggered(source) => format!("triggered_{}", source),
            Self::Completion => "completion".to_string(),
        }
    }
}

/// Timing context for observability.
///
/// Uses the Tokio clock so timings follow a paused test clock.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Record a lifecycle phase.
    pub fn mark_phase(&mut self, phase: &LifecyclePhase) {
        self.mark(&phase.key());
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the offset of a mark from the start.
    pub fn offset(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get the offset of a lifecycle phase from the start.
    pub fn phase_offset(&self, phase: &LifecyclePhase) -> Option<Duration> {
        self.offset(&phase.key())
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
