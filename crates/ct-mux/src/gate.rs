//! Time-boxed "completion in flight" flag
//!
//! Uses the tokio clock so tests can drive the window with paused time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// How long output from secondary sources is suppressed after a Tab
pub const DEFAULT_COMPLETION_WINDOW: Duration = Duration::from_millis(250);

/// Shared flag raised by the writer on Tab and consulted by the reader
#[derive(Debug, Clone)]
pub struct CompletionGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    window: Duration,
    deadline: Mutex<Option<Instant>>,
}

impl CompletionGate {
    /// Create a gate that stays armed for `window` after each `arm`
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(GateInner {
                window,
                deadline: Mutex::new(None),
            }),
        }
    }

    /// Configured suppression window
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Raise the flag; re-arming extends the deadline
    pub fn arm(&self) {
        let deadline = Instant::now() + self.inner.window;
        *self.inner.deadline.lock() = Some(deadline);
        tracing::trace!("Completion gate armed for {:?}", self.inner.window);
    }

    /// Whether the flag is currently raised
    pub fn is_armed(&self) -> bool {
        let mut deadline = self.inner.deadline.lock();
        match *deadline {
            Some(at) if Instant::now() < at => true,
            Some(_) => {
                *deadline = None;
                false
            }
            None => false,
        }
    }

    /// Lower the flag immediately
    pub fn disarm(&self) {
        *self.inner.deadline.lock() = None;
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gate_clears_after_window() {
        let gate = CompletionGate::default();
        assert!(!gate.is_armed());

        gate.arm();
        assert!(gate.is_armed());

        tokio::time::advance(Duration::from_millis(249)).await;
        assert!(gate.is_armed());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!gate.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_extends_deadline() {
        let gate = CompletionGate::new(Duration::from_millis(100));
        gate.arm();
        tokio::time::advance(Duration::from_millis(80)).await;
        gate.arm();
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(gate.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let gate = CompletionGate::default();
        let other = gate.clone();
        gate.arm();
        assert!(other.is_armed());
        other.disarm();
        assert!(!gate.is_armed());
    }
}
