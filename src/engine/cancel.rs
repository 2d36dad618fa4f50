use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelMode {
    /// Stop starting new work but flush and finalize what exists.
    FinishUp,
    /// Abandon as soon as safely possible, emitting no further output.
    StopNow,
}

/// Cooperative flags shared between the control thread and one job.
///
/// Both cancellation flags are one-way. A fresh token is created for every job.
#[derive(Debug, Default)]
pub struct CancellationToken {
    stop: AtomicBool,
    finish_up: AtomicBool,
    update: AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the call changed the token.
    pub fn request(&self, mode: CancelMode) -> bool {
        match mode {
            CancelMode::StopNow => !self.stop.swap(true, Ordering::AcqRel),
            CancelMode::FinishUp => {
                // FinishUp after StopNow would be a de-escalation.
                if self.stop.load(Ordering::Acquire) {
                    return false;
                }
                !self.finish_up.swap(true, Ordering::AcqRel)
            }
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn finish_up_requested(&self) -> bool {
        self.finish_up.load(Ordering::Acquire)
    }

    /// True at a coarse checkpoint when the job should stop starting new work.
    pub fn should_wind_down(&self) -> bool {
        self.finish_up_requested() || self.stop_requested()
    }

    pub fn request_update(&self) {
        self.update.store(true, Ordering::Release);
    }

    /// Clears the update request and reports whether one was pending.
    pub fn take_update_request(&self) -> bool {
        self.update.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_up_then_stop_now_escalates() {
        let token = CancellationToken::new();
        assert!(token.request(CancelMode::FinishUp));
        assert!(token.request(CancelMode::StopNow));
        assert!(token.finish_up_requested());
        assert!(token.stop_requested());
    }

    #[test]
    fn finish_up_after_stop_now_is_ignored() {
        let token = CancellationToken::new();
        token.request(CancelMode::StopNow);
        assert!(!token.request(CancelMode::FinishUp));
        assert!(!token.finish_up_requested());
        assert!(token.stop_requested());
    }

    #[test]
    fn stop_is_permanent_across_repeated_requests() {
        let token = CancellationToken::new();
        token.request(CancelMode::StopNow);
        for mode in [CancelMode::FinishUp, CancelMode::StopNow, CancelMode::FinishUp] {
            token.request(mode);
            assert!(token.stop_requested());
        }
        assert!(token.should_wind_down());
    }

    #[test]
    fn update_request_is_cleared_on_read() {
        let token = CancellationToken::new();
        assert!(!token.take_update_request());
        token.request_update();
        assert!(token.take_update_request());
        assert!(!token.take_update_request());
    }
}
