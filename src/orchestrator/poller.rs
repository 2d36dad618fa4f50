//! Status bridge from the worker thread to the control thread.
//!
//! Each tick asks the job for a fresh snapshot and reads whatever was published
//! since the previous tick, so the report can be one tick stale. Reads never
//! wait on the worker.

use crate::engine::CancellationToken;
use crate::metrics;
use crate::model::StatusSnapshot;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const DEFAULT_CADENCE: Duration = Duration::from_millis(100);

/// Output-phase ticks to sit through before a progress bar is shown.
const PROGRESS_DELAY_TICKS: u32 = 2;
const BUSY_FRAMES: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StatusReport {
    pub snapshot: StatusSnapshot,
    /// Busy animation frame, 1..=8.
    pub frame: u8,
    pub progress: Option<u8>,
}

#[derive(Debug)]
pub(crate) struct StatusPoller {
    cadence: Duration,
    running: bool,
    frame: u8,
    output_ticks: u32,
}

impl StatusPoller {
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence: cadence.max(Duration::from_millis(1)),
            running: false,
            frame: 0,
            output_ticks: 0,
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
        self.frame = 0;
        self.output_ticks = 0;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.frame = 0;
    }

    /// One tick. `job` is `None` once the worker is idle, which stops the poller.
    pub fn tick(
        &mut self,
        job: Option<(&CancellationToken, &mut UnboundedReceiver<StatusSnapshot>)>,
    ) -> Option<StatusReport> {
        let Some((token, status_rx)) = job else {
            self.stop();
            return None;
        };
        if !self.running {
            return None;
        }

        self.frame = self.frame % BUSY_FRAMES + 1;
        token.request_update();

        let mut latest = None;
        while let Ok(snapshot) = status_rx.try_recv() {
            latest = Some(snapshot);
        }
        let snapshot = latest?;

        let progress = if snapshot.is_writing_output {
            if self.output_ticks > PROGRESS_DELAY_TICKS {
                metrics::progress_percent(snapshot.output_done, snapshot.output_total)
            } else {
                self.output_ticks += 1;
                Some(0)
            }
        } else {
            self.output_ticks = 0;
            None
        };

        Some(StatusReport {
            snapshot,
            frame: self.frame,
            progress,
        })
    }
}
