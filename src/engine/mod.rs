mod cancel;
pub mod demo;
mod worker;

pub use cancel::{CancelMode, CancellationToken};
pub(crate) use worker::{spawn_worker, JobCompletion};

use crate::error::EngineFault;
use crate::model::{JobParameters, RenderOutcome, StatusSnapshot};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Rendering collaborator driven by the worker thread.
///
/// `snapshot` may be called while `run` is in progress on the same job, so
/// implementations keep their progress counters in atomics.
pub trait RenderEngine: Send + Sync + 'static {
    fn run(&self, job: &JobParameters, ctx: &JobContext) -> Result<RenderOutcome, EngineFault>;

    fn snapshot(&self, token: &CancellationToken) -> StatusSnapshot;
}

/// Per-job handle given to the engine: the cancellation token plus the
/// lock-free path snapshots take back to the control thread.
pub struct JobContext {
    token: Arc<CancellationToken>,
    status_tx: mpsc::UnboundedSender<StatusSnapshot>,
}

impl JobContext {
    pub(crate) fn new(
        token: Arc<CancellationToken>,
        status_tx: mpsc::UnboundedSender<StatusSnapshot>,
    ) -> Self {
        Self { token, status_tx }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn stop_requested(&self) -> bool {
        self.token.stop_requested()
    }

    pub fn should_wind_down(&self) -> bool {
        self.token.should_wind_down()
    }

    /// Publish a snapshot if the control thread asked for one since the last call.
    /// The closure only runs when a snapshot is actually wanted.
    pub fn report_status(&self, snapshot: impl FnOnce() -> StatusSnapshot) {
        if self.token.take_update_request() {
            self.publish(snapshot());
        }
    }

    pub(crate) fn publish(&self, snapshot: StatusSnapshot) {
        // The receiver goes away once the job is collected; nothing to do then.
        let _ = self.status_tx.send(snapshot);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Engine whose progress is driven by the test.

    use super::*;
    use crate::model::{Artifact, Canvas};
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Behaviour {
        Succeed,
        Fail,
        Panic,
    }

    pub(crate) struct GatedEngine {
        pub open: AtomicBool,
        pub behaviour: Behaviour,
        pub units: AtomicI64,
        pub runs: AtomicUsize,
    }

    impl GatedEngine {
        pub fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                open: AtomicBool::new(false),
                behaviour,
                units: AtomicI64::new(0),
                runs: AtomicUsize::new(0),
            })
        }

        /// An engine whose jobs complete as soon as they start.
        pub fn open(behaviour: Behaviour) -> Arc<Self> {
            let engine = Self::new(behaviour);
            engine.release();
            engine
        }

        pub fn release(&self) {
            self.open.store(true, Ordering::Release);
        }
    }

    impl RenderEngine for GatedEngine {
        fn run(
            &self,
            job: &JobParameters,
            ctx: &JobContext,
        ) -> Result<RenderOutcome, EngineFault> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.units.store(0, Ordering::SeqCst);
            // Only StopNow or the gate end the job; FinishUp is just recorded.
            loop {
                if ctx.stop_requested() || self.open.load(Ordering::Acquire) {
                    break;
                }
                self.units.fetch_add(1, Ordering::SeqCst);
                ctx.report_status(|| self.snapshot(ctx.token()));
                std::thread::sleep(Duration::from_millis(1));
            }
            if ctx.stop_requested() {
                // Nothing after this point may count as output.
                return Ok(RenderOutcome {
                    action: job.action,
                    width: job.width,
                    height: job.height,
                    shape_count: self.units.load(Ordering::SeqCst),
                    finished_early: true,
                    artifact: Artifact::None,
                    finished_utc: String::new(),
                });
            }
            match self.behaviour {
                Behaviour::Succeed => Ok(RenderOutcome {
                    action: job.action,
                    width: job.width,
                    height: job.height,
                    shape_count: self.units.load(Ordering::SeqCst),
                    finished_early: ctx.token().finish_up_requested(),
                    artifact: Artifact::Raster(Canvas {
                        width: 1,
                        height: 1,
                        pixels: bytes::Bytes::from_static(&[255, 255, 255]),
                    }),
                    finished_utc: "now".into(),
                }),
                Behaviour::Fail => Err(EngineFault::InvalidMinimumSize(job.minimum_size)),
                Behaviour::Panic => panic!("scripted panic"),
            }
        }

        fn snapshot(&self, _token: &CancellationToken) -> StatusSnapshot {
            StatusSnapshot {
                shape_count: self.units.load(Ordering::SeqCst),
                pending_expansion_count: 1,
                ..Default::default()
            }
        }
    }
}
