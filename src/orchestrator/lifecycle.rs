//! Job lifecycle: the single authority for whether a job is running.
//!
//! Everything here runs on the control thread. The worker reaches back only
//! through the completion channel handed out by [`Orchestrator::new`].

use super::mailbox::{ActionSlot, DeferredAction};
use super::poller::{StatusPoller, StatusReport};
use crate::engine::{spawn_worker, CancelMode, CancellationToken, JobCompletion, JobContext, RenderEngine};
use crate::error::StartError;
use crate::model::{JobEnd, JobId, JobParameters, RenderButton, StatusSnapshot};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
}

/// Answer to a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Safe to close right away.
    CloseNow,
    /// A job is still running; the close happens when it completes.
    Pending,
    /// Unsaved changes; the UI must ask the user and come back with a choice.
    AskUser,
}

/// Result of handling a completion: how the job ended and what to do next.
#[derive(Debug)]
pub(crate) struct Completed {
    pub job_id: JobId,
    pub params: JobParameters,
    pub end: JobEnd,
    pub final_status: StatusSnapshot,
    pub next: DeferredAction,
}

/// Internal handle for the running job.
struct ActiveJob {
    id: JobId,
    params: JobParameters,
    token: Arc<CancellationToken>,
    status_rx: UnboundedReceiver<StatusSnapshot>,
    thread: Option<JoinHandle<()>>,
}

pub(crate) struct Orchestrator<E: RenderEngine> {
    engine: Arc<E>,
    done_tx: UnboundedSender<JobCompletion>,
    active: Option<ActiveJob>,
    slot: ActionSlot,
    poller: StatusPoller,
    last_job: Option<JobId>,
}

impl<E: RenderEngine> Orchestrator<E> {
    /// Returns the orchestrator and the receiving end of the completion channel,
    /// which the control loop must feed back into [`Orchestrator::on_completed`].
    pub fn new(engine: Arc<E>, poll_cadence: Duration) -> (Self, UnboundedReceiver<JobCompletion>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let orch = Self {
            engine,
            done_tx,
            active: None,
            slot: ActionSlot::default(),
            poller: StatusPoller::new(poll_cadence),
            last_job: None,
        };
        (orch, done_rx)
    }

    pub fn state(&self) -> WorkerState {
        if self.active.is_some() {
            WorkerState::Busy
        } else {
            WorkerState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state() == WorkerState::Busy
    }

    /// Parameters of the running job, as copied at start.
    #[cfg(test)]
    pub fn running_params(&self) -> Option<&JobParameters> {
        self.active.as_ref().map(|job| &job.params)
    }

    pub fn pending_action(&self) -> DeferredAction {
        self.slot.peek()
    }

    pub fn poll_cadence(&self) -> Duration {
        self.poller.cadence()
    }

    pub fn poller_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn start(&mut self, params: &JobParameters) -> Result<JobId, StartError> {
        if self.active.is_some() {
            return Err(StartError::Busy);
        }

        let id = self.last_job.map_or(1, |n| n + 1);
        let params = params.clone();
        let token = Arc::new(CancellationToken::new());
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let ctx = JobContext::new(token.clone(), status_tx);
        let thread = spawn_worker(
            self.engine.clone(),
            id,
            params.clone(),
            ctx,
            self.done_tx.clone(),
        )?;

        tracing::debug!(job_id = id, action = ?params.action, width = params.width, height = params.height, "job started");
        self.last_job = Some(id);
        self.active = Some(ActiveJob {
            id,
            params,
            token,
            status_rx,
            thread: Some(thread),
        });
        self.poller.start();
        Ok(id)
    }

    /// Never blocks. Escalation only; a FinishUp after StopNow does nothing.
    pub fn request_cancel(&self, mode: CancelMode) {
        if let Some(job) = &self.active {
            if job.token.request(mode) {
                tracing::debug!(job_id = job.id, ?mode, "cancel requested");
            }
        }
    }

    /// Returns false when idle; the caller should start directly instead.
    pub fn defer_action(&mut self, action: DeferredAction) -> bool {
        if self.active.is_none() {
            return false;
        }
        let now = self.slot.offer(action);
        tracing::debug!(requested = ?action, pending = ?now, "action deferred");
        true
    }

    /// Render button: starts nothing itself, but escalates a running job one level.
    /// Returns false when idle so the caller can start a render.
    pub fn escalate(&self) -> bool {
        let Some(job) = &self.active else {
            return false;
        };
        let mode = if job.token.finish_up_requested() {
            CancelMode::StopNow
        } else {
            CancelMode::FinishUp
        };
        self.request_cancel(mode);
        true
    }

    pub fn button(&self) -> RenderButton {
        match &self.active {
            None => RenderButton::Render,
            Some(job) if job.token.finish_up_requested() || job.token.stop_requested() => {
                RenderButton::StopNow
            }
            Some(_) => RenderButton::Stop,
        }
    }

    /// Close handshake. While busy the close is vetoed and remembered, and the
    /// job is told to stop; the completion handler performs the close.
    pub fn request_close(&mut self, unsaved_changes: bool) -> CloseDecision {
        self.request_closing(DeferredAction::CloseWindow, unsaved_changes)
    }

    /// Same handshake for leaving the application.
    pub fn request_exit(&mut self, unsaved_changes: bool) -> CloseDecision {
        self.request_closing(DeferredAction::ExitApplication, unsaved_changes)
    }

    fn request_closing(&mut self, action: DeferredAction, unsaved_changes: bool) -> CloseDecision {
        if self.defer_action(action) {
            self.request_cancel(CancelMode::StopNow);
            return CloseDecision::Pending;
        }
        if unsaved_changes {
            CloseDecision::AskUser
        } else {
            CloseDecision::CloseNow
        }
    }

    /// Sample the running job. Stops the poller once idle.
    pub fn poll_status(&mut self) -> Option<StatusReport> {
        let job = self
            .active
            .as_mut()
            .map(|job| (job.token.as_ref(), &mut job.status_rx));
        self.poller.tick(job)
    }

    /// Runs once per job when its completion arrives. Leaves the orchestrator
    /// idle and hands back the pending follow-up. A completion that does not
    /// belong to the running job is ignored.
    pub fn on_completed(&mut self, done: JobCompletion) -> Option<Completed> {
        let matches = self.active.as_ref().is_some_and(|job| job.id == done.job_id);
        if !matches {
            tracing::warn!(job_id = done.job_id, "ignoring completion for a job that is not running");
            return None;
        }
        let mut job = self.active.take()?;
        self.poller.stop();

        // The worker's last act was the send, so the thread is exiting or gone.
        if let Some(thread) = job.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }

        let next = self.slot.take();
        tracing::debug!(job_id = job.id, ?next, "job completed");
        Some(Completed {
            job_id: job.id,
            params: job.params,
            end: done.end,
            final_status: done.final_status,
            next,
        })
    }
}
