//! Control-thread session.
//!
//! Owns the orchestrator and document settings, turns UI commands into job
//! starts or deferred actions, and runs the completion dispatch.

use super::lifecycle::{CloseDecision, Completed, Orchestrator};
use super::mailbox::DeferredAction;
use super::post_process;
use crate::engine::{CancelMode, JobCompletion, RenderEngine};
use crate::error::StartError;
use crate::model::{Canvas, InfoEvent, JobParameters, RenderAction, StudioEvent};
use crate::prefs::Prefs;
use crate::{metrics, storage, variation};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant, MissedTickBehavior};

/// How long a StopNow may take before the UI is told it is still pending.
const STOP_WATCHDOG: Duration = Duration::from_secs(3);

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Fresh render at the default size.
    Render,
    /// Render again at the last render's size.
    RenderAgain,
    OpenSizeDialog,
    /// The size dialog was confirmed.
    RenderSized { width: u32, height: u32 },
    /// Start a fully specified job (headless mode).
    StartJob {
        params: JobParameters,
        output: Option<PathBuf>,
    },
    /// Render when idle, otherwise escalate the running job one level.
    RenderButton,
    /// Escalate the running job one level; nothing when idle.
    Escalate,
    Stop,
    SaveImage { path: Option<PathBuf> },
    SaveVector { path: Option<PathBuf> },
    SaveMovie { path: Option<PathBuf> },
    NextVariation,
    PrevVariation,
    SetVariation(i64),
    Close { unsaved: bool },
    Exit { unsaved: bool },
    /// Answer to a close confirmation: save first or discard.
    ConfirmClose { save: bool },
    CancelClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

pub(crate) struct Session<E: RenderEngine> {
    orch: Orchestrator<E>,
    prefs: Prefs,
    prefs_path: Option<PathBuf>,
    /// Base name for exported files.
    stem: String,
    variation: i64,
    user_changed_variation: bool,
    last_render: Option<JobParameters>,
    last_canvas: Option<Canvas>,
    export_target: Option<PathBuf>,
    awaiting_confirmation: Option<DeferredAction>,
    stop_deadline: Option<Instant>,
    event_tx: UnboundedSender<StudioEvent>,
}

impl<E: RenderEngine> Session<E> {
    pub fn new(
        engine: Arc<E>,
        prefs: Prefs,
        prefs_path: Option<PathBuf>,
        stem: impl Into<String>,
        variation: i64,
        event_tx: UnboundedSender<StudioEvent>,
    ) -> (Self, UnboundedReceiver<JobCompletion>) {
        let (orch, done_rx) = Orchestrator::new(engine, prefs.poll_interval);
        let session = Self {
            orch,
            prefs,
            prefs_path,
            stem: stem.into(),
            variation,
            user_changed_variation: false,
            last_render: None,
            last_canvas: None,
            export_target: None,
            awaiting_confirmation: None,
            stop_deadline: None,
            event_tx,
        };
        (session, done_rx)
    }

    pub fn poll_cadence(&self) -> Duration {
        self.orch.poll_cadence()
    }

    pub fn poller_running(&self) -> bool {
        self.orch.poller_running()
    }

    pub fn is_busy(&self) -> bool {
        self.orch.is_busy()
    }

    fn emit(&self, ev: StudioEvent) {
        let _ = self.event_tx.send(ev);
    }

    fn info(&self, info: InfoEvent) {
        self.emit(StudioEvent::Info(info));
    }

    /// Busy requests go to the mailbox. The user is told whether it will run
    /// later or was refused because a close is pending.
    fn defer(&mut self, action: DeferredAction) {
        if !self.orch.defer_action(action) {
            return;
        }
        if self.orch.pending_action() == action {
            self.info(InfoEvent::Busy);
        } else {
            self.info(InfoEvent::ClosePending);
        }
    }

    pub fn handle_command(&mut self, cmd: UiCommand) -> Flow {
        tracing::debug!(?cmd, busy = self.is_busy(), "command");
        match cmd {
            UiCommand::Render => {
                if self.is_busy() {
                    self.defer(DeferredAction::RerunNewVariationOrSize);
                } else {
                    self.render_fresh();
                }
            }
            UiCommand::RenderAgain => {
                if self.is_busy() {
                    self.defer(DeferredAction::RerunSameSize);
                } else {
                    match self.last_render.clone() {
                        Some(mut params) => {
                            self.advance_variation();
                            params.variation = self.variation;
                            self.start_job(params, None);
                        }
                        None => self.render_fresh(),
                    }
                }
            }
            UiCommand::OpenSizeDialog => {
                if self.is_busy() {
                    self.defer(DeferredAction::OpenSizeDialog);
                } else {
                    self.emit(StudioEvent::SizeDialogRequested {
                        width: self.prefs.sized_width,
                        height: self.prefs.sized_height,
                    });
                }
            }
            UiCommand::RenderSized { width, height } => {
                if self.is_busy() {
                    self.defer(DeferredAction::OpenSizeDialog);
                } else {
                    self.prefs.sized_width = width;
                    self.prefs.sized_height = height;
                    let mut params = self.prefs.render_params(self.variation);
                    params.width = width;
                    params.height = height;
                    self.user_changed_variation = false;
                    self.start_job(params, None);
                }
            }
            UiCommand::StartJob { params, output } => {
                if self.is_busy() {
                    self.info(InfoEvent::BusyTryAgain);
                } else {
                    self.variation = params.variation;
                    self.start_job(params, output);
                }
            }
            UiCommand::RenderButton => {
                if !self.escalate() {
                    self.render_fresh();
                }
            }
            UiCommand::Escalate => {
                self.escalate();
            }
            UiCommand::Stop => {
                self.orch.request_cancel(CancelMode::StopNow);
                self.arm_watchdog();
                self.emit(StudioEvent::Button(self.orch.button()));
            }
            UiCommand::SaveImage { path } => {
                if self.last_canvas.is_none() {
                    self.info(InfoEvent::NothingToSave {
                        what: "image".into(),
                    });
                } else if self.is_busy() {
                    self.defer(DeferredAction::SaveRasterImage);
                } else {
                    self.save_image(path.as_deref());
                }
            }
            UiCommand::SaveVector { path } => {
                if self.is_busy() {
                    // Vector export has no deferred form; it must be asked for again.
                    self.info(InfoEvent::BusyTryAgain);
                } else {
                    self.save_vector(path);
                }
            }
            UiCommand::SaveMovie { path } => {
                if self.last_render.is_none() || self.last_canvas.is_none() {
                    self.info(InfoEvent::NothingToSave {
                        what: "movie".into(),
                    });
                } else if self.is_busy() {
                    self.defer(DeferredAction::SaveMovie);
                } else {
                    self.save_movie(path);
                }
            }
            UiCommand::NextVariation => self.set_variation(variation::next(self.variation)),
            UiCommand::PrevVariation => self.set_variation(variation::prev(self.variation)),
            UiCommand::SetVariation(v) => self.set_variation(v),
            UiCommand::Close { unsaved } => {
                let decision = self.orch.request_close(unsaved);
                return self.apply_close(decision, DeferredAction::CloseWindow);
            }
            UiCommand::Exit { unsaved } => {
                let decision = self.orch.request_exit(unsaved);
                return self.apply_close(decision, DeferredAction::ExitApplication);
            }
            UiCommand::ConfirmClose { save } => {
                let Some(action) = self.awaiting_confirmation.take() else {
                    return Flow::Continue;
                };
                if save {
                    self.save_prefs();
                }
                // A job may have started while the question was open.
                let decision = match action {
                    DeferredAction::ExitApplication => self.orch.request_exit(false),
                    _ => self.orch.request_close(false),
                };
                return self.apply_close(decision, action);
            }
            UiCommand::CancelClose => {
                self.awaiting_confirmation = None;
            }
        }
        Flow::Continue
    }

    fn escalate(&mut self) -> bool {
        if !self.orch.escalate() {
            return false;
        }
        self.arm_watchdog();
        self.emit(StudioEvent::Button(self.orch.button()));
        true
    }

    fn apply_close(&mut self, decision: CloseDecision, action: DeferredAction) -> Flow {
        match decision {
            CloseDecision::CloseNow => self.close(action),
            CloseDecision::Pending => {
                self.arm_watchdog();
                self.info(InfoEvent::ClosePending);
                self.emit(StudioEvent::Button(self.orch.button()));
                Flow::Continue
            }
            CloseDecision::AskUser => {
                self.awaiting_confirmation = Some(action);
                self.emit(StudioEvent::CloseConfirmation);
                Flow::Continue
            }
        }
    }

    fn close(&mut self, action: DeferredAction) -> Flow {
        tracing::info!(?action, "closing");
        if action == DeferredAction::ExitApplication {
            self.emit(StudioEvent::ApplicationExited);
        } else {
            self.emit(StudioEvent::WindowClosed);
        }
        Flow::Quit
    }

    fn set_variation(&mut self, v: i64) {
        self.variation = v.clamp(variation::MIN_VARIATION, variation::MAX_VARIATION);
        self.user_changed_variation = true;
        self.info(InfoEvent::Message(format!(
            "Variation: {}",
            variation::to_code(self.variation)
        )));
    }

    /// Moves on to the next variation unless the user picked one since the
    /// last render or nothing has been rendered yet.
    fn advance_variation(&mut self) {
        if !self.user_changed_variation && self.last_render.is_some() {
            self.variation = variation::next(self.variation);
        }
        self.user_changed_variation = false;
    }

    /// New render at the default size.
    fn render_fresh(&mut self) {
        self.advance_variation();
        let params = self.prefs.render_params(self.variation);
        self.start_job(params, None);
    }

    fn start_job(&mut self, params: JobParameters, output: Option<PathBuf>) {
        match self.orch.start(&params) {
            Ok(job_id) => {
                self.export_target = output;
                self.stop_deadline = None;
                if params.action == RenderAction::Render {
                    self.last_render = Some(params.clone());
                }
                self.emit(StudioEvent::JobStarted { job_id, params });
                self.emit(StudioEvent::Button(self.orch.button()));
            }
            Err(StartError::Busy) => self.info(InfoEvent::BusyTryAgain),
            Err(err) => {
                tracing::warn!(error = %err, "could not start job");
                self.info(InfoEvent::Failed(err.to_string()));
            }
        }
    }

    fn export_path(&self, ext: &str) -> PathBuf {
        let dir = self
            .prefs
            .export_dir
            .clone()
            .unwrap_or_else(storage::default_export_dir);
        let variation = self.prefs.append_variation.then_some(self.variation);
        storage::export_path(&dir, &self.stem, variation, ext)
    }

    fn save_image(&mut self, path: Option<&Path>) {
        let Some(canvas) = self.last_canvas.as_ref() else {
            self.info(InfoEvent::NothingToSave {
                what: "image".into(),
            });
            return;
        };
        let target = path.map_or_else(|| self.export_path("ppm"), Path::to_path_buf);
        match storage::save_raster(canvas, &target) {
            Ok(path) => self.info(InfoEvent::Saved {
                what: "Image".into(),
                path,
            }),
            Err(crate::error::JobError::ResourceUnavailable { what, reason }) => {
                self.info(InfoEvent::ResourceUnavailable { what, reason })
            }
            Err(err) => self.info(InfoEvent::Failed(err.to_string())),
        }
    }

    fn save_vector(&mut self, path: Option<PathBuf>) {
        let Some(mut params) = self.last_render.clone() else {
            self.info(InfoEvent::NothingToSave { what: "SVG".into() });
            return;
        };
        params.action = RenderAction::SaveVector;
        let target = path.unwrap_or_else(|| self.export_path("svg"));
        self.info(InfoEvent::Message("Saving SVG file...".into()));
        self.start_job(params, Some(target));
    }

    fn save_movie(&mut self, path: Option<PathBuf>) {
        let (Some(mut params), Some(_)) = (self.last_render.clone(), self.last_canvas.as_ref())
        else {
            self.info(InfoEvent::NothingToSave {
                what: "movie".into(),
            });
            return;
        };
        params.action = RenderAction::Animate;
        params.animate_frame_count = self.prefs.animate_frame_count();
        params.animate_zoom = self.prefs.animate_zoom;
        let target = path.unwrap_or_else(|| self.export_path("frames"));
        self.info(InfoEvent::Message("Saving movie.".into()));
        self.start_job(params, Some(target));
    }

    fn save_prefs(&self) {
        let Some(path) = self.prefs_path.as_deref() else {
            return;
        };
        if let Err(e) = self.prefs.save_to(path) {
            tracing::warn!(error = %e, "could not save preferences");
            self.info(InfoEvent::ResourceUnavailable {
                what: "Preferences".into(),
                reason: format!("{e:#}"),
            });
        }
    }

    fn arm_watchdog(&mut self) {
        if self.is_busy() && self.stop_deadline.is_none() {
            self.stop_deadline = Some(Instant::now() + STOP_WATCHDOG);
        }
    }

    /// Poller tick: forward a snapshot if one was published.
    pub fn tick(&mut self) {
        if let Some(report) = self.orch.poll_status() {
            self.emit(StudioEvent::Status {
                snapshot: report.snapshot,
                button: self.orch.button(),
                frame: report.frame,
                progress: report.progress,
            });
        }
        if let Some(deadline) = self.stop_deadline {
            if Instant::now() >= deadline && self.is_busy() {
                self.info(InfoEvent::Message("Still stopping…".into()));
                self.stop_deadline = None;
            }
        }
    }

    /// Completion handler. A pending close or exit supersedes everything else,
    /// including reporting on the job that just ended.
    pub fn handle_completion(&mut self, done: JobCompletion) -> Flow {
        let Some(completed) = self.orch.on_completed(done) else {
            return Flow::Continue;
        };
        self.stop_deadline = None;
        let Completed {
            job_id,
            params,
            end,
            final_status,
            next,
        } = completed;

        if next.is_closing() {
            return self.close(next);
        }

        // Last word from the worker; the poller may have missed it.
        let progress = if final_status.is_writing_output {
            metrics::progress_percent(final_status.output_done, final_status.output_total)
        } else {
            None
        };
        self.emit(StudioEvent::Status {
            snapshot: final_status,
            button: self.orch.button(),
            frame: 0,
            progress,
        });

        let export = self.export_target.take();
        let processed = post_process::process_job_end(job_id, &params, end, export.as_deref());
        if let Some(canvas) = processed.canvas.clone() {
            self.last_canvas = Some(canvas);
        }
        for info in processed.info {
            self.info(info);
        }
        self.emit(StudioEvent::JobFinished {
            job_id,
            summary: Box::new(processed.summary),
            canvas: processed.canvas,
        });
        self.emit(StudioEvent::Button(self.orch.button()));

        let follow_up = match next {
            DeferredAction::RerunSameSize => Some(UiCommand::RenderAgain),
            DeferredAction::RerunNewVariationOrSize => Some(UiCommand::Render),
            DeferredAction::OpenSizeDialog => Some(UiCommand::OpenSizeDialog),
            DeferredAction::SaveRasterImage => Some(UiCommand::SaveImage { path: None }),
            DeferredAction::SaveMovie => Some(UiCommand::SaveMovie { path: None }),
            DeferredAction::None
            | DeferredAction::CloseWindow
            | DeferredAction::ExitApplication => None,
        };
        match follow_up {
            Some(cmd) => self.handle_command(cmd),
            None => Flow::Continue,
        }
    }
}

/// Drive a session from UI commands, worker completions and the status poller
/// until the window closes. Returns once nothing can touch the session anymore.
pub(crate) async fn run_controller<E: RenderEngine>(
    mut session: Session<E>,
    mut done_rx: UnboundedReceiver<JobCompletion>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(session.poll_cadence());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ui_gone = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !ui_gone => {
                let flow = match cmd {
                    Some(cmd) => session.handle_command(cmd),
                    None => {
                        // UI went away without closing; run the exit handshake.
                        ui_gone = true;
                        session.handle_command(UiCommand::Exit { unsaved: false })
                    }
                };
                if flow == Flow::Quit {
                    break;
                }
            }
            Some(done) = done_rx.recv() => {
                if session.handle_completion(done) == Flow::Quit {
                    break;
                }
            }
            _ = ticker.tick(), if session.poller_running() => {
                session.tick();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Behaviour, GatedEngine};
    use crate::model::StatusSnapshot;
    use tokio::sync::mpsc;

    struct Harness {
        session: Session<GatedEngine>,
        done_rx: UnboundedReceiver<JobCompletion>,
        events: UnboundedReceiver<StudioEvent>,
        engine: Arc<GatedEngine>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(engine: Arc<GatedEngine>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let prefs = Prefs {
                default_width: 16,
                default_height: 12,
                export_dir: Some(dir.path().to_path_buf()),
                poll_interval: Duration::from_millis(5),
                ..Default::default()
            };
            let (event_tx, events) = mpsc::unbounded_channel();
            let prefs_path = Some(dir.path().join("prefs.json"));
            let (session, done_rx) =
                Session::new(engine.clone(), prefs, prefs_path, "design", 10, event_tx);
            Self {
                session,
                done_rx,
                events,
                engine,
                _dir: dir,
            }
        }

        async fn complete(&mut self) -> Flow {
            let done = self.done_rx.recv().await.expect("completion");
            self.session.handle_completion(done)
        }

        fn drain(&mut self) -> Vec<StudioEvent> {
            let mut out = Vec::new();
            while let Ok(ev) = self.events.try_recv() {
                out.push(ev);
            }
            out
        }
    }

    fn started(events: &[StudioEvent]) -> Vec<JobParameters> {
        events
            .iter()
            .filter_map(|ev| match ev {
                StudioEvent::JobStarted { params, .. } => Some(params.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn deferred_rerun_starts_automatically_after_completion() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        assert!(h.session.is_busy());

        // A second render request while busy is deferred, not started.
        h.session.handle_command(UiCommand::RenderAgain);
        assert_eq!(h.session.orch.pending_action(), DeferredAction::RerunSameSize);
        assert_eq!(started(&h.drain()).len(), 1);

        h.engine.release();
        assert_eq!(h.complete().await, Flow::Continue);
        let events = h.drain();
        let restarted = started(&events);
        assert_eq!(restarted.len(), 1);
        assert_eq!(restarted[0].action, RenderAction::Render);
        assert_eq!((restarted[0].width, restarted[0].height), (16, 12));
        assert!(h.session.is_busy());
        assert_eq!(h.session.orch.pending_action(), DeferredAction::None);

        assert_eq!(h.complete().await, Flow::Continue);
        assert!(!h.session.is_busy());
    }

    #[tokio::test]
    async fn close_while_busy_waits_for_worker_and_skips_other_actions() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.session.handle_command(UiCommand::SaveImage { path: None });

        assert_eq!(
            h.session.handle_command(UiCommand::Close { unsaved: true }),
            Flow::Continue
        );
        let events = h.drain();
        assert!(events
            .iter()
            .any(|ev| matches!(ev, StudioEvent::Info(InfoEvent::ClosePending))));
        assert!(!events.iter().any(|ev| matches!(ev, StudioEvent::WindowClosed)));

        // A lesser request cannot displace the close.
        h.session.handle_command(UiCommand::RenderAgain);

        assert_eq!(h.complete().await, Flow::Quit);
        let events = h.drain();
        assert!(matches!(events.last(), Some(StudioEvent::WindowClosed)));
        assert!(started(&events).is_empty());
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, StudioEvent::JobFinished { .. })));
    }

    #[tokio::test]
    async fn idle_close_with_unsaved_changes_asks_first() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Succeed));
        assert_eq!(
            h.session.handle_command(UiCommand::Close { unsaved: true }),
            Flow::Continue
        );
        assert!(matches!(h.drain().last(), Some(StudioEvent::CloseConfirmation)));

        h.session.handle_command(UiCommand::CancelClose);
        assert_eq!(
            h.session.handle_command(UiCommand::ConfirmClose { save: true }),
            Flow::Continue
        );

        h.session.handle_command(UiCommand::Exit { unsaved: true });
        assert_eq!(
            h.session.handle_command(UiCommand::ConfirmClose { save: true }),
            Flow::Quit
        );
        assert!(matches!(h.drain().last(), Some(StudioEvent::ApplicationExited)));
        assert!(h._dir.path().join("prefs.json").exists());
    }

    #[tokio::test]
    async fn idle_close_without_changes_closes_now() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Succeed));
        assert_eq!(
            h.session.handle_command(UiCommand::Close { unsaved: false }),
            Flow::Quit
        );
        assert!(matches!(h.drain().last(), Some(StudioEvent::WindowClosed)));
    }

    #[tokio::test]
    async fn fresh_render_advances_variation_unless_user_picked_one() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.complete().await;
        h.session.handle_command(UiCommand::Render);
        h.complete().await;
        h.session.handle_command(UiCommand::SetVariation(3));
        h.session.handle_command(UiCommand::Render);
        h.complete().await;
        h.session.handle_command(UiCommand::RenderAgain);
        h.complete().await;

        let variations: Vec<i64> = started(&h.drain()).iter().map(|p| p.variation).collect();
        assert_eq!(variations, vec![10, 11, 3, 4]);
    }

    #[tokio::test]
    async fn render_again_keeps_the_size_and_moves_to_the_next_variation() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.complete().await;
        h.session.handle_command(UiCommand::RenderAgain);
        h.complete().await;
        h.session.handle_command(UiCommand::RenderSized {
            width: 40,
            height: 30,
        });
        h.complete().await;
        h.session.handle_command(UiCommand::RenderAgain);
        h.complete().await;

        let sizes: Vec<(i64, u32, u32)> = started(&h.drain())
            .iter()
            .map(|p| (p.variation, p.width, p.height))
            .collect();
        assert_eq!(
            sizes,
            vec![(10, 16, 12), (11, 16, 12), (11, 40, 30), (12, 40, 30)]
        );
    }

    #[tokio::test]
    async fn final_snapshot_is_forwarded_before_the_job_finishes() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.complete().await;

        let events = h.drain();
        let finished = events
            .iter()
            .position(|ev| matches!(ev, StudioEvent::JobFinished { .. }))
            .expect("job finished");
        let statuses: Vec<(usize, &StudioEvent)> = events
            .iter()
            .enumerate()
            .filter(|(_, ev)| matches!(ev, StudioEvent::Status { .. }))
            .collect();
        assert_eq!(statuses.len(), 1);
        let (at, status) = statuses[0];
        assert!(at < finished);
        match status {
            StudioEvent::Status {
                snapshot, button, ..
            } => {
                assert_eq!(snapshot.pending_expansion_count, 1);
                assert_eq!(*button, crate::model::RenderButton::Render);
            }
            other => panic!("expected the final status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn busy_notices_say_whether_the_request_will_run() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.drain();

        let notice = |h: &mut Harness, cmd: UiCommand| {
            h.session.handle_command(cmd);
            h.drain().into_iter().find_map(|ev| match ev {
                StudioEvent::Info(info) => Some(info),
                _ => None,
            })
        };
        assert_eq!(notice(&mut h, UiCommand::RenderAgain), Some(InfoEvent::Busy));
        assert_eq!(
            notice(&mut h, UiCommand::SaveVector { path: None }),
            Some(InfoEvent::BusyTryAgain)
        );
        let params = h.session.prefs.render_params(5);
        assert_eq!(
            notice(&mut h, UiCommand::StartJob { params, output: None }),
            Some(InfoEvent::BusyTryAgain)
        );
        assert_eq!(
            notice(&mut h, UiCommand::Close { unsaved: false }),
            Some(InfoEvent::ClosePending)
        );
        // Refused by the pending close, so it must not claim to run later.
        assert_eq!(
            notice(&mut h, UiCommand::OpenSizeDialog),
            Some(InfoEvent::ClosePending)
        );
        assert_eq!(h.session.orch.pending_action(), DeferredAction::CloseWindow);

        assert_eq!(h.complete().await, Flow::Quit);
    }

    #[tokio::test]
    async fn saves_with_nothing_to_save_are_refused_even_while_busy() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.session.handle_command(UiCommand::SaveImage { path: None });
        h.session.handle_command(UiCommand::SaveMovie { path: None });

        let refused: Vec<String> = h
            .drain()
            .into_iter()
            .filter_map(|ev| match ev {
                StudioEvent::Info(InfoEvent::NothingToSave { what }) => Some(what),
                _ => None,
            })
            .collect();
        assert_eq!(refused, vec!["image".to_string(), "movie".to_string()]);
        assert_eq!(h.session.orch.pending_action(), DeferredAction::None);

        h.engine.release();
        h.complete().await;
        let events = h.drain();
        assert!(started(&events).is_empty());
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, StudioEvent::Info(InfoEvent::Saved { .. }))));
    }

    #[tokio::test]
    async fn size_dialog_is_deferred_then_requested() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.session.handle_command(UiCommand::OpenSizeDialog);
        h.engine.release();
        h.complete().await;
        let events = h.drain();
        assert!(events.iter().any(|ev| matches!(
            ev,
            StudioEvent::SizeDialogRequested {
                width: 1024,
                height: 768
            }
        )));

        h.session.handle_command(UiCommand::RenderSized {
            width: 40,
            height: 30,
        });
        let params = started(&h.drain());
        assert_eq!((params[0].width, params[0].height), (40, 30));
        h.complete().await;
    }

    #[tokio::test]
    async fn deferred_image_save_writes_the_finished_canvas() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::SaveImage { path: None });
        assert!(h
            .drain()
            .iter()
            .any(|ev| matches!(ev, StudioEvent::Info(InfoEvent::NothingToSave { .. }))));

        h.session.handle_command(UiCommand::Render);
        h.engine.release();
        h.complete().await;

        h.engine.open.store(false, std::sync::atomic::Ordering::SeqCst);
        h.session.handle_command(UiCommand::RenderAgain);
        h.session.handle_command(UiCommand::SaveImage { path: None });
        assert_eq!(h.session.orch.pending_action(), DeferredAction::SaveRasterImage);
        h.drain();
        h.engine.release();
        h.complete().await;

        let saved: Vec<PathBuf> = h
            .drain()
            .into_iter()
            .filter_map(|ev| match ev {
                StudioEvent::Info(InfoEvent::Saved { path, .. }) => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].exists());
        assert!(saved[0].to_string_lossy().ends_with("design-k.ppm"));
    }

    #[tokio::test]
    async fn deferred_movie_starts_an_animation_job() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Render);
        h.complete().await;

        h.engine.open.store(false, std::sync::atomic::Ordering::SeqCst);
        h.session.handle_command(UiCommand::RenderAgain);
        h.session.handle_command(UiCommand::SaveMovie { path: None });
        h.engine.release();
        h.complete().await;

        let params = started(&h.drain());
        let movie = params.last().expect("movie job");
        assert_eq!(movie.action, RenderAction::Animate);
        assert_eq!(movie.animate_frame_count, 60);
        h.complete().await;
    }

    #[tokio::test]
    async fn render_button_escalates_then_restarts() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::RenderButton);
        assert!(h.session.is_busy());
        h.session.handle_command(UiCommand::RenderButton);
        h.session.handle_command(UiCommand::RenderButton);
        h.complete().await;

        let events = h.drain();
        assert!(events
            .iter()
            .any(|ev| matches!(ev, StudioEvent::Info(InfoEvent::Stopped))));
        let buttons: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                StudioEvent::Button(b) => Some(*b),
                _ => None,
            })
            .collect();
        use crate::model::RenderButton as B;
        assert_eq!(buttons, vec![B::Stop, B::StopNow, B::StopNow, B::Render]);

        h.session.handle_command(UiCommand::RenderButton);
        assert!(h.session.is_busy());
        h.session.handle_command(UiCommand::Stop);
        h.complete().await;
    }

    #[tokio::test]
    async fn escalate_never_starts_a_render() {
        let mut h = Harness::new(GatedEngine::new(Behaviour::Succeed));
        h.session.handle_command(UiCommand::Escalate);
        assert!(!h.session.is_busy());
        assert!(h.drain().is_empty());

        h.session.handle_command(UiCommand::Render);
        h.session.handle_command(UiCommand::Escalate);
        h.session.handle_command(UiCommand::Escalate);
        h.complete().await;
        h.session.handle_command(UiCommand::Escalate);
        assert!(!h.session.is_busy());
    }

    #[tokio::test]
    async fn failed_job_is_reported_and_session_stays_usable() {
        let mut h = Harness::new(GatedEngine::open(Behaviour::Fail));
        h.session.handle_command(UiCommand::Render);
        assert_eq!(h.complete().await, Flow::Continue);
        assert!(h
            .drain()
            .iter()
            .any(|ev| matches!(ev, StudioEvent::Info(InfoEvent::Failed(_)))));
        h.session.handle_command(UiCommand::Render);
        assert!(h.session.is_busy());
        h.complete().await;
    }

    #[tokio::test]
    async fn controller_loop_forwards_status_and_closes_after_stop() {
        let engine = GatedEngine::new(Behaviour::Succeed);
        let dir = tempfile::tempdir().unwrap();
        let prefs = Prefs {
            poll_interval: Duration::from_millis(5),
            export_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (session, done_rx) = Session::new(engine, prefs, None, "design", 1, event_tx);
        let controller = tokio::spawn(run_controller(session, done_rx, cmd_rx));

        cmd_tx.send(UiCommand::Render).unwrap();
        let mut snapshot: Option<StatusSnapshot> = None;
        while snapshot.is_none() {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Some(StudioEvent::Status { snapshot: s, .. })) => snapshot = Some(s),
                Ok(Some(_)) => {}
                other => panic!("no status received: {other:?}"),
            }
        }

        cmd_tx.send(UiCommand::Close { unsaved: false }).unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller)
            .await
            .expect("controller finished")
            .expect("join")
            .expect("controller result");

        let mut rest = Vec::new();
        while let Ok(ev) = events.try_recv() {
            rest.push(ev);
        }
        assert!(matches!(rest.last(), Some(StudioEvent::WindowClosed)));
    }

    #[tokio::test]
    async fn dropped_ui_triggers_exit_handshake() {
        let engine = GatedEngine::new(Behaviour::Succeed);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let prefs = Prefs {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let (session, done_rx) = Session::new(engine, prefs, None, "design", 1, event_tx);
        let controller = tokio::spawn(run_controller(session, done_rx, cmd_rx));

        cmd_tx.send(UiCommand::Render).unwrap();
        drop(cmd_tx);
        tokio::time::timeout(Duration::from_secs(5), controller)
            .await
            .expect("controller finished")
            .expect("join")
            .expect("controller result");

        let mut last = None;
        while let Ok(ev) = events.try_recv() {
            last = Some(ev);
        }
        assert!(matches!(last, Some(StudioEvent::ApplicationExited)));
    }
}
