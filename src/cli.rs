use crate::engine::demo::DemoEngine;
use crate::engine::JobCompletion;
use crate::model::{JobParameters, RenderAction, StudioEvent, MAX_CANVAS_SIDE};
use crate::orchestrator::{self, Session, UiCommand};
use crate::prefs::Prefs;
use crate::{storage, text_summary, variation};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ActionArg {
    Render,
    SaveRaster,
    SaveVector,
    Animate,
}

impl From<ActionArg> for RenderAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Render => RenderAction::Render,
            ActionArg::SaveRaster => RenderAction::SaveRaster,
            ActionArg::SaveVector => RenderAction::SaveVector,
            ActionArg::Animate => RenderAction::Animate,
        }
    }
}

fn parse_variation(s: &str) -> Result<i64, String> {
    variation::from_code(s).ok_or_else(|| format!("'{s}' is not a variation code (1-6 letters)"))
}

fn parse_side(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(v) if (1..=MAX_CANVAS_SIDE).contains(&v) => Ok(v),
        _ => Err(format!("'{s}' is not a canvas side (1-{MAX_CANVAS_SIDE} pixels)")),
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "cfdg-studio",
    version,
    about = "Generative-art renderer with a cancellable background worker"
)]
pub struct Cli {
    /// Print a text summary and exit (no TUI). Ctrl-C finishes up; press again to stop now.
    #[arg(long)]
    pub text: bool,

    /// Print the outcome as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Job to run in text/JSON mode
    #[arg(long, value_enum, default_value_t = ActionArg::Render)]
    pub action: ActionArg,

    /// Output path for save-raster, save-vector and animate jobs
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Variation code, e.g. ABC (random when omitted)
    #[arg(long, value_parser = parse_variation)]
    pub variation: Option<i64>,

    /// Canvas width in pixels
    #[arg(long, value_parser = parse_side)]
    pub width: Option<u32>,

    /// Canvas height in pixels
    #[arg(long, value_parser = parse_side)]
    pub height: Option<u32>,

    /// Smallest shape size before expansion stops
    #[arg(long)]
    pub min_size: Option<f64>,

    /// Border size around the design
    #[arg(long)]
    pub border: Option<f64>,

    /// Number of movie frames (defaults to length x frame rate from preferences)
    #[arg(long)]
    pub frames: Option<u32>,

    /// Zoom in while animating
    #[arg(long)]
    pub zoom: bool,

    /// Status poll interval
    #[arg(long)]
    pub poll_interval: Option<humantime::Duration>,

    /// Upper bound on shapes produced by the demo engine
    #[arg(long, default_value_t = 200_000)]
    pub shape_limit: usize,

    /// Base name for exported files
    #[arg(long, default_value = "design")]
    pub name: String,

    /// Ignore the preferences file
    #[arg(long)]
    pub no_prefs: bool,

    /// Start a render when the TUI launches
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub render_on_launch: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text cannot be used together"));
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, false).await;
        }
    }

    let json = args.json;
    run_headless(args, json).await
}

/// Load preferences and apply command-line overrides.
/// Returns the preferences and where they should be saved, if anywhere.
pub fn load_prefs(args: &Cli) -> Result<(Prefs, Option<PathBuf>)> {
    let (mut prefs, path) = if args.no_prefs {
        (Prefs::default(), None)
    } else {
        match Prefs::default_path() {
            Some(path) => (
                Prefs::load_from(&path).context("failed to load preferences")?,
                Some(path),
            ),
            None => (Prefs::default(), None),
        }
    };
    if let Some(w) = args.width {
        prefs.default_width = w;
    }
    if let Some(h) = args.height {
        prefs.default_height = h;
    }
    if let Some(m) = args.min_size {
        prefs.minimum_size = m;
    }
    if let Some(b) = args.border {
        prefs.border_size = b;
    }
    if args.zoom {
        prefs.animate_zoom = true;
    }
    if let Some(interval) = args.poll_interval {
        prefs.poll_interval = Duration::from(interval).max(Duration::from_millis(1));
    }
    Ok((prefs, path))
}

/// Build the control-thread session shared by every front end.
pub fn build_session(
    args: &Cli,
    prefs: Prefs,
    prefs_path: Option<PathBuf>,
    event_tx: mpsc::UnboundedSender<StudioEvent>,
) -> (
    Session<DemoEngine>,
    mpsc::UnboundedReceiver<JobCompletion>,
) {
    let engine = Arc::new(DemoEngine::new(args.shape_limit));
    let start_variation = args.variation.unwrap_or_else(variation::random);
    Session::new(engine, prefs, prefs_path, args.name.clone(), start_variation, event_tx)
}

/// Parameters and output target for a single headless job.
fn headless_job(args: &Cli, prefs: &Prefs, variation: i64) -> (JobParameters, Option<PathBuf>) {
    let mut params = prefs.render_params(variation);
    params.action = args.action.into();
    params.suppress_display = true;
    if let Some(frames) = args.frames {
        params.animate_frame_count = frames.max(1);
    }

    let ext = match params.action {
        RenderAction::Render => return (params, None),
        RenderAction::SaveRaster => "ppm",
        RenderAction::SaveVector => "svg",
        RenderAction::Animate => "frames",
    };
    let output = args.output.clone().unwrap_or_else(|| {
        let dir = prefs
            .export_dir
            .clone()
            .unwrap_or_else(storage::default_export_dir);
        storage::export_path(&dir, &args.name, prefs.append_variation.then_some(variation), ext)
    });
    (params, Some(output))
}

/// Run one job without a UI, then close the session.
async fn run_headless(args: Cli, json: bool) -> Result<()> {
    let (prefs, _) = load_prefs(&args)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StudioEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let variation = args.variation.unwrap_or_else(variation::random);
    let (params, output) = headless_job(&args, &prefs, variation);
    // Headless runs never write preferences back.
    let (session, done_rx) = build_session(&args, prefs, None, event_tx);
    let controller = tokio::spawn(orchestrator::run_controller(session, done_rx, cmd_rx));

    let _ = cmd_tx.send(UiCommand::StartJob { params, output });
    let started = Instant::now();

    // Each Ctrl-C moves the job one step: finish up, then stop now.
    let signal_cmd = cmd_tx.clone();
    let signal_out = out_tx.clone();
    let signals = tokio::spawn(async move {
        let mut presses = 0u32;
        while tokio::signal::ctrl_c().await.is_ok() {
            presses += 1;
            let msg = if presses == 1 {
                "Finishing up… press Ctrl-C again to stop now"
            } else {
                "Stopping now…"
            };
            let _ = signal_out.send(OutputLine::Stderr(msg.into()));
            if signal_cmd.send(UiCommand::Escalate).is_err() {
                break;
            }
        }
    });

    let mut failure: Option<String> = None;
    while let Some(ev) = event_rx.recv().await {
        match ev {
            StudioEvent::Status {
                snapshot, progress, ..
            } => {
                if !json {
                    let line = match progress {
                        Some(p) => format!("{} ({p}%)", text_summary::status_line(&snapshot)),
                        None => text_summary::status_line(&snapshot),
                    };
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
            }
            StudioEvent::JobFinished { summary, .. } => {
                if summary.status == "failed" {
                    failure = summary.message.clone();
                }
                if json {
                    let out = serde_json::to_string_pretty(&*summary)?;
                    let _ = out_tx.send(OutputLine::Stdout(out));
                } else {
                    let lines =
                        text_summary::build_text_summary(&summary, started.elapsed()).lines;
                    for line in lines {
                        let _ = out_tx.send(OutputLine::Stdout(line));
                    }
                }
                let _ = cmd_tx.send(UiCommand::Close { unsaved: false });
            }
            StudioEvent::Info(info) => {
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
            }
            StudioEvent::JobStarted { job_id, params } => {
                tracing::info!(
                    job_id,
                    action = ?params.action,
                    variation = %variation::to_code(params.variation),
                    "job started"
                );
            }
            StudioEvent::WindowClosed | StudioEvent::ApplicationExited => break,
            StudioEvent::Button(_)
            | StudioEvent::SizeDialogRequested { .. }
            | StudioEvent::CloseConfirmation => {}
        }
    }

    signals.abort();
    controller
        .await
        .context("controller task failed")?
        .context("render session failed")?;
    drop(out_tx);
    let _ = out_handle.await;

    match failure {
        Some(msg) => Err(anyhow::anyhow!("render failed: {msg}")),
        None => Ok(()),
    }
}
