use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier assigned to each job at start time.
pub type JobId = u64;

/// Largest canvas side, in pixels, a job may request.
pub const MAX_CANVAS_SIDE: u32 = 16_384;

/// What a job computes and where its output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderAction {
    Render,
    SaveRaster,
    SaveVector,
    Animate,
}

impl RenderAction {
    /// Whether the job paints a raster canvas the UI can display.
    pub fn has_canvas(self) -> bool {
        matches!(self, RenderAction::Render | RenderAction::SaveRaster | RenderAction::Animate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    pub width: u32,
    pub height: u32,
    pub minimum_size: f64,
    pub border_size: f64,
    pub variation: i64,
    pub action: RenderAction,
    pub periodic_update: bool,
    pub suppress_display: bool,
    pub animate_frame_count: u32,
    pub animate_zoom: bool,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            minimum_size: 0.3,
            border_size: 2.0,
            variation: 1,
            action: RenderAction::Render,
            periodic_update: true,
            suppress_display: false,
            animate_frame_count: 0,
            animate_zoom: false,
        }
    }
}

/// Point-in-time progress report produced by a running job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub shape_count: i64,
    pub pending_expansion_count: i64,
    pub is_writing_output: bool,
    pub output_done: i64,
    pub output_total: i64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub has_canvas: bool,
}

/// RGB8 pixel buffer, immutable once the job that painted it has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl Canvas {
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels.get(i..i + 3).map(|p| [p[0], p[1], p[2]])
    }
}

#[derive(Debug, Clone)]
pub enum Artifact {
    None,
    Raster(Canvas),
    Vector(String),
    Frames(Vec<Canvas>),
}

impl Artifact {
    /// The canvas suitable for display: the raster itself or the last movie frame.
    pub fn display_canvas(&self) -> Option<&Canvas> {
        match self {
            Artifact::Raster(c) => Some(c),
            Artifact::Frames(frames) => frames.last(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub action: RenderAction,
    pub width: u32,
    pub height: u32,
    pub shape_count: i64,
    /// True when the job honored a FinishUp request before running out of work.
    pub finished_early: bool,
    pub artifact: Artifact,
    pub finished_utc: String,
}

/// JSON-friendly view of an outcome used by `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub job_id: JobId,
    pub status: String,
    pub action: RenderAction,
    pub width: u32,
    pub height: u32,
    pub variation: String,
    pub shape_count: i64,
    pub finished_early: bool,
    #[serde(default)]
    pub finished_utc: Option<String>,
    #[serde(default)]
    pub saved_to: Option<std::path::PathBuf>,
    #[serde(default)]
    pub message: Option<String>,
}

/// How a job ended, as seen by the control thread.
#[derive(Debug, Clone)]
pub enum JobEnd {
    Finished(RenderOutcome),
    /// StopNow was honored; whatever was painted so far may still be shown.
    Aborted(Option<RenderOutcome>),
    Failed(String),
}

/// Label state of the combined render/stop button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderButton {
    Render,
    Stop,
    StopNow,
}

impl RenderButton {
    pub fn label(self) -> &'static str {
        match self {
            RenderButton::Render => "Render",
            RenderButton::Stop => "Stop",
            RenderButton::StopNow => "Stop Now",
        }
    }
}

/// Events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum StudioEvent {
    JobStarted {
        job_id: JobId,
        params: JobParameters,
    },
    Status {
        snapshot: StatusSnapshot,
        button: RenderButton,
        frame: u8,
        progress: Option<u8>,
    },
    JobFinished {
        job_id: JobId,
        summary: Box<OutcomeSummary>,
        canvas: Option<Canvas>,
    },
    Button(RenderButton),
    Info(InfoEvent),
    SizeDialogRequested {
        width: u32,
        height: u32,
    },
    CloseConfirmation,
    WindowClosed,
    ApplicationExited,
}

/// Structured info events rendered as short status messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    /// The request was remembered and runs once the job ends.
    Busy,
    /// The request was dropped; the user has to repeat it later.
    BusyTryAgain,
    ClosePending,
    Stopped,
    Failed(String),
    ResourceUnavailable { what: String, reason: String },
    Saved { what: String, path: std::path::PathBuf },
    NothingToSave { what: String },
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Busy => "A render is in progress; the request will run when it ends".into(),
            InfoEvent::BusyTryAgain => "A render is in progress; try again when it ends".into(),
            InfoEvent::ClosePending => "Stopping render before closing…".into(),
            InfoEvent::Stopped => "Render stopped.".into(),
            InfoEvent::Failed(msg) => format!("Render failed: {msg}"),
            InfoEvent::ResourceUnavailable { what, reason } => {
                format!("{what} failed: {reason}")
            }
            InfoEvent::Saved { what, path } => {
                format!("{what} save complete: {}", path.display())
            }
            InfoEvent::NothingToSave { what } => format!("There is no {what} to save."),
        }
    }
}
