//! Persisted render preferences (`prefs.json` in the user config directory).

use crate::model::{JobParameters, RenderAction};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// Render size used when a render is not explicitly sized.
    pub default_width: u32,
    pub default_height: u32,
    /// Last values confirmed in the size dialog.
    pub sized_width: u32,
    pub sized_height: u32,
    pub minimum_size: f64,
    pub border_size: f64,
    pub animate_length_secs: u32,
    pub animate_frame_rate: u32,
    pub animate_zoom: bool,
    /// Append the variation code to exported file names.
    pub append_variation: bool,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub export_dir: Option<PathBuf>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            default_width: 640,
            default_height: 480,
            sized_width: 1024,
            sized_height: 768,
            minimum_size: 0.3,
            border_size: 2.0,
            animate_length_secs: 4,
            animate_frame_rate: 15,
            animate_zoom: false,
            append_variation: true,
            poll_interval: crate::orchestrator::DEFAULT_CADENCE,
            export_dir: None,
        }
    }
}

impl Prefs {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cfdg-studio").join("prefs.json"))
    }

    /// Missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read preferences {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parse preferences {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("write preferences {}", path.display()))
    }

    pub fn animate_frame_count(&self) -> u32 {
        self.animate_length_secs.saturating_mul(self.animate_frame_rate).max(1)
    }

    /// Fresh render parameters at the default size.
    pub fn render_params(&self, variation: i64) -> JobParameters {
        JobParameters {
            width: self.default_width,
            height: self.default_height,
            minimum_size: self.minimum_size,
            border_size: self.border_size,
            variation,
            action: RenderAction::Render,
            periodic_update: true,
            suppress_display: false,
            animate_frame_count: self.animate_frame_count(),
            animate_zoom: self.animate_zoom,
        }
    }
}
