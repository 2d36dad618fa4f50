//! Human-readable status and summary lines.

use crate::metrics;
use crate::model::{OutcomeSummary, StatusSnapshot};
use std::time::Duration;

/// Status bar text for a snapshot.
pub(crate) fn status_line(snapshot: &StatusSnapshot) -> String {
    if snapshot.pending_expansion_count > 0 || !snapshot.has_canvas {
        format!(
            "{} shapes and {} expansions to do",
            snapshot.shape_count, snapshot.pending_expansion_count
        )
    } else {
        format!(
            "{} shapes, {} x {} pixels",
            snapshot.shape_count, snapshot.canvas_width, snapshot.canvas_height
        )
    }
}

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(summary: &OutcomeSummary, elapsed: Duration) -> TextSummary {
    let mut lines = vec![
        format!("Job {}: {} ({:?})", summary.job_id, summary.status, summary.action),
        format!("Variation: {}", summary.variation),
        format!(
            "Canvas: {} x {}, {} shapes",
            summary.width, summary.height, summary.shape_count
        ),
    ];
    if let Some(rate) = metrics::shape_rate(summary.shape_count, elapsed) {
        lines.push(format!(
            "Time: {:.2}s ({:.0} shapes/s)",
            elapsed.as_secs_f64(),
            rate
        ));
    }
    if summary.finished_early {
        lines.push("Finished early on request".into());
    }
    if let Some(path) = summary.saved_to.as_deref() {
        lines.push(format!("Saved: {}", path.display()));
    }
    if let Some(msg) = summary.message.as_deref() {
        lines.push(format!("Note: {msg}"));
    }
    TextSummary { lines }
}
