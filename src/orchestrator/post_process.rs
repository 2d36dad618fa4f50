//! Post-job processing: user messages and persistence of finished outputs.
//!
//! Runs on the control thread from the completion handler. Aborted jobs never
//! reach a writer, so a StopNow cannot leave a truncated file behind.

use crate::error::JobError;
use crate::model::{
    Artifact, Canvas, InfoEvent, JobEnd, JobId, JobParameters, OutcomeSummary, RenderAction,
    RenderOutcome,
};
use crate::storage;
use crate::variation;
use std::path::{Path, PathBuf};

/// Result of post-job processing, ready for presentation layers.
pub(crate) struct ProcessedJob {
    pub summary: OutcomeSummary,
    pub info: Vec<InfoEvent>,
    /// Canvas to display, partial if the job was stopped.
    pub canvas: Option<Canvas>,
}

pub(crate) fn process_job_end(
    job_id: JobId,
    params: &JobParameters,
    end: JobEnd,
    export_target: Option<&Path>,
) -> ProcessedJob {
    match end {
        JobEnd::Finished(outcome) => process_finished(job_id, params, outcome, export_target),
        JobEnd::Aborted(partial) => {
            let canvas = partial
                .as_ref()
                .and_then(|o| o.artifact.display_canvas().cloned());
            let mut summary = summary_from(job_id, params, "stopped", partial.as_ref());
            summary.message = Some(JobError::JobAborted.to_string());
            ProcessedJob {
                summary,
                info: vec![InfoEvent::Stopped],
                canvas,
            }
        }
        JobEnd::Failed(msg) => {
            tracing::warn!(job_id, error = %msg, "render failed");
            let mut summary = summary_from(job_id, params, "failed", None);
            summary.message = Some(JobError::JobFailed(msg.clone()).to_string());
            ProcessedJob {
                summary,
                info: vec![InfoEvent::Failed(msg)],
                canvas: None,
            }
        }
    }
}

fn process_finished(
    job_id: JobId,
    params: &JobParameters,
    outcome: RenderOutcome,
    export_target: Option<&Path>,
) -> ProcessedJob {
    let mut info = Vec::new();
    let canvas = outcome.artifact.display_canvas().cloned();
    let mut summary = summary_from(job_id, params, "finished", Some(&outcome));

    let saved = match (&outcome.action, &outcome.artifact) {
        (RenderAction::Render, _) => {
            if params.suppress_display {
                info.push(InfoEvent::Message("Done!".into()));
            }
            None
        }
        (RenderAction::SaveRaster, Artifact::Raster(c)) => {
            Some(("Image", with_target(export_target, |p| storage::save_raster(c, p))))
        }
        (RenderAction::SaveVector, Artifact::Vector(svg)) => {
            Some(("SVG", with_target(export_target, |p| storage::save_vector(svg, p))))
        }
        (RenderAction::Animate, Artifact::Frames(frames)) => Some((
            "Movie",
            with_target(export_target, |p| storage::save_movie(frames, p)),
        )),
        (action, _) => Some((
            what_for(*action),
            Err(JobError::unavailable(what_for(*action), "engine produced no output")),
        )),
    };

    match saved {
        Some((what, Ok(path))) => {
            tracing::info!(job_id, path = %path.display(), "{what} saved");
            summary.saved_to = Some(path.clone());
            info.push(InfoEvent::Saved {
                what: what.to_string(),
                path,
            });
        }
        Some((_, Err(err))) => {
            tracing::warn!(job_id, error = %err, "export failed");
            summary.message = Some(err.to_string());
            if let JobError::ResourceUnavailable { what, reason } = err {
                info.push(InfoEvent::ResourceUnavailable { what, reason });
            }
        }
        None => {}
    }

    if outcome.finished_early {
        info.push(InfoEvent::Message("Finished early.".into()));
    }

    ProcessedJob {
        summary,
        info,
        canvas,
    }
}

fn what_for(action: RenderAction) -> &'static str {
    match action {
        RenderAction::Render | RenderAction::SaveRaster => "Image",
        RenderAction::SaveVector => "SVG",
        RenderAction::Animate => "Movie",
    }
}

fn with_target(
    target: Option<&Path>,
    write: impl FnOnce(&Path) -> Result<PathBuf, JobError>,
) -> Result<PathBuf, JobError> {
    match target {
        Some(path) => write(path),
        None => Err(JobError::unavailable("Output", "no output path was given")),
    }
}

fn summary_from(
    job_id: JobId,
    params: &JobParameters,
    status: &str,
    outcome: Option<&RenderOutcome>,
) -> OutcomeSummary {
    OutcomeSummary {
        job_id,
        status: status.to_string(),
        action: params.action,
        width: outcome.map_or(params.width, |o| o.width),
        height: outcome.map_or(params.height, |o| o.height),
        variation: variation::to_code(params.variation),
        shape_count: outcome.map_or(0, |o| o.shape_count),
        finished_early: outcome.is_some_and(|o| o.finished_early),
        finished_utc: outcome
            .map(|o| o.finished_utc.clone())
            .filter(|s| !s.is_empty()),
        saved_to: None,
        message: None,
    }
}
