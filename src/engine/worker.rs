//! Worker thread: runs one job and reports back exactly once.

use super::{JobContext, RenderEngine};
use crate::model::{JobEnd, JobId, JobParameters, StatusSnapshot};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;

/// Completion notification marshalled back onto the control thread.
#[derive(Debug)]
pub(crate) struct JobCompletion {
    pub job_id: JobId,
    pub end: JobEnd,
    pub final_status: StatusSnapshot,
}

/// Spawn a dedicated thread for one job.
///
/// The completion send is the last thing the thread does; after it the job
/// holds no resource the control thread may want to release.
pub(crate) fn spawn_worker<E: RenderEngine>(
    engine: Arc<E>,
    job_id: JobId,
    params: JobParameters,
    ctx: JobContext,
    done_tx: UnboundedSender<JobCompletion>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("render-worker-{job_id}"))
        .spawn(move || {
            tracing::debug!(job_id, action = ?params.action, "worker started");
            let end = execute(engine.as_ref(), &params, &ctx);
            let final_status = engine.snapshot(ctx.token());
            ctx.publish(final_status);
            drop(ctx);
            drop(engine);
            tracing::debug!(job_id, "worker finished");
            let _ = done_tx.send(JobCompletion {
                job_id,
                end,
                final_status,
            });
        })
}

fn execute<E: RenderEngine>(engine: &E, params: &JobParameters, ctx: &JobContext) -> JobEnd {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.run(params, ctx))) {
        // A StopNow that arrived while the engine was wrapping up still wins.
        Ok(Ok(outcome)) if ctx.stop_requested() => JobEnd::Aborted(Some(outcome)),
        Ok(Ok(outcome)) => JobEnd::Finished(outcome),
        Ok(Err(fault)) => JobEnd::Failed(fault.to_string()),
        Err(payload) => JobEnd::Failed(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_string()
    }
}
