use std::fs;
use std::path::Path;

use sitevault_config::ArchiveLayout;
use sitevault_events::{EventBus, EventStream, JobProgress};
use sitevault_pipeline::{
    JobRequest, ManifestEntry, PipelineError, ResourceDescriptor, ResourcePipeline,
    report_into_result,
};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::cli::{OutputFormat, RunArgs};
use crate::context::{AppContext, CliError, CliResult};
use crate::output::{progress_line, render_job_report};

pub(crate) async fn handle_run(
    ctx: &AppContext,
    args: RunArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let mut config = ctx.config.clone();
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    let descriptors = load_manifest(&args.manifest, &config.layout)?;
    let document = match &args.document {
        Some(path) => Some(fs::read_to_string(path).map_err(|err| {
            CliError::validation(format!("cannot read document {}: {err}", path.display()))
        })?),
        None => None,
    };

    let mut pipeline = ResourcePipeline::new(config).map_err(|err| match err {
        PipelineError::Config { .. } => CliError::validation(err.cause()),
        other => CliError::failure(other),
    })?;
    if let Some(metrics) = &ctx.metrics {
        pipeline = pipeline.with_metrics(metrics.clone());
    }
    let bus = args.events.then(EventBus::new);
    if let Some(bus) = &bus {
        pipeline = pipeline.with_events(bus.clone());
    }

    let mut request = JobRequest::new(descriptors, &args.output);
    if let Some(html) = document {
        request = request.with_document(html);
    }
    let job = pipeline.prepare(request);
    drop(pipeline);
    let watcher = bus.map(|bus| tokio::spawn(stream_events(bus.subscribe(None))));
    let show_progress = watcher.is_none();
    let cancel = job.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling job");
            cancel.cancel();
        }
    });

    info!(job_id = %job.id(), root = %args.output.display(), "starting job");
    let report = job
        .run(move |progress: &JobProgress| {
            if show_progress {
                eprintln!("{}", progress_line(progress));
            }
        })
        .await;
    interrupt.abort();
    if let Some(watcher) = watcher {
        let streamed = watcher.await.map_err(CliError::failure)?;
        debug!(streamed, "event stream drained");
    }

    render_job_report(&report, format)?;
    report_into_result(report)
        .map(|_| ())
        .map_err(CliError::failure)
}

/// Print every event as one JSON line on stderr until the bus closes.
///
/// Returns the number of events printed.
pub(crate) async fn stream_events(mut stream: EventStream) -> usize {
    let mut printed = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(envelope) => match serde_json::to_string(&envelope) {
                Ok(line) => {
                    eprintln!("{line}");
                    printed += 1;
                }
                Err(err) => warn!(error = %err, "event could not be encoded"),
            },
            Err(err) => warn!(error = %err, "event stream lagged"),
        }
    }
    printed
}

/// Read a JSON manifest and resolve each entry into a descriptor.
pub(crate) fn load_manifest(
    path: &Path,
    layout: &ArchiveLayout,
) -> CliResult<Vec<ResourceDescriptor>> {
    let text = fs::read_to_string(path).map_err(|err| {
        CliError::validation(format!("cannot read manifest {}: {err}", path.display()))
    })?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&text).map_err(|err| {
        CliError::validation(format!("invalid manifest {}: {err}", path.display()))
    })?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.into_descriptor(layout))
        .collect())
}
