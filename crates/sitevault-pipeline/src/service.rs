//! Job orchestration: dispatch, worker pool, fallback, and scoring.
//!
//! # Design
//! - One job owns its ledger, tracker, and fault slot; nothing is shared
//!   across jobs.
//! - Workers run in a `JoinSet` bounded by a semaphore sized by configuration.
//! - Per-descriptor problems become outcomes. Only infrastructure faults
//!   (root preparation, writes inside the tree, worker panics) fail the job.
//! - Cancellation stops dispatch; in-flight workers finish before the job
//!   settles in `cancelled`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use sitevault_config::PipelineConfig;
use sitevault_events::{Event, EventBus, JobProgress, JobStage, OutcomeKind, ResourceKind};
use sitevault_telemetry::Metrics;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::archive;
use crate::error::{PipelineError, PipelineResult};
use crate::fallback::{FallbackOutcome, FallbackResolver};
use crate::fetch::{Acquire, Fetcher, FetcherExt, HttpFetcher, ValidatingFetcher};
use crate::layout::{check_destination, relink_document};
use crate::ledger::{DedupLedger, canonicalize};
use crate::model::{JobReport, JobRequest, Relocation, ResourceDescriptor, ResourceRecord};
use crate::optimizer::{CssCompressor, Optimizer};
use crate::progress::{EventBusSink, ProgressSink, ProgressTracker, SinkChain};
use crate::quality::{self, QualityReport};

/// File name of the persisted quality report.
pub const QUALITY_JSON: &str = "quality.json";
/// File name of the Markdown quality report.
pub const QUALITY_MARKDOWN: &str = "QUALITY.md";
/// File name of the per-descriptor outcome listing.
pub const RESOURCES_JSON: &str = "resources.json";

/// Handle that requests cancellation of a prepared or running job.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Request cancellation; dispatch stops and in-flight work drains.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Entry point for running resource jobs under one configuration.
#[derive(Clone)]
pub struct ResourcePipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    css: Option<Arc<dyn CssCompressor>>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl ResourcePipeline {
    /// Validate `config` and build an HTTP-backed pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config
            .validate()
            .map_err(|source| PipelineError::Config { source })?;
        let http = HttpFetcher::new(&config.user_agent, config.fetch_timeout())
            .map_err(|source| PipelineError::HttpClient { source })?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(http.with_timeout(config.fetch_timeout()));
        Ok(Self {
            config,
            fetcher,
            css: None,
            events: None,
            metrics: None,
        })
    }

    /// Replace the network fetcher; the fetch timeout still applies.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Arc::new(fetcher.with_timeout(self.config.fetch_timeout()));
        self
    }

    /// Publish job events on `bus`.
    #[must_use]
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Record counters in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the stylesheet compressor.
    #[must_use]
    pub fn with_css_compressor(mut self, compressor: Arc<dyn CssCompressor>) -> Self {
        self.css = Some(compressor);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Prepare a job; cancellation is available before it runs.
    #[must_use]
    pub fn prepare(&self, request: JobRequest) -> PipelineJob {
        let mut optimizer =
            Optimizer::new(self.config.optimizer.clone(), self.config.fetch_timeout());
        if let Some(css) = &self.css {
            optimizer = optimizer.with_css_compressor(Arc::clone(css));
        }
        PipelineJob {
            request,
            config: self.config.clone(),
            acquirer: ValidatingFetcher::new(Arc::clone(&self.fetcher), self.metrics.clone()),
            optimizer,
            resolver: FallbackResolver::new(self.config.cdn.clone()),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            cancel: CancelHandle::default(),
        }
    }
}

/// A prepared job.
pub struct PipelineJob {
    request: JobRequest,
    config: PipelineConfig,
    acquirer: ValidatingFetcher,
    optimizer: Optimizer,
    resolver: FallbackResolver,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
    cancel: CancelHandle,
}

impl PipelineJob {
    /// Identifier used in logs, events, and the report.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.request.job_id
    }

    /// Handle that cancels this job.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the job to a terminal stage, reporting progress to `sink`.
    #[instrument(name = "pipeline.job", skip_all, fields(job_id = %self.request.job_id))]
    pub async fn run<S>(self, sink: S) -> JobReport
    where
        S: ProgressSink + 'static,
    {
        let Self {
            request,
            config,
            acquirer,
            optimizer,
            resolver,
            events,
            metrics,
            cancel,
        } = self;
        let JobRequest {
            job_id,
            descriptors,
            destination_root,
            document,
        } = request;
        let total = descriptors.len();

        let mut sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(sink)];
        if let Some(bus) = &events {
            sinks.push(Arc::new(EventBusSink::new(bus.clone(), job_id)));
        }
        let context = Arc::new(JobContext {
            job_id,
            root: destination_root,
            acquirer,
            optimizer,
            resolver,
            tracker: ProgressTracker::new(total, Arc::new(SinkChain(sinks))),
            events,
            metrics,
            halt: cancel.token.child_token(),
            fault: Mutex::new(None),
        });

        context.publish(Event::JobQueued { job_id, total });
        if let Some(metrics) = &context.metrics {
            metrics.job_started();
        }
        context.tracker.announce();
        info!(total, root = %context.root.display(), "job queued");

        let run = JobRun {
            context: Arc::clone(&context),
            config,
            cancel,
        };
        let (records, relocations, quality) = run.execute(descriptors, document).await;
        let progress = context.tracker.snapshot();
        let status = progress.stage;
        match status {
            JobStage::Done => {
                let overall = quality.as_ref().map_or(0, |report| report.overall);
                context.publish(Event::JobCompleted { job_id, overall });
                info!(overall, processed = progress.processed_count, "job done");
            }
            JobStage::Cancelled => {
                context.publish(Event::JobCancelled {
                    job_id,
                    processed: progress.processed_count,
                });
                info!(processed = progress.processed_count, "job cancelled");
            }
            _ => {
                let message = progress
                    .failure
                    .clone()
                    .unwrap_or_else(|| "job failed".to_string());
                warn!(cause = %message, "job failed");
                context.publish(Event::JobFailed { job_id, message });
            }
        }
        if let Some(metrics) = &context.metrics {
            metrics.job_finished(status.as_str());
        }

        JobReport {
            job_id,
            progress,
            records,
            relocations,
            quality,
        }
    }
}

/// Run descriptors into `destination_root` with default settings.
///
/// # Errors
///
/// Returns [`PipelineError::JobFailed`] or [`PipelineError::Cancelled`] when
/// the job does not reach `done`, or a setup error for invalid arguments.
pub async fn run_pipeline<S>(
    descriptors: Vec<ResourceDescriptor>,
    destination_root: impl Into<PathBuf>,
    concurrency: usize,
    sink: S,
) -> PipelineResult<QualityReport>
where
    S: ProgressSink + 'static,
{
    let config = PipelineConfig {
        concurrency,
        ..PipelineConfig::default()
    };
    let pipeline = ResourcePipeline::new(config)?;
    let report = pipeline
        .prepare(JobRequest::new(descriptors, destination_root))
        .run(sink)
        .await;
    report_into_result(report)
}

/// Map a finished job to the quality report or the reason it has none.
///
/// # Errors
///
/// Returns [`PipelineError::JobFailed`] or [`PipelineError::Cancelled`] when
/// the job did not reach `done`.
pub fn report_into_result(report: JobReport) -> PipelineResult<QualityReport> {
    match (report.progress.stage, report.quality) {
        (JobStage::Done, Some(quality)) => Ok(quality),
        (JobStage::Cancelled, _) => Err(PipelineError::Cancelled {
            processed: report.progress.processed_count,
        }),
        (_, _) => Err(PipelineError::JobFailed {
            cause: report
                .progress
                .failure
                .unwrap_or_else(|| "job did not complete".to_string()),
        }),
    }
}

#[derive(Serialize)]
struct ResourceListing<'a> {
    job_id: Uuid,
    records: &'a [ResourceRecord],
    relocations: &'a [Relocation],
}

/// State shared by the dispatcher and every worker of one job.
struct JobContext {
    job_id: Uuid,
    root: PathBuf,
    acquirer: ValidatingFetcher,
    optimizer: Optimizer,
    resolver: FallbackResolver,
    tracker: ProgressTracker,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
    halt: CancellationToken,
    fault: Mutex<Option<String>>,
}

impl JobContext {
    fn publish(&self, event: Event) {
        if let Some(bus) = &self.events {
            let _ = bus.publish(event);
        }
    }

    /// Record the first infrastructure fault and stop dispatch.
    fn fault(&self, error: &PipelineError) {
        let cause = error.cause();
        warn!(cause = %cause, error = %error, "job fault");
        let mut slot = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(cause);
        }
        drop(slot);
        self.halt.cancel();
    }

    fn fault_cause(&self) -> Option<String> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Terminal per-descriptor transition: count, notify, and publish.
    fn finish(&self, descriptor: &ResourceDescriptor, outcome: OutcomeKind) -> JobProgress {
        let progress = self.tracker.resource_finished();
        debug!(
            url = %descriptor.source_url,
            kind = descriptor.expected_kind.as_str(),
            outcome = outcome.as_str(),
            processed = progress.processed_count,
            "resource finished"
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_resource(descriptor.expected_kind.as_str(), outcome.as_str());
        }
        self.publish(Event::ResourceFinished {
            job_id: self.job_id,
            url: descriptor.source_url.clone(),
            kind: descriptor.expected_kind,
            outcome,
        });
        progress
    }

    /// Optimize an acquired payload and count the bytes saved.
    async fn optimize(&self, bytes: Bytes, kind: ResourceKind, destination: &Path) -> Bytes {
        let optimization = self.optimizer.optimize(bytes, kind, destination).await;
        if let Some(metrics) = &self.metrics {
            metrics.add_bytes_saved(optimization.bytes_saved());
        }
        optimization.into_bytes()
    }

    /// Fetch, validate, optimize, and write one descriptor.
    async fn process(
        &self,
        descriptor: ResourceDescriptor,
        destination: PathBuf,
    ) -> ResourceRecord {
        let kind = descriptor.expected_kind;
        let acquired = self.acquirer.acquire(&descriptor.source_url, kind).await;
        self.tracker.fetch_settled();

        let (outcome, bytes, target, detail) = match acquired {
            Ok(bytes) => {
                let bytes = self.optimize(bytes, kind, &destination).await;
                (OutcomeKind::Success, Some(bytes), destination, None)
            }
            Err(failure) => {
                debug!(
                    url = %descriptor.source_url,
                    reason = failure.reason(),
                    "direct acquisition failed"
                );
                let resolution = self
                    .resolver
                    .resolve(&descriptor, &destination, &failure, &self.acquirer)
                    .await;
                let outcome = resolution.outcome_kind();
                match resolution {
                    FallbackOutcome::Substituted {
                        substitute_url,
                        bytes,
                    } => {
                        let bytes = self.optimize(bytes, kind, &destination).await;
                        (outcome, Some(bytes), destination, Some(substitute_url))
                    }
                    FallbackOutcome::Placeholder {
                        destination: placed,
                        bytes,
                        ..
                    } => (
                        outcome,
                        Some(bytes),
                        placed,
                        Some(failure.reason().to_string()),
                    ),
                    FallbackOutcome::Omitted { reason } => {
                        (outcome, None, destination, Some(reason))
                    }
                }
            }
        };

        let mut record = ResourceRecord {
            descriptor,
            outcome,
            written_path: None,
            detail,
        };
        if let Some(bytes) = bytes {
            match archive::write_atomic(&self.root, &target, &bytes).await {
                Ok(_) => record.written_path = Some(target),
                Err(error) => {
                    self.fault(&error);
                    record.outcome = OutcomeKind::Omitted;
                    record.detail = Some(error.cause());
                }
            }
        }
        self.finish(&record.descriptor, record.outcome);
        record
    }
}

/// Dispatcher for one job run.
struct JobRun {
    context: Arc<JobContext>,
    config: PipelineConfig,
    cancel: CancelHandle,
}

/// A duplicate descriptor waiting for its primary's file.
struct Alias {
    index: usize,
    primary: usize,
}

impl JobRun {
    async fn execute(
        &self,
        descriptors: Vec<ResourceDescriptor>,
        document: Option<String>,
    ) -> (Vec<ResourceRecord>, Vec<Relocation>, Option<QualityReport>) {
        let context = &self.context;
        if let Err(error) = archive::prepare_root(&context.root).await {
            context.fault(&error);
            context.tracker.fail(&error.cause());
            return (Vec::new(), Vec::new(), None);
        }
        context.tracker.enter(JobStage::Fetching);

        let (mut slots, aliases) = self.dispatch(descriptors).await;
        let mut relocations = Vec::new();
        if context.fault_cause().is_none() && !self.cancel.is_cancelled() {
            self.materialize_aliases(&mut slots, &aliases, &mut relocations)
                .await;
        }
        let records: Vec<ResourceRecord> = slots.into_iter().flatten().collect();
        let mut moved = primary_relocations(&records);
        moved.append(&mut relocations);
        let relocations = moved;

        if let Some(cause) = context.fault_cause() {
            context.tracker.fail(&cause);
            return (records, relocations, None);
        }
        if self.cancel.is_cancelled() {
            context.tracker.enter(JobStage::Cancelled);
            return (records, relocations, None);
        }

        match self.finalize(document, &records, &relocations).await {
            Ok(quality) => (records, relocations, Some(quality)),
            Err(error) => {
                context.fault(&error);
                context.tracker.fail(&error.cause());
                (records, relocations, None)
            }
        }
    }

    async fn dispatch(
        &self,
        descriptors: Vec<ResourceDescriptor>,
    ) -> (Vec<Option<ResourceRecord>>, Vec<Alias>) {
        let context = &self.context;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let ledger = DedupLedger::new();
        let mut workers = JoinSet::new();
        let mut slots: Vec<Option<ResourceRecord>> = Vec::with_capacity(descriptors.len());
        slots.resize_with(descriptors.len(), || None);
        let mut primaries: HashMap<String, usize> = HashMap::new();
        let mut aliases = Vec::new();

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            if context.halt.is_cancelled() {
                break;
            }
            if !ledger.should_process(&descriptor.source_url) {
                let canonical = canonicalize(&descriptor.source_url);
                let primary = primaries.get(&canonical).copied();
                context.finish(&descriptor, OutcomeKind::Deduplicated);
                if let Some(primary) = primary {
                    aliases.push(Alias { index, primary });
                }
                slots[index] = Some(ResourceRecord {
                    descriptor,
                    outcome: OutcomeKind::Deduplicated,
                    written_path: None,
                    detail: None,
                });
                continue;
            }
            primaries.insert(canonicalize(&descriptor.source_url), index);

            let destination = match check_destination(&descriptor.destination_path) {
                Ok(destination) => destination,
                Err(reason) => {
                    warn!(
                        url = %descriptor.source_url,
                        reason = reason.as_str(),
                        "unsafe destination"
                    );
                    context.finish(&descriptor, OutcomeKind::Omitted);
                    slots[index] = Some(ResourceRecord {
                        descriptor,
                        outcome: OutcomeKind::Omitted,
                        written_path: None,
                        detail: Some(reason.as_str().to_string()),
                    });
                    continue;
                }
            };

            let permit = tokio::select! {
                biased;
                () = context.halt.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            context.tracker.fetch_dispatched();
            let worker = Arc::clone(context);
            let span = info_span!(
                "pipeline.resource",
                url = %descriptor.source_url,
                kind = descriptor.expected_kind.as_str()
            );
            workers.spawn(
                async move {
                    let _permit = permit;
                    (index, worker.process(descriptor, destination).await)
                }
                .instrument(span),
            );
        }
        context.tracker.finish_dispatch();

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, record)) => slots[index] = Some(record),
                Err(source) => context.fault(&PipelineError::Task {
                    operation: "pipeline.worker",
                    source,
                }),
            }
        }
        (slots, aliases)
    }

    /// Give every duplicate destination a copy of its primary's file.
    async fn materialize_aliases(
        &self,
        slots: &mut [Option<ResourceRecord>],
        aliases: &[Alias],
        relocations: &mut Vec<Relocation>,
    ) {
        let root = &self.context.root;
        for alias in aliases {
            let Some(primary) = slots[alias.primary].as_ref() else {
                continue;
            };
            let primary_url = primary.descriptor.source_url.clone();
            let Some(written) = primary.written_path.clone() else {
                if let Some(record) = slots[alias.index].as_mut() {
                    record.detail = Some(format!("primary {primary_url} was not written"));
                }
                continue;
            };
            let primary_destination = check_destination(&primary.descriptor.destination_path).ok();
            let Some(record) = slots[alias.index].as_mut() else {
                continue;
            };
            record.detail = Some(format!("duplicate of {primary_url}"));
            let alias_destination = match check_destination(&record.descriptor.destination_path) {
                Ok(destination) => destination,
                Err(reason) => {
                    record.detail = Some(reason.as_str().to_string());
                    continue;
                }
            };
            if Some(&alias_destination) == primary_destination.as_ref() {
                record.written_path = Some(written);
                continue;
            }
            let target = match written.extension() {
                Some(extension) if primary_destination.as_deref() != Some(written.as_path()) => {
                    alias_destination.with_extension(extension)
                }
                _ => alias_destination.clone(),
            };
            if let Err(error) = archive::copy_within(root, &written, &target).await {
                self.context.fault(&error);
                return;
            }
            if target != alias_destination {
                relocations.push(Relocation {
                    from: alias_destination,
                    to: target.clone(),
                });
            }
            record.written_path = Some(target);
        }
    }

    /// Write the root document, score the tree, and persist the reports.
    async fn finalize(
        &self,
        document: Option<String>,
        records: &[ResourceRecord],
        relocations: &[Relocation],
    ) -> PipelineResult<QualityReport> {
        let context = &self.context;
        let root = context.root.clone();
        if let Some(html) = document {
            let html = relink_document(&html, relocations);
            archive::write_atomic(&root, Path::new(&self.config.layout.document), html.as_bytes())
                .await?;
        }

        context.tracker.enter(JobStage::Scoring);
        let layout = self.config.layout.clone();
        let policy = self.config.scoring.clone();
        let scoring_root = root.clone();
        let report = tokio::task::spawn_blocking(move || {
            quality::score_archive(&scoring_root, &layout, &policy)
        })
        .await
        .map_err(|source| PipelineError::Task {
            operation: "quality.score",
            source,
        })??;

        archive::write_json(&root, QUALITY_JSON, &report).await?;
        archive::write_atomic(
            &root,
            Path::new(QUALITY_MARKDOWN),
            quality::render_markdown(&report).as_bytes(),
        )
        .await?;
        archive::write_json(
            &root,
            RESOURCES_JSON,
            &ResourceListing {
                job_id: context.job_id,
                records,
                relocations,
            },
        )
        .await?;

        context.tracker.enter(JobStage::Done);
        Ok(report)
    }
}

/// Relocations of primaries written somewhere other than requested.
fn primary_relocations(records: &[ResourceRecord]) -> Vec<Relocation> {
    records
        .iter()
        .filter(|record| record.outcome != OutcomeKind::Deduplicated)
        .filter_map(|record| {
            let written = record.written_path.as_ref()?;
            let requested = check_destination(&record.descriptor.destination_path).ok()?;
            (requested != *written).then(|| Relocation {
                from: requested,
                to: written.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitevault_events::ResourceKind;

    fn record(destination: &str, written: Option<&str>, outcome: OutcomeKind) -> ResourceRecord {
        ResourceRecord {
            descriptor: ResourceDescriptor::new(
                "https://a.test/x",
                ResourceKind::Image,
                destination,
            ),
            outcome,
            written_path: written.map(PathBuf::from),
            detail: None,
        }
    }

    #[test]
    fn relocations_list_only_moved_primaries() {
        let records = [
            record("assets/images/a.jpg", Some("assets/images/a.svg"), OutcomeKind::Placeholder),
            record("./assets/images/b.png", Some("assets/images/b.png"), OutcomeKind::Success),
            record("assets/images/c.png", None, OutcomeKind::Omitted),
            record("img/a.jpg", Some("img/a.svg"), OutcomeKind::Deduplicated),
        ];
        let relocations = primary_relocations(&records);
        assert_eq!(
            relocations,
            vec![Relocation {
                from: PathBuf::from("assets/images/a.jpg"),
                to: PathBuf::from("assets/images/a.svg"),
            }]
        );
    }

    #[test]
    fn cancel_handle_is_shared_between_clones() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn incomplete_reports_map_to_errors() {
        let mut progress = JobProgress::queued(2);
        progress.stage = JobStage::Cancelled;
        progress.processed_count = 1;
        let report = JobReport {
            job_id: Uuid::nil(),
            progress,
            records: Vec::new(),
            relocations: Vec::new(),
            quality: None,
        };
        assert!(matches!(
            report_into_result(report),
            Err(PipelineError::Cancelled { processed: 1 })
        ));
    }
}
