//! Job progress tracking and observer notification.
//!
//! # Design
//! - Every mutation and the matching sink notification happen under one lock,
//!   so observers see processed counts in strictly increasing order.
//! - `percent_complete` reserves the last 10% for scoring.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sitevault_events::{Event, EventBus, JobProgress, JobStage};
use tracing::warn;
use uuid::Uuid;

const WORKER_SHARE: usize = 90;
const SCORING_PERCENT: u8 = 90;
const DONE_PERCENT: u8 = 100;

/// Observer of job progress.
///
/// Called on every stage transition and every terminal per-descriptor
/// transition. Implementations must be cheap; they run under the tracker lock.
pub trait ProgressSink: Send + Sync {
    /// Receive a progress snapshot.
    fn notify(&self, progress: &JobProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&JobProgress) + Send + Sync,
{
    fn notify(&self, progress: &JobProgress) {
        self(progress);
    }
}

/// Sink that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn notify(&self, _progress: &JobProgress) {}
}

/// Sink publishing `ProgressChanged` events for one job.
#[derive(Clone)]
pub struct EventBusSink {
    bus: EventBus,
    job_id: Uuid,
}

impl EventBusSink {
    /// Publish progress for `job_id` on `bus`.
    #[must_use]
    pub const fn new(bus: EventBus, job_id: Uuid) -> Self {
        Self { bus, job_id }
    }
}

impl ProgressSink for EventBusSink {
    fn notify(&self, progress: &JobProgress) {
        let _ = self.bus.publish(Event::ProgressChanged {
            job_id: self.job_id,
            progress: progress.clone(),
        });
    }
}

/// Fan a snapshot out to several sinks in order.
pub(crate) struct SinkChain(pub(crate) Vec<Arc<dyn ProgressSink>>);

impl ProgressSink for SinkChain {
    fn notify(&self, progress: &JobProgress) {
        for sink in &self.0 {
            sink.notify(progress);
        }
    }
}

struct TrackerState {
    progress: JobProgress,
    fetch_pending: usize,
    dispatch_complete: bool,
}

/// Shared progress state for one job.
pub(crate) struct ProgressTracker {
    state: Mutex<TrackerState>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    pub(crate) fn new(total_count: usize, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                progress: JobProgress::queued(total_count),
                fetch_pending: 0,
                dispatch_complete: false,
            }),
            sink,
        }
    }

    pub(crate) fn snapshot(&self) -> JobProgress {
        self.lock().progress.clone()
    }

    /// Publish the current snapshot without changing it.
    pub(crate) fn announce(&self) {
        let state = self.lock();
        self.sink.notify(&state.progress);
    }

    /// Move to `stage` if the state machine allows it.
    pub(crate) fn enter(&self, stage: JobStage) -> bool {
        let mut state = self.lock();
        let current = state.progress.stage;
        if !current.can_transition_to(stage) {
            warn!(from = %current, to = %stage, "ignored invalid stage transition");
            return false;
        }
        state.progress.stage = stage;
        match stage {
            JobStage::Scoring => state.progress.percent_complete = SCORING_PERCENT,
            JobStage::Done => state.progress.percent_complete = DONE_PERCENT,
            _ => {}
        }
        self.sink.notify(&state.progress);
        true
    }

    /// Enter `failed` with a single-line cause.
    pub(crate) fn fail(&self, cause: &str) -> bool {
        let mut state = self.lock();
        if !state.progress.stage.can_transition_to(JobStage::Failed) {
            return false;
        }
        state.progress.stage = JobStage::Failed;
        state.progress.failure = Some(cause.replace('\n', " "));
        self.sink.notify(&state.progress);
        true
    }

    pub(crate) fn fetch_dispatched(&self) {
        self.lock().fetch_pending += 1;
    }

    pub(crate) fn fetch_settled(&self) {
        let mut state = self.lock();
        state.fetch_pending = state.fetch_pending.saturating_sub(1);
        self.advance_after_fetching(&mut state);
    }

    /// No more descriptors will be dispatched.
    pub(crate) fn finish_dispatch(&self) {
        let mut state = self.lock();
        state.dispatch_complete = true;
        self.advance_after_fetching(&mut state);
    }

    /// Count one descriptor as processed and notify.
    pub(crate) fn resource_finished(&self) -> JobProgress {
        let mut state = self.lock();
        let progress = &mut state.progress;
        if progress.processed_count < progress.total_count {
            progress.processed_count += 1;
        }
        progress.percent_complete = worker_percent(progress.processed_count, progress.total_count);
        self.sink.notify(progress);
        progress.clone()
    }

    fn advance_after_fetching(&self, state: &mut TrackerState) {
        if state.progress.stage == JobStage::Fetching
            && state.dispatch_complete
            && state.fetch_pending == 0
        {
            state.progress.stage = JobStage::Optimizing;
            self.sink.notify(&state.progress);
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn worker_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = processed.min(total) * WORKER_SHARE / total;
    u8::try_from(percent).unwrap_or(SCORING_PERCENT)
}
