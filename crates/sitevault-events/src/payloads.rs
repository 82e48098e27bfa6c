//! Event payload types carried across the pipeline, CLI, and telemetry layers.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event emitted by a bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Asset class a resource is expected to be.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// HTML documents and fragments.
    Html,
    /// Stylesheets.
    Css,
    /// JavaScript sources.
    Js,
    /// Raster or vector images.
    Image,
    /// Web fonts.
    Font,
    /// Anything the pipeline does not inspect.
    Other,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Html,
        Self::Css,
        Self::Js,
        Self::Image,
        Self::Font,
        Self::Other,
    ];

    /// Stable lowercase label used in logs, metrics, and manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Js => "js",
            Self::Image => "image",
            Self::Font => "font",
            Self::Other => "other",
        }
    }

    /// Whether payloads of this kind bypass content validation.
    #[must_use]
    pub const fn is_pass_through(self) -> bool {
        matches!(self, Self::Html | Self::Other)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when a resource kind label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResourceKind {
    /// Label supplied by the caller.
    pub value: String,
}

impl Display for UnknownResourceKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("unknown resource kind")
    }
}

impl std::error::Error for UnknownResourceKind {}

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "css" => Ok(Self::Css),
            "js" | "javascript" => Ok(Self::Js),
            "image" | "img" => Ok(Self::Image),
            "font" => Ok(Self::Font),
            "other" => Ok(Self::Other),
            _ => Err(UnknownResourceKind {
                value: value.to_string(),
            }),
        }
    }
}

/// Lifecycle stage of a pipeline job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Job accepted, nothing dispatched yet.
    Queued,
    /// Descriptors are being dispatched and fetched.
    Fetching,
    /// All direct fetches settled; optimization and fallbacks are draining.
    Optimizing,
    /// The finished archive is being scored.
    Scoring,
    /// Job finished; partial success is still `Done`.
    Done,
    /// Job aborted on an infrastructure fault.
    Failed,
    /// Job was cancelled before scoring started.
    Cancelled,
}

impl JobStage {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Optimizing => "optimizing",
            Self::Scoring => "scoring",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal stages never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Queued, Self::Fetching)
            | (Self::Fetching, Self::Optimizing)
            | (Self::Optimizing, Self::Scoring)
            | (Self::Scoring, Self::Done)
            | (Self::Queued | Self::Fetching | Self::Optimizing, Self::Cancelled) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl Display for JobStage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobProgress {
    /// Current lifecycle stage.
    pub stage: JobStage,
    /// Percentage in `0..=100`; never decreases within a job.
    pub percent_complete: u8,
    /// Descriptors that reached a terminal outcome.
    pub processed_count: usize,
    /// Descriptors submitted with the job.
    pub total_count: usize,
    /// Cause recorded when the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl JobProgress {
    /// Fresh progress for a job with `total_count` descriptors.
    #[must_use]
    pub const fn queued(total_count: usize) -> Self {
        Self {
            stage: JobStage::Queued,
            percent_complete: 0,
            processed_count: 0,
            total_count,
            failure: None,
        }
    }
}

/// Terminal outcome of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Direct fetch, validation, and optimization succeeded.
    Success,
    /// A pinned CDN copy replaced the original.
    Substituted,
    /// An inert placeholder was synthesized.
    Placeholder,
    /// Nothing was written; the descriptor is reported as omitted.
    Omitted,
    /// The canonical URL was already handled by another descriptor in the job.
    Deduplicated,
}

impl OutcomeKind {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Substituted => "substituted",
            Self::Placeholder => "placeholder",
            Self::Omitted => "omitted",
            Self::Deduplicated => "deduplicated",
        }
    }
}

impl Display for OutcomeKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Typed domain events surfaced by pipeline jobs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was accepted.
    JobQueued {
        /// Identifier of the job.
        job_id: Uuid,
        /// Number of descriptors submitted.
        total: usize,
    },
    /// Progress snapshot published on stage transitions and resource completions.
    ProgressChanged {
        /// Identifier of the job.
        job_id: Uuid,
        /// Snapshot of the job's progress.
        progress: JobProgress,
    },
    /// A descriptor reached its terminal outcome.
    ResourceFinished {
        /// Identifier of the job.
        job_id: Uuid,
        /// Source URL of the descriptor.
        url: String,
        /// Expected kind of the descriptor.
        kind: ResourceKind,
        /// Terminal outcome.
        outcome: OutcomeKind,
    },
    /// The job finished and the archive was scored.
    JobCompleted {
        /// Identifier of the job.
        job_id: Uuid,
        /// Overall quality score.
        overall: u8,
    },
    /// The job aborted on an infrastructure fault.
    JobFailed {
        /// Identifier of the job.
        job_id: Uuid,
        /// Human-readable cause.
        message: String,
    },
    /// The job was cancelled before scoring.
    JobCancelled {
        /// Identifier of the job.
        job_id: Uuid,
        /// Descriptors that finished before the cancellation drained.
        processed: usize,
    },
}

impl Event {
    /// Machine-friendly discriminator for stream consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::JobQueued { .. } => "job_queued",
            Self::ProgressChanged { .. } => "progress_changed",
            Self::ResourceFinished { .. } => "resource_finished",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::JobCancelled { .. } => "job_cancelled",
        }
    }

    /// Identifier of the job the event belongs to.
    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        match self {
            Self::JobQueued { job_id, .. }
            | Self::ProgressChanged { job_id, .. }
            | Self::ResourceFinished { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id, .. } => *job_id,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}
