#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub)]

//! Shared payloads and the in-process event bus for Sitevault jobs.
//!
//! Layout: `payloads.rs` (job progress, resource kinds, event enum),
//! `routing.rs` (`EventBus` with replay support).

pub mod payloads;
pub mod routing;

pub use payloads::{
    DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, JobProgress, JobStage, OutcomeKind,
    ResourceKind, UnknownResourceKind,
};
pub use routing::{EventBus, EventStream};
