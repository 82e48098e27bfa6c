//! In-memory fetcher and pipeline builders shared by integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sitevault_config::{OptimizerSettings, PipelineConfig};
use sitevault_pipeline::{FetchError, Fetcher, ResourcePipeline};

enum Reply {
    Body(Bytes),
    Status(u16),
}

/// Fetcher answering from a fixed URL table; unknown URLs are 404s.
#[derive(Default)]
pub struct MapFetcher {
    replies: HashMap<String, Reply>,
    delay: Option<Duration>,
    requested: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.replies.insert(url.to_string(), Reply::Body(body.into()));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.replies.insert(url.to_string(), Reply::Status(status));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("requested lock").clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requested
            .lock()
            .expect("requested lock")
            .push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.replies.get(url) {
            Some(Reply::Body(body)) => Ok(body.clone()),
            Some(Reply::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Configuration with the external minifier disabled.
pub fn test_config(concurrency: usize) -> PipelineConfig {
    PipelineConfig {
        concurrency,
        optimizer: OptimizerSettings {
            js_minifier: Vec::new(),
            ..OptimizerSettings::default()
        },
        ..PipelineConfig::default()
    }
}

/// Pipeline over `fetcher` with the test configuration.
pub fn pipeline(fetcher: Arc<MapFetcher>, concurrency: usize) -> anyhow::Result<ResourcePipeline> {
    Ok(ResourcePipeline::new(test_config(concurrency))?.with_fetcher(fetcher))
}
