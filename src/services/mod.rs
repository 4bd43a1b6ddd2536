//! Service layer for the watcher.
//!
//! This module contains the I/O-facing parts of a cycle:
//! - Upstream disruption sources (`ApiSource`, `StatusPageSource`)
//! - Per-line fetching with retry and bounded concurrency (`DisruptionFetcher`)
//! - Message delivery (`SlackNotifier`, `ConsoleNotifier`)

mod api;
mod fetcher;
mod notifier;
mod status_page;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Config, LineDescriptor, SourceKind};

pub use api::ApiSource;
pub use fetcher::{DisruptionFetcher, FetchOutcome};
pub use notifier::{ConsoleNotifier, Notifier, SlackCredentials, SlackNotifier};
pub use status_page::{PageEntry, StatusPageSource, parse_status_page};

/// An upstream that reports disruption messages per line.
#[async_trait]
pub trait DisruptionSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Raw disruption messages for one line. An empty vector means good
    /// service; an error means the line's status is unknown.
    async fn fetch_messages(&self, line: &LineDescriptor) -> Result<Vec<String>>;
}

/// Build the configured sources, sharing one HTTP client.
pub fn build_sources(
    config: &Config,
    client: &reqwest::Client,
) -> Result<Vec<Box<dyn DisruptionSource>>> {
    let mut sources: Vec<Box<dyn DisruptionSource>> = Vec::new();
    for kind in &config.fetcher.sources {
        match kind {
            SourceKind::Api => {
                sources.push(Box::new(ApiSource::new(client.clone(), &config.api.base_url)?))
            }
            SourceKind::StatusPage => sources.push(Box::new(
                StatusPageSource::new(client.clone(), config.status_page.clone())?
                    .with_retry_backoff(Duration::from_millis(config.fetcher.retry_backoff_ms)),
            )),
        }
    }
    Ok(sources)
}
