// src/services/fetcher.rs

//! Per-line disruption fetching.
//!
//! Every registered line is asked of every configured source with bounded
//! concurrency. Results are reduced to one details string per line and kept
//! in registry order.

use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    DisruptionRecord, DisruptionSet, FetcherConfig, LineDescriptor, LineRegistry, reduce_messages,
};
use crate::services::DisruptionSource;

/// Summary of a fetch pass.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Disrupted lines, in registry order
    pub set: DisruptionSet,

    /// Lines whose status could not be determined
    pub failed_lines: Vec<String>,

    pub line_total: usize,
}

impl FetchOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failed_lines.is_empty()
    }
}

/// Fetches all lines from the configured sources.
pub struct DisruptionFetcher {
    sources: Vec<Box<dyn DisruptionSource>>,
    config: FetcherConfig,
}

impl DisruptionFetcher {
    pub fn new(sources: Vec<Box<dyn DisruptionSource>>, config: FetcherConfig) -> Self {
        Self { sources, config }
    }

    /// Fetch every line in the registry.
    ///
    /// Individual line failures are reported in the outcome. Fails with
    /// [`AppError::AllFetchesFailed`] only when no line could be fetched.
    pub async fn fetch_all(&self, registry: &LineRegistry) -> Result<FetchOutcome> {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let concurrency = self.config.max_concurrent.max(1);

        let mut outcome = FetchOutcome {
            line_total: registry.len(),
            ..FetchOutcome::default()
        };
        let mut records = Vec::new();

        // `buffered` yields in input order, so records follow the registry.
        let mut line_stream = stream::iter(registry.iter())
            .map(|line| async move { (line, self.fetch_line(line).await) })
            .buffered(concurrency);

        while let Some((line, result)) = line_stream.next().await {
            match result {
                Ok(Some(details)) => {
                    log::debug!("{}: {}", line.id, details);
                    records.push(DisruptionRecord::new(&line.id, &line.name, details));
                }
                Ok(None) => log::debug!("{}: good service", line.id),
                Err(error) => {
                    log::warn!("Failed to fetch {} ({}): {}", line.name, line.id, error);
                    outcome.failed_lines.push(line.id.clone());
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        if outcome.line_total > 0 && outcome.failed_lines.len() == outcome.line_total {
            return Err(AppError::AllFetchesFailed {
                lines: outcome.line_total,
            });
        }

        outcome.set = DisruptionSet::new(records);
        log::info!(
            "Fetched {} lines: {} disrupted, {} failed",
            outcome.line_total,
            outcome.set.len(),
            outcome.failed_lines.len()
        );
        Ok(outcome)
    }

    /// Reduced details for one line across all sources. A line fails only
    /// when every source failed for it.
    async fn fetch_line(&self, line: &LineDescriptor) -> Result<Option<String>> {
        let mut messages = Vec::new();
        let mut last_error = None;
        let mut failures = 0;

        for source in &self.sources {
            match self.fetch_with_retry(source.as_ref(), line).await {
                Ok(found) => messages.extend(found),
                Err(error) => {
                    log::debug!("{} failed for {}: {}", source.name(), line.id, error);
                    failures += 1;
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if failures == self.sources.len() => Err(error),
            _ => Ok(reduce_messages(messages)),
        }
    }

    /// One attempt, plus a single retry after the backoff when rate limited.
    async fn fetch_with_retry(
        &self,
        source: &dyn DisruptionSource,
        line: &LineDescriptor,
    ) -> Result<Vec<String>> {
        match self.fetch_once(source, line).await {
            Err(error) if error.is_rate_limited() => {
                let backoff = Duration::from_millis(self.config.retry_backoff_ms);
                log::warn!(
                    "{} rate limited on {}, retrying in {}ms",
                    source.name(),
                    line.id,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
                self.fetch_once(source, line).await
            }
            other => other,
        }
    }

    async fn fetch_once(
        &self,
        source: &dyn DisruptionSource,
        line: &LineDescriptor,
    ) -> Result<Vec<String>> {
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        tokio::time::timeout(timeout, source.fetch_messages(line))
            .await
            .map_err(|_| {
                AppError::fetch(
                    format!("{} line {}", source.name(), line.id),
                    format!("timed out after {}s", timeout.as_secs()),
                )
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    enum Reply {
        Messages(Vec<&'static str>),
        Fail,
        RateLimitedOnce,
        Stall,
    }

    struct FakeSource {
        name: &'static str,
        replies: HashMap<&'static str, Reply>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(name: &'static str, replies: Vec<(&'static str, Reply)>) -> Self {
            Self {
                name,
                replies: replies.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, id: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
        }
    }

    #[async_trait]
    impl DisruptionSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_messages(&self, line: &LineDescriptor) -> Result<Vec<String>> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(line.id.clone());
                calls.iter().filter(|c| **c == line.id).count()
            };
            match self.replies.get(line.id.as_str()) {
                None => Ok(Vec::new()),
                Some(Reply::Messages(m)) => Ok(m.iter().map(|s| s.to_string()).collect()),
                Some(Reply::Fail) => Err(AppError::fetch(&line.id, "connection reset")),
                Some(Reply::RateLimitedOnce) if attempt == 1 => {
                    Err(AppError::rate_limited(&line.id))
                }
                Some(Reply::RateLimitedOnce) => Ok(vec!["Recovered".to_string()]),
                Some(Reply::Stall) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(vec!["Too late".to_string()])
                }
            }
        }
    }

    fn registry() -> LineRegistry {
        LineRegistry::new(vec![
            LineDescriptor::new("bakerloo", "Bakerloo"),
            LineDescriptor::new("central", "Central"),
            LineDescriptor::new("victoria", "Victoria"),
        ])
    }

    fn config() -> FetcherConfig {
        FetcherConfig {
            request_delay_ms: 0,
            retry_backoff_ms: 1,
            max_concurrent: 2,
            ..FetcherConfig::default()
        }
    }

    fn fetcher(sources: Vec<FakeSource>) -> DisruptionFetcher {
        DisruptionFetcher::new(
            sources
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn DisruptionSource>)
                .collect(),
            config(),
        )
    }

    #[tokio::test]
    async fn test_fetch_reduces_and_keeps_registry_order() {
        let source = FakeSource::new(
            "fake",
            vec![
                ("victoria", Reply::Messages(vec!["Minor delays", " Minor delays "])),
                ("bakerloo", Reply::Messages(vec!["Part closure", "Bus replacement"])),
            ],
        );
        let outcome = fetcher(vec![source]).fetch_all(&registry()).await.unwrap();

        let ids: Vec<&str> = outcome.set.iter().map(|r| r.line_id.as_str()).collect();
        assert_eq!(ids, vec!["bakerloo", "victoria"]);
        assert_eq!(
            outcome.set.get("bakerloo").unwrap().details,
            "Bus replacement | Part closure"
        );
        assert_eq!(outcome.set.get("victoria").unwrap().details, "Minor delays");
        assert!(!outcome.has_failures());
        assert_eq!(outcome.line_total, 3);
    }

    #[tokio::test]
    async fn test_failed_line_is_reported_not_fatal() {
        let source = FakeSource::new(
            "fake",
            vec![
                ("central", Reply::Fail),
                ("victoria", Reply::Messages(vec!["Severe delays"])),
            ],
        );
        let outcome = fetcher(vec![source]).fetch_all(&registry()).await.unwrap();

        assert_eq!(outcome.failed_lines, vec!["central".to_string()]);
        assert_eq!(outcome.set.len(), 1);
        assert!(!outcome.set.contains("central"));
    }

    #[tokio::test]
    async fn test_all_lines_failed() {
        let source = FakeSource::new(
            "fake",
            vec![
                ("bakerloo", Reply::Fail),
                ("central", Reply::Fail),
                ("victoria", Reply::Fail),
            ],
        );
        let err = fetcher(vec![source]).fetch_all(&registry()).await.unwrap_err();
        assert!(matches!(err, AppError::AllFetchesFailed { lines: 3 }));
    }

    #[tokio::test]
    async fn test_rate_limit_retried_once() {
        let fetcher = fetcher(vec![FakeSource::new(
            "fake",
            vec![("central", Reply::RateLimitedOnce)],
        )]);
        let outcome = fetcher.fetch_all(&registry()).await.unwrap();
        assert_eq!(outcome.set.get("central").unwrap().details, "Recovered");
    }

    #[tokio::test]
    async fn test_plain_failure_not_retried() {
        let source = FakeSource::new("fake", vec![("central", Reply::Fail)]);
        let fetcher = DisruptionFetcher::new(vec![], config());
        let line = LineDescriptor::new("central", "Central");

        assert!(fetcher.fetch_with_retry(&source, &line).await.is_err());
        assert_eq!(source.calls_for("central"), 1);
    }

    #[tokio::test]
    async fn test_sources_are_combined() {
        let api = FakeSource::new(
            "api",
            vec![
                ("central", Reply::Messages(vec!["Severe delays"])),
                ("victoria", Reply::Fail),
            ],
        );
        let page = FakeSource::new(
            "page",
            vec![
                ("central", Reply::Messages(vec!["Severe delays", "Station closed"])),
                ("victoria", Reply::Messages(vec!["Minor delays"])),
            ],
        );
        let outcome = fetcher(vec![api, page]).fetch_all(&registry()).await.unwrap();

        assert_eq!(
            outcome.set.get("central").unwrap().details,
            "Severe delays | Station closed"
        );
        // One source failing is not a line failure.
        assert_eq!(outcome.set.get("victoria").unwrap().details, "Minor delays");
        assert!(outcome.failed_lines.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_line_times_out_without_blocking_others() {
        let source = FakeSource::new(
            "fake",
            vec![
                ("central", Reply::Stall),
                ("victoria", Reply::Messages(vec!["Minor delays"])),
            ],
        );
        let fetcher = DisruptionFetcher::new(
            vec![Box::new(source)],
            FetcherConfig {
                timeout_secs: 5,
                ..config()
            },
        );

        let started = tokio::time::Instant::now();
        let outcome = fetcher.fetch_all(&registry()).await.unwrap();

        assert_eq!(outcome.failed_lines, vec!["central".to_string()]);
        assert_eq!(outcome.set.get("victoria").unwrap().details, "Minor delays");
        assert!(!outcome.set.contains("central"));
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let outcome = fetcher(vec![FakeSource::new("fake", vec![])])
            .fetch_all(&LineRegistry::new(vec![]))
            .await
            .unwrap();
        assert!(outcome.set.is_empty());
        assert_eq!(outcome.line_total, 0);
    }
}
