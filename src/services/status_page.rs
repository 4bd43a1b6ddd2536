// src/services/status_page.rs

//! Status page source.
//!
//! The public status page lists every line with a status summary and an
//! expandable details panel. The page is fetched once per run and shared by
//! all line lookups. A failed load is shared too: lines never re-request a
//! page that already failed this run.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use tokio::sync::OnceCell;

use crate::error::{AppError, Result};
use crate::models::{FetcherConfig, LineDescriptor, StatusPageConfig};
use crate::services::DisruptionSource;
use crate::utils::collapse_whitespace;

/// One line entry scraped from the status page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub name: String,
    pub status: String,
    pub details: Option<String>,
}

impl PageEntry {
    /// Text reported for this entry: the details panel, or the status
    /// summary when the panel is empty.
    pub fn message(&self) -> String {
        self.details.clone().unwrap_or_else(|| self.status.clone())
    }
}

/// Parse every entry on the page. Entries without a name or status are
/// skipped; ignored statuses are kept here and filtered by the source.
pub fn parse_status_page(html: &str, config: &StatusPageConfig) -> Result<Vec<PageEntry>> {
    let document = Html::parse_document(html);

    let entry_sel = parse_selector(&config.entry_selector)?;
    let name_sel = parse_selector(&config.name_selector)?;
    let status_sel = parse_selector(&config.status_selector)?;
    let details_sel = parse_selector(&config.details_selector)?;

    let entries = document
        .select(&entry_sel)
        .filter_map(|entry| {
            let name = first_text(&entry, &name_sel)?;
            let status = first_text(&entry, &status_sel)?;
            let details = first_text(&entry, &details_sel);
            Some(PageEntry {
                name,
                status,
                details,
            })
        })
        .collect();
    Ok(entries)
}

fn first_text(element: &ElementRef, selector: &Selector) -> Option<String> {
    let text: String = element.select(selector).next()?.text().collect::<Vec<_>>().join(" ");
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn lookup_key(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

type PageIndex = HashMap<String, Vec<String>>;

/// Source backed by the status page, fetched at most once per run.
pub struct StatusPageSource {
    client: Client,
    config: StatusPageConfig,
    retry_backoff: Duration,
    page: OnceCell<std::result::Result<PageIndex, String>>,
}

impl StatusPageSource {
    pub fn new(client: Client, config: StatusPageConfig) -> Result<Self> {
        url::Url::parse(&config.url)?;
        for selector in config.selectors() {
            parse_selector(selector)?;
        }
        Ok(Self {
            client,
            config,
            retry_backoff: Duration::from_millis(FetcherConfig::default().retry_backoff_ms),
            page: OnceCell::new(),
        })
    }

    /// Wait before the single retry after a 429.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Source over an already-downloaded page.
    pub fn from_html(config: StatusPageConfig, html: &str) -> Result<Self> {
        let index = Self::index(&config, parse_status_page(html, &config)?);
        Ok(Self {
            client: Client::new(),
            config,
            retry_backoff: Duration::ZERO,
            page: OnceCell::new_with(Some(Ok(index))),
        })
    }

    /// Disrupted entries keyed by lowercased line name.
    fn index(config: &StatusPageConfig, entries: Vec<PageEntry>) -> PageIndex {
        let mut index = PageIndex::new();
        for entry in entries {
            if config.is_ignored(&entry.status) {
                log::debug!("Ignoring '{}' status for {}", entry.status, entry.name);
                continue;
            }
            index
                .entry(lookup_key(&entry.name))
                .or_default()
                .push(entry.message());
        }
        index
    }

    /// Load the page, retrying once if the server asks us to slow down.
    async fn load_page_with_retry(&self) -> Result<PageIndex> {
        match self.load_page().await {
            Err(e) if e.is_rate_limited() => {
                log::warn!(
                    "Status page rate limited, retrying once in {}ms",
                    self.retry_backoff.as_millis()
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.load_page().await
            }
            other => other,
        }
    }

    async fn load_page(&self) -> Result<PageIndex> {
        log::debug!("GET {}", self.config.url);
        let response = self.client.get(&self.config.url).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::rate_limited("status page"));
        }
        let html = response.error_for_status()?.text().await?;

        let entries = parse_status_page(&html, &self.config)?;
        if entries.is_empty() {
            return Err(AppError::fetch(
                "status page",
                format!("no entries matched '{}'", self.config.entry_selector),
            ));
        }
        log::info!("Status page listed {} lines", entries.len());
        Ok(Self::index(&self.config, entries))
    }
}

#[async_trait]
impl DisruptionSource for StatusPageSource {
    fn name(&self) -> &str {
        "status_page"
    }

    async fn fetch_messages(&self, line: &LineDescriptor) -> Result<Vec<String>> {
        let page = self
            .page
            .get_or_init(|| async {
                self.load_page_with_retry().await.map_err(|e| {
                    log::error!("Status page unavailable for this run: {}", e);
                    e.to_string()
                })
            })
            .await;
        let index = page
            .as_ref()
            .map_err(|message| AppError::fetch("status page", message))?;
        let messages = index
            .get(&lookup_key(&line.name))
            .or_else(|| index.get(&lookup_key(&line.id)))
            .cloned()
            .unwrap_or_default();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status_line` with an empty body to every request, counting them.
    async fn serve(status_line: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}/status"), hits)
    }

    fn source_for(url: String) -> StatusPageSource {
        let config = StatusPageConfig {
            url,
            ..StatusPageConfig::default()
        };
        StatusPageSource::new(Client::new(), config)
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1))
    }

    fn lines() -> Vec<LineDescriptor> {
        vec![
            LineDescriptor::new("central", "Central"),
            LineDescriptor::new("jubilee", "Jubilee"),
            LineDescriptor::new("victoria", "Victoria"),
        ]
    }

    const PAGE: &str = r#"
        <html><body>
        <div class="disruptions-list">
          <div data-testid="headles-accordion-root-testid">
            <span data-testid="accordion-name">Central</span>
            <span data-testid="line-status">Severe delays</span>
            <div class="CustomAccordion_panel__vp6GJ">
              <p>Severe delays between
                 White City and Liverpool Street.</p>
            </div>
          </div>
          <div data-testid="headles-accordion-root-testid">
            <span data-testid="accordion-name">Hammersmith &amp; City</span>
            <span data-testid="line-status">Part closure</span>
            <div class="CustomAccordion_panel__vp6GJ"></div>
          </div>
          <div data-testid="headles-accordion-root-testid">
            <span data-testid="accordion-name">Victoria</span>
            <span data-testid="line-status">Good service</span>
          </div>
          <div data-testid="headles-accordion-root-testid">
            <span data-testid="accordion-name">DLR</span>
            <span data-testid="line-status">Information</span>
            <div class="CustomAccordion_panel__vp6GJ">Step-free access changes.</div>
          </div>
          <div data-testid="headles-accordion-root-testid">
            <span data-testid="line-status">Minor delays</span>
          </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_entries() {
        let entries = parse_status_page(PAGE, &StatusPageConfig::default()).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].name, "Central");
        assert_eq!(entries[0].status, "Severe delays");
        assert_eq!(
            entries[0].details.as_deref(),
            Some("Severe delays between White City and Liverpool Street.")
        );
        assert_eq!(entries[1].name, "Hammersmith & City");
        assert_eq!(entries[1].details, None);
        assert_eq!(entries[1].message(), "Part closure");
    }

    #[test]
    fn test_parse_rejects_bad_selector() {
        let config = StatusPageConfig {
            name_selector: "[[invalid".to_string(),
            ..StatusPageConfig::default()
        };
        assert!(parse_status_page(PAGE, &config).is_err());
    }

    #[tokio::test]
    async fn test_lookup_by_name_and_ignored_statuses() {
        let source = StatusPageSource::from_html(StatusPageConfig::default(), PAGE).unwrap();

        let central = source
            .fetch_messages(&LineDescriptor::new("central", "Central"))
            .await
            .unwrap();
        assert_eq!(
            central,
            vec!["Severe delays between White City and Liverpool Street.".to_string()]
        );

        let hammersmith = source
            .fetch_messages(&LineDescriptor::new("hammersmith-city", "hammersmith & city"))
            .await
            .unwrap();
        assert_eq!(hammersmith, vec!["Part closure".to_string()]);

        for (id, name) in [("victoria", "Victoria"), ("dlr", "DLR"), ("tram", "Tram")] {
            let messages = source
                .fetch_messages(&LineDescriptor::new(id, name))
                .await
                .unwrap();
            assert!(messages.is_empty(), "{id} should report good service");
        }
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_id() {
        let source = StatusPageSource::from_html(StatusPageConfig::default(), PAGE).unwrap();
        let messages = source
            .fetch_messages(&LineDescriptor::new("central", "Central Line"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_is_requested_once_per_run() {
        let (url, hits) = serve("503 Service Unavailable").await;
        let source = source_for(url);

        let lines = lines();
        let results =
            futures::future::join_all(lines.iter().map(|line| source.fetch_messages(line))).await;

        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A later lookup reuses the cached failure.
        assert!(source.fetch_messages(&lines[0]).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried_once_per_run() {
        let (url, hits) = serve("429 Too Many Requests").await;
        let source = source_for(url);

        for line in lines() {
            let err = source.fetch_messages(&line).await.unwrap_err();
            assert!(!err.is_rate_limited());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_validates_config() {
        let config = StatusPageConfig {
            url: "nope".to_string(),
            ..StatusPageConfig::default()
        };
        assert!(StatusPageSource::new(Client::new(), config).is_err());
        assert!(StatusPageSource::new(Client::new(), StatusPageConfig::default()).is_ok());
    }
}
