//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ScheduleSlot;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and fetch behavior settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Line status API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Status page scraping settings
    #[serde(default)]
    pub status_page: StatusPageConfig,

    /// Poll schedule used to tell first runs from follow-ups
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Message composition and delivery policy
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Files relative to the storage directory
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.max_concurrent == 0 {
            return Err(AppError::validation("fetcher.max_concurrent must be > 0"));
        }
        if self.fetcher.sources.is_empty() {
            return Err(AppError::validation("fetcher.sources is empty"));
        }
        if self.fetcher.sources.contains(&SourceKind::Api) {
            url::Url::parse(&self.api.base_url)?;
        }
        if self.fetcher.sources.contains(&SourceKind::StatusPage) {
            url::Url::parse(&self.status_page.url)?;
            for selector in self.status_page.selectors() {
                scraper::Selector::parse(selector)
                    .map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
            }
        }
        if self.schedule.window_minutes >= 24 * 60 {
            return Err(AppError::validation(
                "schedule.window_minutes must be shorter than a day",
            ));
        }
        for slot in &self.schedule.slots {
            if slot.hour > 23 || slot.minute > 59 {
                return Err(AppError::validation(format!(
                    "schedule slot {:02}:{:02} is not a valid time",
                    slot.hour, slot.minute
                )));
            }
            if slot.block.trim().is_empty() {
                return Err(AppError::validation("schedule slot has an empty block"));
            }
        }
        if self.notify.max_details_chars == 0 {
            return Err(AppError::validation("notify.max_details_chars must be > 0"));
        }
        Ok(())
    }
}

/// Upstream source kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Api,
    StatusPage,
}

/// What a line whose fetch failed contributes to the comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat the line as running normally this cycle
    #[default]
    AssumeGoodService,
    /// Leave the line out of the comparison; its last record is carried as
    /// baseline only
    Skip,
}

/// HTTP client and fetch behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Wait before the single retry of a rate-limited request
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Sources to combine, in order
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceKind>,

    #[serde(default)]
    pub on_fetch_failure: FailurePolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            retry_backoff_ms: defaults::retry_backoff(),
            sources: defaults::sources(),
            on_fetch_failure: FailurePolicy::default(),
        }
    }
}

/// Line status API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "defaults::api_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::api_base_url(),
        }
    }
}

/// Status page location and CSS selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPageConfig {
    #[serde(default = "defaults::status_page_url")]
    pub url: String,

    /// One element per line entry
    #[serde(default = "defaults::entry_selector")]
    pub entry_selector: String,

    /// Line name within an entry
    #[serde(default = "defaults::name_selector")]
    pub name_selector: String,

    /// Status summary within an entry
    #[serde(default = "defaults::status_selector")]
    pub status_selector: String,

    /// Expanded details within an entry
    #[serde(default = "defaults::details_selector")]
    pub details_selector: String,

    /// Statuses that do not count as disruptions
    #[serde(default = "defaults::ignored_statuses")]
    pub ignored_statuses: Vec<String>,
}

impl StatusPageConfig {
    pub fn selectors(&self) -> [&str; 4] {
        [
            self.entry_selector.as_str(),
            self.name_selector.as_str(),
            self.status_selector.as_str(),
            self.details_selector.as_str(),
        ]
    }

    pub fn is_ignored(&self, status: &str) -> bool {
        self.ignored_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(status.trim()))
    }
}

impl Default for StatusPageConfig {
    fn default() -> Self {
        Self {
            url: defaults::status_page_url(),
            entry_selector: defaults::entry_selector(),
            name_selector: defaults::name_selector(),
            status_selector: defaults::status_selector(),
            details_selector: defaults::details_selector(),
            ignored_statuses: defaults::ignored_statuses(),
        }
    }
}

/// Poll schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "defaults::slots")]
    pub slots: Vec<ScheduleSlot>,

    /// How long after a slot's start a run still belongs to it
    #[serde(default = "defaults::window_minutes")]
    pub window_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slots: defaults::slots(),
            window_minutes: defaults::window_minutes(),
        }
    }
}

/// Composition and delivery policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Used in message titles (e.g., "TfL Tube Disruptions")
    #[serde(default = "defaults::network_name")]
    pub network_name: String,

    /// Send the full status on the first run of a period, even if unchanged
    #[serde(default = "defaults::enabled")]
    pub full_broadcast_on_first_run: bool,

    /// Overwrite the snapshot even when delivery failed
    #[serde(default = "defaults::enabled")]
    pub persist_on_delivery_failure: bool,

    /// Longest details text per section, in graphemes
    #[serde(default = "defaults::max_details_chars")]
    pub max_details_chars: usize,

    #[serde(default = "defaults::default_color")]
    pub default_color: String,

    #[serde(default = "defaults::resolved_color")]
    pub resolved_color: String,

    #[serde(default = "defaults::unchanged_color")]
    pub unchanged_color: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            network_name: defaults::network_name(),
            full_broadcast_on_first_run: defaults::enabled(),
            persist_on_delivery_failure: defaults::enabled(),
            max_details_chars: defaults::max_details_chars(),
            default_color: defaults::default_color(),
            resolved_color: defaults::resolved_color(),
            unchanged_color: defaults::unchanged_color(),
        }
    }
}

/// File locations, relative to the storage directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::lines_file")]
    pub lines_file: String,

    #[serde(default = "defaults::users_file")]
    pub users_file: String,

    #[serde(default = "defaults::snapshot_file")]
    pub snapshot_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            lines_file: defaults::lines_file(),
            users_file: defaults::users_file(),
            snapshot_file: defaults::snapshot_file(),
        }
    }
}

mod defaults {
    use super::SourceKind;
    use crate::models::ScheduleSlot;

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; tubewatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        15
    }
    pub fn request_delay() -> u64 {
        250
    }
    pub fn max_concurrent() -> usize {
        1
    }
    pub fn retry_backoff() -> u64 {
        5_000
    }
    pub fn sources() -> Vec<SourceKind> {
        vec![SourceKind::Api]
    }

    // Upstream defaults
    pub fn api_base_url() -> String {
        "https://api.tfl.gov.uk".into()
    }
    pub fn status_page_url() -> String {
        "https://tfl.gov.uk/tube-dlr-overground/status".into()
    }
    pub fn entry_selector() -> String {
        ".disruptions-list [data-testid='headles-accordion-root-testid']".into()
    }
    pub fn name_selector() -> String {
        "[data-testid='accordion-name']".into()
    }
    pub fn status_selector() -> String {
        "[data-testid='line-status']".into()
    }
    pub fn details_selector() -> String {
        "[class*='CustomAccordion_panel']".into()
    }
    pub fn ignored_statuses() -> Vec<String> {
        vec![
            "Good service".into(),
            "Information".into(),
            "Closure".into(),
        ]
    }

    // Schedule defaults (UTC)
    pub fn slots() -> Vec<ScheduleSlot> {
        vec![
            ScheduleSlot::new(6, 30, "morning", true),
            ScheduleSlot::new(7, 0, "morning", false),
            ScheduleSlot::new(8, 0, "morning", false),
            ScheduleSlot::new(15, 30, "evening", true),
            ScheduleSlot::new(16, 0, "evening", false),
            ScheduleSlot::new(16, 30, "evening", false),
        ]
    }
    pub fn window_minutes() -> u32 {
        30
    }

    // Notify defaults
    pub fn network_name() -> String {
        "TfL Tube".into()
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn max_details_chars() -> usize {
        1500
    }
    pub fn default_color() -> String {
        "#CCCCCC".into()
    }
    pub fn resolved_color() -> String {
        "#28a745".into()
    }
    pub fn unchanged_color() -> String {
        "#ffc107".into()
    }

    // Path defaults
    pub fn lines_file() -> String {
        "lines.json".into()
    }
    pub fn users_file() -> String {
        "slackUsers.json".into()
    }
    pub fn snapshot_file() -> String {
        "previous_disruptions.json".into()
    }
}
