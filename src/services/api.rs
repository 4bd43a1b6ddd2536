// src/services/api.rs

//! Line status API source.
//!
//! Asks `{base}/Line/{id}/Disruption` for each line and reads the
//! `description` of every returned disruption.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::LineDescriptor;
use crate::services::DisruptionSource;

#[derive(Debug, Deserialize)]
struct ApiDisruption {
    #[serde(default)]
    description: Option<String>,
}

/// Per-line source backed by the line status API.
pub struct ApiSource {
    client: Client,
    base_url: Url,
}

impl ApiSource {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::config(format!(
                "api.base_url '{base_url}' cannot be a base URL"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Endpoint for one line. The id is percent-encoded as a path segment.
    pub fn endpoint(&self, line_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config("api.base_url cannot be a base URL"))?
            .pop_if_empty()
            .extend(["Line", line_id, "Disruption"]);
        Ok(url)
    }
}

/// Descriptions from an API response body. Entries without one are skipped.
pub(crate) fn parse_disruptions(body: &str) -> Result<Vec<String>> {
    let disruptions: Vec<ApiDisruption> = serde_json::from_str(body)?;
    Ok(disruptions
        .into_iter()
        .filter_map(|d| d.description)
        .collect())
}

#[async_trait]
impl DisruptionSource for ApiSource {
    fn name(&self) -> &str {
        "api"
    }

    async fn fetch_messages(&self, line: &LineDescriptor) -> Result<Vec<String>> {
        let url = self.endpoint(&line.id)?;
        log::debug!("GET {url}");

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::rate_limited(format!("api line {}", line.id)));
        }
        let body = response.error_for_status()?.text().await?;

        parse_disruptions(&body).map_err(|e| AppError::fetch(format!("api line {}", line.id), e))
    }
}
