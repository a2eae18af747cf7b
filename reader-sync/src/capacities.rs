#![doc = "Capacities client: implements the WeblinkPublisher capability against the Capacities public API."]
//
//! # Capacities weblink publisher
//!
//! Bridges the core [`WeblinkPublisher`] trait to `POST /save-weblink`.
//!
//! - Construct [`CapacitiesClient`] from the API token and the target space id
//!   (`CAPACITIES_TOKEN`, `CAPACITIES_SPACE_ID`; see [`crate::load_config`]).
//! - Field limits (title, description, tags, markdown) are applied upstream in
//!   `reader_sync_core::preprocess`; this client sends what it is given and omits
//!   empty optional fields.
//! - Non-2xx answers are classified into [`PublishError`] so the orchestrator
//!   can tell a fatal credential problem from a one-article rejection.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use reader_sync_core::contract::{NewWeblink, PublishError, Weblink, WeblinkPublisher};

use crate::readwise::retry_after_secs;

pub const DEFAULT_BASE_URL: &str = "https://api.capacities.io";
const SAVE_WEBLINK_PATH: &str = "/save-weblink";

pub struct CapacitiesClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    space_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveWeblinkBody<'a> {
    space_id: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title_overwrite: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description_overwrite: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    md_text: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct SaveWeblinkResponse {
    #[serde(default)]
    id: Option<String>,
}

impl CapacitiesClient {
    pub fn new(token: impl Into<String>, space_id: impl Into<String>) -> Self {
        CapacitiesClient {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            space_id: space_id.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl WeblinkPublisher for CapacitiesClient {
    async fn create_weblink(&self, req: NewWeblink) -> Result<Weblink, PublishError> {
        tracing::info!(
            space_id = %self.space_id,
            url = %req.url,
            tags = req.tags.len(),
            "Saving weblink to Capacities"
        );
        let body = SaveWeblinkBody {
            space_id: &self.space_id,
            url: &req.url,
            title_overwrite: req.title.as_deref(),
            description_overwrite: req.description.as_deref(),
            tags: (!req.tags.is_empty()).then_some(req.tags.as_slice()),
            md_text: req.md_text.as_deref(),
        };

        let endpoint = format!("{}{}", self.base_url, SAVE_WEBLINK_PATH);
        let resp = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %req.url, "Capacities request failed");
                PublishError::Transport(e.to_string())
            })?;

        let status = resp.status();
        match status {
            s if s.is_success() => {
                // The body is informational; an empty or unexpected one still means success.
                let text = resp.text().await.unwrap_or_default();
                let parsed: SaveWeblinkResponse = serde_json::from_str(&text).unwrap_or_default();
                tracing::info!(weblink_id = ?parsed.id, url = %req.url, "Successfully saved weblink");
                Ok(Weblink {
                    id: parsed.id,
                    url: req.url,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::error!(status = status.as_u16(), "Capacities rejected the token");
                Err(PublishError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after_secs(&resp);
                tracing::warn!(?retry_after, "Capacities rate limit hit");
                Err(PublishError::RateLimited { retry_after })
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(status = status.as_u16(), %body, url = %req.url, "Capacities rejected weblink");
                Err(PublishError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
