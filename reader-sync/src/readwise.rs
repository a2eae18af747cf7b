//! # Readwise Reader client
//!
//! Implements [`ArticleSource`] against the Reader list endpoint
//! (`GET /api/v3/list/`). Archived documents and highlights are both served by
//! that endpoint; highlights are the documents with `category=highlight`
//! whose `parent_id` names the article.
//!
//! - Auth: `Authorization: Token <READWISE_TOKEN>`.
//! - Pagination: follow `nextPageCursor` via the `pageCursor` query param.
//! - Pacing: requests are spaced at least `request_interval` apart, and at most
//!   `requests_per_minute` are sent in any rolling window (15 by default, under
//!   the service's 20/min). A 429 is still possible and is surfaced as
//!   [`SourceError::RateLimited`], never retried here.
//! - Highlights: the whole highlight list is walked once per client and
//!   grouped by `parent_id`; later [`ArticleSource::fetch_highlights`] calls
//!   are answered from that index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use reader_sync_core::contract::{Article, ArticleSource, Highlight, SourceError};

pub const DEFAULT_BASE_URL: &str = "https://readwise.io";
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 15;
const RATE_WINDOW: Duration = Duration::from_secs(60);
const LIST_PATH: &str = "/api/v3/list/";

pub struct ReadwiseClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    request_interval: Duration,
    /// 0 disables the window cap.
    requests_per_window: u32,
    rate_window: Duration,
    pacing: Mutex<PaceState>,
    /// Highlights by parent article id, filled by the first `fetch_highlights`.
    highlights: Mutex<Option<HashMap<String, Vec<Highlight>>>>,
}

#[derive(Debug, Default)]
struct PaceState {
    last_request: Option<Instant>,
    window_start: Option<Instant>,
    window_count: u32,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    results: Vec<ReaderDocument>,
    #[serde(rename = "nextPageCursor")]
    next_page_cursor: Option<String>,
}

/// A Reader document as returned by the list endpoint. Only the fields used here are kept.
#[derive(Debug, Deserialize)]
struct ReaderDocument {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    reading_progress: Option<f64>,
    /// Keyed by tag name.
    #[serde(default)]
    tags: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    parent_id: Option<String>,
    /// Highlighted text, for highlight documents.
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    position: Option<i64>,
}

impl ReaderDocument {
    fn into_article(self) -> Article {
        Article {
            archived: self.location.as_deref() == Some("archive"),
            title: self.title.unwrap_or_default(),
            author: self.author,
            url: self.url,
            source_url: self.source_url,
            summary: self.summary,
            updated_at: self.updated_at,
            reading_progress: self.reading_progress,
            notes: self.notes,
            tags: self.tags.map(|t| t.into_keys().collect()).unwrap_or_default(),
            highlights: Vec::new(),
            id: self.id,
        }
    }

    fn into_highlight(self) -> Highlight {
        Highlight {
            text: self.content.unwrap_or_default(),
            note: self.notes.filter(|n| !n.trim().is_empty()),
            created_at: self.created_at,
            position: self.position,
        }
    }
}

impl ReadwiseClient {
    pub fn new(token: impl Into<String>) -> Self {
        ReadwiseClient {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            request_interval: DEFAULT_REQUEST_INTERVAL,
            requests_per_window: DEFAULT_REQUESTS_PER_MINUTE,
            rate_window: RATE_WINDOW,
            pacing: Mutex::new(PaceState::default()),
            highlights: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn with_requests_per_minute(mut self, cap: u32) -> Self {
        self.requests_per_window = cap;
        self
    }

    /// Length of the window the per-minute cap counts over. One minute unless overridden.
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    async fn pace(&self) {
        let mut state = self.pacing.lock().await;
        if let Some(previous) = state.last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.request_interval {
                let wait = self.request_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Pacing Readwise request");
                sleep(wait).await;
            }
        }

        if self.requests_per_window > 0 {
            let now = Instant::now();
            match state.window_start {
                Some(start) if now.duration_since(start) < self.rate_window => {
                    if state.window_count >= self.requests_per_window {
                        let wait = self.rate_window - now.duration_since(start);
                        tracing::info!(
                            wait_ms = wait.as_millis() as u64,
                            cap = self.requests_per_window,
                            "Per-minute Readwise request cap reached, waiting for the window to roll over"
                        );
                        sleep(wait).await;
                        state.window_start = Some(Instant::now());
                        state.window_count = 0;
                    }
                }
                _ => {
                    state.window_start = Some(now);
                    state.window_count = 0;
                }
            }
            state.window_count += 1;
        }

        state.last_request = Some(Instant::now());
    }

    /// Walk every highlight page once and group the results by parent article.
    async fn load_highlight_index(&self) -> Result<HashMap<String, Vec<Highlight>>, SourceError> {
        let mut index: HashMap<String, Vec<Highlight>> = HashMap::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut query = vec![
                ("category", "highlight".to_string()),
                ("withHtmlContent", "false".to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("pageCursor", c.clone()));
            }
            let page = self.get_page(&query).await?;
            pages += 1;

            for doc in page.results {
                if let Some(parent) = doc.parent_id.clone() {
                    index.entry(parent).or_default().push(doc.into_highlight());
                }
            }

            match page.next_page_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::info!(pages, articles = index.len(), "Indexed Readwise highlights");
        Ok(index)
    }

    async fn get_page(&self, query: &[(&str, String)]) -> Result<ListPage, SourceError> {
        self.pace().await;
        let url = format!("{}{}", self.base_url, LIST_PATH);
        tracing::debug!(%url, ?query, "Requesting Readwise list page");

        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .query(query)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, %url, "Readwise request failed");
                SourceError::Transport(e.to_string())
            })?;

        let resp = check_status(resp).await?;
        resp.json::<ListPage>().await.map_err(|e| {
            tracing::error!(error = ?e, "Failed to decode Readwise list page");
            SourceError::Decode(e.to_string())
        })
    }
}

async fn check_status(resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::error!(status = status.as_u16(), "Readwise rejected the token");
            Err(SourceError::Unauthorized {
                status: status.as_u16(),
            })
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = retry_after_secs(&resp);
            tracing::warn!(?retry_after, "Readwise rate limit hit");
            Err(SourceError::RateLimited { retry_after })
        }
        _ => {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Readwise returned an error");
            Err(SourceError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

pub(crate) fn retry_after_secs(resp: &Response) -> Option<u64> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl ArticleSource for ReadwiseClient {
    async fn list_archived(
        &self,
        updated_after: DateTime<Utc>,
        limit: usize,
        skip: &HashSet<String>,
    ) -> Result<Vec<Article>, SourceError> {
        tracing::info!(
            updated_after = %updated_after.to_rfc3339(),
            limit,
            skipping = skip.len(),
            "Listing archived Readwise articles"
        );
        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut query = vec![
                ("location", "archive".to_string()),
                ("withHtmlContent", "false".to_string()),
                ("updatedAfter", updated_after.to_rfc3339()),
            ];
            if let Some(c) = &cursor {
                query.push(("pageCursor", c.clone()));
            }
            let page = self.get_page(&query).await?;
            pages += 1;

            for doc in page.results {
                if doc.parent_id.is_some() || skip.contains(&doc.id) {
                    continue;
                }
                if doc.updated_at.is_some_and(|at| at < updated_after) {
                    continue;
                }
                collected.push(doc.into_article());
                if collected.len() >= limit {
                    tracing::info!(pages, count = collected.len(), "Reached per-run limit while listing");
                    return Ok(collected);
                }
            }

            match page.next_page_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::info!(pages, count = collected.len(), "Finished listing archived articles");
        Ok(collected)
    }

    async fn fetch_highlights(&self, article_id: &str) -> Result<Vec<Highlight>, SourceError> {
        let mut cache = self.highlights.lock().await;
        if cache.is_none() {
            // A failed walk leaves the cache empty so the next call starts over.
            *cache = Some(self.load_highlight_index().await?);
        }
        let highlights = cache
            .as_ref()
            .and_then(|index| index.get(article_id))
            .cloned()
            .unwrap_or_default();

        tracing::info!(article_id, count = highlights.len(), "Fetched highlights for article");
        Ok(highlights)
    }
}
