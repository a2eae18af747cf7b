//! # contract: capability traits and domain types for the sync pipeline
//!
//! This module defines the two capabilities the orchestrator depends on and
//! the plain data passed between them:
//!
//! - [`ArticleSource`]: lists archived articles and fetches their highlights
//!   (implemented against the Readwise Reader API by the CLI crate).
//! - [`WeblinkPublisher`]: creates a weblink entry in the destination
//!   workspace (implemented against the Capacities API by the CLI crate).
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; with the `test-export-mocks`
//!   feature (on by default) `MockArticleSource` and `MockWeblinkPublisher`
//!   are exported so dependents can drive the pipeline without HTTP.
//!
//! ## Errors
//! - Implementors classify upstream failures into [`SourceError`] and
//!   [`PublishError`]. The orchestrator decides from the variant whether a
//!   failure aborts the run, halts it early or only skips one article.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Serialize;

/// An article from the read-it-later service, with its highlights attached
/// once the orchestrator has fetched them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    /// Reader-internal URL of the document.
    pub url: Option<String>,
    /// Original location of the content, preferred over `url` when present.
    pub source_url: Option<String>,
    pub summary: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub archived: bool,
    /// Fraction in `0.0..=1.0`.
    pub reading_progress: Option<f64>,
    /// Document-level notes, distinct from per-highlight notes.
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub highlights: Vec<Highlight>,
}

impl Article {
    /// Bare archived article; remaining fields default to empty.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Article {
            id: id.into(),
            title: title.into(),
            author: None,
            url: None,
            source_url: None,
            summary: None,
            updated_at: None,
            archived: true,
            reading_progress: None,
            notes: None,
            tags: Vec::new(),
            highlights: Vec::new(),
        }
    }
}

/// A highlighted passage and the optional note the reader attached to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub text: String,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Position within the document, when the service reports one.
    pub position: Option<i64>,
}

/// Request to create a weblink. The destination space is owned by the publisher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWeblink {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub md_text: Option<String>,
}

/// The weblink as acknowledged by the destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weblink {
    /// Destination-assigned id, if the response carried one.
    pub id: Option<String>,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("source rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("source request failed: {0}")]
    Transport(String),
    #[error("source response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("destination rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("destination rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("destination rejected weblink (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("destination request failed: {0}")]
    Transport(String),
}

/// Read side: the read-it-later service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// List archived articles updated at or after `updated_after`, skipping ids
    /// in `skip`, stopping once `limit` articles have been collected.
    async fn list_archived(
        &self,
        updated_after: DateTime<Utc>,
        limit: usize,
        skip: &HashSet<String>,
    ) -> Result<Vec<Article>, SourceError>;

    /// Fetch every highlight whose parent is `article_id`, in any order.
    async fn fetch_highlights(&self, article_id: &str) -> Result<Vec<Highlight>, SourceError>;
}

/// Write side: the knowledge-management workspace.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WeblinkPublisher: Send + Sync {
    /// Create a weblink record. Any non-2xx answer is an error.
    async fn create_weblink(&self, req: NewWeblink) -> Result<Weblink, PublishError>;
}
