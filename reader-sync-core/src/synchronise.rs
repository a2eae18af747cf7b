//! High-level pipeline: fetch → filter → transform → publish → record.
//!
//! One run is a single sequential pass:
//!   - list archived candidates from the [`ArticleSource`], skipping ids the ledger already holds
//!   - take at most `articles_per_run` of them
//!   - per article: fetch highlights, render the weblink, publish via [`WeblinkPublisher`]
//!   - record the article id in the ledger only after the publisher accepted it
//!
//! # Failure policy
//! - Credentials rejected by either side, or the source failing outright: the run aborts with a
//!   [`SyncError`]. No outcome is returned, so the caller has no updated ledger to persist and the
//!   whole batch is retried next run (at-least-once).
//! - Rate limit from either side: the loop stops, the outcome is returned with `halted` set and
//!   everything published so far recorded.
//! - Anything else about a single article (no URL, not archived, destination refused it): logged,
//!   reported as skipped, not recorded.
//!
//! The orchestrator never touches the filesystem: the [`Ledger`] comes in by value and goes back
//! out in the [`SynchroniseOutcome`].

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{ArticleSource, PublishError, SourceError, WeblinkPublisher};
use crate::ledger::Ledger;
use crate::preprocess;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SynchroniseReport {
    /// Articles attempted this run, after ledger filtering and batch truncation.
    pub candidates: usize,
    pub created: Vec<CreatedReport>,
    pub skipped: Vec<SkippedReport>,
    /// Why the run stopped before working through every candidate.
    pub halted: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedReport {
    pub article_id: String,
    pub title: String,
    pub weblink_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedReport {
    pub article_id: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct SynchroniseOutcome {
    pub report: SynchroniseReport,
    pub ledger: Ledger,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("listing archived articles failed: {0}")]
    Listing(#[source] SourceError),
    #[error("fetching highlights for article {article_id} failed: {source}")]
    Highlights {
        article_id: String,
        #[source]
        source: SourceError,
    },
    #[error("publishing article {article_id} failed: {source}")]
    Publish {
        article_id: String,
        #[source]
        source: PublishError,
    },
}

pub async fn synchronise<S, P>(
    config: &SyncConfig,
    source: &S,
    publisher: &P,
    mut ledger: Ledger,
) -> Result<SynchroniseOutcome, SyncError>
where
    S: ArticleSource + ?Sized,
    P: WeblinkPublisher + ?Sized,
{
    info!(
        articles_per_run = config.articles_per_run,
        updated_after = %config.updated_after.to_rfc3339(),
        ledger_entries = ledger.len(),
        "[SYNC] Starting synchronisation run"
    );
    let mut report = SynchroniseReport::default();

    let listed = match source
        .list_archived(config.updated_after, config.articles_per_run, ledger.ids())
        .await
    {
        Ok(articles) => articles,
        Err(SourceError::RateLimited { retry_after }) => {
            warn!(?retry_after, "[SYNC] Source rate limit hit while listing, stopping run");
            report.halted = Some(format!(
                "source rate limit while listing (retry after {retry_after:?}s)"
            ));
            return Ok(SynchroniseOutcome { report, ledger });
        }
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Listing archived articles failed");
            return Err(SyncError::Listing(e));
        }
    };

    let listed_count = listed.len();
    let mut batch_ids = HashSet::new();
    let batch: Vec<_> = listed
        .into_iter()
        .filter(|a| !ledger.contains(&a.id) && batch_ids.insert(a.id.clone()))
        .take(config.articles_per_run)
        .collect();
    report.candidates = batch.len();
    info!(
        listed = listed_count,
        candidates = batch.len(),
        "[SYNC] Candidate batch selected"
    );

    for (idx, mut article) in batch.into_iter().enumerate() {
        let position = idx + 1;

        if !article.archived || preprocess::select_url(&article).is_none() {
            let reason = if article.archived {
                "no usable url"
            } else {
                "not archived"
            };
            warn!(article_id = %article.id, title = %article.title, reason, "[SYNC] Skipping article");
            report.skipped.push(SkippedReport {
                article_id: article.id,
                reason: reason.to_string(),
            });
            continue;
        }

        article.highlights = match source.fetch_highlights(&article.id).await {
            Ok(highlights) => {
                debug!(article_id = %article.id, count = highlights.len(), "[SYNC] Fetched highlights");
                highlights
            }
            Err(SourceError::RateLimited { retry_after }) => {
                warn!(article_id = %article.id, ?retry_after, "[SYNC] Source rate limit hit, stopping run");
                report.halted = Some(format!(
                    "source rate limit while fetching highlights (retry after {retry_after:?}s)"
                ));
                break;
            }
            Err(e) => {
                error!(article_id = %article.id, error = %e, "[SYNC][ERROR] Fetching highlights failed");
                return Err(SyncError::Highlights {
                    article_id: article.id,
                    source: e,
                });
            }
        };

        let weblink = match preprocess::prepare(&article, config) {
            Ok(w) => w,
            Err(e) => {
                warn!(article_id = %article.id, error = %e, "[SYNC] Transformation failed, skipping");
                report.skipped.push(SkippedReport {
                    article_id: article.id,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let title = weblink.title.clone().unwrap_or_default();

        match publisher.create_weblink(weblink).await {
            Ok(created) => {
                ledger.record(&article.id);
                info!(
                    article_id = %article.id,
                    weblink_id = ?created.id,
                    "[SYNC][PUBLISH] Created weblink ({position}/{}): {title}",
                    report.candidates
                );
                report.created.push(CreatedReport {
                    article_id: article.id,
                    title,
                    weblink_id: created.id,
                });
            }
            Err(PublishError::RateLimited { retry_after }) => {
                warn!(article_id = %article.id, ?retry_after, "[SYNC][PUBLISH] Destination rate limit hit, stopping run");
                report.halted = Some(format!(
                    "destination rate limit (retry after {retry_after:?}s)"
                ));
                break;
            }
            Err(e @ PublishError::Unauthorized { .. }) => {
                error!(article_id = %article.id, error = %e, "[SYNC][ERROR][PUBLISH] Destination rejected credentials");
                return Err(SyncError::Publish {
                    article_id: article.id,
                    source: e,
                });
            }
            Err(e) => {
                error!(article_id = %article.id, title = %title, error = %e, "[SYNC][ERROR][PUBLISH] Weblink not created, skipping");
                report.skipped.push(SkippedReport {
                    article_id: article.id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        created = report.created.len(),
        skipped = report.skipped.len(),
        halted = report.halted.is_some(),
        "[SYNC] Synchronisation run finished"
    );
    match serde_json::to_string_pretty(&report) {
        Ok(json) => debug!(json = %json, "[SYNC][DEBUG] Run report as JSON"),
        Err(e) => debug!(error = ?e, "[SYNC][DEBUG] Failed to serialize run report"),
    }

    Ok(SynchroniseOutcome { report, ledger })
}
