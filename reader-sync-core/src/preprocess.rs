//! Turns an [`Article`] (with highlights attached) into a [`NewWeblink`].
//!
//! Responsible for picking the URL to link, tidying video titles, merging
//! tags, rendering the markdown body and clamping every field to the
//! destination's limits.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::SyncConfig;
use crate::contract::{Article, Highlight, NewWeblink};

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_DESCRIPTION_CHARS: usize = 1_000;
pub const MAX_TAGS: usize = 30;
pub const MAX_MARKDOWN_CHARS: usize = 200_000;

const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrepareError {
    #[error("article {id} has no usable url")]
    MissingUrl { id: String },
    #[error("article {id} is not archived")]
    NotArchived { id: String },
}

/// Build the weblink request for `article`.
pub fn prepare(article: &Article, config: &SyncConfig) -> Result<NewWeblink, PrepareError> {
    if !article.archived {
        return Err(PrepareError::NotArchived {
            id: article.id.clone(),
        });
    }
    let url = select_url(article).ok_or_else(|| PrepareError::MissingUrl {
        id: article.id.clone(),
    })?;

    let title = if is_youtube(url) {
        clean_youtube_title(&article.title)
    } else {
        article.title.trim().to_string()
    };

    let md_text = render_markdown(article, &title);
    let weblink = NewWeblink {
        url: url.to_string(),
        title: non_blank(&title).map(|t| truncate_chars(t, MAX_TITLE_CHARS)),
        description: article
            .summary
            .as_deref()
            .and_then(non_blank)
            .map(|s| truncate_chars(s, MAX_DESCRIPTION_CHARS)),
        tags: merge_tags(&article.tags, &config.default_tags),
        md_text: non_blank(&md_text).map(|md| truncate_chars(md, MAX_MARKDOWN_CHARS)),
    };
    debug!(
        article_id = %article.id,
        url = %weblink.url,
        tags = weblink.tags.len(),
        highlights = article.highlights.len(),
        "Prepared weblink"
    );
    Ok(weblink)
}

/// The original content URL when present, otherwise the reader URL.
pub fn select_url(article: &Article) -> Option<&str> {
    article
        .source_url
        .as_deref()
        .and_then(non_blank)
        .or_else(|| article.url.as_deref().and_then(non_blank))
}

pub fn is_youtube(url: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^(?:https?://)?(?:[a-z0-9-]+\.)*(?:youtube\.com|youtu\.be)(?:[:/?#]|$)")
                .expect("youtube url pattern is valid")
        })
        .is_match(url.trim())
}

/// `"some video | Channel"` becomes `"Some Video: Channel"`.
pub fn clean_youtube_title(title: &str) -> String {
    if !title.contains('|') {
        return title.trim().to_string();
    }
    let mut parts = title.split('|').map(str::trim);
    let head = parts.next().map(title_case).unwrap_or_default();
    std::iter::once(head)
        .chain(parts.map(str::to_string))
        .collect::<Vec<_>>()
        .join(": ")
}

/// Upper-cases every letter that follows a non-letter and lower-cases the rest,
/// so `state-of-the-art` becomes `State-Of-The-Art`. Whitespace is kept as is.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut after_letter = false;
    for c in s.chars() {
        if after_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        after_letter = c.is_lowercase() || c.is_uppercase();
    }
    out
}

/// Article tags first, then configured defaults; duplicates dropped, capped at [`MAX_TAGS`].
pub fn merge_tags(article_tags: &[String], default_tags: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for tag in article_tags.iter().chain(default_tags) {
        let tag = tag.trim();
        if tag.is_empty() || merged.iter().any(|t| t == tag) {
            continue;
        }
        merged.push(tag.to_string());
        if merged.len() == MAX_TAGS {
            break;
        }
    }
    merged
}

/// Markdown body for the weblink. Blocks without content are left out, so an
/// article with no highlights, notes or progress renders as title, author and
/// description only.
pub fn render_markdown(article: &Article, title: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();

    if let Some(title) = non_blank(title) {
        blocks.push(format!("# {title}"));
    }
    let author = article
        .author
        .as_deref()
        .and_then(non_blank)
        .unwrap_or(UNKNOWN_AUTHOR);
    blocks.push(format!("**Author:** {author}"));
    if let Some(summary) = article.summary.as_deref().and_then(non_blank) {
        blocks.push(summary.to_string());
    }
    if let Some(progress) = article.reading_progress.filter(|p| *p > 0.0) {
        blocks.push(format!("**Reading Progress:** {:.1}%", progress * 100.0));
    }
    if let Some(notes) = article.notes.as_deref().and_then(non_blank) {
        blocks.push(format!("## Notes\n\n{notes}"));
    }
    if let Some(section) = render_highlights(&article.highlights) {
        blocks.push(section);
    }

    blocks.join("\n\n")
}

/// `None` when no highlight has text.
fn render_highlights(highlights: &[Highlight]) -> Option<String> {
    let mut ordered: Vec<&Highlight> = highlights
        .iter()
        .filter(|h| !h.text.trim().is_empty())
        .collect();
    if ordered.is_empty() {
        return None;
    }
    // Stable: equal positions keep creation order.
    ordered.sort_by_key(|h| h.created_at);
    ordered.sort_by_key(|h| h.position.unwrap_or(0));

    let mut out = String::from("## Highlights\n");
    for h in ordered {
        out.push_str(&format!("\n* {}", h.text.trim()));
        if let Some(note) = h.note.as_deref().and_then(non_blank) {
            out.push_str(&format!("  \n  *Note: {note}*"));
        }
    }
    Some(out)
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
