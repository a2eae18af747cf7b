use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_ARTICLES_PER_RUN: usize = 5;
pub const DEFAULT_UPDATED_AFTER: &str = "2024-12-05";
pub const DEFAULT_TAGS: [&str; 2] = ["pendente", "readwise"];

/// Static settings for one synchronisation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Upper bound on articles attempted per run.
    pub articles_per_run: usize,
    /// Only articles updated at or after this instant are candidates.
    pub updated_after: DateTime<Utc>,
    /// Appended to every weblink's own tags.
    pub default_tags: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid cutoff date {value:?}, expected YYYY-MM-DD: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("articles per run must be at least 1")]
    ZeroBatch,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            articles_per_run: DEFAULT_ARTICLES_PER_RUN,
            updated_after: midnight_utc(default_cutoff_date()),
            default_tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl SyncConfig {
    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.articles_per_run == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            articles_per_run = self.articles_per_run,
            updated_after = %self.updated_after.to_rfc3339(),
            default_tags = self.default_tags.len(),
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

/// Parse a `YYYY-MM-DD` cutoff into midnight UTC of that day.
pub fn parse_cutoff(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(midnight_utc)
        .map_err(|source| ConfigError::InvalidDate {
            value: value.to_string(),
            source,
        })
}

fn default_cutoff_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 5).unwrap_or(NaiveDate::MIN)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_midnight_utc() {
        let cutoff = parse_cutoff("2024-12-05").unwrap();
        assert_eq!(cutoff.to_rfc3339(), "2024-12-05T00:00:00+00:00");
    }

    #[test]
    fn default_cutoff_matches_the_default_date_string() {
        let config = SyncConfig::default();
        assert_eq!(config.updated_after, parse_cutoff(DEFAULT_UPDATED_AFTER).unwrap());
        assert_eq!(config.articles_per_run, 5);
        assert_eq!(config.default_tags, vec!["pendente", "readwise"]);
    }

    #[test]
    fn rejects_malformed_dates() {
        let err = parse_cutoff("05/12/2024").unwrap_err();
        assert!(err.to_string().contains("05/12/2024"));
    }

    #[test]
    fn zero_batch_is_invalid() {
        let config = SyncConfig {
            articles_per_run: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBatch)));
    }
}
