//! Dedup ledger: the set of article ids already synchronised.
//!
//! On disk the ledger is a plain-text file with one id per line. It is read
//! once at the start of a run and appended to once at the end; ids are never
//! removed. In memory it is an explicit value that the orchestrator takes and
//! hands back, so nothing here is global.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to read ledger {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to ledger {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    seen: HashSet<String>,
    /// Ids recorded since the last load/persist, in recording order.
    appended: Vec<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-populated with already persisted ids.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ledger {
            seen: ids.into_iter().map(Into::into).collect(),
            appended: Vec::new(),
        }
    }

    /// Parse newline-separated ids; surrounding whitespace and blank lines are ignored.
    pub fn parse(contents: &str) -> Self {
        Self::from_ids(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    /// Load from `path`. A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let ledger = Self::parse(&contents);
                info!(path = %path.display(), entries = ledger.len(), "Loaded ledger");
                Ok(ledger)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger file yet, starting empty");
                Ok(Self::new())
            }
            Err(source) => Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Mark `id` processed. Returns false if it was already present.
    pub fn record(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.appended.push(id.to_string());
        true
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.seen
    }

    /// Ids recorded but not yet persisted.
    pub fn appended(&self) -> &[String] {
        &self.appended
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Append pending ids to `path`, creating it if needed. Returns how many were written.
    pub fn persist(&mut self, path: &Path) -> Result<usize, LedgerError> {
        if self.appended.is_empty() {
            debug!(path = %path.display(), "Ledger unchanged, nothing to persist");
            return Ok(0);
        }
        let write_err = |source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        };

        // An existing file without a trailing newline would glue the first new id onto its last line.
        let needs_separator = match fs::read(path) {
            Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(write_err(e)),
        };

        let mut buf = String::new();
        if needs_separator {
            buf.push('\n');
        }
        for id in &self.appended {
            buf.push_str(id);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(write_err)?;
        file.write_all(buf.as_bytes()).map_err(write_err)?;

        let written = self.appended.len();
        self.appended.clear();
        info!(path = %path.display(), written, total = self.len(), "Persisted ledger");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_skips_blank_lines_and_trims() {
        let ledger = Ledger::parse("a1\n\n  b2  \n\r\nc3");
        assert_eq!(ledger.len(), 3);
        assert!(ledger.contains("b2"));
        assert!(ledger.appended().is_empty());
    }

    #[test]
    fn record_is_idempotent() {
        let mut ledger = Ledger::from_ids(["old"]);
        assert!(!ledger.record("old"));
        assert!(ledger.record("new"));
        assert!(!ledger.record("new"));
        assert_eq!(ledger.appended(), ["new".to_string()]);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(&dir.path().join("processed_ids.txt")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn persist_appends_only_new_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed_ids.txt");
        fs::write(&path, "a\nb\n").unwrap();

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record("b");
        ledger.record("c");
        assert_eq!(ledger.persist(&path).unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\n");

        // A second persist with nothing new leaves the file alone.
        assert_eq!(ledger.persist(&path).unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn persist_separates_from_unterminated_last_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed_ids.txt");
        fs::write(&path, "a").unwrap();

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record("b");
        ledger.persist(&path).unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        assert!(reloaded.contains("a"));
        assert!(reloaded.contains("b"));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn persist_creates_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh.txt");
        let mut ledger = Ledger::new();
        ledger.record("x");
        ledger.persist(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n");
    }
}
