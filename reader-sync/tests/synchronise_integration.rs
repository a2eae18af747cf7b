//! `sync_with`: ledger file handling around the core pipeline, driven by core mocks.

use std::fs;
use std::path::Path;
use std::time::Duration;

use reader_sync::load_config::{CliConfig, Credentials};
use reader_sync::sync_with;
use reader_sync_core::config::SyncConfig;
use reader_sync_core::contract::{
    Article, MockArticleSource, MockWeblinkPublisher, PublishError, Weblink,
};
use tempfile::tempdir;

fn cli_config(ledger_path: &Path) -> CliConfig {
    CliConfig {
        sync: SyncConfig::default(),
        ledger_path: ledger_path.to_path_buf(),
        request_interval: Duration::ZERO,
        requests_per_minute: 0,
        readwise_base_url: "http://unused".into(),
        capacities_base_url: "http://unused".into(),
        credentials: Credentials {
            readwise_token: "r".into(),
            capacities_token: "c".into(),
            capacities_space_id: "s".into(),
        },
    }
}

fn source_with(ids: &[&str]) -> MockArticleSource {
    let articles: Vec<Article> = ids
        .iter()
        .map(|id| Article {
            source_url: Some(format!("https://example.com/{id}")),
            ..Article::new(*id, format!("Title {id}"))
        })
        .collect();
    let mut source = MockArticleSource::new();
    source
        .expect_list_archived()
        .returning(move |_, _, skip| {
            Ok(articles
                .iter()
                .filter(|a| !skip.contains(&a.id))
                .cloned()
                .collect())
        });
    source.expect_fetch_highlights().returning(|_| Ok(vec![]));
    source
}

#[tokio::test]
async fn successful_run_appends_to_existing_ledger() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("processed_ids.txt");
    fs::write(&ledger_path, "old\n").unwrap();

    let source = source_with(&["old", "n1", "n2"]);
    let mut publisher = MockWeblinkPublisher::new();
    publisher
        .expect_create_weblink()
        .times(2)
        .returning(|req| Ok(Weblink { id: None, url: req.url }));

    let report = sync_with(&cli_config(&ledger_path), &source, &publisher)
        .await
        .expect("run should succeed");

    assert_eq!(report.created.len(), 2);
    assert_eq!(fs::read_to_string(&ledger_path).unwrap(), "old\nn1\nn2\n");
}

#[tokio::test]
async fn skipped_articles_do_not_fail_the_run() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("processed_ids.txt");

    let source = source_with(&["bad", "good"]);
    let mut publisher = MockWeblinkPublisher::new();
    publisher.expect_create_weblink().times(2).returning(|req| {
        if req.url.ends_with("/bad") {
            Err(PublishError::Rejected {
                status: 400,
                body: "nope".into(),
            })
        } else {
            Ok(Weblink { id: None, url: req.url })
        }
    });

    let report = sync_with(&cli_config(&ledger_path), &source, &publisher)
        .await
        .unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(fs::read_to_string(&ledger_path).unwrap(), "good\n");
}

#[tokio::test]
async fn fatal_error_leaves_ledger_untouched() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("processed_ids.txt");
    fs::write(&ledger_path, "old\n").unwrap();

    let source = source_with(&["n1", "n2"]);
    let mut publisher = MockWeblinkPublisher::new();
    let mut calls = 0;
    publisher.expect_create_weblink().returning(move |req| {
        calls += 1;
        if calls == 1 {
            Ok(Weblink { id: None, url: req.url })
        } else {
            Err(PublishError::Unauthorized { status: 401 })
        }
    });

    let err = sync_with(&cli_config(&ledger_path), &source, &publisher)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("credentials"), "got: {err:#}");
    // n1 was published but the run aborted, so it will be retried next time.
    assert_eq!(fs::read_to_string(&ledger_path).unwrap(), "old\n");
}

#[tokio::test]
async fn halted_run_persists_progress_then_fails() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("processed_ids.txt");

    let source = source_with(&["n1", "n2", "n3"]);
    let mut publisher = MockWeblinkPublisher::new();
    let mut calls = 0;
    publisher
        .expect_create_weblink()
        .times(2)
        .returning(move |req| {
            calls += 1;
            if calls == 1 {
                Ok(Weblink { id: None, url: req.url })
            } else {
                Err(PublishError::RateLimited { retry_after: None })
            }
        });

    let err = sync_with(&cli_config(&ledger_path), &source, &publisher)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("halted"));
    assert_eq!(fs::read_to_string(&ledger_path).unwrap(), "n1\n");
}

#[tokio::test]
async fn immediate_rerun_makes_no_destination_calls() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("processed_ids.txt");
    let config = cli_config(&ledger_path);

    let mut publisher = MockWeblinkPublisher::new();
    publisher
        .expect_create_weblink()
        .times(2)
        .returning(|req| Ok(Weblink { id: None, url: req.url }));
    sync_with(&config, &source_with(&["a", "b"]), &publisher)
        .await
        .unwrap();

    let mut idle = MockWeblinkPublisher::new();
    idle.expect_create_weblink().never();
    let report = sync_with(&config, &source_with(&["a", "b"]), &idle)
        .await
        .unwrap();

    assert_eq!(report.candidates, 0);
    assert_eq!(fs::read_to_string(&ledger_path).unwrap(), "a\nb\n");
}
