///
/// This module implements the CLI interface for reader-sync: argument parsing, the async entrypoint
/// and the glue between config, ledger file, HTTP clients and the core pipeline.
///
/// All transformation and orchestration logic lives in the [`reader-sync-core`] crate.
/// This module only wires real clients and the ledger file around it.
///
/// ## How To Use
/// - From a scheduler: run the `reader-sync` binary with no arguments (`sync` is the default).
/// - Programmatically/in tests: call [`run`] with a constructed [`Cli`], or [`sync_with`] with
///   any `ArticleSource`/`WeblinkPublisher` pair.
///
/// [`reader-sync-core`]: ../../reader-sync-core/
use crate::capacities::CapacitiesClient;
use crate::load_config::{load_config, CliConfig};
use crate::readwise::ReadwiseClient;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reader_sync_core::contract::{ArticleSource, WeblinkPublisher};
use reader_sync_core::ledger::Ledger;
use reader_sync_core::synchronise::{synchronise, SynchroniseReport};
use std::path::PathBuf;

/// CLI for reader-sync: copy archived Reader articles into Capacities.
#[derive(Debug, Parser)]
#[clap(
    name = "reader-sync",
    version,
    about = "Copy archived Readwise Reader articles, with highlights and notes, into Capacities weblinks",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,

    /// Options for the default `sync` command
    #[clap(flatten)]
    pub sync: SyncArgs,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronise one batch of archived articles (the default)
    Sync(SyncArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct SyncArgs {
    /// Path to an optional YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Articles to process this run, overriding the config
    #[clap(long, short = 'n')]
    pub count: Option<usize>,

    /// Ledger file of processed article ids, overriding the config
    #[clap(long)]
    pub ledger: Option<PathBuf>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let args = match cli.command {
        Some(Commands::Sync(args)) => args,
        None => cli.sync,
    };
    tracing::info!(command = "sync", ?args, "Starting synchronisation");

    let mut config = load_config(args.config.as_deref())?;
    if let Some(count) = args.count {
        if count == 0 {
            bail!("--count must be at least 1");
        }
        config.sync.articles_per_run = count;
    }
    if let Some(ledger) = args.ledger {
        config.ledger_path = ledger;
    }

    let source = ReadwiseClient::new(config.credentials.readwise_token.clone())
        .with_base_url(config.readwise_base_url.clone())
        .with_request_interval(config.request_interval)
        .with_requests_per_minute(config.requests_per_minute);
    let publisher = CapacitiesClient::new(
        config.credentials.capacities_token.clone(),
        config.credentials.capacities_space_id.clone(),
    )
    .with_base_url(config.capacities_base_url.clone());

    sync_with(&config, &source, &publisher).await.map(|_| ())
}

/// Load the ledger, run one pipeline pass, persist the ledger.
///
/// A fatal pipeline error returns before anything is persisted. A halted run
/// (rate limit) persists what it published and then reports failure.
pub async fn sync_with<S, P>(config: &CliConfig, source: &S, publisher: &P) -> Result<SynchroniseReport>
where
    S: ArticleSource + ?Sized,
    P: WeblinkPublisher + ?Sized,
{
    let ledger = Ledger::load(&config.ledger_path)?;

    let outcome = match synchronise(&config.sync, source, publisher, ledger).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(command = "sync", error = %e, "Synchronisation failed, ledger left untouched");
            return Err(e).context("synchronisation aborted");
        }
    };

    let mut ledger = outcome.ledger;
    let report = outcome.report;
    ledger.persist(&config.ledger_path)?;

    if let Some(reason) = &report.halted {
        tracing::warn!(
            command = "sync",
            created = report.created.len(),
            %reason,
            "Synchronisation halted early"
        );
        bail!("synchronisation halted early: {reason}");
    }

    tracing::info!(
        command = "sync",
        created = report.created.len(),
        skipped = report.skipped.len(),
        "Processing completed. Created {} new weblinks.",
        report.created.len()
    );
    Ok(report)
}
