#![doc = "reader-sync-core: core logic library for reader-sync."]

//! This crate holds the data model, the dedup ledger, the article-to-weblink
//! transformation and the synchronise pipeline. It performs no HTTP: the
//! read-it-later service and the knowledge workspace are reached through the
//! capability traits in [`contract`], implemented by the `reader-sync` CLI
//! crate and by `mockall` mocks in tests.
//!
//! # Usage
//! Build a [`config::SyncConfig`], load a [`ledger::Ledger`], then call
//! [`synchronise::synchronise`] with an `ArticleSource` and a `WeblinkPublisher`.
//! Persist the returned ledger.

pub mod config;
pub mod contract;
pub mod ledger;
pub mod preprocess;
pub mod synchronise;
