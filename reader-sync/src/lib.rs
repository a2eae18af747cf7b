pub mod capacities;
pub mod cli;
pub mod load_config;
pub mod readwise;

pub use cli::{run, sync_with, Cli, Commands, SyncArgs};
