//! Scrapes probe and metric definitions and publishes the probe info
//! snapshot.
//!
//! The moz-central flow folds registry revisions into per-channel probe sets
//! ([`probeinfo_registry`]); the Glean flow merges scraped commits into
//! published per-repository state ([`probeinfo_glean`]). Output is written
//! to a local tree and, in production, pushed to the output bucket
//! ([`probeinfo_storage`]).

pub mod cli;
pub mod error;
pub mod history;
pub mod output;
pub mod runner;

pub use crate::cli::Cli;
pub use crate::runner::{RunOptions, Runner};

use crate::error::{ErrorKind, Result};
use probeinfo_config::Config;
use probeinfo_glean::LogNotifier;
use probeinfo_storage::{DefaultConnector, RemoteStorage};
use std::path::PathBuf;
use std::sync::Arc;

/// Load configuration, apply command-line overrides and build the connector.
pub fn configure(cli: &Cli) -> Result<(Config, DefaultConnector)> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        let message = e.to_string();
        e.raise(ErrorKind::Configuration(message))
    })?;
    if let Some(bucket) = &cli.output_bucket {
        config.output_bucket.clone_from(bucket);
    }
    if let Some(bucket) = &cli.cache_bucket {
        config.cache_bucket.clone_from(bucket);
    }
    if let Some(env) = cli.env {
        config.env = env.into();
    }

    let connector = DefaultConnector::new();
    #[cfg(feature = "s3")]
    let connector = connector.with_s3(probeinfo_storage::backend::S3Options {
        region: config.s3.region.clone(),
        endpoint: config.s3.endpoint.clone(),
        key_id: config.s3.key_id.clone(),
        key_secret: config.s3.key_secret.clone(),
    });
    #[cfg(feature = "gcs")]
    let connector = connector.with_gcs_service_account(config.gcs.service_account_path.clone());
    Ok((config, connector))
}

/// Run with the production connector, delivering notifications to the log.
pub async fn run(cli: &Cli) -> Result<Vec<PathBuf>> {
    let (config, connector) = configure(cli)?;
    let runner = Runner::new(RunOptions::from(cli), config, RemoteStorage::new(connector), Arc::new(LogNotifier))?;
    runner.run().await
}
