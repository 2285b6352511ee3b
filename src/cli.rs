//! Command-line arguments.

use clap::{Parser, ValueEnum};
use probeinfo_config::Environment;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EnvArg {
    Dev,
    Prod,
}

impl From<EnvArg> for Environment {
    fn from(value: EnvArg) -> Self {
        match value {
            EnvArg::Dev => Environment::Dev,
            EnvArg::Prod => Environment::Prod,
        }
    }
}

/// Scrape probe and metric definitions and publish the probe info snapshot.
#[derive(Clone, Debug, Parser)]
#[command(name = "probeinfo", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Scrape cache. Pulled from and pushed to the cache bucket in prod.
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Directory to write output documents into.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Repositories file (YAML or JSON).
    #[arg(long, default_value = "repositories.yaml")]
    pub repositories_file: PathBuf,

    /// Revisions manifest. Defaults to `<cache-dir>/moz-central/revisions.json`.
    #[arg(long)]
    pub revisions: Option<PathBuf>,

    /// Commits manifest. Defaults to `<cache-dir>/glean/commits.json`.
    #[arg(long)]
    pub commits: Option<PathBuf>,

    /// Log notifications instead of sending them.
    #[arg(long)]
    pub dry_run: bool,

    /// Glean repository to process (repeatable). All when omitted.
    #[arg(long = "glean-repo")]
    pub glean_repos: Vec<String>,

    /// Process only the Glean repository with this URL.
    #[arg(long)]
    pub glean_repo_url: Option<String>,

    /// Firefox channel to process. All when omitted.
    #[arg(long)]
    pub firefox_channel: Option<String>,

    /// Only revisions of this Firefox major version.
    #[arg(long, conflicts_with = "min_firefox_version")]
    pub firefox_version: Option<u32>,

    /// Only revisions of this Firefox major version or newer.
    #[arg(long)]
    pub min_firefox_version: Option<u32>,

    #[arg(long)]
    pub output_bucket: Option<String>,

    #[arg(long)]
    pub cache_bucket: Option<String>,

    #[arg(long, value_enum)]
    pub env: Option<EnvArg>,

    /// Only process moz-central probes.
    #[arg(long, conflicts_with = "glean")]
    pub moz_central: bool,

    /// Only process Glean repositories.
    #[arg(long)]
    pub glean: bool,

    /// Merge into previously published output and publish only what changed.
    #[arg(long)]
    pub update: bool,

    /// Single commit to process in update mode.
    #[arg(long)]
    pub commit: Option<String>,

    /// Branch the single commit was pushed to.
    #[arg(long)]
    pub branch: Option<String>,
}
