//! Run configuration and structured document loading.
//!
//! Configuration is layered with `figment`: compiled defaults, then an
//! optional TOML file, then the standard AWS credential variables, then
//! `PROBEINFO_`-prefixed environment variables (nested keys split on `__`,
//! e.g. `PROBEINFO_S3__REGION`).

pub mod document;
pub mod error;
mod settings;

pub use crate::settings::{
    CACHE_BUCKET, Config, DEFAULT_TO, Environment, FROM, GcsSettings, Notifications, OUTPUT_BUCKET, S3Settings,
};
