//! Remote object storage for published output and the scrape cache.
//!
//! A [`RemoteLocation`] names a bucket and prefix; a [`Connector`] turns it
//! into a [`StorageBackend`]; [`RemoteStorage`] pulls and pushes whole trees
//! on top of that, with optional gzip, delete and exclude semantics.

pub mod backend;
mod connect;
pub mod error;
mod location;
mod models;
mod path;
mod pattern;
mod sync;

pub use crate::backend::StorageBackend;
pub use crate::connect::{Connector, DefaultConnector, StaticConnector};
pub use crate::location::{RemoteLocation, Scheme};
pub use crate::models::{CACHE_CONTROL_PUBLISHED, CONTENT_TYPE_HTML, CONTENT_TYPE_JSON, FileInfo, Headers};
pub use crate::path::validate as validate_path;
pub use crate::pattern::ExcludePattern;
pub use crate::sync::{PushOptions, RemoteStorage, SyncReport};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
