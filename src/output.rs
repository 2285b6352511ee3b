//! Output tree documents outside per-repository state.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use probeinfo_glean::Repositories;
use probeinfo_registry::{Transformed, iso_date, json};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;

pub const FIREFOX: &str = "firefox";
pub const GLEAN: &str = "glean";
pub const GENERAL: &str = "general";
pub const REVISIONS: &str = "revisions";
pub const REPOSITORIES: &str = "repositories";
pub const INDEX_HTML: &str = "index.html";
const ALL_PROBES: &str = "all_probes";

const INDEX_CONTENT: &str = "<html><head><title>Mozilla Probe Info</title></head><body>This site contains metadata used by \
Mozilla's data collection infrastructure, for more information see \
<a href=\"https://mozilla.github.io/probe-scraper/\">the generated documentation</a>.</body></html>";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct General {
    #[serde(with = "iso_date")]
    last_update: PrimitiveDateTime,
}

fn dump<T: Serialize + ?Sized>(value: &T, dir: &Path, name: &str) -> Result<PathBuf> {
    json::dump(value, dir, name).map_err(|e| e.raise(ErrorKind::Output(dir.to_path_buf())))
}

/// Write the moz-central documents. Returns the subtree to publish.
#[tracing::instrument(skip(transformed), fields(out_dir = %out_dir.display()))]
pub fn write_moz_central(transformed: &Transformed, out_dir: &Path, now: PrimitiveDateTime) -> Result<Vec<PathBuf>> {
    let root = out_dir.join(FIREFOX);
    dump(&General { last_update: now }, &root, GENERAL)?;
    dump(&transformed.revisions, &root, REVISIONS)?;
    for (channel, probes) in &transformed.channels {
        tracing::info!(channel, probes = probes.len(), "writing channel probes");
        dump(probes, &root.join(channel).join("main"), ALL_PROBES)?;
    }
    Ok(vec![root])
}

pub fn write_repositories(repositories: &Repositories, out_dir: &Path) -> Result<PathBuf> {
    dump(repositories, out_dir, REPOSITORIES)
}

/// Write the top-level `general` document and the static index page.
pub fn write_general(out_dir: &Path, now: PrimitiveDateTime) -> Result<Vec<PathBuf>> {
    let general = dump(&General { last_update: now }, out_dir, GENERAL)?;
    let index = out_dir.join(INDEX_HTML);
    std::fs::write(&index, INDEX_CONTENT).or_raise(|| ErrorKind::Output(index.clone()))?;
    Ok(vec![general, index])
}
