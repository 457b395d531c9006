//! File-backed metadata sources.
//!
//! Turns repository definitions (from `composer.json`, `lockguard.toml` or the
//! command line) into [`ArraySource`]s. Nothing is fetched over the network:
//! remote repositories are skipped with a warning.

use crate::config::RepositoryConfig;
use crate::error::CliError;
use lockguard_core::{ArraySource, LockDocument};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name looked up when a `composer` repository points at a directory.
pub const PACKAGES_JSON: &str = "packages.json";

/// Read and parse a JSON document.
pub fn read_json(path: &Path) -> Result<Value, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// A `packages.json` dump on disk.
pub fn load_packages_json(path: &Path) -> Result<ArraySource, CliError> {
    let document = read_json(path)?;
    let source = ArraySource::from_packages_json(path.display().to_string(), &document)?;
    debug!(path = %path.display(), packages = source.len(), "loaded packages.json");
    Ok(source)
}

/// Every package of a lock file on disk, dev packages included.
pub fn load_lock_repository(path: &Path) -> Result<ArraySource, CliError> {
    let lock = load_lock(path)?;
    let source = ArraySource::from_lock(path.display().to_string(), &lock)?;
    debug!(path = %path.display(), packages = source.len(), "loaded lock repository");
    Ok(source)
}

/// A lock document on disk.
pub fn load_lock(path: &Path) -> Result<LockDocument, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LockDocument::from_slice(&bytes)?)
}

pub fn load_configured(repository: &RepositoryConfig) -> Result<ArraySource, CliError> {
    match repository {
        RepositoryConfig::Packages { path } => load_packages_json(path),
        RepositoryConfig::Lock { path } => load_lock_repository(path),
    }
}

/// Resolve the `repositories` of a manifest living in `base`.
pub fn from_manifest(repositories: &[Value], base: &Path) -> Result<Vec<ArraySource>, CliError> {
    let mut sources = Vec::new();
    for (index, definition) in repositories.iter().enumerate() {
        let Value::Object(fields) = definition else {
            debug!(index, "skipping non-object repository definition");
            continue;
        };
        let kind = fields.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "package" => {
                let label = format!("package repository #{}", index);
                sources.push(ArraySource::from_package_repository(label, definition)?);
            }
            "composer" => {
                let Some(url) = fields.get("url").and_then(Value::as_str) else {
                    return Err(CliError::Usage(format!(
                        "composer repository #{} has no url",
                        index
                    )));
                };
                match local_packages_json(url, base) {
                    Some(path) => sources.push(load_packages_json(&path)?),
                    None => warn!(url, "skipping remote composer repository"),
                }
            }
            // {"packagist.org": false}
            "" => debug!(index, "skipping repository definition without a type"),
            other => warn!(index, kind = other, "skipping unsupported repository type"),
        }
    }
    Ok(sources)
}

/// The `packages.json` a composer repository url designates, if it is local.
fn local_packages_json(url: &str, base: &Path) -> Option<PathBuf> {
    let path = match url.strip_prefix("file://") {
        Some(rest) => PathBuf::from(rest),
        None if url.contains("://") => return None,
        None => PathBuf::from(url),
    };
    let path = if path.is_relative() { base.join(path) } else { path };
    if path.is_dir() {
        Some(path.join(PACKAGES_JSON))
    } else {
        Some(path)
    }
}
