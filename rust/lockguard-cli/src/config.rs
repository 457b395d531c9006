//! Configuration file parsing for `lockguard.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `<config dir>/lockguard/lockguard.toml` if no project-level file is found.
//! Relative paths in a configuration file are relative to the file itself.

use crate::error::CliError;
use lockguard_core::PartialValidationMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "lockguard.toml";

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct LockguardConfig {
    /// Path of `composer.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    /// Path of `composer.lock`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<PathBuf>,
    #[serde(default, rename = "repository", skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub partial: PartialSection,
}

/// An extra metadata source: `[[repository]]`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RepositoryConfig {
    /// A Composer `packages.json` dump.
    Packages { path: PathBuf },
    /// Another lock file whose packages are taken as authoritative.
    Lock { path: PathBuf },
}

impl RepositoryConfig {
    pub fn path(&self) -> &Path {
        match self {
            RepositoryConfig::Packages { path } | RepositoryConfig::Lock { path } => path,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct PartialSection {
    /// Default mode of partial validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PartialValidationMode>,
}

impl LockguardConfig {
    /// Load config from `lockguard.toml`, searching the current dir then
    /// parents. Returns `Default` when no file is found.
    pub fn load() -> Result<Self, CliError> {
        Ok(Self::load_with_path()?.map(|(_path, cfg)| cfg).unwrap_or_default())
    }

    /// Load config and return the path of the file that was found.
    pub fn load_with_path() -> Result<Option<(PathBuf, Self)>, CliError> {
        let cwd = std::env::current_dir().map_err(|source| CliError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        if let Some(found) = Self::find_from(&cwd)? {
            return Ok(Some(found));
        }
        if let Some(dir) = dirs::config_dir() {
            let global = dir.join("lockguard").join(CONFIG_FILE);
            if global.is_file() {
                let cfg = Self::load_from(&global)?;
                return Ok(Some((global, cfg)));
            }
        }
        Ok(None)
    }

    /// Search `start` and its ancestors for a configuration file.
    pub fn find_from(start: &Path) -> Result<Option<(PathBuf, Self)>, CliError> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                let cfg = Self::load_from(&config_path)?;
                return Ok(Some((config_path, cfg)));
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    /// Load config from a specific file, resolving its relative paths against
    /// the file's directory.
    pub fn load_from(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::parse(&content).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(match path.parent() {
            Some(base) => cfg.rebase(base),
            None => cfg,
        })
    }

    /// Parse a TOML string directly.
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Make every relative path relative to `base` instead.
    pub fn rebase(mut self, base: &Path) -> Self {
        let join = |path: PathBuf| if path.is_relative() { base.join(path) } else { path };
        self.manifest = self.manifest.map(join);
        self.lock = self.lock.map(join);
        self.repositories = self
            .repositories
            .into_iter()
            .map(|repository| match repository {
                RepositoryConfig::Packages { path } => {
                    RepositoryConfig::Packages { path: join(path) }
                }
                RepositoryConfig::Lock { path } => RepositoryConfig::Lock { path: join(path) },
            })
            .collect();
        self
    }

    /// Generate a default `lockguard.toml` template.
    pub fn default_template() -> &'static str {
        r#"# Lockguard Configuration

# manifest = "composer.json"
# lock = "composer.lock"

# Local metadata sources, queried before the repositories of composer.json
# [[repository]]
# type = "packages"
# path = "mirror/packages.json"
#
# [[repository]]
# type = "lock"
# path = "reviewed/composer.lock"

# [partial]
# mode = "only-listed"  # or "with-dependencies", "with-dependencies-no-root-require"
"#
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
