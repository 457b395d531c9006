//! `validate` and `why` commands.

use crate::config::{LockguardConfig, RepositoryConfig};
use crate::error::CliError;
use crate::sources;
use lockguard_core::manifest::MANIFEST_DOCUMENT;
use lockguard_core::lockfile::LOCK_DOCUMENT;
use lockguard_core::{Dependent, Manifest, PartialValidationMode, Validator};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Command-line values of `validate`. Unset values fall back to the
/// configuration file.
#[derive(Debug, Clone, Default, PartialEq, clap::Args)]
pub struct ValidateFlags {
    /// Path to composer.json
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    /// Path to composer.lock
    #[arg(long)]
    pub lock: Option<PathBuf>,
    /// A packages.json to use as a metadata source
    #[arg(long = "repository", value_name = "PATH")]
    pub repositories: Vec<PathBuf>,
    /// A lock file whose packages are used as a metadata source
    #[arg(long = "lock-repository", value_name = "PATH")]
    pub lock_repositories: Vec<PathBuf>,
    /// Previously validated lock file; enables partial validation
    #[arg(long, value_name = "PATH")]
    pub trusted_lock: Option<PathBuf>,
    /// Package changed since the trusted lock
    #[arg(long = "touched", value_name = "NAME", requires = "trusted_lock")]
    pub touched: Vec<String>,
    /// Which dependencies of the touched packages are validated too
    #[arg(long, value_parser = parse_mode, requires = "trusted_lock")]
    pub mode: Option<PartialValidationMode>,
}

fn parse_mode(s: &str) -> Result<PartialValidationMode, String> {
    s.parse()
}

/// Inputs of a validation run, after merging flags over configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateOptions {
    pub manifest: PathBuf,
    pub lock: PathBuf,
    /// Extra sources, queried before the manifest's repositories.
    pub repositories: Vec<RepositoryConfig>,
    /// Lock file trusted for packages outside the partial scope.
    pub trusted_lock: Option<PathBuf>,
    pub touched: Vec<String>,
    pub mode: PartialValidationMode,
}

impl ValidateOptions {
    /// Merge command-line values over `config`. Flag repositories come first.
    pub fn merge(config: &LockguardConfig, flags: ValidateFlags) -> Result<Self, CliError> {
        if flags.trusted_lock.is_none() && !flags.touched.is_empty() {
            return Err(CliError::Usage("--touched requires --trusted-lock".to_string()));
        }

        let mut repositories: Vec<RepositoryConfig> = flags
            .repositories
            .into_iter()
            .map(|path| RepositoryConfig::Packages { path })
            .chain(
                flags
                    .lock_repositories
                    .into_iter()
                    .map(|path| RepositoryConfig::Lock { path }),
            )
            .collect();
        repositories.extend(config.repositories.iter().cloned());

        Ok(Self {
            manifest: flags
                .manifest
                .or_else(|| config.manifest.clone())
                .unwrap_or_else(|| PathBuf::from(MANIFEST_DOCUMENT)),
            lock: flags
                .lock
                .or_else(|| config.lock.clone())
                .unwrap_or_else(|| PathBuf::from(LOCK_DOCUMENT)),
            repositories,
            trusted_lock: flags.trusted_lock,
            touched: flags.touched,
            mode: flags.mode.or(config.partial.mode).unwrap_or_default(),
        })
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated {
    pub packages: usize,
}

/// Load the manifest and build a validator over every configured source.
pub fn build_validator(
    manifest_path: &Path,
    repositories: &[RepositoryConfig],
) -> Result<Validator, CliError> {
    let document = sources::read_json(manifest_path)?;
    let manifest = Manifest::from_value(&document)?;
    let base = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut validator = Validator::new(manifest.root);
    for repository in repositories {
        validator.add_repository(Box::new(sources::load_configured(repository)?));
    }
    for source in sources::from_manifest(&manifest.repositories, base)? {
        validator.add_repository(Box::new(source));
    }
    Ok(validator)
}

/// Run a full or partial validation.
pub fn validate(options: &ValidateOptions) -> Result<Validated, CliError> {
    let validator = build_validator(&options.manifest, &options.repositories)?;
    let lock = sources::load_lock(&options.lock)?;

    match &options.trusted_lock {
        Some(path) => {
            let existing = sources::load_lock(path)?;
            debug!(touched = ?options.touched, mode = %options.mode, "partial validation");
            validator.validate_partial(&existing, &lock, options.touched.as_slice(), options.mode)?;
        }
        None => validator.validate_full(&lock)?,
    }
    Ok(Validated { packages: lock.len() })
}

/// The dependents of `package` in the lock.
pub fn why(manifest: &Path, lock: &Path, package: &str) -> Result<Vec<Dependent>, CliError> {
    let document = sources::read_json(manifest)?;
    let manifest = Manifest::from_value(&document)?;
    let lock = sources::load_lock(lock)?;
    Ok(Validator::new(manifest.root).explain(&lock, package)?)
}
