//! Error taxonomy for validation runs.
//!
//! Every entry point returns at most one [`ValidationError`]. Lower layers have
//! their own error enums ([`SemverError`], [`PackageError`], [`SourceError`])
//! which convert into it.

use crate::semver::SemverError;
use std::fmt;

/// Which authoritative metadata a locked package was compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    /// The live repositories configured for the run.
    Repositories,
    /// The previously trusted lock of a partial validation.
    TrustedLock,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Repositories => write!(f, "repositories"),
            Authority::TrustedLock => write!(f, "trusted lock"),
        }
    }
}

/// Field-less view of [`ValidationError`], for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    UnusedPackage,
    RemovedPackage,
    MetadataMismatch,
    ExpectedPackageMissing,
    Unexpected,
}

/// The single failure of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("The \"{document}\" document is invalid: {message}")]
    MalformedInput { document: String, message: String },

    #[error("The package \"{name}\" in version \"{version}\" is not required by any package in the composer.json or its transitive dependencies.")]
    UnusedPackage { name: String, version: String },

    #[error("At least one package required \"{name}\" in \"{constraint}\" but it is missing in the composer.lock.")]
    RemovedPackage { name: String, constraint: String },

    #[error("{}", mismatch_message(.name, .version, .against, .diff))]
    MetadataMismatch {
        name: String,
        version: String,
        against: Authority,
        diff: String,
    },

    #[error("The package \"{name}\" in version \"{version}\" was expected in the existing composer.lock but could not be found.")]
    ExpectedPackageMissing { name: String, version: String },

    #[error("{0}")]
    Unexpected(String),
}

fn mismatch_message(name: &str, version: &str, against: &Authority, diff: &str) -> String {
    let tail = match against {
        Authority::Repositories => "does not match any of the metadata in the repositories.",
        Authority::TrustedLock => "does not match the metadata in the existing composer.lock.",
    };
    let mut message = format!(
        "The metadata of package \"{}\" in version \"{}\" {}",
        name, version, tail
    );
    if !diff.is_empty() {
        message.push_str("\n\n");
        message.push_str(diff);
    }
    message
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MalformedInput { .. } => ErrorKind::MalformedInput,
            ValidationError::UnusedPackage { .. } => ErrorKind::UnusedPackage,
            ValidationError::RemovedPackage { .. } => ErrorKind::RemovedPackage,
            ValidationError::MetadataMismatch { .. } => ErrorKind::MetadataMismatch,
            ValidationError::ExpectedPackageMissing { .. } => ErrorKind::ExpectedPackageMissing,
            ValidationError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub(crate) fn malformed(document: &str, message: impl Into<String>) -> Self {
        ValidationError::MalformedInput {
            document: document.to_string(),
            message: message.into(),
        }
    }

    /// Attach a document name to a package parsing failure.
    pub(crate) fn from_package(document: &str, err: PackageError) -> Self {
        Self::malformed(document, err.to_string())
    }
}

impl From<SemverError> for ValidationError {
    fn from(err: SemverError) -> Self {
        ValidationError::Unexpected(err.to_string())
    }
}

impl From<SourceError> for ValidationError {
    fn from(err: SourceError) -> Self {
        ValidationError::Unexpected(err.to_string())
    }
}

/// A raw package entry could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed package{}: field \"{field}\" {message}", package_suffix(.package))]
pub struct PackageError {
    /// Package name when it could be read.
    pub package: Option<String>,
    pub field: String,
    pub message: String,
}

fn package_suffix(package: &Option<String>) -> String {
    match package {
        Some(name) => format!(" \"{}\"", name),
        None => String::new(),
    }
}

impl PackageError {
    pub fn new(package: Option<&str>, field: &str, message: impl Into<String>) -> Self {
        Self {
            package: package.map(str::to_string),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// A metadata source failed to answer a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("repository \"{source_label}\" is unavailable: {message}")]
    Unavailable { source_label: String, message: String },
    #[error("repository \"{source_label}\" returned a malformed package: {error}")]
    MalformedRecord { source_label: String, error: PackageError },
}
