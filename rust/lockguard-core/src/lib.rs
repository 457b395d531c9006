//! Lockguard core library.
//!
//! Verifies a Composer lock document against its manifest and against
//! authoritative package metadata: every locked package must be needed, every
//! requirement must still resolve inside the lock, and every locked package's
//! metadata must match what its repository (or a trusted lock) records.
//!
//! The library never resolves dependencies and never selects versions.

pub mod checks;
pub mod error;
pub mod graph;
pub mod integrity;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod pool;
pub mod repository;
pub mod scope;
pub mod semver;
pub mod validator;

pub use error::{Authority, ErrorKind, PackageError, SourceError, ValidationError};
pub use lockfile::LockDocument;
pub use manifest::{Manifest, RootAlias, RootPackage};
pub use package::{is_platform_package, Link, PackageRecord};
pub use pool::{Candidate, Match, Pool, StabilityPolicy};
pub use repository::{ArraySource, MetadataSource};
pub use scope::{resolve_scope, PartialValidationMode, ValidationScope};
pub use semver::{Constraint, SemverError, Stability, Version};
pub use validator::{Dependent, Validator};
