//! Validation entry points.
//!
//! A run goes through the same steps in both modes:
//!
//! 1. parse every locked entry
//! 2. build the requirement graph
//! 3. reachability: every locked package is needed
//! 4. removal: every widened requirement still has a candidate in the lock
//! 5. metadata: every locked package matches its authoritative counterpart
//!
//! The first failure ends the run. Nothing is written anywhere.

use crate::checks::{check_removed, check_unused};
use crate::error::{Authority, ValidationError};
use crate::graph::{LockGraph, ROOT};
use crate::integrity::verify_package;
use crate::lockfile::{LockDocument, LOCK_DOCUMENT};
use crate::manifest::{RootAlias, RootPackage};
use crate::package::PackageRecord;
use crate::pool::{Pool, StabilityPolicy};
use crate::repository::{ArraySource, MetadataSource};
use crate::scope::{resolve_scope, PartialValidationMode};
use std::sync::Arc;
use tracing::{debug, info, info_span};

/// Label of the trusted lock when used as a metadata source.
pub const TRUSTED_LOCK_LABEL: &str = "existing composer.lock";

/// A locked package requiring another one, as reported by [`Validator::explain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    pub name: String,
    /// Pretty version; `None` for the root.
    pub version: Option<String>,
    /// The name required, which differs from the explained package when the
    /// requirement lands on it through a provide or replace.
    pub target: String,
    pub constraint: String,
}

/// Validates lock documents of one root package against its repositories.
pub struct Validator {
    root: RootPackage,
    repositories: Vec<Box<dyn MetadataSource>>,
}

impl Validator {
    pub fn new(root: RootPackage) -> Self {
        Self {
            root,
            repositories: Vec::new(),
        }
    }

    /// Add a live repository; repositories are queried in the order added.
    pub fn with_repository(mut self, source: impl MetadataSource + 'static) -> Self {
        self.repositories.push(Box::new(source));
        self
    }

    pub fn add_repository(&mut self, source: Box<dyn MetadataSource>) {
        self.repositories.push(source);
    }

    /// Validate every locked package against the live repositories.
    pub fn validate_full(&self, lock: &LockDocument) -> Result<(), ValidationError> {
        let _span = info_span!(
            "validate_full",
            root = %self.root.name(),
            packages = lock.len()
        )
        .entered();

        let (records, _graph) = self.check_structure(lock)?;
        let live = self.live_pool(lock);
        for record in &records {
            verify_package(record, &live, Authority::Repositories)?;
        }

        info!(packages = records.len(), "lock validated");
        Ok(())
    }

    /// Validate `new` against the live repositories for the packages in scope,
    /// and against the trusted `existing` lock for everything else.
    pub fn validate_partial<S: AsRef<str>>(
        &self,
        existing: &LockDocument,
        new: &LockDocument,
        touched: &[S],
        mode: PartialValidationMode,
    ) -> Result<(), ValidationError> {
        let _span = info_span!(
            "validate_partial",
            root = %self.root.name(),
            packages = new.len(),
            touched = touched.len(),
            mode = %mode
        )
        .entered();

        let (records, graph) = self.check_structure(new)?;
        let scope = resolve_scope(&graph, touched, mode)?;

        let trusted_source = ArraySource::from_lock(TRUSTED_LOCK_LABEL, existing)?;
        let mut trusted = Pool::new(Arc::clone(&self.root.record));
        trusted.add_aliases(existing.aliases().iter().cloned());
        trusted.add_source(&trusted_source);

        let live = self.live_pool(new);
        for record in &records {
            if scope.is_live(&record.name) {
                verify_package(record, &live, Authority::Repositories)?;
            } else if scope.is_trusted(&record.name) {
                verify_package(record, &trusted, Authority::TrustedLock)?;
            } else {
                return Err(ValidationError::Unexpected(format!(
                    "package \"{}\" was assigned neither to the repositories nor to the existing composer.lock",
                    record.pretty_name
                )));
            }
        }

        info!(
            live = scope.live.len(),
            trusted = scope.trusted.len(),
            "lock validated"
        );
        Ok(())
    }

    /// Everything that requires `name` in `lock`, directly or through a name
    /// the package provides or replaces.
    pub fn explain(
        &self,
        lock: &LockDocument,
        name: &str,
    ) -> Result<Vec<Dependent>, ValidationError> {
        let records = lock.records()?;
        let graph = LockGraph::build(&self.root, &records);
        let name = name.to_lowercase();

        let mut names = vec![name.clone()];
        if let Some(id) = graph.lookup(&name) {
            names.extend(graph.node(id).provided_links().map(|link| link.target.clone()));
        }

        let mut dependents = Vec::new();
        for target in &names {
            for edge in graph.incoming(target) {
                let requirer = graph.node(edge.source);
                if requirer.name == name {
                    continue;
                }
                dependents.push(Dependent {
                    name: requirer.pretty_name.clone(),
                    version: (edge.source != ROOT).then(|| requirer.version.pretty().to_string()),
                    target: edge.pretty_target.clone(),
                    constraint: edge.pretty_constraint.clone(),
                });
            }
        }
        Ok(dependents)
    }

    /// Steps 1 to 4, shared by both modes.
    fn check_structure(
        &self,
        lock: &LockDocument,
    ) -> Result<(Vec<Arc<PackageRecord>>, LockGraph), ValidationError> {
        let records = lock.records()?;
        let graph = LockGraph::build(&self.root, &records);
        debug!(nodes = graph.len(), edges = graph.edges().len(), "built lock graph");

        check_unused(&graph)?;

        let lock_source = ArraySource::from_records(LOCK_DOCUMENT, records.iter().cloned());
        let mut lock_pool = Pool::new(Arc::clone(&self.root.record));
        lock_pool.add_aliases(self.aliases(lock));
        lock_pool.add_source(&lock_source);
        check_removed(&graph, &lock_pool)?;

        Ok((records, graph))
    }

    fn live_pool(&self, lock: &LockDocument) -> Pool<'_> {
        let mut pool = Pool::new(Arc::clone(&self.root.record));
        pool.add_aliases(self.aliases(lock));
        pool.set_stability(StabilityPolicy::from_root(&self.root));
        for repository in &self.repositories {
            pool.add_source(repository.as_ref());
        }
        pool
    }

    fn aliases(&self, lock: &LockDocument) -> Vec<RootAlias> {
        self.root
            .aliases
            .iter()
            .chain(lock.aliases())
            .cloned()
            .collect()
    }
}
