//! The provider pool: which known packages satisfy a name and a constraint.
//!
//! A pool aggregates metadata sources in registration order and resolves
//! provides/replaces aliasing one hop deep. The root package is always an
//! implicit provider of its own name, whatever sources were added.

use crate::error::SourceError;
use crate::manifest::{RootAlias, RootPackage};
use crate::package::PackageRecord;
use crate::repository::MetadataSource;
use crate::semver::{Constraint, Stability};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// How a candidate satisfied a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Match {
    /// The root package answering for its own name.
    Root,
    /// Same name, version satisfies the constraint.
    Name,
    /// Same name, the `extra.branch-alias` version satisfies the constraint.
    BranchAlias,
    /// Same name, a root or lock alias of the version satisfies the constraint.
    Alias,
    Provide,
    Replace,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Match::Root => "root",
            Match::Name => "name",
            Match::BranchAlias => "branch alias",
            Match::Alias => "alias",
            Match::Provide => "provide",
            Match::Replace => "replace",
        };
        f.write_str(label)
    }
}

/// A record returned by [`Pool::what_provides`].
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: Arc<PackageRecord>,
    pub via: Match,
}

// =============================================================================
// Stability Policy
// =============================================================================

/// Minimum stability plus per-package overrides, as configured by the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub minimum: Stability,
    pub flags: BTreeMap<String, Stability>,
}

impl StabilityPolicy {
    pub fn from_root(root: &RootPackage) -> Self {
        Self {
            minimum: root.minimum_stability,
            flags: root.stability_flags.clone(),
        }
    }

    /// Whether a record is stable enough to be considered at all.
    pub fn accepts(&self, record: &PackageRecord) -> bool {
        let required = self.flags.get(&record.name).copied().unwrap_or(self.minimum);
        record.version.stability() >= required
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Sources queried for one validation run.
pub struct Pool<'a> {
    root: Arc<PackageRecord>,
    sources: Vec<&'a dyn MetadataSource>,
    aliases: Vec<RootAlias>,
    stability: Option<StabilityPolicy>,
}

impl<'a> Pool<'a> {
    pub fn new(root: Arc<PackageRecord>) -> Self {
        Self {
            root,
            sources: Vec::new(),
            aliases: Vec::new(),
            stability: None,
        }
    }

    /// Register a source; sources are queried in registration order.
    pub fn add_source(&mut self, source: &'a dyn MetadataSource) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn add_aliases<I>(&mut self, aliases: I) -> &mut Self
    where
        I: IntoIterator<Item = RootAlias>,
    {
        self.aliases.extend(aliases);
        self
    }

    /// Filter source records by stability. The root is never filtered.
    pub fn set_stability(&mut self, policy: StabilityPolicy) -> &mut Self {
        self.stability = Some(policy);
        self
    }

    /// Every record that satisfies `name` within `constraint`.
    ///
    /// Results come in source registration order and are not deduplicated.
    pub fn what_provides(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> Result<Vec<Candidate>, SourceError> {
        let name = name.to_lowercase();
        let mut candidates = Vec::new();

        if self.root.name == name {
            candidates.push(Candidate {
                record: Arc::clone(&self.root),
                via: Match::Root,
            });
        } else if let Some(via) = match_provided(&self.root, &name, constraint) {
            candidates.push(Candidate {
                record: Arc::clone(&self.root),
                via,
            });
        }

        for source in &self.sources {
            for record in source.find(&name, constraint)? {
                if let Some(policy) = &self.stability {
                    if !policy.accepts(&record) {
                        trace!(record = %record, source = source.label(), "filtered by stability");
                        continue;
                    }
                }
                if let Some(via) = self.match_record(&record, &name, constraint) {
                    candidates.push(Candidate { record, via });
                }
            }
        }

        trace!(name = %name, constraint = %constraint, found = candidates.len(), "what_provides");
        Ok(candidates)
    }

    fn match_record(
        &self,
        record: &PackageRecord,
        name: &str,
        constraint: &Constraint,
    ) -> Option<Match> {
        if record.name != name {
            return match_provided(record, name, constraint);
        }
        if constraint.matches(&record.version) {
            return Some(Match::Name);
        }
        if record
            .branch_alias
            .as_ref()
            .is_some_and(|alias| constraint.matches(alias))
        {
            return Some(Match::BranchAlias);
        }
        let aliased = self.aliases.iter().any(|alias| {
            alias.package == record.name
                && alias.version == record.version
                && constraint.matches(&alias.alias)
        });
        aliased.then_some(Match::Alias)
    }
}

/// One provide/replace hop: a link naming `name` whose range meets the query.
fn match_provided(record: &PackageRecord, name: &str, constraint: &Constraint) -> Option<Match> {
    if record
        .provides
        .iter()
        .any(|link| link.target == name && link.constraint.intersects(constraint))
    {
        return Some(Match::Provide);
    }
    if record
        .replaces
        .iter()
        .any(|link| link.target == name && link.constraint.intersects(constraint))
    {
        return Some(Match::Replace);
    }
    None
}
