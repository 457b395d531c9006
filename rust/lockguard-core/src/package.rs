//! Package records parsed from raw Composer package entries.

use crate::error::PackageError;
use crate::semver::{Constraint, Version};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

static PLATFORM_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:php(?:-64bit|-ipv6|-zts|-debug)?|hhvm|(?:ext|lib)-[a-z0-9](?:[_.-]?[a-z0-9]+)*|composer(?:-(?:plugin|runtime))?-api|composer)$",
    )
    .expect("platform package regex is valid")
});

/// Whether `name` is a runtime pseudo package (`php`, `ext-json`, ...) that is
/// never part of a lock.
pub fn is_platform_package(name: &str) -> bool {
    PLATFORM_PACKAGE.is_match(name)
}

// =============================================================================
// Links
// =============================================================================

/// A `require`, `provide` or `replace` entry of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Lowercase target name.
    pub target: String,
    pub pretty_target: String,
    pub constraint: Constraint,
    pub pretty_constraint: String,
}

impl Link {
    /// Parse a link, resolving `self.version` to `own_version`.
    pub fn parse(target: &str, constraint: &str, own_version: &Version) -> Result<Self, String> {
        let parsed = if constraint.trim() == "self.version" {
            Constraint::Exact(own_version.clone())
        } else {
            Constraint::parse(constraint).map_err(|e| e.to_string())?
        };
        Ok(Self {
            target: target.to_lowercase(),
            pretty_target: target.to_string(),
            constraint: parsed,
            pretty_constraint: constraint.to_string(),
        })
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pretty_target, self.pretty_constraint)
    }
}

// =============================================================================
// Package Record
// =============================================================================

/// One known package at one exact version.
///
/// Records are immutable once parsed; `metadata` keeps the raw entry with its
/// original field order and is only used for integrity comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
    pub pretty_name: String,
    /// Lowercase identity key.
    pub name: String,
    pub version: Version,
    pub requires: Vec<Link>,
    pub provides: Vec<Link>,
    pub replaces: Vec<Link>,
    /// Version this record is aliased to through `extra.branch-alias`.
    pub branch_alias: Option<Version>,
    pub metadata: Map<String, Value>,
}

impl PackageRecord {
    /// Parse a raw package entry as found in a lock file or repository.
    pub fn from_entry(entry: &Map<String, Value>) -> Result<Self, PackageError> {
        let pretty_name = match entry.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => return Err(PackageError::new(None, "name", "must be a non-empty string")),
            None => return Err(PackageError::new(None, "name", "is missing")),
        };
        let who = Some(pretty_name.as_str());

        let version = match entry.get("version") {
            Some(Value::String(raw)) => Version::parse(raw)
                .map_err(|e| PackageError::new(who, "version", e.to_string()))?,
            Some(_) => return Err(PackageError::new(who, "version", "must be a string")),
            None => return Err(PackageError::new(who, "version", "is missing")),
        };

        let requires = parse_links(entry, "require", &pretty_name, &version)?;
        let provides = parse_links(entry, "provide", &pretty_name, &version)?;
        let replaces = parse_links(entry, "replace", &pretty_name, &version)?;
        let branch_alias = branch_alias_of(entry, &version);

        Ok(Self {
            name: pretty_name.to_lowercase(),
            pretty_name,
            version,
            requires,
            provides,
            replaces,
            branch_alias,
            metadata: entry.clone(),
        })
    }

    /// Parse a raw entry held in a [`Value`].
    pub fn from_value(value: &Value) -> Result<Self, PackageError> {
        match value {
            Value::Object(entry) => Self::from_entry(entry),
            _ => Err(PackageError::new(None, "package", "must be an object")),
        }
    }

    /// Provide and replace links, in that order.
    pub fn provided_links(&self) -> impl Iterator<Item = &Link> {
        self.provides.iter().chain(self.replaces.iter())
    }

    /// Whether this record declares a provide or replace of `name`.
    pub fn provides_name(&self, name: &str) -> bool {
        self.provided_links().any(|link| link.target == name)
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pretty_name, self.version.pretty())
    }
}

fn parse_links(
    entry: &Map<String, Value>,
    field: &str,
    package: &str,
    version: &Version,
) -> Result<Vec<Link>, PackageError> {
    let map = match entry.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        // an empty JSON array stands in for an empty object in some dumps
        Some(Value::Array(items)) if items.is_empty() => return Ok(Vec::new()),
        Some(_) => return Err(PackageError::new(Some(package), field, "must be an object")),
    };

    let mut links = Vec::with_capacity(map.len());
    for (target, constraint) in map {
        let Value::String(constraint) = constraint else {
            return Err(PackageError::new(
                Some(package),
                field,
                format!("entry \"{}\" must be a string", target),
            ));
        };
        let link = Link::parse(target, constraint, version).map_err(|e| {
            PackageError::new(Some(package), field, format!("\"{}\": {}", target, e))
        })?;
        links.push(link);
    }
    Ok(links)
}

/// The alias declared for `version` in `extra.branch-alias`, if any.
fn branch_alias_of(entry: &Map<String, Value>, version: &Version) -> Option<Version> {
    let aliases = entry.get("extra")?.get("branch-alias")?.as_object()?;
    aliases.iter().find_map(|(branch, alias)| {
        let branch = Version::parse(branch).ok()?;
        if &branch != version {
            return None;
        }
        Version::parse(alias.as_str()?).ok()
    })
}
