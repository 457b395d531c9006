//! Root package requirements read from `composer.json`.

use crate::error::{PackageError, ValidationError};
use crate::package::{Link, PackageRecord};
use crate::semver::{split_inline_alias, stability_flag, Stability, Version};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const MANIFEST_DOCUMENT: &str = "composer.json";

/// Name given to a root package that does not declare one.
pub const DEFAULT_ROOT_NAME: &str = "__root__";

/// Version given to a root package that does not declare one.
pub const DEFAULT_ROOT_VERSION: &str = "1.0.0";

/// An alias making `package` at `version` also answer for `alias`.
///
/// Declared inline in the root requirements (`"dev-main as 1.0.0"`) or listed
/// in a lock's `aliases` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootAlias {
    /// Lowercase package name.
    pub package: String,
    pub version: Version,
    pub alias: Version,
}

/// The project itself, as seen by the validator.
#[derive(Debug, Clone)]
pub struct RootPackage {
    /// Name, version, `require`, `provide` and `replace` of the root.
    pub record: Arc<PackageRecord>,
    pub dev_requires: Vec<Link>,
    pub aliases: Vec<RootAlias>,
    pub minimum_stability: Stability,
    /// Per-package stability overrides keyed by lowercase name.
    pub stability_flags: BTreeMap<String, Stability>,
}

impl RootPackage {
    /// Build a root with the given requirements and no other configuration.
    pub fn new(record: PackageRecord) -> Self {
        Self {
            record: Arc::new(record),
            dev_requires: Vec::new(),
            aliases: Vec::new(),
            minimum_stability: Stability::Stable,
            stability_flags: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// `require` followed by `require-dev`.
    pub fn all_requires(&self) -> impl Iterator<Item = &Link> {
        self.record.requires.iter().chain(self.dev_requires.iter())
    }
}

/// A parsed `composer.json`.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub root: RootPackage,
    /// Raw `repositories` definitions, resolved by the caller.
    pub repositories: Vec<Value>,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::malformed(MANIFEST_DOCUMENT, e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let Value::Object(document) = value else {
            return Err(ValidationError::malformed(
                MANIFEST_DOCUMENT,
                "the document must be an object",
            ));
        };

        let mut entry = Map::new();
        entry.insert(
            "name".to_string(),
            document
                .get("name")
                .cloned()
                .unwrap_or_else(|| Value::String(DEFAULT_ROOT_NAME.to_string())),
        );
        entry.insert(
            "version".to_string(),
            document
                .get("version")
                .cloned()
                .unwrap_or_else(|| Value::String(DEFAULT_ROOT_VERSION.to_string())),
        );
        for field in ["require", "provide", "replace"] {
            if let Some(links) = document.get(field) {
                entry.insert(field.to_string(), links.clone());
            }
        }
        let record = PackageRecord::from_entry(&entry)
            .map_err(|e| ValidationError::from_package(MANIFEST_DOCUMENT, e))?;

        // require-dev parses with the same rules as require
        let dev_requires = match document.get("require-dev") {
            Some(links) => {
                let mut dev_entry = Map::new();
                dev_entry.insert("name".to_string(), Value::String(record.pretty_name.clone()));
                dev_entry.insert(
                    "version".to_string(),
                    Value::String(record.version.pretty().to_string()),
                );
                dev_entry.insert("require".to_string(), links.clone());
                PackageRecord::from_entry(&dev_entry)
                    .map_err(|e| {
                        let e = rename_field(e, "require-dev");
                        ValidationError::from_package(MANIFEST_DOCUMENT, e)
                    })?
                    .requires
            }
            None => Vec::new(),
        };

        let minimum_stability = match document.get("minimum-stability") {
            None | Some(Value::Null) => Stability::Stable,
            Some(Value::String(s)) => Stability::parse(s).ok_or_else(|| {
                ValidationError::malformed(
                    MANIFEST_DOCUMENT,
                    format!("unknown minimum-stability \"{}\"", s),
                )
            })?,
            Some(_) => {
                return Err(ValidationError::malformed(
                    MANIFEST_DOCUMENT,
                    "minimum-stability must be a string",
                ))
            }
        };

        let mut aliases = Vec::new();
        let mut stability_flags = BTreeMap::new();
        for link in record.requires.iter().chain(dev_requires.iter()) {
            if let Some((real, alias)) = split_inline_alias(&link.pretty_constraint) {
                let alias = RootAlias {
                    package: link.target.clone(),
                    version: Version::parse(real)?,
                    alias: Version::parse(alias)?,
                };
                debug!(package = %alias.package, alias = %alias.alias, "inline alias");
                aliases.push(alias);
            }
            if let Some(flag) = extract_stability_flag(&link.pretty_constraint) {
                if flag < minimum_stability {
                    stability_flags.insert(link.target.clone(), flag);
                }
            }
        }

        let repositories = match document.get("repositories") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            // the keyed form `{"name": {...}}` is accepted as well
            Some(Value::Object(map)) => map.values().cloned().collect(),
            Some(_) => {
                return Err(ValidationError::malformed(
                    MANIFEST_DOCUMENT,
                    "repositories must be an array",
                ))
            }
        };

        Ok(Self {
            root: RootPackage {
                record: Arc::new(record),
                dev_requires,
                aliases,
                minimum_stability,
                stability_flags,
            },
            repositories,
        })
    }
}

fn rename_field(mut err: PackageError, field: &str) -> PackageError {
    err.field = field.to_string();
    err
}

/// The least stable stability a requirement asks for, either through an
/// explicit `@flag` or by naming an unstable version directly.
fn extract_stability_flag(constraint: &str) -> Option<Stability> {
    let constraint = match split_inline_alias(constraint) {
        Some((real, _)) => real,
        None => constraint,
    };

    constraint
        .split('|')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            if let Some(flag) = stability_flag(part) {
                return Some(flag);
            }
            if part.contains([',', ' ']) {
                return None;
            }
            let bare = part.trim_start_matches(['<', '>', '=', '!', '^', '~']);
            if bare.to_ascii_lowercase().starts_with("dev-") {
                return Some(Stability::Dev);
            }
            Version::parse(bare)
                .ok()
                .map(|v| v.stability())
                .filter(|s| *s != Stability::Stable)
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let manifest = Manifest::from_value(&json!({})).unwrap();
        assert_eq!(manifest.root.name(), DEFAULT_ROOT_NAME);
        assert_eq!(manifest.root.record.version.normalized(), "1.0.0.0");
        assert_eq!(manifest.root.minimum_stability, Stability::Stable);
        assert!(manifest.root.all_requires().next().is_none());
        assert!(manifest.repositories.is_empty());
    }

    #[test]
    fn test_requires_and_dev_requires() {
        let manifest = Manifest::from_value(&json!({
            "name": "acme/app",
            "require": {"php": ">=8.1", "vendor/a": "^1.0"},
            "require-dev": {"vendor/test": "^2.0"},
            "replace": {"acme/legacy": "self.version"}
        }))
        .unwrap();
        let root = &manifest.root;
        assert_eq!(root.name(), "acme/app");
        let targets: Vec<&str> = root.all_requires().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["php", "vendor/a", "vendor/test"]);
        assert!(root.record.provides_name("acme/legacy"));
    }

    #[test]
    fn test_stability_configuration() {
        let manifest = Manifest::from_value(&json!({
            "minimum-stability": "beta",
            "require": {
                "vendor/a": "^1.0@dev",
                "vendor/b": "2.0.0-alpha1",
                "vendor/c": "^1.0@RC",
                "vendor/d": "dev-main as 1.0.0"
            }
        }))
        .unwrap();
        let root = &manifest.root;
        assert_eq!(root.minimum_stability, Stability::Beta);
        assert_eq!(root.stability_flags.get("vendor/a"), Some(&Stability::Dev));
        assert_eq!(root.stability_flags.get("vendor/b"), Some(&Stability::Alpha));
        assert_eq!(root.stability_flags.get("vendor/c"), None);
        assert_eq!(root.stability_flags.get("vendor/d"), Some(&Stability::Dev));
        assert_eq!(root.aliases.len(), 1);
        assert_eq!(root.aliases[0].version.normalized(), "dev-main");
        assert_eq!(root.aliases[0].alias.normalized(), "1.0.0.0");
    }

    #[test]
    fn test_repositories_are_kept_raw() {
        let manifest = Manifest::from_value(&json!({
            "repositories": [{"type": "composer", "url": "https://repo.example.org"}]
        }))
        .unwrap();
        assert_eq!(manifest.repositories[0]["type"], "composer");
    }

    #[test]
    fn test_malformed_manifest() {
        let err = Manifest::from_value(&json!([])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedInput);

        let err = Manifest::from_value(&json!({"require-dev": {"a/b": 1}})).unwrap_err();
        assert!(err.to_string().contains("require-dev"), "{}", err);

        let err = Manifest::from_slice(b"{not json").unwrap_err();
        assert!(err.to_string().starts_with("The \"composer.json\" document is invalid"));
    }
}
