//! Loading of `composer.lock` documents.
//!
//! A lock document is accepted when it is a JSON object whose `packages` and
//! `packages-dev` keys both exist and hold arrays of objects. Everything else
//! in the document is ignored apart from the `aliases` section. Package entries
//! are kept raw until [`LockDocument::records`] parses them.

use crate::error::ValidationError;
use crate::manifest::RootAlias;
use crate::package::PackageRecord;
use crate::semver::Version;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub const LOCK_DOCUMENT: &str = "composer.lock";

// =============================================================================
// Lock Document
// =============================================================================

/// A prechecked lock document.
#[derive(Debug, Clone, PartialEq)]
pub struct LockDocument {
    packages: Vec<Map<String, Value>>,
    packages_dev: Vec<Map<String, Value>>,
    aliases: Vec<RootAlias>,
}

impl LockDocument {
    /// Parse and precheck a lock document from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::malformed(LOCK_DOCUMENT, e.to_string()))?;
        Self::from_value(&value)
    }

    /// Precheck an already parsed lock document.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let Value::Object(document) = value else {
            return Err(ValidationError::malformed(
                LOCK_DOCUMENT,
                "the document must be an object",
            ));
        };

        let packages = entries(document, "packages")?;
        let packages_dev = entries(document, "packages-dev")?;
        let aliases = match document.get("aliases") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_alias)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ValidationError::malformed(
                    LOCK_DOCUMENT,
                    "\"aliases\" must be an array",
                ))
            }
        };

        Ok(Self {
            packages,
            packages_dev,
            aliases,
        })
    }

    pub fn aliases(&self) -> &[RootAlias] {
        &self.aliases
    }

    /// Number of locked packages, dev packages included.
    pub fn len(&self) -> usize {
        self.packages.len() + self.packages_dev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse every entry, `packages` first then `packages-dev`.
    ///
    /// Package names must be unique across both sections.
    pub fn records(&self) -> Result<Vec<Arc<PackageRecord>>, ValidationError> {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(self.len());
        for entry in self.packages.iter().chain(self.packages_dev.iter()) {
            let record = PackageRecord::from_entry(entry)
                .map_err(|e| ValidationError::from_package(LOCK_DOCUMENT, e))?;
            if !seen.insert(record.name.clone()) {
                return Err(ValidationError::malformed(
                    LOCK_DOCUMENT,
                    format!("package \"{}\" is locked more than once", record.pretty_name),
                ));
            }
            records.push(Arc::new(record));
        }
        Ok(records)
    }
}

fn entries(
    document: &Map<String, Value>,
    key: &str,
) -> Result<Vec<Map<String, Value>>, ValidationError> {
    let Some(value) = document.get(key) else {
        return Err(ValidationError::malformed(
            LOCK_DOCUMENT,
            format!("the \"{}\" key is missing", key),
        ));
    };
    let Value::Array(items) = value else {
        return Err(ValidationError::malformed(
            LOCK_DOCUMENT,
            format!("\"{}\" must be an array", key),
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(entry) => Ok(entry.clone()),
            _ => Err(ValidationError::malformed(
                LOCK_DOCUMENT,
                format!("\"{}\"[{}] must be an object", key, i),
            )),
        })
        .collect()
}

fn alias_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, ValidationError> {
    value.get(name).and_then(Value::as_str).ok_or_else(|| {
        ValidationError::malformed(
            LOCK_DOCUMENT,
            format!("alias entries need a string \"{}\"", name),
        )
    })
}

fn parse_alias(value: &Value) -> Result<RootAlias, ValidationError> {
    let package = alias_field(value, "package")?;
    let version = Version::parse(alias_field(value, "version")?)?;
    let alias = match value.get("alias_normalized").and_then(Value::as_str) {
        Some(normalized) => Version::parse(normalized)?,
        None => Version::parse(alias_field(value, "alias")?)?,
    };
    Ok(RootAlias {
        package: package.to_lowercase(),
        version,
        alias,
    })
}
