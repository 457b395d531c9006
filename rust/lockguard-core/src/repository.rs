//! Metadata sources: the repositories a [`Pool`](crate::pool::Pool) queries.

use crate::error::{SourceError, ValidationError};
use crate::lockfile::LockDocument;
use crate::package::PackageRecord;
use crate::semver::Constraint;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Something that knows package records.
///
/// `find` returns every record named `name` or declaring a provide or replace
/// of `name`. The constraint is a hint; the pool does the actual matching, so
/// a source may ignore it.
pub trait MetadataSource: Send + Sync {
    /// Human readable name used in logs.
    fn label(&self) -> &str;

    fn find(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> Result<Vec<Arc<PackageRecord>>, SourceError>;
}

// =============================================================================
// Array Source
// =============================================================================

/// An in-memory source, indexed by name and by provided/replaced name.
#[derive(Debug, Clone, Default)]
pub struct ArraySource {
    label: String,
    records: Vec<Arc<PackageRecord>>,
    by_name: HashMap<String, Vec<usize>>,
    by_provided: HashMap<String, Vec<usize>>,
}

impl ArraySource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn from_records<I>(label: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Arc<PackageRecord>>,
    {
        let mut source = Self::new(label);
        for record in records {
            source.add(record);
        }
        source
    }

    /// Every package of a lock document, dev packages included.
    pub fn from_lock(
        label: impl Into<String>,
        lock: &LockDocument,
    ) -> Result<Self, ValidationError> {
        Ok(Self::from_records(label, lock.records()?))
    }

    /// A Composer `packages.json` document.
    ///
    /// Both `{"packages": {name: {version: entry}}}` and
    /// `{"packages": {name: [entry, ...]}}` are accepted. Entries without a
    /// `name` take the key they are listed under.
    pub fn from_packages_json(
        label: impl Into<String>,
        document: &Value,
    ) -> Result<Self, SourceError> {
        let mut source = Self::new(label);
        let packages = document
            .get("packages")
            .ok_or_else(|| source.unavailable("the \"packages\" key is missing"))?;

        let by_package = match packages {
            Value::Object(map) => map,
            // an empty PHP array is dumped as []
            Value::Array(items) if items.is_empty() => return Ok(source),
            _ => return Err(source.unavailable("\"packages\" must be an object")),
        };

        for (name, versions) in by_package {
            let entries: Vec<&Value> = match versions {
                Value::Object(map) => map.values().collect(),
                Value::Array(items) => items.iter().collect(),
                _ => {
                    return Err(source.unavailable(format!(
                        "versions of \"{}\" must be an object or an array",
                        name
                    )))
                }
            };
            for entry in entries {
                let record = source.parse_entry(entry, Some(name))?;
                source.add(Arc::new(record));
            }
        }
        Ok(source)
    }

    /// An inline `{"type": "package", "package": ...}` repository definition.
    pub fn from_package_repository(
        label: impl Into<String>,
        definition: &Value,
    ) -> Result<Self, SourceError> {
        let mut source = Self::new(label);
        match definition.get("package") {
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let record = source.parse_entry(entry, None)?;
                    source.add(Arc::new(record));
                }
            }
            Some(entry @ Value::Object(_)) => {
                let record = source.parse_entry(entry, None)?;
                source.add(Arc::new(record));
            }
            _ => return Err(source.unavailable("\"package\" must be an object or an array")),
        }
        Ok(source)
    }

    pub fn add(&mut self, record: Arc<PackageRecord>) {
        let index = self.records.len();
        self.by_name.entry(record.name.clone()).or_default().push(index);
        for link in record.provided_links() {
            let slots = self.by_provided.entry(link.target.clone()).or_default();
            if slots.last() != Some(&index) {
                slots.push(index);
            }
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[Arc<PackageRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn parse_entry(
        &self,
        entry: &Value,
        listed_as: Option<&str>,
    ) -> Result<PackageRecord, SourceError> {
        let Value::Object(map) = entry else {
            return Err(self.unavailable("package entries must be objects"));
        };
        let record = match (map.contains_key("name"), listed_as) {
            (false, Some(name)) => {
                let mut named = Map::with_capacity(map.len() + 1);
                named.insert("name".to_string(), Value::String(name.to_string()));
                named.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                PackageRecord::from_entry(&named)
            }
            _ => PackageRecord::from_entry(map),
        };
        record.map_err(|error| SourceError::MalformedRecord {
            source_label: self.label.clone(),
            error,
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> SourceError {
        SourceError::Unavailable {
            source_label: self.label.clone(),
            message: message.into(),
        }
    }
}

impl MetadataSource for ArraySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn find(
        &self,
        name: &str,
        _constraint: &Constraint,
    ) -> Result<Vec<Arc<PackageRecord>>, SourceError> {
        let name = name.to_lowercase();
        let mut indexes: Vec<usize> = self
            .by_name
            .get(&name)
            .into_iter()
            .chain(self.by_provided.get(&name))
            .flatten()
            .copied()
            .collect();
        indexes.sort_unstable();
        indexes.dedup();
        Ok(indexes.into_iter().map(|i| Arc::clone(&self.records[i])).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Arc<PackageRecord> {
        Arc::new(PackageRecord::from_value(&value).unwrap())
    }

    #[test]
    fn test_find_by_name_and_provided_name() {
        let source = ArraySource::from_records(
            "test",
            [
                record(json!({"name": "vendor/a", "version": "1.0.0"})),
                record(json!({"name": "vendor/impl", "version": "1.0.0", "provide": {"vendor/a": "1.0"}})),
                record(json!({"name": "vendor/a", "version": "2.0.0"})),
                record(json!({"name": "vendor/other", "version": "1.0.0"})),
            ],
        );
        let found = source.find("Vendor/A", &Constraint::Any).unwrap();
        let found: Vec<String> = found.iter().map(|r| r.to_string()).collect();
        assert_eq!(found, vec!["vendor/a 1.0.0", "vendor/impl 1.0.0", "vendor/a 2.0.0"]);
        assert!(source.find("vendor/missing", &Constraint::Any).unwrap().is_empty());
    }

    #[test]
    fn test_packages_json_both_layouts() {
        let keyed = ArraySource::from_packages_json(
            "repo",
            &json!({"packages": {"vendor/a": {"1.0.0": {"name": "vendor/a", "version": "1.0.0"}}}}),
        )
        .unwrap();
        assert_eq!(keyed.len(), 1);

        let listed = ArraySource::from_packages_json(
            "repo",
            &json!({"packages": {"vendor/a": [{"version": "1.0.0"}, {"version": "1.1.0"}]}}),
        )
        .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed.records()[1].name, "vendor/a");

        let empty = ArraySource::from_packages_json("repo", &json!({"packages": []})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_packages_json_errors() {
        let err = ArraySource::from_packages_json("repo", &json!({})).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));

        let err = ArraySource::from_packages_json(
            "repo",
            &json!({"packages": {"vendor/a": [{"version": 1}]}}),
        )
        .unwrap_err();
        match err {
            SourceError::MalformedRecord { source_label, error } => {
                assert_eq!(source_label, "repo");
                assert_eq!(error.field, "version");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_package_repository() {
        let single = ArraySource::from_package_repository(
            "inline",
            &json!({"type": "package", "package": {"name": "vendor/a", "version": "1.0.0"}}),
        )
        .unwrap();
        assert_eq!(single.len(), 1);

        let several = ArraySource::from_package_repository(
            "inline",
            &json!({"type": "package", "package": [
                {"name": "vendor/a", "version": "1.0.0"},
                {"name": "vendor/a", "version": "1.1.0"}
            ]}),
        )
        .unwrap();
        assert_eq!(several.len(), 2);
    }
}
