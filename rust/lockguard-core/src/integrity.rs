//! Metadata integrity: a locked record against its authoritative counterpart.
//!
//! Records are compared on a normalized view of their raw metadata. Fields
//! that legitimately differ between an install and a repository dump are
//! stripped first:
//!
//! - `time`, `installation-source` and `version_normalized`
//! - top-level fields that are `null`, `[]` or `{}`
//! - `dist.reference` and `transport-options` of `path` packages
//!
//! `extra.branch-alias` is key-sorted. Equality of the views is structural and
//! ignores key order.

use crate::error::{Authority, ValidationError};
use crate::package::PackageRecord;
use crate::pool::Pool;
use crate::semver::Constraint;
use serde_json::{Map, Value};
use tracing::{debug, trace};

const VOLATILE_FIELDS: &[&str] = &["time", "installation-source", "version_normalized"];

/// Lines of unchanged context kept around each change in a diff.
const DIFF_CONTEXT: usize = 3;

// =============================================================================
// Metadata View
// =============================================================================

/// Normalized metadata of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataView {
    fields: Map<String, Value>,
}

impl MetadataView {
    pub fn of(record: &PackageRecord) -> Self {
        let mut fields = record.metadata.clone();

        for field in VOLATILE_FIELDS {
            fields.remove(*field);
        }
        fields.retain(|_, value| !is_blank(value));

        let is_path = fields
            .get("dist")
            .and_then(|dist| dist.get("type"))
            .and_then(Value::as_str)
            == Some("path");
        if is_path {
            if let Some(Value::Object(dist)) = fields.get_mut("dist") {
                dist.remove("reference");
            }
            fields.remove("transport-options");
        }

        if let Some(Value::Object(extra)) = fields.get_mut("extra") {
            if let Some(Value::Object(aliases)) = extra.get_mut("branch-alias") {
                let mut sorted: Vec<(String, Value)> =
                    std::mem::take(aliases).into_iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                aliases.extend(sorted);
            }
        }

        Self { fields }
    }

    /// An empty view, the diff target when no candidate exists.
    pub fn empty() -> Self {
        Self { fields: Map::new() }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Pretty JSON with keys sorted at every level.
    pub fn render(&self) -> String {
        if self.fields.is_empty() {
            return String::new();
        }
        let sorted = sort_keys(&Value::Object(self.fields.clone()));
        serde_json::to_string_pretty(&sorted).unwrap_or_default()
    }

    /// Line diff from `self` (`-`) to `other` (`+`) with a few lines of context.
    pub fn diff(&self, other: &MetadataView) -> String {
        let old = self.render();
        let new = other.render();
        let old: Vec<&str> = old.lines().collect();
        let new: Vec<&str> = new.lines().collect();
        render_hunks(&diff_lines(&old, &new))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

// =============================================================================
// Line diff
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffLine<'t> {
    Same(&'t str),
    Removed(&'t str),
    Added(&'t str),
}

/// Longest-common-subsequence line diff.
fn diff_lines<'t>(old: &[&'t str], new: &[&'t str]) -> Vec<DiffLine<'t>> {
    let (n, m) = (old.len(), new.len());
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut lines = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            lines.push(DiffLine::Same(old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            lines.push(DiffLine::Removed(old[i]));
            i += 1;
        } else {
            lines.push(DiffLine::Added(new[j]));
            j += 1;
        }
    }
    lines.extend(old[i..].iter().map(|&line| DiffLine::Removed(line)));
    lines.extend(new[j..].iter().map(|&line| DiffLine::Added(line)));
    lines
}

/// Keep changed lines plus their context; separate distant hunks with `@@`.
fn render_hunks(lines: &[DiffLine<'_>]) -> String {
    let changed: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !matches!(line, DiffLine::Same(_)))
        .map(|(i, _)| i)
        .collect();
    if changed.is_empty() {
        return String::new();
    }

    let mut keep = vec![false; lines.len()];
    for &i in &changed {
        let start = i.saturating_sub(DIFF_CONTEXT);
        let end = (i + DIFF_CONTEXT).min(lines.len() - 1);
        for slot in &mut keep[start..=end] {
            *slot = true;
        }
    }

    let mut out: Vec<String> = Vec::new();
    let mut previous: Option<usize> = None;
    for (i, line) in lines.iter().enumerate().filter(|(i, _)| keep[*i]) {
        if previous.is_some_and(|p| p + 1 != i) {
            out.push("@@".to_string());
        }
        previous = Some(i);
        out.push(match line {
            DiffLine::Same(text) => format!(" {}", text),
            DiffLine::Removed(text) => format!("-{}", text),
            DiffLine::Added(text) => format!("+{}", text),
        });
    }
    out.join("\n")
}

// =============================================================================
// Verification
// =============================================================================

/// Check one locked record against the authoritative metadata in `pool`.
///
/// Only candidates with the record's exact name and version count. The record
/// passes when any of them has an equal normalized view.
pub fn verify_package(
    record: &PackageRecord,
    pool: &Pool<'_>,
    authority: Authority,
) -> Result<(), ValidationError> {
    let query = Constraint::Exact(record.version.clone());
    let candidates: Vec<_> = pool
        .what_provides(&record.name, &query)?
        .into_iter()
        .filter(|candidate| {
            candidate.record.name == record.name && candidate.record.version == record.version
        })
        .collect();

    let locked = MetadataView::of(record);
    let mut last_compared = None;
    for candidate in &candidates {
        let view = MetadataView::of(&candidate.record);
        if view == locked {
            trace!(package = %record, against = %authority, "metadata matches");
            return Ok(());
        }
        last_compared = Some(view);
    }

    if candidates.is_empty() && authority == Authority::TrustedLock {
        return Err(ValidationError::ExpectedPackageMissing {
            name: record.pretty_name.clone(),
            version: record.version.normalized(),
        });
    }

    debug!(
        package = %record,
        against = %authority,
        candidates = candidates.len(),
        "metadata mismatch"
    );
    let target = last_compared.unwrap_or_else(MetadataView::empty);
    Err(ValidationError::MetadataMismatch {
        name: record.pretty_name.clone(),
        version: record.version.normalized(),
        against: authority,
        diff: locked.diff(&target),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ArraySource;
    use serde_json::json;
    use std::sync::Arc;

    fn record(value: Value) -> PackageRecord {
        PackageRecord::from_value(&value).unwrap()
    }

    fn root() -> Arc<PackageRecord> {
        Arc::new(record(json!({"name": "acme/app", "version": "1.0.0"})))
    }

    #[test]
    fn test_view_strips_volatile_and_blank_fields() {
        let a = record(json!({
            "name": "vendor/a",
            "version": "1.0.0",
            "time": "2024-01-01T00:00:00+00:00",
            "installation-source": "dist",
            "version_normalized": "1.0.0.0",
            "require-dev": {},
            "suggest": null,
            "type": "library"
        }));
        let b = record(json!({"name": "vendor/a", "version": "1.0.0", "type": "library"}));
        assert_eq!(MetadataView::of(&a), MetadataView::of(&b));
    }

    #[test]
    fn test_view_ignores_key_order() {
        let a = record(json!({
            "name": "vendor/a",
            "version": "dev-main",
            "extra": {"branch-alias": {"dev-main": "2.x-dev", "dev-legacy": "1.x-dev"}}
        }));
        let b = record(json!({
            "version": "dev-main",
            "extra": {"branch-alias": {"dev-legacy": "1.x-dev", "dev-main": "2.x-dev"}},
            "name": "vendor/a"
        }));
        assert_eq!(MetadataView::of(&a), MetadataView::of(&b));
        let view = MetadataView::of(&a);
        let aliases: Vec<&String> = view.fields()["extra"]["branch-alias"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(aliases, vec!["dev-legacy", "dev-main"]);
    }

    #[test]
    fn test_view_strips_path_reference() {
        let a = record(json!({
            "name": "vendor/a",
            "version": "1.0.0",
            "dist": {"type": "path", "url": "../a", "reference": "abc"},
            "transport-options": {"symlink": true}
        }));
        let b = record(json!({
            "name": "vendor/a",
            "version": "1.0.0",
            "dist": {"type": "path", "url": "../a", "reference": "def"}
        }));
        assert_eq!(MetadataView::of(&a), MetadataView::of(&b));

        let zip_a = record(json!({"name": "vendor/a", "version": "1.0.0", "dist": {"type": "zip", "reference": "abc"}}));
        let zip_b = record(json!({"name": "vendor/a", "version": "1.0.0", "dist": {"type": "zip", "reference": "def"}}));
        assert_ne!(MetadataView::of(&zip_a), MetadataView::of(&zip_b));
    }

    #[test]
    fn test_diff_shows_changed_lines() {
        let locked = record(json!({
            "name": "vendor/a",
            "version": "1.0.0",
            "dist": {"type": "zip", "url": "https://evil.example/a.zip"}
        }));
        let upstream = record(json!({
            "name": "vendor/a",
            "version": "1.0.0",
            "dist": {"type": "zip", "url": "https://repo.example/a.zip"}
        }));
        let diff = MetadataView::of(&locked).diff(&MetadataView::of(&upstream));
        assert!(diff.contains("-    \"url\": \"https://evil.example/a.zip\""), "{}", diff);
        assert!(diff.contains("+    \"url\": \"https://repo.example/a.zip\""), "{}", diff);
        assert!(diff.contains("   \"dist\": {"), "{}", diff);
        assert!(MetadataView::of(&locked).diff(&MetadataView::of(&locked)).is_empty());
    }

    #[test]
    fn test_diff_against_empty_view_removes_everything() {
        let locked = record(json!({"name": "vendor/a", "version": "1.0.0"}));
        let diff = MetadataView::of(&locked).diff(&MetadataView::empty());
        assert!(diff.lines().all(|line| line.starts_with('-')), "{}", diff);
    }

    #[test]
    fn test_diff_separates_distant_hunks() {
        let old = ["a", "1", "2", "3", "4", "5", "6", "7", "8", "b"];
        let new = ["A", "1", "2", "3", "4", "5", "6", "7", "8", "B"];
        let rendered = render_hunks(&diff_lines(&old, &new));
        assert_eq!(
            rendered,
            "-a\n+A\n 1\n 2\n 3\n@@\n 6\n 7\n 8\n-b\n+B"
        );
    }

    #[test]
    fn test_verify_against_repositories() {
        let locked = record(json!({"name": "vendor/a", "version": "1.0.0", "dist": {"url": "x"}}));
        let source = ArraySource::from_records(
            "repo",
            [
                Arc::new(record(json!({"name": "vendor/a", "version": "1.0.0", "dist": {"url": "y"}}))),
                Arc::new(record(json!({"name": "vendor/a", "version": "1.0.0", "dist": {"url": "x"}, "time": "now"}))),
            ],
        );
        let mut pool = Pool::new(root());
        pool.add_source(&source);
        assert!(verify_package(&locked, &pool, Authority::Repositories).is_ok());

        let tampered = record(json!({"name": "vendor/a", "version": "1.0.0", "dist": {"url": "z"}}));
        let err = verify_package(&tampered, &pool, Authority::Repositories).unwrap_err();
        match err {
            ValidationError::MetadataMismatch { against, diff, .. } => {
                assert_eq!(against, Authority::Repositories);
                assert!(diff.contains("-    \"url\": \"z\""), "{}", diff);
                assert!(diff.contains("+    \"url\": \"x\""), "{}", diff);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_candidate_depends_on_authority() {
        let locked = record(json!({"name": "vendor/a", "version": "1.0.0"}));
        let source = ArraySource::from_records(
            "repo",
            [Arc::new(record(json!({"name": "vendor/a", "version": "1.1.0"})))],
        );
        let mut pool = Pool::new(root());
        pool.add_source(&source);

        let err = verify_package(&locked, &pool, Authority::Repositories).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MetadataMismatch);

        let err = verify_package(&locked, &pool, Authority::TrustedLock).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ExpectedPackageMissing {
                name: "vendor/a".into(),
                version: "1.0.0.0".into()
            }
        );
    }

    #[test]
    fn test_providers_are_not_authoritative() {
        let locked = record(json!({"name": "vendor/a", "version": "1.0.0"}));
        let source = ArraySource::from_records(
            "repo",
            [Arc::new(record(json!({"name": "vendor/fork", "version": "1.0.0", "replace": {"vendor/a": "1.0.0"}})))],
        );
        let mut pool = Pool::new(root());
        pool.add_source(&source);
        let err = verify_package(&locked, &pool, Authority::TrustedLock).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ExpectedPackageMissing);
    }
}
