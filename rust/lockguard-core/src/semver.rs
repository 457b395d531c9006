//! Composer-style versions and version constraints.
//!
//! This module implements the constraint engine used by every check:
//! - Version normalization (`1.2` → `1.2.0.0`, `1.0.x-dev` → `1.0.9999999.9999999-dev`)
//! - Numeric ordering with stability modifiers (`dev < alpha < beta < RC < stable < patch`)
//! - Constraint parsing (caret, tilde, wildcard, hyphen ranges, operators, `||` unions)
//! - Constraint satisfaction
//! - Interval compaction into a canonical union of disjoint ranges
//!
//! Branch versions (`dev-main`) are never ordered against numeric versions:
//! they only satisfy exact constraints naming them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Segment value standing in for `x` in branch versions such as `1.0.x-dev`.
pub const BRANCH_SEGMENT: u64 = 9_999_999;

static CLASSICAL_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?(?:[._-]?(stable|beta|b|rc|alpha|a|patch|pl|p)((?:[.-]?\d+)*))?([.-]?dev)?$",
    )
    .expect("classical version regex is valid")
});

static BRANCH_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^v?(\d+)(\.(?:\d+|[x*]))?(\.(?:\d+|[x*]))?(\.(?:\d+|[x*]))?[.-]?dev$")
        .expect("branch version regex is valid")
});

static PARTIAL_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?(.*)$")
        .expect("partial version regex is valid")
});

static WILDCARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.[x*])+$")
        .expect("wildcard regex is valid")
});

static MATCH_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^v?[x*](?:\.[x*])*$").expect("match-all regex is valid"));

static STABILITY_FLAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)@(stable|rc|beta|alpha|dev)$").expect("stability flag regex is valid")
});

static INLINE_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^,\s]+) +as +([^,\s]+)$").expect("inline alias regex is valid"));

static OR_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\|\|?\s*").expect("or separator regex is valid"));

static HYPHEN_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+-\s+(\S+)$").expect("hyphen range regex is valid"));

// =============================================================================
// Stability
// =============================================================================

/// Release stability of a version, from least to most stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stability {
    Dev,
    Alpha,
    Beta,
    ReleaseCandidate,
    Stable,
}

impl Stability {
    /// Parse a stability keyword (`dev`, `alpha`, `beta`, `RC`, `stable`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Some(Stability::Dev),
            "alpha" | "a" => Some(Stability::Alpha),
            "beta" | "b" => Some(Stability::Beta),
            "rc" => Some(Stability::ReleaseCandidate),
            "stable" => Some(Stability::Stable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Dev => "dev",
            Stability::Alpha => "alpha",
            Stability::Beta => "beta",
            Stability::ReleaseCandidate => "RC",
            Stability::Stable => "stable",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-release modifier attached to a numeric version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Modifier {
    Dev,
    Alpha,
    Beta,
    ReleaseCandidate,
    Stable,
    Patch,
}

impl Modifier {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "alpha" | "a" => Modifier::Alpha,
            "beta" | "b" => Modifier::Beta,
            "rc" => Modifier::ReleaseCandidate,
            "patch" | "pl" | "p" => Modifier::Patch,
            _ => Modifier::Stable,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Modifier::Dev => "dev",
            Modifier::Alpha => "alpha",
            Modifier::Beta => "beta",
            Modifier::ReleaseCandidate => "RC",
            Modifier::Stable => "",
            Modifier::Patch => "patch",
        }
    }
}

// =============================================================================
// Version
// =============================================================================

/// A package version with a normalized form and the pretty form it was
/// written in.
///
/// Equality, hashing and ordering only look at the normalized form.
#[derive(Debug, Clone)]
pub struct Version {
    kind: VersionKind,
    pretty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VersionKind {
    /// Normalized branch name, always prefixed with `dev-`.
    Branch(String),
    Numeric(NumericVersion),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NumericVersion {
    segments: [u64; 4],
    modifier: Modifier,
    modifier_number: Vec<u64>,
    /// `-dev` suffix on top of a pre-release modifier (`1.0.0-beta2-dev`).
    dev: bool,
}

impl Ord for NumericVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments
            .cmp(&other.segments)
            .then(self.modifier.cmp(&other.modifier))
            .then_with(|| self.modifier_number.cmp(&other.modifier_number))
            // a `-dev` build precedes the release it leads up to
            .then(other.dev.cmp(&self.dev))
    }
}

impl PartialOrd for NumericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NumericVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.segments;
        write!(f, "{}.{}.{}.{}", a, b, c, d)?;
        if self.modifier != Modifier::Stable {
            write!(f, "-{}", self.modifier.label())?;
            let numbers: Vec<String> = self.modifier_number.iter().map(|n| n.to_string()).collect();
            write!(f, "{}", numbers.join("."))?;
        }
        if self.dev {
            write!(f, "-dev")?;
        }
        Ok(())
    }
}

impl Version {
    /// Parse and normalize a version string.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        s.parse()
    }

    /// The lowest possible numeric version, `0.0.0.0-dev`.
    pub fn lowest() -> Self {
        Self::from_segments([0, 0, 0, 0], true)
    }

    /// Build a numeric version from its four segments, optionally as a
    /// `-dev` version.
    pub fn from_segments(segments: [u64; 4], dev: bool) -> Self {
        let numeric = NumericVersion {
            segments,
            modifier: if dev { Modifier::Dev } else { Modifier::Stable },
            modifier_number: Vec::new(),
            dev: false,
        };
        Self {
            pretty: numeric.to_string(),
            kind: VersionKind::Numeric(numeric),
        }
    }

    /// The form the version was written in.
    pub fn pretty(&self) -> &str {
        &self.pretty
    }

    /// The normalized form (`1.0.0.0`, `dev-main`).
    pub fn normalized(&self) -> String {
        self.to_string()
    }

    /// Whether this is a `dev-<branch>` version.
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, VersionKind::Branch(_))
    }

    pub fn stability(&self) -> Stability {
        match &self.kind {
            VersionKind::Branch(_) => Stability::Dev,
            VersionKind::Numeric(n) if n.dev => Stability::Dev,
            VersionKind::Numeric(n) => match n.modifier {
                Modifier::Dev => Stability::Dev,
                Modifier::Alpha => Stability::Alpha,
                Modifier::Beta => Stability::Beta,
                Modifier::ReleaseCandidate => Stability::ReleaseCandidate,
                Modifier::Stable | Modifier::Patch => Stability::Stable,
            },
        }
    }

    /// Check if this version satisfies the given constraint.
    pub fn satisfies(&self, constraint: &Constraint) -> bool {
        constraint.matches(self)
    }

    /// Turn a plain release (`2.0.0.0`) into its `-dev` floor (`2.0.0.0-dev`).
    /// Versions carrying a modifier or a branch name are returned unchanged.
    fn dev_floor(self) -> Self {
        match &self.kind {
            VersionKind::Numeric(n) if n.modifier == Modifier::Stable && !n.dev => {
                Self::from_segments(n.segments, true)
            }
            _ => self,
        }
    }

    fn numeric(&self) -> Option<&NumericVersion> {
        match &self.kind {
            VersionKind::Numeric(n) => Some(n),
            VersionKind::Branch(_) => None,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.kind, &other.kind) {
            (VersionKind::Numeric(a), VersionKind::Numeric(b)) => a.cmp(b),
            (VersionKind::Branch(a), VersionKind::Branch(b)) => a.cmp(b),
            (VersionKind::Branch(_), VersionKind::Numeric(_)) => Ordering::Less,
            (VersionKind::Numeric(_), VersionKind::Branch(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VersionKind::Branch(name) => f.write_str(name),
            VersionKind::Numeric(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pretty = s.trim();
        if pretty.is_empty() {
            return Err(SemverError::InvalidVersion("empty version string".to_string()));
        }

        let version = STABILITY_FLAG.replace(pretty, "");
        let lower = version.to_ascii_lowercase();

        if matches!(lower.as_str(), "master" | "trunk" | "default") {
            return Ok(Self {
                kind: VersionKind::Branch(format!("dev-{}", lower)),
                pretty: pretty.to_string(),
            });
        }
        if lower.starts_with("dev-") && version.len() > 4 {
            return Ok(Self {
                kind: VersionKind::Branch(format!("dev-{}", &version[4..])),
                pretty: pretty.to_string(),
            });
        }

        if let Some(caps) = CLASSICAL_VERSION.captures(&version) {
            let mut segments = [0u64; 4];
            for (i, segment) in segments.iter_mut().enumerate() {
                if let Some(m) = caps.get(i + 1) {
                    *segment = parse_segment(m.as_str(), pretty)?;
                }
            }
            let mut modifier = caps
                .get(5)
                .map(|m| Modifier::parse(m.as_str()))
                .unwrap_or(Modifier::Stable);
            let mut modifier_number = Vec::new();
            if modifier != Modifier::Stable {
                if let Some(m) = caps.get(6) {
                    for digits in m.as_str().split(['.', '-']).filter(|d| !d.is_empty()) {
                        modifier_number.push(parse_segment(digits, pretty)?);
                    }
                }
            }
            let mut dev = caps.get(7).is_some();
            if dev && modifier == Modifier::Stable {
                modifier = Modifier::Dev;
                dev = false;
            }
            return Ok(Self {
                kind: VersionKind::Numeric(NumericVersion {
                    segments,
                    modifier,
                    modifier_number,
                    dev,
                }),
                pretty: pretty.to_string(),
            });
        }

        if let Some(caps) = BRANCH_VERSION.captures(&version) {
            let mut segments = [BRANCH_SEGMENT; 4];
            for (i, segment) in segments.iter_mut().enumerate() {
                if let Some(m) = caps.get(i + 1) {
                    let raw = m.as_str().trim_start_matches('.');
                    if raw.chars().all(|c| c.is_ascii_digit()) {
                        *segment = parse_segment(raw, pretty)?;
                    }
                }
            }
            return Ok(Self {
                kind: VersionKind::Numeric(NumericVersion {
                    segments,
                    modifier: Modifier::Dev,
                    modifier_number: Vec::new(),
                    dev: false,
                }),
                pretty: pretty.to_string(),
            });
        }

        Err(SemverError::InvalidVersion(pretty.to_string()))
    }
}

fn parse_segment(digits: &str, original: &str) -> Result<u64, SemverError> {
    digits
        .parse::<u64>()
        .map_err(|_| SemverError::InvalidVersion(original.to_string()))
}

// =============================================================================
// Constraint
// =============================================================================

/// Comparison operator of a single-bound range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

/// A version constraint.
///
/// `And`/`Or` are kept as written; call [`Constraint::compact`] to obtain the
/// canonical form before comparing or displaying a constraint built from
/// several requirers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Exact version match: `== 1.2.0.0`
    Exact(Version),
    /// Single bound: `>= 1.2.0.0`
    Range(Operator, Version),
    /// Every constraint must hold.
    And(Vec<Constraint>),
    /// At least one constraint must hold.
    Or(Vec<Constraint>),
    /// Matches any version, branches included.
    Any,
    /// Matches no version.
    None,
}

impl Constraint {
    /// Check if a version satisfies this constraint.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Constraint::Exact(v) => version == v,
            Constraint::Range(op, bound) => {
                let (Some(v), Some(b)) = (version.numeric(), bound.numeric()) else {
                    return false;
                };
                match op {
                    Operator::Lt => v < b,
                    Operator::Le => v <= b,
                    Operator::Gt => v > b,
                    Operator::Ge => v >= b,
                }
            }
            Constraint::And(constraints) => constraints.iter().all(|c| c.matches(version)),
            Constraint::Or(constraints) => constraints.iter().any(|c| c.matches(version)),
            Constraint::Any => true,
            Constraint::None => false,
        }
    }

    /// Intersection of two constraints.
    pub fn intersect(a: Constraint, b: Constraint) -> Constraint {
        Constraint::And(vec![a, b])
    }

    /// Union of a sequence of constraints. A single constraint is returned as is.
    pub fn union<I>(constraints: I) -> Constraint
    where
        I: IntoIterator<Item = Constraint>,
    {
        let mut items: Vec<Constraint> = constraints.into_iter().collect();
        if items.len() == 1 {
            items.remove(0)
        } else {
            Constraint::Or(items)
        }
    }

    /// Reduce the constraint to its minimal equivalent form.
    ///
    /// Overlapping and adjacent ranges are merged, contradictions collapse to
    /// [`Constraint::None`], and several disjoint pieces become an `Or` in
    /// ascending order with branch versions last.
    pub fn compact(&self) -> Constraint {
        VersionSet::of(self).into_constraint()
    }

    /// Whether no version can satisfy this constraint.
    pub fn is_unsatisfiable(&self) -> bool {
        VersionSet::of(self).is_empty()
    }

    /// Whether some version satisfies both constraints.
    pub fn intersects(&self, other: &Constraint) -> bool {
        !VersionSet::of(self).intersect(VersionSet::of(other)).is_empty()
    }

    /// Parse a constraint from Composer syntax.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let mut s = s.trim();
        if s.is_empty() {
            return Err(SemverError::InvalidConstraint("empty constraint".to_string()));
        }

        // `dev-main as 1.0.0` constrains the real version, the alias is handled by the caller
        if let Some((real, _)) = split_inline_alias(s) {
            s = real;
        }

        let flagless = STABILITY_FLAG.replace(s, "");
        let s = if flagless.trim().is_empty() { "*" } else { flagless.trim() };

        let mut alternatives = Vec::new();
        for part in OR_SEPARATOR.split(s) {
            alternatives.push(parse_conjunction(part, s)?);
        }

        Ok(Constraint::union(alternatives))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Exact(v) => write!(f, "== {}", v),
            Constraint::Range(op, v) => write!(f, "{} {}", op.as_str(), v),
            Constraint::And(constraints) => {
                let parts: Vec<String> = constraints.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(" "))
            }
            Constraint::Or(constraints) => {
                let parts: Vec<String> = constraints.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(" || "))
            }
            Constraint::Any => write!(f, "*"),
            Constraint::None => write!(f, "[]"),
        }
    }
}

impl FromStr for Constraint {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

/// The trailing `@<stability>` flag of a constraint, if any.
pub fn stability_flag(s: &str) -> Option<Stability> {
    let caps = STABILITY_FLAG.captures(s.trim())?;
    Stability::parse(caps.get(1)?.as_str())
}

/// Split an inline alias (`dev-main as 1.0.0`) into the real and the aliased
/// version strings.
pub fn split_inline_alias(s: &str) -> Option<(&str, &str)> {
    let caps = INLINE_ALIAS.captures(s.trim())?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Parse one `||` alternative: a hyphen range or a list of AND-ed constraints.
fn parse_conjunction(part: &str, whole: &str) -> Result<Constraint, SemverError> {
    let part = part.trim();
    if part.is_empty() {
        return Err(SemverError::InvalidConstraint(whole.to_string()));
    }

    if let Some(caps) = HYPHEN_RANGE.captures(part) {
        return parse_hyphen_range(&caps[1], &caps[2]);
    }

    let mut constraints = Vec::new();
    for token in tokenize_constraint(part) {
        match parse_single_constraint(&token)? {
            Constraint::And(inner) => constraints.extend(inner),
            other => constraints.push(other),
        }
    }

    match constraints.len() {
        0 => Err(SemverError::InvalidConstraint(whole.to_string())),
        1 => Ok(constraints.remove(0)),
        _ => Ok(Constraint::And(constraints)),
    }
}

/// Tokenize a conjunction on commas and whitespace, gluing bare operators to
/// the version that follows them (`>= 1.0` → `>=1.0`).
fn tokenize_constraint(s: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_operator: Option<String> = None;

    for raw in s.split(|c: char| c == ',' || c.is_whitespace()) {
        if raw.is_empty() {
            continue;
        }
        if matches!(raw, "<" | "<=" | ">" | ">=" | "=" | "==" | "!=" | "<>" | "^" | "~") {
            pending_operator = Some(raw.to_string());
            continue;
        }
        match pending_operator.take() {
            Some(op) => tokens.push(format!("{}{}", op, raw)),
            None => tokens.push(raw.to_string()),
        }
    }

    if let Some(op) = pending_operator {
        tokens.push(op);
    }

    tokens
}

/// Parse a single constraint token (not compound).
fn parse_single_constraint(token: &str) -> Result<Constraint, SemverError> {
    let flagless = STABILITY_FLAG.replace(token.trim(), "");
    let s = flagless.trim();

    if s.is_empty() || MATCH_ALL.is_match(s) {
        return Ok(Constraint::Any);
    }

    if let Some(rest) = s.strip_prefix('~') {
        return parse_tilde(rest.trim_start_matches('>'));
    }

    if let Some(rest) = s.strip_prefix('^') {
        return parse_caret(rest);
    }

    if let Some(caps) = WILDCARD.captures(s) {
        let given: Vec<u64> = (1..=3)
            .filter_map(|i| caps.get(i))
            .map(|m| parse_segment(m.as_str(), s))
            .collect::<Result<_, _>>()?;
        let lower = Version::from_segments(pad(&given), false);
        let upper = bump(&given, given.len());
        return Ok(Constraint::And(vec![
            Constraint::Range(Operator::Ge, lower),
            Constraint::Range(Operator::Lt, upper),
        ]));
    }

    for prefix in ["<>", "!="] {
        if let Some(rest) = s.strip_prefix(prefix) {
            let version = Version::parse(rest)?;
            if version.is_branch() {
                return Ok(Constraint::Any);
            }
            return Ok(Constraint::Or(vec![
                Constraint::Range(Operator::Lt, version.clone()),
                Constraint::Range(Operator::Gt, version),
            ]));
        }
    }

    if let Some(rest) = s.strip_prefix(">=") {
        return Ok(Constraint::Range(Operator::Ge, Version::parse(rest)?));
    }
    if let Some(rest) = s.strip_prefix("<=") {
        return Ok(Constraint::Range(Operator::Le, Version::parse(rest)?));
    }
    if let Some(rest) = s.strip_prefix("==") {
        return Ok(Constraint::Exact(Version::parse(rest)?));
    }
    if let Some(rest) = s.strip_prefix('>') {
        return Ok(Constraint::Range(Operator::Gt, Version::parse(rest)?));
    }
    if let Some(rest) = s.strip_prefix('<') {
        return Ok(Constraint::Range(Operator::Lt, Version::parse(rest)?.dev_floor()));
    }
    if let Some(rest) = s.strip_prefix('=') {
        return Ok(Constraint::Exact(Version::parse(rest)?));
    }

    Ok(Constraint::Exact(Version::parse(s)?))
}

/// `~1.2` := `>=1.2.0.0 <2.0.0.0-dev`, `~1.2.3` := `>=1.2.3.0 <1.3.0.0-dev`
fn parse_tilde(rest: &str) -> Result<Constraint, SemverError> {
    let given = given_segments(rest)?;
    let lower = Version::parse(rest)?;
    let position = given.len().saturating_sub(1).max(1);
    Ok(Constraint::And(vec![
        Constraint::Range(Operator::Ge, lower),
        Constraint::Range(Operator::Lt, bump(&given, position)),
    ]))
}

/// `^1.2` := `>=1.2.0.0 <2.0.0.0-dev`, `^0.3` := `>=0.3.0.0 <0.4.0.0-dev`
fn parse_caret(rest: &str) -> Result<Constraint, SemverError> {
    let given = given_segments(rest)?;
    let lower = Version::parse(rest)?;
    let position = if given[0] != 0 || given.len() == 1 {
        1
    } else if given[1] != 0 || given.len() == 2 {
        2
    } else {
        3
    };
    Ok(Constraint::And(vec![
        Constraint::Range(Operator::Ge, lower),
        Constraint::Range(Operator::Lt, bump(&given, position)),
    ]))
}

/// `1.0 - 2.0` := `>=1.0.0.0 <2.1.0.0-dev`, `1.0 - 2.0.0` := `>=1.0.0.0 <=2.0.0.0`
fn parse_hyphen_range(left: &str, right: &str) -> Result<Constraint, SemverError> {
    let lower = Constraint::Range(Operator::Ge, Version::parse(left)?);
    let caps = PARTIAL_VERSION
        .captures(right)
        .ok_or_else(|| SemverError::InvalidVersion(right.to_string()))?;
    let given = given_segments(right)?;
    let has_suffix = caps.get(5).is_some_and(|m| !m.as_str().is_empty());
    let upper = if given.len() >= 3 || has_suffix {
        Constraint::Range(Operator::Le, Version::parse(right)?)
    } else {
        Constraint::Range(Operator::Lt, bump(&given, given.len()))
    };
    Ok(Constraint::And(vec![lower, upper]))
}

/// The numeric segments actually written in a partial version (`1.2` → `[1, 2]`).
fn given_segments(s: &str) -> Result<Vec<u64>, SemverError> {
    let caps = PARTIAL_VERSION
        .captures(s.trim())
        .ok_or_else(|| SemverError::InvalidVersion(s.to_string()))?;
    (1..=4)
        .filter_map(|i| caps.get(i))
        .map(|m| parse_segment(m.as_str(), s))
        .collect()
}

fn pad(given: &[u64]) -> [u64; 4] {
    let mut segments = [0u64; 4];
    for (slot, value) in segments.iter_mut().zip(given) {
        *slot = *value;
    }
    segments
}

/// Increment the segment at the 1-based `position`, zero the ones after it,
/// and return the `-dev` floor of the result.
fn bump(given: &[u64], position: usize) -> Version {
    let mut segments = pad(given);
    let index = position.clamp(1, 4) - 1;
    segments[index] = segments[index].saturating_add(1);
    for segment in segments.iter_mut().skip(index + 1) {
        *segment = 0;
    }
    Version::from_segments(segments, true)
}

// =============================================================================
// Interval arithmetic
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A contiguous range of numeric versions; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn full() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    fn point(version: Version) -> Self {
        Self {
            lower: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            upper: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(l), Some(u)) => match l.version.cmp(&u.version) {
                Ordering::Greater => true,
                Ordering::Equal => !(l.inclusive && u.inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    fn intersect(&self, other: &Interval) -> Interval {
        Interval {
            lower: pick_bound(&self.lower, &other.lower, Ordering::Greater, false),
            upper: pick_bound(&self.upper, &other.upper, Ordering::Less, false),
        }
    }

    fn into_constraint(self) -> Constraint {
        match (self.lower, self.upper) {
            (None, None) => Constraint::Range(Operator::Ge, Version::lowest()),
            (Some(l), None) => Constraint::Range(lower_operator(l.inclusive), l.version),
            (None, Some(u)) => Constraint::Range(upper_operator(u.inclusive), u.version),
            (Some(l), Some(u)) if l.version == u.version => Constraint::Exact(l.version),
            (Some(l), Some(u)) => Constraint::And(vec![
                Constraint::Range(lower_operator(l.inclusive), l.version),
                Constraint::Range(upper_operator(u.inclusive), u.version),
            ]),
        }
    }
}

fn lower_operator(inclusive: bool) -> Operator {
    if inclusive {
        Operator::Ge
    } else {
        Operator::Gt
    }
}

fn upper_operator(inclusive: bool) -> Operator {
    if inclusive {
        Operator::Le
    } else {
        Operator::Lt
    }
}

/// Choose between two bounds of the same side.
///
/// `prefer` selects which version wins (`Greater` for the tighter lower bound,
/// `Less` for the tighter upper bound). When `loose` is set, an unbounded side
/// wins and equal versions combine inclusivity with `||` instead of `&&`.
fn pick_bound(
    a: &Option<Bound>,
    b: &Option<Bound>,
    prefer: Ordering,
    loose: bool,
) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (None, Some(bound)) | (Some(bound), None) => {
            if loose {
                None
            } else {
                Some(bound.clone())
            }
        }
        (Some(x), Some(y)) => {
            let ord = x.version.cmp(&y.version);
            if ord == Ordering::Equal {
                let inclusive = if loose {
                    x.inclusive || y.inclusive
                } else {
                    x.inclusive && y.inclusive
                };
                Some(Bound {
                    version: x.version.clone(),
                    inclusive,
                })
            } else if ord == prefer {
                Some(x.clone())
            } else {
                Some(y.clone())
            }
        }
    }
}

/// Sort key for lower bounds: unbounded first, inclusive before exclusive.
fn cmp_lower(a: &Option<Bound>, b: &Option<Bound>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x
            .version
            .cmp(&y.version)
            .then(y.inclusive.cmp(&x.inclusive)),
    }
}

/// Whether an interval ending at `upper` overlaps or touches one starting at `lower`.
fn touches(upper: &Option<Bound>, lower: &Option<Bound>) -> bool {
    match (upper, lower) {
        (None, _) | (_, None) => true,
        (Some(u), Some(l)) => match l.version.cmp(&u.version) {
            Ordering::Less => true,
            Ordering::Equal => u.inclusive || l.inclusive,
            Ordering::Greater => false,
        },
    }
}

/// Sort intervals and merge the ones that overlap or touch.
fn normalize(intervals: Vec<Interval>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
    sorted.sort_by(|a, b| cmp_lower(&a.lower, &b.lower));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut() {
            if touches(&last.upper, &interval.lower) {
                last.upper = pick_bound(&last.upper, &interval.upper, Ordering::Greater, true);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BranchSet {
    All,
    Only(BTreeSet<Version>),
}

/// The set of versions a constraint admits: numeric intervals plus branches.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionSet {
    intervals: Vec<Interval>,
    branches: BranchSet,
}

impl VersionSet {
    fn everything() -> Self {
        Self {
            intervals: vec![Interval::full()],
            branches: BranchSet::All,
        }
    }

    fn nothing() -> Self {
        Self {
            intervals: Vec::new(),
            branches: BranchSet::Only(BTreeSet::new()),
        }
    }

    fn of(constraint: &Constraint) -> Self {
        match constraint {
            Constraint::Any => Self::everything(),
            Constraint::None => Self::nothing(),
            Constraint::Exact(v) if v.is_branch() => Self {
                intervals: Vec::new(),
                branches: BranchSet::Only(BTreeSet::from([v.clone()])),
            },
            Constraint::Exact(v) => Self {
                intervals: vec![Interval::point(v.clone())],
                branches: BranchSet::Only(BTreeSet::new()),
            },
            Constraint::Range(_, v) if v.is_branch() => Self::nothing(),
            Constraint::Range(op, v) => {
                let bound = Some(Bound {
                    version: v.clone(),
                    inclusive: matches!(op, Operator::Ge | Operator::Le),
                });
                let interval = match op {
                    Operator::Gt | Operator::Ge => Interval {
                        lower: bound,
                        upper: None,
                    },
                    Operator::Lt | Operator::Le => Interval {
                        lower: None,
                        upper: bound,
                    },
                };
                Self {
                    intervals: vec![interval],
                    branches: BranchSet::Only(BTreeSet::new()),
                }
            }
            Constraint::And(constraints) => constraints
                .iter()
                .fold(Self::everything(), |acc, c| acc.intersect(Self::of(c))),
            Constraint::Or(constraints) => constraints
                .iter()
                .fold(Self::nothing(), |acc, c| acc.union(Self::of(c))),
        }
    }

    fn is_empty(&self) -> bool {
        self.intervals.is_empty()
            && matches!(&self.branches, BranchSet::Only(set) if set.is_empty())
    }

    fn intersect(self, other: VersionSet) -> VersionSet {
        let mut intervals = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                intervals.push(a.intersect(b));
            }
        }
        let branches = match (self.branches, other.branches) {
            (BranchSet::All, set) | (set, BranchSet::All) => set,
            (BranchSet::Only(a), BranchSet::Only(b)) => {
                BranchSet::Only(a.intersection(&b).cloned().collect())
            }
        };
        VersionSet {
            intervals: normalize(intervals),
            branches,
        }
    }

    fn union(self, other: VersionSet) -> VersionSet {
        let mut intervals = self.intervals;
        intervals.extend(other.intervals);
        let branches = match (self.branches, other.branches) {
            (BranchSet::All, _) | (_, BranchSet::All) => BranchSet::All,
            (BranchSet::Only(mut a), BranchSet::Only(b)) => {
                a.extend(b);
                BranchSet::Only(a)
            }
        };
        VersionSet {
            intervals: normalize(intervals),
            branches,
        }
    }

    fn into_constraint(self) -> Constraint {
        if self.branches == BranchSet::All && self.intervals == [Interval::full()] {
            return Constraint::Any;
        }

        let mut pieces: Vec<Constraint> = self
            .intervals
            .into_iter()
            .map(Interval::into_constraint)
            .collect();
        if let BranchSet::Only(branches) = self.branches {
            pieces.extend(branches.into_iter().map(Constraint::Exact));
        }

        match pieces.len() {
            0 => Constraint::None,
            1 => pieces.remove(0),
            _ => Constraint::Or(pieces),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur while parsing versions and constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemverError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
}
