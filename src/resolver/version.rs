//! Semantic version parsing, ordering and range matching
//!
//! Versions follow `MAJOR.MINOR.PATCH[-prerelease][+build]` with an optional
//! leading `v`. Anything else is simply not a version: parsing yields `None`
//! and such strings never satisfy a range.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^v?(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$",
    )
    .expect("version pattern is a valid regex")
});

/// A parsed semantic version
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
    /// The text this version was parsed from
    pub raw: String,
}

impl SemanticVersion {
    /// Parse a version string, returning `None` if it is not a valid version
    pub fn parse(text: &str) -> Option<Self> {
        let captures = VERSION_PATTERN.captures(text.trim())?;

        let number = |idx: usize| captures.get(idx)?.as_str().parse::<u64>().ok();

        Some(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            prerelease: captures.get(4).map(|m| m.as_str().to_string()),
            build: captures.get(5).map(|m| m.as_str().to_string()),
            raw: text.to_string(),
        })
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

/// Order two versions by precedence. Build metadata is ignored.
pub fn compare(a: &SemanticVersion, b: &SemanticVersion) -> Ordering {
    a.triple()
        .cmp(&b.triple())
        .then_with(|| match (&a.prerelease, &b.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(x), Some(y)) => compare_prerelease(x, y),
        })
}

/// Identifier-wise prerelease precedence. Tags `semver` refuses (such as
/// numeric identifiers with leading zeros) fall back to plain string order.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    match (semver::Prerelease::new(a), semver::Prerelease::new(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

/// Comparison operator of a single comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
}

impl Op {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Op::Greater => ordering == Ordering::Greater,
            Op::GreaterOrEqual => ordering != Ordering::Less,
            Op::Less => ordering == Ordering::Less,
            Op::LessOrEqual => ordering != Ordering::Greater,
            Op::Equal => ordering == Ordering::Equal,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Greater => ">",
            Op::GreaterOrEqual => ">=",
            Op::Less => "<",
            Op::LessOrEqual => "<=",
            Op::Equal => "=",
        }
    }

    /// Split a leading operator off `s`. Two-character operators win.
    fn strip(s: &str) -> Option<(Op, &str)> {
        const OPS: [(&str, Op); 5] = [
            (">=", Op::GreaterOrEqual),
            ("<=", Op::LessOrEqual),
            (">", Op::Greater),
            ("<", Op::Less),
            ("=", Op::Equal),
        ];

        OPS.iter()
            .find_map(|(token, op)| s.strip_prefix(token).map(|rest| (*op, rest)))
    }
}

/// A version range expression (e.g. `^1.0.0`, `~2.1.0`, `>=1.0.0 <2.0.0`)
#[derive(Debug, Clone)]
pub enum VersionRange {
    /// Empty, `*` or `latest`
    Any,
    /// A bare version (1.0.0)
    Exact(SemanticVersion),
    /// Caret range: locked to the leftmost non-zero component
    Caret(SemanticVersion),
    /// Tilde range: patch-level changes only
    Tilde(SemanticVersion),
    /// A single comparator (>=1.0.0)
    Compare(Op, SemanticVersion),
    /// Whitespace-separated conjunction; every part must hold
    All(Vec<VersionRange>),
    /// Unrecognised syntax. Matches nothing.
    Invalid(String),
}

impl VersionRange {
    /// Parse a range expression. Never fails: unknown syntax becomes `Invalid`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if is_wildcard(s) {
            return VersionRange::Any;
        }

        if s.contains(char::is_whitespace) {
            return Self::parse_conjunction(s);
        }

        Self::parse_single(s)
    }

    fn parse_single(s: &str) -> Self {
        let invalid = || VersionRange::Invalid(s.to_string());

        if let Some(rest) = s.strip_prefix('^') {
            return SemanticVersion::parse(rest).map_or_else(invalid, VersionRange::Caret);
        }

        if let Some(rest) = s.strip_prefix('~') {
            return SemanticVersion::parse(rest).map_or_else(invalid, VersionRange::Tilde);
        }

        if let Some((op, rest)) = Op::strip(s) {
            return SemanticVersion::parse(rest)
                .map_or_else(invalid, |v| VersionRange::Compare(op, v));
        }

        SemanticVersion::parse(s).map_or_else(invalid, VersionRange::Exact)
    }

    fn parse_conjunction(s: &str) -> Self {
        let mut parts = Vec::new();
        let mut tokens = s.split_whitespace();

        while let Some(token) = tokens.next() {
            // `>= 1.0.0` carries the operator and version as separate tokens
            let part = match Op::strip(token) {
                Some((_, "")) => match tokens.next() {
                    Some(version) => Self::parse_single(&format!("{}{}", token, version)),
                    None => return VersionRange::Invalid(s.to_string()),
                },
                _ => Self::parse_single(token),
            };

            if let VersionRange::Invalid(_) = part {
                return VersionRange::Invalid(s.to_string());
            }
            parts.push(part);
        }

        VersionRange::All(parts)
    }

    /// Check if a version matches this range
    pub fn matches(&self, version: &SemanticVersion) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Exact(v) => version == v,
            VersionRange::Caret(v) => {
                if version.major != v.major {
                    false
                } else if v.major > 0 {
                    (version.minor, version.patch) >= (v.minor, v.patch)
                } else if v.minor > 0 {
                    version.minor == v.minor && version.patch >= v.patch
                } else {
                    version.minor == v.minor && version.patch == v.patch
                }
            }
            VersionRange::Tilde(v) => {
                version.major == v.major && version.minor == v.minor && version.patch >= v.patch
            }
            VersionRange::Compare(op, v) => op.holds(compare(version, v)),
            VersionRange::All(parts) => parts.iter().all(|part| part.matches(version)),
            VersionRange::Invalid(_) => false,
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Any => write!(f, "*"),
            VersionRange::Exact(v) => write!(f, "{}", v),
            VersionRange::Caret(v) => write!(f, "^{}", v),
            VersionRange::Tilde(v) => write!(f, "~{}", v),
            VersionRange::Compare(op, v) => write!(f, "{}{}", op.symbol(), v),
            VersionRange::All(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(" "))
            }
            VersionRange::Invalid(raw) => write!(f, "{}", raw),
        }
    }
}

/// Whether a range text means "any version" (`""`, `*`, `latest`)
pub fn is_wildcard(range: &str) -> bool {
    matches!(range.trim(), "" | "*" | "latest")
}

/// Check whether `version` satisfies `range`. Unparseable versions never do.
pub fn satisfies(version: &str, range: &str) -> bool {
    match SemanticVersion::parse(version) {
        Some(v) => VersionRange::parse(range).matches(&v),
        None => false,
    }
}

/// Pick the highest version in `versions` satisfying `range`, returning its
/// original text.
pub fn max_satisfying<S: AsRef<str>>(versions: &[S], range: &str) -> Option<String> {
    let range = VersionRange::parse(range);

    let mut candidates: Vec<SemanticVersion> = versions
        .iter()
        .filter_map(|v| SemanticVersion::parse(v.as_ref()))
        .filter(|v| range.matches(v))
        .collect();

    // Stable: equal versions keep their input order
    candidates.sort_by(|a, b| compare(b, a));
    candidates.into_iter().next().map(|v| v.raw)
}
