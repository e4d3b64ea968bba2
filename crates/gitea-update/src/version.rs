// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Version parsing and comparison module
//!
//! Every version slot in the registry is a [`VersionSlot`]: either a parsed
//! semantic version or `Unknown`. Unknown always sorts below any concrete
//! version so that the first resolution of a fresh service always records
//! something.

use crate::error::{Result, UpdaterError};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// On-disk spelling of an unknown version.
pub const UNKNOWN: &str = "n/a";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VersionSlot {
    #[default]
    Unknown,
    Known(Version),
}

impl VersionSlot {
    /// Parse a raw token. `"n/a"` and the empty string mean unknown, anything
    /// else must be a semantic version (optionally `v`-prefixed).
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case(UNKNOWN) {
            return Ok(Self::Unknown);
        }
        parse_version(token).map(Self::Known)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    /// True iff `self` is strictly newer than `other`.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Greater
    }
}

impl From<Version> for VersionSlot {
    fn from(v: Version) -> Self {
        Self::Known(v)
    }
}

impl FromStr for VersionSlot {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Unknown => f.write_str(UNKNOWN),
        }
    }
}

impl Ord for VersionSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for VersionSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for VersionSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(Self::Unknown),
            Some(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Parse semver strings, tolerating a leading "v" (e.g. "v1.21.10")
pub fn parse_version(s: &str) -> Result<Version> {
    let stripped = version_from_tag(s.trim());
    Version::parse(stripped)
        .map_err(|e| UpdaterError::InvalidVersionFormat(format!("{s}: {e}")))
}

/// Strip a single leading version prefix character from a tag
pub fn version_from_tag(tag: &str) -> &str {
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// Total order over version slots; unknown sorts below every known version.
pub fn compare(a: &VersionSlot, b: &VersionSlot) -> Ordering {
    match (a, b) {
        (VersionSlot::Unknown, VersionSlot::Unknown) => Ordering::Equal,
        (VersionSlot::Unknown, VersionSlot::Known(_)) => Ordering::Less,
        (VersionSlot::Known(_), VersionSlot::Unknown) => Ordering::Greater,
        (VersionSlot::Known(x), VersionSlot::Known(y)) => x.cmp(y),
    }
}

/// Compare two raw tokens. Malformed tokens are an error, never a silent answer.
pub fn compare_tokens(a: &str, b: &str) -> Result<Ordering> {
    let a = VersionSlot::parse(a)?;
    let b = VersionSlot::parse(b)?;
    Ok(compare(&a, &b))
}

/// Returns true if `candidate` is strictly newer than `current`
pub fn is_newer(current: &str, candidate: &str) -> Result<bool> {
    Ok(compare_tokens(candidate, current)? == Ordering::Greater)
}
