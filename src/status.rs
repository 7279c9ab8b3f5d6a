//! 状态分类：大小写不敏感的状态值与状态集合。
//!
//! Status values and status sets.
//!
//! Remote management APIs report status strings with inconsistent casing across
//! API versions (`Registered`, `REGISTERED`, `registered`). A [`Status`] folds the
//! case once, at the probe boundary, and every comparison afterwards is an exact
//! match on the folded key.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A status string as reported by the remote system.
///
/// Equality and hashing ignore case; `Display` renders the raw spelling.
#[derive(Clone)]
pub struct Status {
    raw: String,
    key: String,
}

impl Status {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let key = raw.trim().to_lowercase();
        Self { raw, key }
    }

    /// The status exactly as the remote system spelled it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Case-folded comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Status {}

impl Hash for Status {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({:?})", self.raw)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        Status::new(s)
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::new(s)
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Status::new)
    }
}

/// A set of statuses compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSet {
    inner: HashSet<Status>,
}

impl StatusSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, status: impl Into<Status>) -> bool {
        self.inner.insert(status.into())
    }

    pub fn contains(&self, status: &Status) -> bool {
        self.inner.contains(status)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Status> {
        self.inner.iter()
    }

    /// First status present in both sets, if any.
    pub fn intersection_with<'a>(&'a self, other: &'a StatusSet) -> Option<&'a Status> {
        self.inner.iter().find(|s| other.contains(s))
    }

    /// Sorted, comma separated raw spellings. Used in error messages.
    pub fn describe(&self) -> String {
        let mut names: Vec<&str> = self.inner.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl<S: Into<Status>> FromIterator<S> for StatusSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<Status>, const N: usize> From<[S; N]> for StatusSet {
    fn from(arr: [S; N]) -> Self {
        arr.into_iter().collect()
    }
}

/// Where a probed status falls relative to a convergence spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Still in progress; poll again.
    Pending,
    /// Converged.
    Target,
    /// Neither pending nor target. Never self-resolves.
    Unexpected,
}

impl Classification {
    pub fn of(status: &Status, pending: &StatusSet, target: &StatusSet) -> Self {
        if target.contains(status) {
            Classification::Target
        } else if pending.contains(status) {
            Classification::Pending
        } else {
            Classification::Unexpected
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, Classification::Target)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Classification::Pending)
    }
}
