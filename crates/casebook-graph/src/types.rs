//! Identifier types shared by the graph, validator and solver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a discoverable fact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(pub String);

impl FactId {
    /// Create a new fact id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FactId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a visitable casebook entry
///
/// Ordering is plain byte order of the identifier; the solver's tie-break
/// relies on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    /// Create a new entry id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Dense index of a fact inside a built graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactIx(pub u32);

/// Dense index of an entry inside a built graph
///
/// Entries are indexed in identifier order, so comparing index sequences
/// compares identifier sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryIx(pub u32);

/// Narrow a dense index
///
/// A graph holds fewer than `u32::MAX` nodes in total, the index space of the
/// underlying petgraph, which refuses to add a node past it. An index outside
/// that space is a bug in the caller.
#[inline]
pub(crate) fn ix32(i: usize) -> u32 {
    debug_assert!(
        u32::try_from(i).is_ok(),
        "node index {i} exceeds the u32 index space"
    );
    u32::try_from(i).unwrap_or(u32::MAX)
}

impl FactIx {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl EntryIx {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Validity verdict returned by every validator in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the checked output is acceptable
    pub valid: bool,
    /// One message per violation, in detection order
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// A passing verdict
    #[inline]
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Build a verdict from collected errors; valid when there are none
    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}
