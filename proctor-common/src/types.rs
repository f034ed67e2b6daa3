//! Common types used across Proctor components.

use serde::{Deserialize, Serialize};

/// Unique name of a test suite within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuiteName(pub String);

impl SuiteName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SuiteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Batch policy of a suite: whether ambient environment state persists
/// across the suite's methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Full environment reset around every method.
    Unbatched,
    /// Environment persists across methods; reset only at suite boundaries.
    Batched,
    /// Batched, and additionally exempt from per-method surface teardown
    /// and per-method leak assertions. Failures are assumed independent
    /// and are never wrapped as cascading.
    UnitBatched,
}

impl BatchKind {
    /// Whether ambient state persists across methods in this suite.
    pub fn persists_across_methods(&self) -> bool {
        !matches!(self, Self::Unbatched)
    }

    /// Whether per-method surface teardown and leak assertions run.
    pub fn per_method_cleanup(&self) -> bool {
        !matches!(self, Self::UnitBatched)
    }

    /// Whether failures in this suite participate in cascading-failure
    /// bookkeeping.
    pub fn cascading_eligible(&self) -> bool {
        matches!(self, Self::Batched)
    }
}

impl Default for BatchKind {
    fn default() -> Self {
        Self::Unbatched
    }
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbatched => write!(f, "unbatched"),
            Self::Batched => write!(f, "batched"),
            Self::UnitBatched => write!(f, "unit_batched"),
        }
    }
}
