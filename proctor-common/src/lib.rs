//! Shared types and primitives for the Proctor test harness.
//!
//! This crate holds the leaf material consumed by the `proctor` engine:
//! typed identifiers and batch policies, the failure taxonomy, harness
//! configuration with environment overrides, the completion gate used to
//! synchronize the test thread with host callbacks, and the in-memory
//! preference store that stands in for persisted key-value state.

pub mod config;
pub mod failure;
pub mod gate;
pub mod prefs;
pub mod testing;
pub mod types;

pub use config::{FinisherConfig, HarnessConfig};
pub use failure::{Failure, FailureKind};
pub use gate::{CompletionGate, GateError};
pub use prefs::{PrefSnapshot, PrefStore, PrefValue};
pub use types::{BatchKind, SuiteName};
