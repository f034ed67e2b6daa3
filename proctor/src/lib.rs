//! Proctor: instrumented-test orchestration engine.
//!
//! Runs suites of test methods against a live, stateful host process.
//! Between methods it resets shared ambient state according to the
//! suite's batch policy, tears down leftover top-level surfaces with a
//! bounded-retry asynchronous protocol, annotates cascading failures
//! within a batch, and enforces leak invariants over tracked objects.
//!
//! The engine is synchronous by design: a privileged thread owns all
//! surface-lifecycle operations and must never block, while the
//! test-execution thread marshals work onto it and parks on a
//! [`CompletionGate`](proctor_common::CompletionGate) until the host
//! reports progress or a timeout elapses.
//!
//! Entry point: build a [`RunContext`](context::RunContext) around a
//! [`HostEnvironment`](host::HostEnvironment), construct a
//! [`Controller`](controller::Controller) with hook and skip-check
//! lists, and call `run` with a [`SuiteSpec`](suite::SuiteSpec).

pub mod context;
pub mod controller;
pub mod finisher;
pub mod hooks;
pub mod host;
pub mod leak;
pub mod report;
pub mod sim;
pub mod skip;
pub mod suite;

pub use context::RunContext;
pub use controller::{Controller, MethodPhase, SuiteState};
pub use finisher::{FinisherOutcome, SurfaceFinisher};
pub use hooks::HookRegistry;
pub use host::{
    HostEnvironment, HostError, HostTask, ObserverId, Surface, SurfaceId, SurfaceLifecycleState,
    SurfaceObserver, TaskId, run_on_privileged_sync,
};
pub use leak::LeakMonitor;
pub use report::{MethodReport, MethodStatus, RunCounts, RunReport};
pub use sim::SimHost;
pub use skip::SkipCheck;
pub use suite::{MethodSpec, SuiteSpec, SuiteSpecBuilder};

pub use proctor_common::{
    BatchKind, CompletionGate, Failure, FailureKind, FinisherConfig, GateError, HarnessConfig,
    PrefSnapshot, PrefStore, PrefValue, SuiteName,
};
