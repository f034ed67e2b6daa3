//! The test run controller.
//!
//! Drives one suite at a time through a deterministic state machine:
//! skip checks, hooks in registration order, the method body, outcome
//! classification, cascading-failure bookkeeping for batched suites,
//! and the terminal cleanup (preference reset + surface teardown) that
//! runs regardless of outcome.
//!
//! Execution is strictly single-method-at-a-time: after-method work for
//! method N fully completes before before-method work for method N+1
//! begins.

use crate::context::RunContext;
use crate::finisher::SurfaceFinisher;
use crate::hooks::{HookRegistry, MethodHook, SuiteHook};
use crate::report::{MethodReport, MethodStatus, RunReport};
use crate::skip::{self, SkipCheck};
use crate::suite::{MethodSpec, SuiteSpec};
use chrono::Utc;
use proctor_common::{Failure, PrefSnapshot};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

// ── Suite / method state machines ────────────────────────────────────────

/// Lifecycle of a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteState {
    NotStarted,
    RunningBeforeSuite,
    RunningMethods,
    RunningAfterSuite,
    Done,
}

impl std::fmt::Display for SuiteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::RunningBeforeSuite => write!(f, "running_before_suite"),
            Self::RunningMethods => write!(f, "running_methods"),
            Self::RunningAfterSuite => write!(f, "running_after_suite"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Phases of one method inside `RunningMethods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodPhase {
    RunningBeforeMethod,
    RunningBody,
    RunningAfterMethod,
}

impl std::fmt::Display for MethodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunningBeforeMethod => write!(f, "running_before_method"),
            Self::RunningBody => write!(f, "running_body"),
            Self::RunningAfterMethod => write!(f, "running_after_method"),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────

/// Runs suites against a host environment. See module docs.
pub struct Controller {
    ctx: RunContext,
    hooks: HookRegistry,
    skips: Vec<SkipCheck>,
    finisher: SurfaceFinisher,
}

impl Controller {
    /// Build a controller with empty hook and skip-check lists.
    pub fn new(ctx: RunContext) -> Self {
        let finisher = SurfaceFinisher::from_config(ctx.config());
        Self {
            ctx,
            hooks: HookRegistry::new(),
            skips: Vec::new(),
            finisher,
        }
    }

    /// Replace the hook registry (construction-time composition).
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Append skip checks.
    #[must_use]
    pub fn with_skip_checks(mut self, checks: Vec<SkipCheck>) -> Self {
        self.skips.extend(checks);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run every method of `suite` in declaration order and report the
    /// outcome per method.
    pub fn run(&self, suite: &SuiteSpec) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = SuiteState::NotStarted;
        debug!(suite = %suite.name(), %state, "suite state");
        let mut methods = Vec::with_capacity(suite.methods().len());
        let mut suite_error: Option<Failure> = None;

        state = SuiteState::RunningBeforeSuite;
        debug!(suite = %suite.name(), %state, "suite state");
        // The batch starts from a known-empty ambient state.
        self.ctx.prefs().reset();

        let mut setup_assumption: Option<Failure> = None;
        for hook in self.hooks.before_suite() {
            match run_suite_hook(hook, &self.ctx, suite) {
                Ok(()) => {}
                Err(failure) if failure.is_assumption() => {
                    // Re-raised verbatim: the whole suite is skipped,
                    // nothing is wrapped.
                    setup_assumption = Some(failure);
                    break;
                }
                Err(failure) => {
                    suite_error = Some(Failure::suite_setup(suite.batch(), failure));
                    break;
                }
            }
        }

        state = SuiteState::RunningMethods;
        debug!(suite = %suite.name(), %state, "suite state");
        if let Some(assumption) = &setup_assumption {
            for method in suite.methods() {
                methods.push(MethodReport {
                    name: method.name().to_string(),
                    status: MethodStatus::Skipped {
                        reason: assumption.message.clone(),
                    },
                    duration_ms: 0,
                });
            }
        } else if let Some(setup) = &suite_error {
            // Every method of the suite is a casualty of the setup
            // failure and is reported as failed with it.
            warn!(suite = %suite.name(), error = %setup, "before-suite hook failed");
            for method in suite.methods() {
                methods.push(MethodReport {
                    name: method.name().to_string(),
                    status: MethodStatus::Failed {
                        failure: setup.clone(),
                    },
                    duration_ms: 0,
                });
            }
        } else {
            let mut baseline: Option<PrefSnapshot> = None;
            let mut first_failed: Option<String> = None;
            for method in suite.methods() {
                let report = self.run_method(suite, method, &mut baseline, &mut first_failed);
                methods.push(report);
            }
        }
        let any_method_failed = methods.iter().any(|m| m.status.is_failed());

        state = SuiteState::RunningAfterSuite;
        debug!(suite = %suite.name(), %state, "suite state");
        for hook in self.hooks.after_suite() {
            match run_suite_hook(hook, &self.ctx, suite) {
                Ok(()) => {}
                Err(failure) if failure.is_assumption() => break,
                Err(failure) => {
                    let teardown = Failure::suite_teardown(failure);
                    match &mut suite_error {
                        // Never replace an earlier suite error; append.
                        Some(existing) => existing.suppress(teardown),
                        None => suite_error = Some(teardown),
                    }
                }
            }
        }

        // Lifetime checks after a failing method are unreliable: objects
        // held alive by the failure path are not real leaks. Assert only
        // on a fully passing run, otherwise reset the tracking state.
        let passing_so_far = !any_method_failed && suite_error.is_none();
        if passing_so_far && !suite.exempt_from_leak_check() {
            if let Err(leak) = self.ctx.leaks().assert_released() {
                warn!(suite = %suite.name(), error = %leak, "leak invariant violated at suite end");
                suite_error = Some(leak);
            }
        } else {
            self.ctx.leaks().reset();
        }

        // Terminal suite cleanup, unconditionally: ambient state reset
        // plus surface teardown.
        self.ctx.prefs().reset();
        let outcome = self.finisher.finish_all(self.ctx.host());
        if !outcome.clean() {
            warn!(
                suite = %suite.name(),
                remaining = outcome.remaining,
                "surfaces left behind after suite teardown"
            );
        }

        state = SuiteState::Done;
        debug!(suite = %suite.name(), %state, "suite state");

        RunReport {
            run_id,
            suite: suite.name().clone(),
            batch: suite.batch(),
            started_at,
            finished_at: Utc::now(),
            methods,
            suite_error,
        }
    }

    fn run_method(
        &self,
        suite: &SuiteSpec,
        method: &MethodSpec,
        baseline: &mut Option<PrefSnapshot>,
        first_failed: &mut Option<String>,
    ) -> MethodReport {
        if let Some(check) = skip::first_match(&self.skips, method) {
            debug!(method = method.name(), check = check.name(), "method skipped");
            return MethodReport {
                name: method.name().to_string(),
                status: MethodStatus::Skipped {
                    reason: format!("skip check '{}' matched", check.name()),
                },
                duration_ms: 0,
            };
        }

        let started = Instant::now();
        let mut phase = MethodPhase::RunningBeforeMethod;
        debug!(method = method.name(), %phase, "method phase");

        // The first executed method of the batch captures the baseline;
        // unbatched suites restore it before every later method. Batched
        // suites never restore mid-suite: mutations persist.
        match baseline {
            None => *baseline = Some(self.ctx.prefs().snapshot()),
            Some(snapshot) if !suite.batch().persists_across_methods() => {
                self.ctx.prefs().restore(snapshot);
            }
            Some(_) => {}
        }

        let mut failure: Option<Failure> = None;
        let mut assumption: Option<Failure> = None;

        for hook in self.hooks.before_method() {
            match run_method_hook(hook, &self.ctx, method) {
                Ok(()) => {}
                Err(hook_failure) if hook_failure.is_assumption() => {
                    assumption = Some(hook_failure);
                    break;
                }
                Err(hook_failure) => {
                    failure = Some(hook_failure);
                    break;
                }
            }
        }

        if failure.is_none() && assumption.is_none() {
            phase = MethodPhase::RunningBody;
            debug!(method = method.name(), %phase, "method phase");
            match method.invoke(&self.ctx) {
                Ok(()) => {}
                Err(body_failure) if body_failure.is_assumption() => {
                    assumption = Some(body_failure)
                }
                Err(body_failure) => failure = Some(body_failure),
            }
        }

        // After-method hooks always run, body failure or not. Their
        // failures are suppressed into the primary failure, or become
        // primary when there is none yet.
        phase = MethodPhase::RunningAfterMethod;
        debug!(method = method.name(), %phase, "method phase");
        for hook in self.hooks.after_method() {
            match run_method_hook(hook, &self.ctx, method) {
                Ok(()) => {}
                Err(hook_failure) if hook_failure.is_assumption() => break,
                Err(hook_failure) => attach(&mut failure, hook_failure),
            }
        }

        // Terminal per-method cleanup. Unit-batched suites defer both
        // surface teardown and leak assertions to the suite boundary.
        if suite.batch().per_method_cleanup() {
            let outcome = self.finisher.finish_all(self.ctx.host());
            if !outcome.clean() {
                warn!(
                    method = method.name(),
                    remaining = outcome.remaining,
                    "surfaces left behind after method"
                );
            }
            if failure.is_none() && assumption.is_none() {
                if let Err(leak) = self.ctx.leaks().assert_released() {
                    attach(&mut failure, leak);
                }
            } else {
                self.ctx.leaks().reset();
            }
        }

        // Unbatched methods leave the ambient state exactly as the
        // baseline captured immediately before the batch ran.
        if !suite.batch().persists_across_methods() {
            if let Some(snapshot) = baseline.as_ref() {
                self.ctx.prefs().restore(snapshot);
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;

        if let Some(primary) = failure {
            let reported = if suite.batch().cascading_eligible() {
                match first_failed {
                    Some(first) => Failure::cascading(first, primary),
                    None => {
                        *first_failed = Some(method.name().to_string());
                        primary
                    }
                }
            } else {
                primary
            };
            warn!(method = method.name(), error = %reported, "method failed");
            return MethodReport {
                name: method.name().to_string(),
                status: MethodStatus::Failed { failure: reported },
                duration_ms,
            };
        }

        if let Some(assumption) = assumption {
            debug!(method = method.name(), reason = %assumption.message, "assumption violated");
            return MethodReport {
                name: method.name().to_string(),
                status: MethodStatus::Skipped {
                    reason: assumption.message,
                },
                duration_ms,
            };
        }

        MethodReport {
            name: method.name().to_string(),
            status: MethodStatus::Passed,
            duration_ms,
        }
    }
}

/// Promote `new` to primary, or suppress it into the existing primary.
fn attach(primary: &mut Option<Failure>, new: Failure) {
    match primary {
        Some(existing) => existing.suppress(new),
        None => *primary = Some(new),
    }
}

fn run_suite_hook(hook: &SuiteHook, ctx: &RunContext, suite: &SuiteSpec) -> Result<(), Failure> {
    match panic::catch_unwind(AssertUnwindSafe(|| hook(ctx, suite))) {
        Ok(result) => result,
        Err(payload) => Err(Failure::from_panic(payload)),
    }
}

fn run_method_hook(
    hook: &MethodHook,
    ctx: &RunContext,
    method: &MethodSpec,
) -> Result<(), Failure> {
    match panic::catch_unwind(AssertUnwindSafe(|| hook(ctx, method))) {
        Ok(result) => result,
        Err(payload) => Err(Failure::from_panic(payload)),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
