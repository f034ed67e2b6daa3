//! End-to-end runs against the simulated host.

use proctor::{
    BatchKind, Controller, Failure, FailureKind, FinisherConfig, HarnessConfig, HookRegistry,
    MethodSpec, RunContext, RunReport, SimHost, SkipCheck, SuiteSpec,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[ctor::ctor]
fn setup() {
    proctor_common::testing::init_test_logging();
}

fn fast_config() -> HarnessConfig {
    HarnessConfig {
        finisher: FinisherConfig {
            max_rounds: 5,
            destroy_wait: Duration::from_millis(300),
        },
        marshal_timeout: Duration::from_secs(2),
    }
}

fn controller_on(sim: &Arc<SimHost>) -> Controller {
    let host: Arc<dyn proctor::HostEnvironment> = Arc::clone(sim) as _;
    Controller::new(RunContext::new(host, fast_config()))
}

#[test]
fn full_run_with_hooks_skips_and_surfaces() {
    let sim = Arc::new(SimHost::new());
    // A surface left over from "earlier instrumentation" that the run
    // must clean up on its way through.
    sim.add_surface("stale-onboarding");

    let mut hooks = HookRegistry::new();
    hooks.add_before_suite(|ctx, _| {
        ctx.prefs().set("first_run_complete", true);
        Ok(())
    });
    hooks.add_before_method(|ctx, method| {
        ctx.prefs().set("current_method", method.name());
        Ok(())
    });

    let spawn_host = Arc::clone(&sim);
    let suite = SuiteSpec::builder("BrowserStartupSuite")
        .test("sees_hook_state", |ctx| {
            if !ctx.prefs().get_bool("first_run_complete", false) {
                return Err(Failure::assertion("before-suite hook state missing"));
            }
            if ctx.prefs().get_text("current_method", "") != "sees_hook_state" {
                return Err(Failure::assertion("before-method hook state missing"));
            }
            Ok(())
        })
        .test("opens_window", move |_| {
            spawn_host.add_surface("settings-window");
            Ok(())
        })
        .method(
            MethodSpec::new("flaky_on_sim", |_| Ok(())).with_annotation("disabled"),
        )
        .test("fails", |_| Err(Failure::assertion("expected title mismatch")))
        .build();

    let controller = controller_on(&sim)
        .with_hooks(hooks)
        .with_skip_checks(vec![SkipCheck::annotation("disabled")]);
    let report = controller.run(&suite);

    let counts = report.counts();
    assert_eq!(counts.passed, 2);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.failed, 1);
    assert!(!report.passed());

    // Unbatched suite: every method's surfaces were torn down, the
    // stale one included.
    assert_eq!(sim.surface_count(), 0);
    assert_eq!(sim.observer_count(), 0);
    // Ambient state was reset at the suite boundary.
    assert!(controller.context().prefs().is_empty());
}

#[test]
fn batched_run_wraps_collateral_failures_and_keeps_state() {
    let sim = Arc::new(SimHost::new());
    let controller = controller_on(&sim);

    let suite = SuiteSpec::builder("HistoryBatchSuite")
        .batch(BatchKind::Batched)
        .test("seeds_history", |ctx| {
            ctx.prefs().set("history_len", 3i64);
            Ok(())
        })
        .test("corrupts_history", |ctx| {
            ctx.prefs().set("history_len", -1i64);
            Err(Failure::assertion("history store rejected entry"))
        })
        .test("reads_history", |ctx| {
            // Sees the corrupted batched state and fails as collateral.
            if ctx.prefs().get_int("history_len", 0) >= 0 {
                Ok(())
            } else {
                Err(Failure::assertion("negative history length"))
            }
        })
        .build();

    let report = controller.run(&suite);
    assert!(report.method("seeds_history").unwrap().status.is_passed());

    let root = report.method("corrupts_history").unwrap().status.failure().unwrap();
    assert_eq!(root.kind, FailureKind::Assertion);

    let collateral = report.method("reads_history").unwrap().status.failure().unwrap();
    assert_eq!(collateral.kind, FailureKind::Cascading);
    assert!(collateral.message.contains("corrupts_history"));
    assert_eq!(collateral.suppressed[0].message, "negative history length");
}

#[test]
fn report_round_trips_through_json_file() {
    let sim = Arc::new(SimHost::new());
    let suite = SuiteSpec::builder("SerializationSuite")
        .test("passes", |_| Ok(()))
        .test("fails", |_| Err(Failure::assertion("boom")))
        .build();
    let report = controller_on(&sim).run(&suite);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run-report.json");
    std::fs::write(&path, serde_json::to_string_pretty(&report).unwrap()).unwrap();

    let loaded: RunReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded, report);
    assert_eq!(loaded.counts().failed, 1);
}

#[test]
fn respawning_surface_does_not_hang_the_run() {
    let sim = Arc::new(SimHost::new());
    sim.add_respawning_surface("popup-loop");

    let suite = SuiteSpec::builder("PopupSuite").test("noop", |_| Ok(())).build();
    let report = controller_on(&sim).run(&suite);

    // The finisher gave up after its round bound instead of spinning;
    // the method outcome is unaffected (best-effort cleanup).
    assert!(report.method("noop").unwrap().status.is_passed());
    assert_eq!(sim.surface_count(), 1);
}

#[test]
fn consecutive_suites_on_one_controller_stay_isolated() {
    let sim = Arc::new(SimHost::new());
    let controller = controller_on(&sim);

    let mut hooks = HookRegistry::new();
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let order = Arc::clone(&order);
        hooks.add_after_suite(move |_, suite| {
            order.lock().unwrap().push(suite.name().to_string());
            Ok(())
        });
    }
    let controller = controller.with_hooks(hooks);

    let writer = SuiteSpec::builder("WriterSuite")
        .batch(BatchKind::Batched)
        .test("writes", |ctx| {
            ctx.prefs().set("shared", true);
            Ok(())
        })
        .build();
    let reader = SuiteSpec::builder("ReaderSuite")
        .test("reads_nothing", |ctx| {
            if ctx.prefs().contains("shared") {
                Err(Failure::assertion("state leaked across suites"))
            } else {
                Ok(())
            }
        })
        .build();

    assert!(controller.run(&writer).passed());
    assert!(controller.run(&reader).passed());
    assert_eq!(*order.lock().unwrap(), vec!["WriterSuite", "ReaderSuite"]);
}
