//! Bounded-retry teardown of leftover top-level surfaces.
//!
//! After a test method (or suite) completes, the host may still hold
//! surfaces the test spawned and never closed. The finisher snapshots
//! them on the privileged thread, closes their tasks, requests every
//! surface to finish, and parks on a completion gate until the host
//! reports a destruction or the round times out. Finishing one surface
//! can itself spawn another (a parent launching a child on teardown), so
//! the whole procedure repeats up to a fixed bound of rounds.
//!
//! Exhausting the bound logs the remaining surfaces and gives up without
//! raising: failing the whole suite over one misbehaving leftover
//! surface is worse than proceeding, so a leaked surface is a warning,
//! not a process-fatal error.

use crate::host::{
    HostEnvironment, HostTask, Surface, SurfaceId, SurfaceLifecycleState, SurfaceObserver,
};
use proctor_common::{CompletionGate, FinisherConfig, GateError, HarnessConfig};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a [`SurfaceFinisher::finish_all`] call accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinisherOutcome {
    /// Rounds that found surfaces or tasks to tear down.
    pub rounds_worked: u32,
    /// Surfaces still alive when the finisher returned.
    pub remaining: usize,
    /// Total wall-clock time spent.
    pub elapsed: Duration,
}

impl FinisherOutcome {
    /// Whether the host ended up with no leftover surfaces.
    pub fn clean(&self) -> bool {
        self.remaining == 0
    }
}

/// Signals the gate on the first destruction of a watched surface.
/// One notification per round is enough: the gate is armed for a single
/// signal because the round only needs liveness detection, not
/// exhaustive confirmation.
struct DestroyedSignal {
    gate: Arc<CompletionGate>,
    watched: BTreeSet<SurfaceId>,
}

impl SurfaceObserver for DestroyedSignal {
    fn on_state_change(&self, surface: SurfaceId, state: SurfaceLifecycleState) {
        if state.is_terminal() && self.watched.contains(&surface) {
            self.gate.signal();
        }
    }
}

struct HostSnapshot {
    surfaces: Vec<Arc<dyn Surface>>,
    tasks: Vec<Arc<dyn HostTask>>,
}

impl HostSnapshot {
    fn is_empty(&self) -> bool {
        self.surfaces.is_empty() && self.tasks.is_empty()
    }
}

/// Best-effort teardown of all leftover surfaces. See module docs.
pub struct SurfaceFinisher {
    config: FinisherConfig,
    marshal_timeout: Duration,
}

impl SurfaceFinisher {
    pub fn new(config: FinisherConfig, marshal_timeout: Duration) -> Self {
        Self {
            config,
            marshal_timeout,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.finisher.clone(), config.marshal_timeout)
    }

    /// Tear down every leftover surface, retrying up to the round bound.
    /// Never fails: on bound exhaustion the remainder is logged and the
    /// outcome reports `remaining > 0`.
    pub fn finish_all(&self, host: &Arc<dyn HostEnvironment>) -> FinisherOutcome {
        let started = Instant::now();
        let mut rounds_worked = 0u32;

        for _ in 0..self.config.max_rounds {
            // Snapshot on the privileged thread, atomically with respect
            // to surface creation: a surface spawned mid-snapshot cannot
            // be missed or half-observed.
            let snapshot = match self.snapshot(host) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(error = %err, "host unavailable during surface teardown; giving up");
                    return FinisherOutcome {
                        rounds_worked,
                        remaining: 0,
                        elapsed: started.elapsed(),
                    };
                }
            };

            if snapshot.is_empty() {
                if rounds_worked > 0 {
                    info!(
                        rounds = rounds_worked,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "surface teardown converged"
                    );
                }
                return FinisherOutcome {
                    rounds_worked,
                    remaining: 0,
                    elapsed: started.elapsed(),
                };
            }
            rounds_worked += 1;
            debug!(
                round = rounds_worked,
                surfaces = snapshot.surfaces.len(),
                tasks = snapshot.tasks.len(),
                "surface teardown round"
            );

            let gate = Arc::new(CompletionGate::new());
            gate.arm(1);
            let watched: BTreeSet<SurfaceId> =
                snapshot.surfaces.iter().map(|s| s.id()).collect();
            let observer = Arc::new(DestroyedSignal {
                gate: Arc::clone(&gate),
                watched,
            });

            // One privileged-thread block: register the observer, close
            // tasks, request finishes. Destructions queue behind it, so
            // a destruction can never race past an unregistered observer.
            let host_in = Arc::clone(host);
            let observer_in = observer as Arc<dyn SurfaceObserver>;
            let surfaces_in: Vec<Arc<dyn Surface>> = snapshot.surfaces.clone();
            let tasks_in: Vec<Arc<dyn HostTask>> = snapshot.tasks.clone();
            let registered = crate::host::run_on_privileged_sync(
                host.as_ref(),
                self.marshal_timeout,
                move || {
                    let observer_id = host_in.add_observer(observer_in);
                    for task in &tasks_in {
                        if let Err(err) = task.close() {
                            // Tolerable race: the task vanished between
                            // enumeration and close.
                            warn!(task = %task.id(), error = %err, "task close raced with teardown");
                        }
                    }
                    for surface in &surfaces_in {
                        if !surface.is_finishing() {
                            surface.request_finish();
                        }
                    }
                    observer_id
                },
            );
            let observer_id = match registered {
                Ok(observer_id) => observer_id,
                Err(err) => {
                    warn!(error = %err, "host unavailable during surface teardown; giving up");
                    return FinisherOutcome {
                        rounds_worked,
                        remaining: snapshot.surfaces.len(),
                        elapsed: started.elapsed(),
                    };
                }
            };

            // Tasks can be outstanding without any surface; there is
            // nothing to observe then, so do not wait.
            let wait = if snapshot.surfaces.is_empty() {
                Ok(())
            } else {
                gate.wait_for(self.config.destroy_wait)
            };

            // The observer is unregistered on every exit path of the
            // round, timeout included.
            let host_out = Arc::clone(host);
            let _ = crate::host::run_on_privileged_sync(
                host.as_ref(),
                self.marshal_timeout,
                move || host_out.remove_observer(observer_id),
            );

            if let Err(GateError::Timeout { delivered, .. }) = wait {
                let outstanding: Vec<String> = snapshot
                    .surfaces
                    .iter()
                    .map(|s| format!("{} ({})", s.id(), s.label()))
                    .collect();
                warn!(
                    round = rounds_worked,
                    delivered,
                    outstanding = ?outstanding,
                    "timed out waiting for a surface destruction; retrying"
                );
            }
        }

        // Round bound exhausted: log whatever is left and give up.
        let remaining = match self.snapshot(host) {
            Ok(snapshot) => {
                for surface in &snapshot.surfaces {
                    warn!(
                        surface = %surface.id(),
                        label = %surface.label(),
                        "surface still alive after teardown bound; giving up"
                    );
                }
                snapshot.surfaces.len()
            }
            Err(err) => {
                warn!(error = %err, "host unavailable while listing leftover surfaces");
                0
            }
        };

        FinisherOutcome {
            rounds_worked,
            remaining,
            elapsed: started.elapsed(),
        }
    }

    fn snapshot(
        &self,
        host: &Arc<dyn HostEnvironment>,
    ) -> Result<HostSnapshot, crate::host::HostError> {
        let host_in = Arc::clone(host);
        crate::host::run_on_privileged_sync(host.as_ref(), self.marshal_timeout, move || {
            HostSnapshot {
                surfaces: host_in.surfaces(),
                tasks: host_in.tasks(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHost;

    fn finisher() -> SurfaceFinisher {
        SurfaceFinisher::new(
            FinisherConfig {
                max_rounds: 5,
                destroy_wait: Duration::from_millis(200),
            },
            Duration::from_secs(1),
        )
    }

    fn as_host(sim: &Arc<SimHost>) -> Arc<dyn HostEnvironment> {
        Arc::clone(sim) as Arc<dyn HostEnvironment>
    }

    #[test]
    fn test_empty_host_is_a_no_op() {
        let sim = Arc::new(SimHost::new());
        let outcome = finisher().finish_all(&as_host(&sim));
        assert_eq!(outcome.rounds_worked, 0);
        assert!(outcome.clean());
    }

    #[test]
    fn test_two_plain_surfaces_finish_in_one_round() {
        // Scenario D: two pre-existing surfaces that spawn nothing.
        let sim = Arc::new(SimHost::builder().surface("a").surface("b").build());
        let outcome = finisher().finish_all(&as_host(&sim));

        assert_eq!(outcome.rounds_worked, 1);
        assert!(outcome.clean());
        assert_eq!(sim.surface_count(), 0);
        // Both destructions were observed, even though one signal is
        // enough to release the round.
        assert_eq!(sim.destroyed_log().len(), 2);
    }

    #[test]
    fn test_spawning_surface_converges_in_extra_round() {
        let sim = Arc::new(SimHost::builder().spawning_surface("parent", 2).build());
        let outcome = finisher().finish_all(&as_host(&sim));

        assert_eq!(outcome.rounds_worked, 2);
        assert!(outcome.clean());
        assert_eq!(sim.surface_count(), 0);
        assert_eq!(sim.destroyed_log().len(), 3);
    }

    #[test]
    fn test_respawning_surface_stops_at_round_bound() {
        // A surface that respawns a replacement on every finish never
        // converges; the loop must stop at the bound and report the
        // remainder instead of spinning forever.
        let sim = Arc::new(SimHost::builder().respawning_surface("phoenix").build());
        let outcome = finisher().finish_all(&as_host(&sim));

        assert_eq!(outcome.rounds_worked, 5);
        assert_eq!(outcome.remaining, 1);
        assert_eq!(sim.surface_count(), 1);
        assert_eq!(sim.destroyed_log().len(), 5);
    }

    #[test]
    fn test_unfinishable_surface_times_out_every_round_and_gives_up() {
        let sim = Arc::new(SimHost::builder().unfinishable_surface("stuck").build());
        let finisher = SurfaceFinisher::new(
            FinisherConfig {
                max_rounds: 3,
                destroy_wait: Duration::from_millis(30),
            },
            Duration::from_secs(1),
        );
        let outcome = finisher.finish_all(&as_host(&sim));

        assert_eq!(outcome.rounds_worked, 3);
        assert_eq!(outcome.remaining, 1);
        assert_eq!(sim.surface_count(), 1);
        // Best-effort: the leftover is logged, never raised.
    }

    #[test]
    fn test_vanished_task_is_tolerated() {
        let sim = Arc::new(
            SimHost::builder()
                .surface("real")
                .vanishing_task()
                .build(),
        );
        let outcome = finisher().finish_all(&as_host(&sim));

        assert!(outcome.clean());
        assert_eq!(sim.surface_count(), 0);
        assert_eq!(sim.task_count(), 0);
    }

    #[test]
    fn test_task_only_host_closes_without_waiting() {
        let sim = Arc::new(SimHost::builder().vanishing_task().build());
        let started = Instant::now();
        let outcome = finisher().finish_all(&as_host(&sim));

        assert_eq!(outcome.rounds_worked, 1);
        assert!(outcome.clean());
        // No surface to observe, so no destroy-wait was paid.
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_observer_unregistered_on_success_and_timeout() {
        let sim = Arc::new(SimHost::builder().surface("ok").build());
        finisher().finish_all(&as_host(&sim));
        assert_eq!(sim.observer_count(), 0);

        let stuck = Arc::new(SimHost::builder().unfinishable_surface("stuck").build());
        let fast = SurfaceFinisher::new(
            FinisherConfig {
                max_rounds: 2,
                destroy_wait: Duration::from_millis(20),
            },
            Duration::from_secs(1),
        );
        fast.finish_all(&as_host(&stuck));
        assert_eq!(stuck.observer_count(), 0);
    }
}
