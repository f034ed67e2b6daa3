//! Simulated host environment for tests.
//!
//! `SimHost` owns a real privileged thread draining a job queue, a set
//! of surfaces with configurable finish behavior, and per-surface tasks.
//! It does not render anything; it is intended for CI and integration
//! tests where a live host process is unavailable.
//!
//! Finish behavior is chosen per surface at creation:
//! - plain surfaces are destroyed once their queued finish is processed,
//! - spawning surfaces destroy and then create child surfaces (finishing
//!   one surface can itself spawn another),
//! - respawning surfaces create a replacement on every finish and never
//!   converge,
//! - unfinishable surfaces accept the finish request and never reach
//!   `Destroyed`.

use crate::host::{
    HostEnvironment, HostError, HostTask, ObserverId, Surface, SurfaceId, SurfaceLifecycleState,
    SurfaceObserver, TaskId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinishBehavior {
    /// Destroyed once the queued finish is processed.
    Normal,
    /// Destroyed, then spawns this many plain children.
    SpawnChildren(u32),
    /// Destroyed, then spawns a replacement with the same behavior.
    Respawn,
    /// Accepts the request but never reaches `Destroyed`.
    Unfinishable,
}

enum Job {
    Work(Box<dyn FnOnce() + Send>),
    Shutdown,
}

struct SimSurface {
    id: SurfaceId,
    label: String,
    behavior: FinishBehavior,
    finishing: AtomicBool,
    state: Mutex<SurfaceLifecycleState>,
    core: Weak<SimCore>,
}

impl Surface for SimSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn state(&self) -> SurfaceLifecycleState {
        *self.state.lock().expect("sim surface lock poisoned")
    }

    fn is_finishing(&self) -> bool {
        self.finishing.load(Ordering::SeqCst)
    }

    fn request_finish(&self) {
        if self.finishing.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.behavior == FinishBehavior::Unfinishable {
            debug!(surface = %self.id, "sim surface ignores finish request");
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };
        // Destruction is asynchronous: it lands on the privileged queue
        // behind whatever marshaled work requested the finish.
        let id = self.id;
        let worker = Arc::clone(&core);
        core.post(Box::new(move || worker.destroy_surface(id)));
    }
}

struct SimTask {
    id: TaskId,
    vanished: AtomicBool,
    surface_ids: Mutex<Vec<SurfaceId>>,
    core: Weak<SimCore>,
}

impl HostTask for SimTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn surface_count(&self) -> usize {
        self.surface_ids.lock().expect("sim task lock poisoned").len()
    }

    fn close(&self) -> Result<(), HostError> {
        let Some(core) = self.core.upgrade() else {
            return Err(HostError::Vanished(self.id));
        };
        if self.vanished.swap(false, Ordering::SeqCst) {
            // Primed race: the task disappeared between enumeration and
            // close. It is already gone from the host's point of view.
            core.remove_task(self.id);
            return Err(HostError::Vanished(self.id));
        }
        let ids = self.surface_ids.lock().expect("sim task lock poisoned").clone();
        let members: Vec<Arc<SimSurface>> = {
            let state = core.state.lock().expect("sim state lock poisoned");
            state
                .surfaces
                .iter()
                .filter(|s| ids.contains(&s.id))
                .cloned()
                .collect()
        };
        for surface in members {
            surface.request_finish();
        }
        core.remove_task(self.id);
        Ok(())
    }
}

#[derive(Default)]
struct SimState {
    surfaces: Vec<Arc<SimSurface>>,
    tasks: Vec<Arc<SimTask>>,
    observers: HashMap<ObserverId, Arc<dyn SurfaceObserver>>,
    next_observer: ObserverId,
    next_surface: u64,
    next_task: u64,
    destroyed: Vec<SurfaceId>,
}

struct SimCore {
    state: Mutex<SimState>,
    jobs: Mutex<Sender<Job>>,
}

impl SimCore {
    fn post(&self, work: Box<dyn FnOnce() + Send>) {
        let _ = self
            .jobs
            .lock()
            .expect("sim job sender poisoned")
            .send(Job::Work(work));
    }

    fn add_surface(self: &Arc<Self>, label: String, behavior: FinishBehavior) -> SurfaceId {
        let mut state = self.state.lock().expect("sim state lock poisoned");
        let id = SurfaceId(state.next_surface);
        state.next_surface += 1;
        let task_id = TaskId(state.next_task);
        state.next_task += 1;

        let surface = Arc::new(SimSurface {
            id,
            label,
            behavior,
            finishing: AtomicBool::new(false),
            state: Mutex::new(SurfaceLifecycleState::Resumed),
            core: Arc::downgrade(self),
        });
        // Every surface lives in a task of its own.
        let task = Arc::new(SimTask {
            id: task_id,
            vanished: AtomicBool::new(false),
            surface_ids: Mutex::new(vec![id]),
            core: Arc::downgrade(self),
        });
        state.surfaces.push(surface);
        state.tasks.push(task);
        id
    }

    fn add_vanishing_task(self: &Arc<Self>) -> TaskId {
        let mut state = self.state.lock().expect("sim state lock poisoned");
        let id = TaskId(state.next_task);
        state.next_task += 1;
        state.tasks.push(Arc::new(SimTask {
            id,
            vanished: AtomicBool::new(true),
            surface_ids: Mutex::new(Vec::new()),
            core: Arc::downgrade(self),
        }));
        id
    }

    fn remove_task(&self, id: TaskId) {
        let mut state = self.state.lock().expect("sim state lock poisoned");
        state.tasks.retain(|t| t.id != id);
    }

    /// Runs on the privileged thread: destroy a surface, notify
    /// observers, then apply its spawn behavior.
    fn destroy_surface(self: &Arc<Self>, id: SurfaceId) {
        let (surface, observers) = {
            let mut state = self.state.lock().expect("sim state lock poisoned");
            let Some(index) = state.surfaces.iter().position(|s| s.id == id) else {
                return;
            };
            let surface = state.surfaces.remove(index);
            state.destroyed.push(id);
            for task in &state.tasks {
                task.surface_ids
                    .lock()
                    .expect("sim task lock poisoned")
                    .retain(|sid| *sid != id);
            }
            state.tasks.retain(|t| {
                !t.surface_ids
                    .lock()
                    .expect("sim task lock poisoned")
                    .is_empty()
                    || t.vanished.load(Ordering::SeqCst)
            });
            let observers: Vec<Arc<dyn SurfaceObserver>> =
                state.observers.values().cloned().collect();
            (surface, observers)
        };

        *surface.state.lock().expect("sim surface lock poisoned") =
            SurfaceLifecycleState::Destroyed;
        debug!(surface = %id, label = %surface.label, "sim surface destroyed");
        // Observers are notified outside the state lock; they may call
        // back into the host.
        for observer in &observers {
            observer.on_state_change(id, SurfaceLifecycleState::Destroyed);
        }

        match surface.behavior {
            FinishBehavior::SpawnChildren(count) => {
                for index in 0..count {
                    self.add_surface(
                        format!("{}-child{index}", surface.label),
                        FinishBehavior::Normal,
                    );
                }
            }
            FinishBehavior::Respawn => {
                self.add_surface(format!("{}'", surface.label), FinishBehavior::Respawn);
            }
            FinishBehavior::Normal | FinishBehavior::Unfinishable => {}
        }
    }
}

/// Simulated host environment. See module docs.
pub struct SimHost {
    core: Arc<SimCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimHost {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("sim-privileged".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Work(work) => work(),
                        Job::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn sim privileged thread");

        Self {
            core: Arc::new(SimCore {
                state: Mutex::new(SimState::default()),
                jobs: Mutex::new(tx),
            }),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn builder() -> SimHostBuilder {
        SimHostBuilder::default()
    }

    /// Add a plain surface that destroys once finished.
    pub fn add_surface(&self, label: impl Into<String>) -> SurfaceId {
        self.core.add_surface(label.into(), FinishBehavior::Normal)
    }

    /// Add a surface that spawns `children` plain surfaces when finished.
    pub fn add_spawning_surface(&self, label: impl Into<String>, children: u32) -> SurfaceId {
        self.core
            .add_surface(label.into(), FinishBehavior::SpawnChildren(children))
    }

    /// Add a surface that respawns a replacement on every finish.
    pub fn add_respawning_surface(&self, label: impl Into<String>) -> SurfaceId {
        self.core.add_surface(label.into(), FinishBehavior::Respawn)
    }

    /// Add a surface that never reaches `Destroyed`.
    pub fn add_unfinishable_surface(&self, label: impl Into<String>) -> SurfaceId {
        self.core
            .add_surface(label.into(), FinishBehavior::Unfinishable)
    }

    /// Add a task primed to vanish between enumeration and close.
    pub fn add_vanishing_task(&self) -> TaskId {
        self.core.add_vanishing_task()
    }

    pub fn surface_count(&self) -> usize {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .surfaces
            .len()
    }

    pub fn task_count(&self) -> usize {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .tasks
            .len()
    }

    pub fn observer_count(&self) -> usize {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .observers
            .len()
    }

    /// Surfaces destroyed so far, in destruction order.
    pub fn destroyed_log(&self) -> Vec<SurfaceId> {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .destroyed
            .clone()
    }

    /// Block until every job queued so far has been processed.
    pub fn drain(&self) {
        let _ = crate::host::run_on_privileged_sync(
            self,
            std::time::Duration::from_secs(5),
            || (),
        );
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnvironment for SimHost {
    fn surfaces(&self) -> Vec<Arc<dyn Surface>> {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .surfaces
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn Surface>)
            .collect()
    }

    fn tasks(&self) -> Vec<Arc<dyn HostTask>> {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .tasks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn HostTask>)
            .collect()
    }

    fn add_observer(&self, observer: Arc<dyn SurfaceObserver>) -> ObserverId {
        let mut state = self.core.state.lock().expect("sim state lock poisoned");
        let id = state.next_observer;
        state.next_observer += 1;
        state.observers.insert(id, observer);
        id
    }

    fn remove_observer(&self, id: ObserverId) {
        self.core
            .state
            .lock()
            .expect("sim state lock poisoned")
            .observers
            .remove(&id);
    }

    fn post(&self, work: Box<dyn FnOnce() + Send>) {
        self.core.post(work);
    }
}

impl Drop for SimHost {
    fn drop(&mut self) {
        let _ = self
            .core
            .jobs
            .lock()
            .expect("sim job sender poisoned")
            .send(Job::Shutdown);
        if let Some(worker) = self.worker.lock().expect("sim worker lock poisoned").take() {
            let _ = worker.join();
        }
    }
}

/// Builder for a pre-populated [`SimHost`].
#[derive(Debug, Default)]
pub struct SimHostBuilder {
    surfaces: Vec<(String, FinishBehavior)>,
    vanishing_tasks: u32,
}

impl SimHostBuilder {
    pub fn surface(mut self, label: impl Into<String>) -> Self {
        self.surfaces.push((label.into(), FinishBehavior::Normal));
        self
    }

    pub fn spawning_surface(mut self, label: impl Into<String>, children: u32) -> Self {
        self.surfaces
            .push((label.into(), FinishBehavior::SpawnChildren(children)));
        self
    }

    pub fn respawning_surface(mut self, label: impl Into<String>) -> Self {
        self.surfaces.push((label.into(), FinishBehavior::Respawn));
        self
    }

    pub fn unfinishable_surface(mut self, label: impl Into<String>) -> Self {
        self.surfaces
            .push((label.into(), FinishBehavior::Unfinishable));
        self
    }

    pub fn vanishing_task(mut self) -> Self {
        self.vanishing_tasks += 1;
        self
    }

    pub fn build(self) -> SimHost {
        let host = SimHost::new();
        for (label, behavior) in self.surfaces {
            host.core.add_surface(label, behavior);
        }
        for _ in 0..self.vanishing_tasks {
            host.core.add_vanishing_task();
        }
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::run_on_privileged_sync;
    use proctor_common::CompletionGate;
    use std::time::Duration;

    struct GateObserver {
        gate: Arc<CompletionGate>,
    }

    impl SurfaceObserver for GateObserver {
        fn on_state_change(&self, _surface: SurfaceId, state: SurfaceLifecycleState) {
            if state.is_terminal() {
                self.gate.signal();
            }
        }
    }

    #[test]
    fn test_builder_populates_surfaces_and_tasks() {
        let host = SimHost::builder()
            .surface("a")
            .surface("b")
            .vanishing_task()
            .build();
        assert_eq!(host.surface_count(), 2);
        // One implicit task per surface plus the vanishing one.
        assert_eq!(host.task_count(), 3);
    }

    #[test]
    fn test_finish_destroys_and_notifies_observer() {
        let host = Arc::new(SimHost::new());
        host.add_surface("main");

        let gate = Arc::new(CompletionGate::new());
        gate.arm(1);
        host.add_observer(Arc::new(GateObserver {
            gate: Arc::clone(&gate),
        }));

        let worker = Arc::clone(&host);
        run_on_privileged_sync(host.as_ref(), Duration::from_secs(1), move || {
            for surface in worker.surfaces() {
                surface.request_finish();
            }
        })
        .unwrap();

        gate.wait_for(Duration::from_secs(1)).unwrap();
        host.drain();
        assert_eq!(host.surface_count(), 0);
        assert_eq!(host.task_count(), 0);
        assert_eq!(host.destroyed_log().len(), 1);
    }

    #[test]
    fn test_spawning_surface_creates_children_after_destroy() {
        let host = Arc::new(SimHost::new());
        host.add_spawning_surface("parent", 2);

        let worker = Arc::clone(&host);
        run_on_privileged_sync(host.as_ref(), Duration::from_secs(1), move || {
            for surface in worker.surfaces() {
                surface.request_finish();
            }
        })
        .unwrap();
        host.drain();

        assert_eq!(host.surface_count(), 2);
        assert_eq!(host.destroyed_log().len(), 1);
    }

    #[test]
    fn test_unfinishable_surface_survives_finish() {
        let host = Arc::new(SimHost::new());
        host.add_unfinishable_surface("stuck");

        let worker = Arc::clone(&host);
        run_on_privileged_sync(host.as_ref(), Duration::from_secs(1), move || {
            for surface in worker.surfaces() {
                surface.request_finish();
                assert!(surface.is_finishing());
            }
        })
        .unwrap();
        host.drain();

        assert_eq!(host.surface_count(), 1);
        assert!(host.destroyed_log().is_empty());
    }

    #[test]
    fn test_vanishing_task_close_errors_once_and_disappears() {
        let host = SimHost::new();
        let task_id = host.add_vanishing_task();
        let tasks = host.tasks();
        assert_eq!(tasks.len(), 1);

        let err = tasks[0].close().unwrap_err();
        assert_eq!(err, HostError::Vanished(task_id));
        assert_eq!(host.task_count(), 0);
    }

    #[test]
    fn test_task_close_finishes_member_surfaces() {
        let host = Arc::new(SimHost::new());
        host.add_surface("in-task");

        let worker = Arc::clone(&host);
        run_on_privileged_sync(host.as_ref(), Duration::from_secs(1), move || {
            for task in worker.tasks() {
                task.close().unwrap();
            }
        })
        .unwrap();
        host.drain();

        assert_eq!(host.surface_count(), 0);
    }

    #[test]
    fn test_observer_registration_round_trip() {
        let host = SimHost::new();
        let gate = Arc::new(CompletionGate::new());
        let id = host.add_observer(Arc::new(GateObserver {
            gate: Arc::clone(&gate),
        }));
        assert_eq!(host.observer_count(), 1);
        host.remove_observer(id);
        assert_eq!(host.observer_count(), 0);
        // Unknown ids are ignored.
        host.remove_observer(id);
    }
}
