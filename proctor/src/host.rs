//! Host environment abstraction.
//!
//! The host process owns the top-level surfaces (windows/activities) a
//! test can leave behind, the tasks that contain them, and a privileged
//! thread on which every surface-lifecycle operation must run. The
//! engine never touches host state directly: it marshals closures onto
//! the privileged thread with [`HostEnvironment::post`] and blocks the
//! test thread via [`run_on_privileged_sync`] until the work completed
//! or a timeout elapsed. The privileged thread itself must never block;
//! it only enqueues and returns.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

/// Identifier of a top-level surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Identifier of a host-level task (container of surfaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier returned by [`HostEnvironment::add_observer`], used to
/// unregister.
pub type ObserverId = u64;

/// Lifecycle states a surface moves through, in order. `Destroyed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceLifecycleState {
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

impl SurfaceLifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

impl std::fmt::Display for SurfaceLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Resumed => write!(f, "resumed"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Errors surfaced by host interactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The task disappeared between enumeration and close. Tolerable
    /// race during teardown; callers log and move on.
    #[error("{0} vanished before it could be closed")]
    Vanished(TaskId),

    /// Marshaled work did not complete on the privileged thread in time.
    #[error("privileged thread did not complete marshaled work within {0:?}")]
    MarshalTimeout(Duration),

    /// The privileged thread is gone (host shut down mid-run).
    #[error("privileged thread disconnected")]
    Disconnected,
}

/// A top-level surface the host manages with its own lifecycle.
pub trait Surface: Send + Sync {
    fn id(&self) -> SurfaceId;
    /// Human-readable name for logs.
    fn label(&self) -> String;
    fn state(&self) -> SurfaceLifecycleState;
    /// Whether a finish has already been requested.
    fn is_finishing(&self) -> bool;
    /// Ask the surface to finish. Asynchronous: destruction is reported
    /// later through the lifecycle observer.
    fn request_finish(&self);
}

/// A host-level container of surfaces.
pub trait HostTask: Send + Sync {
    fn id(&self) -> TaskId;
    fn surface_count(&self) -> usize;
    /// Close and remove the task and its surfaces.
    fn close(&self) -> Result<(), HostError>;
}

/// Receives surface-lifecycle transitions. Callbacks run on the
/// privileged thread and must not block.
pub trait SurfaceObserver: Send + Sync {
    fn on_state_change(&self, surface: SurfaceId, state: SurfaceLifecycleState);
}

/// Handle to the host process. All methods other than [`post`] must be
/// called from the privileged thread; use [`run_on_privileged_sync`] to
/// get there from the test thread.
///
/// [`post`]: HostEnvironment::post
pub trait HostEnvironment: Send + Sync {
    /// Enumerate the currently-live top-level surfaces.
    fn surfaces(&self) -> Vec<Arc<dyn Surface>>;

    /// Enumerate the outstanding tasks.
    fn tasks(&self) -> Vec<Arc<dyn HostTask>>;

    /// Register a lifecycle observer. Returns an id for unregistration.
    fn add_observer(&self, observer: Arc<dyn SurfaceObserver>) -> ObserverId;

    /// Unregister a previously-added observer. Unknown ids are ignored.
    fn remove_observer(&self, id: ObserverId);

    /// Marshal `work` onto the privileged thread, fire-and-forget.
    fn post(&self, work: Box<dyn FnOnce() + Send>);
}

/// Marshal `work` onto the privileged thread and block the calling
/// thread until it ran or `timeout` elapsed.
///
/// Must not be called from the privileged thread itself: the work would
/// be queued behind the caller and the wait would deadlock until the
/// timeout.
pub fn run_on_privileged_sync<T, F>(
    host: &dyn HostEnvironment,
    timeout: Duration,
    work: F,
) -> Result<T, HostError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    host.post(Box::new(move || {
        // Receiver may be gone if the caller already timed out.
        let _ = done_tx.send(work());
    }));
    done_rx.recv_timeout(timeout).map_err(|err| match err {
        RecvTimeoutError::Timeout => HostError::MarshalTimeout(timeout),
        RecvTimeoutError::Disconnected => HostError::Disconnected,
    })
}
