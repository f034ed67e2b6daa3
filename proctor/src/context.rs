//! Run context: everything a hook or method body may touch.
//!
//! The live preference store, the leak monitor and the host handle are
//! deliberately not process-wide singletons; they are owned by the
//! context and passed to the controller and hooks at construction time,
//! so multiple independent runs (parallel shards) cannot collide.

use crate::host::HostEnvironment;
use crate::leak::LeakMonitor;
use proctor_common::{HarnessConfig, PrefStore};
use std::sync::Arc;

/// Handle bundle passed to the controller, hooks, skip checks and
/// method bodies.
pub struct RunContext {
    host: Arc<dyn HostEnvironment>,
    prefs: Arc<PrefStore>,
    leaks: Arc<LeakMonitor>,
    config: HarnessConfig,
}

impl RunContext {
    /// Build a context with a fresh preference store and leak monitor.
    pub fn new(host: Arc<dyn HostEnvironment>, config: HarnessConfig) -> Self {
        Self {
            host,
            prefs: Arc::new(PrefStore::new()),
            leaks: Arc::new(LeakMonitor::new()),
            config,
        }
    }

    pub fn host(&self) -> &Arc<dyn HostEnvironment> {
        &self.host
    }

    pub fn prefs(&self) -> &PrefStore {
        &self.prefs
    }

    pub fn leaks(&self) -> &LeakMonitor {
        &self.leaks
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }
}
