//! Leak monitor: "no live object of kind X survives past this point".
//!
//! Tests register long-lived objects they create; the controller asserts
//! at the end of a passing method (and a passing suite) that every
//! tracked object has been released. After a failing outcome the watches
//! are reset instead: objects held alive along a failure's call stack
//! are not real leaks, and asserting on them would only produce false
//! positives.

use proctor_common::Failure;
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

struct Watch {
    label: String,
    handle: Weak<dyn Any + Send + Sync>,
}

/// Tracks weak references to objects that must not outlive a test.
#[derive(Default)]
pub struct LeakMonitor {
    watched: Mutex<Vec<Watch>>,
}

impl LeakMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `object`: it must be dropped before the next release
    /// assertion.
    pub fn track<T: Send + Sync + 'static>(&self, label: impl Into<String>, object: &Arc<T>) {
        let handle: Weak<dyn Any + Send + Sync> = Arc::downgrade(object) as _;
        self.watched
            .lock()
            .expect("leak monitor lock poisoned")
            .push(Watch {
                label: label.into(),
                handle,
            });
    }

    /// Assert that every tracked object has been dropped. On violation
    /// the surviving labels are reported and all watches are cleared, so
    /// one leak is reported exactly once.
    pub fn assert_released(&self) -> Result<(), Failure> {
        let mut watched = self.watched.lock().expect("leak monitor lock poisoned");
        watched.retain(|watch| watch.handle.strong_count() > 0);
        if watched.is_empty() {
            return Ok(());
        }
        let survivors: Vec<&str> = watched.iter().map(|watch| watch.label.as_str()).collect();
        let failure = Failure::leak(format!(
            "objects still alive past their release point: {}",
            survivors.join(", ")
        ));
        watched.clear();
        Err(failure)
    }

    /// Drop all watches without asserting.
    pub fn reset(&self) {
        self.watched
            .lock()
            .expect("leak monitor lock poisoned")
            .clear();
    }

    /// Watches whose object is still alive.
    pub fn live_count(&self) -> usize {
        self.watched
            .lock()
            .expect("leak monitor lock poisoned")
            .iter()
            .filter(|watch| watch.handle.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_common::FailureKind;

    #[test]
    fn test_released_object_passes() {
        let monitor = LeakMonitor::new();
        let object = Arc::new("model".to_string());
        monitor.track("model", &object);
        drop(object);
        monitor.assert_released().unwrap();
    }

    #[test]
    fn test_survivor_is_reported_with_label() {
        let monitor = LeakMonitor::new();
        let object = Arc::new(vec![1u8]);
        monitor.track("tab-model", &object);

        let failure = monitor.assert_released().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Leak);
        assert!(failure.message.contains("tab-model"));
        // The violation was reported; watches are cleared.
        monitor.assert_released().unwrap();
        drop(object);
    }

    #[test]
    fn test_reset_clears_watches() {
        let monitor = LeakMonitor::new();
        let object = Arc::new(0u64);
        monitor.track("counter", &object);
        assert_eq!(monitor.live_count(), 1);
        monitor.reset();
        assert_eq!(monitor.live_count(), 0);
        monitor.assert_released().unwrap();
    }

    #[test]
    fn test_mixed_survivors_only_lists_live_labels() {
        let monitor = LeakMonitor::new();
        let released = Arc::new(1i32);
        let leaked = Arc::new(2i32);
        monitor.track("released", &released);
        monitor.track("leaked", &leaked);
        drop(released);

        let failure = monitor.assert_released().unwrap_err();
        assert!(failure.message.contains("leaked"));
        assert!(!failure.message.contains("released,"));
        drop(leaked);
    }
}
