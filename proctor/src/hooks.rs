//! Ordered hook lists for the four lifecycle points.
//!
//! Hooks run at before-suite, before-method, after-method and
//! after-suite. Within a list, registration order is execution order,
//! and lists are append-only: the base runner contributes its hooks
//! first, embedding runners append extensions, nothing is ever removed.

use crate::context::RunContext;
use crate::suite::{MethodSpec, SuiteSpec};
use proctor_common::Failure;

/// Hook invoked with the whole suite (before-suite / after-suite).
pub type SuiteHook = Box<dyn Fn(&RunContext, &SuiteSpec) -> Result<(), Failure> + Send + Sync>;

/// Hook invoked with one method (before-method / after-method).
pub type MethodHook = Box<dyn Fn(&RunContext, &MethodSpec) -> Result<(), Failure> + Send + Sync>;

/// The four append-only hook lists.
#[derive(Default)]
pub struct HookRegistry {
    before_suite: Vec<SuiteHook>,
    before_method: Vec<MethodHook>,
    after_method: Vec<MethodHook>,
    after_suite: Vec<SuiteHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before_suite(
        &mut self,
        hook: impl Fn(&RunContext, &SuiteSpec) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> &mut Self {
        self.before_suite.push(Box::new(hook));
        self
    }

    pub fn add_before_method(
        &mut self,
        hook: impl Fn(&RunContext, &MethodSpec) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> &mut Self {
        self.before_method.push(Box::new(hook));
        self
    }

    pub fn add_after_method(
        &mut self,
        hook: impl Fn(&RunContext, &MethodSpec) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> &mut Self {
        self.after_method.push(Box::new(hook));
        self
    }

    pub fn add_after_suite(
        &mut self,
        hook: impl Fn(&RunContext, &SuiteSpec) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> &mut Self {
        self.after_suite.push(Box::new(hook));
        self
    }

    pub fn before_suite(&self) -> &[SuiteHook] {
        &self.before_suite
    }

    pub fn before_method(&self) -> &[MethodHook] {
        &self.before_method
    }

    pub fn after_method(&self) -> &[MethodHook] {
        &self.after_method
    }

    pub fn after_suite(&self) -> &[SuiteHook] {
        &self.after_suite
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("before_suite", &self.before_suite.len())
            .field("before_method", &self.before_method.len())
            .field("after_method", &self.after_method.len())
            .field("after_suite", &self.after_suite.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHost;
    use proctor_common::HarnessConfig;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_lists_preserve_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        for tag in ["h1", "h2", "h3"] {
            let seen = Arc::clone(&seen);
            registry.add_before_method(move |_, _| {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }

        let ctx = RunContext::new(Arc::new(SimHost::new()), HarnessConfig::default());
        let method = MethodSpec::new("m", |_| Ok(()));
        for hook in registry.before_method() {
            hook(&ctx, &method).unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn test_registry_debug_reports_counts() {
        let mut registry = HookRegistry::new();
        registry.add_before_suite(|_, _| Ok(()));
        registry.add_after_suite(|_, _| Ok(()));
        registry.add_after_suite(|_, _| Ok(()));
        let rendered = format!("{registry:?}");
        assert!(rendered.contains("before_suite: 1"));
        assert!(rendered.contains("after_suite: 2"));
    }
}
