//! Suite and method declarations.
//!
//! A suite declares its batch kind, annotations and methods through a
//! typed builder; there is no runtime introspection. Method bodies are
//! plain closures over the run context. Panics inside a body are caught
//! and converted to assertion failures, so `assert!` and friends work
//! directly.

use crate::context::RunContext;
use proctor_common::{BatchKind, Failure, SuiteName};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

/// A method body: runs against the context, fails with a [`Failure`].
pub type MethodBody = Box<dyn Fn(&RunContext) -> Result<(), Failure> + Send + Sync>;

/// One executable test method. Immutable identity; the outcome lives in
/// the run report.
pub struct MethodSpec {
    name: String,
    annotations: BTreeSet<String>,
    body: MethodBody,
}

impl MethodSpec {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&RunContext) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            annotations: BTreeSet::new(),
            body: Box::new(body),
        }
    }

    /// Attach an annotation consulted by skip checks and hooks.
    #[must_use]
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn annotations(&self) -> &BTreeSet<String> {
        &self.annotations
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.contains(annotation)
    }

    /// Run the body, converting panics into assertion failures.
    pub(crate) fn invoke(&self, ctx: &RunContext) -> Result<(), Failure> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.body)(ctx))) {
            Ok(result) => result,
            Err(payload) => Err(Failure::from_panic(payload)),
        }
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

/// A named group of methods sharing class-level metadata.
#[derive(Debug)]
pub struct SuiteSpec {
    name: SuiteName,
    batch: BatchKind,
    annotations: BTreeSet<String>,
    exempt_from_leak_check: bool,
    methods: Vec<MethodSpec>,
}

impl SuiteSpec {
    pub fn builder(name: impl Into<String>) -> SuiteSpecBuilder {
        SuiteSpecBuilder {
            name: SuiteName::new(name),
            batch: BatchKind::Unbatched,
            annotations: BTreeSet::new(),
            exempt_from_leak_check: false,
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &SuiteName {
        &self.name
    }

    pub fn batch(&self) -> BatchKind {
        self.batch
    }

    pub fn annotations(&self) -> &BTreeSet<String> {
        &self.annotations
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.contains(annotation)
    }

    pub fn exempt_from_leak_check(&self) -> bool {
        self.exempt_from_leak_check
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }
}

/// Builder for [`SuiteSpec`].
#[derive(Debug)]
pub struct SuiteSpecBuilder {
    name: SuiteName,
    batch: BatchKind,
    annotations: BTreeSet<String>,
    exempt_from_leak_check: bool,
    methods: Vec<MethodSpec>,
}

impl SuiteSpecBuilder {
    /// Set the suite's batch policy.
    pub fn batch(mut self, batch: BatchKind) -> Self {
        self.batch = batch;
        self
    }

    pub fn annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    /// Exempt the suite from the after-suite leak assertion.
    pub fn exempt_from_leak_check(mut self) -> Self {
        self.exempt_from_leak_check = true;
        self
    }

    /// Append a fully-built method.
    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Append a method from a name and body.
    pub fn test(
        self,
        name: impl Into<String>,
        body: impl Fn(&RunContext) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> Self {
        self.method(MethodSpec::new(name, body))
    }

    pub fn build(self) -> SuiteSpec {
        SuiteSpec {
            name: self.name,
            batch: self.batch,
            annotations: self.annotations,
            exempt_from_leak_check: self.exempt_from_leak_check,
            methods: self.methods,
        }
    }
}
