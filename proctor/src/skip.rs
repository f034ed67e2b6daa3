//! Skip checks: predicates over method metadata.
//!
//! A method is skipped, rather than executed, when **any** registered
//! check matches it. Checks are read-only, named (the name becomes the
//! reported skip reason), and registered explicitly by the embedding
//! runner.

use crate::suite::MethodSpec;

/// A named predicate over a method's metadata.
pub struct SkipCheck {
    name: String,
    predicate: Box<dyn Fn(&MethodSpec) -> bool + Send + Sync>,
}

impl SkipCheck {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&MethodSpec) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Stock check: skip methods carrying `annotation`.
    pub fn annotation(annotation: impl Into<String>) -> Self {
        let annotation = annotation.into();
        let name = format!("annotation:{annotation}");
        Self::new(name, move |method| method.has_annotation(&annotation))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, method: &MethodSpec) -> bool {
        (self.predicate)(method)
    }
}

impl std::fmt::Debug for SkipCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipCheck")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// First check that matches `method`, if any.
pub fn first_match<'a>(checks: &'a [SkipCheck], method: &MethodSpec) -> Option<&'a SkipCheck> {
    checks.iter().find(|check| check.matches(method))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str) -> MethodSpec {
        MethodSpec::new(name, |_| Ok(()))
    }

    #[test]
    fn test_annotation_check_matches_annotated_methods() {
        let check = SkipCheck::annotation("disabled");
        assert!(check.matches(&method("m").with_annotation("disabled")));
        assert!(!check.matches(&method("m")));
        assert_eq!(check.name(), "annotation:disabled");
    }

    #[test]
    fn test_first_match_returns_earliest_matching_check() {
        let checks = vec![
            SkipCheck::new("never", |_| false),
            SkipCheck::new("by-name", |m: &MethodSpec| m.name().starts_with("slow_")),
            SkipCheck::new("always", |_| true),
        ];

        let matched = first_match(&checks, &method("slow_render")).unwrap();
        assert_eq!(matched.name(), "by-name");
        let matched = first_match(&checks, &method("fast")).unwrap();
        assert_eq!(matched.name(), "always");
    }

    #[test]
    fn test_no_checks_means_no_skip() {
        assert!(first_match(&[], &method("m")).is_none());
    }
}
