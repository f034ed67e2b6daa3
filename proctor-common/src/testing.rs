//! Test logging setup.
//!
//! Call [`init_test_logging`] once per test binary (typically from a
//! `#[ctor::ctor]` function) to get tracing output captured by the test
//! harness. Safe to call multiple times.
//!
//! # Environment Variables
//!
//! - `PROCTOR_TEST_LOG_LEVEL`: log level filter (default: `info`)

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TEST_LOGGING_INIT: Once = Once::new();

/// Initialize tracing for tests. Idempotent.
pub fn init_test_logging() {
    TEST_LOGGING_INIT.call_once(|| {
        let level = std::env::var("PROCTOR_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = EnvFilter::try_new(format!("proctor={level},proctor_common={level}"))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .compact()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!("logging initialized twice without panic");
    }
}
