//! Shared helpers for the `jobdag` integration tests.
//!
//! - [`builders`]: compact construction of DAGs, processes and settings.
//! - [`fake_backend`]: engine and BOINC client doubles that record calls.
//! - [`fake_launcher`]: scripted workers for driving the supervisor.

pub mod builders;
pub mod fake_backend;
pub mod fake_launcher;

use std::error::Error;
use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use jobdag::logging::LOG_ENV_VAR;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

pub type TestResult = Result<(), Box<dyn Error>>;

/// Upper bound for any single async test step.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Install a test-captured subscriber once per test binary.
///
/// Output only shows for failing tests (or with `--nocapture`). The level
/// follows `JOBDAG_LOG`, as for the binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step timed out after {TEST_TIMEOUT:?}"),
    }
}
