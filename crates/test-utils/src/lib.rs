//! Shared fixtures for the genedag integration tests.

pub mod builders;
pub mod fake_executor;
pub mod stub_task;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness (`RUST_LOG` picks the
/// filter, default `warn`). Safe to call from every test.
pub fn init_tracing() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Fail the test if `f` has not finished within ten seconds.
pub async fn with_timeout<F: Future>(f: F) -> F::Output {
    match tokio::time::timeout(Duration::from_secs(10), f).await {
        Ok(out) => out,
        Err(_) => panic!("test did not finish within 10s"),
    }
}
