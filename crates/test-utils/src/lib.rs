pub mod builders;
pub mod fake_executor;
pub mod flaky_store;

pub use builders::{ConfigFileBuilder, EngineHarness, HarnessBuilder, TaskConfigBuilder};
pub use fake_executor::{FakeExecutor, StopGate};
pub use flaky_store::FlakyStore;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - Honours `SANDBOXER_LOG`, e.g. `SANDBOXER_LOG=sandboxer::engine=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(sandboxer::logging::LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `check` every 10ms until it returns true; panics after 5 seconds.
pub async fn eventually<F>(mut check: F)
where
    F: AsyncFnMut() -> bool,
{
    with_timeout(async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
