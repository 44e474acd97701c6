pub mod capture;
pub mod client;
pub mod recording;

pub use capture::LogCapture;
pub use client::TestClient;
pub use recording::{RecordedCall, RecordingStore};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Route engine logs to the test writer; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cartsync=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
