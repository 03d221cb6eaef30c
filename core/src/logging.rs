use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Builds a formatting subscriber for `filter` without installing it.
/// Output goes through the test writer so `cargo test` captures it.
pub fn subscriber(filter: &str) -> Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|err| Error::Config(format!("invalid log filter '{filter}': {err}")))?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .finish())
}
