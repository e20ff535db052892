//! Log subscriber setup for hosts that do not install their own.

use tracing_subscriber::EnvFilter;

use crate::error::SyncError;

/// Install a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn init() -> Result<(), SyncError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| SyncError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::init;
    use crate::error::SyncError;

    #[test]
    fn second_init_reports_an_error() {
        let _ = init();
        assert!(matches!(init(), Err(SyncError::Logging(_))));
    }
}
