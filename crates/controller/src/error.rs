use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The controller task has stopped.
    #[error("sync controller is no longer running")]
    ChannelClosed,
    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}
