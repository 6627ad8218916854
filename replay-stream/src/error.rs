use thiserror::Error;

/// Errors from building a [`StreamConfig`](crate::StreamConfig)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Replay buffer must hold at least one value")]
    ZeroBufferSize,
}
