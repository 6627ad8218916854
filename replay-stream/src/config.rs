//! Construction time options for a [`ReplayStream`](crate::ReplayStream)

use std::num::NonZeroUsize;

use crate::error::ConfigError;

/// Options captured when a stream is created.
///
/// The default keeps only the most recent value for late subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    buffer_size: NonZeroUsize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: NonZeroUsize::MIN,
        }
    }
}

impl From<NonZeroUsize> for StreamConfig {
    fn from(buffer_size: NonZeroUsize) -> Self {
        Self { buffer_size }
    }
}

impl StreamConfig {
    /// Keep the `buffer_size` most recent values for replay.
    pub fn with_buffer_size(buffer_size: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(buffer_size)
            .map(Self::from)
            .ok_or(ConfigError::ZeroBufferSize)
    }

    /// Maximum number of values replayed to a late subscriber
    pub fn buffer_size(&self) -> NonZeroUsize {
        self.buffer_size
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_keeps_one_value() {
        assert_eq!(StreamConfig::default().buffer_size().get(), 1);
    }

    #[test]
    fn zero_buffer_is_rejected() {
        assert_eq!(
            StreamConfig::with_buffer_size(0),
            Err(ConfigError::ZeroBufferSize)
        );
        assert_eq!(
            StreamConfig::with_buffer_size(3).map(|c| c.buffer_size().get()),
            Ok(3)
        );
    }
}
