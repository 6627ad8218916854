//! Ways of consuming a [`ReplayStream`](crate::ReplayStream).
//!
//! A stream can be consumed in three different ways, all of which can be
//! mixed freely on the same stream:
//!
//! - [`chain`]: futures resolving once with the terminal outcome. These are
//!   what [`then`](crate::ReplayStream::then) and friends return.
//! - [`push`]: a callback invoked for every value.
//! - [`pull`]: a [`Stream`](futures_core::Stream) of values, through
//!   [`EventSource::subscribe`].
//!
//! Consumers attaching after the stream terminated still get the terminal
//! outcome, and the push and pull consumers get the buffered values.

/// Anything that hands out independent, pull based subscriptions.
///
/// For a [`ReplayStream`](crate::ReplayStream) every subscription starts with
/// the replay buffer, and ends with the terminal outcome.
pub trait EventSource<Event> {
    /// The sequence a single subscriber pulls from.
    type Source: futures_core::Stream<Item = Event> + 'static;

    /// Start a new subscription. Subscriptions don't share progress.
    fn subscribe(&self) -> Self::Source;
}

pub mod chain;
pub mod pull;
pub mod push;
