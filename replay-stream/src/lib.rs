//! A single producer, multi consumer event stream with bounded replay.
//!
//! A [`ReplayStream`] is driven by a producer, which is started once when the
//! stream is created and given a [`Handle`] to emit values, and eventually
//! complete or fail the stream with. Any number of consumers can attach at
//! any point of the stream's life, even after it has terminated, and still see
//! the most recent values and the terminal outcome. See [`events`] for the
//! ways a stream can be consumed.
//!
//! Everything here is single threaded. The control handles never call into
//! consumers directly, their effects are applied on the next tick of a
//! [`Schedule`]r, usually a [`smol::LocalExecutor`].
//!
//! ```
//! use std::rc::Rc;
//!
//! use futures_util::StreamExt;
//! use replay_stream::{ReplayStream, StreamConfig};
//!
//! let executor = Rc::new(smol::LocalExecutor::new());
//! let config = StreamConfig::with_buffer_size(2).unwrap();
//! let stream = ReplayStream::<&str, ()>::with_config(executor.clone(), config, |handle| {
//!     handle.emit("foo");
//!     handle.emit("bar");
//!     handle.emit("baz");
//!     handle.complete();
//! });
//!
//! smol::block_on(executor.run(async {
//!     stream.completed().await.unwrap();
//!     // Late consumers still get the two most recent values
//!     let replayed: Vec<_> = stream.values().map(Result::unwrap).collect().await;
//!     assert_eq!(replayed, ["bar", "baz"]);
//! }));
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod schedule;
mod stream;

pub use config::StreamConfig;
pub use error::ConfigError;
pub use events::{chain::Completed, pull::Values, EventSource};
pub use schedule::Schedule;
pub use stream::{Handle, Producer, ReplayStream};
