//! The shared state behind a [`ReplayStream`], and the [`Handle`] a producer
//! drives it with.
//!
//! Every control signal goes through a FIFO queue that is drained by a task
//! on the [`Schedule`]r. Draining is the only place the state machine and the
//! replay buffer are mutated, which is what gives the ordering guarantees:
//! a value queued before `complete` or `fail` is always fanned out before the
//! terminal transition, and nothing is accepted after it.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::Future,
    num::NonZeroUsize,
    rc::{Rc, Weak},
};

use derive_where::derive_where;
use futures_util::FutureExt;
use tracing::{debug, trace};

use crate::{config::StreamConfig, events::pull::Mailbox, schedule::Schedule};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum State<E> {
    Active,
    Completed,
    Failed(E),
}

impl<E: Clone> State<E> {
    pub(crate) fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// The terminal outcome, `None` while the stream is still active.
    pub(crate) fn outcome(&self) -> Option<Result<(), E>> {
        match self {
            Self::Active => None,
            Self::Completed => Some(Ok(())),
            Self::Failed(error) => Some(Err(error.clone())),
        }
    }
}

enum Signal<T, E> {
    Next(T),
    Complete,
    Fail(E),
}

/// A live subscriber, notified of every value accepted after it registered.
pub(crate) enum Subscriber<T, E> {
    Callback(Box<dyn FnMut(T)>),
    /// Pull sequences are held weakly so dropping one unsubscribes it.
    Mailbox(Weak<RefCell<Mailbox<T, E>>>),
}

impl<T: Clone, E> Subscriber<T, E> {
    /// Returns false if the subscriber is gone and should be pruned.
    fn notify(&mut self, value: &T) -> bool {
        match self {
            Self::Callback(on_next) => {
                on_next(value.clone());
                true
            },
            Self::Mailbox(mailbox) => {
                let Some(mailbox) = mailbox.upgrade() else {
                    return false
                };
                mailbox.borrow_mut().push(value.clone());
                true
            },
        }
    }
}

pub(crate) struct Inner<T, E> {
    pub(crate) state:     State<E>,
    pub(crate) buffer:    VecDeque<T>,
    capacity:             NonZeroUsize,
    /// Live subscribers are kept for as long as the stream exists, only dead
    /// mailboxes are pruned.
    next_subscribers:     Vec<Subscriber<T, E>>,
    error_subscribers:    Vec<Box<dyn FnOnce(E)>>,
    complete_subscribers: Vec<Box<dyn FnOnce()>>,
    pending:              VecDeque<Signal<T, E>>,
    /// Whether a drain task is already queued on the scheduler
    draining:             bool,
}

impl<T, E> Inner<T, E> {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: State::Active,
            buffer: VecDeque::new(),
            capacity,
            next_subscribers: Vec::new(),
            error_subscribers: Vec::new(),
            complete_subscribers: Vec::new(),
            pending: VecDeque::new(),
            draining: false,
        }
    }

    // Registration is only meaningful while active, callers take their replay
    // path otherwise.
    pub(crate) fn subscribe(&mut self, subscriber: Subscriber<T, E>) {
        debug_assert!(matches!(self.state, State::Active));
        self.next_subscribers.push(subscriber);
    }

    pub(crate) fn on_complete(&mut self, callback: impl FnOnce() + 'static) {
        debug_assert!(matches!(self.state, State::Active));
        self.complete_subscribers.push(Box::new(callback));
    }

    pub(crate) fn on_error(&mut self, callback: impl FnOnce(E) + 'static) {
        debug_assert!(matches!(self.state, State::Active));
        self.error_subscribers.push(Box::new(callback));
    }
}

impl<T: Clone, E: Clone> Inner<T, E> {
    fn accept(this: &Rc<RefCell<Self>>, value: T) {
        let mut subscribers = {
            let mut inner = this.borrow_mut();
            if !inner.state.is_active() {
                trace!("Stream already terminated, dropping value");
                return
            }
            if inner.buffer.len() == inner.capacity.get() {
                inner.buffer.pop_front();
            }
            inner.buffer.push_back(value.clone());
            trace!(
                subscribers = inner.next_subscribers.len(),
                buffered = inner.buffer.len(),
                "Value accepted"
            );
            std::mem::take(&mut inner.next_subscribers)
        };
        // No borrow is held here, subscribers are free to call back into the
        // stream.
        subscribers.retain_mut(|subscriber| subscriber.notify(&value));

        let mut inner = this.borrow_mut();
        // Anyone who subscribed during the fan-out goes after the existing
        // subscribers.
        subscribers.append(&mut inner.next_subscribers);
        inner.next_subscribers = subscribers;
    }

    /// Move into the terminal state. `error` is `None` for completion.
    fn settle(this: &Rc<RefCell<Self>>, error: Option<E>) {
        let (complete_subscribers, error_subscribers) = {
            let mut inner = this.borrow_mut();
            if !inner.state.is_active() {
                trace!("Stream already terminated, ignoring terminal signal");
                return
            }
            inner.state = match &error {
                None => State::Completed,
                Some(error) => State::Failed(error.clone()),
            };
            (
                std::mem::take(&mut inner.complete_subscribers),
                std::mem::take(&mut inner.error_subscribers),
            )
        };
        match error {
            None => {
                debug!(subscribers = complete_subscribers.len(), "Stream completed");
                for callback in complete_subscribers {
                    callback();
                }
            },
            Some(error) => {
                debug!(subscribers = error_subscribers.len(), "Stream failed");
                for callback in error_subscribers {
                    callback(error.clone());
                }
            },
        }
    }
}

async fn drain<T: Clone, E: Clone>(inner: Rc<RefCell<Inner<T, E>>>) {
    loop {
        let signal = {
            let mut this = inner.borrow_mut();
            let Some(signal) = this.pending.pop_front() else {
                this.draining = false;
                break
            };
            signal
        };
        match signal {
            Signal::Next(value) => Inner::accept(&inner, value),
            Signal::Complete => Inner::settle(&inner, None),
            Signal::Fail(error) => Inner::settle(&inner, Some(error)),
        }
    }
}

/// The producer side of a stream.
///
/// Implemented for every `FnOnce(Handle<T, E>)`, so a closure is usually all
/// that's needed. The producer is started exactly once, synchronously, while
/// the stream is being constructed. It keeps the handle (or clones of it)
/// around to emit values later.
pub trait Producer<T, E> {
    fn start(self, handle: Handle<T, E>);
}

impl<T, E, F: FnOnce(Handle<T, E>)> Producer<T, E> for F {
    fn start(self, handle: Handle<T, E>) {
        self(handle)
    }
}

/// Control handle given to a [`Producer`].
///
/// None of the operations take effect immediately: they are queued, and
/// applied in order on the next tick of the stream's scheduler.
#[derive_where(Clone)]
pub struct Handle<T, E> {
    inner:     Rc<RefCell<Inner<T, E>>>,
    scheduler: Rc<dyn Schedule>,
}

impl<T: Clone + 'static, E: Clone + 'static> Handle<T, E> {
    /// Emit a value. It is dropped if the stream has terminated by the time it
    /// is applied.
    pub fn emit(&self, value: T) {
        self.queue(Signal::Next(value))
    }

    /// Emit the output of `value` once it resolves.
    ///
    /// Values are accepted in the order they resolve, not the order they were
    /// emitted in. A future that is already resolved is emitted right away,
    /// exactly like [`Self::emit`]. A value that resolves after the stream
    /// terminated is dropped.
    pub fn emit_future<F>(&self, value: F)
    where
        F: Future<Output = T> + 'static,
    {
        let mut value = Box::pin(value);
        if let Some(value) = value.as_mut().now_or_never() {
            return self.emit(value)
        }
        let handle = self.clone();
        self.scheduler.schedule(Box::pin(async move {
            let value = value.await;
            handle.emit(value);
        }));
    }

    /// Complete the stream. Only the first terminal signal has any effect.
    pub fn complete(&self) {
        self.queue(Signal::Complete)
    }

    /// Fail the stream with `error`. Only the first terminal signal has any
    /// effect.
    pub fn fail(&self, error: E) {
        self.queue(Signal::Fail(error))
    }

    /// Whether the stream has not reached a terminal state yet. A terminal
    /// signal that is still queued doesn't count.
    pub fn is_active(&self) -> bool {
        self.inner.borrow().state.is_active()
    }

    fn queue(&self, signal: Signal<T, E>) {
        let mut inner = self.inner.borrow_mut();
        if !inner.state.is_active() {
            trace!("Stream already terminated, ignoring signal");
            return
        }
        inner.pending.push_back(signal);
        if inner.draining {
            return
        }
        inner.draining = true;
        drop(inner);
        trace!("Scheduling stream drain");
        self.scheduler.schedule(Box::pin(drain(self.inner.clone())));
    }
}

/// A push based event stream with bounded replay.
///
/// Values are pushed by the [`Producer`] the stream was created with. Any
/// number of consumers can attach at any time, including after the stream
/// terminated, through:
///
/// - [`then`](Self::then), [`then_or_else`](Self::then_or_else),
///   [`catch`](Self::catch) and [`completed`](Self::completed), which resolve
///   once with the terminal outcome,
/// - [`iterate`](Self::iterate), which calls back for every value,
/// - [`values`](Self::values), a [`futures_core::Stream`] of values.
///
/// The latter two start by replaying the most recent values, as many as
/// [`StreamConfig::buffer_size`] allows.
///
/// Cloning a `ReplayStream` gives another reference to the same stream.
#[derive_where(Clone)]
pub struct ReplayStream<T, E> {
    pub(crate) inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T: Clone + 'static, E: Clone + 'static> ReplayStream<T, E> {
    /// Create a stream keeping one value for replay, and start `producer`.
    pub fn new<S, F>(scheduler: S, producer: F) -> Self
    where
        S: Schedule + 'static,
        F: FnOnce(Handle<T, E>),
    {
        Self::with_producer(scheduler, StreamConfig::default(), producer)
    }

    pub fn with_config<S, F>(scheduler: S, config: StreamConfig, producer: F) -> Self
    where
        S: Schedule + 'static,
        F: FnOnce(Handle<T, E>),
    {
        Self::with_producer(scheduler, config, producer)
    }

    /// Like [`Self::with_config`], for producers that aren't closures.
    pub fn with_producer<S, P>(scheduler: S, config: StreamConfig, producer: P) -> Self
    where
        S: Schedule + 'static,
        P: Producer<T, E>,
    {
        let inner = Rc::new(RefCell::new(Inner::new(config.buffer_size())));
        debug!(buffer_size = config.buffer_size().get(), "Starting producer");
        producer.start(Handle {
            inner:     inner.clone(),
            scheduler: Rc::new(scheduler),
        });
        Self { inner }
    }

    #[cfg(test)]
    pub(crate) fn live_subscribers(&self) -> usize {
        self.inner.borrow().next_subscribers.len()
    }
}

impl<T, E: fmt::Debug> fmt::Debug for ReplayStream<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(inner) = self.inner.try_borrow() else {
            return f.debug_struct("ReplayStream").finish_non_exhaustive()
        };
        f.debug_struct("ReplayStream")
            .field("state", &inner.state)
            .field("buffered", &inner.buffer.len())
            .finish()
    }
}
