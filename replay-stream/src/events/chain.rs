//! Futures resolving with the terminal outcome of a stream.
//!
//! Registration happens when one of these methods is called, the callbacks
//! passed to them only run once the returned future is polled after the
//! outcome is known. Callbacks return anything that is [`IntoFuture`], and
//! the returned future resolves to its output, so both
//! `|| std::future::ready(x)` and `|| async { .. }` work.

use std::{
    cell::Cell,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures_channel::oneshot;
use futures_core::FusedFuture;
use tracing::debug;

use crate::stream::ReplayStream;

#[derive(Debug)]
enum CompletedState<E> {
    /// The stream had already terminated when this future was created.
    Replay(Result<(), E>),
    Live(oneshot::Receiver<Result<(), E>>),
    /// The stream was dropped without ever terminating.
    Orphaned,
    Done,
}

/// Future returned by [`ReplayStream::completed`].
///
/// Resolves to `Ok(())` when the stream completes, or to the error it failed
/// with. If every handle to the stream is dropped before it terminated, this
/// future never resolves.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Completed<E> {
    state: CompletedState<E>,
}

// `E` is never pinned.
impl<E> Unpin for Completed<E> {}

impl<E> Completed<E> {
    /// Whether the outcome was already known when this future was created.
    pub fn is_replay(&self) -> bool {
        matches!(self.state, CompletedState::Replay(_))
    }
}

impl<E> Future for Completed<E> {
    type Output = Result<(), E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, CompletedState::Done) {
            CompletedState::Replay(outcome) => Poll::Ready(outcome),
            CompletedState::Live(mut receiver) => match Pin::new(&mut receiver).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(oneshot::Canceled)) => {
                    debug!("Stream dropped before it terminated");
                    this.state = CompletedState::Orphaned;
                    Poll::Pending
                },
                Poll::Pending => {
                    this.state = CompletedState::Live(receiver);
                    Poll::Pending
                },
            },
            CompletedState::Orphaned => {
                this.state = CompletedState::Orphaned;
                Poll::Pending
            },
            CompletedState::Done => panic!("`Completed` polled after completion"),
        }
    }
}

impl<E> FusedFuture for Completed<E> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, CompletedState::Done)
    }
}

impl<T: Clone + 'static, E: Clone + 'static> ReplayStream<T, E> {
    /// Resolves with `Ok(())` once the stream completes, or with the error it
    /// failed with. Resolves immediately if the stream already terminated.
    pub fn completed(&self) -> Completed<E> {
        let mut inner = self.inner.borrow_mut();
        if let Some(outcome) = inner.state.outcome() {
            return Completed {
                state: CompletedState::Replay(outcome),
            }
        }

        let (tx, rx) = oneshot::channel();
        // Exactly one of the two callbacks fires, the other is dropped at the
        // terminal transition.
        let on_complete = Rc::new(Cell::new(Some(tx)));
        let on_error = on_complete.clone();
        inner.on_complete(move || {
            if let Some(tx) = on_complete.take() {
                let _ = tx.send(Ok(()));
            }
        });
        inner.on_error(move |error| {
            if let Some(tx) = on_error.take() {
                let _ = tx.send(Err(error));
            }
        });
        Completed {
            state: CompletedState::Live(rx),
        }
    }

    /// Run `on_completed` once the stream completes.
    ///
    /// - `Ok(Some(_))` with `on_completed`'s output if the stream completes,
    /// - `Err(_)` if the stream had already failed when `then` was called,
    /// - `Ok(None)` if the stream fails later. Attaching while the stream is
    ///   active counts as handling its failure.
    ///
    /// Use [`Self::then_or_else`] to handle failure explicitly.
    pub fn then<C, F>(&self, on_completed: C) -> impl Future<Output = Result<Option<F::Output>, E>>
    where
        C: FnOnce() -> F,
        F: IntoFuture,
    {
        let completed = self.completed();
        let already_failed = completed.is_replay();
        async move {
            match completed.await {
                Ok(()) => Ok(Some(on_completed().await)),
                Err(error) if already_failed => Err(error),
                Err(_) => Ok(None),
            }
        }
    }

    /// Resolve with `on_completed`'s output if the stream completes, or with
    /// `on_failed`'s output if it fails.
    pub fn then_or_else<C, F, G, H>(
        &self,
        on_completed: C,
        on_failed: G,
    ) -> impl Future<Output = F::Output>
    where
        C: FnOnce() -> F,
        F: IntoFuture,
        G: FnOnce(E) -> H,
        H: IntoFuture<Output = F::Output>,
    {
        let completed = self.completed();
        async move {
            match completed.await {
                Ok(()) => on_completed().await,
                Err(error) => on_failed(error).await,
            }
        }
    }

    /// Run `on_failed` if the stream fails. Resolves with `None` if it
    /// completes instead.
    pub fn catch<G, H>(&self, on_failed: G) -> impl Future<Output = Option<H::Output>>
    where
        G: FnOnce(E) -> H,
        H: IntoFuture,
    {
        let completed = self.completed();
        async move {
            match completed.await {
                Ok(()) => None,
                Err(error) => Some(on_failed(error).await),
            }
        }
    }
}

/// Awaiting a stream is the same as awaiting [`ReplayStream::completed`].
impl<T: Clone + 'static, E: Clone + 'static> IntoFuture for &ReplayStream<T, E> {
    type IntoFuture = Completed<E>;
    type Output = Result<(), E>;

    fn into_future(self) -> Self::IntoFuture {
        self.completed()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> IntoFuture for ReplayStream<T, E> {
    type IntoFuture = Completed<E>;
    type Output = Result<(), E>;

    fn into_future(self) -> Self::IntoFuture {
        self.completed()
    }
}
