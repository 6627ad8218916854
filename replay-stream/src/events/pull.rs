//! Pull based consumption, as a [`Stream`] of values.
//!
//! Every [`Values`] owns a mailbox the replay stream pushes accepted values
//! into. The mailbox starts out with a snapshot of the replay buffer, and
//! receives the terminal outcome once the stream terminates. Values always
//! come out of the mailbox before the outcome does, and since nothing is
//! accepted after the terminal transition, a consumer sees every value that
//! was accepted before it, regardless of how the two were scheduled.

use std::{
    cell::RefCell,
    collections::VecDeque,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
};

use futures_core::{FusedStream, Stream};

use super::EventSource;
use crate::stream::{ReplayStream, Subscriber};

#[derive(Debug)]
pub(crate) struct Mailbox<T, E> {
    values:  VecDeque<T>,
    outcome: Option<Result<(), E>>,
    waker:   Option<Waker>,
}

impl<T, E> Mailbox<T, E> {
    pub(crate) fn push(&mut self, value: T) {
        self.values.push_back(value);
        self.wake();
    }

    fn settle(&mut self, outcome: Result<(), E>) {
        self.outcome = Some(outcome);
        self.wake();
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

fn settle<T, E>(mailbox: &Weak<RefCell<Mailbox<T, E>>>, outcome: Result<(), E>) {
    if let Some(mailbox) = mailbox.upgrade() {
        mailbox.borrow_mut().settle(outcome);
    }
}

/// The values of a [`ReplayStream`], as returned by
/// [`ReplayStream::values`].
///
/// Yields `Ok` for each value. If the stream failed, yields its error once,
/// as the last item. Dropping a `Values` unsubscribes it.
///
/// The replay buffer's bound does not apply here: while the stream is active,
/// every accepted value is kept in the `Values` until it is polled out.
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct Values<T, E> {
    mailbox:    Rc<RefCell<Mailbox<T, E>>>,
    terminated: bool,
}

impl<T, E> Stream for Values<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Self {
            mailbox,
            terminated,
        } = self.get_mut();
        if *terminated {
            return Poll::Ready(None)
        }
        let mut mailbox = mailbox.borrow_mut();
        if let Some(value) = mailbox.values.pop_front() {
            return Poll::Ready(Some(Ok(value)))
        }
        match mailbox.outcome.take() {
            None => {
                mailbox.waker = Some(cx.waker().clone());
                Poll::Pending
            },
            Some(Ok(())) => {
                *terminated = true;
                Poll::Ready(None)
            },
            Some(Err(error)) => {
                *terminated = true;
                Poll::Ready(Some(Err(error)))
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.terminated {
            return (0, Some(0))
        }
        (self.mailbox.borrow().values.len(), None)
    }
}

impl<T, E> FusedStream for Values<T, E> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<T: Clone + 'static, E: Clone + 'static> ReplayStream<T, E> {
    /// A new sequence of values, starting with the values currently in the
    /// replay buffer.
    ///
    /// Each call returns an independent sequence with its own snapshot of the
    /// buffer.
    pub fn values(&self) -> Values<T, E> {
        let mut inner = self.inner.borrow_mut();
        let mailbox = Rc::new(RefCell::new(Mailbox {
            values:  inner.buffer.clone(),
            outcome: inner.state.outcome(),
            waker:   None,
        }));
        if inner.state.is_active() {
            inner.subscribe(Subscriber::Mailbox(Rc::downgrade(&mailbox)));
            let on_complete = Rc::downgrade(&mailbox);
            let on_error = on_complete.clone();
            inner.on_complete(move || settle(&on_complete, Ok(())));
            inner.on_error(move |error| settle(&on_error, Err(error)));
        }
        Values {
            mailbox,
            terminated: false,
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> EventSource<Result<T, E>> for ReplayStream<T, E> {
    type Source = Values<T, E>;

    fn subscribe(&self) -> Self::Source {
        self.values()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use futures_core::Stream;
    use futures_util::{FutureExt, StreamExt};

    use crate::{schedule::ManualScheduler, ReplayStream, StreamConfig};

    #[test]
    fn values_drain_before_the_outcome() {
        let scheduler = ManualScheduler::new();
        let stream = ReplayStream::<u32, &str>::new(scheduler.clone(), |handle| {
            handle.emit(1);
            handle.emit(2);
            handle.fail("boom");
            handle.emit(3);
        });
        let mut values = stream.values();
        assert!(values.next().now_or_never().is_none());

        scheduler.run(8);
        assert_eq!(values.next().now_or_never(), Some(Some(Ok(1))));
        assert_eq!(values.next().now_or_never(), Some(Some(Ok(2))));
        assert_eq!(values.next().now_or_never(), Some(Some(Err("boom"))));
        assert_eq!(values.next().now_or_never(), Some(None));
        assert!(futures_core::FusedStream::is_terminated(&values));
    }

    #[test]
    fn each_sequence_has_its_own_snapshot() {
        let scheduler = ManualScheduler::new();
        let config = StreamConfig::with_buffer_size(2).unwrap();
        let slot = Rc::new(RefCell::new(None));
        let producer_slot = slot.clone();
        let stream = ReplayStream::<u32, ()>::with_config(scheduler.clone(), config, move |handle| {
            handle.emit(1);
            *producer_slot.borrow_mut() = Some(handle);
        });
        let handle = slot.borrow_mut().take().unwrap();
        scheduler.run(8);
        let early = stream.values();
        assert_eq!(early.size_hint(), (1, None));

        handle.emit(2);
        handle.emit(3);
        scheduler.run(8);
        let late = stream.values();
        handle.complete();
        scheduler.run(8);

        let early: Vec<_> = early.collect().now_or_never().unwrap();
        let late: Vec<_> = late.collect().now_or_never().unwrap();
        assert_eq!(early, [Ok(1), Ok(2), Ok(3)]);
        assert_eq!(late, [Ok(2), Ok(3)]);
    }

    #[test]
    fn dropped_sequences_are_pruned() {
        let scheduler = ManualScheduler::new();
        let stream = ReplayStream::<u32, ()>::new(scheduler.clone(), |handle| {
            handle.emit(1);
            handle.emit(2);
        });
        let kept = stream.values();
        drop(stream.values());
        assert_eq!(stream.live_subscribers(), 2);
        scheduler.run(8);
        assert_eq!(stream.live_subscribers(), 1);
        drop(kept);
    }

    #[test]
    fn sequence_after_completion_is_the_buffer() {
        let scheduler = ManualScheduler::new();
        let stream = ReplayStream::<u32, ()>::new(scheduler.clone(), |handle| {
            handle.emit(1);
            handle.emit(2);
            handle.complete();
        });
        scheduler.run(8);
        let values: Vec<_> = stream.values().collect().now_or_never().unwrap();
        assert_eq!(values, [Ok(2)]);
        assert_eq!(stream.live_subscribers(), 0);
    }
}
