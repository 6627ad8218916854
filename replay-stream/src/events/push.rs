//! Callback based consumption

use super::chain::Completed;
use crate::stream::{ReplayStream, Subscriber};

impl<T: Clone + 'static, E: Clone + 'static> ReplayStream<T, E> {
    /// Call `on_next` for every buffered value, oldest first, then for every
    /// value accepted from now on.
    ///
    /// The buffered values are delivered before this function returns. The
    /// returned future resolves with the terminal outcome; a failure is only
    /// ever reported there, never to `on_next`.
    pub fn iterate<F>(&self, mut on_next: F) -> Completed<E>
    where
        F: FnMut(T) + 'static,
    {
        let replay: Vec<T> = self.inner.borrow().buffer.iter().cloned().collect();
        for value in replay {
            on_next(value);
        }
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_active() {
                inner.subscribe(Subscriber::Callback(Box::new(on_next)));
            }
        }
        self.completed()
    }
}
