//! Deferring work to the next tick of a single threaded executor

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

/// Something that can run a `!Send` task at some later point.
///
/// Control handles never touch subscribers directly, they hand the work to a
/// scheduler instead, so a producer never re-enters subscriber code while it
/// is still running. Implementations must not poll `task` before `schedule`
/// returns.
pub trait Schedule {
    /// Queue `task` to be polled to completion.
    fn schedule(&self, task: LocalBoxFuture<'static, ()>);
}

impl Schedule for Rc<smol::LocalExecutor<'static>> {
    fn schedule(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawn(task).detach();
    }
}

#[cfg(test)]
pub(crate) use manual::ManualScheduler;

#[cfg(test)]
mod manual {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc, task::Context};

    use futures_util::{future::LocalBoxFuture, task::noop_waker_ref};

    /// A scheduler that only makes progress when told to, so tests can observe
    /// the state in between ticks.
    #[derive(Default)]
    pub(crate) struct ManualScheduler {
        tasks: RefCell<VecDeque<LocalBoxFuture<'static, ()>>>,
    }

    impl super::Schedule for Rc<ManualScheduler> {
        fn schedule(&self, task: LocalBoxFuture<'static, ()>) {
            self.tasks.borrow_mut().push_back(task);
        }
    }

    impl ManualScheduler {
        pub(crate) fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        /// Poll every task queued so far once. Tasks queued while ticking wait
        /// for the next tick.
        pub(crate) fn tick(&self) {
            let mut cx = Context::from_waker(noop_waker_ref());
            let batch = std::mem::take(&mut *self.tasks.borrow_mut());
            for mut task in batch {
                if task.as_mut().poll(&mut cx).is_pending() {
                    self.tasks.borrow_mut().push_back(task);
                }
            }
        }

        /// Tick until nothing is queued, or give up after `limit` ticks.
        pub(crate) fn run(&self, limit: usize) {
            for _ in 0..limit {
                if self.tasks.borrow().is_empty() {
                    break
                }
                self.tick();
            }
        }

        pub(crate) fn pending(&self) -> usize {
            self.tasks.borrow().len()
        }
    }
}
