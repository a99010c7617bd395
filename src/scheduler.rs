//! The deferred-callback queue every pledge schedules its continuations
//! on.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// FIFO queue of deferred callbacks.
///
/// Continuations never run synchronously from `then`, `resolve` or
/// `reject`; they are pushed here and run, in the order they were
/// queued, when the owner drains the queue. Cloning hands out another
/// handle onto the same queue, which is how every pledge derived from a
/// chain ends up on the scheduler the chain started with.
///
/// # Examples
///
/// ```
/// use pledge::Scheduler;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let scheduler = Scheduler::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let first = log.clone();
/// scheduler.defer(move || first.borrow_mut().push(1));
/// let second = log.clone();
/// scheduler.defer(move || second.borrow_mut().push(2));
///
/// assert!(log.borrow().is_empty());
/// scheduler.run_until_idle();
/// assert_eq!(*log.borrow(), vec![1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct Scheduler {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run after the current synchronous work finishes.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
        tracing::trace!(depth = self.queue.borrow().len(), "deferred callback queued");
    }

    /// Number of callbacks currently waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run queued callbacks in FIFO order until the queue stays empty,
    /// including callbacks queued by the callbacks themselves. Returns
    /// how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop before running so a task that defers more work appends
            // to a queue it is no longer borrowed from.
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        tracing::trace!(ran, "scheduler drained");
        ran
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Scheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_tasks_in_fifo_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let log = log.clone();
            scheduler.defer(move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.pending(), 4);
        assert_eq!(scheduler.run_until_idle(), 4);
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn tasks_queued_during_a_drain_still_run() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_log = log.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.defer(move || {
            inner_log.borrow_mut().push("outer");
            let nested_log = inner_log.clone();
            inner_scheduler.defer(move || nested_log.borrow_mut().push("nested"));
        });
        assert_eq!(scheduler.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "nested"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn clones_share_one_queue() {
        let scheduler = Scheduler::new();
        let other = scheduler.clone();
        other.defer(|| {});
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_until_idle();
        assert_eq!(other.pending(), 0);
    }
}
