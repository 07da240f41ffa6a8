//! Fan-out across sibling branches.
//!
//! Searching several entry mappings produces independent branches whose
//! results funnel through one [`FanoutBarrier`]: results are deduplicated
//! by identity key, a remaining-branch counter tracks completion, and the
//! collected results are released only once every branch has reported.
//! Branches may run inline (deterministic order) or on scoped worker
//! threads.

use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// How sibling branches are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Run branches sequentially on the calling thread. Required when
    /// deterministic result ordering matters.
    #[default]
    Inline,
    /// Run branches on scoped worker threads.
    Threaded,
}

struct BarrierState<T> {
    remaining: usize,
    seen: BTreeSet<String>,
    results: Vec<T>,
    closed: bool,
}

/// Synchronized completion barrier for a fixed number of branches.
pub struct FanoutBarrier<T> {
    state: Mutex<BarrierState<T>>,
    done: Condvar,
    abandoned: AtomicBool,
}

impl<T> FanoutBarrier<T> {
    /// Create a barrier expecting `branches` completions.
    pub fn new(branches: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                remaining: branches,
                seen: BTreeSet::new(),
                results: Vec::new(),
                closed: branches == 0,
            }),
            done: Condvar::new(),
            abandoned: AtomicBool::new(false),
        }
    }

    /// Stop further work: branches that have not started yet will report
    /// completion without doing anything.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    /// Whether the barrier has been abandoned.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Submit one result under an identity key. A key already seen is
    /// dropped; returns whether the result was kept.
    pub fn submit(&self, key: impl Into<String>, result: T) -> bool {
        let mut state = self.state.lock();
        if !state.seen.insert(key.into()) {
            return false;
        }
        state.results.push(result);
        true
    }

    /// Report one branch as complete; the final branch closes the
    /// barrier and wakes the waiter.
    pub fn complete_branch(&self) {
        let mut state = self.state.lock();
        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining == 0 {
            state.closed = true;
            self.done.notify_all();
        }
    }

    /// Block until every branch has completed, then take the collected
    /// results.
    pub fn wait(&self) -> Vec<T> {
        let mut state = self.state.lock();
        while !state.closed {
            self.done.wait(&mut state);
        }
        std::mem::take(&mut state.results)
    }
}

/// Run a set of branch closures under the chosen dispatch mode.
///
/// Each closure receives nothing and must itself call
/// [`FanoutBarrier::complete_branch`] when done; a branch observing an
/// abandoned barrier should complete immediately.
pub fn run_branches<F>(dispatch: Dispatch, branches: Vec<F>)
where
    F: FnOnce() + Send,
{
    match dispatch {
        Dispatch::Inline => {
            for branch in branches {
                branch();
            }
        }
        Dispatch::Threaded => {
            std::thread::scope(|scope| {
                for branch in branches {
                    scope.spawn(branch);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn collects_and_dedups_results() {
        let barrier = FanoutBarrier::new(2);
        assert!(barrier.submit("id=1", "alice"));
        assert!(!barrier.submit("id=1", "alice-duplicate"));
        assert!(barrier.submit("id=2", "bob"));
        barrier.complete_branch();
        barrier.complete_branch();

        let results = barrier.wait();
        assert_eq!(results, vec!["alice", "bob"]);
    }

    #[test]
    fn zero_branches_close_immediately() {
        let barrier: FanoutBarrier<()> = FanoutBarrier::new(0);
        assert!(barrier.wait().is_empty());
    }

    #[test]
    fn threaded_branches_join_through_the_barrier() {
        let barrier = Arc::new(FanoutBarrier::new(4));
        let branches: Vec<_> = (0..4)
            .map(|i| {
                let barrier = barrier.clone();
                move || {
                    if !barrier.is_abandoned() {
                        barrier.submit(format!("id={i}"), i);
                    }
                    barrier.complete_branch();
                }
            })
            .collect();
        run_branches(Dispatch::Threaded, branches);

        let mut results = barrier.wait();
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[test]
    fn abandoned_branches_skip_work() {
        let barrier = Arc::new(FanoutBarrier::new(2));
        barrier.abandon();
        let branches: Vec<_> = (0..2)
            .map(|i| {
                let barrier = barrier.clone();
                move || {
                    if !barrier.is_abandoned() {
                        barrier.submit(format!("id={i}"), i);
                    }
                    barrier.complete_branch();
                }
            })
            .collect();
        run_branches(Dispatch::Inline, branches);

        assert!(barrier.wait().is_empty());
    }
}
