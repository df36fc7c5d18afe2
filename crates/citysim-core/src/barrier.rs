//! A reusable, abortable rendezvous point for the tick loop.
//!
//! `std::sync::Barrier` has no way to wake every waiter without all parties
//! arriving, which is exactly what a clean shutdown needs: the kernel must
//! be able to release every blocked subsystem thread even though one of
//! them will never call `wait()` again. [`TickBarrier`] is built from a
//! `Mutex` + `Condvar` pair instead, following the same hand-rolled,
//! atomics-and-condvar approach the rest of this crate's scheduling
//! primitives use rather than reaching for a crate.

use std::sync::{Condvar, Mutex};

/// Outcome of a [`TickBarrier::wait`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierWaitResult {
    /// All parties arrived; the barrier released normally.
    Proceed,
    /// The barrier was aborted while this call was waiting (or had already
    /// been aborted before the call was made).
    Aborted,
}

struct State {
    generation: u64,
    count: usize,
    aborted: bool,
}

/// A barrier for exactly `parties` threads, reusable across many
/// generations and abortable to unblock every waiter at once.
///
/// One instance is shared for the entire run and `wait()` is called once
/// per tick per party. Because the barrier is reused, a single call from
/// each party does double duty: it closes out the tick that just finished
/// for that party and simultaneously opens the next one, matching the
/// reference scheduler's single-barrier-per-tick design.
pub struct TickBarrier {
    parties: usize,
    state: Mutex<State>,
    condvar: Condvar,
}

impl TickBarrier {
    /// Create a barrier requiring `parties` calls to `wait()` to release.
    ///
    /// `parties` must be at least 1.
    pub fn new(parties: usize) -> Self {
        assert!(parties >= 1, "TickBarrier requires at least one party");
        Self {
            parties,
            state: Mutex::new(State {
                generation: 0,
                count: 0,
                aborted: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Block until every party has called `wait()` for the current
    /// generation, or until the barrier is aborted.
    ///
    /// The last party to arrive advances the generation and wakes every
    /// other waiter without blocking itself.
    pub fn wait(&self) -> BarrierWaitResult {
        let mut guard = self.state.lock().expect("TickBarrier mutex poisoned");
        if guard.aborted {
            return BarrierWaitResult::Aborted;
        }

        let generation = guard.generation;
        guard.count += 1;

        if guard.count == self.parties {
            guard.count = 0;
            guard.generation = guard.generation.wrapping_add(1);
            self.condvar.notify_all();
            return BarrierWaitResult::Proceed;
        }

        loop {
            if guard.aborted {
                return BarrierWaitResult::Aborted;
            }
            if guard.generation != generation {
                return BarrierWaitResult::Proceed;
            }
            guard = self
                .condvar
                .wait(guard)
                .expect("TickBarrier condvar wait poisoned");
        }
    }

    /// Permanently abort the barrier, waking every thread currently
    /// blocked in `wait()` (and every future caller) with
    /// [`BarrierWaitResult::Aborted`].
    pub fn abort(&self) {
        let mut guard = self.state.lock().expect("TickBarrier mutex poisoned");
        guard.aborted = true;
        self.condvar.notify_all();
    }

    /// Number of parties this barrier was constructed for.
    pub fn parties(&self) -> usize {
        self.parties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn single_party_proceeds_immediately() {
        let barrier = TickBarrier::new(1);
        assert_eq!(barrier.wait(), BarrierWaitResult::Proceed);
        assert_eq!(barrier.wait(), BarrierWaitResult::Proceed);
    }

    #[test]
    fn releases_all_parties_together() {
        let barrier = Arc::new(TickBarrier::new(3));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let b = Arc::clone(&barrier);
            handles.push(thread::spawn(move || b.wait()));
        }
        thread::sleep(Duration::from_millis(20));
        let last = barrier.wait();
        assert_eq!(last, BarrierWaitResult::Proceed);
        for h in handles {
            assert_eq!(h.join().unwrap(), BarrierWaitResult::Proceed);
        }
    }

    #[test]
    fn reusable_across_generations() {
        let barrier = Arc::new(TickBarrier::new(2));
        for _ in 0..5 {
            let b = Arc::clone(&barrier);
            let handle = thread::spawn(move || b.wait());
            thread::sleep(Duration::from_millis(5));
            assert_eq!(barrier.wait(), BarrierWaitResult::Proceed);
            assert_eq!(handle.join().unwrap(), BarrierWaitResult::Proceed);
        }
    }

    #[test]
    fn abort_wakes_blocked_waiters() {
        let barrier = Arc::new(TickBarrier::new(3));
        let b1 = Arc::clone(&barrier);
        let h1 = thread::spawn(move || b1.wait());
        let b2 = Arc::clone(&barrier);
        let h2 = thread::spawn(move || b2.wait());
        thread::sleep(Duration::from_millis(20));
        barrier.abort();
        assert_eq!(h1.join().unwrap(), BarrierWaitResult::Aborted);
        assert_eq!(h2.join().unwrap(), BarrierWaitResult::Aborted);
    }

    #[test]
    fn wait_after_abort_returns_aborted_immediately() {
        let barrier = TickBarrier::new(2);
        barrier.abort();
        assert_eq!(barrier.wait(), BarrierWaitResult::Aborted);
    }

    #[test]
    fn parties_reports_construction_value() {
        let barrier = TickBarrier::new(4);
        assert_eq!(barrier.parties(), 4);
    }

    #[test]
    #[should_panic(expected = "at least one party")]
    fn zero_parties_panics() {
        TickBarrier::new(0);
    }
}
