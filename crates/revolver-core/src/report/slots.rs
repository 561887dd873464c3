//! Bounded-parallelism slot pool shared by every node of one scheduler run.
//!
//! `running` counts slot holders. A full pool parks callers in a FIFO queue;
//! `release` hands its slot straight to the oldest waiter instead of
//! decrementing, so `running` never exceeds `max` at any instant.

use super::event::Event;
use super::lock;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct PoolState {
    running: usize,
    max: usize,
    peak: usize,
    waiting: VecDeque<Arc<Event>>,
}

#[derive(Debug)]
pub(crate) struct SlotPool {
    state: Mutex<PoolState>,
}

impl SlotPool {
    /// A pool of `max` slots with `running` already held (the root holds one).
    pub(crate) fn new(max: usize, running: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                running,
                max,
                peak: running,
                waiting: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn acquire(&self) {
        let handoff = {
            let mut state = lock(&self.state);
            if state.running < state.max {
                state.running += 1;
                state.peak = state.peak.max(state.running);
                return;
            }
            let handoff = Arc::new(Event::new());
            state.waiting.push_back(Arc::clone(&handoff));
            handoff
        };
        handoff.wait();
    }

    pub(crate) fn release(&self) {
        let next = {
            let mut state = lock(&self.state);
            match state.waiting.pop_front() {
                Some(next) => next,
                None => {
                    state.running = state.running.saturating_sub(1);
                    return;
                }
            }
        };
        next.set();
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> usize {
        lock(&self.state).running
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        lock(&self.state).waiting.len()
    }

    pub(crate) fn peak(&self) -> usize {
        lock(&self.state).peak
    }

    pub(crate) fn max(&self) -> usize {
        lock(&self.state).max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_below_max_is_immediate() {
        let pool = SlotPool::new(2, 1);
        pool.acquire();
        assert_eq!(pool.running(), 2);
        pool.release();
        pool.release();
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn release_hands_slot_to_waiter() {
        let pool = Arc::new(SlotPool::new(1, 1));
        let p = Arc::clone(&pool);
        let waiter = thread::spawn(move || p.acquire());

        while pool.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        pool.release();
        waiter.join().unwrap();

        // The slot moved to the waiter; the count never dropped.
        assert_eq!(pool.running(), 1);
        assert_eq!(pool.peak(), 1);
    }

    #[test]
    fn holders_never_exceed_max() {
        let pool = Arc::new(SlotPool::new(3, 0));
        let inside = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..12)
            .map(|_| {
                let (pool, inside, seen) =
                    (Arc::clone(&pool), Arc::clone(&inside), Arc::clone(&seen));
                thread::spawn(move || {
                    pool.acquire();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    pool.release();
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert!(seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.running(), 0);
        assert!(pool.peak() <= pool.max());
    }
}
