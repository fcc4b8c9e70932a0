//! Counting semaphore with close semantics.

use std::sync::{Condvar, Mutex};

/// A counting semaphore that can be force-closed.
///
/// `acquire` blocks until a permit is available. `close` releases every
/// current and future waiter with a `false` result, which is how stream
/// shutdown guarantees nothing stays blocked. `reset` re-arms a closed
/// semaphore for reuse.
pub(crate) struct Semaphore {
    state: Mutex<SemState>,
    available: Condvar,
}

struct SemState {
    permits: usize,
    closed: bool,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub(crate) fn new(permits: usize) -> Self {
        Semaphore {
            state: Mutex::new(SemState {
                permits,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Takes one permit, blocking until one is released.
    ///
    /// Returns false when the semaphore is (or becomes) closed.
    pub(crate) fn acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return false;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Adds one permit and wakes one waiter. No-op once closed.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.permits += 1;
        self.available.notify_one();
    }

    /// Wakes all waiters; `acquire` returns false until the next `reset`.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.available.notify_all();
    }

    /// Re-arms the semaphore with the given permit count.
    pub(crate) fn reset(&self, permits: usize) {
        let mut state = self.state.lock().unwrap();
        state.permits = permits;
        state.closed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_permits_are_counted() {
        let sem = Semaphore::new(2);
        assert!(sem.acquire());
        assert!(sem.acquire());

        sem.release();
        sem.release();
        sem.release();
        assert!(sem.acquire());
        assert!(sem.acquire());
        assert!(sem.acquire());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter_sem = Arc::clone(&sem);

        let waiter = thread::spawn(move || waiter_sem.acquire());

        // Give the waiter time to block.
        thread::sleep(Duration::from_millis(20));
        sem.release();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_close_releases_all_waiters() {
        let sem = Arc::new(Semaphore::new(0));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.acquire())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        sem.close();

        for waiter in waiters {
            assert!(!waiter.join().unwrap());
        }

        // Closed stays closed for late arrivals too.
        assert!(!sem.acquire());
    }

    #[test]
    fn test_release_after_close_is_ignored() {
        let sem = Semaphore::new(0);
        sem.close();
        sem.release();
        assert!(!sem.acquire());
    }

    #[test]
    fn test_reset_rearms() {
        let sem = Semaphore::new(0);
        sem.close();
        assert!(!sem.acquire());

        sem.reset(1);
        assert!(sem.acquire());

        let sem = Arc::new(sem);
        let waiter_sem = Arc::clone(&sem);
        let waiter = thread::spawn(move || waiter_sem.acquire());
        thread::sleep(Duration::from_millis(20));
        sem.release();
        assert!(waiter.join().unwrap());
    }
}
