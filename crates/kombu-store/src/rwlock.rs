//! Writer-priority reader-writer lock.
//!
//! Guards each library's repositories and index as one unit. The
//! discipline:
//!
//! - Any number of readers may hold the lock while no writer is active
//!   **and none is queued** — a queued writer blocks new readers, so
//!   writers cannot starve.
//! - At most one writer holds the lock; waiting writers are served FIFO
//!   by ticket.
//! - Guards release on drop, covering every exit path.
//! - The lock is not re-entrant: acquiring it twice on one thread
//!   deadlocks, so callers must never nest acquisitions of the same lock.
//!
//! Built from one `parking_lot::Mutex` over the counters plus two
//! condvars, one waking readers and one waking writers.

use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Default)]
struct LockState {
    active_readers: usize,
    writer_active: bool,
    waiting_writers: usize,
    /// Next ticket to hand out to an arriving writer.
    next_ticket: u64,
    /// Ticket currently allowed to acquire; incremented on write release.
    serving_ticket: u64,
}

/// A reader-writer lock owning its data.
pub struct RwLock<T> {
    state: Mutex<LockState>,
    readers_ok: Condvar,
    writers_ok: Condvar,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by the counter discipline — any
// number of shared borrows only while `active_readers > 0`, exactly one
// exclusive borrow only while `writer_active`.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            readers_ok: Condvar::new(),
            writers_ok: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Consume the lock and return its data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Acquire a read guard, blocking while a writer is active or queued.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut state = self.state.lock();
        while state.writer_active || state.waiting_writers > 0 {
            self.readers_ok.wait(&mut state);
        }
        state.active_readers += 1;
        drop(state);
        ReadGuard { lock: self }
    }

    /// Acquire a read guard without blocking, or `None` if a writer is
    /// active or queued.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.writer_active || state.waiting_writers > 0 {
            return None;
        }
        state.active_readers += 1;
        drop(state);
        Some(ReadGuard { lock: self })
    }

    /// Acquire a write guard, blocking until all readers have drained and
    /// every earlier-queued writer has been served.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting_writers += 1;
        while state.writer_active
            || state.active_readers > 0
            || state.serving_ticket != ticket
        {
            self.writers_ok.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer_active = true;
        drop(state);
        WriteGuard { lock: self }
    }

    /// Acquire a write guard without blocking, or `None` if the lock is
    /// held or any writer is queued.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.writer_active || state.active_readers > 0 || state.waiting_writers > 0 {
            return None;
        }
        // No writer active or queued, so every issued ticket has been
        // served and next_ticket == serving_ticket.
        state.next_ticket += 1;
        state.writer_active = true;
        drop(state);
        Some(WriteGuard { lock: self })
    }
}

/// Shared access; releases on drop.
pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: active_readers > 0 excludes any writer.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        state.active_readers -= 1;
        if state.active_readers == 0 && state.waiting_writers > 0 {
            // All queued writers recheck; only the serving ticket wins.
            self.lock.writers_ok.notify_all();
        }
    }
}

/// Exclusive access; releases on drop.
pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: writer_active excludes all readers and other writers.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as above, and this guard is the single writer.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        state.writer_active = false;
        state.serving_ticket += 1;
        if state.waiting_writers > 0 {
            self.lock.writers_ok.notify_all();
        } else {
            self.lock.readers_ok.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_read_write_basic() {
        let lock = RwLock::new(5);
        {
            let guard = lock.read();
            assert_eq!(*guard, 5);
        }
        {
            let mut guard = lock.write();
            *guard = 7;
        }
        assert_eq!(*lock.read(), 7);
        assert_eq!(lock.into_inner(), 7);
    }

    #[test]
    fn test_multiple_concurrent_readers() {
        let lock = Arc::new(RwLock::new(0u32));
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let peak = Arc::clone(&peak);
                let active = Arc::clone(&active);
                thread::spawn(move || {
                    let _guard = lock.read();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) > 1, "readers never overlapped");
    }

    #[test]
    fn test_writer_excludes_readers_and_writers() {
        let lock = Arc::new(RwLock::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut guard = lock.write();
                        // A torn increment would lose updates.
                        let value = *guard;
                        *guard = value + 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.read(), 4000);
    }

    #[test]
    fn test_queued_writer_blocks_new_readers() {
        let lock = Arc::new(RwLock::new(0u32));

        let reader = lock.read();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let mut guard = lock.write();
                *guard = 1;
            })
        };

        // Give the writer time to queue up behind the reader.
        thread::sleep(Duration::from_millis(50));

        // Writer-priority: a queued writer must block new readers.
        assert!(lock.try_read().is_none());

        drop(reader);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn test_writers_are_fifo() {
        let lock = Arc::new(RwLock::new(Vec::<usize>::new()));

        let gate = lock.write();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let handle = thread::spawn(move || {
                    lock.write().push(i);
                });
                // Stagger arrivals so ticket order matches spawn order.
                thread::sleep(Duration::from_millis(50));
                handle
            })
            .collect();

        drop(gate);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*lock.read(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_try_write() {
        let lock = RwLock::new(1);

        let read = lock.read();
        assert!(lock.try_write().is_none());
        drop(read);

        let write = lock.try_write();
        assert!(write.is_some());
        assert!(lock.try_read().is_none());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let lock = Arc::new(RwLock::new(0u32));

        let result = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.write();
                panic!("poisoned on purpose");
            })
            .join()
        };
        assert!(result.is_err());

        // The write guard was dropped during unwinding, so the lock is free.
        assert_eq!(*lock.read(), 0);
        assert!(lock.try_write().is_some());
    }
}
