//! Shared/exclusive lock with writer preference.
//!
//! The lock only counts; it does not guard any data by itself. The owning
//! channel pairs it with slot memory and releases it when a mapping ends, which
//! is why acquisition and release are separate calls instead of a guard.

use parking_lot::{Condvar, Mutex};

/// Snapshot of a lock's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockCounts {
    /// Readers currently holding the lock.
    pub active_readers: u32,
    /// Writers currently holding the lock (0 or 1).
    pub active_writers: u32,
    /// Writers waiting for or holding the lock.
    ///
    /// A writer stays counted here until it releases.
    pub waiting_writers: u32,
}

/// Per-slot reader/writer lock.
///
/// ## Fairness
///
/// ```text
///   acquire_write ──► waiting_writers += 1 ──► new readers queue up
///   release_write ──► next writer first, readers only when none wait
/// ```
///
/// A reader arriving while a writer waits queues behind that writer.
pub struct SlotLock {
    counts: Mutex<LockCounts>,
    readers: Condvar,
    writers: Condvar,
}

impl SlotLock {
    /// Creates an unlocked slot lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(LockCounts::default()),
            readers: Condvar::new(),
            writers: Condvar::new(),
        }
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn counts(&self) -> LockCounts {
        *self.counts.lock()
    }

    /// Acquires shared access, blocking while any writer waits or holds.
    pub fn acquire_read(&self) {
        let mut counts = self.counts.lock();
        while counts.waiting_writers > 0 {
            self.readers.wait(&mut counts);
        }
        counts.active_readers += 1;
    }

    /// Tries to acquire shared access without blocking.
    ///
    /// Returns `false` if a writer is waiting or holding the lock.
    #[must_use]
    pub fn try_acquire_read(&self) -> bool {
        let mut counts = self.counts.lock();
        if counts.waiting_writers > 0 {
            return false;
        }
        counts.active_readers += 1;
        true
    }

    /// Acquires exclusive access, blocking while readers or a writer are active.
    pub fn acquire_write(&self) {
        let mut counts = self.counts.lock();
        counts.waiting_writers += 1;
        while counts.active_readers > 0 || counts.active_writers > 0 {
            self.writers.wait(&mut counts);
        }
        counts.active_writers += 1;
    }

    /// Tries to acquire exclusive access without blocking.
    ///
    /// Returns `false` if any reader or writer is active.
    #[must_use]
    pub fn try_acquire_write(&self) -> bool {
        let mut counts = self.counts.lock();
        if counts.active_readers > 0 || counts.active_writers > 0 {
            return false;
        }
        counts.waiting_writers += 1;
        counts.active_writers += 1;
        true
    }

    /// Releases shared access.
    ///
    /// The last reader out wakes one waiting writer.
    pub fn release_read(&self) {
        let mut counts = self.counts.lock();
        debug_assert!(counts.active_readers > 0, "release_read without a reader");
        counts.active_readers -= 1;
        if counts.active_readers == 0 && counts.waiting_writers > 0 {
            self.writers.notify_one();
        }
    }

    /// Releases exclusive access.
    ///
    /// Wakes the next waiting writer, or all waiting readers if none.
    pub fn release_write(&self) {
        let mut counts = self.counts.lock();
        debug_assert_eq!(counts.active_writers, 1, "release_write without a writer");
        counts.active_writers -= 1;
        counts.waiting_writers -= 1;
        if counts.waiting_writers > 0 {
            self.writers.notify_one();
        } else {
            self.readers.notify_all();
        }
    }
}

impl Default for SlotLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SlotLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotLock").field("counts", &self.counts()).finish()
    }
}
