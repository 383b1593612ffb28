//! FIFO-fair reader/writer admission control.
//!
//! `AccessCoordinator<T>` is a custom `RwLock`-shaped primitive, not
//! `std`/`parking_lot`'s `RwLock`, because admission here must be strict
//! FIFO: a reader that arrives after a queued writer must wait behind it,
//! and a writer is admitted only once every earlier-queued waiter has run.
//! Neither guarantee is promised by a general-purpose `RwLock`.
//!
//! Each waiter parks on its own `parking_lot::Condvar` and is woken
//! directly on admission, rather than every waiter sharing one condvar and
//! re-checking a predicate. The latter would wake and re-sleep every
//! blocked thread on each release (a thundering herd); here exactly the
//! thread being admitted is signalled.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

enum WaiterKind {
    Read,
    Write,
}

struct Waiter {
    kind: WaiterKind,
    signal: Arc<(Mutex<bool>, Condvar)>,
}

#[derive(Default)]
struct State {
    readers_active: usize,
    writer_active: bool,
    queue: VecDeque<Waiter>,
}

/// Guards `T` behind FIFO-fair reader/writer admission.
///
/// Readers may run concurrently with other readers; writers run exclusively
/// with respect to both readers and other writers, and queued waiters are
/// admitted strictly in arrival order.
pub struct AccessCoordinator<T> {
    state: Mutex<State>,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through `ReadGuard`/`WriteGuard`,
// whose existence is gated by `state`, so concurrent access always respects
// Rust's aliasing rules (many shared, or one exclusive).
unsafe impl<T: Send> Send for AccessCoordinator<T> {}
// SAFETY: see above; `T: Send` is sufficient since the coordinator itself
// provides the synchronization `Sync` would otherwise require of `T`.
unsafe impl<T: Send> Sync for AccessCoordinator<T> {}

impl<T> fmt::Debug for AccessCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCoordinator").finish_non_exhaustive()
    }
}

impl<T> AccessCoordinator<T> {
    /// Wraps `data` behind a fresh, uncontended coordinator.
    pub fn new(data: T) -> Self {
        Self {
            state: Mutex::new(State::default()),
            data: UnsafeCell::new(data),
        }
    }

    /// Blocks until a read admission is granted, then returns a guard
    /// providing shared access.
    pub fn acquire_read(&self) -> ReadGuard<'_, T> {
        let mut state = self.state.lock();
        if state.queue.is_empty() && !state.writer_active {
            state.readers_active += 1;
        } else {
            let signal = Arc::new((Mutex::new(false), Condvar::new()));
            state.queue.push_back(Waiter {
                kind: WaiterKind::Read,
                signal: Arc::clone(&signal),
            });
            drop(state);
            Self::park(&signal);
        }
        ReadGuard { coordinator: self }
    }

    /// Blocks until a write admission is granted, then returns a guard
    /// providing exclusive access.
    pub fn acquire_write(&self) -> WriteGuard<'_, T> {
        let mut state = self.state.lock();
        if state.readers_active == 0 && !state.writer_active && state.queue.is_empty() {
            state.writer_active = true;
        } else {
            let signal = Arc::new((Mutex::new(false), Condvar::new()));
            state.queue.push_back(Waiter {
                kind: WaiterKind::Write,
                signal: Arc::clone(&signal),
            });
            drop(state);
            Self::park(&signal);
        }
        WriteGuard { coordinator: self }
    }

    fn park(signal: &Arc<(Mutex<bool>, Condvar)>) {
        let (lock, cvar) = &**signal;
        let mut admitted = lock.lock();
        while !*admitted {
            cvar.wait(&mut admitted);
        }
    }

    fn signal(waiter: &Waiter) {
        let (lock, cvar) = &*waiter.signal;
        let mut admitted = lock.lock();
        *admitted = true;
        cvar.notify_one();
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        state.readers_active -= 1;
        if state.readers_active == 0 {
            Self::admit_next(&mut state);
        }
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        state.writer_active = false;
        Self::admit_next(&mut state);
    }

    /// Drains the FIFO queue: a writer at the front is admitted alone (and
    /// only if no reader remains active); a reader at the front is admitted
    /// along with every contiguous reader behind it.
    fn admit_next(state: &mut State) {
        loop {
            match state.queue.front() {
                None => break,
                Some(waiter) => match waiter.kind {
                    WaiterKind::Write => {
                        if state.readers_active == 0 && !state.writer_active {
                            let waiter = state.queue.pop_front().expect("front just matched");
                            state.writer_active = true;
                            Self::signal(&waiter);
                        }
                        break;
                    }
                    WaiterKind::Read => {
                        if state.writer_active {
                            break;
                        }
                        let waiter = state.queue.pop_front().expect("front just matched");
                        state.readers_active += 1;
                        Self::signal(&waiter);
                    }
                },
            }
        }
    }
}

/// Scoped shared-access guard returned by [`AccessCoordinator::acquire_read`].
pub struct ReadGuard<'a, T> {
    coordinator: &'a AccessCoordinator<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a `ReadGuard` means the coordinator counted us
        // among `readers_active`, which excludes any `WriteGuard` existing
        // concurrently.
        unsafe { &*self.coordinator.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.coordinator.release_read();
    }
}

impl<T> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard").finish_non_exhaustive()
    }
}

/// Scoped exclusive-access guard returned by [`AccessCoordinator::acquire_write`].
pub struct WriteGuard<'a, T> {
    coordinator: &'a AccessCoordinator<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a `WriteGuard` means we are the sole admitted
        // writer and no reader is concurrently admitted.
        unsafe { &*self.coordinator.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Deref` impl above.
        unsafe { &mut *self.coordinator.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.coordinator.release_write();
    }
}

impl<T> fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_writer_sees_exclusive_access() {
        let coordinator = AccessCoordinator::new(0usize);
        {
            let mut guard = coordinator.acquire_write();
            *guard += 1;
        }
        let guard = coordinator.acquire_read();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn test_concurrent_reads_are_allowed_together() {
        let coordinator = Arc::new(AccessCoordinator::new(()));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                let _guard = coordinator.acquire_read();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) > 1, "readers never overlapped");
    }

    #[test]
    fn test_writer_excludes_readers() {
        let coordinator = Arc::new(AccessCoordinator::new(()));
        let active_writers = Arc::new(AtomicUsize::new(0));
        let active_readers = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for i in 0..12 {
            let coordinator = Arc::clone(&coordinator);
            let active_writers = Arc::clone(&active_writers);
            let active_readers = Arc::clone(&active_readers);
            let violations = Arc::clone(&violations);
            handles.push(thread::spawn(move || {
                if i % 3 == 0 {
                    let _guard = coordinator.acquire_write();
                    active_writers.fetch_add(1, Ordering::SeqCst);
                    if active_readers.load(Ordering::SeqCst) > 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_millis(5));
                    active_writers.fetch_sub(1, Ordering::SeqCst);
                } else {
                    let _guard = coordinator.acquire_read();
                    active_readers.fetch_add(1, Ordering::SeqCst);
                    if active_writers.load(Ordering::SeqCst) > 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_millis(5));
                    active_readers.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fifo_order_is_preserved_for_queued_waiters() {
        let coordinator = Arc::new(AccessCoordinator::new(()));
        let order = Arc::new(Mutex::new(Vec::new()));
        // Hold a write lock so every subsequent acquire must queue.
        let held = coordinator.acquire_write();
        let mut handles = Vec::new();
        for i in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _guard = coordinator.acquire_write();
                order.lock().push(i);
            }));
            // give each thread time to enqueue in submission order.
            thread::sleep(Duration::from_millis(5));
        }
        drop(held);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }
}
