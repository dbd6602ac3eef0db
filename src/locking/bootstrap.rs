// SPDX-License-Identifier: Apache-2.0

//! The process-wide lock bootstrap primitive, equivalent to libevent's
//! `evthread_setup_global_lock_` plus the `EVTHREAD_SETUP_GLOBAL_LOCK` call sites
//! (`evsig_global_setup_locks_`). A [`LockSlot`] holds the single handle backing one
//! of the reactor's internal locks and (re)builds that handle whenever the installed
//! lock backend changes.

use std::ptr;
use std::sync::Mutex;

use super::{debug, read_state, RawLock};
use crate::error::LockCallbackError;

/// A process-wide lock, lazily built from whatever lock backend is installed.
///
/// Four cases, taken directly from `evthread_setup_global_lock_`:
/// 1. no real backend installed, debug mode off -> allocate a plain debug lock (its
///    inner handle stays null; it enforces ordering invariants without doing real work).
/// 2. no real backend installed, debug mode already on -> wrap the existing handle.
/// 3. a real backend is installed, debug mode off -> allocate a real lock directly.
/// 4. a real backend is installed, debug mode on -> fill the existing debug lock's
///    inner handle with a freshly-allocated real lock.
pub struct LockSlot {
    handle: Mutex<Option<RawLock>>,
    locktype: u32,
}

// Safety: `RawLock` is an opaque pointer into backend-owned memory (a boxed
// `pthread_mutex_t` or debug wrapper); it is only ever dereferenced through the
// installed backend's own thread-safe callbacks, guarded by `handle`'s mutex.
unsafe impl Send for LockSlot {}
unsafe impl Sync for LockSlot {}

/// The reactor's own internal lock, mirroring libevent's `evsig_base_lock`.
pub static GLOBAL_SIG_LOCK: LockSlot = LockSlot::new(0);

impl LockSlot {
    pub const fn new(locktype: u32) -> Self {
        Self {
            handle: Mutex::new(None),
            locktype,
        }
    }

    /// (Re)builds this slot's handle against the currently-installed lock backend.
    ///
    /// `enable_locks` should be `true` from a successful [`super::set_lock_callbacks`]
    /// (a real backend is now available) and `false` from
    /// [`super::enable_lock_debugging`] (only debug-wrapping is happening).
    pub fn bootstrap(&self, enable_locks: bool) -> Result<(), LockCallbackError> {
        let mut guard = self.handle.lock().unwrap_or_else(|p| p.into_inner());
        let state = read_state();
        let debugging = state.debug_enabled;
        let original_alloc = state.original_lock_fns.alloc;
        let active_alloc = state.lock_fns.alloc;
        drop(state);

        let current = *guard;
        let new_handle = if !enable_locks && original_alloc.is_none() {
            unsafe { debug::debug_lock_alloc(self.locktype) }
        } else if !enable_locks && original_alloc.is_some() {
            wrap_existing(current.unwrap_or(ptr::null_mut()), self.locktype)
        } else if enable_locks && !debugging {
            match active_alloc {
                Some(alloc) => unsafe { alloc(self.locktype) },
                None => ptr::null_mut(),
            }
        } else {
            fill_existing(current.unwrap_or(ptr::null_mut()), self.locktype)
        };

        if new_handle.is_null() {
            return Err(LockCallbackError::BootstrapFailed);
        }
        *guard = Some(new_handle);
        Ok(())
    }

    /// Acquires the slot's lock through the currently-active vtable and runs `f`,
    /// releasing the lock afterwards even if `f` panics.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let handle = *self.handle.lock().unwrap_or_else(|p| p.into_inner());
        let lock_fn = read_state().lock_fns.lock;
        let unlock_fn = read_state().lock_fns.unlock;
        if let (Some(handle), Some(lock_fn)) = (handle, lock_fn) {
            unsafe { lock_fn(0, handle) };
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
            if let Some(unlock_fn) = unlock_fn {
                unsafe { unlock_fn(0, handle) };
            }
            match result {
                Ok(r) => r,
                Err(payload) => std::panic::resume_unwind(payload),
            }
        } else {
            f()
        }
    }
}

/// Case 2: no debug lock exists yet but a real backend does; either allocate a fresh
/// debug wrapper around a newly-allocated real lock (`current` null: nothing to reuse
/// yet) or wrap the slot's existing raw real-lock handle in a debug wrapper (`current`
/// non-null: that handle was allocated by the real backend directly, before debug mode
/// existed, and must become the wrapper's inner lock rather than be reinterpreted as
/// a `DebugLock` itself).
fn wrap_existing(current: RawLock, locktype: u32) -> RawLock {
    if current.is_null() {
        unsafe { debug::debug_lock_alloc(locktype) }
    } else {
        debug::wrap_raw_lock(current, locktype)
    }
}

/// Case 4: an existing debug lock (possibly with a null inner handle) now has a real
/// backend available; fill or refill its inner handle.
fn fill_existing(current: RawLock, locktype: u32) -> RawLock {
    debug::fill_inner_lock(current, locktype)
}
