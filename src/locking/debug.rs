// SPDX-License-Identifier: Apache-2.0

//! Debug lock wrapper: wraps whatever real lock/condition backend is installed with
//! runtime assertions about ownership, recursion, and use-after-free, aborting the
//! process on violation rather than returning an error. Mirrors libevent's
//! `debug_lock_*` / `evthread_debug_lock_mark_*` family.

use std::os::raw::c_int;
use std::ptr;

use super::{current_thread_id, read_state, RawCond, RawLock, LOCKTYPE_READWRITE, LOCKTYPE_RECURSIVE, READ, WRITE};

#[repr(C)]
struct DebugLock {
    lock: RawLock,
    locktype: u32,
    count: i64,
    held_by: libc::c_ulong,
}

fn mode_bit_check(mode: u32, lock: &DebugLock) {
    if lock.locktype & LOCKTYPE_READWRITE != 0 {
        assert!(
            mode & (READ | WRITE) != 0,
            "read/write lock operated on without specifying READ or WRITE"
        );
    } else {
        assert!(
            mode & (READ | WRITE) == 0,
            "non read/write lock given a READ or WRITE mode bit"
        );
    }
}

fn mark_locked(lock: &mut DebugLock) {
    lock.count += 1;
    if lock.locktype & LOCKTYPE_RECURSIVE == 0 {
        assert_eq!(lock.count, 1, "non-recursive lock locked recursively");
    }
    let me = current_thread_id();
    if lock.count > 1 {
        assert_eq!(
            lock.held_by, me,
            "lock re-acquired recursively by a different thread than its current holder"
        );
    }
    lock.held_by = me;
}

fn mark_unlocked(mode: u32, lock: &mut DebugLock) {
    mode_bit_check(mode, lock);
    let me = current_thread_id();
    assert_eq!(
        lock.held_by, me,
        "unlock called by a thread that does not hold the lock"
    );
    assert!(lock.count > 0, "lock underflow: unlocked more times than locked");
    if lock.count == 1 {
        lock.held_by = 0;
    }
    lock.count -= 1;
}

/// Wraps an already-allocated raw lock handle in a fresh `DebugLock`, taking `inner` as
/// the wrapper's real lock. Used by [`super::bootstrap::LockSlot`] when a lock slot
/// already holds a raw handle from a real backend (allocated before debug mode was
/// enabled) and debug mode is now wrapping it; `inner` is a real lock handle, never
/// itself a `DebugLock`, so it must not be reinterpreted as one.
pub(crate) fn wrap_raw_lock(inner: RawLock, locktype: u32) -> RawLock {
    let wrapper = Box::new(DebugLock {
        lock: inner,
        locktype,
        count: 0,
        held_by: 0,
    });
    Box::into_raw(wrapper) as RawLock
}

/// Fills (or refills) a debug lock's inner handle with a fresh real lock from the
/// currently-installed original backend. Used by [`super::bootstrap::LockSlot`] when a
/// real backend becomes available for a lock that was previously a bare debug stub.
pub(crate) fn fill_inner_lock(handle: RawLock, locktype: u32) -> RawLock {
    if handle.is_null() {
        return unsafe { debug_lock_alloc(locktype) };
    }
    let wrapper = unsafe { &mut *(handle as *mut DebugLock) };
    if let Some(alloc) = read_state().original_lock_fns.alloc {
        let inner = unsafe { alloc(wrapper.locktype | LOCKTYPE_RECURSIVE) };
        if !inner.is_null() {
            wrapper.lock = inner;
        }
    }
    handle
}

pub(crate) unsafe extern "C" fn debug_lock_alloc(locktype: u32) -> RawLock {
    let original_alloc = read_state().original_lock_fns.alloc;
    let inner = match original_alloc {
        Some(alloc) => {
            let handle = unsafe { alloc(locktype | LOCKTYPE_RECURSIVE) };
            if handle.is_null() {
                return ptr::null_mut();
            }
            handle
        }
        None => ptr::null_mut(),
    };
    let wrapper = Box::new(DebugLock {
        lock: inner,
        locktype,
        count: 0,
        held_by: 0,
    });
    Box::into_raw(wrapper) as RawLock
}

pub(crate) unsafe extern "C" fn debug_lock_free(lock: RawLock, locktype: u32) {
    let mut wrapper = unsafe { Box::from_raw(lock as *mut DebugLock) };
    assert_eq!(wrapper.count, 0, "freeing a lock that is still held");
    assert_eq!(
        wrapper.locktype, locktype,
        "lock freed with a locktype that does not match the one it was allocated with"
    );
    if let Some(free) = read_state().original_lock_fns.free {
        if !wrapper.lock.is_null() {
            unsafe { free(wrapper.lock, wrapper.locktype | LOCKTYPE_RECURSIVE) };
        }
    }
    wrapper.lock = ptr::null_mut();
    wrapper.count = -100;
}

pub(crate) unsafe extern "C" fn debug_lock_lock(mode: u32, lock: RawLock) -> c_int {
    let wrapper = unsafe { &mut *(lock as *mut DebugLock) };
    mode_bit_check(mode, wrapper);
    let mut result = 0;
    if let Some(lock_fn) = read_state().original_lock_fns.lock {
        if !wrapper.lock.is_null() {
            result = unsafe { lock_fn(mode, wrapper.lock) };
        }
    }
    if result == 0 {
        mark_locked(wrapper);
    }
    result
}

pub(crate) unsafe extern "C" fn debug_lock_unlock(mode: u32, lock: RawLock) -> c_int {
    let wrapper = unsafe { &mut *(lock as *mut DebugLock) };
    mark_unlocked(mode, wrapper);
    if let Some(unlock_fn) = read_state().original_lock_fns.unlock {
        if !wrapper.lock.is_null() {
            return unsafe { unlock_fn(mode, wrapper.lock) };
        }
    }
    0
}

pub(crate) unsafe extern "C" fn debug_cond_wait(
    cond: RawCond,
    lock: RawLock,
    timeout: *const libc::timeval,
) -> c_int {
    let wrapper = unsafe { &mut *(lock as *mut DebugLock) };
    assert!(wrapper.count > 0, "wait on condition called without holding its lock");
    mark_unlocked(0, wrapper);
    let original_wait = read_state().original_cond_fns.wait;
    let result = match original_wait {
        Some(wait) => unsafe { wait(cond, wrapper.lock, timeout) },
        None => 0,
    };
    mark_locked(wrapper);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// No real backend installed: `debug_lock_alloc` must still hand back a usable
    /// wrapper whose inner handle is null, per the `enable_locks=false` row of the
    /// bootstrap matrix (§4.5).
    fn alloc_plain(locktype: u32) -> RawLock {
        unsafe { debug_lock_alloc(locktype) }
    }

    #[test]
    fn lock_then_unlock_round_trips_without_panicking() {
        let handle = alloc_plain(0);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_unlock(0, handle) }, 0);
        unsafe { debug_lock_free(handle, 0) };
    }

    #[test]
    fn recursive_lock_nests_cleanly() {
        let handle = alloc_plain(LOCKTYPE_RECURSIVE);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_unlock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_unlock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_unlock(0, handle) }, 0);
        unsafe { debug_lock_free(handle, LOCKTYPE_RECURSIVE) };
    }

    #[test]
    fn non_recursive_relock_panics() {
        let handle = alloc_plain(0);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            debug_lock_lock(0, handle);
        }));
        assert!(result.is_err(), "relocking a non-recursive lock must panic");
    }

    #[test]
    fn double_unlock_panics() {
        let handle = alloc_plain(0);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        assert_eq!(unsafe { debug_lock_unlock(0, handle) }, 0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            debug_lock_unlock(0, handle);
        }));
        assert!(result.is_err(), "unlocking an already-unlocked lock must panic");
    }

    #[test]
    fn free_while_held_panics() {
        let handle = alloc_plain(0);
        assert_eq!(unsafe { debug_lock_lock(0, handle) }, 0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            debug_lock_free(handle, 0);
        }));
        assert!(result.is_err(), "freeing a held lock must panic");
    }

    #[test]
    fn free_with_mismatched_locktype_panics() {
        let handle = alloc_plain(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            debug_lock_free(handle, LOCKTYPE_RECURSIVE);
        }));
        assert!(result.is_err(), "freeing with the wrong locktype must panic");
    }

    #[test]
    fn mode_bits_required_for_readwrite_locktype() {
        let handle = alloc_plain(LOCKTYPE_READWRITE);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            debug_lock_lock(0, handle);
        }));
        assert!(result.is_err(), "a READWRITE lock requires READ or WRITE in mode");
    }

    #[test]
    fn mode_bits_forbidden_for_plain_locktype() {
        let handle = alloc_plain(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            debug_lock_lock(WRITE, handle);
        }));
        assert!(result.is_err(), "a non-READWRITE lock must reject the WRITE mode bit");
    }
}
