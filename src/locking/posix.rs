// SPDX-License-Identifier: Apache-2.0

//! POSIX threads lock/condition/thread-id backend, equivalent to libevent's
//! `evthread_use_pthreads()`. Allocates real `pthread_mutex_t`/`pthread_cond_t`
//! instances behind the pluggable vtables so the reactor's internal locks are actual
//! OS primitives rather than no-ops.

use std::mem::MaybeUninit;
use std::os::raw::c_int;
use std::ptr;

use super::{
    set_condition_callbacks, set_id_callback, set_lock_callbacks, CondCallbacks, LockCallbacks,
    RawCond, RawLock, COND_API_VERSION, LOCKTYPE_RECURSIVE, LOCK_API_VERSION,
};
use crate::error::LockCallbackError;

unsafe extern "C" fn posix_lock_alloc(locktype: u32) -> RawLock {
    let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
    if unsafe { libc::pthread_mutexattr_init(attr.as_mut_ptr()) } != 0 {
        return ptr::null_mut();
    }
    let mut attr = unsafe { attr.assume_init() };
    if locktype & LOCKTYPE_RECURSIVE != 0 {
        unsafe { libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_RECURSIVE) };
    }

    let mut mutex = MaybeUninit::<libc::pthread_mutex_t>::uninit();
    let rc = unsafe { libc::pthread_mutex_init(mutex.as_mut_ptr(), &attr) };
    unsafe { libc::pthread_mutexattr_destroy(&mut attr) };
    if rc != 0 {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(unsafe { mutex.assume_init() })) as RawLock
}

unsafe extern "C" fn posix_lock_free(lock: RawLock, _locktype: u32) {
    let mut mutex = unsafe { Box::from_raw(lock as *mut libc::pthread_mutex_t) };
    unsafe { libc::pthread_mutex_destroy(&mut *mutex) };
}

unsafe extern "C" fn posix_lock_lock(_mode: u32, lock: RawLock) -> c_int {
    unsafe { libc::pthread_mutex_lock(lock as *mut libc::pthread_mutex_t) }
}

unsafe extern "C" fn posix_lock_unlock(_mode: u32, lock: RawLock) -> c_int {
    unsafe { libc::pthread_mutex_unlock(lock as *mut libc::pthread_mutex_t) }
}

unsafe extern "C" fn posix_cond_alloc(_condtype: u32) -> RawCond {
    let mut cond = MaybeUninit::<libc::pthread_cond_t>::uninit();
    if unsafe { libc::pthread_cond_init(cond.as_mut_ptr(), ptr::null()) } != 0 {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(unsafe { cond.assume_init() })) as RawCond
}

unsafe extern "C" fn posix_cond_free(cond: RawCond) {
    let mut cond = unsafe { Box::from_raw(cond as *mut libc::pthread_cond_t) };
    unsafe { libc::pthread_cond_destroy(&mut *cond) };
}

unsafe extern "C" fn posix_cond_signal(cond: RawCond, broadcast: c_int) -> c_int {
    if broadcast != 0 {
        unsafe { libc::pthread_cond_broadcast(cond as *mut libc::pthread_cond_t) }
    } else {
        unsafe { libc::pthread_cond_signal(cond as *mut libc::pthread_cond_t) }
    }
}

unsafe extern "C" fn posix_cond_wait(
    cond: RawCond,
    lock: RawLock,
    timeout: *const libc::timeval,
) -> c_int {
    let cond = cond as *mut libc::pthread_cond_t;
    let lock = lock as *mut libc::pthread_mutex_t;
    if timeout.is_null() {
        return if unsafe { libc::pthread_cond_wait(cond, lock) } == 0 {
            0
        } else {
            -1
        };
    }

    let tv = unsafe { &*timeout };
    let mut now = MaybeUninit::<libc::timespec>::uninit();
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, now.as_mut_ptr()) };
    let now = unsafe { now.assume_init() };
    let mut deadline = libc::timespec {
        tv_sec: now.tv_sec + tv.tv_sec,
        tv_nsec: now.tv_nsec + (tv.tv_usec as i64) * 1_000,
    };
    if deadline.tv_nsec >= 1_000_000_000 {
        deadline.tv_sec += 1;
        deadline.tv_nsec -= 1_000_000_000;
    }

    match unsafe { libc::pthread_cond_timedwait(cond, lock, &deadline) } {
        0 => 0,
        libc::ETIMEDOUT => 1,
        _ => -1,
    }
}

unsafe extern "C" fn posix_thread_id() -> libc::c_ulong {
    unsafe { libc::pthread_self() as libc::c_ulong }
}

/// Installs the POSIX-threads backend: real `pthread_mutex_t`/`pthread_cond_t`
/// primitives behind the lock/condition vtables, and `pthread_self` for thread-id
/// attribution in debug mode. Equivalent to libevent's `evthread_use_pthreads()`.
pub fn use_posix_threads() -> Result<(), LockCallbackError> {
    set_lock_callbacks(Some(LockCallbacks {
        api_version: LOCK_API_VERSION,
        supported_locktypes: LOCKTYPE_RECURSIVE,
        alloc: Some(posix_lock_alloc),
        free: Some(posix_lock_free),
        lock: Some(posix_lock_lock),
        unlock: Some(posix_lock_unlock),
    }))?;
    set_condition_callbacks(Some(CondCallbacks {
        api_version: COND_API_VERSION,
        alloc: Some(posix_cond_alloc),
        free: Some(posix_cond_free),
        signal: Some(posix_cond_signal),
        wait: Some(posix_cond_wait),
    }))?;
    set_id_callback(posix_thread_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct RawLockGuard(RawLock);
    // Safety: a `pthread_mutex_t`'s address is stable once boxed, and all access to it
    // goes through the posix_lock_* functions, which are themselves thread-safe.
    unsafe impl Send for RawLockGuard {}
    unsafe impl Sync for RawLockGuard {}

    #[test]
    fn recursive_mutex_nests_on_the_same_thread() {
        let lock = unsafe { posix_lock_alloc(LOCKTYPE_RECURSIVE) };
        assert!(!lock.is_null());
        assert_eq!(unsafe { posix_lock_lock(0, lock) }, 0);
        assert_eq!(unsafe { posix_lock_lock(0, lock) }, 0);
        assert_eq!(unsafe { posix_lock_lock(0, lock) }, 0);
        assert_eq!(unsafe { posix_lock_unlock(0, lock) }, 0);
        assert_eq!(unsafe { posix_lock_unlock(0, lock) }, 0);
        assert_eq!(unsafe { posix_lock_unlock(0, lock) }, 0);
        unsafe { posix_lock_free(lock, LOCKTYPE_RECURSIVE) };
    }

    #[test]
    fn four_threads_each_nest_a_recursive_lock_without_deadlock() {
        let lock = Arc::new(RawLockGuard(unsafe { posix_lock_alloc(LOCKTYPE_RECURSIVE) }));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    for _ in 0..3 {
                        assert_eq!(unsafe { posix_lock_lock(0, lock.0) }, 0);
                    }
                    for _ in 0..3 {
                        assert_eq!(unsafe { posix_lock_unlock(0, lock.0) }, 0);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked or deadlocked");
        }
        unsafe { posix_lock_free(lock.0, LOCKTYPE_RECURSIVE) };
    }

    #[test]
    fn cond_wait_times_out_when_never_signalled() {
        let lock = unsafe { posix_lock_alloc(0) };
        let cond = unsafe { posix_cond_alloc(0) };
        let timeout = libc::timeval { tv_sec: 0, tv_usec: 10_000 };

        assert_eq!(unsafe { posix_lock_lock(0, lock) }, 0);
        let start = Instant::now();
        let result = unsafe { posix_cond_wait(cond, lock, &timeout) };
        let elapsed = start.elapsed();
        assert_eq!(unsafe { posix_lock_unlock(0, lock) }, 0);

        assert_eq!(result, 1, "unsignalled wait with a timeout must report timeout");
        assert!(elapsed >= Duration::from_millis(10));
        assert!(elapsed < Duration::from_millis(500), "wait overran its timeout by too much");

        unsafe { posix_cond_free(cond) };
        unsafe { posix_lock_free(lock, 0) };
    }

    #[test]
    fn cond_wait_wakes_on_signal_before_timeout() {
        let lock = Arc::new(RawLockGuard(unsafe { posix_lock_alloc(0) }));
        let cond = Arc::new(RawLockGuard(unsafe { posix_cond_alloc(0) } as RawLock));

        let signaller_lock = lock.clone();
        let signaller_cond = cond.clone();
        let signaller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            unsafe { posix_cond_signal(signaller_cond.0, 0) };
            let _ = signaller_lock;
        });

        let timeout = libc::timeval { tv_sec: 1, tv_usec: 0 };
        assert_eq!(unsafe { posix_lock_lock(0, lock.0) }, 0);
        let result = unsafe { posix_cond_wait(cond.0, lock.0, &timeout) };
        assert_eq!(unsafe { posix_lock_unlock(0, lock.0) }, 0);
        signaller.join().unwrap();

        assert_eq!(result, 0, "a signalled wait must report success, not timeout");

        unsafe { posix_cond_free(cond.0) };
        unsafe { posix_lock_free(lock.0, 0) };
    }
}
