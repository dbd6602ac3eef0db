// SPDX-License-Identifier: Apache-2.0

//! Win32 critical-section/condition-variable backend, the Windows counterpart of
//! [`super::posix`]. Equivalent to libevent's `evthread_use_windows_threads()`.

use std::os::raw::c_int;

use windows_sys::Win32::System::Threading::{
    DeleteCriticalSection, EnterCriticalSection, InitializeCriticalSection,
    LeaveCriticalSection, SleepConditionVariableCS, WakeAllConditionVariable,
    WakeConditionVariable, CONDITION_VARIABLE, CRITICAL_SECTION, INFINITE,
};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;

use super::{
    set_condition_callbacks, set_id_callback, set_lock_callbacks, CondCallbacks, LockCallbacks,
    RawCond, RawLock, COND_API_VERSION, LOCKTYPE_RECURSIVE, LOCK_API_VERSION,
};
use crate::error::LockCallbackError;

unsafe extern "C" fn win_lock_alloc(_locktype: u32) -> RawLock {
    // `CRITICAL_SECTION` is always recursive on Windows, so `LOCKTYPE_RECURSIVE` is
    // implied regardless of what the caller asked for.
    let mut cs = Box::new(std::mem::zeroed::<CRITICAL_SECTION>());
    unsafe { InitializeCriticalSection(&mut *cs) };
    Box::into_raw(cs) as RawLock
}

unsafe extern "C" fn win_lock_free(lock: RawLock, _locktype: u32) {
    let mut cs = unsafe { Box::from_raw(lock as *mut CRITICAL_SECTION) };
    unsafe { DeleteCriticalSection(&mut *cs) };
}

unsafe extern "C" fn win_lock_lock(_mode: u32, lock: RawLock) -> c_int {
    unsafe { EnterCriticalSection(lock as *mut CRITICAL_SECTION) };
    0
}

unsafe extern "C" fn win_lock_unlock(_mode: u32, lock: RawLock) -> c_int {
    unsafe { LeaveCriticalSection(lock as *mut CRITICAL_SECTION) };
    0
}

unsafe extern "C" fn win_cond_alloc(_condtype: u32) -> RawCond {
    let cv = Box::new(std::mem::zeroed::<CONDITION_VARIABLE>());
    // `InitializeConditionVariable` just zeroes the struct; the zeroed value above is
    // already a valid initial state per the Win32 docs.
    Box::into_raw(cv) as RawCond
}

unsafe extern "C" fn win_cond_free(cond: RawCond) {
    drop(unsafe { Box::from_raw(cond as *mut CONDITION_VARIABLE) });
}

unsafe extern "C" fn win_cond_signal(cond: RawCond, broadcast: c_int) -> c_int {
    let cond = cond as *mut CONDITION_VARIABLE;
    if broadcast != 0 {
        unsafe { WakeAllConditionVariable(cond) };
    } else {
        unsafe { WakeConditionVariable(cond) };
    }
    0
}

unsafe extern "C" fn win_cond_wait(
    cond: RawCond,
    lock: RawLock,
    timeout: *const libc::timeval,
) -> c_int {
    let cond = cond as *mut CONDITION_VARIABLE;
    let lock = lock as *mut CRITICAL_SECTION;
    let millis = if timeout.is_null() {
        INFINITE
    } else {
        let tv = unsafe { &*timeout };
        (tv.tv_sec as u32)
            .saturating_mul(1000)
            .saturating_add((tv.tv_usec / 1000) as u32)
    };

    let ok = unsafe { SleepConditionVariableCS(cond, lock, millis) };
    if ok != 0 {
        0
    } else if !timeout.is_null() {
        1 // ERROR_TIMEOUT: treat any failure on a bounded wait as a timeout.
    } else {
        -1
    }
}

unsafe extern "C" fn win_thread_id() -> libc::c_ulong {
    unsafe { GetCurrentThreadId() as libc::c_ulong }
}

/// Installs the Win32 critical-section/condition-variable backend behind the
/// lock/condition vtables, and `GetCurrentThreadId` for thread-id attribution in
/// debug mode. Equivalent to libevent's `evthread_use_windows_threads()`.
pub fn use_windows_threads() -> Result<(), LockCallbackError> {
    set_lock_callbacks(Some(LockCallbacks {
        api_version: LOCK_API_VERSION,
        supported_locktypes: LOCKTYPE_RECURSIVE,
        alloc: Some(win_lock_alloc),
        free: Some(win_lock_free),
        lock: Some(win_lock_lock),
        unlock: Some(win_lock_unlock),
    }))?;
    set_condition_callbacks(Some(CondCallbacks {
        api_version: COND_API_VERSION,
        alloc: Some(win_cond_alloc),
        free: Some(win_cond_free),
        signal: Some(win_cond_signal),
        wait: Some(win_cond_wait),
    }))?;
    set_id_callback(win_thread_id);
    Ok(())
}
