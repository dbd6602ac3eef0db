// SPDX-License-Identifier: Apache-2.0

//! Pluggable lock/condition/thread-id vtables, mirroring libevent's
//! `evthread_set_lock_callbacks` / `evthread_set_condition_callbacks` family.
//!
//! Callbacks are plain function pointers rather than trait objects: the point of this
//! subsystem is that an embedder installs one concrete threading backend for the whole
//! process before any reactor runs, not that callers hold dynamic dispatch handles.

pub mod bootstrap;
pub mod debug;
#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

use std::os::raw::{c_int, c_void};
use std::sync::RwLock;

use crate::error::LockCallbackError;

pub const LOCK_API_VERSION: u32 = 1;
pub const COND_API_VERSION: u32 = 1;

pub const LOCKTYPE_RECURSIVE: u32 = 1;
pub const LOCKTYPE_READWRITE: u32 = 2;

pub const READ: u32 = 0x08;
pub const WRITE: u32 = 0x04;
pub const TRY: u32 = 0x10;

/// Opaque handle to a lock, owned by whichever backend allocated it.
pub type RawLock = *mut c_void;
/// Opaque handle to a condition variable, owned by whichever backend allocated it.
pub type RawCond = *mut c_void;

pub type ThreadIdFn = unsafe extern "C" fn() -> libc::c_ulong;

/// A table of lock primitives, equivalent to libevent's `evthread_lock_callbacks`.
///
/// Fields are `Option<fn>` rather than bare function pointers so the all-zero table used
/// before any backend is installed is representable (and comparable) the same way the
/// statically zero-initialized C struct is.
#[derive(Clone, Copy, Default, PartialEq)]
pub struct LockCallbacks {
    pub api_version: u32,
    pub supported_locktypes: u32,
    pub alloc: Option<unsafe extern "C" fn(locktype: u32) -> RawLock>,
    pub free: Option<unsafe extern "C" fn(lock: RawLock, locktype: u32)>,
    pub lock: Option<unsafe extern "C" fn(mode: u32, lock: RawLock) -> c_int>,
    pub unlock: Option<unsafe extern "C" fn(mode: u32, lock: RawLock) -> c_int>,
}

/// A table of condition-variable primitives, equivalent to `evthread_condition_callbacks`.
#[derive(Clone, Copy, Default, PartialEq)]
pub struct CondCallbacks {
    pub api_version: u32,
    pub alloc: Option<unsafe extern "C" fn(condtype: u32) -> RawCond>,
    pub free: Option<unsafe extern "C" fn(cond: RawCond)>,
    pub signal: Option<unsafe extern "C" fn(cond: RawCond, broadcast: c_int) -> c_int>,
    pub wait: Option<
        unsafe extern "C" fn(cond: RawCond, lock: RawLock, timeout: *const libc::timeval) -> c_int,
    >,
}

#[derive(Default)]
pub(crate) struct CallbackState {
    pub lock_fns: LockCallbacks,
    pub cond_fns: CondCallbacks,
    pub thread_id_fn: Option<ThreadIdFn>,
    pub debug_enabled: bool,
    pub original_lock_fns: LockCallbacks,
    pub original_cond_fns: CondCallbacks,
}

static STATE: RwLock<CallbackState> = RwLock::new(CallbackState {
    lock_fns: LockCallbacks {
        api_version: 0,
        supported_locktypes: 0,
        alloc: None,
        free: None,
        lock: None,
        unlock: None,
    },
    cond_fns: CondCallbacks {
        api_version: 0,
        alloc: None,
        free: None,
        signal: None,
        wait: None,
    },
    thread_id_fn: None,
    debug_enabled: false,
    original_lock_fns: LockCallbacks {
        api_version: 0,
        supported_locktypes: 0,
        alloc: None,
        free: None,
        lock: None,
        unlock: None,
    },
    original_cond_fns: CondCallbacks {
        api_version: 0,
        alloc: None,
        free: None,
        signal: None,
        wait: None,
    },
});

pub(crate) fn read_state() -> std::sync::RwLockReadGuard<'static, CallbackState> {
    STATE.read().unwrap_or_else(|poison| poison.into_inner())
}

fn write_state() -> std::sync::RwLockWriteGuard<'static, CallbackState> {
    STATE.write().unwrap_or_else(|poison| poison.into_inner())
}

/// Installs (or, with `None`, clears) the process-wide lock callback table.
///
/// Mirrors `evthread_set_lock_callbacks`: installing the same table twice is a no-op,
/// installing a different table once one is already active is an error, and a
/// successful install re-bootstraps every process-wide lock slot (see
/// [`bootstrap::LockSlot`]).
pub fn set_lock_callbacks(cbs: Option<LockCallbacks>) -> Result<(), LockCallbackError> {
    let mut state = write_state();
    let debug = state.debug_enabled;
    let target = if debug {
        &mut state.original_lock_fns
    } else {
        &mut state.lock_fns
    };

    let cbs = match cbs {
        Some(cbs) => cbs,
        None => {
            if target.alloc.is_some() {
                tracing::warn!(
                    "disabling lock callbacks after they were set up will probably not work"
                );
            }
            *target = LockCallbacks::default();
            return Ok(());
        }
    };

    if target.alloc.is_some() {
        if *target == cbs {
            return Ok(());
        }
        tracing::warn!("cannot change lock callbacks once they have been initialized");
        return Err(LockCallbackError::LockAlreadyInstalled);
    }

    if cbs.alloc.is_none() || cbs.free.is_none() || cbs.lock.is_none() || cbs.unlock.is_none() {
        return Err(LockCallbackError::IncompleteLockTable);
    }
    if cbs.api_version != LOCK_API_VERSION {
        return Err(LockCallbackError::UnsupportedLockApiVersion(cbs.api_version));
    }

    *target = cbs;
    drop(state);
    bootstrap::GLOBAL_SIG_LOCK.bootstrap(true)
}

/// Installs (or, with `None`, clears) the process-wide condition-variable callback table.
///
/// Unlike [`set_lock_callbacks`], an incomplete table is silently ignored rather than
/// rejected, and installing this table never triggers a lock-slot bootstrap: conditions
/// are never used to build the reactor's own internal locks.
pub fn set_condition_callbacks(cbs: Option<CondCallbacks>) -> Result<(), LockCallbackError> {
    let mut state = write_state();
    let debug = state.debug_enabled;
    let target = if debug {
        &mut state.original_cond_fns
    } else {
        &mut state.cond_fns
    };

    let cbs = match cbs {
        Some(cbs) => cbs,
        None => {
            if target.alloc.is_some() {
                tracing::warn!(
                    "disabling condition callbacks after they were set up will probably not work"
                );
            }
            *target = CondCallbacks::default();
            return Ok(());
        }
    };

    if target.alloc.is_some() {
        if *target == cbs {
            return Ok(());
        }
        tracing::warn!("cannot change condition callbacks once they have been initialized");
        return Err(LockCallbackError::ConditionAlreadyInstalled);
    }

    if cbs.alloc.is_some() && cbs.free.is_some() && cbs.signal.is_some() && cbs.wait.is_some() {
        if cbs.api_version != COND_API_VERSION {
            return Err(LockCallbackError::UnsupportedCondApiVersion(cbs.api_version));
        }
        *target = cbs;
    }

    if debug {
        // The debug wrapper keeps its own `wait` (it needs to mark the lock unheld across
        // the real wait); everything else passes straight through to the new backend.
        state.cond_fns.alloc = cbs.alloc;
        state.cond_fns.free = cbs.free;
        state.cond_fns.signal = cbs.signal;
    }
    Ok(())
}

/// Installs the thread-id callback used to attribute lock ownership in debug mode.
pub fn set_id_callback(f: ThreadIdFn) {
    write_state().thread_id_fn = Some(f);
}

pub(crate) fn current_thread_id() -> libc::c_ulong {
    match read_state().thread_id_fn {
        Some(f) => unsafe { f() },
        None => 1,
    }
}

/// Wraps the currently-installed lock/condition callbacks in runtime-asserting debug
/// wrappers. Irreversible and idempotent, matching `evthread_enable_lock_debuging`.
pub fn enable_lock_debugging() {
    let mut state = write_state();
    if state.debug_enabled {
        return;
    }
    state.original_lock_fns = state.lock_fns;
    state.original_cond_fns = state.cond_fns;
    state.lock_fns = LockCallbacks {
        api_version: LOCK_API_VERSION,
        supported_locktypes: LOCKTYPE_RECURSIVE,
        alloc: Some(debug::debug_lock_alloc),
        free: Some(debug::debug_lock_free),
        lock: Some(debug::debug_lock_lock),
        unlock: Some(debug::debug_lock_unlock),
    };
    state.cond_fns.wait = Some(debug::debug_cond_wait);
    state.debug_enabled = true;
    drop(state);
    let _ = bootstrap::GLOBAL_SIG_LOCK.bootstrap(false);
}
