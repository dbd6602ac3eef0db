// SPDX-License-Identifier: Apache-2.0

//! Exercises the lock-callback install semantics of §4.3/§4.5 (P7): installing a
//! bit-identical table twice is a no-op, installing a different one is rejected and
//! leaves the previously-installed table untouched.
//!
//! `set_lock_callbacks` mutates process-wide state, so every scenario below runs
//! sequentially inside a single `#[test]` rather than as independent tests — cargo
//! runs tests in the same binary concurrently by default, and these scenarios are
//! only well-defined in a specific order (e.g. "rejects an unversioned table" assumes
//! nothing has been installed yet).

use std::os::raw::c_int;

use reactor_signal_core::error::LockCallbackError;
use reactor_signal_core::locking::{
    set_lock_callbacks, LockCallbacks, RawLock, LOCKTYPE_RECURSIVE, LOCK_API_VERSION,
};

unsafe extern "C" fn alloc_a(_locktype: u32) -> RawLock {
    // Must hand back a real, non-null handle: `set_lock_callbacks` bootstraps the
    // reactor's own process-wide lock slot on first install (§4.5), and a null
    // handle there is treated as a bootstrap failure.
    Box::into_raw(Box::new(0u8)) as RawLock
}
unsafe extern "C" fn free_a(lock: RawLock, _locktype: u32) {
    drop(unsafe { Box::from_raw(lock as *mut u8) });
}
unsafe extern "C" fn lock_a(_mode: u32, _lock: RawLock) -> c_int {
    0
}
unsafe extern "C" fn unlock_a(_mode: u32, _lock: RawLock) -> c_int {
    0
}

unsafe extern "C" fn alloc_b(_locktype: u32) -> RawLock {
    std::ptr::null_mut()
}

fn table_a() -> LockCallbacks {
    LockCallbacks {
        api_version: LOCK_API_VERSION,
        supported_locktypes: LOCKTYPE_RECURSIVE,
        alloc: Some(alloc_a),
        free: Some(free_a),
        lock: Some(lock_a),
        unlock: Some(unlock_a),
    }
}

#[test]
fn lock_callback_install_semantics() {
    // Nothing installed yet: an incomplete table is rejected outright.
    let incomplete = LockCallbacks {
        alloc: Some(alloc_a),
        free: None,
        ..table_a()
    };
    assert!(matches!(
        set_lock_callbacks(Some(incomplete)),
        Err(LockCallbackError::IncompleteLockTable)
    ));

    // Still nothing installed: a complete table with the wrong API version is rejected.
    let mut wrong_version = table_a();
    wrong_version.api_version = LOCK_API_VERSION + 1;
    assert!(matches!(
        set_lock_callbacks(Some(wrong_version)),
        Err(LockCallbackError::UnsupportedLockApiVersion(v)) if v == LOCK_API_VERSION + 1
    ));

    // First real install succeeds.
    set_lock_callbacks(Some(table_a())).expect("first install should succeed");

    // Installing the exact same table again is a silent no-op (P7 happy path).
    set_lock_callbacks(Some(table_a())).expect("bit-identical reinstall should be a no-op");

    // Installing a table that differs in any field is rejected once one is active.
    let mut different = table_a();
    different.alloc = Some(alloc_b);
    assert!(matches!(
        set_lock_callbacks(Some(different)),
        Err(LockCallbackError::LockAlreadyInstalled)
    ));

    // The rejected install left state untouched: the original table is still active
    // and still installs as a no-op.
    set_lock_callbacks(Some(table_a())).expect("original table must still be in effect");
}
