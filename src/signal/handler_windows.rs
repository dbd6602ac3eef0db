// SPDX-License-Identifier: Apache-2.0

//! Windows ANSI-C `signal()`-based handler install/restore, the fallback path
//! libevent itself falls back to when `sigaction` is unavailable. There is no
//! `sigaction`-equivalent struct to save here: the only state `signal()` hands back
//! is the previously-installed handler value itself.

use super::{bridge_handler, NSIG};
use crate::error::SignalBridgeError;

fn check_range(signum: i32) -> Result<(), SignalBridgeError> {
    if signum < 0 || signum as usize >= NSIG {
        return Err(SignalBridgeError::SignalOutOfRange(signum));
    }
    Ok(())
}

/// Installs `bridge_handler` for `signum` via `signal(2)` and returns the previous
/// handler value so it can be restored later.
pub(crate) fn install_handler(signum: i32) -> Result<libc::sighandler_t, SignalBridgeError> {
    check_range(signum)?;
    let previous = unsafe { libc::signal(signum, bridge_handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(SignalBridgeError::HandlerInstallFailedWindows { signum });
    }
    Ok(previous)
}

/// Restores a previously-saved handler value, undoing [`install_handler`].
pub(crate) fn restore_handler(
    signum: i32,
    previous: libc::sighandler_t,
) -> Result<(), SignalBridgeError> {
    check_range(signum)?;
    let result = unsafe { libc::signal(signum, previous) };
    if result == libc::SIG_ERR {
        return Err(SignalBridgeError::HandlerRestoreFailedWindows { signum });
    }
    Ok(())
}
