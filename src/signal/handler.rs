// SPDX-License-Identifier: Apache-2.0

//! Thin wrapper over `sigaction(2)` for installing and restoring `bridge_handler`,
//! equivalent to libevent's `_evsig_set_handler`.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use super::{bridge_handler, NSIG};
use crate::error::SignalBridgeError;

fn signal_for(signum: i32) -> Result<Signal, SignalBridgeError> {
    if signum < 0 || signum as usize >= NSIG {
        return Err(SignalBridgeError::SignalOutOfRange(signum));
    }
    Signal::try_from(signum).map_err(|_| SignalBridgeError::SignalOutOfRange(signum))
}

/// Installs `bridge_handler` for `signum` and returns the previously-installed action
/// so it can be restored later. Installs with `SA_RESTART` and the full signal mask
/// blocked for the duration of the handler, matching libevent's `evsig_set_handler_`.
pub(crate) fn install_handler(signum: i32) -> Result<SigAction, SignalBridgeError> {
    let sig = signal_for(signum)?;
    let action = SigAction::new(
        SigHandler::Handler(bridge_handler),
        SaFlags::SA_RESTART,
        SigSet::all(),
    );
    unsafe { signal::sigaction(sig, &action) }
        .map_err(|source| SignalBridgeError::HandlerInstallFailed { signum, source })
}

/// Restores a previously-saved signal action, undoing [`install_handler`].
pub(crate) fn restore_handler(signum: i32, previous: SigAction) -> Result<(), SignalBridgeError> {
    let sig = signal_for(signum)?;
    unsafe { signal::sigaction(sig, &previous) }
        .map(|_| ())
        .map_err(|source| SignalBridgeError::HandlerRestoreFailed { signum, source })
}
