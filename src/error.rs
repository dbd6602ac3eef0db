// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::locking::{COND_API_VERSION, LOCK_API_VERSION};
use crate::signal::NSIG;

/// Errors returned while installing or using the pluggable lock/condition/thread-id callbacks.
#[derive(Debug, Error)]
pub enum LockCallbackError {
    #[error("lock callback table declares API version {0}, expected {LOCK_API_VERSION}")]
    UnsupportedLockApiVersion(u32),
    #[error("condition callback table declares API version {0}, expected {COND_API_VERSION}")]
    UnsupportedCondApiVersion(u32),
    #[error("lock callback table is missing one or more of alloc/free/lock/unlock")]
    IncompleteLockTable,
    #[error("lock callbacks were already installed with a different table")]
    LockAlreadyInstalled,
    #[error("condition callbacks were already installed with a different table")]
    ConditionAlreadyInstalled,
    #[error("failed to bootstrap a process-wide lock slot")]
    BootstrapFailed,
}

/// Errors from the signal bridge backend (component E/F).
#[derive(Debug, Error)]
pub enum SignalBridgeError {
    #[error("signal number {0} is out of range for this platform (NSIG = {NSIG})")]
    SignalOutOfRange(i32),
    #[error("signal number {0} is not in this bridge's configured allow-list")]
    SignalNotAllowed(i32),
    #[error("failed to create the self-pipe socketpair: {0}")]
    SocketPairFailed(#[source] std::io::Error),
    #[error("failed to register the bridge event with the reactor: {0}")]
    EventRegistrationFailed(#[source] std::io::Error),
    #[cfg(unix)]
    #[error("failed to install the OS signal handler for signal {signum}: {source}")]
    HandlerInstallFailed {
        signum: i32,
        #[source]
        source: nix::Error,
    },
    #[cfg(unix)]
    #[error("failed to restore the previous OS signal handler for signal {signum}: {source}")]
    HandlerRestoreFailed {
        signum: i32,
        #[source]
        source: nix::Error,
    },
    #[cfg(windows)]
    #[error("signal({signum}, ..) returned SIG_ERR while installing the bridge handler")]
    HandlerInstallFailedWindows { signum: i32 },
    #[cfg(windows)]
    #[error("signal({signum}, ..) returned SIG_ERR while restoring the prior handler")]
    HandlerRestoreFailedWindows { signum: i32 },
}

/// Errors from the cross-thread notification bootstrap (component G).
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to create the notification self-pipe: {0}")]
    SocketPairFailed(#[source] std::io::Error),
    #[error("failed to register the notification event with the reactor: {0}")]
    EventRegistrationFailed(#[source] std::io::Error),
}

/// Errors from building a [`crate::config::BridgeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("drain_buffer_size must be at least {min} bytes, got {0}", min = crate::config::MIN_DRAIN_BUFFER_SIZE)]
    DrainBufferTooSmall(usize),
    #[error("signal number {0} in allow-list is out of range for this platform (NSIG = {NSIG})")]
    SignalOutOfRange(i32),
}
