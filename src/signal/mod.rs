// SPDX-License-Identifier: Apache-2.0

//! The signal bridge: turns async-signal-unsafe OS signal delivery into race-free
//! reactor events via a self-pipe, equivalent to libevent's `evsig_*` family.

mod bridge;
#[cfg(unix)]
mod handler;
#[cfg(windows)]
#[path = "handler_windows.rs"]
mod handler;

pub use bridge::SignalBridge;

use std::os::raw::c_int;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

/// Highest signal number this platform raises, plus one. Linux is the widest common
/// target at 64 real-time signals plus the standard ones; other platforms' signal
/// numbers all fall within this range too.
pub const NSIG: usize = 65;

/// The previously-installed OS disposition a [`SignalBridge`] must restore on
/// `unregister`/teardown: a full `sigaction` struct on POSIX, a bare handler function
/// value on Windows (ANSI C `signal()` has nothing richer to save).
#[cfg(unix)]
pub(crate) type SavedHandler = nix::sys::signal::SigAction;
#[cfg(windows)]
pub(crate) type SavedHandler = libc::sighandler_t;

/// Process-wide state tracking which [`SignalBridge`] currently "owns" OS signal
/// delivery. Only one bridge receives signals at a time: installing a handler from a
/// second bridge silently steals ownership, logging a warning, rather than delivering
/// to both (libevent's "last reactor to add a signal wins" behavior).
static OWNER_ID: AtomicU64 = AtomicU64::new(0);
static OWNER_SIGNALS_ADDED: AtomicU32 = AtomicU32::new(0);

/// Write end of the current owner's self-pipe, widened to `i64` so it can hold either
/// a POSIX file descriptor or a Windows `SOCKET` (`usize`-sized) the same way the
/// upstream C code widens an fd into a pointer-sized `evutil_socket_t`. This is the
/// *only* process state the async-signal-safe handler touches: a plain relaxed atomic
/// load, no locks, no allocation.
static OWNER_PIPE_TX: AtomicI64 = AtomicI64::new(-1);

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

/// Guards compound updates to the owner bookkeeping above. The handler itself never
/// touches this lock; only `register`/`unregister`/`dealloc` do. This is the same
/// process-wide slot [`crate::locking::set_lock_callbacks`] and
/// [`crate::locking::enable_lock_debugging`] (re)build — not a private copy — so the
/// bridge is actually protected by whatever backend the embedder installed.
pub(crate) use crate::locking::bootstrap::GLOBAL_SIG_LOCK;

fn next_bridge_id() -> u64 {
    NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed)
}

const NO_OWNER_MSG: &[u8] = b"reactor-signal-core: signal delivered with no bridge registered\n";

#[cfg(unix)]
mod handler_impl {
    use super::*;

    /// The OS-installed signal handler. Must remain async-signal-safe: no allocation,
    /// no locking, no logging machinery, nothing beyond atomic loads and `send(2)`.
    pub(crate) extern "C" fn bridge_handler(signum: c_int) {
        let saved_errno = errno::errno();
        let fd = OWNER_PIPE_TX.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = signum as u8;
            unsafe {
                libc::send(fd as i32, (&byte as *const u8).cast(), 1, 0);
            }
        } else {
            unsafe {
                libc::write(2, NO_OWNER_MSG.as_ptr().cast(), NO_OWNER_MSG.len());
            }
        }
        errno::set_errno(saved_errno);
    }
}

#[cfg(windows)]
mod handler_impl {
    use super::*;

    /// The Windows ANSI-C signal handler. `signal()` semantics reset the disposition
    /// to default on every delivery, so the first thing this does is reinstall itself
    /// (matching libevent's Windows `evsig_handler_` path) before touching the pipe.
    pub(crate) extern "C" fn bridge_handler(signum: c_int) {
        use windows_sys::Win32::Networking::WinSock::{
            send, WSAGetLastError, WSASetLastError, SEND_RECV_FLAGS,
        };

        unsafe {
            libc::signal(signum, bridge_handler as libc::sighandler_t);
        }
        let saved_wsa_errno = unsafe { WSAGetLastError() };
        let fd = OWNER_PIPE_TX.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = signum as u8;
            unsafe {
                send(fd as usize, &byte as *const u8, 1, SEND_RECV_FLAGS(0));
            }
        }
        unsafe { WSASetLastError(saved_wsa_errno) };
    }
}

pub(crate) use handler_impl::bridge_handler;
