// SPDX-License-Identifier: Apache-2.0

//! The anonymous, nonblocking self-pipe used by both the signal bridge and the
//! cross-thread notifier, equivalent to libevent's `evutil_make_internal_pipe_` /
//! `evutil_socketpair`. On POSIX this is a real `AF_UNIX` `SOCK_STREAM` socketpair; on
//! Windows, where no anonymous socketpair exists, it's a loopback TCP connection
//! (the same trick libevent's own `evutil_socketpair` win32 fallback uses).

use std::io;

#[cfg(unix)]
pub use unix_impl::*;
#[cfg(windows)]
pub use windows_impl::*;

#[cfg(unix)]
mod unix_impl {
    use super::io;
    use std::os::fd::{AsRawFd, OwnedFd, RawFd};

    use nix::sys::socket::{self, AddressFamily, SockFlag, SockType};

    /// Platform-native raw descriptor for a pipe end, usable with [`nix::poll`] or any
    /// other readiness-based demultiplexer a reactor already has.
    pub type PipeRaw = RawFd;

    /// One end of a self-pipe.
    pub struct PipeEnd(OwnedFd);

    impl PipeEnd {
        pub fn raw(&self) -> PipeRaw {
            self.0.as_raw_fd()
        }

        /// Writes a single byte, non-blocking. Async-signal-safe: a thin wrapper over
        /// `send(2)`, no allocation.
        pub fn send_byte(&self, byte: u8) -> io::Result<usize> {
            let n = unsafe { libc::send(self.raw(), (&byte as *const u8).cast(), 1, 0) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        /// Drains up to `buf.len()` bytes, non-blocking.
        pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let n = unsafe { libc::recv(self.raw(), buf.as_mut_ptr().cast(), buf.len(), 0) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }
    }

    /// Creates a nonblocking, close-on-exec `AF_UNIX` `SOCK_STREAM` pair: `(read, write)`.
    pub fn create_pair() -> io::Result<(PipeEnd, PipeEnd)> {
        let (rx, tx) = socket::socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        )
        .map_err(io::Error::from)?;
        Ok((PipeEnd(rx), PipeEnd(tx)))
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::io;
    use std::net::{TcpListener, TcpStream};
    use std::os::windows::io::{AsRawSocket, RawSocket};

    use windows_sys::Win32::Networking::WinSock::{recv, send, SEND_RECV_FLAGS};

    /// Platform-native raw descriptor for a pipe end (a Winsock `SOCKET`, widened for
    /// portability the same way the upstream C code widens an `evutil_socket_t`).
    pub type PipeRaw = RawSocket;

    /// One end of a self-pipe, backed by a loopback TCP connection: Windows has no
    /// anonymous `socketpair()`, so a listener is bound on `127.0.0.1:0`, a second
    /// socket connects to it, and the accepted peer is handed back as the other end.
    pub struct PipeEnd(TcpStream);

    impl PipeEnd {
        pub fn raw(&self) -> PipeRaw {
            self.0.as_raw_socket()
        }

        /// Writes a single byte, non-blocking. Calls the raw Winsock `send` directly
        /// (rather than `std::net`'s `Write` impl) so the handler-reinstall path in
        /// [`crate::signal`] stays a thin FFI call with no hidden allocation.
        pub fn send_byte(&self, byte: u8) -> io::Result<usize> {
            let n = unsafe {
                send(
                    self.raw() as usize,
                    &byte as *const u8,
                    1,
                    SEND_RECV_FLAGS(0),
                )
            };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let n = unsafe {
                recv(
                    self.raw() as usize,
                    buf.as_mut_ptr(),
                    buf.len() as i32,
                    SEND_RECV_FLAGS(0),
                )
            };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }
    }

    pub fn create_pair() -> io::Result<(PipeEnd, PipeEnd)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let write_half = TcpStream::connect(addr)?;
        let (read_half, _) = listener.accept()?;
        write_half.set_nonblocking(true)?;
        read_half.set_nonblocking(true)?;
        write_half.set_nodelay(true)?;
        Ok((PipeEnd(read_half), PipeEnd(write_half)))
    }
}
