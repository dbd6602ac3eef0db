// SPDX-License-Identifier: Apache-2.0

//! A minimal, real [`Reactor`] implementation used by this crate's own tests (and
//! available to integration tests under `tests/`) to drive actual signal delivery and
//! notification plumbing end to end, the way the upstream crash-reporting crate's
//! `bin_tests` harness drives real `SIGPIPE`/`SIGSEGV` delivery rather than mocking it.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::reactor::{EventToken, Reactor};

struct ToyEvent {
    token: EventToken,
    fd: RawFd,
    callback: Arc<dyn Fn() + Send + Sync>,
    added: bool,
}

/// A toy event loop: poll-based, single-threaded, good enough to exercise the signal
/// bridge and notifier without pulling in a real reactor crate.
pub struct ToyReactor {
    events: Mutex<Vec<ToyEvent>>,
    activations: Mutex<Vec<(i32, u32)>>,
    locked: AtomicBool,
    next_token: AtomicU64,
}

impl ToyReactor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            activations: Mutex::new(Vec::new()),
            locked: AtomicBool::new(false),
            next_token: AtomicU64::new(1),
        })
    }

    /// Polls every added event once, with `timeout`, and invokes the callback for
    /// each fd that became readable.
    pub fn run_once(&self, timeout: Duration) -> io::Result<()> {
        let events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        let mut fds: Vec<PollFd> = events
            .iter()
            .filter(|e| e.added)
            .map(|e| PollFd::new(unsafe { BorrowedFd::borrow_raw(e.fd) }, PollFlags::POLLIN))
            .collect();
        let callbacks: Vec<Arc<dyn Fn() + Send + Sync>> = events
            .iter()
            .filter(|e| e.added)
            .map(|e| e.callback.clone())
            .collect();
        drop(events);

        let timeout_ms = timeout.as_millis().min(65_000) as u16;
        let ready = poll(&mut fds, PollTimeout::from(timeout_ms)).map_err(io::Error::from)?;
        if ready <= 0 {
            return Ok(());
        }
        for (pfd, callback) in fds.iter().zip(callbacks.iter()) {
            if let Some(revents) = pfd.revents() {
                if revents.contains(PollFlags::POLLIN) {
                    callback();
                }
            }
        }
        Ok(())
    }

    /// Total activations recorded for `signum` since the last [`ToyReactor::take_activations`].
    pub fn activations_for(&self, signum: i32) -> u32 {
        self.activations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(s, _)| *s == signum)
            .map(|(_, c)| c)
            .sum()
    }

    /// Drains and returns every recorded `(signum, count)` activation.
    pub fn take_activations(&self) -> Vec<(i32, u32)> {
        std::mem::take(&mut *self.activations.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

impl Reactor for ToyReactor {
    fn assign_internal_event(
        &self,
        fd: RawFd,
        _priority: i32,
        callback: Arc<dyn Fn() + Send + Sync>,
    ) -> EventToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(ToyEvent { token, fd, callback, added: false });
        token
    }

    fn add_event(&self, token: EventToken) -> io::Result<()> {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(event) = events.iter_mut().find(|e| e.token == token) {
            event.added = true;
        }
        Ok(())
    }

    fn del_event(&self, token: EventToken) -> io::Result<()> {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(event) = events.iter_mut().find(|e| e.token == token) {
            event.added = false;
        }
        Ok(())
    }

    fn signal_active(&self, signum: i32, count: u32) {
        self.activations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((signum, count));
    }

    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}
