// SPDX-License-Identifier: Apache-2.0

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;

use super::handler::{install_handler, restore_handler};
use super::{
    next_bridge_id, SavedHandler, GLOBAL_SIG_LOCK, NSIG, OWNER_ID, OWNER_PIPE_TX,
    OWNER_SIGNALS_ADDED,
};
use crate::config::BridgeConfig;
use crate::error::SignalBridgeError;
use crate::pipe::{self, PipeEnd};
use crate::reactor::{EventToken, Reactor};

/// Turns OS signal delivery into reactor events. One bridge is typically created per
/// reactor instance; at most one bridge process-wide actually receives signals at a
/// time (see the module-level owner bookkeeping), matching libevent's single-base
/// signal handling model.
pub struct SignalBridge<R: Reactor> {
    id: u64,
    reactor: Arc<R>,
    pipe_tx: PipeEnd,
    pipe_rx: PipeEnd,
    bridge_token: EventToken,
    bridge_installed: AtomicBool,
    saved_handlers: Mutex<Vec<Option<SavedHandler>>>,
    signals_added: AtomicU32,
    config: BridgeConfig,
}

impl<R: Reactor> SignalBridge<R> {
    /// Creates a bridge bound to `reactor`: opens the self-pipe and assigns (but does
    /// not yet add) its read side as an internal event. No signal handlers are
    /// installed and no OS resources beyond the pipe itself are touched until the
    /// first call to [`SignalBridge::register`].
    pub fn init(reactor: Arc<R>, config: BridgeConfig) -> Result<Arc<Self>, SignalBridgeError> {
        if config.enable_lock_debugging() {
            crate::locking::enable_lock_debugging();
        }
        let (pipe_rx, pipe_tx) = pipe::create_pair().map_err(SignalBridgeError::SocketPairFailed)?;
        let id = next_bridge_id();
        let rx = pipe_rx.raw();

        let bridge = Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let token = reactor.assign_internal_event(
                rx,
                0,
                Arc::new(move || {
                    if let Some(bridge) = weak.upgrade() {
                        bridge.drain_and_dispatch();
                    }
                }),
            );
            Self {
                id,
                reactor,
                pipe_tx,
                pipe_rx,
                bridge_token: token,
                bridge_installed: AtomicBool::new(false),
                saved_handlers: Mutex::new(Vec::new()),
                signals_added: AtomicU32::new(0),
                config,
            }
        });
        Ok(bridge)
    }

    /// Starts delivering `signum` to this bridge: installs the OS handler (saving
    /// whatever was previously installed), claims process-wide signal ownership, and
    /// lazily adds the bridge's read event to the reactor on first use.
    pub fn register(&self, signum: i32) -> Result<(), SignalBridgeError> {
        if signum < 0 || signum as usize >= NSIG {
            return Err(SignalBridgeError::SignalOutOfRange(signum));
        }
        if !self.config.allows_signal(signum) {
            return Err(SignalBridgeError::SignalNotAllowed(signum));
        }

        GLOBAL_SIG_LOCK.with_lock(|| {
            let prev_owner = OWNER_ID.load(Ordering::SeqCst);
            let prev_added = OWNER_SIGNALS_ADDED.load(Ordering::SeqCst);
            if prev_owner != 0 && prev_owner != self.id && prev_added > 0 {
                tracing::warn!(
                    signal = signum,
                    "a different reactor already owns signal delivery; it will stop \
                     receiving signals now that this one is registering one"
                );
            }
            OWNER_ID.store(self.id, Ordering::SeqCst);
            OWNER_SIGNALS_ADDED.fetch_add(1, Ordering::SeqCst);
            OWNER_PIPE_TX.store(self.pipe_tx.raw() as i64, Ordering::SeqCst);
        });
        self.signals_added.fetch_add(1, Ordering::SeqCst);

        let previous = match install_handler(signum) {
            Ok(previous) => previous,
            Err(e) => {
                self.rollback_registration();
                return Err(e);
            }
        };
        self.store_saved_handler(signum, previous);

        if !self.bridge_installed.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.reactor.add_event(self.bridge_token) {
                self.bridge_installed.store(false, Ordering::SeqCst);
                if let Err(rollback_err) = self.unwind_failed_add_event(signum) {
                    tracing::error!(
                        signal = signum,
                        error = %rollback_err,
                        "registration rollback did not fully restore prior state"
                    );
                }
                self.rollback_registration();
                return Err(SignalBridgeError::EventRegistrationFailed(e));
            }
        }
        Ok(())
    }

    /// Stops delivering `signum` to this bridge and restores whatever handler was
    /// installed before [`SignalBridge::register`].
    pub fn unregister(&self, signum: i32) -> Result<(), SignalBridgeError> {
        if signum < 0 || signum as usize >= NSIG {
            return Err(SignalBridgeError::SignalOutOfRange(signum));
        }
        self.rollback_registration();
        if let Some(previous) = self.take_saved_handler(signum) {
            restore_handler(signum, previous)?;
        }
        Ok(())
    }

    /// Tears the bridge down: removes its reactor event, restores every handler it
    /// still has installed, and releases process-wide signal ownership if it holds it.
    pub fn dealloc(&self) -> Result<(), SignalBridgeError> {
        if self.bridge_installed.swap(false, Ordering::SeqCst) {
            self.reactor
                .del_event(self.bridge_token)
                .map_err(SignalBridgeError::EventRegistrationFailed)?;
        }
        {
            let mut handlers = self.saved_handlers.lock().unwrap_or_else(|p| p.into_inner());
            for (signum, slot) in handlers.iter_mut().enumerate() {
                if let Some(previous) = slot.take() {
                    if let Err(e) = restore_handler(signum as i32, previous) {
                        tracing::error!(signal = signum, error = %e, "failed to restore signal handler during teardown");
                    }
                }
            }
        }
        GLOBAL_SIG_LOCK.with_lock(|| {
            if OWNER_ID.load(Ordering::SeqCst) == self.id {
                OWNER_ID.store(0, Ordering::SeqCst);
                OWNER_SIGNALS_ADDED.store(0, Ordering::SeqCst);
                OWNER_PIPE_TX.store(-1, Ordering::SeqCst);
            }
        });
        Ok(())
    }

    /// Unwinds the OS-handler side of a registration after the reactor rejected
    /// [`Reactor::add_event`], restoring whichever prior disposition was saved.
    /// Aggregates the single fallible step here under one `anyhow::Context` so the
    /// caller gets one diagnostic line instead of threading a second typed error
    /// variant through a rollback path that only ever runs on an already-failing call.
    fn unwind_failed_add_event(&self, signum: i32) -> anyhow::Result<()> {
        if let Some(previous) = self.take_saved_handler(signum) {
            restore_handler(signum, previous)
                .with_context(|| format!("restoring prior disposition for signal {signum}"))?;
        }
        Ok(())
    }

    fn rollback_registration(&self) {
        self.signals_added.fetch_sub(1, Ordering::SeqCst);
        GLOBAL_SIG_LOCK.with_lock(|| {
            if OWNER_ID.load(Ordering::SeqCst) == self.id {
                OWNER_SIGNALS_ADDED.fetch_sub(1, Ordering::SeqCst);
            }
        });
    }

    fn store_saved_handler(&self, signum: i32, previous: SavedHandler) {
        let mut handlers = self.saved_handlers.lock().unwrap_or_else(|p| p.into_inner());
        if handlers.len() <= signum as usize {
            handlers.resize(signum as usize + 1, None);
        }
        handlers[signum as usize] = Some(previous);
    }

    fn take_saved_handler(&self, signum: i32) -> Option<SavedHandler> {
        let mut handlers = self.saved_handlers.lock().unwrap_or_else(|p| p.into_inner());
        handlers.get_mut(signum as usize).and_then(Option::take)
    }

    /// Drains the self-pipe, counting occurrences of each signal, then reports them
    /// to the reactor under its own lock. Runs on the reactor's thread in response to
    /// the bridge's read event becoming readable; not called from the signal handler.
    fn drain_and_dispatch(&self) {
        let mut ncaught = [0u32; NSIG];
        let mut buf = vec![0u8; self.config.drain_buffer_size()];
        loop {
            match self.pipe_rx.recv(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &signum in &buf[..n] {
                        if (signum as usize) < NSIG {
                            ncaught[signum as usize] += 1;
                        }
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => break,
                Err(e) => {
                    tracing::error!(error = %e, "fatal error draining the signal self-pipe");
                    break;
                }
            }
        }

        self.reactor.lock();
        for (signum, &count) in ncaught.iter().enumerate() {
            if count > 0 {
                self.reactor.signal_active(signum as i32, count);
            }
        }
        self.reactor.unlock();
    }
}

impl<R: Reactor> Drop for SignalBridge<R> {
    fn drop(&mut self) {
        if let Err(e) = self.dealloc() {
            tracing::error!(error = %e, "failed to tear down signal bridge during drop");
        }
    }
}
