// SPDX-License-Identifier: Apache-2.0

//! Cross-thread wakeup for a reactor's own event loop, equivalent to libevent's
//! `evthread_make_base_notifiable`. A thread that mutates the reactor from outside its
//! own loop thread writes a byte to wake it up immediately rather than waiting out the
//! current poll timeout.

use std::io;
use std::sync::Arc;

use crate::error::NotifyError;
use crate::pipe::{self, PipeEnd};
use crate::reactor::{EventToken, Reactor};

/// A self-pipe dedicated to waking up a reactor's poll loop from another thread.
pub struct Notifier<R: Reactor> {
    _reactor: Arc<R>,
    write_end: PipeEnd,
    read_end: PipeEnd,
    _token: EventToken,
}

impl<R: Reactor> Notifier<R> {
    /// Installs a notification channel on `reactor`. Constructing more than one per
    /// reactor is harmless (each is an independent channel capable of waking the same
    /// loop) but wasteful; callers should keep the single instance they build.
    pub fn make_base_notifiable(reactor: Arc<R>) -> Result<Arc<Self>, NotifyError> {
        let (read_end, write_end) =
            pipe::create_pair().map_err(NotifyError::SocketPairFailed)?;

        let rx = read_end.raw();
        let notifier = Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let token = reactor.assign_internal_event(
                rx,
                0,
                Arc::new(move || {
                    if let Some(notifier) = weak.upgrade() {
                        notifier.drain();
                    }
                }),
            );
            Self {
                _reactor: reactor,
                write_end,
                read_end,
                _token: token,
            }
        });

        notifier
            ._reactor
            .add_event(notifier._token)
            .map_err(NotifyError::EventRegistrationFailed)?;
        Ok(notifier)
    }

    /// Wakes the reactor's loop. Safe to call from any thread.
    pub fn notify(&self) -> io::Result<()> {
        match self.write_end.send_byte(1) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // The loop is already going to wake up for a prior notification.
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 128];
        while matches!(self.read_end.recv(&mut buf), Ok(n) if n > 0) {}
    }
}
