// SPDX-License-Identifier: Apache-2.0

//! The collaborator contract a reactor must implement to host the signal bridge and
//! cross-thread notifier. Deliberately small: this crate owns signal delivery and
//! locking primitives, not the event loop itself.

use std::io;
use std::sync::Arc;

pub use crate::pipe::PipeRaw;

/// Opaque handle to an event previously assigned with
/// [`Reactor::assign_internal_event`].
pub type EventToken = u64;

/// What a reactor must provide so [`crate::signal::SignalBridge`] and
/// [`crate::notify::Notifier`] can piggyback on its event loop.
///
/// `assign_internal_event` mirrors `event_assign`: it only prepares the event and
/// returns a token, without making it live. `add_event`/`del_event` mirror
/// `event_add`/`event_del`: they make a previously-assigned event live or pull it back
/// out, and may be called repeatedly (idempotently) on the same token.
pub trait Reactor: Send + Sync + 'static {
    /// Prepares a read-readiness event on `fd` at the given internal priority, to be
    /// dispatched by invoking `callback` whenever `fd` becomes readable. Does not make
    /// the event live; call [`Reactor::add_event`] for that.
    fn assign_internal_event(
        &self,
        fd: PipeRaw,
        priority: i32,
        callback: Arc<dyn Fn() + Send + Sync>,
    ) -> EventToken;

    /// Makes a previously-assigned event live.
    fn add_event(&self, token: EventToken) -> io::Result<()>;

    /// Removes a live event without discarding its assignment; it can be re-added.
    fn del_event(&self, token: EventToken) -> io::Result<()>;

    /// Reports that `count` instances of `signum` were caught since the last drain.
    /// Called with [`Reactor::lock`] held.
    fn signal_active(&self, signum: i32, count: u32);

    /// Acquires the reactor's own internal lock. Reentrant from the same thread.
    fn lock(&self);

    /// Releases the reactor's own internal lock.
    fn unlock(&self);
}
