// SPDX-License-Identifier: Apache-2.0

//! Signal-delivery core and pluggable threading primitives for an event-driven I/O
//! reactor.
//!
//! This crate provides two collaborating subsystems a reactor can embed:
//!
//! - [`signal`]: a self-pipe based bridge that turns async-signal-unsafe OS signal
//!   delivery into ordinary, race-free reactor events.
//! - [`locking`]: pluggable lock/condition/thread-id vtables an embedder installs once
//!   before running any reactor, plus a debug-mode wrapper that asserts locking
//!   discipline at runtime.
//!
//! Reactors integrate by implementing [`reactor::Reactor`].

pub mod config;
pub mod error;
pub mod locking;
pub mod notify;
mod pipe;
pub mod reactor;
pub mod signal;
#[cfg(unix)]
pub mod testing;

pub use config::BridgeConfig;
pub use reactor::{EventToken, Reactor};
pub use signal::SignalBridge;
