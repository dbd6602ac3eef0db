// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

//! End-to-end tests driving real OS signal delivery (`raise(2)`) through
//! [`reactor_signal_core::SignalBridge`] and a [`reactor_signal_core::testing::ToyReactor`],
//! the way the upstream crash-tracking crate's `bin_tests` prefer real signals over mocks.
//!
//! These tests mutate process-wide signal/lock state, so they run serialized via
//! `serial_test` rather than relying on cargo's default parallel test execution.

use std::time::Duration;

use reactor_signal_core::config::BridgeConfig;
use reactor_signal_core::testing::ToyReactor;
use reactor_signal_core::SignalBridge;
use serial_test::serial;

fn raise(signum: i32) {
    unsafe {
        libc::raise(signum);
    }
}

/// Routes this crate's `tracing` warnings (ownership steals, rejected callback
/// installs, ...) to the test harness's captured output instead of discarding them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
#[serial]
fn delivers_a_single_signal_to_the_reactor() {
    init_tracing();
    let reactor = ToyReactor::new();
    let bridge = SignalBridge::init(reactor.clone(), BridgeConfig::default()).unwrap();
    bridge.register(libc::SIGUSR1).unwrap();

    raise(libc::SIGUSR1);
    reactor.run_once(Duration::from_millis(200)).unwrap();

    assert_eq!(reactor.activations_for(libc::SIGUSR1), 1);
    bridge.unregister(libc::SIGUSR1).unwrap();
}

#[test]
#[serial]
fn counts_a_burst_of_the_same_signal() {
    let reactor = ToyReactor::new();
    let bridge = SignalBridge::init(reactor.clone(), BridgeConfig::default()).unwrap();
    bridge.register(libc::SIGUSR2).unwrap();

    for _ in 0..50 {
        raise(libc::SIGUSR2);
    }
    reactor.run_once(Duration::from_millis(200)).unwrap();

    let count = reactor.activations_for(libc::SIGUSR2);
    assert!(count > 0, "expected at least one activation, got {count}");
    assert!(count <= 50, "expected at most 50 activations, got {count}");

    bridge.unregister(libc::SIGUSR2).unwrap();
}

#[test]
#[serial]
fn unregister_restores_the_prior_disposition_and_stops_delivery() {
    let reactor = ToyReactor::new();
    let bridge = SignalBridge::init(reactor.clone(), BridgeConfig::default()).unwrap();
    bridge.register(libc::SIGUSR1).unwrap();
    bridge.unregister(libc::SIGUSR1).unwrap();

    raise(libc::SIGUSR1);
    reactor.run_once(Duration::from_millis(100)).unwrap();

    assert_eq!(reactor.activations_for(libc::SIGUSR1), 0);
}

#[test]
#[serial]
fn teardown_restores_a_prior_ignore_disposition() {
    unsafe {
        let ignore = nix::sys::signal::SigAction::new(
            nix::sys::signal::SigHandler::SigIgn,
            nix::sys::signal::SaFlags::empty(),
            nix::sys::signal::SigSet::empty(),
        );
        nix::sys::signal::sigaction(nix::sys::signal::Signal::SIGINT, &ignore).unwrap();
    }

    let reactor = ToyReactor::new();
    let bridge = SignalBridge::init(reactor.clone(), BridgeConfig::default()).unwrap();
    bridge.register(libc::SIGINT).unwrap();
    bridge.dealloc().unwrap();

    let current = unsafe {
        nix::sys::signal::sigaction(
            nix::sys::signal::Signal::SIGINT,
            &nix::sys::signal::SigAction::new(
                nix::sys::signal::SigHandler::SigIgn,
                nix::sys::signal::SaFlags::empty(),
                nix::sys::signal::SigSet::empty(),
            ),
        )
        .unwrap()
    };
    assert_eq!(current.handler(), nix::sys::signal::SigHandler::SigIgn);
}

#[test]
#[serial]
fn second_reactor_steals_ownership_from_the_first() {
    init_tracing();
    let reactor_a = ToyReactor::new();
    let bridge_a = SignalBridge::init(reactor_a.clone(), BridgeConfig::default()).unwrap();
    bridge_a.register(libc::SIGHUP).unwrap();

    let reactor_b = ToyReactor::new();
    let bridge_b = SignalBridge::init(reactor_b.clone(), BridgeConfig::default()).unwrap();
    bridge_b.register(libc::SIGTERM).unwrap();

    raise(libc::SIGTERM);
    reactor_b.run_once(Duration::from_millis(200)).unwrap();
    reactor_a.run_once(Duration::from_millis(50)).unwrap();

    assert_eq!(reactor_b.activations_for(libc::SIGTERM), 1);
    assert_eq!(reactor_a.activations_for(libc::SIGHUP), 0);

    bridge_a.unregister(libc::SIGHUP).unwrap();
    bridge_b.unregister(libc::SIGTERM).unwrap();
}

#[test]
#[serial]
fn allow_list_rejects_signals_outside_it() {
    let reactor = ToyReactor::new();
    let config = BridgeConfig::builder()
        .allow_list(reactor_signal_core::config::SignalAllowList::Only(vec![
            libc::SIGUSR1,
        ]))
        .build()
        .unwrap();
    let bridge = SignalBridge::init(reactor, config).unwrap();

    let err = bridge.register(libc::SIGUSR2).unwrap_err();
    assert!(matches!(
        err,
        reactor_signal_core::error::SignalBridgeError::SignalNotAllowed(s) if s == libc::SIGUSR2
    ));
}
