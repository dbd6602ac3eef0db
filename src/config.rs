// SPDX-License-Identifier: Apache-2.0

//! Configuration for a [`crate::signal::SignalBridge`], following the
//! builder-with-validation shape used across this crate's lineage (see
//! `CrashtrackerConfiguration` in the upstream crash-reporting crate this code is
//! descended from).

use crate::error::ConfigError;
use crate::signal::NSIG;

pub const MIN_DRAIN_BUFFER_SIZE: usize = 64;
const DEFAULT_DRAIN_BUFFER_SIZE: usize = 1024;

/// Which signals a bridge is willing to [`crate::signal::SignalBridge::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalAllowList {
    /// Every signal in `0..NSIG` may be registered. The default: the reference
    /// implementation never restricts which signals a reactor can catch.
    Any,
    /// Only signals in this explicit set may be registered; attempting any other
    /// returns [`crate::error::SignalBridgeError::SignalNotAllowed`] without touching
    /// OS state.
    Only(Vec<i32>),
}

impl SignalAllowList {
    fn permits(&self, signum: i32) -> bool {
        match self {
            SignalAllowList::Any => true,
            SignalAllowList::Only(signals) => signals.contains(&signum),
        }
    }
}

/// Tunables for a signal bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    drain_buffer_size: usize,
    allow_list: SignalAllowList,
    enable_lock_debugging: bool,
}

impl BridgeConfig {
    /// Starts building a [`BridgeConfig`] with default values.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// The number of bytes read from the self-pipe per `recv` call while draining.
    pub fn drain_buffer_size(&self) -> usize {
        self.drain_buffer_size
    }

    /// Whether `signum` may be registered under this configuration.
    pub fn allows_signal(&self, signum: i32) -> bool {
        self.allow_list.permits(signum)
    }

    /// Whether this bridge should call [`crate::locking::enable_lock_debugging`] as
    /// part of [`crate::signal::SignalBridge::init`].
    pub fn enable_lock_debugging(&self) -> bool {
        self.enable_lock_debugging
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            drain_buffer_size: DEFAULT_DRAIN_BUFFER_SIZE,
            allow_list: SignalAllowList::Any,
            enable_lock_debugging: false,
        }
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default, Clone)]
pub struct BridgeConfigBuilder {
    drain_buffer_size: Option<usize>,
    allow_list: Option<SignalAllowList>,
    enable_lock_debugging: bool,
}

impl BridgeConfigBuilder {
    /// Overrides the self-pipe drain buffer size. Must be at least
    /// [`MIN_DRAIN_BUFFER_SIZE`] bytes so a single `recv` can always make progress
    /// against a burst of distinct signals.
    pub fn drain_buffer_size(mut self, bytes: usize) -> Self {
        self.drain_buffer_size = Some(bytes);
        self
    }

    /// Restricts which signals this bridge will register for. Defaults to
    /// [`SignalAllowList::Any`].
    pub fn allow_list(mut self, allow_list: SignalAllowList) -> Self {
        self.allow_list = Some(allow_list);
        self
    }

    /// Enables runtime lock-discipline assertions ([`crate::locking::enable_lock_debugging`])
    /// as soon as this bridge is initialized.
    pub fn enable_lock_debugging(mut self, enabled: bool) -> Self {
        self.enable_lock_debugging = enabled;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        let drain_buffer_size = self.drain_buffer_size.unwrap_or(DEFAULT_DRAIN_BUFFER_SIZE);
        if drain_buffer_size < MIN_DRAIN_BUFFER_SIZE {
            return Err(ConfigError::DrainBufferTooSmall(drain_buffer_size));
        }
        if let Some(SignalAllowList::Only(signals)) = &self.allow_list {
            for &signum in signals {
                if signum < 0 || signum as usize >= NSIG {
                    return Err(ConfigError::SignalOutOfRange(signum));
                }
            }
        }
        Ok(BridgeConfig {
            drain_buffer_size,
            allow_list: self.allow_list.unwrap_or(SignalAllowList::Any),
            enable_lock_debugging: self.enable_lock_debugging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = BridgeConfig::builder().build().unwrap();
        assert_eq!(cfg.drain_buffer_size(), DEFAULT_DRAIN_BUFFER_SIZE);
    }

    #[test]
    fn rejects_too_small_drain_buffer() {
        let err = BridgeConfig::builder().drain_buffer_size(1).build().unwrap_err();
        assert!(matches!(err, ConfigError::DrainBufferTooSmall(1)));
    }

    #[test]
    fn default_allow_list_permits_everything() {
        let cfg = BridgeConfig::builder().build().unwrap();
        assert!(cfg.allows_signal(0));
        assert!(cfg.allows_signal(NSIG as i32 - 1));
    }

    #[test]
    fn explicit_allow_list_restricts_signals() {
        let cfg = BridgeConfig::builder()
            .allow_list(SignalAllowList::Only(vec![2, 15]))
            .build()
            .unwrap();
        assert!(cfg.allows_signal(2));
        assert!(cfg.allows_signal(15));
        assert!(!cfg.allows_signal(9));
    }

    #[test]
    fn rejects_out_of_range_signal_in_allow_list() {
        let err = BridgeConfig::builder()
            .allow_list(SignalAllowList::Only(vec![NSIG as i32]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::SignalOutOfRange(n) if n == NSIG as i32));
    }

    #[test]
    fn enable_lock_debugging_flag_defaults_off() {
        let cfg = BridgeConfig::builder().build().unwrap();
        assert!(!cfg.enable_lock_debugging());
        let cfg = BridgeConfig::builder().enable_lock_debugging(true).build().unwrap();
        assert!(cfg.enable_lock_debugging());
    }
}
