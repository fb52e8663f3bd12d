//! Loader configuration
//!
//! Timing and addressing knobs that differ between boards. Every field
//! has a default matching the i.MX RT FlexSPI setup, so a
//! `LoaderConfig::default()` is usable as-is. With the `std` feature the
//! configuration can also be read from a TOML file:
//!
//! ```toml
//! base_address = "0x60000000"
//!
//! [retry]
//! sfdp_read_delay_us = 100
//! poll_delay_us = 100
//! max_poll_attempts = 2000000
//!
//! [busy]
//! offset = 0
//! active_high = true
//! ```

#[cfg(feature = "std")]
mod toml;

#[cfg(feature = "std")]
pub use self::toml::ConfigError;

/// Start of the FlexSPI AHB window the flash is mapped at
pub const FLEXSPI_AHB_BASE: u32 = 0x6000_0000;

/// Delays and attempt budget of the retry/transport adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct RetryConfig {
    /// Settle time before every SFDP read, in microseconds
    pub sfdp_read_delay_us: u32,
    /// Wait between two status register polls, in microseconds
    pub poll_delay_us: u32,
    /// Upper bound on status polls for a single operation
    pub max_poll_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sfdp_read_delay_us: 100,
            poll_delay_us: 100,
            // 200 s at the default poll delay, enough for a large chip erase
            max_poll_attempts: 2_000_000,
        }
    }
}

/// Location and polarity of the busy flag in the status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct BusyBit {
    /// Bit index inside the status byte
    pub offset: u8,
    /// True if a set bit means busy
    pub active_high: bool,
}

impl Default for BusyBit {
    fn default() -> Self {
        Self {
            offset: 0,
            active_high: true,
        }
    }
}

impl BusyBit {
    /// Returns true if `status` reports an operation in progress
    pub const fn is_busy(&self, status: u8) -> bool {
        let set = status & (1u8 << (self.offset & 7)) != 0;
        set == self.active_high
    }
}

/// Complete loader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct LoaderConfig {
    /// Host address of flash offset 0
    #[cfg_attr(
        feature = "std",
        serde(deserialize_with = "crate::config::toml::deserialize_hex_u32")
    )]
    pub base_address: u32,
    /// Transport retry settings
    pub retry: RetryConfig,
    /// Busy flag definition
    pub busy: BusyBit,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_address: FLEXSPI_AHB_BASE,
            retry: RetryConfig::default(),
            busy: BusyBit::default(),
        }
    }
}
