//! sfdprog-core - SFDP-driven SPI NOR flash loader core
//!
//! This crate discovers the geometry of an unknown SPI NOR flash through
//! JEDEC SFDP and uses it to erase, program and read the chip through a
//! command bus. It is designed to be `no_std` compatible so the same code
//! can run inside a target-side flash loader.
//!
//! Layers, bottom up:
//!
//! - [`bus`] - the command bus seam and the retry/transport adapter
//! - [`sfdp`] - the SFDP decoder and the device descriptor
//! - [`dispatch`] - the command sequence table and dispatcher
//! - [`flash`] - the public flash operation layer
//! - [`host`] - the two-valued debugger-host call contract
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`) and TOML
//!   configuration files
//! - `alloc` - Enable boxed command buses
//!
//! # Example
//!
//! ```ignore
//! use sfdprog_core::config::LoaderConfig;
//! use sfdprog_core::flash::{FlashLoader, SfdpFlashLoader};
//!
//! let mut loader = SfdpFlashLoader::new(my_bus, LoaderConfig::default());
//! loader.init()?;
//! loader.erase(0x6000_0000)?;
//! loader.write(0x6000_0000, &image)?;
//! loader.signoff()?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod flash;
pub mod host;
pub mod sfdp;
pub mod spi;

pub use error::{BusError, DecodeError, InitError, OpError};
