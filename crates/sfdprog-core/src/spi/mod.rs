//! SPI types and command structures
//!
//! This module provides the single-I/O command representation the
//! dispatcher hands to the bus, plus the standard JEDEC opcodes.

mod address;
mod command;
pub mod opcodes;

pub use address::AddressWidth;
pub use command::{SpiCommand, SFDP_DUMMY_CYCLES};
pub use opcodes::*;
