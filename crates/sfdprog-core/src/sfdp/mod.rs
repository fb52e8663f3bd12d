//! SFDP (Serial Flash Discoverable Parameters) discovery
//!
//! Reads the JEDEC JESD216 parameter area of the attached chip and turns
//! the Basic Flash Parameter Table into a [`DeviceDescriptor`].
//!
//! # Overview
//!
//! SFDP data is read with the RDSFDP command (0x5A) from a separate 24-bit
//! address space. Discovery only looks at:
//!
//! - the SFDP header at 0x00 (signature and revision)
//! - the first parameter header at 0x08, which always describes the
//!   basic table
//! - up to 20 DWORDs of the basic table itself
//!
//! Vendor tables and later JESD216 tables are not interpreted.
//!
//! # Usage
//!
//! ```ignore
//! use sfdprog_core::bus::RetryBus;
//! use sfdprog_core::config::RetryConfig;
//! use sfdprog_core::sfdp;
//!
//! let mut bus = RetryBus::new(my_bus, RetryConfig::default());
//! let desc = sfdp::decode(&mut bus)?;
//! println!("{} bytes, {} byte pages", desc.capacity, desc.page_size);
//! ```

mod descriptor;
mod parser;
mod table;
mod types;

pub use descriptor::*;
pub use parser::*;
pub use table::BasicParameterTable;
pub use types::*;
