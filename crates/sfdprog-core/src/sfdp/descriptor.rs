//! Device descriptor
//!
//! The normalized geometry of the attached chip. The decoder fills it in
//! once during initialization; everything after that only reads it.

use heapless::Vec;

use super::types::*;
use crate::spi::opcodes;

/// Maximum number of erase types a basic table can describe
pub const MAX_ERASE_TYPES: usize = 4;

/// Page size used when the table does not give one
pub const DEFAULT_PAGE_SIZE: u32 = 256;

/// Raw JEDEC identification bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JedecId {
    /// Manufacturer ID
    pub manufacturer: u8,
    /// Memory type
    pub memory_type: u8,
    /// Capacity ID
    pub capacity: u8,
}

impl JedecId {
    /// Build from the 3-byte RDID response
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            manufacturer: bytes[0],
            memory_type: bytes[1],
            capacity: bytes[2],
        }
    }

    /// Device ID as a 16-bit value (type << 8 | capacity)
    pub const fn device(&self) -> u16 {
        ((self.memory_type as u16) << 8) | self.capacity as u16
    }

    /// All-zero or all-one response: nothing drove the bus
    pub const fn is_absent(&self) -> bool {
        let all = [self.manufacturer, self.memory_type, self.capacity];
        (all[0] == 0x00 && all[1] == 0x00 && all[2] == 0x00)
            || (all[0] == 0xFF && all[1] == 0xFF && all[2] == 0xFF)
    }
}

impl core::fmt::Display for JedecId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X}",
            self.manufacturer, self.memory_type, self.capacity
        )
    }
}

/// Geometry and capabilities of one flash chip
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    /// JEDEC identification (informational)
    pub jedec: JedecId,
    /// SFDP revision from the signature header
    pub revision: SfdpRevision,
    /// True once a full SFDP decode succeeded
    pub available: bool,
    /// Program granularity
    pub write_granularity: WriteGranularity,
    /// 4 KiB erase opcode, if the device supports it
    pub erase_4k: Option<u8>,
    /// Erase types, smallest first
    pub erasers: Vec<EraseType, MAX_ERASE_TYPES>,
    /// Addressing mode
    pub address_mode: AddressMode,
    /// Capacity in bytes; 0 when unknown
    pub capacity: u32,
    /// Page size in bytes
    pub page_size: u32,
    /// Status register volatility
    pub status_register: StatusRegister,
    /// Multi-I/O read support (not used for programming)
    pub fast_reads: FastReads,
    /// Maximum operation times, when the table gives them
    pub timings: DeviceTimings,
}

impl DeviceDescriptor {
    /// Descriptor for a chip that answered JEDEC ID but has no SFDP
    ///
    /// Uses the settings every legacy SPI NOR understands: 3-byte
    /// addressing, 256-byte pages and a 4 KiB sector erase with 0x20.
    /// Capacity is left unknown, so no upper bound is enforced.
    pub fn legacy(jedec: JedecId) -> Self {
        let mut erasers = Vec::new();
        // Capacity 4 always fits
        let _ = erasers.push(EraseType::new(4096, opcodes::SE_20));
        Self {
            jedec,
            available: false,
            erase_4k: Some(opcodes::SE_20),
            erasers,
            page_size: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    /// Smallest erase granule (first entry of the sorted list)
    pub fn smallest_eraser(&self) -> Option<&EraseType> {
        self.erasers.first()
    }

    /// Opcode for a volatile status register write enable
    pub fn volatile_write_enable(&self) -> u8 {
        self.status_register.volatile_write_enable()
    }

    /// True if the capacity is known
    pub fn has_capacity(&self) -> bool {
        self.capacity != 0
    }

    /// True if 32-bit addresses are needed to reach the whole chip
    pub fn needs_4byte_addressing(&self) -> bool {
        self.address_mode.requires_4byte()
            || (self.address_mode.supports_4byte() && self.capacity > 1 << 24)
    }
}
