//! SFDP type definitions
//!
//! Types representing SFDP structures as defined by JEDEC JESD216.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// SFDP signature magic value ("SFDP" in little-endian)
pub const SFDP_SIGNATURE: u32 = 0x50444653;

/// Highest SFDP major revision the decoder accepts
pub const SUPPORTED_MAX_MAJOR_REV: u8 = 2;

/// Address of the SFDP header in the SFDP space
pub const SFDP_HEADER_ADDR: u32 = 0x00;

/// Address of the mandatory basic parameter header
pub const BASIC_HEADER_ADDR: u32 = 0x08;

/// Minimum basic table length (JESD216 rev 1.0)
pub const BASIC_TABLE_MIN_DWORDS: usize = 9;

/// Number of basic table DWORDs read and kept
pub const BASIC_TABLE_MAX_DWORDS: usize = 20;

/// Basic Flash Parameter Table ID (MSB << 8 | LSB)
pub const PARAM_ID_BASIC: u16 = 0xFF00;

// ============================================================================
// Raw wire layouts
// ============================================================================

/// SFDP header as it sits at SFDP address 0x00
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RawSfdpHeader {
    /// "SFDP"
    pub signature: [u8; 4],
    /// Minor revision
    pub minor: u8,
    /// Major revision
    pub major: u8,
    /// Number of parameter headers, minus one
    pub nph: u8,
    /// Access protocol (0xFF for legacy)
    pub access_protocol: u8,
}

/// Parameter header as it sits at SFDP address 0x08 + 8n
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RawParameterHeader {
    /// Parameter ID LSB
    pub id_lsb: u8,
    /// Minor revision
    pub minor: u8,
    /// Major revision
    pub major: u8,
    /// Table length in DWORDs
    pub length_dwords: u8,
    /// 24-bit little-endian table pointer
    pub pointer: [u8; 3],
    /// Parameter ID MSB
    pub id_msb: u8,
}

// ============================================================================
// SFDP Revision
// ============================================================================

/// SFDP revision information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SfdpRevision {
    /// Major revision number
    pub major: u8,
    /// Minor revision number
    pub minor: u8,
}

impl SfdpRevision {
    /// Create a new revision
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Returns true if the major revision is one the decoder understands
    pub fn is_supported(&self) -> bool {
        self.major <= SUPPORTED_MAX_MAJOR_REV
    }

    /// JESD216 (original, 9 DWORDs)
    pub const JESD216: Self = Self::new(1, 0);
    /// JESD216B
    pub const JESD216B: Self = Self::new(1, 6);
}

impl core::fmt::Display for SfdpRevision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ============================================================================
// SFDP Header
// ============================================================================

/// SFDP header structure (first 8 bytes at address 0x00)
#[derive(Debug, Clone, Copy, Default)]
pub struct SfdpHeader {
    /// SFDP signature (should be 0x50444653)
    pub signature: u32,
    /// SFDP revision
    pub revision: SfdpRevision,
    /// Number of parameter headers (0-based, so actual count is nph + 1)
    pub nph: u8,
    /// Access protocol (0xFF for legacy)
    pub access_protocol: u8,
}

impl SfdpHeader {
    /// Parse SFDP header from raw bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        let raw: RawSfdpHeader = zerocopy::transmute!(*data);
        Self {
            signature: u32::from_le_bytes(raw.signature),
            revision: SfdpRevision::new(raw.major, raw.minor),
            nph: raw.nph,
            access_protocol: raw.access_protocol,
        }
    }

    /// Check if the signature is valid
    pub fn is_valid(&self) -> bool {
        self.signature == SFDP_SIGNATURE
    }

    /// Get the number of parameter headers
    pub fn num_param_headers(&self) -> usize {
        (self.nph as usize) + 1
    }
}

// ============================================================================
// Parameter Header
// ============================================================================

/// Parameter header structure
///
/// Only used to validate and locate the basic table; it is not kept
/// after decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterHeader {
    /// Parameter ID (MSB << 8 | LSB)
    pub id: u16,
    /// Parameter table revision
    pub revision: SfdpRevision,
    /// Parameter table length in DWORDs
    pub length_dwords: u8,
    /// Parameter table pointer (24-bit byte address)
    pub table_pointer: u32,
}

impl ParameterHeader {
    /// Parse a parameter header from raw bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        let raw: RawParameterHeader = zerocopy::transmute!(*data);
        let [p0, p1, p2] = raw.pointer;
        Self {
            id: u16::from_le_bytes([raw.id_lsb, raw.id_msb]),
            revision: SfdpRevision::new(raw.major, raw.minor),
            length_dwords: raw.length_dwords,
            table_pointer: u32::from_le_bytes([p0, p1, p2, 0]),
        }
    }

    /// Get the table length in bytes
    pub fn length_bytes(&self) -> usize {
        (self.length_dwords as usize) * 4
    }

    /// Check if this is the Basic Flash Parameter Table
    pub fn is_basic(&self) -> bool {
        self.id == PARAM_ID_BASIC
    }

    /// Revision and length are acceptable for a basic table
    pub fn is_valid_basic(&self) -> bool {
        self.revision.is_supported() && self.length_dwords as usize >= BASIC_TABLE_MIN_DWORDS
    }
}

// ============================================================================
// Address Mode
// ============================================================================

/// Flash addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// 3-byte addressing only (up to 16 MiB)
    #[default]
    ThreeByteOnly,
    /// 3-byte default, can switch to 4-byte
    ThreeOrFourByte,
    /// 4-byte addressing only
    FourByteOnly,
}

impl AddressMode {
    /// Parse from BFPT DWORD 1 bits [18:17]; `None` for the reserved value
    pub fn from_bfpt(value: u8) -> Option<Self> {
        match value & 0x03 {
            0b00 => Some(Self::ThreeByteOnly),
            0b01 => Some(Self::ThreeOrFourByte),
            0b10 => Some(Self::FourByteOnly),
            _ => None,
        }
    }

    /// Check if 4-byte addressing is required
    pub fn requires_4byte(&self) -> bool {
        matches!(self, Self::FourByteOnly)
    }

    /// Check if 4-byte addressing is supported
    pub fn supports_4byte(&self) -> bool {
        !matches!(self, Self::ThreeByteOnly)
    }
}

impl core::fmt::Display for AddressMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ThreeByteOnly => write!(f, "3-byte"),
            Self::ThreeOrFourByte => write!(f, "3- or 4-byte"),
            Self::FourByteOnly => write!(f, "4-byte"),
        }
    }
}

// ============================================================================
// Erase Type
// ============================================================================

/// One erase granule the device supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseType {
    /// Erase size in bytes
    pub size: u32,
    /// Erase opcode
    pub opcode: u8,
    /// Maximum erase time in microseconds, when the table gives timings
    pub max_time_us: Option<u64>,
}

impl EraseType {
    /// Create an erase type without timing information
    pub const fn new(size: u32, opcode: u8) -> Self {
        Self {
            size,
            opcode,
            max_time_us: None,
        }
    }
}

// ============================================================================
// Write granularity / status register
// ============================================================================

/// Smallest unit a program command can be relied on to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteGranularity {
    /// Single bytes can be programmed
    #[default]
    Byte,
    /// Programming needs a buffer of 64 bytes or more
    Page,
}

impl WriteGranularity {
    /// Granularity in bytes as the loader uses it
    pub const fn bytes(&self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Page => 256,
        }
    }
}

/// Status register block protect bits volatility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusRegister {
    /// Non-volatile; a volatile write uses EWSR (0x50)
    #[default]
    NonVolatile,
    /// Volatile; `write_enable` must precede a status write
    Volatile {
        /// 0x50 or 0x06
        write_enable: u8,
    },
}

impl StatusRegister {
    /// Opcode enabling a volatile status register write
    pub const fn volatile_write_enable(&self) -> u8 {
        match self {
            Self::NonVolatile => crate::spi::opcodes::EWSR,
            Self::Volatile { write_enable } => *write_enable,
        }
    }
}

// ============================================================================
// Fast Read Parameters
// ============================================================================

/// Parameters for a fast read command
///
/// Contains the opcode, number of mode clocks, and number of dummy/wait cycles
/// needed for a specific fast read mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FastReadParams {
    /// Instruction opcode
    pub opcode: u8,
    /// Number of mode clock cycles
    pub mode_clocks: u8,
    /// Number of dummy/wait clock cycles before valid output
    pub dummy_clocks: u8,
}

impl FastReadParams {
    /// Parse from DWORD high half
    ///
    /// Layout: [31:24] instruction, [23:21] mode clocks, [20:16] dummy clocks
    pub fn from_high_half(dword: u32) -> Self {
        Self::from_half((dword >> 16) as u16)
    }

    /// Parse from DWORD low half
    ///
    /// Layout: [15:8] instruction, [7:5] mode clocks, [4:0] dummy clocks
    pub fn from_low_half(dword: u32) -> Self {
        Self::from_half(dword as u16)
    }

    fn from_half(half: u16) -> Self {
        Self {
            opcode: (half >> 8) as u8,
            mode_clocks: ((half >> 5) & 0x07) as u8,
            dummy_clocks: (half & 0x1F) as u8,
        }
    }
}

/// Multi-I/O read modes the device advertises
///
/// Decoded for completeness; the loader only ever issues single-I/O reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FastReads {
    /// Double transfer rate clocking supported
    pub dtr: bool,
    /// 1-1-2 fast read
    pub read_112: Option<FastReadParams>,
    /// 1-2-2 fast read
    pub read_122: Option<FastReadParams>,
    /// 1-1-4 fast read
    pub read_114: Option<FastReadParams>,
    /// 1-4-4 fast read
    pub read_144: Option<FastReadParams>,
    /// 2-2-2 fast read
    pub read_222: Option<FastReadParams>,
    /// 4-4-4 fast read
    pub read_444: Option<FastReadParams>,
}

// ============================================================================
// Timings
// ============================================================================

/// Operation times derived from DWORDs 10 and 11
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceTimings {
    /// Maximum page program time in microseconds
    pub page_program_max_us: Option<u64>,
    /// Maximum chip erase time in microseconds
    pub chip_erase_max_us: Option<u64>,
}

/// Typical erase time of one erase type (7-bit DWORD10 field)
///
/// Bits [4:0] count, bits [6:5] unit (1 ms, 16 ms, 128 ms, 1 s).
pub fn erase_time_us(field: u8) -> u64 {
    const UNITS_US: [u64; 4] = [1_000, 16_000, 128_000, 1_000_000];
    let count = (field & 0x1F) as u64 + 1;
    count * UNITS_US[((field >> 5) & 0x03) as usize]
}

/// Typical page program time (6-bit DWORD11 field)
///
/// Bits [4:0] count, bit 5 unit (8 us or 64 us).
pub fn page_program_time_us(field: u8) -> u64 {
    let count = (field & 0x1F) as u64 + 1;
    let unit = if field & 0x20 != 0 { 64 } else { 8 };
    count * unit
}

/// Typical chip erase time (7-bit DWORD11 field)
///
/// Bits [4:0] count, bits [6:5] unit (16 ms, 256 ms, 4 s, 64 s).
pub fn chip_erase_time_us(field: u8) -> u64 {
    const UNITS_US: [u64; 4] = [16_000, 256_000, 4_000_000, 64_000_000];
    let count = (field & 0x1F) as u64 + 1;
    count * UNITS_US[((field >> 5) & 0x03) as usize]
}

/// Typical-to-maximum multiplier field: max = typical * 2 * (N + 1)
pub fn max_from_typical(typical_us: u64, multiplier: u8) -> u64 {
    typical_us * 2 * ((multiplier & 0x0F) as u64 + 1)
}
