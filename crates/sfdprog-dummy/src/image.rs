//! SFDP image builder
//!
//! Produces the SFDP address space of an emulated chip: signature header,
//! one basic parameter header and a 16-DWORD basic table.

use alloc::vec;
use alloc::vec::Vec;

use sfdprog_core::sfdp::{
    AddressMode, RawParameterHeader, RawSfdpHeader, SfdpRevision, BASIC_HEADER_ADDR,
};
use zerocopy::IntoBytes;

/// Where the basic table is placed
const TABLE_ADDR: u32 = 0x10;

/// Number of DWORDs in the generated basic table (JESD216B length)
const TABLE_DWORDS: usize = 16;

/// Description of an emulated chip's SFDP data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfdpImage {
    /// Revision in the signature header and the parameter header
    pub revision: SfdpRevision,
    /// Capacity in bytes
    pub capacity: u64,
    /// Addressing mode advertised in DWORD 1
    pub address_mode: AddressMode,
    /// Page size exponent (DWORD 11)
    pub page_exponent: u8,
    /// Erase types in table order: (size, opcode)
    pub erasers: Vec<(u32, u8)>,
    /// 4 KiB erase opcode advertised in DWORD 1
    pub erase_4k: Option<u8>,
    /// Volatile status register write enable, if the register is volatile
    pub volatile_wren: Option<u8>,
}

impl SfdpImage {
    /// Typical modern chip of the given capacity
    ///
    /// 4/32/64 KiB erasers, 256-byte pages, 3-byte addressing up to
    /// 16 MiB and switchable 4-byte addressing above.
    pub fn new(capacity: u64) -> Self {
        let address_mode = if capacity > 1 << 24 {
            AddressMode::ThreeOrFourByte
        } else {
            AddressMode::ThreeByteOnly
        };
        Self {
            revision: SfdpRevision::JESD216B,
            capacity,
            address_mode,
            page_exponent: 8,
            erasers: vec![(4096, 0x20), (32 * 1024, 0x52), (64 * 1024, 0xD8)],
            erase_4k: Some(0x20),
            volatile_wren: None,
        }
    }

    /// Replace the erase types (table order is kept)
    pub fn with_erasers(mut self, erasers: &[(u32, u8)]) -> Self {
        self.erasers = erasers.to_vec();
        self
    }

    /// Replace the addressing mode
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode = mode;
        self
    }

    /// Replace the SFDP revision
    pub fn with_revision(mut self, major: u8, minor: u8) -> Self {
        self.revision = SfdpRevision::new(major, minor);
        self
    }

    /// Replace the page size exponent
    pub fn with_page_exponent(mut self, exponent: u8) -> Self {
        self.page_exponent = exponent;
        self
    }

    /// Advertise a volatile status register enabled by `wren`
    pub fn with_volatile_status(mut self, wren: u8) -> Self {
        self.volatile_wren = Some(wren);
        self
    }

    /// Page size in bytes
    pub fn page_size(&self) -> u32 {
        1 << self.page_exponent
    }

    /// The 16 basic table DWORDs
    pub fn dwords(&self) -> [u32; TABLE_DWORDS] {
        let mut d = [0u32; TABLE_DWORDS];

        // DWORD 1: reserved high bits set, page granularity
        let mut dword1 = 0xFF80_0000 | (1 << 2);
        match self.erase_4k {
            Some(op) => dword1 |= 0b01 | (op as u32) << 8,
            None => dword1 |= 0b11 | 0xFF << 8,
        }
        if let Some(wren) = self.volatile_wren {
            dword1 |= 1 << 3;
            if wren == 0x06 {
                dword1 |= 1 << 4;
            }
        }
        let mode = match self.address_mode {
            AddressMode::ThreeByteOnly => 0,
            AddressMode::ThreeOrFourByte => 1,
            AddressMode::FourByteOnly => 2,
        };
        d[0] = dword1 | (mode << 17);

        // DWORD 2: linear up to 2^31 bits, power of two above
        let bits = self.capacity * 8;
        d[1] = if bits <= 1 << 31 {
            (bits - 1) as u32
        } else {
            0x8000_0000 | bits.trailing_zeros()
        };

        // DWORDs 8/9: erase types, empty slots have size 0
        let mut slots = [0u8; 8];
        for (i, (size, opcode)) in self.erasers.iter().take(4).enumerate() {
            slots[2 * i] = size.trailing_zeros() as u8;
            slots[2 * i + 1] = *opcode;
        }
        d[7] = u32::from_le_bytes([slots[0], slots[1], slots[2], slots[3]]);
        d[8] = u32::from_le_bytes([slots[4], slots[5], slots[6], slots[7]]);

        // DWORD 10: multiplier 1, 16 ms per 4 KiB typical erase time
        let mut dword10 = 0x1;
        for (i, (size, _)) in self.erasers.iter().take(4).enumerate() {
            let count = (size / 4096).clamp(1, 32) - 1;
            dword10 |= (0x20 | count) << (4 + 7 * i);
        }
        d[9] = dword10;

        // DWORD 11: multiplier 1, 320 us page program, 32 s chip erase
        d[10] = 0x1 | (self.page_exponent as u32 & 0x0F) << 4 | (0x20 | 4) << 8 | (0x40 | 7) << 24;

        d
    }

    /// Raw SFDP address space
    pub fn build(&self) -> Vec<u8> {
        let header = RawSfdpHeader {
            signature: *b"SFDP",
            minor: self.revision.minor,
            major: self.revision.major,
            nph: 0,
            access_protocol: 0xFF,
        };
        let param = RawParameterHeader {
            id_lsb: 0x00,
            minor: self.revision.minor,
            major: self.revision.major,
            length_dwords: TABLE_DWORDS as u8,
            pointer: [TABLE_ADDR as u8, (TABLE_ADDR >> 8) as u8, (TABLE_ADDR >> 16) as u8],
            id_msb: 0xFF,
        };

        let mut out = Vec::with_capacity(TABLE_ADDR as usize + TABLE_DWORDS * 4);
        out.extend_from_slice(header.as_bytes());
        out.resize(BASIC_HEADER_ADDR as usize, 0xFF);
        out.extend_from_slice(param.as_bytes());
        out.resize(TABLE_ADDR as usize, 0xFF);
        for dword in self.dwords() {
            out.extend_from_slice(&dword.to_le_bytes());
        }
        out
    }
}
