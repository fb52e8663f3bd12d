//! SPI command structure

use super::{opcodes, AddressWidth};

/// Dummy cycles between address and data of a Read SFDP command
pub const SFDP_DUMMY_CYCLES: u8 = 8;

/// A single single-I/O SPI transaction
///
/// Designed to avoid allocation - uses slices for data.
/// The lifetime parameter `'a` ties the command to the buffers it references.
pub struct SpiCommand<'a> {
    /// The opcode byte
    pub opcode: u8,

    /// Address (if any)
    pub address: Option<u32>,

    /// Address width
    pub address_width: AddressWidth,

    /// Number of dummy cycles after address
    pub dummy_cycles: u8,

    /// Data to write after opcode/address/dummy
    pub write_data: &'a [u8],

    /// Buffer to read into (mutable)
    pub read_buf: &'a mut [u8],
}

impl<'a> SpiCommand<'a> {
    /// Create a simple command with no address or data (e.g., WREN, WRDI)
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            dummy_cycles: 0,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Create a read register command with no address (e.g., RDSR, RDID)
    pub fn read_reg(opcode: u8, buf: &'a mut [u8]) -> Self {
        Self {
            read_buf: buf,
            ..Self::simple(opcode)
        }
    }

    /// Create a write register command with no address (e.g., WRSR)
    pub fn write_reg(opcode: u8, data: &'a [u8]) -> Self {
        Self {
            write_data: data,
            ..Self::simple(opcode)
        }
    }

    /// Create an addressed read
    pub fn read(opcode: u8, width: AddressWidth, addr: u32, buf: &'a mut [u8]) -> Self {
        Self {
            address: Some(addr),
            address_width: width,
            read_buf: buf,
            ..Self::simple(opcode)
        }
    }

    /// Create an addressed write (e.g., PP)
    pub fn write(opcode: u8, width: AddressWidth, addr: u32, data: &'a [u8]) -> Self {
        Self {
            address: Some(addr),
            address_width: width,
            write_data: data,
            ..Self::simple(opcode)
        }
    }

    /// Create an addressed command without data phase (sector erase)
    pub fn erase(opcode: u8, width: AddressWidth, addr: u32) -> Self {
        Self {
            address: Some(addr),
            address_width: width,
            ..Self::simple(opcode)
        }
    }

    /// Read SFDP: 0x5A, 3-byte address, 8 dummy cycles
    pub fn read_sfdp(addr: u32, buf: &'a mut [u8]) -> Self {
        Self::read(opcodes::RDSFDP, AddressWidth::ThreeByte, addr, buf)
            .with_dummy_cycles(SFDP_DUMMY_CYCLES)
    }

    /// Set the number of dummy cycles
    pub fn with_dummy_cycles(mut self, cycles: u8) -> Self {
        self.dummy_cycles = cycles;
        self
    }

    /// Returns true if this command has a read phase
    pub fn has_read(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Returns true if this command has a write phase
    pub fn has_write(&self) -> bool {
        !self.write_data.is_empty()
    }

    /// Returns true if this command has an address phase
    pub fn has_address(&self) -> bool {
        self.address.is_some()
    }

    /// Number of dummy bytes clocked out in single-I/O mode
    pub fn dummy_bytes(&self) -> usize {
        (self.dummy_cycles as usize).div_ceil(8)
    }

    /// Length of opcode + address + dummy bytes
    pub fn header_len(&self) -> usize {
        let addr = if self.address.is_some() {
            self.address_width.bytes() as usize
        } else {
            0
        };
        1 + addr + self.dummy_bytes()
    }

    /// Encode opcode, address and dummy bytes into `buf`
    ///
    /// `buf` must be at least [`Self::header_len`] long. Returns the number
    /// of bytes written. Dummy bytes are sent as 0xFF.
    pub fn encode_header(&self, buf: &mut [u8]) -> usize {
        let len = self.header_len();
        buf[0] = self.opcode;
        let mut pos = 1;
        if let Some(addr) = self.address {
            self.address_width.encode(addr, &mut buf[pos..]);
            pos += self.address_width.bytes() as usize;
        }
        buf[pos..len].fill(0xFF);
        len
    }

    /// Calculate the total number of bytes on the wire
    pub fn total_bytes(&self) -> usize {
        self.header_len() + self.write_data.len() + self.read_buf.len()
    }
}
