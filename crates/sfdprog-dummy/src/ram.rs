//! RAM-backed flash loader
//!
//! A [`FlashLoader`] without any bus or SFDP: a byte array with flash
//! semantics (program clears bits, erase sets a whole sector to 0xFF).
//! Useful for exercising [`FlashHost`] and host tooling.
//!
//! [`FlashHost`]: sfdprog_core::host::FlashHost

use alloc::vec;
use alloc::vec::Vec;

use sfdprog_core::error::{InitError, OpError};
use sfdprog_core::flash::FlashLoader;
use sfdprog_core::sfdp::{AddressMode, DeviceDescriptor, EraseType, JedecId, WriteGranularity};

/// In-memory [`FlashLoader`]
pub struct RamLoader {
    base: u32,
    data: Vec<u8>,
    desc: DeviceDescriptor,
    initialized: bool,
    signed_off: bool,
}

impl RamLoader {
    /// `size` bytes mapped at `base`, erased in `sector_size` granules
    ///
    /// A `sector_size` of 0 is treated as 1.
    pub fn new(base: u32, size: u32, sector_size: u32) -> Self {
        let sector_size = sector_size.max(1);
        let mut erasers = heapless::Vec::new();
        // One entry always fits
        let _ = erasers.push(EraseType::new(sector_size, 0x20));
        let desc = DeviceDescriptor {
            jedec: JedecId::from_bytes([0xEF, 0x40, 0x18]),
            available: true,
            write_granularity: WriteGranularity::Page,
            erase_4k: (sector_size == 4096).then_some(0x20),
            erasers,
            address_mode: AddressMode::ThreeByteOnly,
            capacity: size,
            page_size: 256,
            ..Default::default()
        };
        Self {
            base,
            data: vec![0xFF; size as usize],
            desc,
            initialized: false,
            signed_off: false,
        }
    }

    /// Contents of the emulated flash
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, address: u32, len: usize) -> Result<core::ops::Range<usize>, OpError> {
        if !self.initialized || self.signed_off {
            return Err(OpError::NotInitialized);
        }
        let start = address
            .checked_sub(self.base)
            .ok_or(OpError::AddressOutOfRange { addr: address })? as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(OpError::AddressOutOfRange { addr: address })?;
        Ok(start..end)
    }
}

impl FlashLoader for RamLoader {
    fn init(&mut self) -> Result<(), InitError> {
        if self.initialized {
            return Err(InitError::AlreadyInitialized);
        }
        self.initialized = true;
        log::debug!("RAM loader: {} bytes at 0x{:08X}", self.data.len(), self.base);
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), OpError> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), OpError> {
        let range = self.range(address, data.len())?;
        for (cell, &byte) in self.data[range].iter_mut().zip(data) {
            *cell &= byte;
        }
        Ok(())
    }

    fn erase(&mut self, block_address: u32) -> Result<(), OpError> {
        let size = self.desc.smallest_eraser().ok_or(OpError::NoEraser)?.size;
        let range = self.range(block_address, 1)?;
        let start = range.start - range.start % size as usize;
        let end = (start + size as usize).min(self.data.len());
        self.data[start..end].fill(0xFF);
        Ok(())
    }

    fn erase_chip(&mut self) -> Result<(), OpError> {
        self.range(self.base, 0)?;
        self.data.fill(0xFF);
        Ok(())
    }

    fn signoff(&mut self) -> Result<(), OpError> {
        self.signed_off = true;
        Ok(())
    }

    fn descriptor(&self) -> Option<&DeviceDescriptor> {
        (self.initialized && !self.signed_off).then_some(&self.desc)
    }
}
