//! sfdprog-dummy - In-memory SFDP flash emulator for testing
//!
//! This crate provides a [`CommandBus`] that emulates an SFDP-capable SPI
//! NOR chip in memory, and [`RamLoader`], a fake [`FlashLoader`] backed by
//! plain RAM. Both are useful for testing and development without real
//! hardware.
//!
//! [`FlashLoader`]: sfdprog_core::flash::FlashLoader

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod image;
#[cfg(feature = "alloc")]
mod ram;

#[cfg(feature = "alloc")]
pub use image::SfdpImage;
#[cfg(feature = "alloc")]
pub use ram::RamLoader;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use sfdprog_core::bus::CommandBus;
use sfdprog_core::error::BusError;
#[cfg(feature = "alloc")]
use sfdprog_core::sfdp::{AddressMode, DeviceDescriptor};
use sfdprog_core::spi::{opcodes, AddressWidth, SpiCommand, SFDP_DUMMY_CYCLES};

/// Configuration for the dummy flash
#[cfg(feature = "alloc")]
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC ID bytes (manufacturer, memory type, capacity)
    pub jedec: [u8; 3],
    /// SFDP address space; `None` for a chip without SFDP
    pub sfdp: Option<Vec<u8>>,
    /// Flash size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Erase opcodes and the size each one erases
    pub erase_types: Vec<(u8, usize)>,
    /// Device only accepts 4-byte addresses
    pub four_byte_only: bool,
    /// Status reads that report busy after each program or erase
    pub busy_polls: u32,
}

#[cfg(feature = "alloc")]
impl Default for DummyConfig {
    fn default() -> Self {
        Self::from_image([0xEF, 0x40, 0x18], &SfdpImage::new(16 * 1024 * 1024))
    }
}

#[cfg(feature = "alloc")]
impl DummyConfig {
    /// Chip described by `image`
    pub fn from_image(jedec: [u8; 3], image: &SfdpImage) -> Self {
        Self {
            jedec,
            sfdp: Some(image.build()),
            size: image.capacity as usize,
            page_size: image.page_size() as usize,
            erase_types: image
                .erasers
                .iter()
                .map(|&(size, opcode)| (opcode, size as usize))
                .collect(),
            four_byte_only: image.address_mode == AddressMode::FourByteOnly,
            busy_polls: 2,
        }
    }

    /// Chip described by an already decoded descriptor and its raw SFDP dump
    pub fn from_descriptor(jedec: [u8; 3], sfdp: Vec<u8>, desc: &DeviceDescriptor) -> Self {
        Self {
            jedec,
            sfdp: Some(sfdp),
            size: desc.capacity as usize,
            page_size: desc.page_size as usize,
            erase_types: desc
                .erasers
                .iter()
                .map(|e| (e.opcode, e.size as usize))
                .collect(),
            four_byte_only: desc.address_mode.requires_4byte(),
            busy_polls: 2,
        }
    }

    /// Pre-SFDP chip: JEDEC ID only, 4 KiB and 64 KiB erases
    pub fn legacy(jedec: [u8; 3], size: usize) -> Self {
        Self {
            jedec,
            sfdp: None,
            size,
            page_size: 256,
            erase_types: vec![(0x20, 4096), (0xD8, 64 * 1024)],
            four_byte_only: false,
            busy_polls: 1,
        }
    }
}

/// Dummy flash
///
/// Emulates an SPI NOR chip in memory: write enable latch, busy flag,
/// page wrap-around on program, 4-byte address mode and the SFDP area.
#[cfg(feature = "alloc")]
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    status_reg1: u8,
    status_reg2: u8,
    status_reg3: u8,
    write_enabled: bool,
    volatile_write_enabled: bool,
    in_4byte_mode: bool,
    busy_remaining: u32,
    elapsed_us: u64,
    opens: u32,
    closes: u32,
    ops: Vec<u8>,
}

#[cfg(feature = "alloc")]
impl DummyFlash {
    /// Create a new dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            status_reg1: 0,
            status_reg2: 0,
            status_reg3: 0,
            write_enabled: false,
            volatile_write_enabled: false,
            in_4byte_mode: false,
            busy_remaining: 0,
            elapsed_us: 0,
            opens: 0,
            closes: 0,
            ops: Vec::new(),
        }
    }

    /// Create a new dummy flash with default configuration (16 MiB, JESD216B)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Opcodes received so far
    pub fn ops(&self) -> &[u8] {
        &self.ops
    }

    /// Simulated time spent in `delay_us`
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// Number of `open` / `close` calls
    pub fn open_close_count(&self) -> (u32, u32) {
        (self.opens, self.closes)
    }

    /// True while 4-byte address mode is active
    pub fn in_4byte_mode(&self) -> bool {
        self.in_4byte_mode
    }

    fn status1(&self) -> u8 {
        let mut sr = self.status_reg1 & !(opcodes::SR1_WIP | opcodes::SR1_WEL);
        if self.busy_remaining > 0 {
            sr |= opcodes::SR1_WIP;
        }
        if self.write_enabled {
            sr |= opcodes::SR1_WEL;
        }
        sr
    }

    fn start_busy(&mut self) {
        self.write_enabled = false;
        self.busy_remaining = self.config.busy_polls;
    }

    fn get_address(&self, cmd: &SpiCommand<'_>) -> Result<usize, BusError> {
        let addr = cmd.address.ok_or(BusError::TransferFailed)?;
        let expected = if self.config.four_byte_only || self.in_4byte_mode {
            AddressWidth::FourByte
        } else {
            AddressWidth::ThreeByte
        };
        if cmd.address_width != expected {
            log::warn!(
                "dummy: opcode 0x{:02X} sent with {} address bytes, device expects {}",
                cmd.opcode,
                cmd.address_width.bytes(),
                expected.bytes()
            );
            return Err(BusError::TransferFailed);
        }
        Ok(addr as usize)
    }

    fn check_range(&self, addr: usize, len: usize) -> Result<(), BusError> {
        if addr + len > self.data.len() {
            log::warn!("dummy: access of {} bytes at 0x{:X} past end", len, addr);
            return Err(BusError::TransferFailed);
        }
        Ok(())
    }

    fn require_write_enable(&self, opcode: u8) -> Result<(), BusError> {
        if !self.write_enabled {
            log::warn!("dummy: opcode 0x{:02X} without write enable", opcode);
            return Err(BusError::TransferFailed);
        }
        Ok(())
    }

    fn handle_sfdp(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        if cmd.dummy_cycles != SFDP_DUMMY_CYCLES || cmd.address_width != AddressWidth::ThreeByte {
            log::warn!("dummy: malformed RDSFDP");
            return Err(BusError::TransferFailed);
        }
        let addr = cmd.address.unwrap_or(0) as usize;
        // Unused SFDP space, and a chip without SFDP, read as 0xFF
        let sfdp = self.config.sfdp.as_deref().unwrap_or(&[]);
        for (i, b) in cmd.read_buf.iter_mut().enumerate() {
            *b = sfdp.get(addr + i).copied().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn handle_read(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        let addr = self.get_address(cmd)?;
        let len = cmd.read_buf.len();
        self.check_range(addr, len)?;

        cmd.read_buf.copy_from_slice(&self.data[addr..addr + len]);
        Ok(())
    }

    fn handle_page_program(&mut self, cmd: &SpiCommand<'_>) -> Result<(), BusError> {
        self.require_write_enable(cmd.opcode)?;
        let addr = self.get_address(cmd)?;
        self.check_range(addr, 1)?;

        // Flash programming: can only change 1 -> 0, wraps inside the page
        let page = self.config.page_size.max(1);
        let page_base = addr - addr % page;
        for (i, &byte) in cmd.write_data.iter().enumerate() {
            let target = page_base + (addr % page + i) % page;
            self.data[target] &= byte;
        }

        self.start_busy();
        Ok(())
    }

    fn handle_sector_erase(&mut self, cmd: &SpiCommand<'_>, erase_size: usize) -> Result<(), BusError> {
        self.require_write_enable(cmd.opcode)?;
        let addr = self.get_address(cmd)?;
        let erase_size = erase_size.max(1);

        // Align address to erase boundary
        let aligned_addr = addr - addr % erase_size;
        self.check_range(aligned_addr, erase_size)?;

        self.data[aligned_addr..aligned_addr + erase_size].fill(0xFF);
        self.start_busy();
        Ok(())
    }

    fn handle_chip_erase(&mut self, cmd: &SpiCommand<'_>) -> Result<(), BusError> {
        self.require_write_enable(cmd.opcode)?;
        self.data.fill(0xFF);
        self.start_busy();
        Ok(())
    }

    fn handle_write_status(&mut self, cmd: &SpiCommand<'_>) -> Result<(), BusError> {
        if !self.write_enabled && !self.volatile_write_enabled {
            log::warn!("dummy: WRSR without write enable");
            return Err(BusError::TransferFailed);
        }
        if let Some(&sr1) = cmd.write_data.first() {
            self.status_reg1 = sr1;
        }
        if let Some(&sr2) = cmd.write_data.get(1) {
            self.status_reg2 = sr2;
        }
        self.volatile_write_enabled = false;
        self.start_busy();
        Ok(())
    }
}

#[cfg(feature = "alloc")]
impl CommandBus for DummyFlash {
    fn max_read_len(&self) -> usize {
        4096
    }

    fn max_write_len(&self) -> usize {
        self.config.page_size.max(1)
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        log::trace!(
            "dummy: opcode 0x{:02X} addr {:08X?} write {} read {}",
            cmd.opcode,
            cmd.address,
            cmd.write_data.len(),
            cmd.read_buf.len()
        );
        self.ops.push(cmd.opcode);

        // A busy device only answers status reads
        if self.busy_remaining > 0 && cmd.opcode != opcodes::RDSR {
            log::warn!("dummy: opcode 0x{:02X} while busy", cmd.opcode);
            return Err(BusError::TransferFailed);
        }

        match cmd.opcode {
            // JEDEC ID
            opcodes::RDID => {
                let n = cmd.read_buf.len().min(3);
                cmd.read_buf[..n].copy_from_slice(&self.config.jedec[..n]);
                Ok(())
            }

            opcodes::RDSFDP => self.handle_sfdp(cmd),

            // Status register read
            opcodes::RDSR => {
                if let Some(b) = cmd.read_buf.first_mut() {
                    *b = self.status1();
                }
                self.busy_remaining = self.busy_remaining.saturating_sub(1);
                Ok(())
            }
            opcodes::RDSR2 => {
                if let Some(b) = cmd.read_buf.first_mut() {
                    *b = self.status_reg2;
                }
                Ok(())
            }
            opcodes::RDSR3 => {
                if let Some(b) = cmd.read_buf.first_mut() {
                    *b = self.status_reg3;
                }
                Ok(())
            }

            // Status register write
            opcodes::WRSR => self.handle_write_status(cmd),

            // Write enable/disable
            opcodes::WREN => {
                self.write_enabled = true;
                Ok(())
            }
            opcodes::WRDI => {
                self.write_enabled = false;
                Ok(())
            }
            opcodes::EWSR => {
                self.volatile_write_enabled = true;
                Ok(())
            }

            opcodes::READ => self.handle_read(cmd),
            opcodes::PP => self.handle_page_program(cmd),
            opcodes::CE_C7 => self.handle_chip_erase(cmd),

            // 4-byte address mode
            opcodes::EN4B => {
                self.in_4byte_mode = true;
                Ok(())
            }
            opcodes::EX4B => {
                self.in_4byte_mode = false;
                Ok(())
            }

            op => match self.config.erase_types.iter().find(|(o, _)| *o == op) {
                Some(&(_, size)) => self.handle_sector_erase(cmd, size),
                None => {
                    log::warn!("dummy: unsupported opcode 0x{:02X}", op);
                    Err(BusError::TransferFailed)
                }
            },
        }
    }

    fn delay_us(&mut self, us: u32) {
        // No delay needed for in-memory operations
        self.elapsed_us += us as u64;
    }

    fn open(&mut self) -> Result<(), BusError> {
        self.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

/// Decode a raw SFDP dump by running it through an emulated chip
///
/// Returns the descriptor together with a [`DummyConfig`] that emulates a
/// chip with exactly that geometry.
#[cfg(feature = "alloc")]
pub fn config_from_sfdp_dump(
    jedec: [u8; 3],
    sfdp: Vec<u8>,
) -> Result<(DeviceDescriptor, DummyConfig), sfdprog_core::DecodeError> {
    use sfdprog_core::bus::RetryBus;
    use sfdprog_core::config::RetryConfig;

    let probe = DummyFlash::new(DummyConfig {
        jedec,
        sfdp: Some(sfdp.clone()),
        size: 0,
        page_size: 256,
        erase_types: Vec::new(),
        four_byte_only: false,
        busy_polls: 0,
    });
    let mut bus = RetryBus::new(probe, RetryConfig::default());
    let desc = sfdprog_core::sfdp::decode(&mut bus)?;
    let config = DummyConfig::from_descriptor(jedec, sfdp, &desc);
    Ok((desc, config))
}
