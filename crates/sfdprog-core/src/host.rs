//! Debugger-host call contract
//!
//! A debugger's flash loader framework calls into the target with plain
//! integers and gets one of two answers back. [`FlashHost`] is that
//! boundary: it forwards to a [`FlashLoader`], logs whatever went wrong
//! and collapses it to [`HostResult::Error`].

use core::fmt::Display;

use bitflags::bitflags;
use crc::{Crc, CRC_16_XMODEM};

use crate::flash::FlashLoader;

/// CRC the host framework uses to compare a flashed range with its image
const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Read-back chunk size used by [`FlashHost::flash_checksum`]
const CHECKSUM_CHUNK: usize = 256;

/// Two-value result returned to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HostResult {
    /// Operation succeeded
    Ok = 0,
    /// Operation failed; details went to the log
    Error = 1,
}

impl HostResult {
    /// Returns true for [`HostResult::Ok`]
    pub fn is_ok(&self) -> bool {
        *self == Self::Ok
    }
}

impl From<HostResult> for u32 {
    fn from(r: HostResult) -> Self {
        r as u32
    }
}

bitflags! {
    /// Flags passed to [`FlashHost::flash_init`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InitFlags: u32 {
        /// Only erase the device, nothing will be written
        const ERASE_ONLY = 1 << 0;
    }
}

/// Argument that requests a chip erase from `flash_init`
pub const ERASE_CHIP_OPTION: &str = "--erase-chip";

/// Look up a command line option passed by the host
///
/// Returns the option itself for a flag, or the following argument when
/// `with_value` is set. `None` if the option is absent or has no value.
pub fn find_option<'a>(args: &[&'a str], option: &str, with_value: bool) -> Option<&'a str> {
    let pos = args.iter().position(|a| *a == option)?;
    if with_value {
        args.get(pos + 1).copied()
    } else {
        Some(args[pos])
    }
}

fn collapse<E: Display>(what: &str, result: Result<(), E>) -> HostResult {
    match result {
        Ok(()) => HostResult::Ok,
        Err(e) => {
            log::error!("{} failed: {}", what, e);
            HostResult::Error
        }
    }
}

/// Host entry points on top of a [`FlashLoader`]
pub struct FlashHost<L> {
    loader: L,
}

impl<L: FlashLoader> FlashHost<L> {
    /// Wrap a loader
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Access the wrapped loader
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Mutable access to the wrapped loader
    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    /// Give the wrapped loader back
    pub fn into_loader(self) -> L {
        self.loader
    }

    /// Initialize the loader
    ///
    /// With [`InitFlags::ERASE_ONLY`] or the `--erase-chip` argument the
    /// whole chip is erased right after a successful init.
    pub fn flash_init(
        &mut self,
        base: u32,
        image_size: u32,
        link_address: u32,
        flags: InitFlags,
        args: &[&str],
    ) -> HostResult {
        log::debug!(
            "FlashInit base 0x{:08X}, image {} bytes, link 0x{:08X}, flags {:?}",
            base,
            image_size,
            link_address,
            flags
        );

        let result = collapse("FlashInit", self.loader.init());
        if !result.is_ok() {
            return result;
        }

        if flags.contains(InitFlags::ERASE_ONLY)
            || find_option(args, ERASE_CHIP_OPTION, false).is_some()
        {
            return self.flash_erase_chip();
        }
        HostResult::Ok
    }

    /// Program `buffer` at `block_start + offset_into_block`
    pub fn flash_write(
        &mut self,
        block_start: u32,
        offset_into_block: u32,
        buffer: &[u8],
    ) -> HostResult {
        let Some(address) = block_start.checked_add(offset_into_block) else {
            log::error!(
                "FlashWrite address 0x{:08X} + 0x{:X} overflows",
                block_start,
                offset_into_block
            );
            return HostResult::Error;
        };
        log::debug!(
            "FlashWrite start: 0x{:08X}, offset: {}, count: {}",
            address,
            offset_into_block,
            buffer.len()
        );
        collapse("FlashWrite", self.loader.write(address, buffer))
    }

    /// Erase the block at `block_start`
    ///
    /// `block_size` is only logged: the loader always erases the smallest
    /// granule the device supports.
    pub fn flash_erase(&mut self, block_start: u32, block_size: u32) -> HostResult {
        log::debug!(
            "FlashErase 0x{:08X} (host block size {} ignored)",
            block_start,
            block_size
        );
        collapse("FlashErase", self.loader.erase(block_start))
    }

    /// Erase the whole device
    pub fn flash_erase_chip(&mut self) -> HostResult {
        collapse("FlashEraseChip", self.loader.erase_chip())
    }

    /// Release the loader
    pub fn flash_signoff(&mut self) -> HostResult {
        collapse("FlashSignoff", self.loader.signoff())
    }

    /// CRC-16 of `count` bytes read back from `begin`
    ///
    /// `None` if the read-back failed.
    pub fn flash_checksum(&mut self, begin: u32, count: u32) -> Option<u16> {
        let mut digest = CHECKSUM.digest();
        let mut buf = [0u8; CHECKSUM_CHUNK];
        let mut done = 0u32;

        while done < count {
            let len = ((count - done) as usize).min(CHECKSUM_CHUNK);
            let address = begin.wrapping_add(done);
            if let Err(e) = self.loader.read(address, &mut buf[..len]) {
                log::error!("FlashChecksum read at 0x{:08X} failed: {}", address, e);
                return None;
            }
            digest.update(&buf[..len]);
            done += len as u32;
        }
        Some(digest.finalize())
    }
}
