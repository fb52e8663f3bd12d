//! SFDP-driven flash loader

use super::chunks::page_chunks;
use super::loader::FlashLoader;
use crate::bus::{CommandBus, RetryBus};
use crate::config::LoaderConfig;
use crate::dispatch::{Data, Dispatcher, FlashOp, SequenceTable};
use crate::error::{DecodeError, InitError, OpError};
use crate::sfdp::{self, DeviceDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoaderState {
    Uninitialized,
    Ready,
    SignedOff,
}

/// [`FlashLoader`] for any SFDP-capable SPI NOR behind a [`CommandBus`]
///
/// Owns the bus and the device descriptor. The descriptor is written once
/// by [`FlashLoader::init`] and never changed afterwards.
pub struct SfdpFlashLoader<B> {
    bus: RetryBus<B>,
    config: LoaderConfig,
    desc: DeviceDescriptor,
    table: Option<SequenceTable>,
    state: LoaderState,
}

impl<B: CommandBus> SfdpFlashLoader<B> {
    /// Create a loader; nothing is sent until `init`
    pub fn new(bus: B, config: LoaderConfig) -> Self {
        Self {
            bus: RetryBus::new(bus, config.retry),
            config,
            desc: DeviceDescriptor::default(),
            table: None,
            state: LoaderState::Uninitialized,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Access the underlying bus
    pub fn bus(&self) -> &B {
        self.bus.bus()
    }

    /// Mutable access to the underlying bus
    pub fn bus_mut(&mut self) -> &mut B {
        self.bus.bus_mut()
    }

    /// Give the underlying bus back
    pub fn into_bus(self) -> B {
        self.bus.into_inner()
    }

    /// True between a successful `init` and `signoff`
    pub fn is_ready(&self) -> bool {
        self.state == LoaderState::Ready
    }

    fn dispatcher(&mut self) -> Result<Dispatcher<'_, B>, OpError> {
        if self.state != LoaderState::Ready {
            return Err(OpError::NotInitialized);
        }
        let table = self.table.as_ref().ok_or(OpError::NotInitialized)?;
        Ok(Dispatcher::new(
            &mut self.bus,
            &self.desc,
            table,
            self.config.busy,
        ))
    }

    /// Translate a host address to a flash offset
    fn offset(&self, address: u32) -> Result<u32, OpError> {
        address
            .checked_sub(self.config.base_address)
            .ok_or(OpError::AddressOutOfRange { addr: address })
    }

    fn discover(&mut self) -> Result<DeviceDescriptor, InitError> {
        let mut desc = DeviceDescriptor::default();
        match sfdp::decode_into(&mut self.bus, &mut desc) {
            Ok(()) => {
                sfdp::log_status_registers(&mut self.bus);
                Ok(desc)
            }
            Err(DecodeError::NotSfdpCapable) => {
                log::warn!(
                    "Flash {} has no SFDP table, using legacy defaults",
                    desc.jedec
                );
                Ok(DeviceDescriptor::legacy(desc.jedec))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn setup(&mut self) -> Result<(), InitError> {
        let desc = self.discover()?;
        let table = SequenceTable::from_descriptor(&desc);
        Dispatcher::new(&mut self.bus, &desc, &table, self.config.busy).enter_4byte_mode()?;

        self.desc = desc;
        self.table = Some(table);
        Ok(())
    }
}

impl<B: CommandBus> FlashLoader for SfdpFlashLoader<B> {
    fn init(&mut self) -> Result<(), InitError> {
        if self.state != LoaderState::Uninitialized {
            return Err(InitError::AlreadyInitialized);
        }

        self.bus.bus_mut().open()?;
        if let Err(e) = self.setup() {
            self.bus.bus_mut().close();
            return Err(e);
        }

        self.state = LoaderState::Ready;
        log::debug!("Flash loader init done");
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), OpError> {
        let offset = self.offset(address)?;
        let mut d = self.dispatcher()?;
        if buf.is_empty() {
            return Ok(());
        }
        d.execute(FlashOp::ReadNormal, Some(offset), Data::Read(buf))
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), OpError> {
        let offset = self.offset(address)?;
        let page_size = self.desc.page_size;
        let base = self.config.base_address;
        // Several programs inside one page are fine; each gets its own WREN
        let max_write = self.bus.bus().max_write_len().max(1);
        let mut d = self.dispatcher()?;

        let mut pos = 0;
        for (chunk_offset, len) in page_chunks(offset, data.len(), page_size) {
            log::debug!("Writing page at 0x{:08X}", base.wrapping_add(chunk_offset));
            let page = &data[pos..pos + len];
            let mut at = chunk_offset;
            for piece in page.chunks(max_write) {
                d.execute(FlashOp::PageProgram, Some(at), Data::Write(piece))?;
                at += piece.len() as u32;
            }
            pos += len;
        }
        Ok(())
    }

    fn erase(&mut self, block_address: u32) -> Result<(), OpError> {
        let offset = self.offset(block_address)?;
        if self.state != LoaderState::Ready {
            return Err(OpError::NotInitialized);
        }
        let size = self.desc.smallest_eraser().ok_or(OpError::NoEraser)?.size;

        if offset % size != 0 {
            log::warn!(
                "Erase address 0x{:08X} is not aligned to {} bytes, erasing the containing sector",
                block_address,
                size
            );
        }
        let sector = offset - offset % size;
        log::debug!(
            "Erasing sector at 0x{:08X}",
            self.config.base_address.wrapping_add(sector)
        );

        self.dispatcher()?
            .execute(FlashOp::EraseSector(0), Some(sector), Data::None)
    }

    fn erase_chip(&mut self) -> Result<(), OpError> {
        let mut d = self.dispatcher()?;
        log::info!("Erasing whole chip");
        d.execute(FlashOp::EraseChip, None, Data::None)
    }

    fn signoff(&mut self) -> Result<(), OpError> {
        match self.state {
            LoaderState::SignedOff => return Ok(()),
            LoaderState::Uninitialized => {
                self.state = LoaderState::SignedOff;
                return Ok(());
            }
            LoaderState::Ready => {}
        }

        let result = self.dispatcher().and_then(|mut d| d.exit_4byte_mode());
        if let Err(e) = result {
            log::warn!("Failed to leave 4-byte mode: {}", e);
        }

        self.bus.bus_mut().close();
        self.state = LoaderState::SignedOff;
        log::debug!("Flash loader signed off");
        result
    }

    fn descriptor(&self) -> Option<&DeviceDescriptor> {
        match self.state {
            LoaderState::Ready => Some(&self.desc),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Transfer, TransferBus, DEFAULT_TRANSFER_BUF};
    use crate::config::RetryConfig;
    use crate::error::BusError;
    use crate::spi::{opcodes, SpiCommand};
    use heapless::Vec;

    const BASE: u32 = 0x6000_0000;

    /// SFDP-capable mock: answers discovery and records everything else
    struct MockFlash {
        jedec: [u8; 3],
        sfdp: [u8; 128],
        ops: Vec<u8, 128>,
        programs: Vec<(u32, usize), 16>,
        erases: Vec<(u8, u32), 8>,
        opens: u32,
        closes: u32,
    }

    impl MockFlash {
        /// `dword1`/`dword2` go into a 9-DWORD table with 4 KiB and 64 KiB erasers
        fn new(sfdp_major: u8, dword1: u32, dword2: u32) -> Self {
            let mut sfdp = [0xFF; 128];
            sfdp[..8].copy_from_slice(&[b'S', b'F', b'D', b'P', 0x00, sfdp_major, 0x00, 0xFF]);
            sfdp[8..16].copy_from_slice(&[0x00, 0x00, 0x01, 0x09, 0x30, 0x00, 0x00, 0xFF]);
            let table = [dword1, dword2, 0, 0, 0, 0, 0, 0xD810_200C, 0];
            for (i, d) in table.iter().enumerate() {
                sfdp[0x30 + 4 * i..0x34 + 4 * i].copy_from_slice(&d.to_le_bytes());
            }
            Self {
                jedec: [0xEF, 0x40, 0x18],
                sfdp,
                ops: Vec::new(),
                programs: Vec::new(),
                erases: Vec::new(),
                opens: 0,
                closes: 0,
            }
        }

        /// 16 MiB, 3-byte only
        fn standard() -> Self {
            Self::new(1, 0xFFF1_20E5, 0x07FF_FFFF)
        }
    }

    impl CommandBus for MockFlash {
        fn max_read_len(&self) -> usize {
            64
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
            let _ = self.ops.push(cmd.opcode);
            let addr = cmd.address.unwrap_or(0);
            match cmd.opcode {
                opcodes::RDID => cmd.read_buf.copy_from_slice(&self.jedec),
                opcodes::RDSFDP => {
                    let start = addr as usize;
                    for (i, b) in cmd.read_buf.iter_mut().enumerate() {
                        *b = self.sfdp.get(start + i).copied().unwrap_or(0xFF);
                    }
                }
                opcodes::PP => {
                    let _ = self.programs.push((addr, cmd.write_data.len()));
                }
                0x20 | 0xD8 => {
                    let _ = self.erases.push((cmd.opcode, addr));
                }
                _ => cmd.read_buf.fill(0),
            }
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}

        fn open(&mut self) -> Result<(), BusError> {
            self.opens += 1;
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn loader(mock: MockFlash) -> SfdpFlashLoader<MockFlash> {
        let config = LoaderConfig {
            retry: RetryConfig {
                max_poll_attempts: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        SfdpFlashLoader::new(mock, config)
    }

    #[test]
    fn test_lifecycle() {
        let mut l = loader(MockFlash::standard());
        assert_eq!(l.erase(BASE), Err(OpError::NotInitialized));
        assert!(l.descriptor().is_none());

        l.init().unwrap();
        assert!(l.is_ready());
        assert_eq!(l.descriptor().unwrap().capacity, 16 * 1024 * 1024);
        assert_eq!(l.init(), Err(InitError::AlreadyInitialized));

        l.signoff().unwrap();
        l.signoff().unwrap();
        assert_eq!(l.bus().opens, 1);
        assert_eq!(l.bus().closes, 1);
        assert_eq!(l.write(BASE, &[0; 4]), Err(OpError::NotInitialized));
        assert_eq!(l.init(), Err(InitError::AlreadyInitialized));
    }

    #[test]
    fn test_write_segments_on_pages() {
        let mut l = loader(MockFlash::standard());
        l.init().unwrap();

        l.write(BASE + 0xF0, &[0x5A; 600]).unwrap();
        assert_eq!(
            l.bus().programs.as_slice(),
            &[(0xF0, 16), (0x100, 256), (0x200, 256), (0x300, 72)]
        );
    }

    #[test]
    fn test_address_below_base() {
        let mut l = loader(MockFlash::standard());
        l.init().unwrap();
        assert_eq!(
            l.write(BASE - 1, &[0; 4]),
            Err(OpError::AddressOutOfRange { addr: BASE - 1 })
        );
        assert_eq!(
            l.erase(0x1000),
            Err(OpError::AddressOutOfRange { addr: 0x1000 })
        );
    }

    #[test]
    fn test_erase_uses_smallest_granule() {
        let mut l = loader(MockFlash::standard());
        l.init().unwrap();

        l.erase(BASE + 0x2000).unwrap();
        // Not aligned: still one 4 KiB erase of the containing sector
        l.erase(BASE + 0x1_0234).unwrap();
        assert_eq!(
            l.bus().erases.as_slice(),
            &[(0x20, 0x2000), (0x20, 0x1_0000)]
        );
    }

    #[test]
    fn test_legacy_fallback() {
        let mut mock = MockFlash::standard();
        mock.sfdp[0] = 0x00;
        let mut l = loader(mock);

        l.init().unwrap();
        let desc = l.descriptor().unwrap();
        assert!(!desc.available);
        assert_eq!(desc.jedec.manufacturer, 0xEF);
        assert_eq!(desc.page_size, 256);

        l.erase(BASE + 0x3000).unwrap();
        assert_eq!(l.bus().erases.as_slice(), &[(0x20, 0x3000)]);
    }

    #[test]
    fn test_decode_failure_fails_init() {
        let mut l = loader(MockFlash::new(3, 0xFFF1_20E5, 0x07FF_FFFF));
        assert_eq!(
            l.init(),
            Err(InitError::Decode(DecodeError::UnsupportedRevision {
                major: 3,
                minor: 0
            }))
        );
        assert!(!l.is_ready());
        assert_eq!(l.bus().closes, 1);
        assert_eq!(l.erase_chip(), Err(OpError::NotInitialized));
    }

    #[test]
    fn test_four_byte_mode_bracketing() {
        // 3-or-4-byte addressing, 32 MiB
        let mut l = loader(MockFlash::new(1, 0xFFF3_20E5, 0x0FFF_FFFF));
        l.init().unwrap();
        assert!(l.bus().ops.contains(&opcodes::EN4B));

        l.erase(BASE + 0x0180_0000).unwrap();
        l.signoff().unwrap();

        assert_eq!(l.bus().ops.last(), Some(&opcodes::EX4B));
        assert_eq!(l.bus().erases.as_slice(), &[(0x20, 0x0180_0000)]);
    }

    /// Raw write-then-read primitive behind a 512-byte-page chip
    struct LargePagePrim {
        sfdp: [u8; 0x60],
        programs: Vec<(u32, usize), 8>,
        frames: Vec<u8, 64>,
    }

    impl LargePagePrim {
        fn new() -> Self {
            let mut sfdp = [0xFF; 0x60];
            sfdp[..8].copy_from_slice(&[b'S', b'F', b'D', b'P', 0x00, 0x01, 0x00, 0xFF]);
            sfdp[8..16].copy_from_slice(&[0x00, 0x00, 0x01, 0x0B, 0x30, 0x00, 0x00, 0xFF]);
            // 16 MiB, 4 KiB / 64 KiB erasers, DWORD11 page exponent 9
            let table = [
                0xFFF1_20E5u32,
                0x07FF_FFFF,
                0,
                0,
                0,
                0,
                0,
                0xD810_200C,
                0,
                0,
                0x9 << 4,
            ];
            for (i, d) in table.iter().enumerate() {
                sfdp[0x30 + 4 * i..0x34 + 4 * i].copy_from_slice(&d.to_le_bytes());
            }
            Self {
                sfdp,
                programs: Vec::new(),
                frames: Vec::new(),
            }
        }
    }

    impl Transfer for LargePagePrim {
        fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
            let _ = self.frames.push(write[0]);
            let addr = |w: &[u8]| u32::from_be_bytes([0, w[1], w[2], w[3]]);
            match write[0] {
                opcodes::RDID => read.copy_from_slice(&[0xEF, 0x40, 0x18]),
                opcodes::RDSFDP => {
                    let start = addr(write) as usize;
                    for (i, b) in read.iter_mut().enumerate() {
                        *b = self.sfdp.get(start + i).copied().unwrap_or(0xFF);
                    }
                }
                opcodes::PP => {
                    let _ = self.programs.push((addr(write), write.len() - 4));
                }
                _ => read.fill(0),
            }
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    #[test]
    fn test_large_page_over_transfer_bus() {
        let mut l = SfdpFlashLoader::new(
            TransferBus::<_, DEFAULT_TRANSFER_BUF>::new(LargePagePrim::new()),
            LoaderConfig::default(),
        );
        l.init().unwrap();
        assert_eq!(l.descriptor().unwrap().page_size, 512);

        l.write(BASE, &[0x5A; 512]).unwrap();
        l.write(BASE + 0x3F0, &[0xA5; 0x20]).unwrap();

        let prim = l.bus().inner();
        assert_eq!(
            prim.programs.as_slice(),
            &[(0x000, 256), (0x100, 256), (0x3F0, 16), (0x400, 16)]
        );
        // Every program is preceded by its own write enable
        let frames = prim.frames.as_slice();
        let pp = frames.iter().filter(|&&op| op == opcodes::PP).count();
        let paired = frames
            .windows(2)
            .filter(|w| *w == [opcodes::WREN, opcodes::PP])
            .count();
        assert_eq!((pp, paired), (4, 4));
    }

    #[test]
    fn test_read_and_erase_chip() {
        let mut l = loader(MockFlash::standard());
        l.init().unwrap();

        let mut buf = [0xAA; 100];
        l.read(BASE + 0x40, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        l.erase_chip().unwrap();
        let ops = l.bus().ops.as_slice();
        assert_eq!(&ops[ops.len() - 3..], &[0x06, 0xC7, 0x05]);
    }
}
