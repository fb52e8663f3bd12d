//! Command dispatcher
//!
//! Runs one [`FlashOp`] against the bus: optional write enable, the
//! command itself, then a bounded busy poll.

use super::sequence::{CommandSequence, DataDirection, FlashOp, SequenceTable};
use crate::bus::{CommandBus, RetryBus};
use crate::config::BusyBit;
use crate::error::OpError;
use crate::sfdp::DeviceDescriptor;
use crate::spi::{opcodes, AddressWidth, SpiCommand};

/// Data phase of a dispatched operation
pub enum Data<'a> {
    /// No data phase
    None,
    /// Bytes sent to the device
    Write(&'a [u8]),
    /// Buffer filled from the device
    Read(&'a mut [u8]),
}

impl Data<'_> {
    fn direction(&self) -> DataDirection {
        match self {
            Self::None => DataDirection::None,
            Self::Write(_) => DataDirection::Write,
            Self::Read(_) => DataDirection::Read,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Write(d) => d.len(),
            Self::Read(b) => b.len(),
        }
    }
}

/// Executes flash operations for one device
///
/// Borrows the bus, the descriptor and the table derived from it for the
/// duration of one or more operations; holds no state of its own.
pub struct Dispatcher<'a, B> {
    bus: &'a mut RetryBus<B>,
    desc: &'a DeviceDescriptor,
    table: &'a SequenceTable,
    busy: BusyBit,
}

impl<'a, B: CommandBus> Dispatcher<'a, B> {
    /// Create a dispatcher over the given bus and device
    pub fn new(
        bus: &'a mut RetryBus<B>,
        desc: &'a DeviceDescriptor,
        table: &'a SequenceTable,
        busy: BusyBit,
    ) -> Self {
        Self {
            bus,
            desc,
            table,
            busy,
        }
    }

    /// Execute `op`
    ///
    /// Program and erase operations get a write enable before and a busy
    /// poll after the command. Reads longer than the bus limit are split.
    pub fn execute(
        &mut self,
        op: FlashOp,
        address: Option<u32>,
        data: Data<'_>,
    ) -> Result<(), OpError> {
        let seq = self.table.get(op)?;
        let write_enable = if seq.write_enable {
            Some(self.table.get(FlashOp::WriteEnable)?.opcode)
        } else {
            None
        };
        self.run(op, seq, write_enable, address, data)
    }

    /// Write the status register
    ///
    /// A volatile write is enabled with the descriptor's volatile write
    /// enable opcode instead of WREN.
    pub fn write_status(&mut self, value: &[u8], volatile: bool) -> Result<(), OpError> {
        let seq = self.table.get(FlashOp::WriteStatus)?;
        let enable = if volatile {
            FlashOp::WriteEnableVolatile
        } else {
            FlashOp::WriteEnable
        };
        let write_enable = Some(self.table.get(enable)?.opcode);
        self.run(FlashOp::WriteStatus, seq, write_enable, None, Data::Write(value))
    }

    /// Read status register 1
    pub fn read_status(&mut self) -> Result<u8, OpError> {
        let mut buf = [0u8; 1];
        self.execute(FlashOp::ReadStatus, None, Data::Read(&mut buf))?;
        Ok(buf[0])
    }

    /// Switch a 3-or-4-byte device into 4-byte mode if the table needs it
    pub fn enter_4byte_mode(&mut self) -> Result<(), OpError> {
        if self.table.enters_4byte_mode() {
            log::debug!("Entering 4-byte address mode");
            self.bus.execute(&mut SpiCommand::simple(opcodes::EN4B))?;
        }
        Ok(())
    }

    /// Undo [`Self::enter_4byte_mode`]
    pub fn exit_4byte_mode(&mut self) -> Result<(), OpError> {
        if self.table.enters_4byte_mode() {
            log::debug!("Leaving 4-byte address mode");
            self.bus.execute(&mut SpiCommand::simple(opcodes::EX4B))?;
        }
        Ok(())
    }

    fn run(
        &mut self,
        op: FlashOp,
        seq: CommandSequence,
        write_enable: Option<u8>,
        address: Option<u32>,
        data: Data<'_>,
    ) -> Result<(), OpError> {
        if data.direction() != seq.direction
            || (seq.direction != DataDirection::None && data.len() == 0)
        {
            return Err(OpError::InvalidRequest);
        }

        let len = data.len();
        match (seq.has_address(), address) {
            (true, Some(addr)) => self.check_address(op, seq.address_width, addr, len)?,
            (false, None) => {}
            _ => return Err(OpError::InvalidRequest),
        }

        if let Some(opcode) = write_enable {
            self.bus.execute(&mut SpiCommand::simple(opcode))?;
        }

        log::trace!(
            "{:?}: opcode 0x{:02X}, address {:08X?}, {} data bytes",
            op,
            seq.opcode,
            address,
            len
        );

        match data {
            Data::Read(buf) => self.read(seq, address, buf)?,
            Data::Write(bytes) => {
                let mut cmd = command(seq, address);
                cmd.write_data = bytes;
                self.bus.execute(&mut cmd)?;
            }
            Data::None => self.bus.execute(&mut command(seq, address))?,
        }

        if seq.wait_ready {
            self.wait_ready(op)?;
        }
        Ok(())
    }

    fn read(
        &mut self,
        seq: CommandSequence,
        address: Option<u32>,
        buf: &mut [u8],
    ) -> Result<(), OpError> {
        let chunk_size = self.bus.bus().max_read_len().max(1);
        let mut offset = 0u32;
        for chunk in buf.chunks_mut(chunk_size) {
            let len = chunk.len() as u32;
            let mut cmd = command(seq, address.map(|a| a + offset));
            cmd.read_buf = chunk;
            self.bus.execute(&mut cmd)?;
            offset += len;
        }
        Ok(())
    }

    fn check_address(
        &self,
        op: FlashOp,
        width: AddressWidth,
        addr: u32,
        len: usize,
    ) -> Result<(), OpError> {
        // Commands without data still touch the addressed byte
        let span = len.max(1);
        if !width.covers(addr, span) {
            return Err(OpError::AddressOutOfRange { addr });
        }
        if self.desc.has_capacity() && addr as u64 + span as u64 > self.desc.capacity as u64 {
            return Err(OpError::AddressOutOfRange { addr });
        }

        if op == FlashOp::PageProgram {
            let page = self.desc.page_size.max(1) as u64;
            if (addr as u64 % page) + len as u64 > page {
                return Err(OpError::Unaligned { addr, len });
            }
        }
        Ok(())
    }

    /// Poll attempts allowed for `op`
    ///
    /// Derived from the decoded maximum operation time when there is one,
    /// never more than the configured cap.
    pub fn poll_budget(&self, op: FlashOp) -> u32 {
        let cap = self.bus.config().max_poll_attempts.max(1);
        let max_time_us = match op {
            FlashOp::EraseSector(i) => self.desc.erasers.get(i).and_then(|e| e.max_time_us),
            FlashOp::EraseChip => self.desc.timings.chip_erase_max_us,
            FlashOp::PageProgram => self.desc.timings.page_program_max_us,
            _ => None,
        };

        match max_time_us {
            Some(us) => {
                let delay = self.bus.config().poll_delay_us.max(1) as u64;
                let polls = us.div_ceil(delay) + 1;
                polls.min(cap as u64) as u32
            }
            None => cap,
        }
    }

    fn wait_ready(&mut self, op: FlashOp) -> Result<(), OpError> {
        let status = self.table.get(FlashOp::ReadStatus)?.opcode;
        let attempts = self.poll_budget(op);
        let polls = self.bus.poll_until_idle(status, self.busy, attempts)?;
        log::trace!("{:?} done after {} status polls", op, polls);
        Ok(())
    }
}

fn command<'c>(seq: CommandSequence, address: Option<u32>) -> SpiCommand<'c> {
    let mut cmd = SpiCommand::simple(seq.opcode).with_dummy_cycles(seq.dummy_cycles);
    if seq.has_address() {
        cmd.address = address;
        cmd.address_width = seq.address_width;
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::BusError;
    use crate::sfdp::{AddressMode, DeviceTimings, EraseType};
    use heapless::Vec;

    /// Records the opcode sequence and reports busy for a number of polls
    struct LogBus {
        ops: Vec<u8, 64>,
        addrs: Vec<(u32, u8), 16>,
        busy_polls: u32,
        status_reads: u32,
        written: usize,
        max_read: usize,
    }

    impl LogBus {
        fn new() -> Self {
            Self {
                ops: Vec::new(),
                addrs: Vec::new(),
                busy_polls: 0,
                status_reads: 0,
                written: 0,
                max_read: 256,
            }
        }
    }

    impl CommandBus for LogBus {
        fn max_read_len(&self) -> usize {
            self.max_read
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
            let _ = self.ops.push(cmd.opcode);
            if let Some(addr) = cmd.address {
                let _ = self.addrs.push((addr, cmd.address_width.bytes()));
            }
            self.written += cmd.write_data.len();
            if cmd.opcode == opcodes::RDSR {
                self.status_reads += 1;
                cmd.read_buf[0] = if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    opcodes::SR1_WIP
                } else {
                    0
                };
            } else {
                cmd.read_buf.fill(0xA5);
            }
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn descriptor() -> DeviceDescriptor {
        let mut erasers = Vec::new();
        erasers.push(EraseType::new(4096, 0x20)).unwrap();
        erasers.push(EraseType::new(65536, 0xD8)).unwrap();
        DeviceDescriptor {
            available: true,
            erasers,
            capacity: 1 << 20,
            page_size: 256,
            ..Default::default()
        }
    }

    fn config(max_poll_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_poll_attempts,
            ..Default::default()
        }
    }

    #[test]
    fn test_program_sequence() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));
        bus.bus_mut().busy_polls = 2;

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        d.execute(FlashOp::PageProgram, Some(0x100), Data::Write(&[1, 2, 3]))
            .unwrap();

        let log = bus.bus();
        assert_eq!(log.ops.as_slice(), &[0x06, 0x02, 0x05, 0x05, 0x05]);
        assert_eq!(log.addrs.as_slice(), &[(0x100, 3)]);
        assert_eq!(log.written, 3);
    }

    #[test]
    fn test_erase_uses_indexed_opcode() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        d.execute(FlashOp::EraseSector(1), Some(0x10000), Data::None)
            .unwrap();
        d.execute(FlashOp::EraseChip, None, Data::None).unwrap();

        assert_eq!(
            bus.bus().ops.as_slice(),
            &[0x06, 0xD8, 0x05, 0x06, 0xC7, 0x05]
        );
    }

    #[test]
    fn test_page_crossing_rejected() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        assert_eq!(
            d.execute(FlashOp::PageProgram, Some(0xF0), Data::Write(&[0; 32])),
            Err(OpError::Unaligned { addr: 0xF0, len: 32 })
        );
        assert_eq!(
            d.execute(FlashOp::PageProgram, Some(0), Data::Write(&[0; 257])),
            Err(OpError::Unaligned { addr: 0, len: 257 })
        );
        // Ends exactly on the boundary
        d.execute(FlashOp::PageProgram, Some(0xF0), Data::Write(&[0; 16]))
            .unwrap();
        assert_eq!(bus.bus().ops.as_slice(), &[0x06, 0x02, 0x05]);
    }

    #[test]
    fn test_address_validation() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        let mut buf = [0u8; 16];
        assert_eq!(
            d.execute(FlashOp::ReadNormal, Some((1 << 20) - 8), Data::Read(&mut buf)),
            Err(OpError::AddressOutOfRange {
                addr: (1 << 20) - 8
            })
        );
        assert_eq!(
            d.execute(FlashOp::EraseSector(0), Some(1 << 24), Data::None),
            Err(OpError::AddressOutOfRange { addr: 1 << 24 })
        );
        assert_eq!(
            d.execute(FlashOp::EraseSector(0), None, Data::None),
            Err(OpError::InvalidRequest)
        );
        assert_eq!(
            d.execute(FlashOp::EraseChip, Some(0), Data::None),
            Err(OpError::InvalidRequest)
        );
        assert_eq!(
            d.execute(FlashOp::PageProgram, Some(0), Data::Read(&mut buf)),
            Err(OpError::InvalidRequest)
        );
        assert_eq!(
            d.execute(FlashOp::PageProgram, Some(0), Data::Write(&[])),
            Err(OpError::InvalidRequest)
        );
        // Nothing reached the bus
        assert!(bus.bus().ops.is_empty());
    }

    #[test]
    fn test_unknown_capacity_only_checks_width() {
        let mut desc = descriptor();
        desc.capacity = 0;
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        d.execute(FlashOp::EraseSector(0), Some(0xFF_F000), Data::None)
            .unwrap();
        assert_eq!(
            d.execute(FlashOp::EraseSector(0), Some(0x100_0000), Data::None),
            Err(OpError::AddressOutOfRange { addr: 0x100_0000 })
        );
    }

    #[test]
    fn test_read_is_chunked() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut inner = LogBus::new();
        inner.max_read = 64;
        let mut bus = RetryBus::new(inner, config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        let mut buf = [0u8; 150];
        d.execute(FlashOp::ReadNormal, Some(0x1000), Data::Read(&mut buf))
            .unwrap();

        assert!(buf.iter().all(|&b| b == 0xA5));
        assert_eq!(
            bus.bus().addrs.as_slice(),
            &[(0x1000, 3), (0x1040, 3), (0x1080, 3)]
        );
    }

    #[test]
    fn test_timeout_after_budget() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(5));
        bus.bus_mut().busy_polls = 100;

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        assert_eq!(
            d.execute(FlashOp::EraseChip, None, Data::None),
            Err(OpError::Timeout { polls: 5 })
        );
        assert_eq!(bus.bus().status_reads, 5);
    }

    #[test]
    fn test_poll_budget_from_timings() {
        let mut desc = descriptor();
        desc.erasers[0].max_time_us = Some(1_000);
        desc.timings = DeviceTimings {
            page_program_max_us: Some(250),
            chip_erase_max_us: Some(1_000_000_000),
        };
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(1_000));

        let d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        // 100 us poll delay
        assert_eq!(d.poll_budget(FlashOp::EraseSector(0)), 11);
        assert_eq!(d.poll_budget(FlashOp::PageProgram), 4);
        assert_eq!(d.poll_budget(FlashOp::EraseChip), 1_000);
        assert_eq!(d.poll_budget(FlashOp::EraseSector(1)), 1_000);
    }

    #[test]
    fn test_four_byte_mode() {
        let mut desc = descriptor();
        desc.address_mode = AddressMode::ThreeOrFourByte;
        desc.capacity = 1 << 25;
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        d.enter_4byte_mode().unwrap();
        d.execute(FlashOp::EraseSector(0), Some(0x0180_0000), Data::None)
            .unwrap();
        d.exit_4byte_mode().unwrap();

        let log = bus.bus();
        assert_eq!(log.ops.as_slice(), &[0xB7, 0x06, 0x20, 0x05, 0xE9]);
        assert_eq!(log.addrs.as_slice(), &[(0x0180_0000, 4)]);
    }

    #[test]
    fn test_volatile_status_write() {
        let desc = descriptor();
        let table = SequenceTable::from_descriptor(&desc);
        let mut bus = RetryBus::new(LogBus::new(), config(10));

        let mut d = Dispatcher::new(&mut bus, &desc, &table, BusyBit::default());
        d.write_status(&[0x00], true).unwrap();
        d.write_status(&[0x00], false).unwrap();
        assert_eq!(d.read_status().unwrap(), 0);

        assert_eq!(
            bus.bus().ops.as_slice(),
            &[0x50, 0x01, 0x05, 0x06, 0x01, 0x05, 0x05]
        );
    }
}
