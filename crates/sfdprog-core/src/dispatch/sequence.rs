//! Command sequence table
//!
//! A serial flash controller with a sequence engine keeps a small table of
//! pre-programmed command sequences and is told "run slot N". The table
//! here is the same thing in data form: it is derived once from the
//! [`DeviceDescriptor`] and only read afterwards.

use heapless::Vec;

use crate::error::OpError;
use crate::sfdp::{DeviceDescriptor, MAX_ERASE_TYPES};
use crate::spi::{opcodes, AddressWidth};

/// Number of sequence slots in the table
pub const SEQUENCE_SLOTS: usize = 16;

/// Abstract flash operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Single-I/O read (0x03)
    ReadNormal,
    /// Set the write enable latch
    WriteEnable,
    /// Page program
    PageProgram,
    /// Sector erase with the erase type at this index of the sorted list
    EraseSector(usize),
    /// Whole-chip erase
    EraseChip,
    /// Read status register 1
    ReadStatus,
    /// Write status register
    WriteStatus,
    /// Write enable for a volatile status register write
    WriteEnableVolatile,
}

impl FlashOp {
    /// Slot of this operation in the sequence table
    pub const fn slot(&self) -> usize {
        match self {
            Self::ReadNormal => 0,
            Self::WriteEnable => 4,
            Self::EraseSector(_) => 5,
            Self::EraseChip => 7,
            Self::PageProgram => 8,
            Self::WriteStatus => 10,
            Self::ReadStatus => 13,
            Self::WriteEnableVolatile => 15,
        }
    }
}

/// Direction of the data phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// No data phase
    None,
    /// Device to host
    Read,
    /// Host to device
    Write,
}

/// One entry of the sequence table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSequence {
    /// Opcode
    pub opcode: u8,
    /// Address phase width
    pub address_width: AddressWidth,
    /// Dummy cycles after the address
    pub dummy_cycles: u8,
    /// Data phase direction
    pub direction: DataDirection,
    /// A write enable must be issued first
    pub write_enable: bool,
    /// The busy flag must be polled afterwards
    pub wait_ready: bool,
}

impl CommandSequence {
    const fn command(opcode: u8) -> Self {
        Self {
            opcode,
            address_width: AddressWidth::None,
            dummy_cycles: 0,
            direction: DataDirection::None,
            write_enable: false,
            wait_ready: false,
        }
    }

    const fn addressed(mut self, width: AddressWidth) -> Self {
        self.address_width = width;
        self
    }

    const fn data(mut self, direction: DataDirection) -> Self {
        self.direction = direction;
        self
    }

    const fn modifying(mut self) -> Self {
        self.write_enable = true;
        self.wait_ready = true;
        self
    }

    /// True if the sequence has an address phase
    pub fn has_address(&self) -> bool {
        self.address_width != AddressWidth::None
    }
}

/// Command sequences for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTable {
    slots: [Option<CommandSequence>; SEQUENCE_SLOTS],
    erase_opcodes: Vec<u8, MAX_ERASE_TYPES>,
    enter_4byte: bool,
}

impl SequenceTable {
    /// Derive the table from a decoded descriptor
    pub fn from_descriptor(desc: &DeviceDescriptor) -> Self {
        let width = if desc.needs_4byte_addressing() {
            AddressWidth::FourByte
        } else {
            AddressWidth::ThreeByte
        };

        let mut slots = [None; SEQUENCE_SLOTS];
        let mut set = |op: FlashOp, seq: CommandSequence| slots[op.slot()] = Some(seq);

        set(
            FlashOp::ReadNormal,
            CommandSequence::command(opcodes::READ)
                .addressed(width)
                .data(DataDirection::Read),
        );
        set(
            FlashOp::WriteEnable,
            CommandSequence::command(opcodes::WREN),
        );
        set(
            FlashOp::EraseChip,
            CommandSequence::command(opcodes::CE_C7).modifying(),
        );
        set(
            FlashOp::PageProgram,
            CommandSequence::command(opcodes::PP)
                .addressed(width)
                .data(DataDirection::Write)
                .modifying(),
        );
        set(
            FlashOp::WriteStatus,
            CommandSequence::command(opcodes::WRSR)
                .data(DataDirection::Write)
                .modifying(),
        );
        set(
            FlashOp::ReadStatus,
            CommandSequence::command(opcodes::RDSR).data(DataDirection::Read),
        );
        set(
            FlashOp::WriteEnableVolatile,
            CommandSequence::command(desc.volatile_write_enable()),
        );

        // The erase slot holds the smallest granule; other erase types
        // reuse it with their own opcode.
        if let Some(smallest) = desc.smallest_eraser() {
            set(
                FlashOp::EraseSector(0),
                CommandSequence::command(smallest.opcode)
                    .addressed(width)
                    .modifying(),
            );
        }

        let erase_opcodes = desc.erasers.iter().map(|e| e.opcode).collect();

        Self {
            slots,
            erase_opcodes,
            enter_4byte: desc.needs_4byte_addressing() && !desc.address_mode.requires_4byte(),
        }
    }

    /// Raw slot contents
    pub fn slot(&self, index: usize) -> Option<&CommandSequence> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Sequence for an operation
    pub fn get(&self, op: FlashOp) -> Result<CommandSequence, OpError> {
        let seq = self.slot(op.slot()).copied();
        match op {
            FlashOp::EraseSector(index) => {
                let mut seq = seq.ok_or(OpError::NoEraser)?;
                seq.opcode = *self.erase_opcodes.get(index).ok_or(OpError::NoEraser)?;
                Ok(seq)
            }
            _ => seq.ok_or(OpError::InvalidRequest),
        }
    }

    /// Address width used by addressed sequences
    pub fn address_width(&self) -> AddressWidth {
        self.slot(FlashOp::ReadNormal.slot())
            .map(|s| s.address_width)
            .unwrap_or(AddressWidth::ThreeByte)
    }

    /// True if the device must be switched to 4-byte mode before use
    pub fn enters_4byte_mode(&self) -> bool {
        self.enter_4byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfdp::{AddressMode, EraseType, JedecId, StatusRegister};

    fn descriptor(mode: AddressMode, capacity: u32) -> DeviceDescriptor {
        let mut erasers = Vec::new();
        erasers.push(EraseType::new(4096, 0x20)).unwrap();
        erasers.push(EraseType::new(65536, 0xD8)).unwrap();
        DeviceDescriptor {
            available: true,
            erasers,
            address_mode: mode,
            capacity,
            page_size: 256,
            ..Default::default()
        }
    }

    #[test]
    fn test_slots_match_controller_layout() {
        let table = SequenceTable::from_descriptor(&descriptor(AddressMode::ThreeByteOnly, 1 << 23));

        assert_eq!(table.slot(0).unwrap().opcode, 0x03);
        assert_eq!(table.slot(4).unwrap().opcode, 0x06);
        assert_eq!(table.slot(5).unwrap().opcode, 0x20);
        assert_eq!(table.slot(7).unwrap().opcode, 0xC7);
        assert_eq!(table.slot(8).unwrap().opcode, 0x02);
        assert_eq!(table.slot(10).unwrap().opcode, 0x01);
        assert_eq!(table.slot(13).unwrap().opcode, 0x05);
        assert_eq!(table.slot(15).unwrap().opcode, 0x50);
        assert!(table.slot(1).is_none());
        assert!(table.slot(16).is_none());
    }

    #[test]
    fn test_modifying_sequences() {
        let table = SequenceTable::from_descriptor(&descriptor(AddressMode::ThreeByteOnly, 1 << 23));

        for op in [FlashOp::PageProgram, FlashOp::EraseSector(0), FlashOp::EraseChip] {
            let seq = table.get(op).unwrap();
            assert!(seq.write_enable && seq.wait_ready, "{:?}", op);
        }
        for op in [FlashOp::ReadNormal, FlashOp::ReadStatus, FlashOp::WriteEnable] {
            let seq = table.get(op).unwrap();
            assert!(!seq.write_enable && !seq.wait_ready, "{:?}", op);
        }
    }

    #[test]
    fn test_erase_index() {
        let table = SequenceTable::from_descriptor(&descriptor(AddressMode::ThreeByteOnly, 1 << 23));
        assert_eq!(table.get(FlashOp::EraseSector(1)).unwrap().opcode, 0xD8);
        assert_eq!(table.get(FlashOp::EraseSector(2)), Err(OpError::NoEraser));

        let empty = SequenceTable::from_descriptor(&DeviceDescriptor::default());
        assert_eq!(empty.get(FlashOp::EraseSector(0)), Err(OpError::NoEraser));
    }

    #[test]
    fn test_address_width_selection() {
        let small = SequenceTable::from_descriptor(&descriptor(AddressMode::ThreeOrFourByte, 1 << 24));
        assert_eq!(small.address_width(), AddressWidth::ThreeByte);
        assert!(!small.enters_4byte_mode());

        let large = SequenceTable::from_descriptor(&descriptor(AddressMode::ThreeOrFourByte, 1 << 25));
        assert_eq!(large.address_width(), AddressWidth::FourByte);
        assert!(large.enters_4byte_mode());
        assert_eq!(
            large.get(FlashOp::PageProgram).unwrap().address_width,
            AddressWidth::FourByte
        );

        let only4 = SequenceTable::from_descriptor(&descriptor(AddressMode::FourByteOnly, 1 << 25));
        assert_eq!(only4.address_width(), AddressWidth::FourByte);
        assert!(!only4.enters_4byte_mode());
    }

    #[test]
    fn test_volatile_write_enable_slot() {
        let mut desc = DeviceDescriptor::legacy(JedecId::default());
        desc.status_register = StatusRegister::Volatile { write_enable: 0x06 };
        let table = SequenceTable::from_descriptor(&desc);
        assert_eq!(table.get(FlashOp::WriteEnableVolatile).unwrap().opcode, 0x06);
    }
}
