//! SFDP decoding
//!
//! Reads the JEDEC ID, the SFDP header, the mandatory basic parameter
//! header and the basic table, in that order, and turns the table into a
//! [`DeviceDescriptor`]. Every step short-circuits the next one.

use heapless::Vec;

use super::descriptor::{DeviceDescriptor, JedecId, DEFAULT_PAGE_SIZE, MAX_ERASE_TYPES};
use super::table::BasicParameterTable;
use super::types::*;
use crate::bus::{CommandBus, RetryBus};
use crate::error::DecodeError;
use crate::spi::{opcodes, SpiCommand};

/// Read the 3-byte JEDEC ID
pub fn read_jedec_id<B: CommandBus>(bus: &mut RetryBus<B>) -> Result<JedecId, DecodeError> {
    let mut buf = [0u8; 3];
    let mut cmd = SpiCommand::read_reg(opcodes::RDID, &mut buf);
    bus.execute(&mut cmd)?;

    let id = JedecId::from_bytes(buf);
    if id.is_absent() {
        log::debug!("JEDEC ID read back as {}", id);
        return Err(DecodeError::NoResponse);
    }
    Ok(id)
}

/// Read the SFDP header and check signature and revision
fn read_header<B: CommandBus>(bus: &mut RetryBus<B>) -> Result<SfdpHeader, DecodeError> {
    let mut buf = [0u8; 8];

    log::debug!("Reading SFDP header (8 bytes at address 0x00)...");

    bus.read_sfdp(SFDP_HEADER_ADDR, &mut buf)?;

    log::debug!("SFDP header bytes: {:02X?}", buf);

    let header = SfdpHeader::parse(&buf);

    if !header.is_valid() {
        log::debug!("SFDP signature invalid (expected 'SFDP')");
        return Err(DecodeError::NotSfdpCapable);
    }

    if !header.revision.is_supported() {
        log::debug!("SFDP major version {} not supported", header.revision.major);
        return Err(DecodeError::UnsupportedRevision {
            major: header.revision.major,
            minor: header.revision.minor,
        });
    }

    log::debug!(
        "SFDP header valid: revision {}, {} parameter header(s)",
        header.revision,
        header.num_param_headers()
    );

    Ok(header)
}

/// Read the basic parameter header at its fixed position
fn read_basic_header<B: CommandBus>(
    bus: &mut RetryBus<B>,
) -> Result<ParameterHeader, DecodeError> {
    let mut buf = [0u8; 8];
    bus.read_sfdp(BASIC_HEADER_ADDR, &mut buf)?;

    log::debug!("Basic parameter header bytes: {:02X?}", buf);

    let header = ParameterHeader::parse(&buf);
    if !header.is_basic() {
        log::debug!(
            "First parameter header has ID 0x{:04X}, reading it as the basic table",
            header.id
        );
    }

    if !header.is_valid_basic() {
        log::debug!(
            "Basic parameter header rejected: revision {}, {} DWORDs",
            header.revision,
            header.length_dwords
        );
        return Err(DecodeError::InvalidHeader);
    }

    Ok(header)
}

/// Read the basic table the header points at
fn read_basic_table<B: CommandBus>(
    bus: &mut RetryBus<B>,
    header: &ParameterHeader,
) -> Result<BasicParameterTable, DecodeError> {
    let mut buf = [0u8; BASIC_TABLE_MAX_DWORDS * 4];
    let len = header.length_bytes().min(buf.len());
    bus.read_sfdp(header.table_pointer, &mut buf[..len])?;

    let table = BasicParameterTable::from_bytes(&buf[..len]).ok_or(DecodeError::InvalidHeader)?;
    for n in 1..=table.len_dwords() {
        log::debug!("BFPT DWORD{}: 0x{:08X}", n, table.dword(n).unwrap_or(0));
    }
    Ok(table)
}

/// Decode the DWORD 2 density field into a byte capacity
///
/// Bit 31 clear: bits [30:0] hold the density in bits minus one.
/// Bit 31 set: bits [30:0] hold N, density is 2^N bits.
pub fn decode_capacity(dword: u32) -> Result<u32, DecodeError> {
    let capacity = if dword & (1 << 31) == 0 {
        // At most 2^31 bits, always fits
        ((dword as u64 + 1) / 8) as u32
    } else {
        let n = dword & 0x7FFF_FFFF;
        if n < 3 {
            return Err(DecodeError::InvalidParameter { dword: 2 });
        }
        1u32
            .checked_shl(n - 3)
            .ok_or(DecodeError::CapacityOverflow)?
    };

    if capacity == 0 {
        return Err(DecodeError::InvalidParameter { dword: 2 });
    }
    Ok(capacity)
}

/// Collect the erase types of DWORDs 8/9, smallest first
///
/// Empty slots (size exponent 0) are skipped. The rest are compacted and
/// insertion sorted by size, so equal sizes keep their table order.
pub fn collect_erasers(
    table: &BasicParameterTable,
) -> Result<Vec<EraseType, MAX_ERASE_TYPES>, DecodeError> {
    let multiplier = table.erase_time_multiplier();
    let mut erasers: Vec<EraseType, MAX_ERASE_TYPES> = Vec::new();

    for slot in 0..MAX_ERASE_TYPES {
        let (exponent, opcode) = table.erase_type(slot);
        if exponent == 0 {
            continue;
        }
        if exponent >= 32 {
            return Err(DecodeError::InvalidParameter {
                dword: 8 + (slot / 2) as u8,
            });
        }

        let max_time_us = match (table.erase_time(slot), multiplier) {
            (Some(field), Some(m)) => Some(max_from_typical(erase_time_us(field), m)),
            _ => None,
        };

        // At most four slots, capacity is four
        let _ = erasers.push(EraseType {
            size: 1 << exponent,
            opcode,
            max_time_us,
        });
    }

    sort_by_size(&mut erasers);
    Ok(erasers)
}

/// Stable insertion sort, ascending by size
fn sort_by_size(erasers: &mut [EraseType]) {
    for i in 1..erasers.len() {
        let mut j = i;
        while j > 0 && erasers[j - 1].size > erasers[j].size {
            erasers.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn decode_fast_reads(table: &BasicParameterTable) -> FastReads {
    let quad = table.quad_read_params();
    let dual = table.dual_read_params();
    FastReads {
        dtr: table.supports_dtr(),
        read_112: table
            .supports_112()
            .then(|| FastReadParams::from_low_half(dual)),
        read_122: table
            .supports_122()
            .then(|| FastReadParams::from_high_half(dual)),
        read_114: table
            .supports_114()
            .then(|| FastReadParams::from_high_half(quad)),
        read_144: table
            .supports_144()
            .then(|| FastReadParams::from_low_half(quad)),
        read_222: table
            .supports_222()
            .then(|| FastReadParams::from_high_half(table.read_222_params())),
        read_444: table
            .supports_444()
            .then(|| FastReadParams::from_high_half(table.read_444_params())),
    }
}

fn decode_timings(table: &BasicParameterTable) -> DeviceTimings {
    let page_program_max_us = match (table.page_program_time(), table.program_time_multiplier())
    {
        (Some(field), Some(m)) => Some(max_from_typical(page_program_time_us(field), m)),
        _ => None,
    };
    let chip_erase_max_us = match (table.chip_erase_time(), table.erase_time_multiplier()) {
        (Some(field), Some(m)) => Some(max_from_typical(chip_erase_time_us(field), m)),
        _ => None,
    };
    DeviceTimings {
        page_program_max_us,
        chip_erase_max_us,
    }
}

/// Decode the geometry held in a basic parameter table
///
/// The returned descriptor carries no JEDEC ID or SFDP revision and is
/// not marked available; [`decode`] fills those in.
pub fn decode_basic_table(table: &BasicParameterTable) -> Result<DeviceDescriptor, DecodeError> {
    // DWORD 1 bits [1:0]: 01 = 4 KiB erase, 11 = no 4 KiB erase
    let erase_4k = match table.erase_4k_support() {
        0b01 => Some(table.erase_4k_opcode()),
        0b11 => None,
        _ => return Err(DecodeError::InvalidParameter { dword: 1 }),
    };

    let write_granularity = if table.write_granularity_bit() {
        WriteGranularity::Page
    } else {
        WriteGranularity::Byte
    };

    let status_register = if table.volatile_status_register() {
        StatusRegister::Volatile {
            write_enable: if table.volatile_wren_select() {
                opcodes::WREN
            } else {
                opcodes::EWSR
            },
        }
    } else {
        StatusRegister::NonVolatile
    };

    let address_mode = AddressMode::from_bfpt(table.address_bytes())
        .ok_or(DecodeError::InvalidParameter { dword: 1 })?;

    let capacity = decode_capacity(table.density())?;
    let erasers = collect_erasers(table)?;

    let page_size = match table.page_size_exponent() {
        Some(n) if n > 0 => 1u32 << n,
        _ => DEFAULT_PAGE_SIZE,
    };

    Ok(DeviceDescriptor {
        write_granularity,
        erase_4k,
        erasers,
        address_mode,
        capacity,
        page_size,
        status_register,
        fast_reads: decode_fast_reads(table),
        timings: decode_timings(table),
        ..Default::default()
    })
}

/// Run the full discovery sequence into `desc`
///
/// `desc` is filled in the order the device is read: JEDEC ID, then SFDP
/// revision, then geometry. On error the fields read so far stay set and
/// `available` stays false, so a caller can still use the JEDEC ID after
/// [`DecodeError::NotSfdpCapable`].
pub fn decode_into<B: CommandBus>(
    bus: &mut RetryBus<B>,
    desc: &mut DeviceDescriptor,
) -> Result<(), DecodeError> {
    desc.available = false;

    desc.jedec = read_jedec_id(bus)?;
    log::debug!("JEDEC ID: {}", desc.jedec);

    let header = read_header(bus)?;
    desc.revision = header.revision;

    let param = read_basic_header(bus)?;
    let table = read_basic_table(bus, &param)?;

    let geometry = decode_basic_table(&table)?;
    *desc = DeviceDescriptor {
        jedec: desc.jedec,
        revision: desc.revision,
        available: true,
        ..geometry
    };

    log::info!(
        "SFDP {} flash {}: {} bytes, {} byte pages, {} addressing",
        desc.revision,
        desc.jedec,
        desc.capacity,
        desc.page_size,
        desc.address_mode
    );
    for e in &desc.erasers {
        log::debug!("  erase {} bytes with 0x{:02X}", e.size, e.opcode);
    }

    Ok(())
}

/// Run the full discovery sequence
pub fn decode<B: CommandBus>(bus: &mut RetryBus<B>) -> Result<DeviceDescriptor, DecodeError> {
    let mut desc = DeviceDescriptor::default();
    decode_into(bus, &mut desc)?;
    Ok(desc)
}

/// Log the three status registers for diagnostics
///
/// Read failures are logged and otherwise ignored.
pub fn log_status_registers<B: CommandBus>(bus: &mut RetryBus<B>) {
    for (name, opcode) in [
        ("SR1", opcodes::RDSR),
        ("SR2", opcodes::RDSR2),
        ("SR3", opcodes::RDSR3),
    ] {
        match bus.read_status(opcode) {
            Ok(value) => log::debug!("{}: 0x{:02X}", name, value),
            Err(e) => log::debug!("{} read failed: {}", name, e),
        }
    }
}
