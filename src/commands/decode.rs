//! `decode` command

use std::path::Path;

use sfdprog_core::sfdp::{DeviceDescriptor, FastReadParams, StatusRegister};
use sfdprog_dummy::config_from_sfdp_dump;

use super::{format_size, read_file};
use crate::error::{jedec_bytes, CliError};

pub fn run(dump: &Path, jedec_id: u32) -> Result<(), Box<dyn std::error::Error>> {
    let jedec = jedec_bytes(jedec_id)?;
    let sfdp = read_file(dump)?;

    let (desc, _) = config_from_sfdp_dump(jedec, sfdp).map_err(CliError::from)?;
    print_descriptor(&desc);
    Ok(())
}

fn print_fast_read(name: &str, params: Option<FastReadParams>) {
    if let Some(p) = params {
        println!(
            "  {}: opcode 0x{:02X}, {} mode + {} dummy clocks",
            name, p.opcode, p.mode_clocks, p.dummy_clocks
        );
    }
}

pub fn print_descriptor(desc: &DeviceDescriptor) {
    println!("Flash Chip Information");
    println!("======================");
    println!();
    println!("JEDEC ID:        {}", desc.jedec);
    println!("SFDP revision:   {}", desc.revision);
    println!(
        "Size:            {} bytes ({})",
        desc.capacity,
        format_size(desc.capacity as u64)
    );
    println!("Page size:       {} bytes", desc.page_size);
    println!("Write unit:      {} byte(s)", desc.write_granularity.bytes());
    println!("Addressing:      {}", desc.address_mode);
    match desc.status_register {
        StatusRegister::NonVolatile => println!("Status register: non-volatile"),
        StatusRegister::Volatile { write_enable } => println!(
            "Status register: volatile (write enable 0x{:02X})",
            write_enable
        ),
    }
    if let Some(op) = desc.erase_4k {
        println!("4 KiB erase:     0x{:02X}", op);
    }

    println!();
    println!("Erase types (smallest first):");
    for e in &desc.erasers {
        match e.max_time_us {
            Some(us) => println!(
                "  Opcode 0x{:02X}: {} (max {} ms)",
                e.opcode,
                format_size(e.size as u64),
                us / 1000
            ),
            None => println!("  Opcode 0x{:02X}: {}", e.opcode, format_size(e.size as u64)),
        }
    }

    let t = &desc.timings;
    if t.page_program_max_us.is_some() || t.chip_erase_max_us.is_some() {
        println!();
        if let Some(us) = t.page_program_max_us {
            println!("Page program:    max {} us", us);
        }
        if let Some(us) = t.chip_erase_max_us {
            println!("Chip erase:      max {} ms", us / 1000);
        }
    }

    let f = &desc.fast_reads;
    println!();
    println!("Fast reads (not used for programming):");
    print_fast_read("1-1-2", f.read_112);
    print_fast_read("1-2-2", f.read_122);
    print_fast_read("1-1-4", f.read_114);
    print_fast_read("1-4-4", f.read_144);
    print_fast_read("2-2-2", f.read_222);
    print_fast_read("4-4-4", f.read_444);
    if f.dtr {
        println!("  DTR clocking supported");
    }
}
