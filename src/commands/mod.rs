//! CLI command implementations
//!
//! Both commands run against the in-memory emulator from `sfdprog-dummy`;
//! nothing here touches real hardware.

pub mod decode;
pub mod program;

use std::fs;
use std::path::Path;

/// Read a whole file, logging its size
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = fs::read(path)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Human readable size
fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 && size % (1024 * 1024) == 0 {
        format!("{} MiB", size / (1024 * 1024))
    } else if size >= 1024 && size % 1024 == 0 {
        format!("{} KiB", size / 1024)
    } else {
        format!("{} bytes", size)
    }
}
