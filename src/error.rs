//! CLI error type

use sfdprog_core::config::ConfigError;
use sfdprog_core::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("SFDP decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0} failed, see log for details")]
    Host(&'static str),

    #[error("image of {len} bytes does not fit the {capacity} byte flash at offset 0x{offset:X}")]
    ImageTooLarge { len: usize, capacity: u32, offset: u32 },

    #[error("address 0x{address:08X} is below the flash base 0x{base:08X}")]
    BelowBase { address: u32, base: u32 },

    #[error("verification failed at 0x{address:08X}")]
    VerifyFailed { address: u32 },

    #[error("JEDEC ID 0x{0:X} does not fit in 3 bytes")]
    InvalidJedecId(u32),
}

/// Split a 24-bit JEDEC ID into the RDID response bytes
pub fn jedec_bytes(id: u32) -> Result<[u8; 3], CliError> {
    if id > 0xFF_FFFF {
        return Err(CliError::InvalidJedecId(id));
    }
    let [_, manufacturer, memory_type, capacity] = id.to_be_bytes();
    Ok([manufacturer, memory_type, capacity])
}
