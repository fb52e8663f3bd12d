//! Flash loader trait

use crate::error::{InitError, OpError};
use crate::sfdp::DeviceDescriptor;

/// Public flash operations, as a debugger-host flash loader needs them
///
/// Addresses are absolute host addresses inside the memory-mapped flash
/// window; implementations translate them to flash offsets.
///
/// # Example
///
/// ```ignore
/// use sfdprog_core::flash::FlashLoader;
///
/// fn program<L: FlashLoader>(loader: &mut L, addr: u32, image: &[u8]) -> Result<(), OpError> {
///     loader.erase(addr)?;
///     loader.write(addr, image)?;
///     loader.signoff()
/// }
/// ```
pub trait FlashLoader {
    /// Bring up the bus and discover the device
    ///
    /// May only succeed once per loader.
    fn init(&mut self) -> Result<(), InitError>;

    /// Read back `buf.len()` bytes at `address`
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), OpError>;

    /// Program `data` at `address`
    ///
    /// The target must have been erased. Page boundaries are handled here.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), OpError>;

    /// Erase the smallest erase granule containing `block_address`
    fn erase(&mut self, block_address: u32) -> Result<(), OpError>;

    /// Erase the whole device
    fn erase_chip(&mut self) -> Result<(), OpError>;

    /// Release the bus; further operations fail with `NotInitialized`
    fn signoff(&mut self) -> Result<(), OpError>;

    /// Geometry in use, once initialized
    fn descriptor(&self) -> Option<&DeviceDescriptor>;
}
