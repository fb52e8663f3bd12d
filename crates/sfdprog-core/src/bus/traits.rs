//! Command bus trait definitions

use crate::error::BusError;
use crate::spi::SpiCommand;

/// A half-duplex command bus to one SPI NOR device
///
/// This is the seam between the loader and the platform's serial flash
/// controller. Everything above it speaks in [`SpiCommand`]s; everything
/// below it (controller registers, sequence tables, DMA) belongs to the
/// platform. All calls block until the transaction is finished.
///
/// The loader assumes exclusive ownership of the bus for the whole of a
/// compound operation (write enable, program, busy poll). Implementations
/// shared with other bus users must serialize at that granularity.
pub trait CommandBus {
    /// Get the maximum number of bytes that can be read in a single transaction
    fn max_read_len(&self) -> usize;

    /// Get the maximum number of bytes that can be written in a single transaction
    fn max_write_len(&self) -> usize;

    /// Execute a single command
    ///
    /// The command contains all the information needed for the transaction:
    /// - `opcode`: The command opcode
    /// - `address`: Optional address (with width)
    /// - `dummy_cycles`: Number of dummy clock cycles after address
    /// - `write_data`: Data to write after the header
    /// - `read_buf`: Buffer to read data into
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Bring up clocks, pins and the controller
    fn open(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    /// Release the controller and anything `open` claimed
    fn close(&mut self) {}
}

impl<B: CommandBus + ?Sized> CommandBus for &mut B {
    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }

    fn max_write_len(&self) -> usize {
        (**self).max_write_len()
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        (**self).execute(cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn open(&mut self) -> Result<(), BusError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// Boxed buses so a host tool can pick the backend at runtime
#[cfg(feature = "alloc")]
impl CommandBus for alloc::boxed::Box<dyn CommandBus + Send> {
    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }

    fn max_write_len(&self) -> usize {
        (**self).max_write_len()
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        (**self).execute(cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn open(&mut self) -> Result<(), BusError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
