//! Command bus on top of a raw write-then-read primitive
//!
//! Many platforms only offer "clock these bytes out, then clock N bytes
//! in" with chip select held across both phases. [`TransferBus`] turns
//! such a primitive into a [`CommandBus`] by serializing the command
//! header and write data into one buffer. The buffer lives on the stack
//! of the bus (no allocation), so the largest write phase is bounded by
//! its capacity.

use heapless::Vec;

use super::CommandBus;
use crate::error::BusError;
use crate::spi::SpiCommand;

/// Longest header accepted: opcode, 4 address bytes, up to 3 dummy bytes
pub const MAX_HEADER_LEN: usize = 8;

/// Default buffer capacity: one 256-byte page plus the largest header
pub const DEFAULT_TRANSFER_BUF: usize = 256 + MAX_HEADER_LEN;

/// Platform-supplied blocking byte transfer
pub trait Transfer {
    /// Write all of `write`, then fill `read`, as one chip-select frame
    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError>;

    /// Busy-wait for the given number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Longest read phase the primitive supports
    fn max_read_len(&self) -> usize {
        usize::MAX
    }
}

/// [`CommandBus`] adapter over a [`Transfer`] primitive
pub struct TransferBus<T, const N: usize = DEFAULT_TRANSFER_BUF> {
    inner: T,
}

impl<T: Transfer, const N: usize> TransferBus<T, N> {
    /// Wrap a transfer primitive
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Access the wrapped primitive
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Give the wrapped primitive back
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transfer, const N: usize> CommandBus for TransferBus<T, N> {
    fn max_read_len(&self) -> usize {
        self.inner.max_read_len()
    }

    fn max_write_len(&self) -> usize {
        N.saturating_sub(MAX_HEADER_LEN)
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        let header_len = cmd.header_len();
        if header_len > MAX_HEADER_LEN {
            return Err(BusError::CommandTooLong);
        }

        let mut frame: Vec<u8, N> = Vec::new();
        frame
            .resize(header_len, 0)
            .map_err(|_| BusError::CommandTooLong)?;
        cmd.encode_header(&mut frame);
        frame
            .extend_from_slice(cmd.write_data)
            .map_err(|_| BusError::CommandTooLong)?;

        self.inner.transfer(&frame, cmd.read_buf)
    }

    fn delay_us(&mut self, us: u32) {
        self.inner.delay_us(us)
    }
}
