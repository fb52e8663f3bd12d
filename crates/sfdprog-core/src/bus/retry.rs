//! Retry/transport adapter
//!
//! Wraps a [`CommandBus`] with the timing rules the loader relies on:
//! a settle delay before every SFDP read, range checking of SFDP
//! addresses, and a bounded status-register poll that turns a stuck
//! device into [`OpError::Timeout`] instead of a hang.

use super::CommandBus;
use crate::config::{BusyBit, RetryConfig};
use crate::error::{BusError, OpError};
use crate::spi::{AddressWidth, SpiCommand};

/// [`CommandBus`] wrapper applying [`RetryConfig`]
pub struct RetryBus<B> {
    bus: B,
    config: RetryConfig,
}

impl<B: CommandBus> RetryBus<B> {
    /// Wrap `bus` with the given timing rules
    pub fn new(bus: B, config: RetryConfig) -> Self {
        Self { bus, config }
    }

    /// Timing rules in effect
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Access the wrapped bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the wrapped bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give the wrapped bus back
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Execute a command without any extra timing
    pub fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
        self.bus.execute(cmd)
    }

    /// Read from the SFDP address space
    ///
    /// The whole range must lie below 2^24; otherwise nothing is sent.
    /// Each transaction is preceded by the configured settle delay.
    pub fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        if !AddressWidth::ThreeByte.covers(addr, buf.len()) {
            return Err(BusError::AddressOutOfRange {
                addr,
                len: buf.len(),
            });
        }

        let chunk_size = self.bus.max_read_len().max(1);
        let mut offset = 0usize;
        for chunk in buf.chunks_mut(chunk_size) {
            let len = chunk.len();
            self.bus.delay_us(self.config.sfdp_read_delay_us);
            let mut cmd = SpiCommand::read_sfdp(addr + offset as u32, chunk);
            self.bus.execute(&mut cmd)?;
            offset += len;
        }

        Ok(())
    }

    /// Read one status register
    pub fn read_status(&mut self, opcode: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        let mut cmd = SpiCommand::read_reg(opcode, &mut buf);
        self.bus.execute(&mut cmd)?;
        Ok(buf[0])
    }

    /// Poll a status register until `busy` reports idle
    ///
    /// Performs at most `attempts` reads (at least one), waiting
    /// `poll_delay_us` between them. Returns the number of reads it took.
    pub fn poll_until_idle(
        &mut self,
        status_opcode: u8,
        busy: BusyBit,
        attempts: u32,
    ) -> Result<u32, OpError> {
        let attempts = attempts.max(1);
        for n in 1..=attempts {
            let status = self.read_status(status_opcode)?;
            if !busy.is_busy(status) {
                return Ok(n);
            }
            if n < attempts {
                self.bus.delay_us(self.config.poll_delay_us);
            }
        }

        log::warn!(
            "device still busy after {} polls ({} us apart)",
            attempts,
            self.config.poll_delay_us
        );
        Err(OpError::Timeout { polls: attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::opcodes;

    /// Bus that stays busy for a fixed number of status reads
    struct BusyBus {
        busy_reads: u32,
        status_reads: u32,
        sfdp_reads: u32,
        delays: u32,
        max_read: usize,
    }

    impl BusyBus {
        fn new(busy_reads: u32) -> Self {
            Self {
                busy_reads,
                status_reads: 0,
                sfdp_reads: 0,
                delays: 0,
                max_read: 64,
            }
        }
    }

    impl CommandBus for BusyBus {
        fn max_read_len(&self) -> usize {
            self.max_read
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<(), BusError> {
            match cmd.opcode {
                opcodes::RDSR => {
                    self.status_reads += 1;
                    cmd.read_buf[0] = if self.status_reads <= self.busy_reads {
                        opcodes::SR1_WIP
                    } else {
                        0
                    };
                }
                opcodes::RDSFDP => {
                    self.sfdp_reads += 1;
                    let base = cmd.address.unwrap_or(0);
                    for (i, b) in cmd.read_buf.iter_mut().enumerate() {
                        *b = (base as usize + i) as u8;
                    }
                }
                _ => {}
            }
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {
            self.delays += 1;
        }
    }

    fn retry(bus: BusyBus) -> RetryBus<BusyBus> {
        RetryBus::new(
            bus,
            RetryConfig {
                sfdp_read_delay_us: 100,
                poll_delay_us: 10,
                max_poll_attempts: 5,
            },
        )
    }

    #[test]
    fn test_poll_becomes_idle() {
        let mut bus = retry(BusyBus::new(3));
        let polls = bus
            .poll_until_idle(opcodes::RDSR, BusyBit::default(), 10)
            .unwrap();
        assert_eq!(polls, 4);
        assert_eq!(bus.bus().delays, 3);
    }

    #[test]
    fn test_poll_timeout() {
        let mut bus = retry(BusyBus::new(u32::MAX));
        let err = bus
            .poll_until_idle(opcodes::RDSR, BusyBit::default(), 5)
            .unwrap_err();
        assert_eq!(err, OpError::Timeout { polls: 5 });
        assert_eq!(bus.bus().status_reads, 5);
    }

    #[test]
    fn test_poll_zero_attempts_still_reads_once() {
        let mut bus = retry(BusyBus::new(0));
        assert_eq!(
            bus.poll_until_idle(opcodes::RDSR, BusyBit::default(), 0),
            Ok(1)
        );
    }

    #[test]
    fn test_sfdp_read_delays_and_chunks() {
        let mut inner = BusyBus::new(0);
        inner.max_read = 16;
        let mut bus = retry(inner);

        let mut buf = [0u8; 40];
        bus.read_sfdp(0x10, &mut buf).unwrap();

        assert_eq!(bus.bus().sfdp_reads, 3);
        assert_eq!(bus.bus().delays, 3);
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf[39], 0x10 + 39);
    }

    #[test]
    fn test_sfdp_read_out_of_range() {
        let mut bus = retry(BusyBus::new(0));
        let mut buf = [0u8; 8];

        assert_eq!(
            bus.read_sfdp(0x0100_0000, &mut buf),
            Err(BusError::AddressOutOfRange {
                addr: 0x0100_0000,
                len: 8
            })
        );
        assert_eq!(
            bus.read_sfdp(0x00FF_FFFC, &mut buf),
            Err(BusError::AddressOutOfRange {
                addr: 0x00FF_FFFC,
                len: 8
            })
        );
        assert_eq!(bus.bus().sfdp_reads, 0);
        assert_eq!(bus.bus().delays, 0);
    }
}
