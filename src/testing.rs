//! Mock bus, delay and pin implementations for the driver tests.
//!
//! The mocks record everything the driver does and replay read data that the
//! test queued up front.

use embedded_hal::i2c::{ErrorKind as I2cErrorKind, NoAcknowledgeSource};
use embedded_hal::spi::ErrorKind as SpiErrorKind;
use std::collections::VecDeque;
use std::vec::Vec;

/// I2C transaction type for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cTransaction {
    /// Write transaction
    Write { addr: u8, data: Vec<u8> },
    /// Read transaction
    Read { addr: u8, len: usize },
    /// Write-Read transaction
    WriteRead {
        addr: u8,
        write_data: Vec<u8>,
        read_len: usize,
    },
}

/// Mock I2C bus
///
/// Records all transactions and answers reads from a queue of bytes.
/// Reads past the end of the queue return zeros.
#[derive(Debug, Default)]
pub struct MockI2c {
    transactions: Vec<I2cTransaction>,
    read_data: VecDeque<u8>,
    fail_in: Option<usize>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<I2cTransaction> {
        self.transactions.clone()
    }

    pub fn clear_transactions(&mut self) {
        self.transactions.clear();
    }

    /// Queue bytes for subsequent read operations
    pub fn push_read_data(&mut self, data: &[u8]) {
        self.read_data.extend(data.iter().copied());
    }

    /// Let the next transaction fail with an address NACK
    pub fn fail_next(&mut self) {
        self.fail_after(0);
    }

    /// Let `n` transactions through, then fail the one after them
    pub fn fail_after(&mut self, n: usize) {
        self.fail_in = Some(n);
    }

    /// Bytes of every write, in order, for one device address
    pub fn written(&self, addr: u8) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                I2cTransaction::Write { addr: a, data } if *a == addr => Some(data.clone()),
                I2cTransaction::WriteRead {
                    addr: a,
                    write_data,
                    ..
                } if *a == addr => Some(write_data.clone()),
                _ => None,
            })
            .collect()
    }

    fn fill(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.read_data.pop_front().unwrap_or(0);
        }
    }
}

impl embedded_hal::i2c::ErrorType for MockI2c {
    type Error = I2cErrorKind;
}

impl embedded_hal_async::i2c::I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        use embedded_hal::i2c::Operation;

        match self.fail_in {
            Some(0) => {
                self.fail_in = None;
                return Err(I2cErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            Some(n) => self.fail_in = Some(n - 1),
            None => {}
        }

        let record = match operations {
            [Operation::Write(data)] => I2cTransaction::Write {
                addr: address,
                data: data.to_vec(),
            },
            [Operation::Read(buf)] => {
                let len = buf.len();
                self.fill(buf);
                I2cTransaction::Read { addr: address, len }
            }
            [Operation::Write(data), Operation::Read(buf)] => {
                let read_len = buf.len();
                self.fill(buf);
                I2cTransaction::WriteRead {
                    addr: address,
                    write_data: data.to_vec(),
                    read_len,
                }
            }
            _ => return Err(I2cErrorKind::Other),
        };
        self.transactions.push(record);
        Ok(())
    }
}

/// Mock SPI device
///
/// One entry per chip-select window, holding every byte clocked out.
#[derive(Debug, Default)]
pub struct MockSpi {
    frames: Vec<Vec<u8>>,
    read_data: VecDeque<u8>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.clone()
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    pub fn push_read_data(&mut self, data: &[u8]) {
        self.read_data.extend(data.iter().copied());
    }
}

impl embedded_hal::spi::ErrorType for MockSpi {
    type Error = SpiErrorKind;
}

impl embedded_hal_async::spi::SpiDevice<u8> for MockSpi {
    async fn transaction(
        &mut self,
        operations: &mut [embedded_hal::spi::Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        use embedded_hal::spi::Operation;

        let mut frame = Vec::new();
        for op in operations.iter_mut() {
            match op {
                Operation::Write(data) => frame.extend_from_slice(data),
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = self.read_data.pop_front().unwrap_or(0);
                    }
                }
                Operation::Transfer(read, write) => {
                    frame.extend_from_slice(write);
                    for b in read.iter_mut() {
                        *b = self.read_data.pop_front().unwrap_or(0);
                    }
                }
                Operation::TransferInPlace(buf) => {
                    frame.extend_from_slice(buf);
                    for b in buf.iter_mut() {
                        *b = self.read_data.pop_front().unwrap_or(0);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        self.frames.push(frame);
        Ok(())
    }
}

/// Mock delay that returns immediately and remembers what was asked for
#[derive(Debug, Default)]
pub struct MockDelay {
    ms_calls: Vec<u32>,
    total_ns: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond delays in call order
    pub fn ms_calls(&self) -> Vec<u32> {
        self.ms_calls.clone()
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }

    pub fn total_ns(&self) -> u64 {
        self.total_ns
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.ms_calls.push(ms);
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.ms_calls.push(ms);
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

/// Mock output pin recording every level it was driven to
#[derive(Debug, Default)]
pub struct MockPin {
    levels: Vec<bool>,
    fail_in: Option<usize>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> &[bool] {
        &self.levels
    }

    pub fn is_high(&self) -> bool {
        self.levels.last().copied().unwrap_or(false)
    }

    /// Let the next level change fail
    pub fn fail_next(&mut self) {
        self.fail_after(0);
    }

    /// Let `n` level changes through, then fail the one after them
    pub fn fail_after(&mut self, n: usize) {
        self.fail_in = Some(n);
    }

    fn drive(&mut self, high: bool) -> Result<(), embedded_hal::digital::ErrorKind> {
        match self.fail_in {
            Some(0) => {
                self.fail_in = None;
                return Err(embedded_hal::digital::ErrorKind::Other);
            }
            Some(n) => self.fail_in = Some(n - 1),
            None => {}
        }
        self.levels.push(high);
        Ok(())
    }
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = embedded_hal::digital::ErrorKind;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::I2c;

    #[test]
    fn test_mock_i2c_write_read() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x12, 0x34]);

        let mut read_buf = [0u8; 2];
        block_on(i2c.write_read(0x52, &[0xA0], &mut read_buf)).unwrap();

        assert_eq!(read_buf, [0x12, 0x34]);
        assert_eq!(
            i2c.transactions(),
            vec![I2cTransaction::WriteRead {
                addr: 0x52,
                write_data: vec![0xA0],
                read_len: 2
            }]
        );
    }

    #[test]
    fn test_mock_i2c_fail_next() {
        let mut i2c = MockI2c::new();
        i2c.fail_next();
        assert!(block_on(i2c.write(0x50, &[0x01])).is_err());
        assert!(block_on(i2c.write(0x50, &[0x01])).is_ok());
        assert_eq!(i2c.written(0x50), vec![vec![0x01]]);
    }
}
