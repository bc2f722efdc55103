//! I2C master on the ATmega32 two-wire interface.
//!
//! Every primitive busy-waits on TWINT and then checks the TWSR status code.
//! `Twi` implements both the blocking and the async `embedded-hal` I2C
//! traits; the async version simply runs the blocking transaction.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress};

use super::registers::{twcr, RegisterBlock, DDRC, PORTC, TWBR, TWCR, TWDR, TWSR};

const STATUS_MASK: u8 = 0xF8;

// TWSR status codes, master transmitter / receiver
const START: u8 = 0x08;
const REP_START: u8 = 0x10;
const MT_SLA_ACK: u8 = 0x18;
const MT_SLA_NACK: u8 = 0x20;
const MT_DATA_ACK: u8 = 0x28;
const MT_DATA_NACK: u8 = 0x30;
const ARB_LOST: u8 = 0x38;
const MR_SLA_ACK: u8 = 0x40;
const MR_SLA_NACK: u8 = 0x48;
const MR_DATA_ACK: u8 = 0x50;
const MR_DATA_NACK: u8 = 0x58;

// SDA/SCL sit on PC1/PC0
const TWI_PINS: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Write = 0,
    Read = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TwiConfig {
    pub cpu_frequency: u32,
    pub bus_frequency: u32,
}

impl Default for TwiConfig {
    fn default() -> Self {
        Self {
            cpu_frequency: 12_000_000,
            bus_frequency: 100_000,
        }
    }
}

/// TWPS prescaler bits and TWBR value for a requested SCL frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TwiTiming {
    pub prescaler_bits: u8,
    pub bitrate: u8,
}

impl TwiTiming {
    pub fn compute(cpu_frequency: u32, bus_frequency: u32) -> Self {
        let (prescaler, prescaler_bits) = match bus_frequency {
            0..=83_333 => (64, 3),
            83_334..=250_000 => (16, 2),
            250_001..=500_000 => (4, 1),
            _ => (1, 0),
        };

        let ratio = cpu_frequency.checked_div(bus_frequency).unwrap_or(u32::MAX);
        let bitrate = ratio.saturating_sub(16) / (2 * prescaler);

        TwiTiming {
            prescaler_bits,
            bitrate: bitrate.min(u32::from(u8::MAX)) as u8,
        }
    }
}

pub struct Twi<R> {
    regs: R,
}

impl<R: RegisterBlock> Twi<R> {
    pub fn new(regs: R, config: TwiConfig) -> Self {
        let timing = TwiTiming::compute(config.cpu_frequency, config.bus_frequency);

        // Release SDA/SCL; the external pull-ups hold the lines high
        regs.clear_bits(DDRC, TWI_PINS);
        regs.clear_bits(PORTC, TWI_PINS);

        regs.write(TWSR, timing.prescaler_bits);
        regs.write(TWBR, timing.bitrate);
        regs.write(TWCR, twcr::TWEN);

        crate::log_debug!(
            "TWI up: prescaler bits {}, TWBR {}",
            timing.prescaler_bits,
            timing.bitrate
        );

        Twi { regs }
    }

    pub fn release(self) -> R {
        self.regs
    }

    fn wait_for_twint(&self) {
        while self.regs.read(TWCR) & twcr::TWINT == 0 {}
    }

    fn status(&self) -> u8 {
        self.regs.read(TWSR) & STATUS_MASK
    }

    fn expect(&self, expected: u8) -> Result<(), ErrorKind> {
        match self.status() {
            s if s == expected => Ok(()),
            s => Err(status_to_error(s)),
        }
    }

    /// Sends a START (or repeated START) condition.
    pub fn start(&mut self) -> Result<(), ErrorKind> {
        self.regs
            .write(TWCR, twcr::TWINT | twcr::TWSTA | twcr::TWEN);
        self.wait_for_twint();
        match self.status() {
            START | REP_START => Ok(()),
            s => Err(status_to_error(s)),
        }
    }

    /// Sends a STOP condition and waits until the hardware has released the bus.
    pub fn stop(&mut self) {
        self.regs
            .write(TWCR, twcr::TWINT | twcr::TWSTO | twcr::TWEN);
        while self.regs.read(TWCR) & twcr::TWSTO != 0 {}
    }

    pub fn send_address(&mut self, address: u8, direction: Direction) -> Result<(), ErrorKind> {
        self.regs.write(TWDR, (address << 1) | direction as u8);
        self.regs.write(TWCR, twcr::TWINT | twcr::TWEN);
        self.wait_for_twint();
        match direction {
            Direction::Write => self.expect(MT_SLA_ACK),
            Direction::Read => self.expect(MR_SLA_ACK),
        }
    }

    pub fn send_byte(&mut self, byte: u8) -> Result<(), ErrorKind> {
        self.regs.write(TWDR, byte);
        self.regs.write(TWCR, twcr::TWINT | twcr::TWEN);
        self.wait_for_twint();
        self.expect(MT_DATA_ACK)
    }

    /// Clocks in one byte, answering with ACK when `ack` is set and NACK otherwise.
    pub fn receive_byte(&mut self, ack: bool) -> Result<u8, ErrorKind> {
        let control = if ack {
            twcr::TWINT | twcr::TWEN | twcr::TWEA
        } else {
            twcr::TWINT | twcr::TWEN
        };
        self.regs.write(TWCR, control);
        self.wait_for_twint();
        self.expect(if ack { MR_DATA_ACK } else { MR_DATA_NACK })?;
        Ok(self.regs.read(TWDR))
    }

    fn run(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        let mut current: Option<Direction> = None;

        for i in 0..operations.len() {
            let next_is_read = matches!(operations.get(i + 1), Some(Operation::Read(_)));

            match &mut operations[i] {
                Operation::Write(data) => {
                    if current != Some(Direction::Write) {
                        self.start()?;
                        self.send_address(address, Direction::Write)?;
                        current = Some(Direction::Write);
                    }
                    for &byte in data.iter() {
                        self.send_byte(byte)?;
                    }
                }
                Operation::Read(buffer) => {
                    if current != Some(Direction::Read) {
                        self.start()?;
                        self.send_address(address, Direction::Read)?;
                        current = Some(Direction::Read);
                    }
                    let len = buffer.len();
                    for (j, byte) in buffer.iter_mut().enumerate() {
                        // NACK the final byte before a direction change or STOP
                        let last = j + 1 == len && !next_is_read;
                        *byte = self.receive_byte(!last)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn status_to_error(status: u8) -> ErrorKind {
    match status {
        MT_SLA_NACK | MR_SLA_NACK => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
        MT_DATA_NACK => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
        ARB_LOST => ErrorKind::ArbitrationLoss,
        _ => ErrorKind::Bus,
    }
}

impl<R: RegisterBlock> embedded_hal::i2c::ErrorType for Twi<R> {
    type Error = ErrorKind;
}

impl<R: RegisterBlock> embedded_hal::i2c::I2c<SevenBitAddress> for Twi<R> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if operations.is_empty() {
            return Ok(());
        }

        let result = self.run(address, operations);
        self.stop();

        if let Err(e) = result {
            crate::log_warn!("TWI transaction with {} failed, TWSR {}", address, self.status());
            return Err(e);
        }
        Ok(())
    }
}

impl<R: RegisterBlock> embedded_hal_async::i2c::I2c<SevenBitAddress> for Twi<R> {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        embedded_hal::i2c::I2c::transaction(self, address, operations)
    }
}
