//! SPI master on the ATmega32 hardware SPI block.
//!
//! `SpiMaster` is a bus: it clocks bytes but never touches a chip select.
//! Wrap it in `embedded_hal_bus::spi::ExclusiveDevice` together with a
//! [`OutputPortPin`](super::gpio::OutputPortPin) to get a `SpiDevice`.

use embedded_hal::spi::{ErrorKind, Mode, Phase, Polarity, MODE_0};

use super::registers::{spi, RegisterBlock, DDRB, PORTB, SPCR, SPDR, SPSR};

const PIN_SS: u8 = 1 << 4;
const PIN_MOSI: u8 = 1 << 5;
const PIN_MISO: u8 = 1 << 6;
const PIN_SCK: u8 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// Divider of the CPU clock; rounded up to the next one the hardware has
    pub prescaler: u8,
    pub bit_order: BitOrder,
    pub mode: Mode,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            prescaler: 16,
            bit_order: BitOrder::MsbFirst,
            mode: MODE_0,
        }
    }
}

/// SPR1:0 bits for SPCR and whether SPI2X must be set.
fn clock_bits(prescaler: u8) -> (u8, bool) {
    match prescaler {
        0..=2 => (0, true),
        3..=4 => (0, false),
        5..=8 => (spi::SPR0, true),
        9..=16 => (spi::SPR0, false),
        17..=32 => (spi::SPR1, true),
        33..=64 => (spi::SPR1, false),
        _ => (spi::SPR1 | spi::SPR0, false),
    }
}

pub struct SpiMaster<R> {
    regs: R,
}

impl<R: RegisterBlock> SpiMaster<R> {
    pub fn new(regs: R, config: SpiConfig) -> Self {
        regs.set_bits(DDRB, PIN_MOSI | PIN_SCK | PIN_SS);
        regs.clear_bits(DDRB, PIN_MISO);
        // SS high, or a low level on it would drop the block into slave mode
        regs.set_bits(PORTB, PIN_SS);

        let (spr, double_speed) = clock_bits(config.prescaler);

        let mut control = spi::SPE | spi::MSTR | spr;
        if config.bit_order == BitOrder::LsbFirst {
            control |= spi::DORD;
        }
        if config.mode.polarity == Polarity::IdleHigh {
            control |= spi::CPOL;
        }
        if config.mode.phase == Phase::CaptureOnSecondTransition {
            control |= spi::CPHA;
        }
        regs.write(SPCR, control);

        if double_speed {
            regs.set_bits(SPSR, spi::SPI2X);
        } else {
            regs.clear_bits(SPSR, spi::SPI2X);
        }

        crate::log_debug!("SPI up: SPCR {}", control);

        SpiMaster { regs }
    }

    pub fn release(self) -> R {
        self.regs
    }

    /// Shifts one byte out and returns the byte shifted in.
    pub fn transfer_byte(&mut self, byte: u8) -> u8 {
        self.regs.write(SPDR, byte);
        while self.regs.read(SPSR) & spi::SPIF == 0 {}
        // Reading SPDR after SPSR clears SPIF
        self.regs.read(SPDR)
    }
}

impl<R: RegisterBlock> embedded_hal::spi::ErrorType for SpiMaster<R> {
    type Error = ErrorKind;
}

impl<R: RegisterBlock> embedded_hal::spi::SpiBus<u8> for SpiMaster<R> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(0x00);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.transfer_byte(word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());
        for i in 0..len {
            let received = self.transfer_byte(write.get(i).copied().unwrap_or(0x00));
            if let Some(slot) = read.get_mut(i) {
                *slot = received;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<R: RegisterBlock> embedded_hal_async::spi::SpiBus<u8> for SpiMaster<R> {
    async fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiBus::read(self, words)
    }

    async fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiBus::write(self, words)
    }

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiBus::transfer(self, read, write)
    }

    async fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiBus::transfer_in_place(self, words)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
