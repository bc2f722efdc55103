//! MAX7221 8-digit 7-segment display driver.
//!
//! Every register write is one 16-bit frame (register, data) inside its own
//! chip-select window. Logical digits count 0..=7 left to right; the board
//! wires them to the digit registers out of order, see [`digit_register`].
//!
//! Digits start in Code-B decode mode. Cells that need raw segments (text,
//! the "rr" of "Err") switch just their digit to no-decode mode.

pub mod render;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::error::Error;
use render::{Cell, DIGITS};

// Register Addresses
pub const REG_NO_OP: u8 = 0x00;
pub const REG_DIGIT0: u8 = 0x01;
pub const REG_DECODE_MODE: u8 = 0x09;
pub const REG_INTENSITY: u8 = 0x0A;
pub const REG_SCAN_LIMIT: u8 = 0x0B;
pub const REG_SHUTDOWN: u8 = 0x0C;
pub const REG_DISPLAY_TEST: u8 = 0x0F;

const DECODE_ALL: u8 = 0xFF;
const SHUTDOWN_MODE: u8 = 0x00;
const NORMAL_OPERATION: u8 = 0x01;
const DISPLAY_TEST_OFF: u8 = 0x00;
const SCAN_LIMIT_MAX: u8 = 0x07;

const STARTUP_DELAY: u32 = 100; // millisec

// Register used for digit positions outside 0..=7
const FALLBACK_DIGIT_REGISTER: u8 = 4;

/// Digit register for a logical digit position.
pub fn digit_register(digit: u8) -> u8 {
    match digit {
        0..=3 => digit + 5,
        4..=7 => digit - 3,
        _ => FALLBACK_DIGIT_REGISTER,
    }
}

fn decode_bit(register: u8) -> u8 {
    1 << (register - REG_DIGIT0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayConfig {
    /// 1..=16, applied by `start()`
    pub brightness: u8,
    /// Highest scanned digit register index, 0..=7
    pub scan_limit: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            brightness: 6,
            scan_limit: SCAN_LIMIT_MAX,
        }
    }
}

pub struct MAX7221<SPI, D> {
    spi: SPI,
    delay: D,
    config: DisplayConfig,
    started: bool,
    decode_mask: u8,
}

impl<SPI: SpiDevice, D: DelayNs> MAX7221<SPI, D> {
    pub fn new(spi: SPI, delay: D) -> Self {
        Self::with_config(spi, delay, DisplayConfig::default())
    }

    pub fn with_config(spi: SPI, delay: D, config: DisplayConfig) -> Self {
        MAX7221 {
            spi,
            delay,
            config,
            started: false,
            decode_mask: DECODE_ALL,
        }
    }

    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    async fn transfer(&mut self, register: u8, data: u8) -> Result<(), Error<SPI::Error>> {
        self.spi.write(&[register, data]).await?;
        Ok(())
    }

    fn check_field(digit: u8, length: u8) -> Result<(), Error<SPI::Error>> {
        if usize::from(digit) + usize::from(length) > DIGITS {
            return Err(Error::InvalidArgument("Field must fit within the 8 digits"));
        }
        Ok(())
    }

    /// Writes `cells` from logical `digit` onwards, switching the decode
    /// mode of the touched digits first when needed.
    async fn write_field(&mut self, digit: u8, cells: &[Cell]) -> Result<(), Error<SPI::Error>> {
        if !self.started {
            return Ok(());
        }

        let mut mask = self.decode_mask;
        for (cell, offset) in cells.iter().zip(0u8..) {
            let bit = decode_bit(digit_register(digit.saturating_add(offset)));
            if cell.is_decoded() {
                mask |= bit;
            } else {
                mask &= !bit;
            }
        }
        if mask != self.decode_mask {
            self.transfer(REG_DECODE_MODE, mask).await?;
            self.decode_mask = mask;
        }

        for (cell, offset) in cells.iter().zip(0u8..) {
            let register = digit_register(digit.saturating_add(offset));
            self.transfer(register, cell.data()).await?;
        }
        Ok(())
    }

    /// Powers the display up and blanks it.
    pub async fn start(&mut self) -> Result<(), Error<SPI::Error>> {
        self.delay.delay_ms(STARTUP_DELAY).await;

        self.transfer(REG_SHUTDOWN, SHUTDOWN_MODE).await?;
        self.transfer(REG_SCAN_LIMIT, self.config.scan_limit.min(SCAN_LIMIT_MAX))
            .await?;
        self.transfer(REG_DECODE_MODE, DECODE_ALL).await?;
        self.decode_mask = DECODE_ALL;
        self.transfer(REG_DISPLAY_TEST, DISPLAY_TEST_OFF).await?;
        self.transfer(REG_SHUTDOWN, NORMAL_OPERATION).await?;
        self.started = true;

        self.set_brightness(self.config.brightness).await?;
        self.clear_all().await?;
        crate::log_debug!("MAX7221 started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), Error<SPI::Error>> {
        if !self.started {
            return Ok(());
        }
        self.transfer(REG_SHUTDOWN, SHUTDOWN_MODE).await?;
        self.started = false;
        crate::log_debug!("MAX7221 stopped");
        Ok(())
    }

    /// Shows a Code-B value (0..=9, hyphen, E, H, L, P, blank) at `digit`.
    pub async fn set_digit(&mut self, digit: u8, value: u8) -> Result<(), Error<SPI::Error>> {
        self.write_field(digit, &[Cell::code(value)]).await
    }

    pub async fn set_digit_dp(&mut self, digit: u8, value: u8) -> Result<(), Error<SPI::Error>> {
        self.write_field(digit, &[Cell::code(value).with_dp()]).await
    }

    pub async fn clear_digit(&mut self, digit: u8) -> Result<(), Error<SPI::Error>> {
        self.write_field(digit, &[Cell::BLANK]).await
    }

    pub async fn clear_all(&mut self) -> Result<(), Error<SPI::Error>> {
        self.write_field(0, &[Cell::BLANK; DIGITS]).await
    }

    /// Brightness from 1 (1/32 duty cycle) to 16 (31/32). Values outside
    /// are clamped.
    pub async fn set_brightness(&mut self, brightness: u8) -> Result<(), Error<SPI::Error>> {
        if !self.started {
            return Ok(());
        }
        let intensity = brightness.clamp(1, 16) - 1;
        self.transfer(REG_INTENSITY, intensity).await
    }

    /// Puts every digit back into Code-B decode mode.
    pub async fn set_decode_all(&mut self) -> Result<(), Error<SPI::Error>> {
        if !self.started {
            return Ok(());
        }
        self.transfer(REG_DECODE_MODE, DECODE_ALL).await?;
        self.decode_mask = DECODE_ALL;
        Ok(())
    }

    /// Three zero-padded digits at `digit..digit + 3`.
    pub async fn print_uint8(&mut self, value: u8, digit: u8) -> Result<(), Error<SPI::Error>> {
        Self::check_field(digit, 3)?;
        let field = render::render_padded(u32::from(value), 3);
        self.write_field(digit, &field).await
    }

    pub async fn print_uint8_default(&mut self, value: u8) -> Result<(), Error<SPI::Error>> {
        self.print_int16_length(i16::from(value), 0, DIGITS as u8).await
    }

    /// A hyphen at `digit` for negative values, then three zero-padded digits.
    pub async fn print_int8(&mut self, value: i8, digit: u8) -> Result<(), Error<SPI::Error>> {
        Self::check_field(digit, 4)?;
        let field = render::render_int8(value);
        self.write_field(digit, &field).await
    }

    pub async fn print_int8_default(&mut self, value: i8) -> Result<(), Error<SPI::Error>> {
        self.print_int16_length(i16::from(value), 0, DIGITS as u8).await
    }

    /// Right-aligned in the five digits from `digit`.
    pub async fn print_uint16(&mut self, value: u16, digit: u8) -> Result<(), Error<SPI::Error>> {
        Self::check_field(digit, 5)?;
        let field = render::render_integer(i32::from(value), 5);
        self.write_field(digit, &field).await
    }

    pub async fn print_uint16_default(&mut self, value: u16) -> Result<(), Error<SPI::Error>> {
        let field = render::render_integer(i32::from(value), DIGITS);
        self.write_field(0, &field).await
    }

    /// Right-aligned in the six digits from `digit`, sign included.
    pub async fn print_int16(&mut self, value: i16, digit: u8) -> Result<(), Error<SPI::Error>> {
        self.print_int16_length(value, digit, 6).await
    }

    /// Right-aligned in `length` digits from `digit`. Shows "Err" when the
    /// number needs more.
    pub async fn print_int16_length(
        &mut self,
        value: i16,
        digit: u8,
        length: u8,
    ) -> Result<(), Error<SPI::Error>> {
        Self::check_field(digit, length)?;
        let field = render::render_integer(i32::from(value), usize::from(length));
        self.write_field(digit, &field).await
    }

    pub async fn print_int16_default(&mut self, value: i16) -> Result<(), Error<SPI::Error>> {
        self.print_int16_length(value, 0, DIGITS as u8).await
    }

    /// Over the whole display with up to `decimals` places.
    pub async fn print_float(&mut self, value: f32, decimals: u8) -> Result<(), Error<SPI::Error>> {
        self.print_float_length(value, DIGITS as u8, 0, decimals).await
    }

    pub async fn print_float_length(
        &mut self,
        value: f32,
        length: u8,
        digit: u8,
        decimals: u8,
    ) -> Result<(), Error<SPI::Error>> {
        Self::check_field(digit, length)?;
        let field = render::render_float(value, usize::from(length), decimals);
        self.write_field(digit, &field).await
    }

    /// Text in the segment font from `digit` to the end of the display.
    pub async fn print_string(&mut self, text: &str, digit: u8) -> Result<(), Error<SPI::Error>> {
        if usize::from(digit) >= DIGITS {
            return Err(Error::InvalidArgument("Digit must be between 0 and 7"));
        }
        let field = render::render_text(text, DIGITS - usize::from(digit));
        self.write_field(digit, &field).await
    }
}
