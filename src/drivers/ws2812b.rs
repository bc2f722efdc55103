//! WS2812B LED strip on a single data line.
//!
//! Each bit takes three ticks of 400 ns: the line is high for one tick for a
//! '0' and two ticks for a '1', then low for the rest. Bytes go out MSB
//! first, LEDs expect green, red, blue. After a frame the line stays low for
//! at least 50 µs so the strip latches.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::Error;

pub const TICK_NS: u32 = 400;
pub const TICKS_PER_BIT: u8 = 3;
pub const RESET_US: u32 = 50;

const HIGH_TICKS_ZERO: u8 = 1;
const HIGH_TICKS_ONE: u8 = 2;

/// Time base for the bitstream.
///
/// On the AVR this is timer 0 in CTC mode counting sub-bit ticks; anywhere
/// else [`DelayClock`] is good enough if the delay is accurate.
pub trait BitClock {
    /// Called before the first bit of a frame
    fn start(&mut self);

    /// Busy-waits for `ticks` ticks
    fn wait_ticks(&mut self, ticks: u8);

    /// Called after the last bit; holds the line low for the reset time
    fn stop(&mut self);
}

/// A [`BitClock`] on top of a blocking nanosecond delay.
pub struct DelayClock<D> {
    delay: D,
}

impl<D: DelayNs> DelayClock<D> {
    pub fn new(delay: D) -> Self {
        DelayClock { delay }
    }

    pub fn release(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> BitClock for DelayClock<D> {
    fn start(&mut self) {}

    fn wait_ticks(&mut self, ticks: u8) {
        self.delay.delay_ns(u32::from(ticks) * TICK_NS);
    }

    fn stop(&mut self) {
        self.delay.delay_us(RESET_US);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }
}

pub struct WS2812B<P, C> {
    pin: P,
    clock: C,
}

impl<P: OutputPin, C: BitClock> WS2812B<P, C> {
    pub fn new(mut pin: P, clock: C) -> Result<Self, Error<P::Error>> {
        pin.set_low().map_err(Error::Bus)?;
        Ok(WS2812B { pin, clock })
    }

    pub fn release(self) -> (P, C) {
        (self.pin, self.clock)
    }

    fn send_bit(&mut self, one: bool) -> Result<(), Error<P::Error>> {
        let high_ticks = if one { HIGH_TICKS_ONE } else { HIGH_TICKS_ZERO };

        self.pin.set_high().map_err(Error::Bus)?;
        self.clock.wait_ticks(high_ticks);
        self.pin.set_low().map_err(Error::Bus)?;
        self.clock.wait_ticks(TICKS_PER_BIT - high_ticks);
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), Error<P::Error>> {
        for bit in (0..8).rev() {
            self.send_bit(byte & (1 << bit) != 0)?;
        }
        Ok(())
    }

    fn frame<I: IntoIterator<Item = u8>>(&mut self, bytes: I) -> Result<(), Error<P::Error>> {
        self.clock.start();
        let result = bytes.into_iter().try_for_each(|byte| self.send_byte(byte));
        self.clock.stop();
        result
    }

    /// Sends raw bytes as one frame, followed by the reset pause.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), Error<P::Error>> {
        self.frame(bytes.iter().copied())
    }

    pub fn send_rgb(&mut self, leds: &[Rgb]) -> Result<(), Error<P::Error>> {
        self.frame(leds.iter().flat_map(|led| [led.g, led.r, led.b]))
    }
}
