//! Single output pins on the ATmega32 ports.

use core::convert::Infallible;

use super::registers::{Reg, RegisterBlock, DDRB, DDRC, DDRD, PORTB, PORTC, PORTD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    B,
    C,
    D,
}

impl Port {
    fn ddr(self) -> Reg {
        match self {
            Port::B => DDRB,
            Port::C => DDRC,
            Port::D => DDRD,
        }
    }

    fn port(self) -> Reg {
        match self {
            Port::B => PORTB,
            Port::C => PORTC,
            Port::D => PORTD,
        }
    }
}

/// A port pin switched to output, used for chip selects and the LED data line.
pub struct OutputPortPin<R> {
    regs: R,
    port: Port,
    mask: u8,
}

impl<R: RegisterBlock> OutputPortPin<R> {
    /// Drives the pin to `initial_high` before enabling the output driver,
    /// so a chip select never glitches low. `pin` is taken modulo 8.
    pub fn new(regs: R, port: Port, pin: u8, initial_high: bool) -> Self {
        let mask = 1 << (pin & 0x07);
        if initial_high {
            regs.set_bits(port.port(), mask);
        } else {
            regs.clear_bits(port.port(), mask);
        }
        regs.set_bits(port.ddr(), mask);

        OutputPortPin { regs, port, mask }
    }
}

impl<R: RegisterBlock> embedded_hal::digital::ErrorType for OutputPortPin<R> {
    type Error = Infallible;
}

impl<R: RegisterBlock> embedded_hal::digital::OutputPin for OutputPortPin<R> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.regs.clear_bits(self.port.port(), self.mask);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.regs.set_bits(self.port.port(), self.mask);
        Ok(())
    }
}

impl<R: RegisterBlock> embedded_hal::digital::StatefulOutputPin for OutputPortPin<R> {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.regs.read(self.port.port()) & self.mask != 0)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.regs.read(self.port.port()) & self.mask == 0)
    }
}
