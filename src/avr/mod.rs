//! Register-level transports for the ATmega32 (12 MHz) on the teaching board.
//!
//! All of them busy-wait on hardware status flags; none use interrupts except
//! that the USART expects its RXC handler to call [`usart::Usart::on_receive`].

pub mod gpio;
pub mod registers;
pub mod spi;
pub mod twi;
pub mod usart;

pub use gpio::{OutputPortPin, Port};
pub use registers::{Mmio, RegisterBlock};
pub use spi::{BitOrder, SpiConfig, SpiMaster};
pub use twi::{Twi, TwiConfig};
pub use usart::{Usart, UsartConfig};
