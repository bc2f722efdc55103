#![cfg_attr(not(test), no_std)]

//! Peripheral drivers for the sensor and display modules of the AVR teaching board.
//!
//! The `avr` module holds the register-level TWI, SPI and USART transports of the
//! ATmega32. Everything under `drivers` is written against the `embedded-hal` traits,
//! so the same drivers also run on top of an embassy HAL.

#[macro_use]
pub mod logging;

pub mod avr;
pub mod drivers;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;
