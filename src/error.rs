//! Error type shared by all device drivers.

use core::fmt;

/// Driver error, generic over the bus error `E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The underlying I2C/SPI transaction or GPIO line failed
    Bus(E),
    /// A received data word failed its CRC check
    Crc,
    /// An argument was outside the range the device accepts
    InvalidArgument(&'static str),
    /// The device has no new data yet
    NotReady,
    /// An identification register did not hold the expected value
    UnexpectedDevice { expected: u8, found: u8 },
    /// The device answered with a failure status
    Device(u8),
}

impl<E> From<E> for Error<E> {
    fn from(value: E) -> Self {
        Error::Bus(value)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::Crc => f.write_str("CRC mismatch in received data"),
            Error::InvalidArgument(msg) => f.write_str(msg),
            Error::NotReady => f.write_str("Sensor not ready yet. Try again in a few seconds"),
            Error::UnexpectedDevice { expected, found } => {
                write!(f, "unexpected device id {:#x} (expected {:#x})", found, expected)
            }
            Error::Device(status) => write!(f, "device reported status {:#x}", status),
        }
    }
}
