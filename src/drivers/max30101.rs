//! MAX30101 pulse-oximetry module, driven through its sensor hub (MAX32664)
//! at 0x55. Every hub command is a family byte, an index byte and data.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::error::Error;

// I2C Address
const MAX30101_I2C_ADDRESS: u8 = 0x55;

// Set output mode: algorithm data
const CMD_OUTPUT_MODE_ALGORITHM: [u8; 3] = [0x10, 0x00, 0x02];
const CMD_ENABLE_AGC: [u8; 3] = [0x52, 0x00, 0x01];
const CMD_ENABLE_AFE: [u8; 3] = [0x44, 0x03, 0x01];
const CMD_ENABLE_ALGORITHM: [u8; 3] = [0x52, 0x02, 0x01];
const CMD_DISABLE_AFE: [u8; 3] = [0x44, 0x03, 0x00];
const CMD_DISABLE_ALGORITHM: [u8; 3] = [0x52, 0x02, 0x00];
const CMD_READ_OUTPUT_FIFO: [u8; 2] = [0x12, 0x01];

const SAMPLE_READY_DELAY: u32 = 20; // millisec

// Status byte followed by one algorithm sample
const RESPONSE_LENGTH: usize = 10;

pub struct MAX30101<I2C, D> {
    i2c: I2C,
    delay: D,
    i2c_address: u8,
}

impl<I2C: I2c, D: DelayNs> MAX30101<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        MAX30101 {
            i2c,
            delay,
            i2c_address: MAX30101_I2C_ADDRESS,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    async fn send(&mut self, command: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.i2c_address, command).await?;
        Ok(())
    }

    pub async fn start_measurements(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&CMD_OUTPUT_MODE_ALGORITHM).await?;
        self.send(&CMD_ENABLE_AGC).await?;
        self.send(&CMD_ENABLE_AFE).await?;
        self.send(&CMD_ENABLE_ALGORITHM).await?;
        crate::log_debug!("MAX30101 measurements started");
        Ok(())
    }

    pub async fn stop_measurements(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&CMD_DISABLE_AFE).await?;
        self.send(&CMD_DISABLE_ALGORITHM).await?;
        crate::log_debug!("MAX30101 measurements stopped");
        Ok(())
    }

    /// Fetches one sample from the hub's output FIFO.
    ///
    /// With 1, 2 or 3 slots, `values` receives (in order) bytes 0-1, 3-4
    /// and 7-8 of the sample as big-endian words. Any other length zeroes
    /// the first three slots that exist.
    pub async fn single_measurement(&mut self, values: &mut [u16]) -> Result<(), Error<I2C::Error>> {
        self.send(&CMD_READ_OUTPUT_FIFO).await?;
        self.delay.delay_ms(SAMPLE_READY_DELAY).await;

        let mut response = [0u8; RESPONSE_LENGTH];
        self.i2c.read(self.i2c_address, &mut response).await?;

        let status = response[0];
        if status != 0 {
            crate::log_warn!("MAX30101 hub status {}", status);
            return Err(Error::Device(status));
        }

        let sample = &response[1..];
        let words = [
            u16::from_be_bytes([sample[0], sample[1]]),
            u16::from_be_bytes([sample[3], sample[4]]),
            u16::from_be_bytes([sample[7], sample[8]]),
        ];

        match values.len() {
            1..=3 => {
                let len = values.len();
                values.copy_from_slice(&words[..len]);
            }
            _ => {
                for value in values.iter_mut().take(3) {
                    *value = 0;
                }
            }
        }
        Ok(())
    }
}
