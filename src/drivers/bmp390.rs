//! BMP390 barometric pressure sensor.
//!
//! Raw readings are 24-bit little-endian words. Compensated values use the
//! floating-point formulas of the Bosch datasheet with the calibration
//! coefficients read from NVM by [`BMP390::init`].

use embedded_hal_async::i2c::I2c;
#[allow(unused_imports)]
use micromath::F32Ext;

use crate::error::Error;

// I2C Address
pub const BMP390_I2C_ADDRESS: u8 = 0x76;
pub const BMP390_I2C_ADDRESS_ALT: u8 = 0x77;

// Registers
const REG_CHIP_ID: u8 = 0x00;
const REG_PRESSURE_DATA: u8 = 0x04;
const REG_TEMPERATURE_DATA: u8 = 0x07;
const REG_PWR_CTRL: u8 = 0x1B;
const REG_ODR: u8 = 0x1D;
const REG_CALIBRATION: u8 = 0x31;

const CHIP_ID: u8 = 0x60;
const CALIBRATION_LENGTH: usize = 21;

// PWR_CTRL values: pressure and temperature enabled plus the mode bits
const PWR_MODE_NORMAL: u8 = 0x33;
const PWR_MODE_FORCED: u8 = 0x13;
const PWR_MODE_SLEEP: u8 = 0x00;

const ODR_MASK: u8 = 0x1F;

/// Output data rate for periodic (normal mode) measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OutputDataRate {
    Hz200 = 0x00,
    Hz100 = 0x01,
    Hz50 = 0x02,
    Hz25 = 0x03,
    Hz12p5 = 0x04,
    Hz6p25 = 0x05,
    Hz3p1 = 0x06,
    Hz1p5 = 0x07,
    Hz0p78 = 0x08,
    Hz0p39 = 0x09,
    Hz0p2 = 0x0A,
    Hz0p1 = 0x0B,
    Hz0p05 = 0x0C,
    Hz0p02 = 0x0D,
    Hz0p01 = 0x0E,
    Hz0p006 = 0x0F,
    Hz0p003 = 0x10,
    Hz0p0015 = 0x11,
}

/// Calibration coefficients, already scaled to floating point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationData {
    pub par_t1: f32,
    pub par_t2: f32,
    pub par_t3: f32,
    pub par_p1: f32,
    pub par_p2: f32,
    pub par_p3: f32,
    pub par_p4: f32,
    pub par_p5: f32,
    pub par_p6: f32,
    pub par_p7: f32,
    pub par_p8: f32,
    pub par_p9: f32,
    pub par_p10: f32,
    pub par_p11: f32,
}

fn pow2(exp: i32) -> f32 {
    // Exact for every exponent used below
    f32::from_bits(((127 + exp) as u32) << 23)
}

impl CalibrationData {
    /// Parses the NVM block starting at register 0x31.
    pub fn from_nvm(nvm: &[u8; CALIBRATION_LENGTH]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([nvm[i], nvm[i + 1]]) as f32;
        let i16_at = |i: usize| i16::from_le_bytes([nvm[i], nvm[i + 1]]) as f32;
        let i8_at = |i: usize| nvm[i] as i8 as f32;
        let offset = pow2(14);

        CalibrationData {
            par_t1: u16_at(0) * pow2(8),
            par_t2: u16_at(2) / pow2(30),
            par_t3: i8_at(4) / pow2(48),
            par_p1: (i16_at(5) - offset) / pow2(20),
            par_p2: (i16_at(7) - offset) / pow2(29),
            par_p3: i8_at(9) / pow2(32),
            par_p4: i8_at(10) / pow2(37),
            par_p5: u16_at(11) * pow2(3),
            par_p6: u16_at(13) / pow2(6),
            par_p7: i8_at(15) / pow2(8),
            par_p8: i8_at(16) / pow2(15),
            par_p9: i16_at(17) / pow2(48),
            par_p10: i8_at(19) / pow2(48),
            par_p11: i8_at(20) / pow2(65),
        }
    }

    /// Temperature in °C from a raw reading.
    pub fn compensate_temperature(&self, raw: u32) -> f32 {
        let pd1 = raw as f32 - self.par_t1;
        let pd2 = pd1 * self.par_t2;
        pd2 + pd1 * pd1 * self.par_t3
    }

    /// Pressure in Pa from a raw reading and the compensated temperature.
    pub fn compensate_pressure(&self, raw: u32, temperature: f32) -> f32 {
        let t = temperature;
        let t2 = t * t;
        let t3 = t2 * t;
        let up = raw as f32;

        let out1 = self.par_p5 + self.par_p6 * t + self.par_p7 * t2 + self.par_p8 * t3;
        let out2 = up * (self.par_p1 + self.par_p2 * t + self.par_p3 * t2 + self.par_p4 * t3);
        let up2 = up * up;
        let out3 = up2 * (self.par_p9 + self.par_p10 * t) + up2 * up * self.par_p11;

        out1 + out2 + out3
    }
}

/// Altitude in meters for `pressure` given the sea-level pressure, both in Pa.
pub fn altitude(pressure: f32, sea_level_pressure: f32) -> f32 {
    44330.0 * (1.0 - (pressure / sea_level_pressure).powf(1.0 / 5.255))
}

pub struct BMP390<I2C> {
    i2c: I2C,
    i2c_address: u8,
    calibration: Option<CalibrationData>,
}

impl<I2C: I2c> BMP390<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, BMP390_I2C_ADDRESS)
    }

    /// SDO pulled high selects 0x77.
    pub fn new_alternate(i2c: I2C) -> Self {
        Self::with_address(i2c, BMP390_I2C_ADDRESS_ALT)
    }

    fn with_address(i2c: I2C, i2c_address: u8) -> Self {
        BMP390 {
            i2c,
            i2c_address,
            calibration: None,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn calibration(&self) -> Option<&CalibrationData> {
        self.calibration.as_ref()
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.i2c_address, &[register, value]).await?;
        Ok(())
    }

    async fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.write_read(self.i2c_address, &[register], buf).await?;
        Ok(())
    }

    async fn read_u24(&mut self, register: u8) -> Result<u32, Error<I2C::Error>> {
        let mut buf = [0u8; 3];
        self.read_registers(register, &mut buf).await?;
        Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], 0]))
    }

    /// Checks the chip id and loads the calibration coefficients.
    pub async fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        let mut id = [0u8; 1];
        self.read_registers(REG_CHIP_ID, &mut id).await?;
        if id[0] != CHIP_ID {
            return Err(Error::UnexpectedDevice {
                expected: CHIP_ID,
                found: id[0],
            });
        }

        let mut nvm = [0u8; CALIBRATION_LENGTH];
        self.read_registers(REG_CALIBRATION, &mut nvm).await?;
        self.calibration = Some(CalibrationData::from_nvm(&nvm));

        crate::log_debug!("BMP390 at {} initialized", self.i2c_address);
        Ok(())
    }

    /// One measurement in forced mode; the sensor returns to sleep afterwards.
    pub async fn start_measurement_single(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_register(REG_PWR_CTRL, PWR_MODE_FORCED).await
    }

    pub async fn start_measurement_periodical(
        &mut self,
        odr: OutputDataRate,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_register(REG_ODR, odr as u8 & ODR_MASK).await?;
        self.write_register(REG_PWR_CTRL, PWR_MODE_NORMAL).await
    }

    pub async fn stop_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_register(REG_PWR_CTRL, PWR_MODE_SLEEP).await
    }

    pub async fn read_temperature_raw(&mut self) -> Result<u32, Error<I2C::Error>> {
        self.read_u24(REG_TEMPERATURE_DATA).await
    }

    pub async fn read_pressure_raw(&mut self) -> Result<u32, Error<I2C::Error>> {
        self.read_u24(REG_PRESSURE_DATA).await
    }

    /// Temperature in °C. Needs [`init`](Self::init) first.
    pub async fn read_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        let calibration = self.calibration.ok_or(Error::NotReady)?;
        let raw = self.read_temperature_raw().await?;
        Ok(calibration.compensate_temperature(raw))
    }

    /// Pressure in Pa. Needs [`init`](Self::init) first.
    pub async fn read_pressure(&mut self) -> Result<f32, Error<I2C::Error>> {
        let (_, pressure) = self.read_measurement().await?;
        Ok(pressure)
    }

    /// Temperature (°C) and pressure (Pa) from one burst read.
    pub async fn read_measurement(&mut self) -> Result<(f32, f32), Error<I2C::Error>> {
        let calibration = self.calibration.ok_or(Error::NotReady)?;

        let mut buf = [0u8; 6];
        self.read_registers(REG_PRESSURE_DATA, &mut buf).await?;
        let raw_pressure = u32::from_le_bytes([buf[0], buf[1], buf[2], 0]);
        let raw_temperature = u32::from_le_bytes([buf[3], buf[4], buf[5], 0]);

        let temperature = calibration.compensate_temperature(raw_temperature);
        let pressure = calibration.compensate_pressure(raw_pressure, temperature);
        Ok((temperature, pressure))
    }
}
