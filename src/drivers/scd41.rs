use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::error::Error;

// I2C Address
const SCD41_I2C_ADDRESS: u8 = 0x62;

// Basic commands
const CMD_START_PERIODIC_MEASUREMENT: [u8; 2] = [0x21, 0xB1];
const CMD_READ_MEASUREMENT: [u8; 2] = [0xEC, 0x05];
const CMD_STOP_PERIODIC_MEASUREMENT: [u8; 2] = [0x3F, 0x86];

// On-chip output signal compensation
const CMD_SET_TEMPERATURE_OFFSET: [u8; 2] = [0x24, 0x1D];
const CMD_GET_TEMPERATURE_OFFSET: [u8; 2] = [0x23, 0x18];
const CMD_SET_SENSOR_ALTITUDE: [u8; 2] = [0x24, 0x27];
const CMD_GET_SENSOR_ALTITUDE: [u8; 2] = [0x23, 0x22];
const CMD_AMBIENT_PRESSURE: [u8; 2] = [0xE0, 0x00];

// Field calibration
const CMD_PERFORM_FORCED_RECALIBRATION: [u8; 2] = [0x36, 0x2F];
const CMD_SET_AUTOMATIC_SELF_CALIBRATION_ENABLED: [u8; 2] = [0x24, 0x16];
const CMD_GET_AUTOMATIC_SELF_CALIBRATION_ENABLED: [u8; 2] = [0x23, 0x13];
const CMD_SET_AUTOMATIC_SELF_CALIBRATION_TARGET: [u8; 2] = [0x24, 0x3A];
const CMD_GET_AUTOMATIC_SELF_CALIBRATION_TARGET: [u8; 2] = [0x23, 0x3F];

// Low power periodic measurement mode
const CMD_START_LOW_POWER_PERIODIC_MEASUREMENT: [u8; 2] = [0x21, 0xAC];
const CMD_GET_DATA_READY_STATUS: [u8; 2] = [0xE4, 0xB8];

// Advanced features
const CMD_PERSIST_SETTINGS: [u8; 2] = [0x36, 0x15];
const CMD_GET_SERIAL_NUMBER: [u8; 2] = [0x36, 0x82];
const CMD_PERFORM_SELF_TEST: [u8; 2] = [0x36, 0x39];
const CMD_PERFORM_FACTORY_RESET: [u8; 2] = [0x36, 0x32];
const CMD_REINIT: [u8; 2] = [0x36, 0x46];
const CMD_GET_SENSOR_VARIANT: [u8; 2] = [0x20, 0x2F];

// Single shot measurement mode
const CMD_MEASURE_SINGLE_SHOT: [u8; 2] = [0x21, 0x9D];
const CMD_MEASURE_SINGLE_SHOT_RHT_ONLY: [u8; 2] = [0x21, 0x96];
const CMD_POWER_DOWN: [u8; 2] = [0x36, 0xE0];
const CMD_WAKE_UP: [u8; 2] = [0x36, 0xF6];
const CMD_SET_AUTOMATIC_SELF_CALIBRATION_INITIAL_PERIOD: [u8; 2] = [0x24, 0x45];
const CMD_GET_AUTOMATIC_SELF_CALIBRATION_INITIAL_PERIOD: [u8; 2] = [0x23, 0x40];
const CMD_SET_AUTOMATIC_SELF_CALIBRATION_STANDARD_PERIOD: [u8; 2] = [0x24, 0x4E];
const CMD_GET_AUTOMATIC_SELF_CALIBRATION_STANDARD_PERIOD: [u8; 2] = [0x23, 0x4B];

// Execution times (in milliseconds)
const EXECUTION_TIME_DEFAULT: u32 = 1;
const EXECUTION_TIME_STOP_PERIODIC_MEASUREMENT: u32 = 500;
const EXECUTION_TIME_PERFORM_FORCED_RECALIBRATION: u32 = 400;
const EXECUTION_TIME_PERSIST_SETTINGS: u32 = 800;
const EXECUTION_TIME_PERFORM_SELF_TEST: u32 = 10_000;
const EXECUTION_TIME_PERFORM_FACTORY_RESET: u32 = 1200;
const EXECUTION_TIME_REINIT: u32 = 30;
const EXECUTION_TIME_MEASURE_SINGLE_SHOT: u32 = 5000;
const EXECUTION_TIME_MEASURE_SINGLE_SHOT_RHT_ONLY: u32 = 50;
const EXECUTION_TIME_WAKE_UP: u32 = 30;

// Factory values restored by `SensorSettings::Default`
const DEFAULT_TEMPERATURE_OFFSET: f32 = 4.0;
const DEFAULT_SENSOR_ALTITUDE: u16 = 0;

const FRC_FAILED: u16 = 0xFFFF;
const DATA_READY_MASK: u16 = 0x07FF;

/// Sensirion CRC-8: polynomial 0x31, init 0xFF, no final XOR.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x31;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scd41Config {
    pub address: u8,
    /// Check the CRC byte after every received word
    pub verify_crc: bool,
}

impl Default for Scd41Config {
    fn default() -> Self {
        Self {
            address: SCD41_I2C_ADDRESS,
            verify_crc: true,
        }
    }
}

/// Compensation applied by [`SCD41::init`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorSettings {
    /// Factory temperature offset (4 °C) and altitude (0 m)
    Default,
    Custom {
        /// Temperature currently reported by the SCD41, °C
        current_temp: f32,
        /// Temperature measured by a reference sensor, °C
        reference_temp: f32,
        /// Ambient pressure, Pa
        pressure: u32,
        /// Altitude above sea level, m
        altitude: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub co2_ppm: u16,
    pub temperature_c: f32,
    pub humidity_percent: f32,
}

/// Measurement words as sent by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawMeasurement {
    pub co2: u16,
    pub temperature: u16,
    pub humidity: u16,
}

impl RawMeasurement {
    pub fn convert(&self) -> Measurement {
        Measurement {
            co2_ppm: self.co2,
            temperature_c: -45.0 + 175.0 * self.temperature as f32 / 65535.0,
            humidity_percent: 100.0 * self.humidity as f32 / 65535.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorVariant {
    SCD40,
    SCD41,
    SCD43,
    Unknown(u8),
}

impl From<u16> for SensorVariant {
    fn from(word: u16) -> Self {
        match (word >> 12) as u8 {
            0b0000 => SensorVariant::SCD40,
            0b0001 => SensorVariant::SCD41,
            0b0101 => SensorVariant::SCD43,
            other => SensorVariant::Unknown(other),
        }
    }
}

pub struct SCD41<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Scd41Config,
    measuring: bool,
    last: Option<RawMeasurement>,
}

impl<I2C: I2c, D: DelayNs> SCD41<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, Scd41Config::default())
    }

    pub fn with_config(i2c: I2C, delay: D, config: Scd41Config) -> Self {
        SCD41 {
            i2c,
            delay,
            config,
            measuring: false,
            last: None,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring
    }

    pub fn last_raw(&self) -> Option<RawMeasurement> {
        self.last
    }

    pub fn last_measurement(&self) -> Option<Measurement> {
        self.last.map(|raw| raw.convert())
    }

    pub fn co2(&self) -> Option<u16> {
        self.last.map(|raw| raw.co2)
    }

    pub fn temperature(&self) -> Option<f32> {
        self.last_measurement().map(|m| m.temperature_c)
    }

    pub fn humidity(&self) -> Option<f32> {
        self.last_measurement().map(|m| m.humidity_percent)
    }

    async fn send_command(&mut self, command: [u8; 2], wait_ms: u32) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.config.address, &command).await?;
        if wait_ms > 0 {
            self.delay.delay_ms(wait_ms).await;
        }
        Ok(())
    }

    async fn write_command(
        &mut self,
        command: [u8; 2],
        word: u16,
        wait_ms: u32,
    ) -> Result<(), Error<I2C::Error>> {
        let data = word.to_be_bytes();
        let frame = [command[0], command[1], data[0], data[1], crc8(&data)];
        self.i2c.write(self.config.address, &frame).await?;
        self.delay.delay_ms(wait_ms).await;
        Ok(())
    }

    /// Reads `N` words after a command (or a write command) has been executed.
    async fn fetch_words<const N: usize>(&mut self) -> Result<[u16; N], Error<I2C::Error>> {
        // Three bytes per word: MSB, LSB, CRC. Nine is the longest response.
        const { assert!(N <= 3, "SCD41 responses are at most three words") };
        let mut buf = [0u8; 9];
        let len = N * 3;
        self.i2c.read(self.config.address, &mut buf[..len]).await?;

        let mut words = [0u16; N];
        for (word, chunk) in words.iter_mut().zip(buf[..len].chunks_exact(3)) {
            if self.config.verify_crc && crc8(&chunk[..2]) != chunk[2] {
                crate::log_warn!("SCD41 CRC mismatch");
                return Err(Error::Crc);
            }
            *word = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Ok(words)
    }

    async fn read_words<const N: usize>(
        &mut self,
        command: [u8; 2],
        wait_ms: u32,
    ) -> Result<[u16; N], Error<I2C::Error>> {
        self.send_command(command, wait_ms).await?;
        self.fetch_words::<N>().await
    }

    async fn read_word(&mut self, command: [u8; 2]) -> Result<u16, Error<I2C::Error>> {
        let [word] = self.read_words::<1>(command, EXECUTION_TIME_DEFAULT).await?;
        Ok(word)
    }

    fn check_temperature_offset(offset: f32) -> Result<(), Error<I2C::Error>> {
        if !(0.0..=20.0).contains(&offset) {
            return Err(Error::InvalidArgument(
                "Temperature offset must be between 0 °C and 20 °C",
            ));
        }
        Ok(())
    }

    fn check_altitude(altitude: u16) -> Result<(), Error<I2C::Error>> {
        if altitude > 3000 {
            return Err(Error::InvalidArgument(
                "Altitude must be between 0 and 3000 meters",
            ));
        }
        Ok(())
    }

    fn check_pressure(pressure: u32) -> Result<(), Error<I2C::Error>> {
        if !(70_000..=120_000).contains(&pressure) {
            return Err(Error::InvalidArgument(
                "Pressure must be between 70_000 and 120_000 Pa",
            ));
        }
        Ok(())
    }

    /// Stops any running measurement, applies `settings` and starts periodic measurement.
    /// `None` only restarts the measurement.
    ///
    /// A `Custom` offset that lands outside 0..=20 °C is only known once the
    /// previous offset has been read; measurement is restarted before that
    /// error is returned, with the compensation left untouched.
    pub async fn init(&mut self, settings: Option<SensorSettings>) -> Result<(), Error<I2C::Error>> {
        if let Some(SensorSettings::Custom {
            pressure, altitude, ..
        }) = settings
        {
            Self::check_altitude(altitude)?;
            Self::check_pressure(pressure)?;
        }

        self.stop_periodic_measurement().await?;

        match settings {
            None => {}
            Some(SensorSettings::Default) => {
                self.set_temperature_offset(DEFAULT_TEMPERATURE_OFFSET)
                    .await?;
                self.set_sensor_altitude(DEFAULT_SENSOR_ALTITUDE).await?;
            }
            Some(SensorSettings::Custom {
                current_temp,
                reference_temp,
                altitude,
                ..
            }) => {
                let previous = self.get_temperature_offset().await?;
                let offset = current_temp - reference_temp + previous;
                if let Err(e) = Self::check_temperature_offset(offset) {
                    crate::log_warn!("SCD41 computed offset out of range");
                    self.start_periodic_measurement().await?;
                    return Err(e);
                }
                self.set_temperature_offset(offset).await?;
                self.set_sensor_altitude(altitude).await?;
            }
        }

        self.start_periodic_measurement().await?;

        // Ambient pressure is the one setting accepted while measuring
        if let Some(SensorSettings::Custom { pressure, .. }) = settings {
            self.set_ambient_pressure(pressure).await?;
        }

        crate::log_debug!("SCD41 initialized");
        Ok(())
    }

    /// Writes the current configuration to EEPROM. A running periodic
    /// measurement is stopped for the write and restarted afterwards.
    pub async fn persist(&mut self) -> Result<(), Error<I2C::Error>> {
        let was_measuring = self.measuring;
        if was_measuring {
            self.stop_periodic_measurement().await?;
        }

        self.persist_settings().await?;

        if was_measuring {
            self.start_periodic_measurement().await?;
        }
        Ok(())
    }

    pub async fn start_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_START_PERIODIC_MEASUREMENT, 0).await?;
        self.measuring = true;
        crate::log_debug!("SCD41 periodic measurement started");
        Ok(())
    }

    pub async fn start_low_power_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_START_LOW_POWER_PERIODIC_MEASUREMENT, 0)
            .await?;
        self.measuring = true;
        crate::log_debug!("SCD41 low power periodic measurement started");
        Ok(())
    }

    pub async fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(
            CMD_STOP_PERIODIC_MEASUREMENT,
            EXECUTION_TIME_STOP_PERIODIC_MEASUREMENT,
        )
        .await?;
        self.measuring = false;
        crate::log_debug!("SCD41 periodic measurement stopped");
        Ok(())
    }

    pub async fn get_data_ready_status(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self.read_word(CMD_GET_DATA_READY_STATUS).await?;
        Ok(status & DATA_READY_MASK != 0)
    }

    /// Reads the latest measurement, or `Error::NotReady` if none is pending.
    pub async fn read_measurement(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        if !self.get_data_ready_status().await? {
            return Err(Error::NotReady);
        }

        let [co2, temperature, humidity] = self
            .read_words::<3>(CMD_READ_MEASUREMENT, EXECUTION_TIME_DEFAULT)
            .await?;
        let raw = RawMeasurement {
            co2,
            temperature,
            humidity,
        };
        self.last = Some(raw);
        Ok(raw.convert())
    }

    pub async fn get_temperature_offset(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw_offset = self.read_word(CMD_GET_TEMPERATURE_OFFSET).await?;
        Ok(raw_offset as f32 * 175.0 / 65535.0)
    }

    pub async fn set_temperature_offset(&mut self, offset: f32) -> Result<(), Error<I2C::Error>> {
        Self::check_temperature_offset(offset)?;

        // word[0] = Toffset[°C] * (2^16 - 1) / 175
        let raw_offset = ((offset * 65535.0) / 175.0) as u16;
        self.write_command(CMD_SET_TEMPERATURE_OFFSET, raw_offset, EXECUTION_TIME_DEFAULT)
            .await
    }

    pub async fn get_sensor_altitude(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.read_word(CMD_GET_SENSOR_ALTITUDE).await
    }

    pub async fn set_sensor_altitude(&mut self, altitude: u16) -> Result<(), Error<I2C::Error>> {
        Self::check_altitude(altitude)?;
        self.write_command(CMD_SET_SENSOR_ALTITUDE, altitude, EXECUTION_TIME_DEFAULT)
            .await
    }

    /// Ambient pressure in Pa.
    pub async fn get_ambient_pressure(&mut self) -> Result<u32, Error<I2C::Error>> {
        let raw_pressure = self.read_word(CMD_AMBIENT_PRESSURE).await?;
        // ambient P [Pa] = word[0] * 100
        Ok(u32::from(raw_pressure) * 100)
    }

    /// Ambient pressure in Pa, 70 000 ..= 120 000.
    pub async fn set_ambient_pressure(&mut self, pressure: u32) -> Result<(), Error<I2C::Error>> {
        Self::check_pressure(pressure)?;
        let raw_pressure = (pressure / 100) as u16;
        self.write_command(CMD_AMBIENT_PRESSURE, raw_pressure, EXECUTION_TIME_DEFAULT)
            .await
    }

    /// Returns the FRC correction in ppm.
    pub async fn perform_forced_recalibration(
        &mut self,
        target_co2: u16,
    ) -> Result<i16, Error<I2C::Error>> {
        self.write_command(
            CMD_PERFORM_FORCED_RECALIBRATION,
            target_co2,
            EXECUTION_TIME_PERFORM_FORCED_RECALIBRATION,
        )
        .await?;

        let [correction] = self.fetch_words::<1>().await?;
        if correction == FRC_FAILED {
            crate::log_error!("SCD41 forced recalibration failed");
            return Err(Error::Device(0xFF));
        }
        Ok(correction.wrapping_sub(0x8000) as i16)
    }

    pub async fn set_automatic_self_calibration_enabled(
        &mut self,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_command(
            CMD_SET_AUTOMATIC_SELF_CALIBRATION_ENABLED,
            u16::from(enabled),
            EXECUTION_TIME_DEFAULT,
        )
        .await
    }

    pub async fn get_automatic_self_calibration_enabled(&mut self) -> Result<bool, Error<I2C::Error>> {
        let enabled = self
            .read_word(CMD_GET_AUTOMATIC_SELF_CALIBRATION_ENABLED)
            .await?;
        Ok(enabled != 0)
    }

    pub async fn set_automatic_self_calibration_target(
        &mut self,
        target_co2: u16,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_command(
            CMD_SET_AUTOMATIC_SELF_CALIBRATION_TARGET,
            target_co2,
            EXECUTION_TIME_DEFAULT,
        )
        .await
    }

    pub async fn get_automatic_self_calibration_target(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.read_word(CMD_GET_AUTOMATIC_SELF_CALIBRATION_TARGET)
            .await
    }

    /// Hours until the first automatic self calibration; multiple of 4.
    pub async fn set_automatic_self_calibration_initial_period(
        &mut self,
        hours: u16,
    ) -> Result<(), Error<I2C::Error>> {
        if hours % 4 != 0 {
            return Err(Error::InvalidArgument("Period must be a multiple of 4 hours"));
        }
        self.write_command(
            CMD_SET_AUTOMATIC_SELF_CALIBRATION_INITIAL_PERIOD,
            hours,
            EXECUTION_TIME_DEFAULT,
        )
        .await
    }

    pub async fn get_automatic_self_calibration_initial_period(
        &mut self,
    ) -> Result<u16, Error<I2C::Error>> {
        self.read_word(CMD_GET_AUTOMATIC_SELF_CALIBRATION_INITIAL_PERIOD)
            .await
    }

    /// Hours between subsequent automatic self calibrations; multiple of 4.
    pub async fn set_automatic_self_calibration_standard_period(
        &mut self,
        hours: u16,
    ) -> Result<(), Error<I2C::Error>> {
        if hours % 4 != 0 {
            return Err(Error::InvalidArgument("Period must be a multiple of 4 hours"));
        }
        self.write_command(
            CMD_SET_AUTOMATIC_SELF_CALIBRATION_STANDARD_PERIOD,
            hours,
            EXECUTION_TIME_DEFAULT,
        )
        .await
    }

    pub async fn get_automatic_self_calibration_standard_period(
        &mut self,
    ) -> Result<u16, Error<I2C::Error>> {
        self.read_word(CMD_GET_AUTOMATIC_SELF_CALIBRATION_STANDARD_PERIOD)
            .await
    }

    pub async fn persist_settings(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_PERSIST_SETTINGS, EXECUTION_TIME_PERSIST_SETTINGS)
            .await
    }

    /// 48-bit serial number.
    pub async fn get_serial_number(&mut self) -> Result<u64, Error<I2C::Error>> {
        let [w0, w1, w2] = self
            .read_words::<3>(CMD_GET_SERIAL_NUMBER, EXECUTION_TIME_DEFAULT)
            .await?;
        Ok((u64::from(w0) << 32) | (u64::from(w1) << 16) | u64::from(w2))
    }

    /// Returns `true` when the sensor reports no malfunction.
    pub async fn perform_self_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        let [status] = self
            .read_words::<1>(CMD_PERFORM_SELF_TEST, EXECUTION_TIME_PERFORM_SELF_TEST)
            .await?;
        if status != 0 {
            crate::log_warn!("SCD41 self test reported {}", status);
        }
        Ok(status == 0)
    }

    pub async fn perform_factory_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_PERFORM_FACTORY_RESET, EXECUTION_TIME_PERFORM_FACTORY_RESET)
            .await
    }

    pub async fn reinit(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_REINIT, EXECUTION_TIME_REINIT).await
    }

    pub async fn get_sensor_variant(&mut self) -> Result<SensorVariant, Error<I2C::Error>> {
        let word = self.read_word(CMD_GET_SENSOR_VARIANT).await?;
        Ok(SensorVariant::from(word))
    }

    /// Triggers one measurement and waits for it; fetch it with `read_measurement`.
    pub async fn measure_single_shot(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_MEASURE_SINGLE_SHOT, EXECUTION_TIME_MEASURE_SINGLE_SHOT)
            .await
    }

    /// Like `measure_single_shot`, but the CO2 word of the result reads 0.
    pub async fn measure_single_shot_rht_only(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(
            CMD_MEASURE_SINGLE_SHOT_RHT_ONLY,
            EXECUTION_TIME_MEASURE_SINGLE_SHOT_RHT_ONLY,
        )
        .await
    }

    pub async fn power_down(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_command(CMD_POWER_DOWN, EXECUTION_TIME_DEFAULT)
            .await
    }

    /// The sensor does not acknowledge this command, so a bus error is expected and ignored.
    pub async fn wake_up(&mut self) -> Result<(), Error<I2C::Error>> {
        let _ = self.i2c.write(self.config.address, &CMD_WAKE_UP).await;
        self.delay.delay_ms(EXECUTION_TIME_WAKE_UP).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{I2cTransaction, MockDelay, MockI2c};
    use embassy_futures::block_on;

    fn word(value: u16) -> [u8; 3] {
        let b = value.to_be_bytes();
        [b[0], b[1], crc8(&b)]
    }

    fn sensor(i2c: MockI2c) -> SCD41<MockI2c, MockDelay> {
        SCD41::new(i2c, MockDelay::new())
    }

    #[test]
    fn test_crc8_datasheet_example() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
        assert_eq!(crc8(&[0x00, 0x00]), 0x81);
    }

    #[test]
    fn test_set_temperature_offset_frame() {
        let mut scd = sensor(MockI2c::new());
        block_on(scd.set_temperature_offset(5.4)).unwrap();

        // 5.4 * 65535 / 175 = 2022 = 0x07E6
        let (i2c, delay) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![vec![0x24, 0x1D, 0x07, 0xE6, crc8(&[0x07, 0xE6])]]
        );
        assert_eq!(delay.ms_calls(), vec![1]);
    }

    #[test]
    fn test_setters_reject_out_of_range() {
        let mut scd = sensor(MockI2c::new());
        assert_eq!(
            block_on(scd.set_temperature_offset(25.0)),
            Err(Error::InvalidArgument(
                "Temperature offset must be between 0 °C and 20 °C"
            ))
        );
        assert_eq!(
            block_on(scd.set_sensor_altitude(3001)),
            Err(Error::InvalidArgument(
                "Altitude must be between 0 and 3000 meters"
            ))
        );
        assert!(block_on(scd.set_ambient_pressure(69_999)).is_err());
        assert!(block_on(scd.set_automatic_self_calibration_initial_period(46)).is_err());

        let (i2c, _) = scd.release();
        assert!(i2c.transactions().is_empty());
    }

    #[test]
    fn test_read_measurement() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(0x8006)); // data ready
        i2c.push_read_data(&word(500));
        i2c.push_read_data(&word(0x6667));
        i2c.push_read_data(&word(0x5EB9));
        let mut scd = sensor(i2c);

        let m = block_on(scd.read_measurement()).unwrap();

        assert_eq!(m.co2_ppm, 500);
        assert!((m.temperature_c - 25.0).abs() < 0.01);
        assert!((m.humidity_percent - 37.0).abs() < 0.01);
        assert_eq!(scd.co2(), Some(500));
        assert_eq!(scd.last_raw().map(|r| r.temperature), Some(0x6667));

        let (i2c, _) = scd.release();
        assert_eq!(
            i2c.transactions(),
            vec![
                I2cTransaction::Write {
                    addr: 0x62,
                    data: vec![0xE4, 0xB8]
                },
                I2cTransaction::Read { addr: 0x62, len: 3 },
                I2cTransaction::Write {
                    addr: 0x62,
                    data: vec![0xEC, 0x05]
                },
                I2cTransaction::Read { addr: 0x62, len: 9 },
            ]
        );
    }

    #[test]
    fn test_read_measurement_not_ready() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(0x8000));
        let mut scd = sensor(i2c);

        assert_eq!(block_on(scd.read_measurement()), Err(Error::NotReady));
        assert_eq!(scd.last_measurement(), None);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x01, 0xF4, 0x00]);
        let mut scd = sensor(i2c);

        assert_eq!(block_on(scd.get_sensor_altitude()), Err(Error::Crc));
    }

    #[test]
    fn test_crc_check_can_be_disabled() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x01, 0xF4, 0x00]);
        let mut scd = SCD41::with_config(
            i2c,
            MockDelay::new(),
            Scd41Config {
                verify_crc: false,
                ..Default::default()
            },
        );

        assert_eq!(block_on(scd.get_sensor_altitude()), Ok(500));
    }

    #[test]
    fn test_ambient_pressure_in_pascal() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(1013));
        let mut scd = sensor(i2c);

        block_on(scd.set_ambient_pressure(101_300)).unwrap();
        assert_eq!(block_on(scd.get_ambient_pressure()), Ok(101_300));

        let (i2c, _) = scd.release();
        assert_eq!(i2c.written(0x62)[0][..4], [0xE0, 0x00, 0x03, 0xF5]);
    }

    #[test]
    fn test_forced_recalibration() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(0x8000 + 12));
        i2c.push_read_data(&word(0xFFFF));
        let mut scd = sensor(i2c);

        assert_eq!(block_on(scd.perform_forced_recalibration(400)), Ok(12));
        assert_eq!(
            block_on(scd.perform_forced_recalibration(400)),
            Err(Error::Device(0xFF))
        );

        let (_, delay) = scd.release();
        assert_eq!(delay.ms_calls(), vec![400, 400]);
    }

    #[test]
    fn test_serial_number_and_variant() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(0xF896));
        i2c.push_read_data(&word(0x9F07));
        i2c.push_read_data(&word(0x3BB3));
        i2c.push_read_data(&word(0x1440));
        let mut scd = sensor(i2c);

        assert_eq!(block_on(scd.get_serial_number()), Ok(0xF896_9F07_3BB3));
        assert_eq!(block_on(scd.get_sensor_variant()), Ok(SensorVariant::SCD41));

        let (i2c, _) = scd.release();
        let commands: Vec<Vec<u8>> = i2c.written(0x62);
        assert_eq!(commands, vec![vec![0x36, 0x82], vec![0x20, 0x2F]]);
    }

    #[test]
    fn test_power_down_and_wake_up() {
        let mut scd = sensor(MockI2c::new());

        block_on(scd.power_down()).unwrap();
        let (mut i2c, delay) = scd.release();
        i2c.fail_next();
        let mut scd = SCD41::new(i2c, delay);
        block_on(scd.wake_up()).unwrap();

        let (i2c, delay) = scd.release();
        assert_eq!(i2c.written(0x62), vec![vec![0x36, 0xE0]]);
        assert_eq!(delay.ms_calls(), vec![1, 30]);
    }

    #[test]
    fn test_self_test() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(0));
        i2c.push_read_data(&word(3));
        let mut scd = sensor(i2c);

        assert_eq!(block_on(scd.perform_self_test()), Ok(true));
        assert_eq!(block_on(scd.perform_self_test()), Ok(false));
        let (_, delay) = scd.release();
        assert_eq!(delay.ms_calls(), vec![10_000, 10_000]);
    }

    #[test]
    fn test_init_custom_sequence() {
        let mut i2c = MockI2c::new();
        // previous offset of 4 °C
        i2c.push_read_data(&word(0x05DA));
        let mut scd = sensor(i2c);

        block_on(scd.init(Some(SensorSettings::Custom {
            current_temp: 38.1,
            reference_temp: 37.1,
            pressure: 102_100,
            altitude: 142,
        })))
        .unwrap();

        assert!(scd.is_measuring());
        let (i2c, _) = scd.release();
        let commands: Vec<[u8; 2]> = i2c
            .written(0x62)
            .iter()
            .map(|w| [w[0], w[1]])
            .collect();
        assert_eq!(
            commands,
            vec![
                CMD_STOP_PERIODIC_MEASUREMENT,
                CMD_GET_TEMPERATURE_OFFSET,
                CMD_SET_TEMPERATURE_OFFSET,
                CMD_SET_SENSOR_ALTITUDE,
                CMD_START_PERIODIC_MEASUREMENT,
                CMD_AMBIENT_PRESSURE,
            ]
        );
        // 1 °C measured too high on top of 4 °C gives about 5 °C
        let offset_frame = &i2c.written(0x62)[2];
        let raw = u16::from_be_bytes([offset_frame[2], offset_frame[3]]);
        assert!((1870..=1874).contains(&raw));
    }

    #[test]
    fn test_init_default_restores_factory_compensation() {
        let mut scd = sensor(MockI2c::new());
        block_on(scd.init(Some(SensorSettings::Default))).unwrap();

        assert!(scd.is_measuring());
        let (i2c, delay) = scd.release();
        // 4 °C * 65535 / 175 = 1497 = 0x05D9
        assert_eq!(
            i2c.written(0x62),
            vec![
                CMD_STOP_PERIODIC_MEASUREMENT.to_vec(),
                vec![0x24, 0x1D, 0x05, 0xD9, crc8(&[0x05, 0xD9])],
                vec![0x24, 0x27, 0x00, 0x00, 0x81],
                CMD_START_PERIODIC_MEASUREMENT.to_vec(),
            ]
        );
        assert_eq!(delay.ms_calls(), vec![500, 1, 1]);
    }

    #[test]
    fn test_init_without_settings_only_restarts() {
        let mut scd = sensor(MockI2c::new());
        block_on(scd.init(None)).unwrap();

        assert!(scd.is_measuring());
        let (i2c, delay) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![
                CMD_STOP_PERIODIC_MEASUREMENT.to_vec(),
                CMD_START_PERIODIC_MEASUREMENT.to_vec(),
            ]
        );
        assert_eq!(delay.ms_calls(), vec![500]);
    }

    #[test]
    fn test_init_custom_offset_out_of_range_restarts_measurement() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(0x05DA));
        let mut scd = sensor(i2c);

        // 30 - 37.1 + 4 is below zero
        let result = block_on(scd.init(Some(SensorSettings::Custom {
            current_temp: 30.0,
            reference_temp: 37.1,
            pressure: 101_300,
            altitude: 0,
        })));

        assert_eq!(
            result,
            Err(Error::InvalidArgument(
                "Temperature offset must be between 0 °C and 20 °C"
            ))
        );
        assert!(scd.is_measuring());
        let (i2c, _) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![
                CMD_STOP_PERIODIC_MEASUREMENT.to_vec(),
                CMD_GET_TEMPERATURE_OFFSET.to_vec(),
                CMD_START_PERIODIC_MEASUREMENT.to_vec(),
            ]
        );
    }

    #[test]
    fn test_init_custom_checks_altitude_before_stopping() {
        let mut scd = sensor(MockI2c::new());
        let result = block_on(scd.init(Some(SensorSettings::Custom {
            current_temp: 25.0,
            reference_temp: 25.0,
            pressure: 101_300,
            altitude: 4000,
        })));

        assert!(result.is_err());
        let (i2c, _) = scd.release();
        assert!(i2c.transactions().is_empty());
    }

    #[test]
    fn test_low_power_periodic_measurement() {
        let mut scd = sensor(MockI2c::new());
        assert!(!scd.is_measuring());

        block_on(scd.start_low_power_periodic_measurement()).unwrap();
        assert!(scd.is_measuring());
        block_on(scd.stop_periodic_measurement()).unwrap();
        assert!(!scd.is_measuring());

        let (i2c, delay) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![vec![0x21, 0xAC], CMD_STOP_PERIODIC_MEASUREMENT.to_vec()]
        );
        assert_eq!(delay.ms_calls(), vec![500]);
    }

    #[test]
    fn test_single_shot_waits() {
        let mut scd = sensor(MockI2c::new());
        block_on(scd.measure_single_shot()).unwrap();
        block_on(scd.measure_single_shot_rht_only()).unwrap();

        let (i2c, delay) = scd.release();
        assert_eq!(i2c.written(0x62), vec![vec![0x21, 0x9D], vec![0x21, 0x96]]);
        assert_eq!(delay.ms_calls(), vec![5000, 50]);
    }

    #[test]
    fn test_maintenance_commands_wait() {
        let mut scd = sensor(MockI2c::new());
        block_on(scd.perform_factory_reset()).unwrap();
        block_on(scd.reinit()).unwrap();
        block_on(scd.persist_settings()).unwrap();

        let (i2c, delay) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![vec![0x36, 0x32], vec![0x36, 0x46], vec![0x36, 0x15]]
        );
        assert_eq!(delay.ms_calls(), vec![1200, 30, 800]);
    }

    #[test]
    fn test_automatic_self_calibration_frames() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&word(1));
        i2c.push_read_data(&word(400));
        i2c.push_read_data(&word(44));
        i2c.push_read_data(&word(156));
        let mut scd = sensor(i2c);

        block_on(scd.set_automatic_self_calibration_enabled(true)).unwrap();
        block_on(scd.set_automatic_self_calibration_target(400)).unwrap();
        block_on(scd.set_automatic_self_calibration_initial_period(44)).unwrap();
        block_on(scd.set_automatic_self_calibration_standard_period(156)).unwrap();
        assert_eq!(block_on(scd.get_automatic_self_calibration_enabled()), Ok(true));
        assert_eq!(block_on(scd.get_automatic_self_calibration_target()), Ok(400));
        assert_eq!(
            block_on(scd.get_automatic_self_calibration_initial_period()),
            Ok(44)
        );
        assert_eq!(
            block_on(scd.get_automatic_self_calibration_standard_period()),
            Ok(156)
        );

        let (i2c, _) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![
                vec![0x24, 0x16, 0x00, 0x01, crc8(&[0x00, 0x01])],
                vec![0x24, 0x3A, 0x01, 0x90, crc8(&[0x01, 0x90])],
                vec![0x24, 0x45, 0x00, 0x2C, crc8(&[0x00, 0x2C])],
                vec![0x24, 0x4E, 0x00, 0x9C, crc8(&[0x00, 0x9C])],
                vec![0x23, 0x13],
                vec![0x23, 0x3F],
                vec![0x23, 0x40],
                vec![0x23, 0x4B],
            ]
        );
    }

    #[test]
    fn test_persist_restarts_measurement() {
        let mut scd = sensor(MockI2c::new());
        block_on(scd.start_periodic_measurement()).unwrap();
        block_on(scd.persist()).unwrap();

        assert!(scd.is_measuring());
        let (i2c, delay) = scd.release();
        assert_eq!(
            i2c.written(0x62),
            vec![
                CMD_START_PERIODIC_MEASUREMENT.to_vec(),
                CMD_STOP_PERIODIC_MEASUREMENT.to_vec(),
                CMD_PERSIST_SETTINGS.to_vec(),
                CMD_START_PERIODIC_MEASUREMENT.to_vec(),
            ]
        );
        assert_eq!(delay.ms_calls(), vec![500, 800]);
    }
}
