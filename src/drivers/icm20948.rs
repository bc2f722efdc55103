//! ICM-20948 9-axis IMU.
//!
//! Accelerometer, gyroscope and temperature live in the ICM-20948 itself
//! (register bank 0). The magnetometer is a separate AK09916 die, reached
//! directly on the bus once the ICM's I2C bypass is enabled by [`ICM20948::init`].

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::error::Error;

// I2C Address
pub const ICM20948_I2C_ADDRESS: u8 = 0x68;
pub const ICM20948_I2C_ADDRESS_ALT: u8 = 0x69;
const AK09916_I2C_ADDRESS: u8 = 0x0C;

// User bank 0
const REG_WHO_AM_I: u8 = 0x00;
const REG_USER_CTRL: u8 = 0x03;
const REG_PWR_MGMT_1: u8 = 0x06;
const REG_INT_PIN_CFG: u8 = 0x0F;
const REG_ACCEL_XOUT_H: u8 = 0x2D;
const REG_ACCEL_YOUT_H: u8 = 0x2F;
const REG_ACCEL_ZOUT_H: u8 = 0x31;
const REG_GYRO_XOUT_H: u8 = 0x33;
const REG_GYRO_YOUT_H: u8 = 0x35;
const REG_GYRO_ZOUT_H: u8 = 0x37;
const REG_TEMP_OUT_H: u8 = 0x39;

// User bank 1
const REG_XA_OFFS_H: u8 = 0x14;
const REG_YA_OFFS_H: u8 = 0x17;
const REG_ZA_OFFS_H: u8 = 0x1A;

// User bank 2
const REG_XG_OFFS_USRH: u8 = 0x03;

// Any bank
const REG_BANK_SEL: u8 = 0x7F;

const WHO_AM_I_VALUE: u8 = 0xEA;
const PWR_MGMT_1_AUTO_CLOCK: u8 = 0x01;
const INT_PIN_CFG_BYPASS_EN: u8 = 1 << 1;

// AK09916
const AK_REG_WIA2: u8 = 0x01;
const AK_REG_HXL: u8 = 0x11;
const AK_REG_CNTL2: u8 = 0x31;
const AK_REG_CNTL3: u8 = 0x32;
const AK_WIA2_VALUE: u8 = 0x09;
const AK_MODE_CONTINUOUS_100HZ: u8 = 0x08;
const AK_SOFT_RESET: u8 = 0x01;
const AK_ST2_HOFL: u8 = 1 << 3;

const WAKE_UP_TIME: u32 = 35; // millisec
const MAG_RESET_TIME: u32 = 1; // millisec

const TEMP_SENSITIVITY: f32 = 333.87;
const TEMP_OFFSET: f32 = 21.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Bank {
    Bank0 = 0,
    Bank1 = 1,
    Bank2 = 2,
    Bank3 = 3,
}

pub struct ICM20948<I2C, D> {
    i2c: I2C,
    delay: D,
    i2c_address: u8,
    bank: Bank,
}

impl<I2C: I2c, D: DelayNs> ICM20948<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, ICM20948_I2C_ADDRESS)
    }

    /// AD0 pulled high selects 0x69.
    pub fn new_alternate(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, ICM20948_I2C_ADDRESS_ALT)
    }

    fn with_address(i2c: I2C, delay: D, i2c_address: u8) -> Self {
        ICM20948 {
            i2c,
            delay,
            i2c_address,
            bank: Bank::Bank0,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.i2c_address, &[register, value]).await?;
        Ok(())
    }

    async fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.write_read(self.i2c_address, &[register], buf).await?;
        Ok(())
    }

    /// Selects `bank` first; an earlier failure may have left another one active.
    async fn read_i16(&mut self, bank: Bank, register: u8) -> Result<i16, Error<I2C::Error>> {
        self.select_bank(bank).await?;
        let mut buf = [0u8; 2];
        self.read_registers(register, &mut buf).await?;
        Ok(i16::from_be_bytes(buf))
    }

    async fn read_triple(
        &mut self,
        bank: Bank,
        register: u8,
    ) -> Result<[i16; 3], Error<I2C::Error>> {
        self.select_bank(bank).await?;
        let mut buf = [0u8; 6];
        self.read_registers(register, &mut buf).await?;
        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ])
    }

    /// Switches the user register bank; skipped when it is already selected.
    pub async fn select_bank(&mut self, bank: Bank) -> Result<(), Error<I2C::Error>> {
        if self.bank != bank {
            self.write_register(REG_BANK_SEL, (bank as u8) << 4).await?;
            self.bank = bank;
        }
        Ok(())
    }

    pub async fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        // The cached bank may not match a device that was not reset
        self.write_register(REG_BANK_SEL, 0x00).await?;
        self.bank = Bank::Bank0;

        let mut id = [0u8; 1];
        self.read_registers(REG_WHO_AM_I, &mut id).await?;
        if id[0] != WHO_AM_I_VALUE {
            return Err(Error::UnexpectedDevice {
                expected: WHO_AM_I_VALUE,
                found: id[0],
            });
        }

        self.write_register(REG_PWR_MGMT_1, PWR_MGMT_1_AUTO_CLOCK)
            .await?;
        self.delay.delay_ms(WAKE_UP_TIME).await;

        // Internal I2C master off, bypass on: the AK09916 shows up on the main bus
        self.write_register(REG_USER_CTRL, 0x00).await?;
        self.write_register(REG_INT_PIN_CFG, INT_PIN_CFG_BYPASS_EN)
            .await?;

        self.init_magnetometer().await?;

        crate::log_debug!("ICM-20948 at {} initialized", self.i2c_address);
        Ok(())
    }

    async fn init_magnetometer(&mut self) -> Result<(), Error<I2C::Error>> {
        let mut id = [0u8; 1];
        self.i2c
            .write_read(AK09916_I2C_ADDRESS, &[AK_REG_WIA2], &mut id)
            .await?;
        if id[0] != AK_WIA2_VALUE {
            return Err(Error::UnexpectedDevice {
                expected: AK_WIA2_VALUE,
                found: id[0],
            });
        }

        self.i2c
            .write(AK09916_I2C_ADDRESS, &[AK_REG_CNTL3, AK_SOFT_RESET])
            .await?;
        self.delay.delay_ms(MAG_RESET_TIME).await;
        self.i2c
            .write(AK09916_I2C_ADDRESS, &[AK_REG_CNTL2, AK_MODE_CONTINUOUS_100HZ])
            .await?;
        Ok(())
    }

    pub async fn get_accelerometer_x_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_ACCEL_XOUT_H).await
    }

    pub async fn get_accelerometer_y_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_ACCEL_YOUT_H).await
    }

    pub async fn get_accelerometer_z_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_ACCEL_ZOUT_H).await
    }

    pub async fn get_gyro_x_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_GYRO_XOUT_H).await
    }

    pub async fn get_gyro_y_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_GYRO_YOUT_H).await
    }

    pub async fn get_gyro_z_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_GYRO_ZOUT_H).await
    }

    pub async fn read_accelerometer_raw(&mut self) -> Result<[i16; 3], Error<I2C::Error>> {
        self.read_triple(Bank::Bank0, REG_ACCEL_XOUT_H).await
    }

    pub async fn read_gyro_raw(&mut self) -> Result<[i16; 3], Error<I2C::Error>> {
        self.read_triple(Bank::Bank0, REG_GYRO_XOUT_H).await
    }

    /// Reads HXL..ST2 in one go; ST2 has to be read for the AK09916 to
    /// latch the next sample. An overflowed sample is reported as `Error::Device`.
    pub async fn read_magnetometer_raw(&mut self) -> Result<[i16; 3], Error<I2C::Error>> {
        let mut buf = [0u8; 8];
        self.i2c
            .write_read(AK09916_I2C_ADDRESS, &[AK_REG_HXL], &mut buf)
            .await?;

        let st2 = buf[7];
        if st2 & AK_ST2_HOFL != 0 {
            return Err(Error::Device(st2));
        }

        Ok([
            i16::from_le_bytes([buf[0], buf[1]]),
            i16::from_le_bytes([buf[2], buf[3]]),
            i16::from_le_bytes([buf[4], buf[5]]),
        ])
    }

    pub async fn get_magnetometer_x_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        Ok(self.read_magnetometer_raw().await?[0])
    }

    pub async fn get_magnetometer_y_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        Ok(self.read_magnetometer_raw().await?[1])
    }

    pub async fn get_magnetometer_z_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        Ok(self.read_magnetometer_raw().await?[2])
    }

    pub async fn get_temperature_raw(&mut self) -> Result<i16, Error<I2C::Error>> {
        self.read_i16(Bank::Bank0, REG_TEMP_OUT_H).await
    }

    /// Die temperature in °C.
    pub async fn get_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = self.get_temperature_raw().await?;
        Ok(raw as f32 / TEMP_SENSITIVITY + TEMP_OFFSET)
    }

    /// Accelerometer offset registers hold a 15-bit value in bits 15..1;
    /// bit 0 is reserved and preserved.
    pub async fn set_accelerometer_offsets(
        &mut self,
        offsets: [i16; 3],
    ) -> Result<(), Error<I2C::Error>> {
        if offsets.iter().any(|o| !(-16384..=16383).contains(o)) {
            return Err(Error::InvalidArgument(
                "Accelerometer offset must fit in 15 bits",
            ));
        }

        self.select_bank(Bank::Bank1).await?;
        for (register, offset) in [REG_XA_OFFS_H, REG_YA_OFFS_H, REG_ZA_OFFS_H]
            .into_iter()
            .zip(offsets)
        {
            let mut low = [0u8; 1];
            self.read_registers(register + 1, &mut low).await?;
            let [high, new_low] = (offset << 1).to_be_bytes();
            self.i2c
                .write(
                    self.i2c_address,
                    &[register, high, (new_low & 0xFE) | (low[0] & 0x01)],
                )
                .await?;
        }
        self.select_bank(Bank::Bank0).await
    }

    pub async fn get_accelerometer_offsets(&mut self) -> Result<[i16; 3], Error<I2C::Error>> {
        let mut offsets = [0i16; 3];
        for (slot, register) in offsets
            .iter_mut()
            .zip([REG_XA_OFFS_H, REG_YA_OFFS_H, REG_ZA_OFFS_H])
        {
            *slot = self.read_i16(Bank::Bank1, register).await? >> 1;
        }
        self.select_bank(Bank::Bank0).await?;
        Ok(offsets)
    }

    pub async fn set_gyro_offsets(&mut self, offsets: [i16; 3]) -> Result<(), Error<I2C::Error>> {
        self.select_bank(Bank::Bank2).await?;
        let [xh, xl] = offsets[0].to_be_bytes();
        let [yh, yl] = offsets[1].to_be_bytes();
        let [zh, zl] = offsets[2].to_be_bytes();
        self.i2c
            .write(self.i2c_address, &[REG_XG_OFFS_USRH, xh, xl, yh, yl, zh, zl])
            .await?;
        self.select_bank(Bank::Bank0).await
    }

    pub async fn get_gyro_offsets(&mut self) -> Result<[i16; 3], Error<I2C::Error>> {
        let offsets = self.read_triple(Bank::Bank2, REG_XG_OFFS_USRH).await?;
        self.select_bank(Bank::Bank0).await?;
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{I2cTransaction, MockDelay, MockI2c};
    use embassy_futures::block_on;

    fn imu(i2c: MockI2c) -> ICM20948<MockI2c, MockDelay> {
        ICM20948::new(i2c, MockDelay::new())
    }

    #[test]
    fn test_init_sequence() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0xEA, 0x09]);
        let mut icm = imu(i2c);

        block_on(icm.init()).unwrap();

        let (i2c, delay) = icm.release();
        assert_eq!(
            i2c.written(0x68),
            vec![
                vec![0x7F, 0x00],
                vec![0x00],
                vec![0x06, 0x01],
                vec![0x03, 0x00],
                vec![0x0F, 0x02],
            ]
        );
        assert_eq!(
            i2c.written(0x0C),
            vec![vec![0x01], vec![0x32, 0x01], vec![0x31, 0x08]]
        );
        assert_eq!(delay.ms_calls(), vec![35, 1]);
    }

    #[test]
    fn test_init_rejects_wrong_who_am_i() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x71]);
        let mut icm = imu(i2c);

        assert_eq!(
            block_on(icm.init()),
            Err(Error::UnexpectedDevice {
                expected: 0xEA,
                found: 0x71
            })
        );
    }

    #[test]
    fn test_accelerometer_is_big_endian_signed() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0xFF, 0x38]);
        i2c.push_read_data(&[0x00, 0x10, 0xFF, 0xF0, 0x40, 0x00]);
        let mut icm = imu(i2c);

        assert_eq!(block_on(icm.get_accelerometer_y_raw()), Ok(-200));
        assert_eq!(block_on(icm.read_gyro_raw()), Ok([16, -16, 16384]));

        let (i2c, _) = icm.release();
        assert_eq!(i2c.written(0x68), vec![vec![0x2F], vec![0x33]]);
    }

    #[test]
    fn test_magnetometer_is_little_endian() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x10, 0x00, 0xF0, 0xFF, 0x00, 0x01, 0x00, 0x00]);
        let mut icm = imu(i2c);

        assert_eq!(block_on(icm.read_magnetometer_raw()), Ok([16, -16, 256]));
        let (i2c, _) = icm.release();
        assert_eq!(
            i2c.transactions(),
            vec![I2cTransaction::WriteRead {
                addr: 0x0C,
                write_data: vec![0x11],
                read_len: 8
            }]
        );
    }

    #[test]
    fn test_magnetometer_overflow() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0, 0, 0, 0, 0, 0, 0, 0x08]);
        let mut icm = imu(i2c);

        assert_eq!(block_on(icm.get_magnetometer_z_raw()), Err(Error::Device(0x08)));
    }

    #[test]
    fn test_temperature() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x0D, 0x0A]); // 3338
        let mut icm = imu(i2c);

        let t = block_on(icm.get_temperature()).unwrap();
        assert!((t - 30.998).abs() < 0.01);
    }

    #[test]
    fn test_accelerometer_offsets_keep_reserved_bit() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x01, 0x00, 0x01]);
        let mut icm = imu(i2c);

        block_on(icm.set_accelerometer_offsets([-1, 0, 100])).unwrap();

        let (i2c, _) = icm.release();
        assert_eq!(
            i2c.written(0x68),
            vec![
                vec![0x7F, 0x10],
                vec![0x15],
                vec![0x14, 0xFF, 0xFF],
                vec![0x18],
                vec![0x17, 0x00, 0x00],
                vec![0x1B],
                vec![0x1A, 0x00, 0xC9],
                vec![0x7F, 0x00],
            ]
        );
    }

    #[test]
    fn test_data_read_reselects_bank0_after_failed_offset_write() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x00, 0x12, 0x34]);
        // bank select and X low byte go through, the X offset write fails
        i2c.fail_after(2);
        let mut icm = imu(i2c);

        assert!(block_on(icm.set_accelerometer_offsets([1, 2, 3])).is_err());
        assert_eq!(block_on(icm.get_accelerometer_x_raw()), Ok(0x1234));

        let (i2c, _) = icm.release();
        assert_eq!(
            i2c.written(0x68),
            vec![vec![0x7F, 0x10], vec![0x15], vec![0x7F, 0x00], vec![0x2D]]
        );
    }

    #[test]
    fn test_accelerometer_offset_range() {
        let mut icm = imu(MockI2c::new());
        assert!(block_on(icm.set_accelerometer_offsets([16384, 0, 0])).is_err());
        let (i2c, _) = icm.release();
        assert!(i2c.transactions().is_empty());
    }

    #[test]
    fn test_gyro_offsets_round_trip_through_bank2() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x00, 0x05, 0xFF, 0xFB, 0x01, 0x00]);
        let mut icm = imu(i2c);

        block_on(icm.set_gyro_offsets([5, -5, 256])).unwrap();
        assert_eq!(block_on(icm.get_gyro_offsets()), Ok([5, -5, 256]));

        let (i2c, _) = icm.release();
        assert_eq!(
            i2c.written(0x68),
            vec![
                vec![0x7F, 0x20],
                vec![0x03, 0x00, 0x05, 0xFF, 0xFB, 0x01, 0x00],
                vec![0x7F, 0x00],
                vec![0x7F, 0x20],
                vec![0x03],
                vec![0x7F, 0x00],
            ]
        );
    }
}
