use embedded_hal_async::i2c::I2c;

use crate::error::Error;

// Register Addresses
const REG_DEVICE_CONFIG0: u8 = 0x00;
const REG_DEVICE_CONFIG1: u8 = 0x01;
const REG_BRIGHTNESS_RGB00: u8 = 0x08;
const REG_LED_OUTPUT_BASE: u8 = 0x14;

const CONFIG0_CHIP_EN: u8 = 1 << 6;

pub const RGB_MODULES: u8 = 12;
pub const LED_COUNT: u8 = 36;

/// Level of the two address pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressSelect {
    #[default]
    Addr0,
    Addr1,
    Addr2,
    Addr3,
}

impl AddressSelect {
    pub fn address(self) -> u8 {
        match self {
            AddressSelect::Addr0 => 0x30,
            AddressSelect::Addr1 => 0x31,
            AddressSelect::Addr2 => 0x32,
            AddressSelect::Addr3 => 0x33,
        }
    }
}

/// 36-channel LED driver, wired as 12 RGB modules.
pub struct AL5887<I2C> {
    i2c: I2C,
    i2c_address: u8,
}

impl<I2C: I2c> AL5887<I2C> {
    pub fn new(i2c: I2C, address: AddressSelect) -> Self {
        AL5887 {
            i2c,
            i2c_address: address.address(),
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub async fn send_data(&mut self, register: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.i2c_address, &[register, value]).await?;
        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), Error<I2C::Error>> {
        crate::log_debug!("AL5887 {} enabled", self.i2c_address);
        self.send_data(REG_DEVICE_CONFIG0, CONFIG0_CHIP_EN).await
    }

    pub async fn stop(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send_data(REG_DEVICE_CONFIG0, 0x00).await
    }

    /// Writes DEVICE_CONFIG1 (log scale, power save, auto increment, PWM dithering, ...).
    pub async fn set_config1(&mut self, value: u8) -> Result<(), Error<I2C::Error>> {
        self.send_data(REG_DEVICE_CONFIG1, value).await
    }

    pub async fn set_global_brightness(&mut self, brightness: u8) -> Result<(), Error<I2C::Error>> {
        for module in 0..RGB_MODULES {
            self.send_data(REG_BRIGHTNESS_RGB00 + module, brightness)
                .await?;
        }
        Ok(())
    }

    pub async fn set_module_brightness(
        &mut self,
        module: u8,
        brightness: u8,
    ) -> Result<(), Error<I2C::Error>> {
        if module >= RGB_MODULES {
            return Err(Error::InvalidArgument("RGB module must be between 0 and 11"));
        }
        self.send_data(REG_BRIGHTNESS_RGB00 + module, brightness)
            .await
    }

    pub async fn set_led_brightness(
        &mut self,
        led: u8,
        brightness: u8,
    ) -> Result<(), Error<I2C::Error>> {
        if led >= LED_COUNT {
            return Err(Error::InvalidArgument("LED must be between 0 and 35"));
        }
        self.send_data(REG_LED_OUTPUT_BASE + led, brightness).await
    }

    pub async fn set_led_to_state(&mut self, led: u8, on: bool) -> Result<(), Error<I2C::Error>> {
        self.set_led_brightness(led, if on { 0xFF } else { 0x00 })
            .await
    }

    pub async fn set_led_to_on(&mut self, led: u8) -> Result<(), Error<I2C::Error>> {
        self.set_led_brightness(led, 0xFF).await
    }

    pub async fn set_led_to_off(&mut self, led: u8) -> Result<(), Error<I2C::Error>> {
        self.set_led_brightness(led, 0x00).await
    }

    /// Reads the LED's output register back and inverts it (any non-zero level counts as on).
    pub async fn flip_led_state(&mut self, led: u8) -> Result<(), Error<I2C::Error>> {
        if led >= LED_COUNT {
            return Err(Error::InvalidArgument("LED must be between 0 and 35"));
        }

        let mut current = [0u8; 1];
        self.i2c
            .write_read(self.i2c_address, &[REG_LED_OUTPUT_BASE + led], &mut current)
            .await?;

        self.set_led_to_state(led, current[0] == 0).await
    }

    /// Sets the three channels of one RGB module (LEDs 3*module .. 3*module+2).
    pub async fn set_rgb(&mut self, module: u8, r: u8, g: u8, b: u8) -> Result<(), Error<I2C::Error>> {
        if module >= RGB_MODULES {
            return Err(Error::InvalidArgument("RGB module must be between 0 and 11"));
        }
        let first = module * 3;
        self.set_led_brightness(first, r).await?;
        self.set_led_brightness(first + 1, g).await?;
        self.set_led_brightness(first + 2, b).await
    }
}
