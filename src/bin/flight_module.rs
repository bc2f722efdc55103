#![no_std]
#![no_main]

use defmt::*;
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_executor::Spawner;
use embassy_stm32::i2c::Config;
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::Hertz;
use embassy_stm32::{bind_interrupts, i2c, peripherals};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Timer};
use modkit_firmware::drivers::al5887::{AddressSelect, AL5887, RGB_MODULES};
use modkit_firmware::drivers::bmp390::{altitude, OutputDataRate, BMP390};
use modkit_firmware::drivers::icm20948::ICM20948;
use {defmt_rtt as _, panic_probe as _};

const SEA_LEVEL_PRESSURE: f32 = 101_325.0; // Pa

// Accelerometer counts per g at the default +-2 g range
const ACCEL_COUNTS_PER_G: i32 = 16_384;

bind_interrupts!(struct Irqs {
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());
    let mut config = Config::default();
    config.scl_pullup = true;
    config.sda_pullup = true;

    let i2c = I2c::new(
        p.I2C1,
        p.PB6,
        p.PB7,
        Irqs,
        p.DMA1_CH6,
        p.DMA1_CH0,
        Hertz(400_000),
        config,
    );
    let i2c_bus: Mutex<NoopRawMutex, _> = Mutex::new(i2c);

    let mut barometer = BMP390::new(I2cDevice::new(&i2c_bus));
    let mut imu = ICM20948::new(I2cDevice::new(&i2c_bus), Delay);
    let mut leds = AL5887::new(I2cDevice::new(&i2c_bus), AddressSelect::Addr0);

    match barometer.init().await {
        Ok(()) => {
            info!("BMP390 ready");
        }
        Err(e) => {
            error!("BMP390 error: {}", e)
        }
    }
    if let Err(e) = barometer
        .start_measurement_periodical(OutputDataRate::Hz25)
        .await
    {
        error!("BMP390 error: {}", e)
    }

    match imu.init().await {
        Ok(()) => {
            info!("ICM-20948 ready");
        }
        Err(e) => {
            error!("ICM-20948 error: {}", e)
        }
    }

    let led_setup = async {
        leds.start().await?;
        leds.set_global_brightness(0x40).await
    };
    if let Err(e) = led_setup.await {
        error!("AL5887 error: {}", e)
    }

    loop {
        Timer::after_millis(500).await;

        match barometer.read_measurement().await {
            Ok((temperature, pressure)) => {
                info!(
                    "temp: {} C, pressure: {} Pa, altitude: {} m",
                    temperature,
                    pressure,
                    altitude(pressure, SEA_LEVEL_PRESSURE)
                )
            }
            Err(e) => {
                error!("BMP390 error: {}", e)
            }
        }

        let accel = match imu.read_accelerometer_raw().await {
            Ok(accel) => accel,
            Err(e) => {
                error!("ICM-20948 error: {}", e);
                continue;
            }
        };
        match (imu.read_gyro_raw().await, imu.read_magnetometer_raw().await) {
            (Ok(gyro), Ok(mag)) => {
                info!("accel: {}, gyro: {}, mag: {}", accel, gyro, mag)
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("ICM-20948 error: {}", e)
            }
        }

        // Red for tilt around X, blue for tilt around Y, green when level
        let tilt = |axis: i16| (i32::from(axis).abs() * 255 / ACCEL_COUNTS_PER_G).min(255) as u8;
        let (red, blue) = (tilt(accel[1]), tilt(accel[0]));
        let green = 255 - red.max(blue);
        for module in 0..RGB_MODULES {
            if let Err(e) = leds.set_rgb(module, red, green, blue).await {
                error!("AL5887 error: {}", e);
                break;
            }
        }
    }
}
