#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_time::{Delay, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use modkit_firmware::drivers::max7221::render::scroll_window;
use modkit_firmware::drivers::max7221::MAX7221;
use {defmt_rtt as _, panic_probe as _};

const ALPHABET: &str = "0123456789 -_=./\\'\"aAbBcdefghijklmnopqrstuvwxyz";

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());
    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(1_000_000);

    let bus = Spi::new(
        p.SPI1, p.PA5, p.PA7, p.PA6, p.DMA2_CH3, p.DMA2_CH2, spi_config,
    );
    let cs = Output::new(p.PA4, Level::High, Speed::VeryHigh);
    let device = unwrap!(ExclusiveDevice::new(bus, cs, Delay));

    let mut display = MAX7221::new(device, Delay);
    match display.start().await {
        Ok(()) => {
            info!("Display started");
        }
        Err(e) => {
            error!("error: {}", e)
        }
    }

    let mut value: f32 = 13_597_345_895.0;
    let mut start_index = 0;

    loop {
        let result = async {
            display.set_digit(0, 2).await?;
            display.set_digit_dp(1, 4).await?;
            display.set_digit(2, 6).await?;
            display.set_digit(3, 3).await?;
            Timer::after_millis(500).await;
            display.clear_digit(2).await?;
            Timer::after_millis(500).await;
            for brightness in [1, 16, 6] {
                display.set_brightness(brightness).await?;
                Timer::after_millis(500).await;
            }

            display.clear_all().await?;
            display.print_uint8(142, 0).await?;
            Timer::after_millis(500).await;
            display.clear_all().await?;
            display.print_int8(-115, 0).await?;
            Timer::after_millis(500).await;
            display.clear_all().await?;
            display.print_uint16(735, 0).await?;
            Timer::after_millis(500).await;
            display.clear_all().await?;
            display.print_int16_length(-817, 0, 4).await?;
            Timer::after_millis(500).await;

            for _ in 0..20 {
                display.print_float_length(value, 7, 0, 20).await?;
                value /= 13.47;
                Timer::after_millis(200).await;
            }

            display.print_string("hello", 0).await?;
            Timer::after_millis(500).await;

            for _ in 0..30 {
                let window = scroll_window(ALPHABET, start_index);
                display.print_string(&window, 0).await?;
                start_index = (start_index + 1) % ALPHABET.len();
                Timer::after_millis(200).await;
            }

            display.set_decode_all().await?;
            display.clear_all().await
        }
        .await;

        if let Err(e) = result {
            error!("display error: {}", e);
        }
        Timer::after_secs(5).await;
    }
}
