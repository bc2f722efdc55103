pub mod al5887;
pub mod bmp390;
pub mod icm20948;
pub mod max30101;
pub mod max7221;
pub mod scd41;
pub mod ws2812b;
