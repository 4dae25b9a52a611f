//! ESP-IDF drivers behind the sensor bus traits.

pub mod dht;
pub mod onewire;
pub mod i2c;

pub use dht::DhtPin;
pub use onewire::OneWireBus;
pub use i2c::{I2cBusDevice, Scd4xI2c, SharedI2cBus};
