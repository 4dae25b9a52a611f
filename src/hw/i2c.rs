//! Shared I2C bus and the SCD4x driver on it.

use crate::sensors::scd41::{Scd4xBus, Scd4xMeasurement};
use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::i2c::I2cDriver;
use scd4x::Scd4x;
use std::cell::RefCell;

pub type SharedI2cBus = RefCell<I2cDriver<'static>>;
pub type I2cBusDevice<'a> = RefCellDevice<'a, I2cDriver<'static>>;

/// SCD4x driver plus a raw handle on the same bus for address scans.
pub struct Scd4xI2c<'a> {
    probe: I2cBusDevice<'a>,
    sensor: Scd4x<I2cBusDevice<'a>, FreeRtos>,
}

impl<'a> Scd4xI2c<'a> {
    pub fn new(i2c_bus: &'a SharedI2cBus) -> Self {
        Self {
            probe: RefCellDevice::new(i2c_bus),
            sensor: Scd4x::new(RefCellDevice::new(i2c_bus), FreeRtos),
        }
    }
}

impl Scd4xBus for Scd4xI2c<'_> {
    type Error = scd4x::Error<esp_idf_svc::hal::i2c::I2cError>;

    fn probe(&mut self, address: u8) -> bool {
        self.probe.write(address, &[]).is_ok()
    }

    fn wake_up(&mut self) -> Result<(), Self::Error> {
        // The sensor does not acknowledge the wake-up command.
        self.sensor.wake_up();
        Ok(())
    }

    fn stop_periodic_measurement(&mut self) -> Result<(), Self::Error> {
        self.sensor.stop_periodic_measurement()
    }

    fn start_periodic_measurement(&mut self) -> Result<(), Self::Error> {
        self.sensor.start_periodic_measurement()
    }

    fn data_ready(&mut self) -> Result<bool, Self::Error> {
        self.sensor.data_ready_status()
    }

    fn read_measurement(&mut self) -> Result<Scd4xMeasurement, Self::Error> {
        let data = self.sensor.measurement()?;
        Ok(Scd4xMeasurement {
            co2_ppm: data.co2,
            temperature_c: data.temperature,
            humidity_pct: data.humidity,
        })
    }
}
