//! Sensirion SCD-41 CO2 / temperature / humidity sensor on I2C.
//!
//! The device runs a periodic measurement in firmware: after `initialize`
//! starts it, the first sample is only trustworthy once the warm-up interval
//! has elapsed, and every read waits on the device's data-ready flag first.

use super::readiness::{PollError, ReadinessGate, WarmupGate, poll_data_ready};
use super::{Sensor, SensorState};
use crate::config::{Config, DataReadyPolicy};
use crate::error::SensorError;
use crate::logging::{log_reading, log_sensor_warning};
use crate::models::Reading;
use crate::time_utils::Clock;
use embedded_hal::delay::DelayNs;
use log::info;

const NAME: &str = "SCD-41";

/// Channel order of a read. Secondary channels are only present when valid.
pub const DATA_TYPES: [&str; 3] = ["co2", "temperature", "humidity"];

/// 0 ppm is how the device reports a measurement fault.
pub const MIN_VALID_CO2: u16 = 1;
pub const MAX_VALID_CO2: u16 = 40_000;
pub const MIN_VALID_TEMP: f32 = -40.0;
pub const MAX_VALID_TEMP: f32 = 70.0;
pub const MIN_VALID_HUMIDITY: f32 = 0.0;
pub const MAX_VALID_HUMIDITY: f32 = 100.0;

const I2C_SETTLE_MS: u32 = 500;
const BEGIN_SETTLE_MS: u32 = 200;
const WAKE_SETTLE_MS: u32 = 20;
const STOP_SETTLE_MS: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scd4xMeasurement {
    pub co2_ppm: u16,
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Command set of the SCD4x family used by the sensor.
pub trait Scd4xBus {
    type Error: core::fmt::Debug;

    /// `true` if a device acknowledges `address` on the bus.
    fn probe(&mut self, address: u8) -> bool;
    fn wake_up(&mut self) -> Result<(), Self::Error>;
    fn stop_periodic_measurement(&mut self) -> Result<(), Self::Error>;
    fn start_periodic_measurement(&mut self) -> Result<(), Self::Error>;
    fn data_ready(&mut self) -> Result<bool, Self::Error>;
    fn read_measurement(&mut self) -> Result<Scd4xMeasurement, Self::Error>;
}

pub fn is_valid_co2(ppm: u16) -> bool {
    (MIN_VALID_CO2..=MAX_VALID_CO2).contains(&ppm)
}

pub fn is_valid_temperature(temperature: f32) -> bool {
    temperature.is_finite() && (MIN_VALID_TEMP..=MAX_VALID_TEMP).contains(&temperature)
}

pub fn is_valid_humidity(humidity: f32) -> bool {
    humidity.is_finite() && (MIN_VALID_HUMIDITY..=MAX_VALID_HUMIDITY).contains(&humidity)
}

/// Addresses in the 7-bit range that acknowledge a probe.
pub fn scan_bus(bus: &mut impl Scd4xBus) -> Vec<u8> {
    (1u8..127).filter(|&address| bus.probe(address)).collect()
}

pub struct Scd41Sensor<B, C, D> {
    bus: B,
    clock: C,
    delay: D,
    location: String,
    address: u8,
    policy: DataReadyPolicy,
    warmup: WarmupGate,
    gate: ReadinessGate,
    measurement_started: bool,
    state: SensorState,
}

impl<B: Scd4xBus, C: Clock, D: DelayNs> Scd41Sensor<B, C, D> {
    pub fn new(bus: B, clock: C, delay: D, config: &Config) -> Self {
        Self {
            bus,
            clock,
            delay,
            location: config.scd41_location.clone(),
            address: config.scd41_address,
            policy: config.scd41_data_ready,
            warmup: WarmupGate::new(config.scd41_warmup_ms),
            gate: ReadinessGate::new(config.scd41_min_interval_ms),
            measurement_started: false,
            state: SensorState::default(),
        }
    }

    /// When periodic measurement was (last) started.
    pub fn initialized_at_ms(&self) -> Option<u64> {
        self.warmup.started_ms()
    }

    fn log_bus_scan(&mut self) {
        info!("Scanning I2C addresses...");
        let found = scan_bus(&mut self.bus);

        if found.is_empty() {
            info!("No I2C devices found");
        } else {
            for address in &found {
                info!("I2C device found at address 0x{:02X}", address);
            }
            info!("Found {} I2C device(s)", found.len());
        }

        if !found.contains(&self.address) {
            log_sensor_warning(
                NAME,
                &format!("did not acknowledge 0x{:02X} during scan", self.address),
            );
        }
    }

    fn start_measurement(&mut self) -> Result<(), SensorError> {
        match self.bus.stop_periodic_measurement() {
            Ok(()) => info!("✅ SCD-41 stopped any ongoing measurements"),
            Err(_) => log_sensor_warning(NAME, "stop measurement failed (sensor might not be running)"),
        }

        self.delay.delay_ms(STOP_SETTLE_MS);

        self.bus.start_periodic_measurement().map_err(|e| {
            SensorError::Communication(format!("SCD-41 start measurement failed: {:?}", e))
        })?;

        info!("✅ SCD-41 periodic measurement started");
        Ok(())
    }

    fn sample(&mut self, readings: &mut Vec<Reading>) -> Result<(), SensorError> {
        let attempts = poll_data_ready(&self.policy, &mut self.delay, || self.bus.data_ready())
            .map_err(|e| match e {
                PollError::Communication { error, .. } => SensorError::Communication(format!(
                    "SCD-41 data ready check failed after retries: {:?}",
                    error
                )),
                PollError::Exhausted { attempts } => SensorError::DataNotReady {
                    sensor: NAME,
                    attempts,
                },
            })?;
        info!("✅ SCD-41 data ready after {} attempts", attempts);

        let measurement = self.bus.read_measurement().map_err(|e| {
            SensorError::Communication(format!("SCD-41 read measurement failed: {:?}", e))
        })?;
        let now = self.clock.now_ms();

        let co2_valid = is_valid_co2(measurement.co2_ppm);
        readings.push(if co2_valid {
            Reading::success(f32::from(measurement.co2_ppm), now)
        } else {
            Reading::invalid(format!("Invalid CO2 reading: {}", measurement.co2_ppm), now)
        });
        log_reading(NAME, DATA_TYPES[0], &readings[0]);

        // Secondary channels are opportunistic and only kept when plausible.
        if is_valid_temperature(measurement.temperature_c) {
            let reading = Reading::success(measurement.temperature_c, now);
            log_reading(NAME, DATA_TYPES[1], &reading);
            readings.push(reading);
        }
        if is_valid_humidity(measurement.humidity_pct) {
            let reading = Reading::success(measurement.humidity_pct, now);
            log_reading(NAME, DATA_TYPES[2], &reading);
            readings.push(reading);
        }

        if co2_valid {
            Ok(())
        } else {
            Err(SensorError::InvalidData(format!(
                "Invalid CO2 reading: {}",
                measurement.co2_ppm
            )))
        }
    }
}

impl<B: Scd4xBus, C: Clock, D: DelayNs> Sensor for Scd41Sensor<B, C, D> {
    fn initialize(&mut self) -> Result<(), SensorError> {
        info!("Initializing SCD-41 sensor...");
        self.state.initialized = false;
        self.measurement_started = false;
        self.warmup.reset();

        self.delay.delay_ms(I2C_SETTLE_MS);
        self.log_bus_scan();
        self.delay.delay_ms(BEGIN_SETTLE_MS);

        if let Err(e) = self.bus.wake_up() {
            return Err(self.state.fail(
                NAME,
                SensorError::Communication(format!("SCD-41 wake-up failed: {:?}", e)),
            ));
        }
        info!("✅ SCD-41 responds at address 0x{:02X}", self.address);
        self.delay.delay_ms(WAKE_SETTLE_MS);

        if let Err(e) = self.start_measurement() {
            return Err(self.state.fail(NAME, e));
        }

        self.measurement_started = true;
        self.warmup.start(&self.clock);
        self.state.initialized = true;
        self.state.clear_error();

        info!("✅ SCD-41 sensor initialized at location: {}", self.location);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state.initialized
            && self.measurement_started
            && self.warmup.is_elapsed(&self.clock)
            && self.gate.is_open(&self.clock)
    }

    fn time_until_ready_ms(&self) -> Option<u64> {
        if !self.state.initialized || !self.measurement_started {
            return None;
        }
        let warmup = self.warmup.remaining_ms(&self.clock)?;
        Some(warmup.max(self.gate.remaining_ms(&self.clock)))
    }

    fn read(&mut self, readings: &mut Vec<Reading>) -> Result<(), SensorError> {
        readings.clear();

        if !self.state.initialized {
            return Err(self.state.fail(NAME, SensorError::NotInitialized(NAME)));
        }
        if !self.is_ready() {
            return Err(self.state.fail(
                NAME,
                SensorError::NotReady {
                    sensor: NAME,
                    reason: "waiting for startup delay",
                },
            ));
        }

        info!("Reading SCD-41 sensor...");
        let outcome = self.sample(readings);
        self.gate.mark(&self.clock);

        match outcome {
            Ok(()) => {
                self.state.clear_error();
                Ok(())
            }
            Err(e) => Err(self.state.fail(NAME, e)),
        }
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn set_location(&mut self, location: String) {
        self.location = location;
    }

    fn last_error(&self) -> &str {
        self.state.last_error()
    }
}
