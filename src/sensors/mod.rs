//! Polymorphic sensor contract and its three variants.
//!
//! Every variant owns its bus handle exclusively and is driven by the cycle in
//! a pull model: `initialize` once per boot, then `read` whenever `is_ready`.
//! Nothing here panics or propagates past the cycle: each call returns a
//! `Result` and keeps the rendered message as `last_error`.

pub mod dht11;
pub mod ds18b20;
pub mod readiness;
pub mod scd41;

pub use dht11::{Dht11Sensor, DhtBus};
pub use self::ds18b20::{DallasBus, Ds18b20Sensor};
pub use readiness::{PollError, ReadinessGate, WarmupGate, poll_data_ready};
pub use scd41::{Scd41Sensor, Scd4xBus, Scd4xMeasurement};

use crate::error::SensorError;
use crate::logging::log_sensor_error;
use crate::models::Reading;

pub trait Sensor {
    /// One-time hardware bring-up. Leaves the sensor not-ready on failure.
    fn initialize(&mut self) -> Result<(), SensorError>;

    /// Side-effect free readiness check.
    fn is_ready(&self) -> bool;

    /// Milliseconds until `is_ready` turns true purely by waiting, or `None`
    /// when waiting cannot help (not initialized).
    fn time_until_ready_ms(&self) -> Option<u64> {
        self.is_ready().then_some(0)
    }

    /// Clears `readings`, then fills it with one entry per channel produced.
    ///
    /// `Ok` means at least one entry is valid (for the SCD-41, specifically the
    /// CO2 entry). On `Err` the vector is
    /// either empty or leads with a failure-tagged entry; a multi-channel
    /// sensor may still append valid secondary channels after a failed
    /// primary (the SCD-41 keeps plausible temperature and humidity when CO2
    /// is out of range).
    fn read(&mut self, readings: &mut Vec<Reading>) -> Result<(), SensorError>;

    fn name(&self) -> &'static str;

    fn location(&self) -> &str;

    fn set_location(&mut self, location: String);

    fn last_error(&self) -> &str;
}

/// Bookkeeping common to all sensor variants.
#[derive(Debug, Default)]
pub(crate) struct SensorState {
    pub(crate) initialized: bool,
    last_error: String,
}

impl SensorState {
    /// Record and log `error`, handing it back for the caller to return.
    pub(crate) fn fail(&mut self, name: &str, error: SensorError) -> SensorError {
        self.last_error = error.to_string();
        log_sensor_error(name, &error);
        error
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error.clear();
    }

    pub(crate) fn last_error(&self) -> &str {
        &self.last_error
    }
}
