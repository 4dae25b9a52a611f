//! DS18B20 temperature sensor on a shared OneWire bus.

use super::readiness::ReadinessGate;
use super::{Sensor, SensorState};
use crate::config::Config;
use crate::error::SensorError;
use crate::logging::log_reading;
use crate::models::{Reading, ReadingStatus};
use crate::time_utils::Clock;
use embedded_hal::delay::DelayNs;
use log::info;

const NAME: &str = "DS18B20";

pub const DATA_TYPES: [&str; 1] = ["temperature"];

/// Value the Dallas driver reports for a device that dropped off the bus.
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;

/// Exclusive bounds of the DS18B20 operating range.
pub const MIN_VALID_TEMP: f32 = -55.0;
pub const MAX_VALID_TEMP: f32 = 125.0;

/// A OneWire bus carrying one or more Dallas thermometers, addressed by the
/// order they were discovered in.
pub trait DallasBus {
    type Error: core::fmt::Debug;

    /// Reset the bus and enumerate attached thermometers.
    fn begin(&mut self) -> Result<(), Self::Error>;
    fn device_count(&self) -> u8;
    fn is_parasite_power(&mut self) -> bool;
    /// Broadcast a conversion command to every device.
    fn request_temperatures(&mut self) -> Result<(), Self::Error>;
    /// Fetch the last converted value; the sentinel [`DEVICE_DISCONNECTED_C`]
    /// signals a missing device.
    fn temperature_c(&mut self, index: u8) -> Result<f32, Self::Error>;
}

pub fn is_valid_temperature(temperature: f32) -> bool {
    temperature != DEVICE_DISCONNECTED_C
        && temperature.is_finite()
        && temperature > MIN_VALID_TEMP
        && temperature < MAX_VALID_TEMP
}

pub struct Ds18b20Sensor<B, C, D> {
    bus: B,
    clock: C,
    delay: D,
    location: String,
    device_index: u8,
    conversion_delay_ms: u32,
    gate: ReadinessGate,
    state: SensorState,
}

impl<B: DallasBus, C: Clock, D: DelayNs> Ds18b20Sensor<B, C, D> {
    pub fn new(bus: B, clock: C, delay: D, config: &Config) -> Self {
        Self {
            bus,
            clock,
            delay,
            location: config.ds18b20_location.clone(),
            device_index: config.ds18b20_device_index,
            conversion_delay_ms: config.ds18b20_conversion_delay_ms,
            gate: ReadinessGate::new(u64::from(config.ds18b20_conversion_delay_ms)),
            state: SensorState::default(),
        }
    }

    pub fn with_device_index(mut self, device_index: u8) -> Self {
        self.device_index = device_index;
        self
    }

    /// Thermometers found on the bus, 0 until initialized.
    pub fn device_count(&self) -> u8 {
        if self.state.initialized {
            self.bus.device_count()
        } else {
            0
        }
    }

    pub fn is_parasite_power(&mut self) -> bool {
        self.state.initialized && self.bus.is_parasite_power()
    }

    fn sample(&mut self, readings: &mut Vec<Reading>) -> Result<(), SensorError> {
        let requested = self.bus.request_temperatures();
        self.gate.mark(&self.clock);
        requested.map_err(|e| {
            SensorError::Communication(format!("DS18B20 conversion request failed: {:?}", e))
        })?;

        self.delay.delay_ms(self.conversion_delay_ms);

        let now = self.clock.now_ms();
        let temperature = match self.bus.temperature_c(self.device_index) {
            Ok(t) => t,
            Err(e) => {
                let message = format!("DS18B20 read failed: {:?}", e);
                readings.push(Reading::failure(
                    ReadingStatus::CommunicationError,
                    message.clone(),
                    now,
                ));
                return Err(SensorError::Communication(message));
            }
        };

        if !is_valid_temperature(temperature) {
            let message = format!("DS18B20 returned invalid temperature: {:.2}", temperature);
            readings.push(Reading::invalid(message.clone(), now));
            return Err(SensorError::InvalidData(message));
        }

        readings.push(Reading::success(temperature, now));
        log_reading(NAME, DATA_TYPES[0], &readings[0]);
        Ok(())
    }
}

impl<B: DallasBus, C: Clock, D: DelayNs> Sensor for Ds18b20Sensor<B, C, D> {
    fn initialize(&mut self) -> Result<(), SensorError> {
        info!("Initializing DS18B20 sensor...");
        self.state.initialized = false;

        if let Err(e) = self.bus.begin() {
            return Err(self.state.fail(
                NAME,
                SensorError::Failed(format!("DS18B20 initialization failed: {:?}", e)),
            ));
        }

        let count = self.bus.device_count();
        info!("DS18B20 devices found: {}", count);

        if count == 0 {
            return Err(self.state.fail(NAME, SensorError::NoDevices(NAME)));
        }
        if self.device_index >= count {
            return Err(self.state.fail(
                NAME,
                SensorError::DeviceIndexOutOfRange {
                    index: self.device_index,
                    count,
                },
            ));
        }

        info!(
            "DS18B20 parasite power: {}",
            if self.bus.is_parasite_power() { "ON" } else { "OFF" }
        );

        self.state.initialized = true;
        self.state.clear_error();
        info!(
            "✅ DS18B20 sensor initialized at location: {} (device {})",
            self.location, self.device_index
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state.initialized && self.gate.is_open(&self.clock)
    }

    fn time_until_ready_ms(&self) -> Option<u64> {
        self.state
            .initialized
            .then(|| self.gate.remaining_ms(&self.clock))
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
                    reason: "conversion interval not met",
                },
            ));
        }

        info!("Reading DS18B20 sensor...");
        match self.sample(readings) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BusFault, MockClock};

    struct FakeBus {
        devices: u8,
        temperature: Result<f32, BusFault>,
    }

    impl FakeBus {
        fn with(devices: u8, temperature: f32) -> Self {
            Self {
                devices,
                temperature: Ok(temperature),
            }
        }
    }

    impl DallasBus for FakeBus {
        type Error = BusFault;

        fn begin(&mut self) -> Result<(), BusFault> {
            Ok(())
        }

        fn device_count(&self) -> u8 {
            self.devices
        }

        fn is_parasite_power(&mut self) -> bool {
            false
        }

        fn request_temperatures(&mut self) -> Result<(), BusFault> {
            Ok(())
        }

        fn temperature_c(&mut self, index: u8) -> Result<f32, BusFault> {
            if index >= self.devices {
                return Ok(DEVICE_DISCONNECTED_C);
            }
            self.temperature.clone()
        }
    }

    type TestSensor = Ds18b20Sensor<FakeBus, MockClock, MockClock>;

    fn sensor(bus: FakeBus) -> (TestSensor, MockClock) {
        let clock = MockClock::at_ms(5000);
        let sensor = Ds18b20Sensor::new(bus, clock.clone(), clock.clone(), &Config::default());
        (sensor, clock)
    }

    #[test]
    fn no_devices_fails_initialize() {
        let (mut ds, _) = sensor(FakeBus::with(0, 20.0));

        assert_eq!(ds.initialize(), Err(SensorError::NoDevices("DS18B20")));
        assert!(!ds.is_ready());
        assert!(ds.last_error().contains("No DS18B20 devices found"));
    }

    #[test]
    fn device_index_beyond_bus_fails_initialize() {
        let (ds, _) = sensor(FakeBus::with(2, 20.0));
        let mut ds = ds.with_device_index(2);

        assert_eq!(
            ds.initialize(),
            Err(SensorError::DeviceIndexOutOfRange { index: 2, count: 2 })
        );
        assert_eq!(ds.device_count(), 0);

        let (ds, _) = sensor(FakeBus::with(2, 20.0));
        let mut ds = ds.with_device_index(1);
        assert!(ds.initialize().is_ok());
        assert_eq!(ds.device_count(), 2);
    }

    #[test]
    fn read_before_initialize_fails() {
        let (mut ds, _) = sensor(FakeBus::with(1, 20.0));
        let mut readings = Vec::new();

        assert!(ds.read(&mut readings).is_err());
        assert!(readings.is_empty());
        assert!(!ds.last_error().is_empty());
    }

    #[test]
    fn reads_after_conversion_delay() {
        let (mut ds, clock) = sensor(FakeBus::with(1, 18.25));
        ds.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(ds.read(&mut readings).is_ok());
        assert_eq!(readings, vec![Reading::success(18.25, 6000)]);
        assert_eq!(clock.now_ms(), 6000);
        // the conversion started at 5000, so the interval has already elapsed
        assert!(ds.is_ready());
    }

    #[test]
    fn read_inside_conversion_interval_is_refused() {
        let (mut ds, clock) = sensor(FakeBus::with(1, 18.25));
        ds.initialize().unwrap();
        let mut readings = Vec::new();
        ds.read(&mut readings).unwrap();

        // conversion was requested at 5000; 5500 is inside the 1000ms interval
        clock.set_ms(5500);
        assert!(!ds.is_ready());
        assert_eq!(ds.time_until_ready_ms(), Some(500));

        assert!(matches!(
            ds.read(&mut readings),
            Err(SensorError::NotReady { sensor: "DS18B20", .. })
        ));
        assert!(readings.is_empty());
        assert!(ds.last_error().contains("conversion interval not met"));
    }

    #[test]
    fn disconnected_sentinel_is_invalid() {
        let (mut ds, _) = sensor(FakeBus::with(1, DEVICE_DISCONNECTED_C));
        ds.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(matches!(
            ds.read(&mut readings),
            Err(SensorError::InvalidData(_))
        ));
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].status, ReadingStatus::InvalidData);
        assert!(ds.last_error().contains("-127.00"));
    }

    #[test]
    fn bus_error_is_tagged_as_communication() {
        let (mut ds, _) = sensor(FakeBus {
            devices: 1,
            temperature: Err(BusFault("crc mismatch")),
        });
        ds.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(matches!(
            ds.read(&mut readings),
            Err(SensorError::Communication(_))
        ));
        assert_eq!(readings[0].status, ReadingStatus::CommunicationError);
    }

    #[test]
    fn validity_range_is_exclusive() {
        assert!(is_valid_temperature(21.0));
        assert!(is_valid_temperature(-54.9));
        assert!(is_valid_temperature(124.9));
        assert!(!is_valid_temperature(-55.0));
        assert!(!is_valid_temperature(125.0));
        assert!(!is_valid_temperature(DEVICE_DISCONNECTED_C));
        assert!(!is_valid_temperature(f32::NAN));
    }
}
