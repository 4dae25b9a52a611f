//! DHT11 single-wire humidity and temperature sensor.

use super::readiness::ReadinessGate;
use super::{Sensor, SensorState};
use crate::config::Config;
use crate::error::SensorError;
use crate::logging::log_reading;
use crate::models::Reading;
use crate::time_utils::Clock;
use embedded_hal::delay::DelayNs;
use log::info;

const NAME: &str = "DHT11";

/// Channel order of a successful read.
pub const DATA_TYPES: [&str; 2] = ["temperature", "humidity"];

/// Raw access to a DHT-style sensor.
///
/// Each channel is sampled independently; a failed sample is reported as NaN,
/// which is how the sensor family signals a bad frame.
pub trait DhtBus {
    type Error: core::fmt::Debug;

    fn begin(&mut self) -> Result<(), Self::Error>;
    fn read_humidity(&mut self) -> f32;
    fn read_temperature(&mut self) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Checksum { expected: u8, actual: u8 },
    Timeout,
}

/// Pulse length separating a `0` bit (~27us high) from a `1` bit (~70us high).
pub const BIT_THRESHOLD_US: u32 = 50;

/// Pack the 40 high-pulse durations of a frame into its 5 bytes, MSB first.
pub fn bits_to_bytes(high_pulses_us: &[u32; 40]) -> [u8; 5] {
    let mut bytes = [0u8; 5];
    for (i, &pulse) in high_pulses_us.iter().enumerate() {
        if pulse > BIT_THRESHOLD_US {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bytes
}

/// Decode a DHT11 frame into `(humidity %, temperature °C)`.
pub fn decode_frame(bytes: [u8; 5]) -> Result<(f32, f32), FrameError> {
    let expected = bytes[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if expected != bytes[4] {
        return Err(FrameError::Checksum {
            expected,
            actual: bytes[4],
        });
    }

    let humidity = f32::from(bytes[0]) + f32::from(bytes[1]) * 0.1;
    let magnitude = f32::from(bytes[2]) + f32::from(bytes[3] & 0x7f) * 0.1;
    let temperature = if bytes[3] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };

    Ok((humidity, temperature))
}

pub struct Dht11Sensor<B, C, D> {
    bus: B,
    clock: C,
    delay: D,
    location: String,
    stabilization_delay_ms: u32,
    gate: ReadinessGate,
    state: SensorState,
}

impl<B: DhtBus, C: Clock, D: DelayNs> Dht11Sensor<B, C, D> {
    pub fn new(bus: B, clock: C, delay: D, config: &Config) -> Self {
        Self {
            bus,
            clock,
            delay,
            location: config.dht_location.clone(),
            stabilization_delay_ms: config.dht_stabilization_delay_ms,
            gate: ReadinessGate::new(config.dht_min_interval_ms),
            state: SensorState::default(),
        }
    }

    fn is_valid(value: f32) -> bool {
        value.is_finite()
    }

    fn sample(&mut self, readings: &mut Vec<Reading>) -> Result<(), SensorError> {
        self.delay.delay_ms(self.stabilization_delay_ms);

        let humidity = self.bus.read_humidity();
        let temperature = self.bus.read_temperature();
        let now = self.clock.now_ms();

        let temp_valid = Self::is_valid(temperature);
        let humid_valid = Self::is_valid(humidity);

        if !temp_valid && !humid_valid {
            return Err(SensorError::InvalidData(
                "DHT11 failed to read both temperature and humidity".into(),
            ));
        }

        readings.push(if temp_valid {
            Reading::success(temperature, now)
        } else {
            Reading::invalid("Invalid temperature reading", now)
        });
        readings.push(if humid_valid {
            Reading::success(humidity, now)
        } else {
            Reading::invalid("Invalid humidity reading", now)
        });

        for (channel, reading) in DATA_TYPES.iter().zip(readings.iter()) {
            log_reading(NAME, channel, reading);
        }
        Ok(())
    }
}

impl<B: DhtBus, C: Clock, D: DelayNs> Sensor for Dht11Sensor<B, C, D> {
    fn initialize(&mut self) -> Result<(), SensorError> {
        info!("Initializing DHT11 sensor...");

        if let Err(e) = self.bus.begin() {
            self.state.initialized = false;
            return Err(self.state.fail(
                NAME,
                SensorError::Failed(format!("DHT11 initialization failed: {:?}", e)),
            ));
        }

        self.state.initialized = true;
        self.state.clear_error();
        info!("✅ DHT11 sensor initialized at location: {}", self.location);
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
                    reason: "minimum interval not met",
                },
            ));
        }

        info!("Reading DHT11 sensor...");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReadingStatus;
    use crate::testing::{BusFault, MockClock};

    #[derive(Default)]
    struct FakeDht {
        humidity: Vec<f32>,
        temperature: Vec<f32>,
        fail_begin: bool,
    }

    impl FakeDht {
        fn returning(humidity: f32, temperature: f32) -> Self {
            Self {
                humidity: vec![humidity],
                temperature: vec![temperature],
                fail_begin: false,
            }
        }
    }

    impl DhtBus for FakeDht {
        type Error = BusFault;

        fn begin(&mut self) -> Result<(), BusFault> {
            if self.fail_begin {
                Err(BusFault("pin busy"))
            } else {
                Ok(())
            }
        }

        fn read_humidity(&mut self) -> f32 {
            if self.humidity.len() > 1 {
                self.humidity.remove(0)
            } else {
                self.humidity.first().copied().unwrap_or(f32::NAN)
            }
        }

        fn read_temperature(&mut self) -> f32 {
            if self.temperature.len() > 1 {
                self.temperature.remove(0)
            } else {
                self.temperature.first().copied().unwrap_or(f32::NAN)
            }
        }
    }

    fn sensor(bus: FakeDht) -> (Dht11Sensor<FakeDht, MockClock, MockClock>, MockClock) {
        let clock = MockClock::at_ms(1000);
        let sensor = Dht11Sensor::new(bus, clock.clone(), clock.clone(), &Config::default());
        (sensor, clock)
    }

    #[test]
    fn read_before_initialize_fails() {
        let (mut dht, _) = sensor(FakeDht::returning(40.0, 21.0));
        let mut readings = vec![Reading::success(1.0, 0)];

        assert!(!dht.is_ready());
        assert_eq!(dht.read(&mut readings), Err(SensorError::NotInitialized("DHT11")));
        assert!(readings.is_empty());
        assert!(!dht.last_error().is_empty());
    }

    #[test]
    fn failed_begin_leaves_sensor_not_ready() {
        let (mut dht, _) = sensor(FakeDht {
            fail_begin: true,
            ..FakeDht::default()
        });

        assert!(dht.initialize().is_err());
        assert!(!dht.is_ready());
        assert!(dht.last_error().contains("pin busy"));
    }

    #[test]
    fn reads_both_channels() {
        let (mut dht, clock) = sensor(FakeDht::returning(45.0, 22.5));
        dht.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(dht.read(&mut readings).is_ok());
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].valid_value(), Some(22.5));
        assert_eq!(readings[1].valid_value(), Some(45.0));
        // stabilisation delay is spent before sampling
        assert_eq!(clock.now_ms(), 3000);
        assert_eq!(readings[0].timestamp_ms, 3000);
        assert!(dht.last_error().is_empty());
    }

    #[test]
    fn one_invalid_channel_is_reported_not_dropped() {
        let (mut dht, _) = sensor(FakeDht::returning(f32::NAN, 19.0));
        dht.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(dht.read(&mut readings).is_ok());
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].status, ReadingStatus::Success);
        assert_eq!(readings[1].status, ReadingStatus::InvalidData);
        assert_eq!(
            readings.iter().filter(|r| r.is_success()).count(),
            1,
        );
    }

    #[test]
    fn infinite_temperature_is_invalid() {
        let (mut dht, _) = sensor(FakeDht::returning(50.0, f32::INFINITY));
        dht.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(dht.read(&mut readings).is_ok());
        assert_eq!(readings[0].status, ReadingStatus::InvalidData);
        assert_eq!(readings[1].status, ReadingStatus::Success);
    }

    #[test]
    fn both_channels_invalid_fails() {
        let (mut dht, _) = sensor(FakeDht::returning(f32::NAN, f32::NAN));
        dht.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(matches!(
            dht.read(&mut readings),
            Err(SensorError::InvalidData(_))
        ));
        assert!(readings.is_empty());
        assert!(dht.last_error().contains("both"));
    }

    #[test]
    fn minimum_interval_gates_next_read_even_after_failure() {
        let (mut dht, clock) = sensor(FakeDht::returning(f32::NAN, f32::NAN));
        dht.initialize().unwrap();
        let mut readings = Vec::new();

        assert!(dht.read(&mut readings).is_err());
        assert!(!dht.is_ready());
        assert_eq!(dht.time_until_ready_ms(), Some(2000));
        assert!(matches!(
            dht.read(&mut readings),
            Err(SensorError::NotReady { .. })
        ));

        clock.advance_ms(2000);
        assert!(dht.is_ready());
        assert_eq!(dht.time_until_ready_ms(), Some(0));
    }

    #[test]
    fn location_is_overridable() {
        let (mut dht, _) = sensor(FakeDht::default());
        assert_eq!(dht.location(), "room");
        dht.set_location("bedroom".into());
        assert_eq!(dht.location(), "bedroom");
        assert_eq!(dht.name(), "DHT11");
    }

    #[test]
    fn decodes_frames() {
        let (humidity, temperature) = decode_frame([45, 0, 23, 4, 72]).unwrap();
        assert_eq!(humidity, 45.0);
        assert!((temperature - 23.4).abs() < 1e-4);

        let (humidity, temperature) = decode_frame([30, 0, 1, 0x85, 0xA4]).unwrap();
        assert_eq!(humidity, 30.0);
        assert!((temperature + 1.5).abs() < 1e-4);

        assert_eq!(
            decode_frame([45, 0, 23, 4, 0]),
            Err(FrameError::Checksum {
                expected: 72,
                actual: 0
            })
        );
    }

    #[test]
    fn packs_pulses_msb_first() {
        let mut pulses = [26u32; 40];
        pulses[0] = 70; // byte 0 bit 7
        pulses[15] = 72; // byte 1 bit 0
        pulses[39] = 68; // byte 4 bit 0

        assert_eq!(bits_to_bytes(&pulses), [0x80, 0x01, 0x00, 0x00, 0x01]);
    }
}
