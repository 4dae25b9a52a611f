//! One wake of the node: `Boot → Init → Acquire → Publish → Sleep`.
//!
//! No step can abort the cycle. Failures are logged, reflected in the
//! [`CycleReport`], and the node always ends up asleep on schedule.

use crate::config::Config;
use crate::logging::{log_publish_error, log_sensor_warning};
use crate::models::Reading;
use crate::network::NetworkLink;
use crate::power::DeepSleep;
use crate::publisher::Publisher;
use crate::sensors::Sensor;
use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

/// How a sensor's channels map onto published data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishPlan {
    /// Every channel, in order, as one batch.
    Batch(&'static [&'static str]),
    /// Only the first channel; the rest are diagnostic.
    PrimaryOnly(&'static str),
}

pub struct SensorSlot<'a> {
    sensor: Box<dyn Sensor + 'a>,
    plan: PublishPlan,
    readings: Vec<Reading>,
}

impl<'a> SensorSlot<'a> {
    pub fn new(sensor: impl Sensor + 'a, plan: PublishPlan) -> Self {
        Self {
            sensor: Box::new(sensor),
            plan,
            readings: Vec::new(),
        }
    }

    pub fn sensor(&self) -> &dyn Sensor {
        self.sensor.as_ref()
    }

    /// Readings from this cycle, empty if the sensor was skipped or failed.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Boot,
    Init,
    Acquire,
    Publish,
    Sleep,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sensors_total: usize,
    pub sensors_initialized: usize,
    pub network_connected: bool,
    pub publisher_ready: bool,
    pub sensors_read: usize,
    pub points_published: usize,
}

impl CycleReport {
    /// Every component came up during `Init`.
    pub fn init_complete(&self) -> bool {
        self.sensors_initialized == self.sensors_total
            && self.network_connected
            && self.publisher_ready
    }
}

pub struct Node<'a, N, P, S, D> {
    config: Config,
    slots: Vec<SensorSlot<'a>>,
    link: N,
    publisher: P,
    sleeper: S,
    delay: D,
    state: CycleState,
    report: CycleReport,
}

impl<'a, N, P, S, D> Node<'a, N, P, S, D>
where
    N: NetworkLink,
    P: Publisher,
    S: DeepSleep,
    D: DelayNs,
{
    pub fn new(config: Config, link: N, publisher: P, sleeper: S, delay: D) -> Self {
        Self {
            config,
            slots: Vec::new(),
            link,
            publisher,
            sleeper,
            delay,
            state: CycleState::Boot,
            report: CycleReport::default(),
        }
    }

    /// Sensors are initialized, read and published in the order they are added.
    pub fn with_sensor(mut self, sensor: impl Sensor + 'a, plan: PublishPlan) -> Self {
        self.slots.push(SensorSlot::new(sensor, plan));
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn report(&self) -> &CycleReport {
        &self.report
    }

    pub fn slots(&self) -> &[SensorSlot<'a>] {
        &self.slots
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Everything up to, but not including, `Sleep`.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.report = CycleReport {
            sensors_total: self.slots.len(),
            ..CycleReport::default()
        };

        self.init();
        self.acquire();
        self.publish();

        info!(
            "📋 Cycle done: {}/{} sensors read, {} points published",
            self.report.sensors_read, self.report.sensors_total, self.report.points_published
        );
        self.report.clone()
    }

    fn init(&mut self) {
        self.state = CycleState::Init;
        info!("Initializing sensors...");

        for slot in &mut self.slots {
            match slot.sensor.initialize() {
                Ok(()) => self.report.sensors_initialized += 1,
                Err(_) => warn!("{} unavailable this cycle", slot.sensor.name()),
            }
        }

        if self.config.wifi_ssid.is_empty() {
            warn!("📶 No WiFi SSID configured, running offline");
        } else {
            match self.link.connect(
                &self.config.wifi_ssid,
                &self.config.wifi_password,
                self.config.wifi_timeout_ms,
            ) {
                Ok(()) => self.report.network_connected = true,
                Err(e) => log_publish_error("WiFi", format!("{:#}", e)),
            }
        }

        if self.report.network_connected {
            self.report.publisher_ready = self.publisher.initialize().is_ok();
        }

        if !self.report.init_complete() {
            warn!("⚠️ Some components failed to initialize, continuing anyway");
        }
    }

    fn acquire(&mut self) {
        self.state = CycleState::Acquire;

        for slot in &mut self.slots {
            slot.readings.clear();
            let sensor = slot.sensor.as_mut();

            if let Some(wait_ms) = sensor.time_until_ready_ms()
                && wait_ms > 0
                && wait_ms <= self.config.readiness_wait_ms
            {
                info!("⏳ Waiting {} ms for {}", wait_ms, sensor.name());
                self.delay
                    .delay_ms(u32::try_from(wait_ms).unwrap_or(u32::MAX));
            }

            if !sensor.is_ready() {
                log_sensor_warning(sensor.name(), "not ready, skipping");
                continue;
            }

            match sensor.read(&mut slot.readings) {
                Ok(()) => self.report.sensors_read += 1,
                Err(_) => slot.readings.clear(),
            }
        }
    }

    fn publish(&mut self) {
        self.state = CycleState::Publish;

        if !self.publisher.is_ready() {
            warn!("📡 {} not ready, skipping publish", self.publisher.name());
            return;
        }

        for slot in &self.slots {
            if slot.readings.is_empty() {
                continue;
            }
            let sensor = slot.sensor.as_ref();

            let published = match slot.plan {
                PublishPlan::Batch(data_types) => self.publisher.publish_batch(
                    sensor.name(),
                    sensor.location(),
                    &slot.readings,
                    data_types,
                ),
                PublishPlan::PrimaryOnly(data_type) => {
                    match slot.readings.first().and_then(Reading::valid_value) {
                        Some(value) => {
                            let result = self.publisher.publish(sensor.location(), data_type, value);
                            usize::from(result.success)
                        }
                        None => 0,
                    }
                }
            };
            self.report.points_published += published;
        }
    }

    /// Drop the network and arm the wake-up timer.
    pub fn prepare_sleep(&mut self) -> anyhow::Result<()> {
        self.state = CycleState::Sleep;
        self.link.disconnect();
        info!("💤 Going to sleep for {} seconds", self.config.sleep_duration_s);
        self.sleeper.arm_timer(self.config.sleep_duration_s)
    }

    pub fn sleep(mut self) -> ! {
        if let Err(e) = self.prepare_sleep() {
            error!("‼️ Cannot enter deep sleep: {:#}. Restarting.", e);
            self.sleeper.restart();
        }
        self.sleeper.enter()
    }
}
