//! Firmware configuration.
//!
//! A single [`Config`] is built at boot and handed to every component, so there
//! is no ambient global state. Values baked in through `.env` (see `build.rs`)
//! override the defaults below.

pub const TIMESTAMP_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// Bounded polling policy for a device-side "data ready" flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataReadyPolicy {
    /// Upper bound on data-ready polls.
    pub max_attempts: u16,
    /// Delay between polls while the flag is still clear.
    pub poll_delay_ms: u32,
    /// Attempts within which a communication error is retried instead of fatal.
    pub comm_retry_attempts: u16,
    /// Backoff after a communication error.
    pub comm_retry_delay_ms: u32,
}

impl Default for DataReadyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            poll_delay_ms: 100,
            comm_retry_attempts: 5,
            comm_retry_delay_ms: 500,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Sensor deployment sites
    pub dht_location: String,
    pub ds18b20_location: String,
    pub scd41_location: String,

    // Backend
    pub supabase_url: String,
    pub supabase_key: String,
    pub table_name: String,
    pub publish_pacing_ms: u32,

    // Network
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub wifi_timeout_ms: u32,
    pub wifi_retry_delay_ms: u32,

    // Cycle
    pub sleep_duration_s: u64,
    /// Longest the cycle blocks for a sensor that will be ready by waiting.
    pub readiness_wait_ms: u64,

    // Pins and buses
    pub dht_pin: u8,
    pub ds18b20_pin: u8,
    pub i2c_sda_pin: u8,
    pub i2c_scl_pin: u8,
    pub i2c_frequency_hz: u32,
    /// Only checked against the boot-time bus scan; the driver always talks to 0x62.
    pub scd41_address: u8,

    // DHT11
    pub dht_stabilization_delay_ms: u32,
    pub dht_min_interval_ms: u64,

    // DS18B20
    pub ds18b20_device_index: u8,
    pub ds18b20_conversion_delay_ms: u32,

    // SCD-41
    pub scd41_warmup_ms: u64,
    pub scd41_min_interval_ms: u64,
    pub scd41_data_ready: DataReadyPolicy,

    pub timezone: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dht_location: "room".into(),
            ds18b20_location: "outside".into(),
            scd41_location: "room".into(),

            supabase_url: String::new(),
            supabase_key: String::new(),
            table_name: "environment_measurements".into(),
            publish_pacing_ms: 1000,

            wifi_ssid: String::new(),
            wifi_password: String::new(),
            wifi_timeout_ms: 30_000,
            wifi_retry_delay_ms: 500,

            sleep_duration_s: 900, // 15 minutes
            readiness_wait_ms: 10_000,

            dht_pin: 4,
            ds18b20_pin: 8,
            i2c_sda_pin: 10,
            i2c_scl_pin: 9,
            i2c_frequency_hz: 50_000, // 50kHz for reliability
            scd41_address: 0x62,

            dht_stabilization_delay_ms: 2000,
            dht_min_interval_ms: 2000,

            ds18b20_device_index: 0,
            ds18b20_conversion_delay_ms: 1000,

            scd41_warmup_ms: 6000,
            scd41_min_interval_ms: 5000,
            scd41_data_ready: DataReadyPolicy::default(),

            timezone: "UTC".into(),
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever `build.rs` baked in from `.env`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| match key {
            "WIFI_SSID" => option_env!("WIFI_SSID"),
            "WIFI_PASS" => option_env!("WIFI_PASS"),
            "SUPABASE_URL" => option_env!("SUPABASE_URL"),
            "SUPABASE_KEY" => option_env!("SUPABASE_KEY"),
            "SUPABASE_TABLE" => option_env!("SUPABASE_TABLE"),
            "DHT_LOCATION" => option_env!("DHT_LOCATION"),
            "DS18B20_LOCATION" => option_env!("DS18B20_LOCATION"),
            "SCD41_LOCATION" => option_env!("SCD41_LOCATION"),
            "SLEEP_DURATION_SECONDS" => option_env!("SLEEP_DURATION_SECONDS"),
            "TIMEZONE" => option_env!("TIMEZONE"),
            _ => None,
        })
    }

    fn with_overrides<'a>(mut self, lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let get = |key: &str| lookup(key).map(str::trim).filter(|v| !v.is_empty());

        if let Some(v) = get("WIFI_SSID") {
            self.wifi_ssid = v.into();
        }
        if let Some(v) = get("WIFI_PASS") {
            self.wifi_password = v.into();
        }
        if let Some(v) = get("SUPABASE_URL") {
            self.supabase_url = v.trim_end_matches('/').into();
        }
        if let Some(v) = get("SUPABASE_KEY") {
            self.supabase_key = v.into();
        }
        if let Some(v) = get("SUPABASE_TABLE") {
            self.table_name = v.into();
        }
        if let Some(v) = get("DHT_LOCATION") {
            self.dht_location = v.into();
        }
        if let Some(v) = get("DS18B20_LOCATION") {
            self.ds18b20_location = v.into();
        }
        if let Some(v) = get("SCD41_LOCATION") {
            self.scd41_location = v.into();
        }
        if let Some(v) = get("SLEEP_DURATION_SECONDS") {
            match v.parse() {
                Ok(secs) => self.sleep_duration_s = secs,
                Err(_) => log::warn!("Ignoring malformed SLEEP_DURATION_SECONDS={v:?}"),
            }
        }
        if let Some(v) = get("TIMEZONE") {
            self.timezone = v.into();
        }

        self
    }

    pub fn with_dht_location(mut self, location: impl Into<String>) -> Self {
        self.dht_location = location.into();
        self
    }

    pub fn with_ds18b20_location(mut self, location: impl Into<String>) -> Self {
        self.ds18b20_location = location.into();
        self
    }

    pub fn with_scd41_location(mut self, location: impl Into<String>) -> Self {
        self.scd41_location = location.into();
        self
    }

    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    pub fn with_sleep_duration_s(mut self, secs: u64) -> Self {
        self.sleep_duration_s = secs;
        self
    }
}
