use crate::config::TIMESTAMP_PATTERN;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::OnceLock;

/// Monotonic millisecond clock shared by sensors and publishers for their
/// readiness decisions.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Milliseconds since `since`, saturating so a clock reset never underflows.
pub fn elapsed_ms(clock: &impl Clock, since: u64) -> u64 {
    clock.now_ms().saturating_sub(since)
}

/// Boot-relative clock backed by the embassy time driver that `esp-idf-svc` provides.
#[cfg(target_os = "espidf")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EspClock;

#[cfg(target_os = "espidf")]
impl Clock for EspClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}

pub fn format_uptime(micros: i64) -> String {
    let seconds = micros / 1_000_000;
    let millis = (micros % 1_000_000) / 1_000;
    format!("[{:>4}.{:03}s]", seconds, millis)
}

#[cfg(target_os = "espidf")]
pub fn get_uptime_string() -> String {
    let micros = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    format_uptime(micros)
}

#[cfg(not(target_os = "espidf"))]
pub fn get_uptime_string() -> String {
    static START: OnceLock<std::time::Instant> = OnceLock::new();
    let micros = START.get_or_init(std::time::Instant::now).elapsed().as_micros();
    format_uptime(i64::try_from(micros).unwrap_or(i64::MAX))
}

/// Select the timezone used for log timestamps. Only the first call wins.
pub fn set_timezone(name: &str) {
    let tz = name.parse().unwrap_or_else(|_| {
        log::warn!("Unknown timezone {name:?}, falling back to UTC");
        chrono_tz::UTC
    });
    let _ = TIMEZONE.set(tz);
}

pub fn get_formatted_timestamp() -> String {
    get_current_time_in_timezone()
        .format(TIMESTAMP_PATTERN)
        .to_string()
}

static TIMEZONE: OnceLock<Tz> = OnceLock::new();

fn get_current_time_in_timezone() -> DateTime<Tz> {
    Utc::now().with_timezone(TIMEZONE.get_or_init(|| chrono_tz::UTC))
}
