use crate::models::{Reading, ReadingStatus};
use crate::time_utils::{get_formatted_timestamp, get_uptime_string};
use log::{error, info, warn};

const SPLASH_SCREEN: &str = r#"
  ____                              _   _       _ _       _
 / ___|  ___ _ __  ___  ___  _ __  | | | |_ __ | (_)_ __ | | __
 \___ \ / _ \ '_ \/ __|/ _ \| '__| | | | | '_ \| | | '_ \| |/ /
  ___) |  __/ | | \__ \ (_) | |    | |_| | |_) | | | | | |   <
 |____/ \___|_| |_|___/\___/|_|     \___/| .__/|_|_|_| |_|_|\_\
                                         |_|                   "#;

pub(crate) enum LogLevel {
    Info,
    Warn,
    Error,
}

pub fn print_splash_screen() {
    info!("{}", SPLASH_SCREEN);
}

/// Boot diagnostics printed once per wake.
#[derive(Clone, Debug)]
pub struct SystemInfo {
    pub boot_count: u32,
    pub free_heap_bytes: u32,
    pub sleep_duration_s: u64,
    pub wakeup_cause: &'static str,
}

pub fn log_system_info(system: &SystemInfo) {
    info!("========================================");
    info!("🔁 Boot count: {}", system.boot_count);
    info!("🧠 Free heap: {} bytes", system.free_heap_bytes);
    info!("💤 Sleep duration: {} seconds", system.sleep_duration_s);
    info!("⏰ Wakeup: {}", system.wakeup_cause);
    info!("========================================");
}

pub fn log_reading(sensor_name: &str, channel: &str, reading: &Reading) {
    let msg = match reading.status {
        ReadingStatus::Success => format!("✅ {} {}: {:.1}", sensor_name, channel, reading.value),
        _ => format!(
            "✗ {} {}: {}",
            sensor_name,
            channel,
            reading.error_message.as_deref().unwrap_or("invalid reading")
        ),
    };
    let level = if reading.is_success() {
        LogLevel::Info
    } else {
        LogLevel::Warn
    };
    log_message(level, &msg);
}

pub fn log_sensor_error(sensor_name: &str, error: impl std::fmt::Display) {
    log_message(LogLevel::Error, &format!("🚫 {} Error: {}", sensor_name, error));
}

pub fn log_sensor_warning(sensor_name: &str, message: &str) {
    log_message(LogLevel::Warn, &format!("⚠️ {} {}", sensor_name, message));
}

pub fn log_publish_summary(sensor_name: &str, published: usize, total: usize) {
    log_message(
        LogLevel::Info,
        &format!("📡 Published {}/{} readings from {} sensor", published, total, sensor_name),
    );
}

pub fn log_publish_error(publisher: &str, error: impl std::fmt::Display) {
    log_message(LogLevel::Error, &format!("📡‼️ {} Error: {}", publisher, error));
}

pub(crate) fn log_message(level: LogLevel, message: &str) {
    let prefix = format!("{} [{}]", get_uptime_string(), get_formatted_timestamp());

    match level {
        LogLevel::Error => error!("\x1b[31m{} {}\x1b[0m", prefix, message),
        LogLevel::Warn => warn!("\x1b[38;5;11m{} {}\x1b[0m", prefix, message),
        LogLevel::Info => info!("\x1b[38;5;40m{} {}\x1b[0m", prefix, message),
    }
}
