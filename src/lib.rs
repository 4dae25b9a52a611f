//! Battery-powered environment node: sample the attached sensors, push the
//! readings to a Supabase table over WiFi, then deep sleep until the next wake.
//!
//! Everything outside `hw` and the ESP halves of [`network`], [`power`] and
//! [`publisher::supabase`] is hardware independent and runs on the host.

pub mod config;
pub mod cycle;
pub mod error;
pub mod logging;
pub mod models;
pub mod network;
pub mod power;
pub mod publisher;
pub mod sensors;
pub mod time_utils;

#[cfg(target_os = "espidf")]
pub mod hw;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use cycle::{CycleReport, CycleState, Node, PublishPlan};
pub use error::{PublishError, SensorError};
pub use models::{PublishResult, Reading, ReadingStatus};
