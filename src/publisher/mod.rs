//! Publisher contract: push readings to a remote store, one value per write.

pub mod supabase;

pub use supabase::{HttpTransport, SupabasePublisher};

use crate::error::PublishError;
use crate::logging::{log_publish_error, log_publish_summary, log_sensor_warning};
use crate::models::{PublishResult, Reading};

pub trait Publisher {
    fn name(&self) -> &'static str;

    /// Establish the backend session. Requires the network to be up.
    fn initialize(&mut self) -> Result<(), PublishError>;

    /// Initialized and the network is up right now.
    fn is_ready(&self) -> bool;

    fn publish(&mut self, location: &str, data_type: &str, value: f32) -> PublishResult;

    fn last_error(&self) -> &str;

    /// Called when a whole batch is rejected before any write.
    fn fail_batch(&mut self, error: PublishError) {
        log_publish_error(self.name(), &error);
    }

    /// Best-effort publish of `readings[i]` under `data_types[i]`.
    ///
    /// Entries that are not [`ReadingStatus::Success`](crate::models::ReadingStatus)
    /// are skipped, not counted as failures. Returns how many writes the backend
    /// confirmed; nothing is rolled back. Mismatched lengths publish nothing.
    fn publish_batch(
        &mut self,
        sensor_name: &str,
        location: &str,
        readings: &[Reading],
        data_types: &[&str],
    ) -> usize {
        if readings.len() != data_types.len() {
            let error = PublishError::LengthMismatch {
                readings: readings.len(),
                types: data_types.len(),
            };
            self.fail_batch(error);
            return 0;
        }

        let mut published = 0;
        for (reading, data_type) in readings.iter().zip(data_types) {
            let Some(value) = reading.valid_value() else {
                log_sensor_warning(
                    sensor_name,
                    &format!(
                        "skipping invalid {} reading: {}",
                        data_type,
                        reading.error_message.as_deref().unwrap_or("no value")
                    ),
                );
                continue;
            };

            if self.publish(location, data_type, value).success {
                published += 1;
            }
        }

        log_publish_summary(sensor_name, published, readings.len());
        published
    }
}
