use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

/// Outcome attached to every [`Reading`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadingStatus {
    Success,
    Failed,
    NotInitialized,
    CommunicationError,
    InvalidData,
}

/// One channel of a sensor measurement.
///
/// The value is only meaningful when `status` is [`ReadingStatus::Success`];
/// every other status carries an error message instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub value: f32,
    pub status: ReadingStatus,
    pub error_message: Option<String>,
    /// Monotonic milliseconds at capture.
    pub timestamp_ms: u64,
}

impl Reading {
    pub fn success(value: f32, timestamp_ms: u64) -> Self {
        Self {
            value,
            status: ReadingStatus::Success,
            error_message: None,
            timestamp_ms,
        }
    }

    pub fn failure(status: ReadingStatus, message: impl Into<String>, timestamp_ms: u64) -> Self {
        debug_assert!(status != ReadingStatus::Success);
        Self {
            value: f32::NAN,
            status,
            error_message: Some(message.into()),
            timestamp_ms,
        }
    }

    pub fn invalid(message: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::failure(ReadingStatus::InvalidData, message, timestamp_ms)
    }

    pub fn is_success(&self) -> bool {
        self.status == ReadingStatus::Success
    }

    /// The value, if it may be trusted.
    pub fn valid_value(&self) -> Option<f32> {
        self.is_success().then_some(self.value)
    }
}

/// Outcome of a single backend write.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishResult {
    pub success: bool,
    /// HTTP status, `None` when no response was received.
    pub response_code: Option<u16>,
    pub error_message: Option<String>,
    pub timestamp_ms: u64,
}

impl PublishResult {
    pub fn ok(response_code: u16, timestamp_ms: u64) -> Self {
        Self {
            success: true,
            response_code: Some(response_code),
            error_message: None,
            timestamp_ms,
        }
    }

    pub fn failed(
        response_code: Option<u16>,
        message: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            success: false,
            response_code,
            error_message: Some(message.into()),
            timestamp_ms,
        }
    }
}

/// Row written to the measurement table: `{ location, type, value }`.
///
/// `value` is emitted with exactly two decimals (`21.50`, not `21.5`).
#[derive(Serialize, Clone, Debug)]
pub struct MeasurementPayload<'a> {
    pub location: &'a str,
    #[serde(rename = "type")]
    pub data_type: &'a str,
    #[serde(serialize_with = "two_decimals")]
    pub value: f32,
}

impl<'a> MeasurementPayload<'a> {
    pub fn new(location: &'a str, data_type: &'a str, value: f32) -> Self {
        Self {
            location,
            data_type,
            value,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Owned counterpart of [`MeasurementPayload`], as read back from the table.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct MeasurementRecord {
    pub location: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub value: f64,
}

fn two_decimals<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::Error;

    if !value.is_finite() {
        return Err(S::Error::custom(format!("non-finite value {value}")));
    }
    let raw = RawValue::from_string(format!("{:.2}", value)).map_err(S::Error::custom)?;
    raw.serialize(serializer)
}
