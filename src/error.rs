use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("{0} not initialized")]
    NotInitialized(&'static str),
    #[error("{sensor} not ready for reading ({reason})")]
    NotReady {
        sensor: &'static str,
        reason: &'static str,
    },
    #[error("{0}")]
    Communication(String),
    #[error("{0}")]
    InvalidData(String),
    #[error("No {0} devices found. Check wiring and pullup resistor.")]
    NoDevices(&'static str),
    #[error("Device index {index} exceeds available devices ({count})")]
    DeviceIndexOutOfRange { index: u8, count: u8 },
    #[error("{sensor} data not ready after {attempts} attempts")]
    DataNotReady { sensor: &'static str, attempts: u16 },
    #[error("{0}")]
    Failed(String),
}

impl SensorError {
    /// Status tag for a reading that could not be produced because of this error.
    pub fn reading_status(&self) -> crate::models::ReadingStatus {
        use crate::models::ReadingStatus;

        match self {
            SensorError::NotInitialized(_) => ReadingStatus::NotInitialized,
            SensorError::Communication(_) | SensorError::DataNotReady { .. } => {
                ReadingStatus::CommunicationError
            }
            SensorError::InvalidData(_) => ReadingStatus::InvalidData,
            _ => ReadingStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("backend URL or API key is empty")]
    MissingCredentials,
    #[error("WiFi not connected")]
    LinkDown,
    #[error("publisher not ready (WiFi disconnected or not initialized)")]
    NotReady,
    #[error("session setup failed: {0}")]
    Session(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("cannot encode payload: {0}")]
    Encode(String),
    #[error("mismatch between readings count ({readings}) and data types count ({types})")]
    LengthMismatch { readings: usize, types: usize },
}
