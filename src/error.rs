use thiserror::Error;

/// Result type for SoundTouch operations
pub type Result<T> = std::result::Result<T, SoundTouchError>;

/// Errors that can occur when interacting with SoundTouch speakers
#[derive(Error, Debug)]
pub enum SoundTouchError {
    /// Device did not answer within the timeout or refused the connection
    #[error("device unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// Response was received but could not be parsed into the expected shape
    #[error("malformed device response: {reason}")]
    ProtocolError {
        /// What the parser expected and did not find
        reason: String,
        /// Raw payload as received, for diagnosis
        body: String,
    },

    /// Device answered with a well-formed error status
    #[error("device rejected request (HTTP {status})")]
    DeviceRejected {
        /// HTTP status code the device returned
        status: u16,
        /// Raw response body, if any
        body: String,
    },

    /// Caller-supplied parameter failed validation before any network call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Zone membership rule violated (duplicate membership or master removal)
    #[error("zone conflict: {0}")]
    ZoneConflict(String),

    /// WebSocket transport error on the event channel
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SoundTouchError {
    pub(crate) fn protocol(reason: impl Into<String>, body: impl Into<String>) -> Self {
        SoundTouchError::ProtocolError {
            reason: reason.into(),
            body: body.into(),
        }
    }
}
