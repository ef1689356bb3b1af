use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
}
