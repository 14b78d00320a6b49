//! Pipeline error types.

use thiserror::Error;

use crate::fits::FitsError;

/// Errors surfaced by the acquisition pipeline.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Rejected client input: bad geometry, out-of-range duration, bad depth.
    #[error("validation error: {0}")]
    Validation(String),

    /// The capture backend failed to start or abort an exposure.
    #[error("device I/O error: {0}")]
    DeviceIo(String),

    /// The frame could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Compression failed; the delivery is abandoned, never sent partial.
    #[error("compression error: {0}")]
    Compression(String),

    /// The encoded image could not be saved or sent.
    #[error("delivery error: {0}")]
    Delivery(String),
}

impl From<FitsError> for CameraError {
    fn from(err: FitsError) -> Self {
        CameraError::Encoding(err.to_string())
    }
}

pub type CameraResult<T> = Result<T, CameraError>;
