//! Observer seams between the camera and whatever hosts it.
//!
//! The camera never pushes property updates implicitly from setters; every
//! state change goes through an explicit [`PropertySink`]. Image payloads go
//! out either as a BLOB on the sink or, when a [`StreamChannel`] is
//! attached, as a text format tag followed by the binary payload.

use std::sync::Mutex;

use crate::error::CameraResult;

/// Lifecycle state of a client-visible property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyState {
    Idle,
    Ok,
    Busy,
    Alert,
}

/// One property state change, optionally with a human-readable message.
#[derive(Debug, Clone)]
pub struct PropertyUpdate {
    pub property: String,
    pub state: PropertyState,
    pub message: Option<String>,
}

impl PropertyUpdate {
    pub fn new(property: &str, state: PropertyState) -> Self {
        Self {
            property: property.to_string(),
            state,
            message: None,
        }
    }

    pub fn with_message(property: &str, state: PropertyState, message: impl Into<String>) -> Self {
        Self {
            property: property.to_string(),
            state,
            message: Some(message.into()),
        }
    }
}

/// Receives property state changes and image BLOBs from the camera.
pub trait PropertySink: Send + Sync {
    fn notify(&self, update: PropertyUpdate);

    /// Delivers an encoded image on the named BLOB property. `format` is the
    /// file suffix of the payload, e.g. `".fits"` or `".fits.fz"`.
    fn send_blob(&self, property: &str, format: &str, data: &[u8]);
}

/// Byte-stream transport for direct image push. Implementations send the
/// format tag first so the receiver can name the payload that follows.
pub trait StreamChannel: Send + Sync {
    fn send_text(&self, tag: &str) -> CameraResult<()>;
    fn send_binary(&self, data: &[u8]) -> CameraResult<()>;
}

/// One BLOB captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub property: String,
    pub format: String,
    pub data: Vec<u8>,
}

/// Sink that records everything it receives. Test double.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<PropertyUpdate>>,
    blobs: Mutex<Vec<BlobRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// States posted for the named property, in order.
    pub fn states_for(&self, property: &str) -> Vec<PropertyState> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.property == property)
            .map(|u| u.state)
            .collect()
    }

    pub fn last_message_for(&self, property: &str) -> Option<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|u| u.property == property)
            .and_then(|u| u.message.clone())
    }

    pub fn blobs(&self) -> Vec<BlobRecord> {
        self.blobs.lock().unwrap().clone()
    }
}

impl PropertySink for RecordingSink {
    fn notify(&self, update: PropertyUpdate) {
        self.updates.lock().unwrap().push(update);
    }

    fn send_blob(&self, property: &str, format: &str, data: &[u8]) {
        self.blobs.lock().unwrap().push(BlobRecord {
            property: property.to_string(),
            format: format.to_string(),
            data: data.to_vec(),
        });
    }
}
