//! CCD camera acquisition pipeline.
//!
//! Owns chip state, sequences exposures against a vendor capture backend,
//! synthesizes FITS metadata from snooped observatory context, encodes and
//! optionally compresses frames, and routes them to a client, the local
//! filesystem, or both.
//!
//! The crate is transport-agnostic: hosts plug in a [`sink::PropertySink`]
//! for property traffic, optionally a [`sink::StreamChannel`] for direct
//! image push, and a [`camera::CaptureBackend`] for the hardware.

pub mod camera;
pub mod chip;
pub mod compress;
pub mod config;
pub mod context;
pub mod delivery;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod exposure;
pub mod fits;
pub mod header;
pub mod sink;
pub mod worker;

pub use camera::{Capabilities, CaptureBackend, CcdCamera, ChipSelect, MockBackend};
pub use chip::{BayerLayout, ChipState, FrameType};
pub use context::{ObservationContext, PierSide, SnoopEvent, SnoopSubscriptions, TelescopeSelection};
pub use delivery::{UploadMode, UploadSettings};
pub use error::{CameraError, CameraResult};
pub use sink::{PropertySink, PropertyState, PropertyUpdate, StreamChannel};
pub use worker::CompletionWorker;
