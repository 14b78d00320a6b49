//! Per-chip acquisition state: geometry, depth, frame type and the frame
//! buffer.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::{CameraError, CameraResult};
use crate::sink::PropertyState;

/// What kind of frame the next exposure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Light,
    Bias,
    Dark,
    Flat,
}

impl FrameType {
    /// Short label used for the FRAME keyword.
    pub fn label(self) -> &'static str {
        match self {
            FrameType::Light => "Light",
            FrameType::Bias => "Bias",
            FrameType::Dark => "Dark",
            FrameType::Flat => "Flat",
        }
    }

    /// Long label used for the IMAGETYP keyword.
    pub fn image_type(self) -> &'static str {
        match self {
            FrameType::Light => "Light Frame",
            FrameType::Bias => "Bias Frame",
            FrameType::Dark => "Dark Frame",
            FrameType::Flat => "Flat Frame",
        }
    }
}

/// Bayer mosaic description for one-shot color sensors.
#[derive(Debug, Clone)]
pub struct BayerLayout {
    pub x_offset: u32,
    pub y_offset: u32,
    /// Pattern string as reported by the sensor, e.g. `"RGGB"`.
    pub pattern: String,
}

/// Shared view of a chip's exposure state, safe to hand to a finishing
/// thread.
#[derive(Debug, Clone)]
pub struct ExposureStateHandle(Arc<Mutex<PropertyState>>);

impl ExposureStateHandle {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(PropertyState::Idle)))
    }

    pub fn get(&self) -> PropertyState {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, state: PropertyState) {
        *self.0.lock().unwrap() = state;
    }
}

/// Mutable acquisition state for one imaging chip.
///
/// The frame buffer lives behind a mutex shared with the capture backend and
/// the finishing thread; geometry changes never resize it directly, they
/// mark it stale and [`ChipState::prepare_buffer`] resizes it right before
/// the next capture.
#[derive(Debug)]
pub struct ChipState {
    max_width: u32,
    max_height: u32,
    sub_x: u32,
    sub_y: u32,
    sub_w: u32,
    sub_h: u32,
    bin_x: u32,
    bin_y: u32,
    pixel_size_x: f64,
    pixel_size_y: f64,
    bpp: u8,
    planes: u8,
    frame_type: FrameType,
    image_extension: String,
    compress: bool,
    exposure_duration: f64,
    exposure_start: Option<DateTime<Utc>>,
    state: ExposureStateHandle,
    buffer: Arc<Mutex<Vec<u8>>>,
    buffer_stale: bool,
}

impl Default for ChipState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipState {
    pub fn new() -> Self {
        Self {
            max_width: 0,
            max_height: 0,
            sub_x: 0,
            sub_y: 0,
            sub_w: 0,
            sub_h: 0,
            bin_x: 1,
            bin_y: 1,
            pixel_size_x: 0.0,
            pixel_size_y: 0.0,
            bpp: 8,
            planes: 1,
            frame_type: FrameType::Light,
            image_extension: "fits".to_string(),
            compress: false,
            exposure_duration: 0.0,
            exposure_start: None,
            state: ExposureStateHandle::new(),
            buffer: Arc::new(Mutex::new(Vec::new())),
            buffer_stale: true,
        }
    }

    /// One-shot sensor setup: resolution, depth and physical pixel size.
    /// Resets the subframe to the full sensor and binning to 1x1.
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        bpp: u8,
        pixel_size_x: f64,
        pixel_size_y: f64,
    ) -> CameraResult<()> {
        self.set_resolution(width, height);
        self.set_bpp(bpp)?;
        self.bin_x = 1;
        self.bin_y = 1;
        self.pixel_size_x = pixel_size_x;
        self.pixel_size_y = pixel_size_y;
        Ok(())
    }

    /// Sets the sensor size and resets the subframe to cover it.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.max_width = width;
        self.max_height = height;
        self.sub_x = 0;
        self.sub_y = 0;
        self.sub_w = width;
        self.sub_h = height;
        self.buffer_stale = true;
    }

    /// Sets the capture subframe in unbinned pixels. On rejection the prior
    /// rectangle is untouched.
    pub fn set_frame(&mut self, x: u32, y: u32, w: u32, h: u32) -> CameraResult<()> {
        if w == 0 || h == 0 {
            return Err(CameraError::Validation(format!(
                "invalid frame size {w}x{h}"
            )));
        }
        // Checked addition: client values can be anywhere in u32 range.
        let fits = x
            .checked_add(w)
            .zip(y.checked_add(h))
            .map_or(false, |(right, bottom)| {
                right <= self.max_width && bottom <= self.max_height
            });
        if !fits {
            return Err(CameraError::Validation(format!(
                "frame {x},{y} {w}x{h} exceeds sensor {}x{}",
                self.max_width, self.max_height
            )));
        }
        self.sub_x = x;
        self.sub_y = y;
        self.sub_w = w;
        self.sub_h = h;
        self.buffer_stale = true;
        Ok(())
    }

    pub fn set_binning(&mut self, bin_x: u32, bin_y: u32) -> CameraResult<()> {
        if !(1..=4).contains(&bin_x) || !(1..=4).contains(&bin_y) {
            return Err(CameraError::Validation(format!(
                "unsupported binning {bin_x}x{bin_y}"
            )));
        }
        self.bin_x = bin_x;
        self.bin_y = bin_y;
        self.buffer_stale = true;
        Ok(())
    }

    pub fn set_bpp(&mut self, bpp: u8) -> CameraResult<()> {
        if !matches!(bpp, 8 | 16 | 32) {
            return Err(CameraError::Validation(format!(
                "unsupported bit depth {bpp}"
            )));
        }
        self.bpp = bpp;
        self.buffer_stale = true;
        Ok(())
    }

    /// Switches between monochrome (1 plane) and color (3 planes) readout.
    pub fn set_color(&mut self, color: bool) {
        self.planes = if color { 3 } else { 1 };
        self.buffer_stale = true;
    }

    pub fn set_pixel_size(&mut self, x_microns: f64, y_microns: f64) {
        self.pixel_size_x = x_microns;
        self.pixel_size_y = y_microns;
    }

    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.frame_type = frame_type;
    }

    pub fn set_compress(&mut self, enabled: bool) {
        self.compress = enabled;
    }

    /// File suffix of the frames this chip produces, without the dot.
    /// `fits` frames go through the encoder; anything else is passed
    /// through as a vendor-native payload.
    pub fn set_image_extension(&mut self, extension: &str) {
        self.image_extension = extension.to_string();
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn sub_x(&self) -> u32 {
        self.sub_x
    }

    pub fn sub_y(&self) -> u32 {
        self.sub_y
    }

    pub fn sub_w(&self) -> u32 {
        self.sub_w
    }

    pub fn sub_h(&self) -> u32 {
        self.sub_h
    }

    pub fn bin_x(&self) -> u32 {
        self.bin_x
    }

    pub fn bin_y(&self) -> u32 {
        self.bin_y
    }

    pub fn pixel_size_x(&self) -> f64 {
        self.pixel_size_x
    }

    pub fn pixel_size_y(&self) -> f64 {
        self.pixel_size_y
    }

    pub fn bpp(&self) -> u8 {
        self.bpp
    }

    pub fn planes(&self) -> u8 {
        self.planes
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn compress_enabled(&self) -> bool {
        self.compress
    }

    pub fn image_extension(&self) -> &str {
        &self.image_extension
    }

    pub fn binned_width(&self) -> u32 {
        self.sub_w / self.bin_x
    }

    pub fn binned_height(&self) -> u32 {
        self.sub_h / self.bin_y
    }

    pub fn exposure_duration(&self) -> f64 {
        self.exposure_duration
    }

    pub fn exposure_start(&self) -> Option<DateTime<Utc>> {
        self.exposure_start
    }

    pub fn exposure_state(&self) -> PropertyState {
        self.state.get()
    }

    pub fn set_exposure_state(&self, state: PropertyState) {
        self.state.set(state);
    }

    pub fn state_handle(&self) -> ExposureStateHandle {
        self.state.clone()
    }

    pub fn buffer_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.buffer)
    }

    /// Bytes one captured frame occupies at the current geometry.
    pub fn required_buffer_size(&self) -> usize {
        self.binned_width() as usize
            * self.binned_height() as usize
            * (self.bpp as usize / 8)
            * self.planes as usize
    }

    /// Resizes the frame buffer if geometry changed since the last capture.
    pub fn prepare_buffer(&mut self) {
        let required = self.required_buffer_size();
        let mut buffer = self.buffer.lock().unwrap();
        if self.buffer_stale || buffer.len() != required {
            buffer.resize(required, 0);
        }
        drop(buffer);
        self.buffer_stale = false;
    }

    /// Copies a captured frame into the buffer, sizing it to fit.
    pub fn load_frame(&mut self, data: &[u8]) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.clear();
        buffer.extend_from_slice(data);
        drop(buffer);
        self.buffer_stale = false;
    }

    pub(crate) fn begin_exposure(&mut self, duration: f64, start: DateTime<Utc>) {
        self.exposure_duration = duration;
        self.exposure_start = Some(start);
        self.state.set(PropertyState::Busy);
    }

    pub(crate) fn end_exposure(&mut self) {
        self.exposure_duration = 0.0;
        self.state.set(PropertyState::Idle);
    }
}
