//! Client property dispatch.
//!
//! Incoming property writes are routed through a flat table of
//! (property name, handler) pairs instead of a virtual override chain, so
//! the full client surface is visible in one place.

use std::path::PathBuf;

use crate::camera::{CaptureBackend, CcdCamera, ChipSelect};
use crate::chip::FrameType;
use crate::delivery::UploadMode;
use crate::error::{CameraError, CameraResult};

/// One client property write: named elements of a single kind.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Numbers(Vec<(String, f64)>),
    Switches(Vec<(String, bool)>),
    Texts(Vec<(String, String)>),
}

impl PropertyValue {
    pub fn numbers(values: &[(&str, f64)]) -> Self {
        PropertyValue::Numbers(
            values
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
        )
    }

    pub fn switch_on(name: &str) -> Self {
        PropertyValue::Switches(vec![(name.to_string(), true)])
    }

    pub fn texts(values: &[(&str, &str)]) -> Self {
        PropertyValue::Texts(
            values
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self {
            PropertyValue::Numbers(values) => {
                values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
            }
            _ => None,
        }
    }

    pub fn first_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Numbers(values) => values.first().map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Name of the first switch that is on.
    pub fn on_switch(&self) -> Option<&str> {
        match self {
            PropertyValue::Switches(values) => values
                .iter()
                .find(|(_, on)| *on)
                .map(|(n, _)| n.as_str()),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self {
            PropertyValue::Texts(values) => values
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

pub type Handler<B> = fn(&mut CcdCamera<B>, &PropertyValue) -> CameraResult<()>;

/// The full client property surface.
pub fn dispatch_table<B: CaptureBackend>() -> [(&'static str, Handler<B>); 10] {
    [
        ("CCD_EXPOSURE", handle_exposure::<B> as Handler<B>),
        ("CCD_ABORT_EXPOSURE", handle_abort::<B>),
        ("CCD_FRAME", handle_frame::<B>),
        ("CCD_BINNING", handle_binning::<B>),
        ("CCD_FRAME_TYPE", handle_frame_type::<B>),
        ("CCD_COMPRESS", handle_compress::<B>),
        ("CCD_ROTATION", handle_rotation::<B>),
        ("CCD_WCS", handle_wcs::<B>),
        ("UPLOAD_MODE", handle_upload_mode::<B>),
        ("UPLOAD_SETTINGS", handle_upload_settings::<B>),
    ]
}

/// Routes one property write. `None` means the property is not ours.
pub fn dispatch<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    property: &str,
    value: &PropertyValue,
) -> Option<CameraResult<()>> {
    dispatch_table::<B>()
        .iter()
        .find(|(name, _)| *name == property)
        .map(|(_, handler)| handler(camera, value))
}

fn missing(element: &str) -> CameraError {
    CameraError::Validation(format!("missing element {element}"))
}

fn handle_exposure<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    let duration = value
        .number("CCD_EXPOSURE_VALUE")
        .or_else(|| value.first_number())
        .ok_or_else(|| missing("CCD_EXPOSURE_VALUE"))?;
    camera.start_exposure(ChipSelect::Primary, duration)
}

fn handle_abort<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    _value: &PropertyValue,
) -> CameraResult<()> {
    camera.abort_exposure(ChipSelect::Primary)
}

fn non_negative(value: f64, element: &str) -> CameraResult<u32> {
    if !value.is_finite() || value < 0.0 {
        return Err(CameraError::Validation(format!(
            "invalid {element} value {value}"
        )));
    }
    Ok(value as u32)
}

fn handle_frame<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    if !camera.capabilities().can_subframe {
        return Err(CameraError::Validation(
            "camera does not support subframing".to_string(),
        ));
    }
    let chip = camera.primary_chip();
    // Elements the client leaves out keep their current values.
    let x = value.number("X").unwrap_or(f64::from(chip.sub_x()));
    let y = value.number("Y").unwrap_or(f64::from(chip.sub_y()));
    let w = value.number("WIDTH").unwrap_or(f64::from(chip.sub_w()));
    let h = value.number("HEIGHT").unwrap_or(f64::from(chip.sub_h()));
    camera.primary_chip_mut().set_frame(
        non_negative(x, "X")?,
        non_negative(y, "Y")?,
        non_negative(w, "WIDTH")?,
        non_negative(h, "HEIGHT")?,
    )
}

fn handle_binning<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    if !camera.capabilities().can_bin {
        return Err(CameraError::Validation(
            "camera does not support binning".to_string(),
        ));
    }
    let chip = camera.primary_chip();
    let bx = value.number("HOR_BIN").unwrap_or(f64::from(chip.bin_x()));
    let by = value.number("VER_BIN").unwrap_or(f64::from(chip.bin_y()));
    camera
        .primary_chip_mut()
        .set_binning(non_negative(bx, "HOR_BIN")?, non_negative(by, "VER_BIN")?)
}

fn handle_frame_type<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    let frame_type = match value.on_switch() {
        Some("FRAME_LIGHT") => FrameType::Light,
        Some("FRAME_BIAS") => FrameType::Bias,
        Some("FRAME_DARK") => FrameType::Dark,
        Some("FRAME_FLAT") => FrameType::Flat,
        other => {
            return Err(CameraError::Validation(format!(
                "unknown frame type {other:?}"
            )))
        }
    };
    camera.primary_chip_mut().set_frame_type(frame_type);
    Ok(())
}

fn enabled_switch(value: &PropertyValue) -> CameraResult<bool> {
    match value.on_switch() {
        Some("INDI_ENABLED") => Ok(true),
        Some("INDI_DISABLED") => Ok(false),
        other => Err(CameraError::Validation(format!(
            "unknown toggle {other:?}"
        ))),
    }
}

fn handle_compress<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    let enabled = enabled_switch(value)?;
    camera.primary_chip_mut().set_compress(enabled);
    Ok(())
}

fn handle_rotation<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    let degrees = value
        .number("CCD_ROTATION_VALUE")
        .or_else(|| value.first_number())
        .ok_or_else(|| missing("CCD_ROTATION_VALUE"))?;
    camera.set_rotation(degrees);
    Ok(())
}

fn handle_wcs<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    let enabled = enabled_switch(value)?;
    camera.set_wcs(enabled);
    Ok(())
}

fn handle_upload_mode<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    let mode = match value.on_switch() {
        Some("UPLOAD_CLIENT") => UploadMode::Client,
        Some("UPLOAD_LOCAL") => UploadMode::Local,
        Some("UPLOAD_BOTH") => UploadMode::Both,
        other => {
            return Err(CameraError::Validation(format!(
                "unknown upload mode {other:?}"
            )))
        }
    };
    camera.upload_settings_mut().mode = mode;
    Ok(())
}

fn handle_upload_settings<B: CaptureBackend>(
    camera: &mut CcdCamera<B>,
    value: &PropertyValue,
) -> CameraResult<()> {
    if let Some(dir) = value.text("UPLOAD_DIR") {
        camera.upload_settings_mut().directory = PathBuf::from(dir);
    }
    if let Some(prefix) = value.text("UPLOAD_PREFIX") {
        camera.upload_settings_mut().prefix = prefix.to_string();
    }
    Ok(())
}
