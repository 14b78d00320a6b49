//! FITS keyword synthesis.
//!
//! Builds the ordered keyword list for a finished frame from the chip
//! geometry, the snooped observatory context and the camera configuration.
//! Keyword order, precision and conditionality follow the conventions
//! astronomy tooling expects, so changes here should be deliberate.

use chrono::SecondsFormat;
use tracing::warn;

use crate::chip::{BayerLayout, ChipState, FrameType};
use crate::context::{ObservationContext, TelescopeSelection};
use crate::exposure::PointingSnapshot;
use crate::fits::{FitsHeader, FitsValue};

/// Arcseconds per radian over 1000, the classic plate-scale constant for
/// pixel sizes in microns and focal lengths in millimeters.
const PLATE_SCALE: f64 = 206.3;

/// Camera-level inputs to header synthesis that do not live on the chip.
#[derive(Debug, Default, Clone)]
pub struct HeaderSettings {
    pub device_name: String,
    pub telescope_name: Option<String>,
    pub observer: Option<String>,
    pub object_name: Option<String>,
    /// Sensor temperature in Celsius, when the camera reads one.
    pub temperature: Option<f64>,
    pub bayer: Option<BayerLayout>,
    pub telescope: TelescopeSelection,
    pub wcs_enabled: bool,
    /// Rotator angle in degrees; `Some` only while an explicit rotation has
    /// been set since WCS was last toggled.
    pub rotation: Option<f64>,
}

/// Builds the full keyword list for one finished frame.
pub fn synthesize(
    chip: &ChipState,
    ctx: &ObservationContext,
    settings: &HeaderSettings,
    pointing: Option<&PointingSnapshot>,
) -> FitsHeader {
    let mut header = FitsHeader::new();
    let string = |s: &str| FitsValue::Str(s.to_string());

    header.add("ROWORDER", string("TOP-DOWN"), "Row Order");
    header.add("INSTRUME", string(&settings.device_name), "CCD Name");
    if let Some(name) = &settings.telescope_name {
        header.add("TELESCOP", string(name), "Telescope name");
    }
    if let Some(name) = &settings.observer {
        header.add("OBSERVER", string(name), "Observer name");
    }
    if let Some(name) = &settings.object_name {
        header.add("OBJECT", string(name), "Object name");
    }

    let duration = chip.exposure_duration();
    header.add(
        "EXPTIME",
        FitsValue::float(duration, 6),
        "Total Exposure Time (s)",
    );
    if chip.frame_type() == FrameType::Dark {
        header.add(
            "DARKTIME",
            FitsValue::float(duration, 6),
            "Total Dark Exposure Time (s)",
        );
    }
    if let Some(celsius) = settings.temperature {
        header.add(
            "CCD-TEMP",
            FitsValue::float(celsius, 2),
            "CCD Temperature (Celsius)",
        );
    }

    header.add(
        "PIXSIZE1",
        FitsValue::float(chip.pixel_size_x(), 6),
        "Pixel Size 1 (microns)",
    );
    header.add(
        "PIXSIZE2",
        FitsValue::float(chip.pixel_size_y(), 6),
        "Pixel Size 2 (microns)",
    );
    header.add(
        "XBINNING",
        FitsValue::Integer(i64::from(chip.bin_x())),
        "Binning factor in width",
    );
    header.add(
        "YBINNING",
        FitsValue::Integer(i64::from(chip.bin_y())),
        "Binning factor in height",
    );
    header.add(
        "XPIXSZ",
        FitsValue::float(chip.pixel_size_x() * f64::from(chip.bin_x()), 6),
        "X binned pixel size in microns",
    );
    header.add(
        "YPIXSZ",
        FitsValue::float(chip.pixel_size_y() * f64::from(chip.bin_y()), 6),
        "Y binned pixel size in microns",
    );

    header.add("FRAME", string(chip.frame_type().label()), "Frame Type");
    header.add(
        "IMAGETYP",
        string(chip.frame_type().image_type()),
        "Frame Type",
    );

    if let Some(filter) = ctx.current_filter() {
        header.add("FILTER", string(filter), "Filter");
    }

    if let Some(bayer) = &settings.bayer {
        if chip.planes() == 1 {
            header.add(
                "XBAYROFF",
                FitsValue::Integer(i64::from(bayer.x_offset)),
                "X offset of Bayer array",
            );
            header.add(
                "YBAYROFF",
                FitsValue::Integer(i64::from(bayer.y_offset)),
                "Y offset of Bayer array",
            );
            header.add("BAYERPAT", string(&bayer.pattern), "Bayer color pattern");
        }
    }

    let (aperture, focal_length) = ctx.optics_for(settings.telescope);
    if focal_length.is_finite() {
        header.add(
            "FOCALLEN",
            FitsValue::float(focal_length, 2),
            "Focal Length (mm)",
        );
    } else {
        warn!("telescope focal length is missing, please set it in the telescope driver");
    }
    if aperture.is_finite() {
        header.add(
            "APTDIA",
            FitsValue::float(aperture, 2),
            "Telescope diameter (mm)",
        );
    } else {
        warn!("telescope aperture is missing, please set it in the telescope driver");
    }

    if ctx.sky_quality.is_finite() {
        header.add(
            "MPSAS",
            FitsValue::float(ctx.sky_quality, 6),
            "Sky Quality (mag per arcsec^2)",
        );
    }
    if ctx.rotator_angle.is_finite() {
        header.add(
            "ROTATANG",
            FitsValue::float(ctx.rotator_angle, 3),
            "Rotator angle in degrees",
        );
    }
    if let Some(steps) = ctx.focuser_position {
        header.add(
            "FOCUSPOS",
            FitsValue::Integer(steps),
            "Focus position in steps",
        );
    }
    if ctx.focuser_temperature.is_finite() {
        header.add(
            "FOCUSTEM",
            FitsValue::float(ctx.focuser_temperature, 3),
            "Focuser temperature in degrees C",
        );
    }

    if focal_length.is_finite() {
        let scale = chip.pixel_size_x() / focal_length * PLATE_SCALE * f64::from(chip.bin_x());
        header.add("SCALE", FitsValue::float(scale, 6), "arcsecs per pixel");
    }

    if chip.frame_type() == FrameType::Light {
        if let Some(p) = pointing {
            add_pointing_keywords(&mut header, chip, ctx, settings, p, focal_length);
        }
    }

    if let Some(start) = chip.exposure_start() {
        header.add(
            "DATE-OBS",
            string(&start.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "UTC start date of observation",
        );
    }
    header.add_comment("Generated by the ccd-camera acquisition pipeline");
    header
}

fn add_pointing_keywords(
    header: &mut FitsHeader,
    chip: &ChipState,
    ctx: &ObservationContext,
    settings: &HeaderSettings,
    pointing: &PointingSnapshot,
    focal_length: f64,
) {
    let string = |s: &str| FitsValue::Str(s.to_string());
    let ra_deg = pointing.j2000_ra_hours * 15.0;
    let dec_deg = pointing.j2000_dec_deg;

    if ctx.latitude.is_finite() && ctx.longitude.is_finite() {
        header.add(
            "SITELAT",
            FitsValue::float(ctx.latitude, 6),
            "Latitude of the imaging site in degrees",
        );
        header.add(
            "SITELONG",
            FitsValue::float(ctx.longitude, 6),
            "Longitude of the imaging site in degrees",
        );
    }
    if pointing.airmass.is_finite() {
        header.add("AIRMASS", FitsValue::float(pointing.airmass, 6), "Airmass");
    }
    header.add(
        "OBJCTRA",
        string(&astrometry::to_sexagesimal(pointing.j2000_ra_hours)),
        "Object J2000 RA in Hours",
    );
    header.add(
        "OBJCTDEC",
        string(&astrometry::to_sexagesimal(dec_deg)),
        "Object J2000 DEC in Degrees",
    );
    header.add("RA", FitsValue::float(ra_deg, 6), "Object J2000 RA in Degrees");
    header.add("DEC", FitsValue::float(dec_deg, 6), "Object J2000 DEC in Degrees");
    if let Some(side) = ctx.pier_side {
        header.add("PIERSIDE", string(side.fits_label()), "Pier Side");
    }
    header.add("EQUINOX", FitsValue::Integer(2000), "Equinox");

    // The WCS block needs an enabled toggle, an explicitly set rotation and
    // known optics; anything less and a plate solver gets misled.
    let rotation = match settings.rotation {
        Some(r) if settings.wcs_enabled && focal_length.is_finite() => r,
        _ => return,
    };
    header.add("CRVAL1", FitsValue::float(ra_deg, 10), "CRVAL1");
    header.add("CRVAL2", FitsValue::float(dec_deg, 10), "CRVAL2");
    header.add("RADECSYS", string("FK5"), "RADECSYS");
    header.add("CTYPE1", string("RA---TAN"), "CTYPE1");
    header.add("CTYPE2", string("DEC--TAN"), "CTYPE2");
    header.add(
        "CRPIX1",
        FitsValue::float(f64::from(chip.sub_w() / chip.bin_x()) / 2.0, 10),
        "CRPIX1",
    );
    header.add(
        "CRPIX2",
        FitsValue::float(f64::from(chip.sub_h() / chip.bin_y()) / 2.0, 10),
        "CRPIX2",
    );
    let secpix1 = chip.pixel_size_x() / focal_length * PLATE_SCALE * f64::from(chip.bin_x());
    let secpix2 = chip.pixel_size_y() / focal_length * PLATE_SCALE * f64::from(chip.bin_y());
    header.add("SECPIX1", FitsValue::float(secpix1, 10), "SECPIX1");
    header.add("SECPIX2", FitsValue::float(secpix2, 10), "SECPIX2");
    header.add("CDELT1", FitsValue::float(secpix1 / 3600.0, 10), "CDELT1");
    header.add("CDELT2", FitsValue::float(secpix2 / 3600.0, 10), "CDELT2");

    // Rotators report clockwise, WCS wants counter-clockwise.
    let mut rotation = 360.0 - rotation;
    if rotation > 360.0 {
        rotation -= 360.0;
    }
    header.add("CROTA1", FitsValue::float(rotation, 10), "CROTA1");
    header.add("CROTA2", FitsValue::float(rotation, 10), "CROTA2");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SnoopEvent;
    use chrono::Utc;

    fn light_chip() -> ChipState {
        let mut chip = ChipState::new();
        chip.configure(1920, 1080, 16, 3.8, 3.8).unwrap();
        chip.begin_exposure(2.0, Utc::now());
        chip
    }

    fn pointing() -> PointingSnapshot {
        PointingSnapshot {
            j2000_ra_hours: 10.5,
            j2000_dec_deg: 20.0,
            airmass: 1.2,
        }
    }

    fn base_settings() -> HeaderSettings {
        HeaderSettings {
            device_name: "Test CCD".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn mandatory_keywords_present_with_fixed_precision() {
        let chip = light_chip();
        let ctx = ObservationContext::new();
        let header = synthesize(&chip, &ctx, &base_settings(), None);

        assert_eq!(
            header.get("ROWORDER"),
            Some(&FitsValue::Str("TOP-DOWN".to_string()))
        );
        assert_eq!(header.get("EXPTIME"), Some(&FitsValue::float(2.0, 6)));
        assert_eq!(header.get("XBINNING"), Some(&FitsValue::Integer(1)));
        assert_eq!(header.get("FRAME"), Some(&FitsValue::Str("Light".to_string())));
        assert_eq!(
            header.get("IMAGETYP"),
            Some(&FitsValue::Str("Light Frame".to_string()))
        );
        assert!(header.contains("DATE-OBS"));
        // No pointing, no site: none of the sky keywords appear.
        assert!(!header.contains("RA"));
        assert!(!header.contains("AIRMASS"));
        assert!(!header.contains("SITELAT"));
    }

    #[test]
    fn dark_frames_carry_darktime() {
        let mut chip = light_chip();
        chip.set_frame_type(FrameType::Dark);
        let header = synthesize(&chip, &ObservationContext::new(), &base_settings(), None);
        assert_eq!(header.get("DARKTIME"), Some(&FitsValue::float(2.0, 6)));
        // Dark frames never get pointing keywords.
        let header = synthesize(
            &chip,
            &ObservationContext::new(),
            &base_settings(),
            Some(&pointing()),
        );
        assert!(!header.contains("OBJCTRA"));
    }

    #[test]
    fn binned_pixel_size_and_scale() {
        let mut chip = light_chip();
        chip.set_binning(2, 2).unwrap();
        let mut ctx = ObservationContext::new();
        ctx.ingest(SnoopEvent::TelescopeInfo {
            primary_aperture: 200.0,
            primary_focal_length: 1000.0,
            guider_aperture: f64::NAN,
            guider_focal_length: f64::NAN,
        });
        let header = synthesize(&chip, &ctx, &base_settings(), None);

        assert_eq!(header.get("XPIXSZ"), Some(&FitsValue::float(7.6, 6)));
        assert_eq!(header.get("FOCALLEN"), Some(&FitsValue::float(1000.0, 2)));
        // 3.8 / 1000 * 206.3 * 2
        assert_eq!(
            header.get("SCALE"),
            Some(&FitsValue::float(3.8 / 1000.0 * 206.3 * 2.0, 6))
        );
    }

    #[test]
    fn pointing_keywords_for_light_frames() {
        let chip = light_chip();
        let mut ctx = ObservationContext::new();
        ctx.ingest(SnoopEvent::GeographicCoord {
            latitude: 34.0,
            longitude: 242.0,
        });
        ctx.ingest(SnoopEvent::PierSide(Some(crate::context::PierSide::West)));
        let header = synthesize(&chip, &ctx, &base_settings(), Some(&pointing()));

        assert_eq!(
            header.get("OBJCTRA"),
            Some(&FitsValue::Str("10 30 00.00".to_string()))
        );
        assert_eq!(header.get("RA"), Some(&FitsValue::float(157.5, 6)));
        assert_eq!(header.get("DEC"), Some(&FitsValue::float(20.0, 6)));
        assert_eq!(header.get("AIRMASS"), Some(&FitsValue::float(1.2, 6)));
        assert_eq!(header.get("SITELONG"), Some(&FitsValue::float(-118.0, 6)));
        assert_eq!(
            header.get("PIERSIDE"),
            Some(&FitsValue::Str("WEST".to_string()))
        );
        assert_eq!(header.get("EQUINOX"), Some(&FitsValue::Integer(2000)));
    }

    #[test]
    fn wcs_requires_all_three_gates() {
        let chip = light_chip();
        let mut ctx = ObservationContext::new();
        ctx.ingest(SnoopEvent::TelescopeInfo {
            primary_aperture: 200.0,
            primary_focal_length: 1000.0,
            guider_aperture: f64::NAN,
            guider_focal_length: f64::NAN,
        });

        let mut settings = base_settings();
        settings.wcs_enabled = true;
        settings.rotation = Some(15.0);
        let header = synthesize(&chip, &ctx, &settings, Some(&pointing()));
        assert!(header.contains("CRVAL1"));
        assert_eq!(header.get("CTYPE1"), Some(&FitsValue::Str("RA---TAN".to_string())));
        assert_eq!(header.get("CRPIX1"), Some(&FitsValue::float(960.0, 10)));
        assert_eq!(header.get("CROTA1"), Some(&FitsValue::float(345.0, 10)));

        // Toggle off any one gate and the whole block vanishes.
        let mut no_wcs = settings.clone();
        no_wcs.wcs_enabled = false;
        assert!(!synthesize(&chip, &ctx, &no_wcs, Some(&pointing())).contains("CRVAL1"));

        let mut no_rotation = settings.clone();
        no_rotation.rotation = None;
        assert!(!synthesize(&chip, &ctx, &no_rotation, Some(&pointing())).contains("CRVAL1"));

        let no_optics = ObservationContext::new();
        assert!(!synthesize(&chip, &no_optics, &settings, Some(&pointing())).contains("CRVAL1"));
    }

    #[test]
    fn filter_and_bayer_keywords() {
        let chip = light_chip();
        let mut ctx = ObservationContext::new();
        ctx.ingest(SnoopEvent::FilterNames(vec!["Ha".to_string(), "OIII".to_string()]));
        ctx.ingest(SnoopEvent::FilterSlot(Some(1)));

        let mut settings = base_settings();
        settings.bayer = Some(BayerLayout {
            x_offset: 0,
            y_offset: 1,
            pattern: "RGGB".to_string(),
        });
        let header = synthesize(&chip, &ctx, &settings, None);
        assert_eq!(header.get("FILTER"), Some(&FitsValue::Str("Ha".to_string())));
        assert_eq!(header.get("YBAYROFF"), Some(&FitsValue::Integer(1)));
        assert_eq!(header.get("BAYERPAT"), Some(&FitsValue::Str("RGGB".to_string())));
    }

    #[test]
    fn bayer_keywords_skipped_for_color_readout() {
        let mut chip = light_chip();
        chip.set_color(true);
        let mut settings = base_settings();
        settings.bayer = Some(BayerLayout {
            x_offset: 0,
            y_offset: 0,
            pattern: "RGGB".to_string(),
        });
        let header = synthesize(&chip, &ObservationContext::new(), &settings, None);
        assert!(!header.contains("BAYERPAT"));
    }
}
