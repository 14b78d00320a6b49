//! Snooped observatory state.
//!
//! The camera listens to a handful of properties published by other devices
//! (mount, filter wheel, rotator, focuser, weather) and folds them into an
//! [`ObservationContext`] used purely for metadata synthesis. Unknown values
//! stay at their sentinels (`NaN` or `None`) and the corresponding keywords
//! are simply not written.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Which side of the pier a German equatorial mount reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PierSide {
    East,
    West,
}

impl PierSide {
    pub fn fits_label(self) -> &'static str {
        match self {
            PierSide::East => "EAST",
            PierSide::West => "WEST",
        }
    }
}

/// Which optical train the chip images through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TelescopeSelection {
    #[default]
    Primary,
    Guide,
}

/// One update snooped from an upstream device.
#[derive(Debug, Clone)]
pub enum SnoopEvent {
    /// Mount pointing, equinox of date. RA in hours, Dec in degrees.
    Equatorial { ra_hours: f64, dec_deg: f64 },
    PierSide(Option<PierSide>),
    /// Optics of the primary and guide trains, millimeters.
    TelescopeInfo {
        primary_aperture: f64,
        primary_focal_length: f64,
        guider_aperture: f64,
        guider_focal_length: f64,
    },
    FilterNames(Vec<String>),
    /// Current filter wheel slot, 1-based.
    FilterSlot(Option<usize>),
    /// Sky brightness in magnitudes per square arcsecond.
    SkyQuality(f64),
    /// Rotator mechanical angle in degrees.
    RotatorAngle(f64),
    /// Focuser absolute position in steps.
    FocuserPosition(i64),
    /// Focuser temperature in degrees Celsius.
    FocuserTemperature(f64),
    /// Site coordinates in degrees. Longitude arrives east-positive
    /// 0..360 and is normalized to -180..180.
    GeographicCoord { latitude: f64, longitude: f64 },
}

/// Latest snooped observatory state. Numeric fields default to `NaN`.
#[derive(Debug, Clone)]
pub struct ObservationContext {
    pub ra_hours: f64,
    pub dec_deg: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub primary_aperture: f64,
    pub primary_focal_length: f64,
    pub guider_aperture: f64,
    pub guider_focal_length: f64,
    pub rotator_angle: f64,
    pub sky_quality: f64,
    pub focuser_temperature: f64,
    pub focuser_position: Option<i64>,
    pub filter_names: Vec<String>,
    pub filter_slot: Option<usize>,
    pub pier_side: Option<PierSide>,
}

impl Default for ObservationContext {
    fn default() -> Self {
        Self {
            ra_hours: f64::NAN,
            dec_deg: f64::NAN,
            latitude: f64::NAN,
            longitude: f64::NAN,
            primary_aperture: f64::NAN,
            primary_focal_length: f64::NAN,
            guider_aperture: f64::NAN,
            guider_focal_length: f64::NAN,
            rotator_angle: f64::NAN,
            sky_quality: f64::NAN,
            focuser_temperature: f64::NAN,
            focuser_position: None,
            filter_names: Vec::new(),
            filter_slot: None,
            pier_side: None,
        }
    }
}

impl ObservationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one snooped update.
    pub fn ingest(&mut self, event: SnoopEvent) {
        match event {
            SnoopEvent::Equatorial { ra_hours, dec_deg } => {
                self.ra_hours = ra_hours;
                self.dec_deg = dec_deg;
            }
            SnoopEvent::PierSide(side) => self.pier_side = side,
            SnoopEvent::TelescopeInfo {
                primary_aperture,
                primary_focal_length,
                guider_aperture,
                guider_focal_length,
            } => {
                self.primary_aperture = primary_aperture;
                self.primary_focal_length = primary_focal_length;
                self.guider_aperture = guider_aperture;
                self.guider_focal_length = guider_focal_length;
            }
            SnoopEvent::FilterNames(names) => self.filter_names = names,
            SnoopEvent::FilterSlot(slot) => self.filter_slot = slot,
            SnoopEvent::SkyQuality(mpsas) => self.sky_quality = mpsas,
            SnoopEvent::RotatorAngle(angle) => self.rotator_angle = angle,
            SnoopEvent::FocuserPosition(steps) => self.focuser_position = Some(steps),
            SnoopEvent::FocuserTemperature(celsius) => self.focuser_temperature = celsius,
            SnoopEvent::GeographicCoord {
                latitude,
                longitude,
            } => {
                self.latitude = latitude;
                self.longitude = if longitude > 180.0 {
                    longitude - 360.0
                } else {
                    longitude
                };
            }
        }
    }

    /// Aperture and focal length of the selected optical train, in that
    /// order. `NaN` when the mount never reported them.
    pub fn optics_for(&self, selection: TelescopeSelection) -> (f64, f64) {
        match selection {
            TelescopeSelection::Primary => (self.primary_aperture, self.primary_focal_length),
            TelescopeSelection::Guide => (self.guider_aperture, self.guider_focal_length),
        }
    }

    /// Filter name for the current slot, when the slot resolves into the
    /// name list (1-based).
    pub fn current_filter(&self) -> Option<&str> {
        let slot = self.filter_slot?;
        if slot >= 1 && slot <= self.filter_names.len() {
            Some(self.filter_names[slot - 1].as_str())
        } else {
            None
        }
    }
}

/// Explicit registry of the upstream (device, property) pairs one camera
/// listens to. Hosts consult it when routing published updates; nothing is
/// wired through global state.
#[derive(Debug, Default)]
pub struct SnoopSubscriptions {
    entries: HashSet<(String, String)>,
}

impl SnoopSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, device: &str, property: &str) {
        self.entries
            .insert((device.to_string(), property.to_string()));
    }

    pub fn unsubscribe(&mut self, device: &str, property: &str) {
        self.entries
            .remove(&(device.to_string(), property.to_string()));
    }

    pub fn matches(&self, device: &str, property: &str) -> bool {
        self.entries
            .contains(&(device.to_string(), property.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
