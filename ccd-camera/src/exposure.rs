//! Exposure sequencing support: device limits, dynamic polling and the
//! pointing snapshot taken at exposure start.

use chrono::{DateTime, Utc};

use astrometry::{airmass, altitude_deg, julian_date, precess_to_j2000};

use crate::context::ObservationContext;

/// Exposure duration range the device advertises, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct ExposureLimits {
    pub min: f64,
    pub max: f64,
}

impl ExposureLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, duration: f64) -> bool {
        duration >= self.min && duration <= self.max
    }
}

impl Default for ExposureLimits {
    fn default() -> Self {
        Self::new(0.001, 3600.0)
    }
}

/// Host polling cadence, shortened while a short exposure runs so
/// completion is noticed promptly.
#[derive(Debug, Clone, Copy)]
pub struct PollingControl {
    default_ms: u64,
    current_ms: u64,
}

impl PollingControl {
    pub fn new(period_ms: u64) -> Self {
        Self {
            default_ms: period_ms,
            current_ms: period_ms,
        }
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    /// For exposures shorter than the current period, polls at 95% of the
    /// exposure duration.
    pub fn shorten_for(&mut self, duration_s: f64) {
        if duration_s * 1000.0 < self.current_ms as f64 {
            self.current_ms = (duration_s * 950.0) as u64;
        }
    }

    pub fn restore(&mut self) {
        self.current_ms = self.default_ms;
    }
}

impl Default for PollingControl {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Where the telescope pointed when the exposure started, fixed to J2000.
/// Captured once per exposure so a slew during integration cannot skew the
/// header.
#[derive(Debug, Clone, Copy)]
pub struct PointingSnapshot {
    pub j2000_ra_hours: f64,
    pub j2000_dec_deg: f64,
    /// `NaN` when the site is unknown.
    pub airmass: f64,
}

/// Takes the pointing snapshot for an exposure starting at `at`. Returns
/// `None` when the mount never reported coordinates.
pub fn capture_pointing(ctx: &ObservationContext, at: DateTime<Utc>) -> Option<PointingSnapshot> {
    if !ctx.ra_hours.is_finite() || !ctx.dec_deg.is_finite() {
        return None;
    }
    let jd = julian_date(at);
    let j2000 = precess_to_j2000(ctx.ra_hours, ctx.dec_deg, jd);
    let airmass = if ctx.latitude.is_finite() && ctx.longitude.is_finite() {
        airmass(altitude_deg(
            ctx.ra_hours,
            ctx.dec_deg,
            ctx.latitude,
            ctx.longitude,
            jd,
        ))
    } else {
        f64::NAN
    };
    Some(PointingSnapshot {
        j2000_ra_hours: j2000.ra_hours,
        j2000_dec_deg: j2000.dec_deg,
        airmass,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SnoopEvent;

    #[test]
    fn limits_are_inclusive() {
        let limits = ExposureLimits::new(0.01, 10.0);
        assert!(limits.contains(0.01));
        assert!(limits.contains(10.0));
        assert!(!limits.contains(0.005));
        assert!(!limits.contains(10.5));
    }

    #[test]
    fn polling_shortens_only_for_short_exposures() {
        let mut polling = PollingControl::new(1000);
        polling.shorten_for(5.0);
        assert_eq!(polling.current_ms(), 1000);

        polling.shorten_for(0.5);
        assert_eq!(polling.current_ms(), 475);

        polling.restore();
        assert_eq!(polling.current_ms(), 1000);
    }

    #[test]
    fn pointing_needs_mount_coordinates() {
        let ctx = ObservationContext::new();
        assert!(capture_pointing(&ctx, Utc::now()).is_none());
    }

    #[test]
    fn pointing_without_site_has_nan_airmass() {
        let mut ctx = ObservationContext::new();
        ctx.ingest(SnoopEvent::Equatorial {
            ra_hours: 10.5,
            dec_deg: 20.0,
        });
        let p = capture_pointing(&ctx, Utc::now()).unwrap();
        assert!(p.airmass.is_nan());
        // Precession moves the coordinates, but not far.
        assert!((p.j2000_ra_hours - 10.5).abs() < 0.1);
        assert!((p.j2000_dec_deg - 20.0).abs() < 0.5);
    }

    #[test]
    fn pointing_with_site_computes_airmass_of_at_least_one() {
        let mut ctx = ObservationContext::new();
        ctx.ingest(SnoopEvent::Equatorial {
            ra_hours: 10.5,
            dec_deg: 20.0,
        });
        ctx.ingest(SnoopEvent::GeographicCoord {
            latitude: 34.0,
            longitude: 242.0,
        });
        let p = capture_pointing(&ctx, Utc::now()).unwrap();
        assert!(p.airmass.is_finite());
        assert!(p.airmass >= 1.0);
    }
}
