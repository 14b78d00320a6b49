//! Precession of equatorial coordinates between the mean equinox of date
//! and J2000, IAU 1976 angles.

/// Mean equatorial coordinates at some equinox.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equatorial {
    pub ra_hours: f64,
    pub dec_deg: f64,
}

/// IAU 1976 precession angles (zeta, z, theta) in radians for precessing
/// from J2000 to the given Julian date.
fn precession_angles(jd: f64) -> (f64, f64, f64) {
    let t = (jd - 2451545.0) / 36525.0;
    let arcsec = |v: f64| (v / 3600.0).to_radians();
    let zeta = arcsec(2306.2181 * t + 0.30188 * t * t + 0.017998 * t * t * t);
    let z = arcsec(2306.2181 * t + 1.09468 * t * t + 0.018203 * t * t * t);
    let theta = arcsec(2004.3109 * t - 0.42665 * t * t - 0.041833 * t * t * t);
    (zeta, z, theta)
}

fn normalize_hours(ra_rad: f64) -> f64 {
    ra_rad.rem_euclid(std::f64::consts::TAU).to_degrees() / 15.0
}

/// Precesses mean coordinates of date back to the J2000 equinox.
pub fn precess_to_j2000(ra_hours: f64, dec_deg: f64, jd: f64) -> Equatorial {
    let (zeta, z, theta) = precession_angles(jd);
    let ra = (ra_hours * 15.0).to_radians();
    let dec = dec_deg.to_radians();

    let a = dec.cos() * (ra - z).sin();
    let b = theta.cos() * dec.cos() * (ra - z).cos() + theta.sin() * dec.sin();
    let c = -theta.sin() * dec.cos() * (ra - z).cos() + theta.cos() * dec.sin();

    Equatorial {
        ra_hours: normalize_hours(a.atan2(b) - zeta),
        dec_deg: c.asin().to_degrees(),
    }
}

/// Precesses J2000 coordinates forward to the mean equinox of the given
/// Julian date.
pub fn precess_from_j2000(ra_hours: f64, dec_deg: f64, jd: f64) -> Equatorial {
    let (zeta, z, theta) = precession_angles(jd);
    let ra = (ra_hours * 15.0).to_radians();
    let dec = dec_deg.to_radians();

    let a = dec.cos() * (ra + zeta).sin();
    let b = theta.cos() * dec.cos() * (ra + zeta).cos() - theta.sin() * dec.sin();
    let c = theta.sin() * dec.cos() * (ra + zeta).cos() + theta.cos() * dec.sin();

    Equatorial {
        ra_hours: normalize_hours(a.atan2(b) + z),
        dec_deg: c.asin().to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // JD of 2026-01-01 00:00 UTC, a quarter century past J2000.
    const JD_2026: f64 = 2461041.5;

    #[test]
    fn round_trip_is_identity() {
        let back = precess_to_j2000(10.5, 20.0, JD_2026);
        let forward = precess_from_j2000(back.ra_hours, back.dec_deg, JD_2026);
        assert_relative_eq!(forward.ra_hours, 10.5, epsilon = 1e-9);
        assert_relative_eq!(forward.dec_deg, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn no_precession_at_epoch() {
        let same = precess_to_j2000(10.5, 20.0, 2451545.0);
        assert_relative_eq!(same.ra_hours, 10.5, epsilon = 1e-12);
        assert_relative_eq!(same.dec_deg, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn quarter_century_moves_ra_by_about_a_minute() {
        // General precession in RA is roughly 3.07 s/yr near the equator,
        // about 80 s of RA over 26 years.
        let back = precess_to_j2000(10.5, 20.0, JD_2026);
        let shift_seconds = (10.5 - back.ra_hours) * 3600.0;
        assert!(shift_seconds > 40.0 && shift_seconds < 140.0, "{shift_seconds}");
    }

    #[test]
    fn declination_shift_is_small() {
        let back = precess_to_j2000(10.5, 20.0, JD_2026);
        assert!((back.dec_deg - 20.0).abs() < 0.3);
    }
}
