//! Time scales: Julian date and Greenwich mean sidereal time.

use chrono::{DateTime, Utc};

/// Julian date of a UTC instant.
pub fn julian_date(t: DateTime<Utc>) -> f64 {
    let unix = t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9;
    unix / 86400.0 + 2440587.5
}

/// Greenwich mean sidereal time in degrees, IAU 1982 expression,
/// normalized to [0, 360).
pub fn gmst_degrees(jd: f64) -> f64 {
    let d = jd - 2451545.0;
    let t = d / 36525.0;
    let gmst = 280.46061837 + 360.98564736629 * d + 0.000387933 * t * t
        - t * t * t / 38710000.0;
    gmst.rem_euclid(360.0)
}
