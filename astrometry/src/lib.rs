//! Pointing math used when stamping camera frames: Julian dates, sidereal
//! time, precession to J2000, horizontal coordinates and airmass.
//!
//! Angles are degrees unless a name says otherwise; right ascension is in
//! hours throughout because that is how mounts report it.

pub mod horizontal;
pub mod precess;
pub mod time;

pub use horizontal::{airmass, altitude_deg, AIRMASS_SCALE_HEIGHT};
pub use precess::{precess_from_j2000, precess_to_j2000, Equatorial};
pub use time::{gmst_degrees, julian_date};

/// Formats an angle-like value as `"HH MM SS.ss"` (or `"DD MM SS.ss"`),
/// space-separated with centisecond resolution.
pub fn to_sexagesimal(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    // Work in centiseconds so carries out of the seconds field are exact.
    let total = (value.abs() * 360000.0).round() as u64;
    let whole = total / 360000;
    let minutes = (total / 6000) % 60;
    let centis = total % 6000;
    format!(
        "{sign}{whole:2} {minutes:02} {:02}.{:02}",
        centis / 100,
        centis % 100
    )
}
