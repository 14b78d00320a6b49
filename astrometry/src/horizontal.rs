//! Horizontal coordinates and airmass.

use crate::time::gmst_degrees;

/// Atmospheric scale factor used by the airmass model (atmosphere height
/// over observer height, the conventional 750).
pub const AIRMASS_SCALE_HEIGHT: f64 = 750.0;

/// Altitude above the horizon, in degrees, of an equatorial position seen
/// from a site at the given Julian date. Longitude is east-positive.
pub fn altitude_deg(ra_hours: f64, dec_deg: f64, lat_deg: f64, lon_deg: f64, jd: f64) -> f64 {
    let lst_deg = gmst_degrees(jd) + lon_deg;
    let hour_angle = (lst_deg - ra_hours * 15.0).to_radians();
    let lat = lat_deg.to_radians();
    let dec = dec_deg.to_radians();
    let sin_alt = dec.sin() * lat.sin() + dec.cos() * lat.cos() * hour_angle.cos();
    sin_alt.clamp(-1.0, 1.0).asin().to_degrees()
}

/// Airmass along the line of sight at the given altitude, spherical-shell
/// atmosphere model. Exactly 1 at the zenith, growing toward the horizon,
/// finite (and still defined) below it.
pub fn airmass(altitude_deg: f64) -> f64 {
    let s = AIRMASS_SCALE_HEIGHT;
    let a = s * altitude_deg.to_radians().sin();
    (a * a + 2.0 * s + 1.0).sqrt() - a
}
