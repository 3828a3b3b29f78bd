//! Utility functions for the sensortag-bridge crate.

/// Render a temperature with exactly one decimal digit.
///
/// This is the transport form of every forwarded value. Ties round away
/// from zero, and small negative values keep their sign (`-0.0`).
///
/// # Example
///
/// ```
/// use sensortag_bridge::format_tenths;
///
/// assert_eq!(format_tenths(36.27), "36.3");
/// assert_eq!(format_tenths(36.25), "36.3");
/// assert_eq!(format_tenths(25.0), "25.0");
/// ```
#[inline]
pub fn format_tenths(celsius: f64) -> String {
    format!("{:.1}", round_to_tenth(celsius))
}

/// Round a temperature to one decimal place, ties away from zero.
#[inline]
pub fn round_to_tenth(celsius: f64) -> f64 {
    (celsius * 10.0).round() / 10.0
}
