use chrono::{DateTime, Utc};
use serde::Serialize;

/// One geotagged position, ready for the GPX trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsPoint {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres, negative below sea level
    pub altitude: Option<f64>,
}

/// Degrees/minutes/seconds to signed decimal degrees.
pub fn dms_to_degrees(dms: [f64; 3], negative: bool) -> f64 {
    let degrees = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    if negative {
        -degrees
    } else {
        degrees
    }
}

/// Finite and within ±90 / ±180.
pub fn valid_position(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Parse an ISO 6709 location string as written in QuickTime/MP4 metadata,
/// e.g. `+35.6895+139.6917+040.000/`. Returns (lat, lon, altitude).
pub fn parse_iso6709(s: &str) -> Option<(f64, f64, Option<f64>)> {
    let s = s.trim();
    let s = s.split('/').next()?;
    // Drop an optional CRS suffix like "CRSWGS_84"
    let s = match s.find("CRS") {
        Some(pos) => &s[..pos],
        None => s,
    };

    let mut numbers = Vec::with_capacity(3);
    let mut start = None;
    for (i, c) in s.char_indices() {
        if c == '+' || c == '-' {
            if let Some(st) = start {
                numbers.push(s[st..i].parse::<f64>().ok()?);
            }
            start = Some(i);
        } else if !(c.is_ascii_digit() || c == '.') {
            return None;
        }
    }
    if let Some(st) = start {
        numbers.push(s[st..].parse::<f64>().ok()?);
    }

    if numbers.len() < 2 || numbers.len() > 3 {
        return None;
    }
    let (lat, lon) = (numbers[0], numbers[1]);
    if !valid_position(lat, lon) {
        return None;
    }
    Some((lat, lon, numbers.get(2).copied().filter(|a| a.is_finite())))
}
