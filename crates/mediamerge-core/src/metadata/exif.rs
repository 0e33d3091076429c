use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use tracing::{debug, warn};

use crate::error::{SkipError, SkipResult};
use crate::gps::{dms_to_degrees, valid_position, GpsPoint};
use crate::media::{CaptureTime, DateSource, Zone};

/// What an image's EXIF block has to say.
#[derive(Debug, Clone, Default)]
pub struct ExifInfo {
    pub capture: Option<CaptureTime>,
    pub gps: Option<GpsPoint>,
}

/// Read EXIF from any container kamadak-exif understands (JPEG, HEIF, TIFF, PNG, WebP).
pub fn read_exif(path: &Path) -> SkipResult<ExifInfo> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader)?;
    if let Some(version) = exif.get_field(Tag::ExifVersion, In::PRIMARY) {
        debug!(path = %path.display(), version = %version.display_value(), "EXIF version");
    }
    let info = exif_info(&exif);
    if info.gps.is_none() {
        if exif.get_field(Tag::GPSLatitude, In::PRIMARY).is_none() {
            debug!(path = %path.display(), "No GPS coordinates");
        } else if let Err(e) = gps_from_exif(&exif, info.capture.as_ref()) {
            warn!(path = %path.display(), "Cannot use GPS coordinates: {e}");
        }
    }
    Ok(info)
}

/// Build capture time and GPS from a parsed EXIF block. A position without
/// a GPS timestamp needs the capture time for its trace time.
pub fn exif_info(exif: &Exif) -> ExifInfo {
    let capture = extract_exif_date(exif).map(|when| CaptureTime::new(when, Zone::Local, DateSource::Exif));
    let gps = gps_from_exif(exif, capture.as_ref()).ok();
    ExifInfo { capture, gps }
}

fn extract_exif_date(exif: &Exif) -> Option<NaiveDateTime> {
    let tags = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

    for tag in &tags {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            let val = field.display_value().to_string();
            if let Some(dt) = parse_exif_datetime(&val) {
                return Some(dt);
            }
        }
    }

    None
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim()
        .trim_matches('"')
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    if let Ok(d) = NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => {
            let first = parts.first()?;
            Some(String::from_utf8_lossy(first).trim().to_string())
        }
        _ => None,
    }
}

fn rationals(exif: &Exif, tag: Tag) -> Option<Vec<f64>> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(v) => Some(v.iter().map(|r| r.to_f64()).collect()),
        _ => None,
    }
}

fn coordinate(exif: &Exif, tag: Tag, ref_tag: Tag, pos: char, neg: char) -> SkipResult<f64> {
    let name = if pos == 'N' { "latitude" } else { "longitude" };
    let (Some(dms), Some(reference)) = (rationals(exif, tag), ascii(exif, ref_tag)) else {
        return Err(SkipError::Exif(format!("missing GPS {name}")));
    };
    let Ok(dms) = <[f64; 3]>::try_from(dms) else {
        return Err(SkipError::Exif(format!("invalid GPS {name}")));
    };
    match reference.chars().next() {
        Some(c) if c == pos => Ok(dms_to_degrees(dms, false)),
        Some(c) if c == neg => Ok(dms_to_degrees(dms, true)),
        _ => Err(SkipError::Exif(format!("invalid GPS {name} reference"))),
    }
}

fn altitude(exif: &Exif) -> Option<f64> {
    let value = rationals(exif, Tag::GPSAltitude)?
        .first()
        .copied()
        .filter(|v| v.is_finite())?;
    let below = exif
        .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(0);
    match below {
        0 => Some(value),
        1 => Some(-value),
        _ => None,
    }
}

/// UTC instant from GPSDateStamp + GPSTimeStamp.
fn gps_stamp(exif: &Exif) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(&ascii(exif, Tag::GPSDateStamp)?, "%Y:%m:%d").ok()?;
    let hms = rationals(exif, Tag::GPSTimeStamp)?;
    let [h, m, s] = <[f64; 3]>::try_from(hms).ok()?;
    let time = NaiveTime::from_hms_opt(h as u32, m as u32, s as u32)?;
    Some(date.and_time(time).and_utc())
}

/// Capture time resolved with OffsetTimeOriginal, e.g. "+09:00".
fn offset_capture(exif: &Exif, capture: &CaptureTime) -> Option<DateTime<Utc>> {
    let offset = ascii(exif, Tag::OffsetTimeOriginal)?;
    let probe = DateTime::parse_from_str(
        &format!("2000-01-01 00:00:00 {offset}"),
        "%Y-%m-%d %H:%M:%S %:z",
    )
    .ok()?;
    probe
        .offset()
        .from_local_datetime(&capture.when)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn gps_from_exif(exif: &Exif, capture: Option<&CaptureTime>) -> SkipResult<GpsPoint> {
    let latitude = coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'N', 'S')?;
    let longitude = coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'E', 'W')?;
    if !valid_position(latitude, longitude) {
        return Err(SkipError::Exif(format!(
            "invalid GPS position {latitude}, {longitude}"
        )));
    }
    let time = gps_stamp(exif)
        .or_else(|| capture.and_then(|c| offset_capture(exif, c)))
        .or_else(|| capture.and_then(|c| c.to_utc()))
        .ok_or_else(|| SkipError::Exif("no time for GPS position".to_string()))?;
    Ok(GpsPoint {
        time,
        latitude,
        longitude,
        altitude: altitude(exif),
    })
}
