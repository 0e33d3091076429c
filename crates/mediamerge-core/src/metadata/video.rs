use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{SkipError, SkipResult};
use crate::gps::{parse_iso6709, GpsPoint};
use crate::media::{CaptureTime, DateSource, Zone};

/// Seconds between 1904-01-01 (QuickTime epoch) and 1970-01-01.
const QUICKTIME_EPOCH_OFFSET: i64 = 2_082_844_800;

const LOCATION_TAGS: &[&str] = &[
    "com.apple.quicktime.location.ISO6709",
    "location",
    "location-eng",
];

#[derive(Debug, Clone, Default)]
pub struct VideoInfo {
    pub capture: Option<CaptureTime>,
    pub gps: Option<GpsPoint>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Runs ffprobe, falling back to reading the `mvhd` box when the binary
/// isn't installed. Shared across extraction threads.
pub struct Prober {
    program: String,
    missing: AtomicBool,
}

impl Prober {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            missing: AtomicBool::new(false),
        }
    }

    pub fn probe(&self, path: &Path) -> SkipResult<VideoInfo> {
        if !self.missing.load(Ordering::Relaxed) {
            match self.run_ffprobe(path) {
                Ok(json) => match parse_probe_json(&json) {
                    Ok(info) if info.capture.is_some() => return Ok(info),
                    Ok(_) => debug!(path = %path.display(), "ffprobe found no creation time"),
                    Err(e) => debug!(path = %path.display(), "ffprobe output unusable: {e}"),
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !self.missing.swap(true, Ordering::Relaxed) {
                        warn!(program = %self.program, "ffprobe not found, reading container headers directly");
                    }
                }
                Err(e) => debug!(path = %path.display(), "ffprobe failed: {e}"),
            }
        }

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let when = read_mvhd_creation(&mut reader)?
            .ok_or_else(|| SkipError::Probe(format!("{} has no creation time", path.display())))?;
        Ok(VideoInfo {
            capture: Some(CaptureTime::new(when, Zone::Utc, DateSource::Container)),
            gps: None,
        })
    }

    fn run_ffprobe(&self, path: &Path) -> io::Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!("exited with {}", output.status)));
        }
        Ok(output.stdout)
    }
}

/// Interpret `ffprobe -print_format json -show_format` output.
pub fn parse_probe_json(json: &[u8]) -> SkipResult<VideoInfo> {
    let probe: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| SkipError::Probe(e.to_string()))?;
    let tags = &probe.format.tags;

    // MOV/MP4: creation_time = '2024-05-12T05:38:26.000000Z'
    // MOV: com.apple.quicktime.creationdate = '2024-05-12T14:38:26+0900'
    let when = tags
        .get("creation_time")
        .and_then(|s| parse_container_time(s))
        .or_else(|| {
            tags.get("com.apple.quicktime.creationdate")
                .and_then(|s| parse_container_time(s))
        });
    let capture = when.map(|w| CaptureTime::new(w, Zone::Utc, DateSource::Container));

    let gps = capture.as_ref().and_then(|c| {
        let (latitude, longitude, altitude) = LOCATION_TAGS
            .iter()
            .find_map(|t| tags.get(*t).and_then(|s| parse_iso6709(s)))?;
        Some(GpsPoint {
            time: c.when.and_utc(),
            latitude,
            longitude,
            altitude,
        })
    });

    Ok(VideoInfo { capture, gps })
}

/// Container timestamps, normalized to naive UTC.
fn parse_container_time(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
}

/// Walk top-level boxes to `moov/mvhd` and return its creation time.
/// Zero means "not set" and yields None.
pub fn read_mvhd_creation<R: Read + Seek>(reader: &mut R) -> SkipResult<Option<NaiveDateTime>> {
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let Some(moov_end) = find_box(reader, *b"moov", end)? else {
        return Ok(None);
    };
    if find_box(reader, *b"mvhd", moov_end)?.is_none() {
        return Ok(None);
    }

    let mut version = [0u8; 4];
    reader.read_exact(&mut version)?;
    let seconds = if version[0] == 1 {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        u64::from_be_bytes(buf)
    } else {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        u32::from_be_bytes(buf) as u64
    };
    if seconds == 0 {
        return Ok(None);
    }

    let unix = i64::try_from(seconds)
        .map_err(|_| SkipError::Probe("mvhd creation time out of range".to_string()))?
        - QUICKTIME_EPOCH_OFFSET;
    Ok(DateTime::from_timestamp(unix, 0).map(|dt| dt.naive_utc()))
}

/// Scan sibling boxes from the current position up to `limit`. On a match
/// the reader is left at the box payload and the payload end is returned.
fn find_box<R: Read + Seek>(reader: &mut R, wanted: [u8; 4], limit: u64) -> io::Result<Option<u64>> {
    loop {
        let start = reader.stream_position()?;
        if start + 8 > limit {
            return Ok(None);
        }
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let kind = [header[4], header[5], header[6], header[7]];
        let mut size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let mut header_len = 8;
        if size == 1 {
            let mut large = [0u8; 8];
            reader.read_exact(&mut large)?;
            size = u64::from_be_bytes(large);
            header_len = 16;
        } else if size == 0 {
            size = limit - start;
        }
        if size < header_len {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated box"));
        }
        let box_end = match start.checked_add(size) {
            Some(end) if end > start && end <= limit => end,
            _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "box overruns its parent")),
        };
        if kind == wanted {
            return Ok(Some(box_end));
        }
        reader.seek(SeekFrom::Start(box_end))?;
    }
}
