use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::gps::GpsPoint;

/// What a discovered file is, judged from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    /// JPEG with EXIF
    Image,
    /// HEIC/HEIF, converted to JPEG on the way
    ConvertibleImage,
    Video,
    /// iOS `.aae` edit instructions
    Sidecar,
    Other,
}

const SIDECAR_EXTENSIONS: &[&str] = &["aae"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
const CONVERTIBLE_EXTENSIONS: &[&str] = &["heic", "heif"];
const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];

/// Lowercased extension without the dot, or "" if there is none.
pub fn lower_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

impl MediaKind {
    pub fn classify(path: &Path) -> Self {
        let ext = lower_extension(path);
        let ext = ext.as_str();
        if SIDECAR_EXTENSIONS.contains(&ext) {
            return MediaKind::Sidecar;
        }
        if IMAGE_EXTENSIONS.contains(&ext) {
            return MediaKind::Image;
        }
        if CONVERTIBLE_EXTENSIONS.contains(&ext) {
            return MediaKind::ConvertibleImage;
        }
        if VIDEO_EXTENSIONS.contains(&ext) {
            return MediaKind::Video;
        }
        // m4v, 3gp and friends
        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::VIDEO => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }

    pub fn has_metadata(self) -> bool {
        matches!(
            self,
            MediaKind::Image | MediaKind::ConvertibleImage | MediaKind::Video
        )
    }
}

/// How a naive capture time should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Zone {
    Local,
    Utc,
}

impl Zone {
    /// Suffix used in target names.
    pub fn label(self) -> &'static str {
        match self {
            Zone::Local => "LOCAL",
            Zone::Utc => "UTC",
        }
    }
}

/// Where a capture time came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DateSource {
    Exif,
    Container,
    Filename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureTime {
    pub when: NaiveDateTime,
    pub zone: Zone,
    pub source: DateSource,
}

impl CaptureTime {
    pub fn new(when: NaiveDateTime, zone: Zone, source: DateSource) -> Self {
        Self { when, zone, source }
    }

    /// Resolve to an absolute instant. Local times that fall into a DST gap
    /// have no instant; ambiguous ones take the earlier reading.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self.zone {
            Zone::Utc => Some(self.when.and_utc()),
            Zone::Local => Local
                .from_local_datetime(&self.when)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// `YYYY-MM-DD`, used as the target folder.
    pub fn day(&self) -> String {
        self.when.format("%Y-%m-%d").to_string()
    }

    /// `YYYY-MM-DD_HH-MM-SS_<ZONE>`, used as the target stem.
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.day(),
            self.when.format("%H-%M-%S"),
            self.zone.label()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Media {
    /// Where the file was found
    pub path: PathBuf,
    pub kind: MediaKind,
    pub capture: Option<CaptureTime>,
    pub gps: Option<GpsPoint>,
    /// Computed destination (None until planned, or when skipped)
    pub target: Option<PathBuf>,
}

impl Media {
    pub fn new(path: PathBuf) -> Self {
        let kind = MediaKind::classify(&path);
        Self {
            path,
            kind,
            capture: None,
            gps: None,
            target: None,
        }
    }

    /// Extension the file should carry once normalized.
    pub fn target_extension(&self, keep_heic: bool) -> String {
        let ext = lower_extension(&self.path);
        match (self.kind, ext.as_str()) {
            (MediaKind::Image, "jpeg") => "jpg".to_string(),
            (MediaKind::ConvertibleImage, _) if !keep_heic => "jpg".to_string(),
            _ => ext,
        }
    }
}
