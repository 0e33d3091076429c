use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::gps::GpsPoint;

/// Render points as a GPX 1.0 track, oldest first.
pub fn render_gpx(points: &[GpsPoint]) -> String {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.time);

    let mut buf = String::new();
    buf.push_str(concat!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
        "<gpx version=\"1.0\" creator=\"mediamerge\"\n",
        "  xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n",
        "  xmlns=\"http://www.topografix.com/GPX/1/0\"\n",
        "  xsi:schemaLocation=\"http://www.topografix.com/GPX/1/0 http://www.topografix.com/GPX/1/0/gpx.xsd\">\n",
        "<trk>\n",
        "<number>1</number>\n",
        "<trkseg>\n",
    ));
    for p in &sorted {
        let _ = writeln!(buf, "<trkpt lat=\"{:.6}\" lon=\"{:.6}\">", p.latitude, p.longitude);
        if let Some(ele) = p.altitude {
            let _ = writeln!(buf, "  <ele>{ele}</ele>");
        }
        let _ = writeln!(buf, "  <time>{}</time>", p.time.format("%Y-%m-%dT%H:%M:%SZ"));
        buf.push_str("</trkpt>\n");
    }
    buf.push_str("</trkseg>\n</trk>\n</gpx>\n");
    buf
}

/// Write the trace unless there is nothing to write or the file already
/// holds exactly this content. Returns whether the file was (or, in dry-run,
/// would be) written.
pub fn write_gpx(points: &[GpsPoint], path: &Path, dry_run: bool) -> anyhow::Result<bool> {
    if points.is_empty() {
        debug!("No geotagged media, skipping GPX trace");
        return Ok(false);
    }
    let content = render_gpx(points);
    if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        debug!(path = %path.display(), "GPX trace unchanged");
        return Ok(false);
    }
    if dry_run {
        info!(path = %path.display(), points = points.len(), "[dry-run] would write GPX trace");
        return Ok(true);
    }
    info!(path = %path.display(), points = points.len(), "Writing GPX trace");
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(true)
}
