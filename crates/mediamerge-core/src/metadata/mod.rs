pub mod exif;
pub mod video;

use tracing::debug;

use crate::date;
use crate::error::{SkipError, SkipResult};
use crate::media::{Media, MediaKind};

use self::video::Prober;

/// Fill in `capture` and `gps` for one media file. Embedded metadata that
/// can't be read is not fatal as long as the filename carries a date.
pub fn extract(media: &mut Media, prober: &Prober, allow_guess: bool) -> SkipResult<()> {
    let embedded = match media.kind {
        MediaKind::Image | MediaKind::ConvertibleImage => {
            self::exif::read_exif(&media.path).map(|info| (info.capture, info.gps))
        }
        MediaKind::Video => prober.probe(&media.path).map(|info| (info.capture, info.gps)),
        MediaKind::Sidecar | MediaKind::Other => return Ok(()),
    };

    let (embedded_capture, gps, embedded_err) = match embedded {
        Ok((capture, gps)) => (capture, gps, None),
        Err(e) => {
            debug!(path = %media.path.display(), "No embedded metadata: {e}");
            (None, None, Some(e))
        }
    };

    let filename = media.path.to_string_lossy();
    match date::reconcile(embedded_capture, &filename, allow_guess) {
        Some(capture) => {
            media.capture = Some(capture);
            media.gps = gps;
            Ok(())
        }
        None => Err(embedded_err.unwrap_or(SkipError::NoCaptureTime)),
    }
}
