pub mod guess;

use crate::media::{CaptureTime, DateSource, Zone};

/// Pick a capture time using all sources in priority order.
pub fn reconcile(
    embedded: Option<CaptureTime>,
    filename: &str,
    allow_guess: bool,
) -> Option<CaptureTime> {
    // 1. Embedded metadata: EXIF for images, container header for videos
    if let Some(capture) = embedded {
        return Some(capture);
    }

    // 2. Filename guess, read as local wall-clock time
    if allow_guess {
        if let Some(when) = guess::guess_date_from_filename(filename) {
            return Some(CaptureTime::new(when, Zone::Local, DateSource::Filename));
        }
    }

    None
}
