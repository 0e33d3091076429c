pub mod apply;
pub mod cancel;
pub mod convert;
pub mod date;
pub mod error;
pub mod gps;
pub mod gpx;
pub mod media;
pub mod metadata;
pub mod plan;
pub mod scan;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::apply::{Action, Applier};
use crate::convert::Converter;
use crate::error::{SkipError, SkipResult};
use crate::gps::GpsPoint;
use crate::media::{Media, MediaKind};
use crate::metadata::video::Prober;
use crate::plan::{Placement, Planner};

pub use cancel::CancellationToken;

/// Default GPX trace file name, placed in the output directory.
pub const TRACE_GPX: &str = "trace.gpx";

fn default_output() -> PathBuf {
    PathBuf::from(".")
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_magick() -> String {
    "magick".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Files and folders to walk
    pub sources: Vec<PathBuf>,
    /// Root under which `YYYY-MM-DD/` folders are created
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub dry_run: bool,
    /// Where to write the GPX trace, if at all
    #[serde(default)]
    pub gpx: Option<PathBuf>,
    #[serde(default)]
    pub no_guess: bool,
    #[serde(default)]
    pub keep_sidecars: bool,
    #[serde(default)]
    pub keep_heic: bool,
    /// Metadata extraction threads (None = rayon default)
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_magick")]
    pub magick: String,
}

impl MergeOptions {
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self {
            sources,
            output: default_output(),
            dry_run: false,
            gpx: None,
            no_guess: false,
            keep_sidecars: false,
            keep_heic: false,
            jobs: None,
            ffprobe: default_ffprobe(),
            magick: default_magick(),
        }
    }

    /// `<output>/trace.gpx`
    pub fn default_trace_path(&self) -> PathBuf {
        self.output.join(TRACE_GPX)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeResult {
    pub files_scanned: u64,
    pub renamed: u64,
    pub converted: u64,
    pub sidecars_deleted: u64,
    pub retimed: u64,
    /// Already normalized, nothing to do
    pub unchanged: u64,
    pub duplicates: u64,
    pub skipped: u64,
    /// Not media, left alone
    pub ignored: u64,
    pub gps_points: u64,
    pub trace_written: Option<PathBuf>,
    /// Stopped early on request; counters cover the files handled so far
    pub cancelled: bool,
    /// Actions performed (or, in dry-run, planned), in order
    pub actions: Vec<Action>,
    pub warnings: Vec<String>,
}

impl MergeResult {
    /// Number of filesystem mutations this run made (or would make).
    pub fn changes(&self) -> u64 {
        self.actions.len() as u64 + u64::from(self.trace_written.is_some())
    }
}

/// Control options for process execution.
#[derive(Debug, Clone, Default)]
pub struct MergeControl {
    pub cancel_token: Option<CancellationToken>,
}

impl MergeControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create MergeControl with a cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter. Within a stage it emits at most every 200ms;
/// the first report of a new stage and the last one of each stage always go out.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<(String, Instant)>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new((String::new(), Instant::now())),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            let same_stage = last.0 == stage;
            if same_stage && !is_done && last.1.elapsed().as_millis() < 200 {
                return;
            }
            if !same_stage {
                last.0 = stage.to_string();
            }
            last.1 = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Run the full pipeline with progress reporting.
pub fn process(options: &MergeOptions, progress_callback: &ProgressCallback) -> anyhow::Result<MergeResult> {
    process_with_control(options, &MergeControl::default(), progress_callback)
}

/// Run the full pipeline with progress reporting and cancellation.
pub fn process_with_control(
    options: &MergeOptions,
    control: &MergeControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<MergeResult> {
    let tp = ThrottledProgress::new(progress_callback);
    let started = Instant::now();
    debug!(?options, "Starting");
    if control.is_cancelled() {
        info!("Cancelled before start");
        return Ok(MergeResult {
            cancelled: true,
            ..Default::default()
        });
    }

    if options.sources.iter().all(|s| !s.exists()) {
        anyhow::bail!("none of the given sources exist");
    }

    // Stage 1: collect everything before touching anything
    let files = scan::collect_sources(&options.sources, &tp);
    let mut media: Vec<Media> = files.into_iter().map(Media::new).collect();
    let mut result = MergeResult {
        files_scanned: media.len() as u64,
        ..Default::default()
    };
    if media.is_empty() {
        info!("No files found. Nothing to do.");
        return Ok(result);
    }

    // Stage 2: read metadata, in parallel since it is read-only
    let errors = extract_all(&mut media, options, control, &tp)?;

    // Stage 3: plan and apply sequentially, in discovery order
    let mut planner = Planner::new(&options.output, options.keep_heic);
    let mut applier = Applier::new(options.dry_run, Converter::new(options.magick.clone()));
    let mut points: Vec<GpsPoint> = Vec::new();
    let total = media.len() as u64;

    for (i, (m, extract_err)) in media.iter_mut().zip(errors).enumerate() {
        if control.is_cancelled() {
            warn!(done = i, remaining = total - i as u64, "Cancelled, leaving the remaining files alone");
            result.cancelled = true;
            break;
        }
        tp.report("apply", i as u64, total, "Normalizing files");

        let outcome = match extract_err {
            Some(e) => Err(e),
            None => normalize(m, options, &mut planner, &mut applier, &mut result),
        };
        match outcome {
            Ok(()) => {
                if let (Some(gps), Some(_)) = (m.gps, &m.target) {
                    points.push(gps);
                }
            }
            Err(e) => record_skip(&mut result, &m.path, e),
        }
    }

    if !result.cancelled {
        tp.report("apply", total, total, "Files normalized");
    }

    // Stage 4: GPX trace, covering whatever was placed before a cancel
    result.gps_points = points.len() as u64;
    if let Some(path) = &options.gpx {
        if gpx::write_gpx(&points, path, options.dry_run)? {
            result.trace_written = Some(path.clone());
        }
    }

    info!(
        elapsed = %format!("{:.2}s", started.elapsed().as_secs_f64()),
        changes = result.changes(),
        cancelled = result.cancelled,
        "Processing completed"
    );
    Ok(result)
}

fn extract_all(
    media: &mut [Media],
    options: &MergeOptions,
    control: &MergeControl,
    tp: &ThrottledProgress,
) -> anyhow::Result<Vec<Option<SkipError>>> {
    let prober = Prober::new(options.ffprobe.clone());
    let allow_guess = !options.no_guess;
    let total = media.iter().filter(|m| m.kind.has_metadata()).count() as u64;
    let counter = AtomicU64::new(0);

    let run = |media: &mut [Media]| -> Vec<Option<SkipError>> {
        media
            .par_iter_mut()
            .map(|m| {
                // Cancelled files are never applied, so their metadata is moot
                if !m.kind.has_metadata() || control.is_cancelled() {
                    return None;
                }
                let err = metadata::extract(m, &prober, allow_guess).err();
                let current = counter.fetch_add(1, Ordering::Relaxed);
                tp.report("extract", current, total, "Reading metadata");
                err
            })
            .collect()
    };

    let errors = match options.jobs {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()?
            .install(|| run(media)),
        None => run(media),
    };
    tp.report("extract", total, total, "Metadata read");
    Ok(errors)
}

/// Delete, convert, rename and retime one file as its kind requires.
fn normalize(
    m: &mut Media,
    options: &MergeOptions,
    planner: &mut Planner,
    applier: &mut Applier,
    result: &mut MergeResult,
) -> SkipResult<()> {
    match m.kind {
        MediaKind::Other => {
            debug!(path = %m.path.display(), "Not a media file, leaving alone");
            result.ignored += 1;
            return Ok(());
        }
        MediaKind::Sidecar if options.keep_sidecars => {
            result.ignored += 1;
            return Ok(());
        }
        MediaKind::Sidecar => {
            let action = Action::DeleteSidecar { path: m.path.clone() };
            applier.apply(&action)?;
            result.sidecars_deleted += 1;
            result.actions.push(action);
            return Ok(());
        }
        MediaKind::Image | MediaKind::ConvertibleImage | MediaKind::Video => {}
    }

    let capture = m.capture.ok_or(SkipError::NoCaptureTime)?;
    // Renames keep mtime, so the source's current value is what the target will have
    let current_mtime = apply::modified_unix(&m.path);

    let (final_path, fresh_file) = match planner.place(m)? {
        Placement::Duplicate(existing) => return Err(SkipError::Duplicate(existing)),
        Placement::InPlace => (m.path.clone(), false),
        Placement::Move(to) => {
            let convert = m.kind == MediaKind::ConvertibleImage && !options.keep_heic;
            let action = if convert {
                Action::Convert { from: m.path.clone(), to: to.clone() }
            } else {
                Action::Rename { from: m.path.clone(), to: to.clone() }
            };
            applier.apply(&action)?;
            if convert {
                result.converted += 1;
            } else {
                result.renamed += 1;
            }
            result.actions.push(action);
            (to, convert)
        }
    };
    let moved = final_path != m.path;
    m.target = Some(final_path.clone());

    let mut retimed = false;
    match capture.to_utc() {
        Some(time) if fresh_file || current_mtime != Some(time.timestamp()) => {
            let action = Action::SetModified { path: final_path, time };
            applier.apply(&action)?;
            result.retimed += 1;
            result.actions.push(action);
            retimed = true;
        }
        Some(_) => {}
        None => warn!(path = %m.path.display(), "Capture time does not exist in the local time zone, keeping mtime"),
    }

    if !moved && !retimed {
        result.unchanged += 1;
    }
    Ok(())
}

fn record_skip(result: &mut MergeResult, path: &Path, err: SkipError) {
    match &err {
        SkipError::Duplicate(_) => {
            warn!(path = %path.display(), "Skipping duplicate: {err}");
            result.duplicates += 1;
        }
        _ => {
            warn!(path = %path.display(), "Skipping file: {err}");
            result.skipped += 1;
        }
    }
    result.warnings.push(format!("{}: {err}", path.display()));
}
