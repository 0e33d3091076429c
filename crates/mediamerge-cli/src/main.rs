use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mediamerge_core::{CancellationToken, MergeControl, MergeOptions};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_jobs(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{s} is an invalid positive int value")),
    }
}

#[derive(Parser)]
#[command(name = "mediamerge", version, about = "Merge iOS and Android photo/video exports into consistently named, timestamped files")]
struct Cli {
    /// Files and folders to process
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Show what would be done without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Root directory for the YYYY-MM-DD folders
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Write a GPX trace of geotagged media (default: <output>/trace.gpx)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    gpx: Option<Option<PathBuf>>,

    /// Disable date guessing from filenames
    #[arg(long)]
    no_guess: bool,

    /// Keep iOS .aae edit sidecars instead of deleting them
    #[arg(long)]
    keep_sidecars: bool,

    /// Rename HEIC files instead of converting them to JPEG
    #[arg(long)]
    keep_heic: bool,

    /// Metadata extraction threads
    #[arg(short, long, value_parser = parse_jobs)]
    jobs: Option<usize>,

    /// ffprobe executable
    #[arg(long, default_value = "ffprobe")]
    ffprobe: String,

    /// ImageMagick executable
    #[arg(long, default_value = "magick")]
    magick: String,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    let t_total = std::time::Instant::now();

    let mut options = MergeOptions::new(cli.sources);
    options.output = cli.output;
    options.dry_run = cli.dry_run;
    options.no_guess = cli.no_guess;
    options.keep_sidecars = cli.keep_sidecars;
    options.keep_heic = cli.keep_heic;
    options.jobs = cli.jobs;
    options.ffprobe = cli.ffprobe;
    options.magick = cli.magick;
    options.gpx = cli.gpx.map(|p| p.unwrap_or_else(|| options.default_trace_path()));
    tracing::debug!(?options, "Parsed arguments");

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing current file...");
        handler_token.cancel();
    })?;
    let control = MergeControl::new().with_cancel_token(token);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("[{msg}] {bar:40} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress_bar = bar.clone();
    let result = mediamerge_core::process_with_control(&options, &control, &move |stage, current, total, _message| {
        progress_bar.set_length(total);
        progress_bar.set_position((current + 1).min(total));
        progress_bar.set_message(stage.to_string());
    });
    bar.finish_and_clear();
    let result = result?;

    let prefix = if options.dry_run { "[dry-run] " } else { "" };
    let status = if result.cancelled { "Cancelled." } else { "Done!" };
    eprintln!(
        "{}{} {} files: {} renamed, {} converted, {} retimed, {} sidecars deleted, {} unchanged, {} duplicates, {} skipped, {} ignored ({:.2}s)",
        prefix,
        status,
        result.files_scanned,
        result.renamed,
        result.converted,
        result.retimed,
        result.sidecars_deleted,
        result.unchanged,
        result.duplicates,
        result.skipped,
        result.ignored,
        t_total.elapsed().as_secs_f64()
    );
    if let Some(trace) = &result.trace_written {
        eprintln!("{}GPX trace with {} points: {}", prefix, result.gps_points, trace.display());
    }

    Ok(())
}
