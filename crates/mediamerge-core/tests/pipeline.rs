use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use filetime::FileTime;
use mediamerge_core::{process, process_with_control, CancellationToken, MergeControl, MergeOptions};
use tempfile::tempdir;

fn ascii(tag: Tag, s: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![s.as_bytes().to_vec()]),
    }
}

fn rational(tag: Tag, parts: &[(u32, u32)]) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(parts.iter().map(|&(num, denom)| Rational { num, denom }).collect()),
    }
}

/// SOI + APP1(Exif) + EOI, with an optional trailing payload so otherwise
/// identical fixtures can differ in content.
fn jpeg(date: &str, with_gps: bool, payload: &[u8]) -> Vec<u8> {
    let mut fields = vec![ascii(Tag::DateTimeOriginal, date)];
    if with_gps {
        fields.extend([
            ascii(Tag::GPSLatitudeRef, "N"),
            rational(Tag::GPSLatitude, &[(35, 1), (41, 1), (222, 10)]),
            ascii(Tag::GPSLongitudeRef, "E"),
            rational(Tag::GPSLongitude, &[(139, 1), (41, 1), (30, 1)]),
            ascii(Tag::GPSDateStamp, "2024:05:05"),
            rational(Tag::GPSTimeStamp, &[(9, 1), (19, 1), (59, 1)]),
        ]);
    }
    let mut writer = Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, true).unwrap();
    let tiff = tiff.into_inner();

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn mp4(unix: i64) -> Vec<u8> {
    let qt = (unix + 2_082_844_800) as u32;
    let mut mvhd = vec![0u8; 4];
    mvhd.extend_from_slice(&qt.to_be_bytes());
    mvhd.extend_from_slice(&qt.to_be_bytes());
    mvhd.extend_from_slice(&[0u8; 88]);
    let mut out = mp4_box(b"ftyp", b"qt  \0\0\0\0qt  ");
    out.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));
    out
}

fn options(sources: Vec<PathBuf>, out: &Path) -> MergeOptions {
    let mut opts = MergeOptions::new(sources);
    opts.output = out.to_path_buf();
    opts.gpx = Some(opts.default_trace_path());
    // Keep the tests independent of whatever is installed
    opts.ffprobe = "mediamerge-test-no-ffprobe".to_string();
    opts.magick = "mediamerge-test-no-magick".to_string();
    opts
}

fn quiet() -> impl Fn(&str, u64, u64, &str) + Send + Sync {
    |_, _, _, _| {}
}

/// Every file under `root` with its bytes and mtime.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, (Vec<u8>, i64)> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let meta = e.metadata().unwrap();
            let mtime = FileTime::from_last_modification_time(&meta).unix_seconds();
            (e.path().to_path_buf(), (fs::read(e.path()).unwrap(), mtime))
        })
        .collect()
}

fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

/// A phone export: geotagged photo plus its edit sidecar, a video, a
/// WhatsApp image without EXIF, an undated image and a stray text file.
fn populate(src: &Path) {
    fs::create_dir_all(src.join("DCIM")).unwrap();
    fs::write(src.join("DCIM/IMG_0001.JPG"), jpeg("2024:05:05 18:19:59", true, b"")).unwrap();
    fs::write(src.join("DCIM/IMG_0001.AAE"), b"<plist/>").unwrap();
    fs::write(src.join("DCIM/VID_0002.MP4"), mp4(1_715_492_306)).unwrap();
    fs::write(src.join("IMG-20190509-WA0001.jpg"), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
    fs::write(src.join("undated.jpg"), [0xFF, 0xD8, 0x00, 0xFF, 0xD9]).unwrap();
    fs::write(src.join("notes.txt"), b"hello").unwrap();
}

#[test]
fn test_full_run() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    populate(&src);

    let opts = options(vec![src.clone()], &out);
    let result = process(&opts, &quiet()).unwrap();

    let photo = out.join("2024-05-05/2024-05-05_18-19-59_LOCAL.jpg");
    let video = out.join("2024-05-12/2024-05-12_05-38-26_UTC.mp4");
    let whatsapp = out.join("2019-05-09/2019-05-09_00-00-00_LOCAL.jpg");
    assert!(photo.exists());
    assert!(video.exists());
    assert!(whatsapp.exists());
    assert_eq!(mtime(&video), 1_715_492_306);

    assert!(!src.join("DCIM/IMG_0001.JPG").exists());
    assert!(!src.join("DCIM/IMG_0001.AAE").exists());
    assert!(src.join("undated.jpg").exists());
    assert!(src.join("notes.txt").exists());

    assert_eq!(result.files_scanned, 6);
    assert_eq!(result.renamed, 3);
    assert_eq!(result.sidecars_deleted, 1);
    assert_eq!(result.retimed, 3);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.ignored, 1);
    assert_eq!(result.gps_points, 1);
    assert_eq!(result.trace_written.as_deref(), Some(out.join("trace.gpx").as_path()));

    let trace = fs::read_to_string(out.join("trace.gpx")).unwrap();
    assert_eq!(trace.matches("<trkpt").count(), 1);
    assert!(trace.contains("<time>2024-05-05T09:19:59Z</time>"));
}

#[test]
fn test_second_run_changes_nothing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    populate(&src);

    process(&options(vec![src.clone()], &out), &quiet()).unwrap();
    let before = snapshot(dir.path());

    let again = process(&options(vec![src.clone(), out.clone()], &out), &quiet()).unwrap();
    assert_eq!(again.changes(), 0, "actions: {:?}", again.actions);
    assert_eq!(again.unchanged, 3);
    assert_eq!(again.renamed, 0);
    assert_eq!(again.duplicates, 0);
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_dry_run_mutates_nothing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    populate(&src);
    let before = snapshot(dir.path());

    let mut opts = options(vec![src.clone()], &out);
    opts.dry_run = true;
    let result = process(&opts, &quiet()).unwrap();

    assert_eq!(snapshot(dir.path()), before);
    assert!(!out.exists());
    // Same plan as a real run
    assert_eq!(result.renamed, 3);
    assert_eq!(result.sidecars_deleted, 1);
    assert!(result.trace_written.is_some());
    assert!(result.changes() > 0);
}

#[test]
fn test_collisions_get_suffixed_and_duplicates_stay() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.jpg"), jpeg("2022:02:02 10:00:00", false, b"a")).unwrap();
    fs::write(src.join("b.JPEG"), jpeg("2022:02:02 10:00:00", false, b"b")).unwrap();

    let result = process(&options(vec![src.clone()], &out), &quiet()).unwrap();
    assert_eq!(result.renamed, 2);
    let day = out.join("2022-02-02");
    assert_eq!(fs::read(day.join("2022-02-02_10-00-00_LOCAL.jpg")).unwrap(), jpeg("2022:02:02 10:00:00", false, b"a"));
    assert_eq!(fs::read(day.join("2022-02-02_10-00-00_LOCAL_.jpg")).unwrap(), jpeg("2022:02:02 10:00:00", false, b"b"));

    // The same photo exported again from the other phone
    fs::write(src.join("copy.jpg"), jpeg("2022:02:02 10:00:00", false, b"a")).unwrap();
    let result = process(&options(vec![src.clone()], &out), &quiet()).unwrap();
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.renamed, 0);
    assert!(src.join("copy.jpg").exists());
    assert!(!day.join("2022-02-02_10-00-00_LOCAL__.jpg").exists());
}

#[test]
fn test_keep_sidecars_and_no_guess() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    populate(&src);

    let mut opts = options(vec![src.clone()], &out);
    opts.keep_sidecars = true;
    opts.no_guess = true;
    let result = process(&opts, &quiet()).unwrap();

    assert!(src.join("DCIM/IMG_0001.AAE").exists());
    assert!(src.join("IMG-20190509-WA0001.jpg").exists());
    assert_eq!(result.sidecars_deleted, 0);
    assert_eq!(result.skipped, 2);
}

#[test]
fn test_heic_conversion_failure_leaves_source() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    fs::create_dir_all(&src).unwrap();
    // Not a real HEIC: the filename date is all it offers
    fs::write(src.join("IMG_20200101_120000.HEIC"), b"ftypheic").unwrap();

    let result = process(&options(vec![src.clone()], &out), &quiet()).unwrap();
    assert_eq!(result.skipped, 1);
    assert!(src.join("IMG_20200101_120000.HEIC").exists());

    let mut opts = options(vec![src.clone()], &out);
    opts.keep_heic = true;
    let result = process(&opts, &quiet()).unwrap();
    assert_eq!(result.renamed, 1);
    assert!(out.join("2020-01-01/2020-01-01_12-00-00_LOCAL.heic").exists());
}

#[test]
fn test_cancelled_run_does_nothing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    populate(&src);
    let before = snapshot(dir.path());

    let token = CancellationToken::new();
    token.cancel();
    let control = MergeControl::new().with_cancel_token(token);
    let result = process_with_control(&options(vec![src.clone()], &out), &control, &quiet()).unwrap();
    assert!(result.cancelled);
    assert_eq!(result.changes(), 0);
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_cancel_mid_run_finishes_current_file() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.jpg"), jpeg("2024:05:05 18:19:59", true, b"")).unwrap();
    fs::write(src.join("b.jpg"), jpeg("2024:06:01 08:00:00", false, b"")).unwrap();

    let token = CancellationToken::new();
    let control = MergeControl::new().with_cancel_token(token.clone());
    // Ctrl-C arrives while the first file is being handled
    let on_progress = move |stage: &str, _: u64, _: u64, _: &str| {
        if stage == "apply" {
            token.cancel();
        }
    };
    let result = process_with_control(&options(vec![src.clone()], &out), &control, &on_progress).unwrap();

    assert!(result.cancelled);
    assert_eq!(result.renamed, 1);
    assert!(out.join("2024-05-05/2024-05-05_18-19-59_LOCAL.jpg").exists());
    assert!(src.join("b.jpg").exists());
    assert!(!out.join("2024-06-01").exists());
    // The trace still covers what was placed
    assert_eq!(result.gps_points, 1);
    assert!(out.join("trace.gpx").exists());
}

#[test]
fn test_identical_files_in_one_run() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("export");
    let out = dir.path().join("merged");
    fs::create_dir_all(&src).unwrap();
    let bytes = jpeg("2020:01:01 12:00:00", false, b"");
    fs::write(src.join("IMG_20200101_120000.jpg"), &bytes).unwrap();
    fs::write(src.join("IMG_20200101_120000(1).jpg"), &bytes).unwrap();

    let mut dry = options(vec![src.clone()], &out);
    dry.dry_run = true;
    let planned = process(&dry, &quiet()).unwrap();
    assert_eq!(planned.renamed, 1);
    assert_eq!(planned.duplicates, 1);

    let result = process(&options(vec![src.clone()], &out), &quiet()).unwrap();
    assert_eq!(result.renamed, 1);
    assert_eq!(result.duplicates, 1);
    let day = out.join("2020-01-01");
    assert_eq!(fs::read(day.join("2020-01-01_12-00-00_LOCAL.jpg")).unwrap(), bytes);
    assert!(!day.join("2020-01-01_12-00-00_LOCAL_.jpg").exists());
    assert_eq!(fs::read_dir(&src).unwrap().count(), 1);
}

#[test]
fn test_missing_sources_fail() {
    let dir = tempdir().unwrap();
    let opts = options(vec![dir.path().join("nope")], &dir.path().join("out"));
    assert!(process(&opts, &quiet()).is_err());
}
