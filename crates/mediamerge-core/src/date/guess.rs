use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

struct DatePattern {
    regex: &'static LazyLock<Regex>,
    format: &'static str,
}

static RE_0: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}(01|02|03|04|05|06|07|08|09|10|11|12)[0-3]\d-\d{6})").unwrap());
static RE_1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}(01|02|03|04|05|06|07|08|09|10|11|12)[0-3]\d_\d{6})").unwrap());
static RE_2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}-(01|02|03|04|05|06|07|08|09|10|11|12)-[0-3]\d[-_ ]\d{2}[-.:]\d{2}[-.:]\d{2})").unwrap());
static RE_3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}-(01|02|03|04|05|06|07|08|09|10|11|12)-[0-3]\d-\d{6})").unwrap());
static RE_4: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}(01|02|03|04|05|06|07|08|09|10|11|12)[0-3]\d{7})").unwrap());
static RE_5: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}_(01|02|03|04|05|06|07|08|09|10|11|12)_[0-3]\d_\d{2}_\d{2}_\d{2})").unwrap());
// WhatsApp: IMG-20190509-WA0001.jpg, no time of day
static RE_WA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19)\d{2}(01|02|03|04|05|06|07|08|09|10|11|12)[0-3]\d)-WA\d+").unwrap());

static PATTERNS: &[DatePattern] = &[
    DatePattern { regex: &RE_0, format: "%Y%m%d-%H%M%S" },
    DatePattern { regex: &RE_1, format: "%Y%m%d_%H%M%S" },
    DatePattern { regex: &RE_2, format: "%Y-%m-%d-%H-%M-%S" },
    DatePattern { regex: &RE_3, format: "%Y-%m-%d-%H%M%S" },
    DatePattern { regex: &RE_4, format: "%Y%m%d%H%M%S" },
    DatePattern { regex: &RE_5, format: "%Y_%m_%d_%H_%M_%S" },
];

pub fn guess_date_from_filename(filename: &str) -> Option<NaiveDateTime> {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    // macOS exports decomposed names
    let basename: String = basename.nfc().collect();

    for pat in PATTERNS {
        if let Some(caps) = pat.regex.captures(&basename) {
            if let Some(date_str) = caps.name("date") {
                let s = match pat.format {
                    // Only the first 14 digits; Pixel names append milliseconds
                    "%Y%m%d%H%M%S" => date_str.as_str()[..14.min(date_str.as_str().len())].to_string(),
                    "%Y-%m-%d-%H-%M-%S" => date_str.as_str().replace([' ', '_', '.', ':'], "-"),
                    _ => date_str.as_str().to_string(),
                };
                if let Ok(dt) = NaiveDateTime::parse_from_str(&s, pat.format) {
                    return Some(dt);
                }
            }
        }
    }

    let caps = RE_WA.captures(&basename)?;
    NaiveDate::parse_from_str(caps.name("date")?.as_str(), "%Y%m%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}
