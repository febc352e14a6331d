use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use super::page::{PageMetadata, PositionHints};

static CONTINUED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*[\(\[]\s*(?:continued|cont\.?|contd\.?)\s*[\)\]]").unwrap());
static LABS_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^LABS?\b").unwrap());
static PROG_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^PROG\.?\s*NOTE\b").unwrap());

static NUMERIC_MDY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})([/-])(\d{1,2})([/-])(\d{4}|\d{2})\b").unwrap());
static ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static MONTH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .unwrap()
});

static DOB_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:dob|d\.o\.b\.?|date\s+of\s+birth|birth\s*date|birthdate|born)\b").unwrap()
});
static DOB_FOLLOWING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s\(\[:-]*(?:dob|d\.o\.b|date\s+of\s+birth|birth\s*date)\b").unwrap()
});
static DOB_LINE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:dob|d\.o\.b\.?|date\s+of\s+birth|birth\s*date)\s*:?\s*$").unwrap()
});
const SERVICE_LABELS: &str = r"date\s+of\s+service|service\s+date|dos|visit\s+date|date\s+of\s+visit|encounter\s+date|collected|collection\s+date|admission\s+date|admit\s+date|date\s+seen";
static SERVICE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b(?:{})\b", SERVICE_LABELS)).unwrap());
static SERVICE_LINE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b(?:{})\s*:?\s*$", SERVICE_LABELS)).unwrap());

static PROVIDER_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<label>(?:ordering|attending|referring|rendering|treating)\s+(?:provider|physician)|provider|physician|doctor|attending|facility|hospital|clinic|medical\s+center)\s*:\s*(?P<value>.+?)(?:\s{2,}|\t|$)",
    )
    .unwrap()
});
static FACILITY_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:hospital|medical\s+center|medical\s+group|health\s+system|healthcare|clinic|laboratories|urgent\s+care|labcorp|quest\s+diagnostics)\b",
    )
    .unwrap()
});
static DOCTOR_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bDr\.?\s+[A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)?").unwrap()
});

/// Report-title vocabulary that marks a line as a header.
const HEADER_KEYWORDS: &[&str] = &[
    "LABORATORY",
    "LAB",
    "PROGRESS",
    "NOTE",
    "REPORT",
    "CLINICAL",
    "CONSULTATION",
    "DISCHARGE",
    "SUMMARY",
    "RADIOLOGY",
    "PATHOLOGY",
    "OPERATIVE",
    "IMAGING",
    "EMERGENCY",
    "RESULTS",
];

/// Words long enough that OCR damage can still be recognised by edit distance.
const FUZZY_MIN_LEN: usize = 4;
const FUZZY_WORD_THRESHOLD: f64 = 0.8;

/// Longest line still considered a title rather than body prose.
const MAX_HEADER_CHARS: usize = 80;
const MAX_PROVIDER_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Leading lines searched for a header.
    pub header_scan_lines: usize,
    /// Leading lines searched for provider and facility fields.
    pub provider_scan_lines: usize,
    /// With explicit position hints, header lines must sit at or above this offset.
    pub header_band: f32,
    /// Leading body characters the category classifier consults.
    pub body_window: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            header_scan_lines: 15,
            provider_scan_lines: 20,
            header_band: 0.25,
            body_window: super::classify::DEFAULT_BODY_WINDOW,
        }
    }
}

/// Reads header, date of service and provider off a single page.
///
/// A pure function of the page text and its position hints. Missing values come
/// back empty rather than as errors; the reconciler fills them from the group.
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor {
    config: ExtractionConfig,
}

struct Line<'a> {
    text: &'a str,
    offset: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct DateCandidate {
    date: NaiveDate,
    labeled: bool,
    offset: f32,
    ordinal: usize,
}

impl MetadataExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, raw_text: &str, position: Option<&PositionHints>) -> PageMetadata {
        let lines = layout_lines(raw_text, position);
        let explicit = position.is_some_and(|p| !p.line_offsets.is_empty());

        let header_line = self.find_header_line(&lines, explicit);
        let (header, continued) = header_line
            .map(|idx| normalize_header(lines[idx].text))
            .unwrap_or_default();

        PageMetadata {
            header,
            continued,
            dos: extract_dos(&lines),
            provider: self.extract_provider(&lines, header_line),
        }
    }

    fn find_header_line(&self, lines: &[Line<'_>], explicit: bool) -> Option<usize> {
        let region: Vec<usize> = (0..lines.len().min(self.config.header_scan_lines))
            .filter(|&i| !explicit || lines[i].offset <= self.config.header_band)
            .filter(|&i| {
                let t = lines[i].text.trim();
                !t.is_empty() && t.chars().count() <= MAX_HEADER_CHARS
            })
            .collect();

        region
            .iter()
            .copied()
            .find(|&i| has_header_vocabulary(lines[i].text) || CONTINUED_RE.is_match(lines[i].text))
            .or_else(|| region.iter().copied().find(|&i| is_capitalized_phrase(lines[i].text)))
            .or_else(|| region.iter().copied().find(|&i| has_fuzzy_vocabulary(lines[i].text)))
    }

    fn extract_provider(&self, lines: &[Line<'_>], header_line: Option<usize>) -> String {
        let mut provider: Option<String> = None;
        let mut facility: Option<String> = None;

        let scan = lines.iter().take(self.config.provider_scan_lines);
        for line in scan.clone() {
            for caps in PROVIDER_FIELD_RE.captures_iter(line.text) {
                let label = caps["label"].to_lowercase();
                let value = clean_value(&caps["value"]);
                if value.is_empty() {
                    continue;
                }
                let is_facility = label.contains("facility")
                    || label.contains("hospital")
                    || label.contains("clinic")
                    || label.contains("medical");
                let slot = if is_facility { &mut facility } else { &mut provider };
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
        }

        if facility.is_none() {
            facility = scan
                .clone()
                .enumerate()
                .filter(|(i, _)| Some(*i) != header_line)
                .map(|(_, line)| line.text.trim())
                .find(|t| {
                    !t.contains(':')
                        && t.chars().count() <= MAX_PROVIDER_CHARS
                        && FACILITY_NAME_RE.is_match(t)
                })
                .map(clean_value);
        }

        if provider.is_none() {
            provider = scan
                .filter_map(|line| DOCTOR_NAME_RE.find(line.text))
                .map(|m| clean_value(m.as_str()))
                .next();
        }

        match (provider, facility) {
            (Some(p), Some(f)) if p != f => format!("{} - {}", p, f),
            (Some(p), _) => p,
            (None, Some(f)) => f,
            (None, None) => String::new(),
        }
    }
}

fn layout_lines<'a>(raw_text: &'a str, position: Option<&PositionHints>) -> Vec<Line<'a>> {
    let texts: Vec<&str> = raw_text.lines().collect();
    let count = texts.len().max(1) as f32;
    let offsets = position.map(|p| p.line_offsets.as_slice()).unwrap_or(&[]);
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Line {
            text,
            offset: offsets
                .get(i)
                .copied()
                .filter(|o| o.is_finite())
                .unwrap_or(i as f32 / count),
        })
        .collect()
}

fn has_header_vocabulary(line: &str) -> bool {
    line.split(|c: char| !c.is_alphanumeric())
        .any(|w| HEADER_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)))
}

fn has_fuzzy_vocabulary(line: &str) -> bool {
    line.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= FUZZY_MIN_LEN)
        .any(|w| {
            let upper = w.to_uppercase();
            HEADER_KEYWORDS
                .iter()
                .filter(|k| k.len() >= FUZZY_MIN_LEN)
                .any(|k| strsim::normalized_levenshtein(&upper, k) >= FUZZY_WORD_THRESHOLD)
        })
}

/// An all-caps phrase of two to eight words, mostly letters.
fn is_capitalized_phrase(line: &str) -> bool {
    let t = line.trim();
    let words = t.split_whitespace().count();
    if !(2..=8).contains(&words) || t.contains(':') {
        return false;
    }
    let letters: Vec<char> = t.chars().filter(|c| c.is_alphabetic()).collect();
    let others = t.chars().filter(|c| !c.is_alphabetic() && !c.is_whitespace()).count();
    letters.len() >= 4 && others * 4 <= letters.len() && letters.iter().all(|c| c.is_uppercase())
}

/// Strips continuation markers and folds common abbreviations.
///
/// Returns the cleaned header and whether a continuation marker was present.
pub fn normalize_header(header: &str) -> (String, bool) {
    let continued = CONTINUED_RE.is_match(header);
    let stripped = CONTINUED_RE.replace_all(header, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let folded = LABS_PREFIX_RE.replace(&collapsed, "LABORATORY");
    let folded = PROG_NOTE_RE.replace(&folded, "PROGRESS NOTE");
    let cleaned = folded
        .trim_matches(|c: char| c == '-' || c == ':' || c == '|' || c.is_whitespace())
        .to_string();
    (cleaned, continued)
}

fn extract_dos(lines: &[Line<'_>]) -> Option<NaiveDate> {
    let mut candidates = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let tokens = date_tokens(line.text);
        let mut prev_end = 0;
        for (k, &(start, end, date)) in tokens.iter().enumerate() {
            let before = &line.text[prev_end..start];
            let next_start = tokens.get(k + 1).map_or(line.text.len(), |t| t.0);
            let gap = &line.text[end..next_start];
            prev_end = end;

            let mut label = last_label(before);
            if label.is_none() && k == 0 && before.trim().is_empty() && idx > 0 {
                label = line_end_label(lines[idx - 1].text.trim_end());
            }
            if label == Some(DateLabel::Birth) || followed_by_birth_label(gap, k + 1 < tokens.len()) {
                continue;
            }
            candidates.push(DateCandidate {
                date,
                labeled: label == Some(DateLabel::Service),
                offset: line.offset,
                ordinal: candidates.len(),
            });
        }
    }

    candidates
        .into_iter()
        .min_by(|a, b| {
            b.labeled
                .cmp(&a.labeled)
                .then(a.offset.total_cmp(&b.offset))
                .then(a.ordinal.cmp(&b.ordinal))
        })
        .map(|c| c.date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateLabel {
    Birth,
    Service,
}

/// The label closest to the end of `text`; an earlier label belongs to an earlier field.
fn last_label(text: &str) -> Option<DateLabel> {
    let birth = DOB_LABEL_RE.find_iter(text).last().map(|m| m.start());
    let service = SERVICE_LABEL_RE.find_iter(text).last().map(|m| m.start());
    match (birth, service) {
        (None, None) => None,
        (Some(_), None) => Some(DateLabel::Birth),
        (None, Some(_)) => Some(DateLabel::Service),
        (Some(b), Some(s)) if b > s => Some(DateLabel::Birth),
        (Some(_), Some(_)) => Some(DateLabel::Service),
    }
}

/// A label left dangling at the end of the previous line.
fn line_end_label(prev: &str) -> Option<DateLabel> {
    if DOB_LINE_END_RE.is_match(prev) {
        Some(DateLabel::Birth)
    } else if SERVICE_LINE_END_RE.is_match(prev) {
        Some(DateLabel::Service)
    } else {
        None
    }
}

/// "01/02/1960 (DOB)". A label that runs straight into the next date introduces
/// that date instead.
fn followed_by_birth_label(gap: &str, has_next: bool) -> bool {
    let Some(m) = DOB_FOLLOWING_RE.find(gap) else {
        return false;
    };
    let rest = gap[m.end()..].trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '-' || c == '#');
    !(has_next && rest.is_empty())
}

/// All calendar dates in a line as `(start, end, date)`, ordered, non-overlapping.
fn date_tokens(line: &str) -> Vec<(usize, usize, NaiveDate)> {
    let mut found: Vec<(usize, usize, NaiveDate)> = Vec::new();

    for caps in NUMERIC_MDY_RE.captures_iter(line) {
        // Mixed separators such as 03/04-2024 are not dates.
        if caps[2] != caps[4] {
            continue;
        }
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        let year = expand_year(&caps[5]);
        let date = parse_parts(year, &caps[1], &caps[3]);
        if let (Some((s, e)), Some(d)) = (whole, date) {
            found.push((s, e, d));
        }
    }
    for caps in ISO_RE.captures_iter(line) {
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        let date = caps[1].parse::<i32>().ok().and_then(|y| parse_parts(Some(y), &caps[2], &caps[3]));
        if let (Some((s, e)), Some(d)) = (whole, date) {
            found.push((s, e, d));
        }
    }
    for caps in MONTH_NAME_RE.captures_iter(line) {
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        let month = month_number(&caps[1]);
        let day = caps[2].parse::<u32>().ok();
        let year = caps[3].parse::<i32>().ok();
        let date = match (year, month, day) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d),
            _ => None,
        };
        if let (Some((s, e)), Some(d)) = (whole, date) {
            found.push((s, e, d));
        }
    }

    found.sort_by_key(|(s, e, _)| (*s, std::cmp::Reverse(*e)));
    let mut out: Vec<(usize, usize, NaiveDate)> = Vec::with_capacity(found.len());
    for tok in found {
        if out.last().is_some_and(|last| tok.0 < last.1) {
            continue;
        }
        out.push(tok);
    }
    out
}

fn expand_year(raw: &str) -> Option<i32> {
    let year = raw.parse::<i32>().ok()?;
    Some(match raw.len() {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

fn parse_parts(year: Option<i32>, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| name.to_lowercase().starts_with(m))?;
    Some(idx as u32 + 1)
}

fn clean_value(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| c == ',' || c == ';' || c == '.' || c == '|')
        .trim()
        .to_string()
}
