use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{LogMatcher, LogSignal};

static OVERALL_PROGRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'overall_progress':\s*([\d.]+)").expect("valid overall progress regex")
});

static STAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'stage':\s*'([^']+)'").expect("valid stage regex"));

static DEBUG_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"DEBUG:babeldoc\.main:(\{.*\})").expect("valid debug record regex")
});

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d*)?|\.\d+)").expect("valid leading number regex")
});

/// Reads the longest leading decimal, so `1.2.3` is `1.2`.
fn parse_finite(raw: &str) -> Option<f64> {
    let number = LEADING_NUMBER.find(raw)?.as_str();
    number.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn overall_progress(line: &str) -> Option<f64> {
    let captures = OVERALL_PROGRESS.captures(line)?;
    parse_finite(captures.get(1)?.as_str())
}

/// `'stage': 'Parse Page Layout'` together with `'overall_progress': 13.1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageProgressMatcher;

impl LogMatcher for StageProgressMatcher {
    fn name(&self) -> &'static str {
        "stage-progress"
    }

    fn try_match(&self, line: &str) -> Option<LogSignal> {
        let stage = STAGE_NAME.captures(line)?.get(1)?.as_str();
        let progress = overall_progress(line)?;
        Some(LogSignal::stage(stage, progress))
    }
}

/// A bare `'overall_progress': 13.1` fragment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressMatcher;

impl LogMatcher for ProgressMatcher {
    fn name(&self) -> &'static str {
        "progress"
    }

    fn try_match(&self, line: &str) -> Option<LogSignal> {
        overall_progress(line).map(LogSignal::progress)
    }
}

/// A whole `DEBUG:babeldoc.main:{...}` record.
///
/// Records are Python reprs, so quotes are normalised before parsing as JSON.
/// Records that still fail to parse (e.g. ones containing `True` or `None`)
/// are skipped without reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugRecordMatcher;

impl LogMatcher for DebugRecordMatcher {
    fn name(&self) -> &'static str {
        "debug-record"
    }

    fn try_match(&self, line: &str) -> Option<LogSignal> {
        let blob = DEBUG_RECORD.captures(line)?.get(1)?.as_str();
        let normalized = blob.replace('\'', "\"");
        let record: Value = serde_json::from_str(&normalized).ok()?;

        let progress = record
            .get("overall_progress")
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite())?;

        match record.get("stage").and_then(Value::as_str) {
            Some(stage) if !stage.is_empty() => Some(LogSignal::stage(stage, progress)),
            _ => Some(LogSignal::progress(progress)),
        }
    }
}

/// Known literal messages mapped to the status shown to the user.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    table: Vec<(&'static str, &'static str)>,
}

pub const KNOWN_PHRASES: &[(&str, &str)] = &[
    ("Loading ONNX model", "Loading layout model..."),
    ("start to translate", "Starting translation..."),
    ("Automatic Term Extraction", "Extracting terminology..."),
    ("Found title paragraph", "Analyzing document structure..."),
    ("Translation result", "Translating paragraphs..."),
    ("Fallback to simple translation", "Running simple translation..."),
];

impl Default for PhraseMatcher {
    fn default() -> Self {
        Self {
            table: KNOWN_PHRASES.to_vec(),
        }
    }
}

impl PhraseMatcher {
    pub fn with_phrase(mut self, needle: &'static str, status: &'static str) -> Self {
        self.table.push((needle, status));
        self
    }
}

impl LogMatcher for PhraseMatcher {
    fn name(&self) -> &'static str {
        "phrase"
    }

    fn try_match(&self, line: &str) -> Option<LogSignal> {
        self.table
            .iter()
            .find(|(needle, _)| line.contains(needle))
            .map(|(_, status)| LogSignal::status(*status))
    }
}
