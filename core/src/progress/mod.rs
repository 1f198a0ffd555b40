//! Recovery of progress signals from babeldoc log output.
//!
//! The CLI has no machine-readable progress channel; it logs Python dict
//! reprs, debug records and free-form messages. Each format is handled by one
//! [`LogMatcher`], and the [`LogEventExtractor`] tries them in order.

pub mod matchers;

use serde::Serialize;

pub use matchers::{DebugRecordMatcher, PhraseMatcher, ProgressMatcher, StageProgressMatcher};

/// Structured information recovered from one line of output.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogSignal {
    /// Human readable status, e.g. `"Parse Page Layout (13%)"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Overall completion percentage as reported by the tool. Always finite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl LogSignal {
    pub fn progress(value: f64) -> Self {
        Self {
            status: None,
            progress: Some(value),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self {
            status: Some(message.into()),
            progress: None,
        }
    }

    pub fn stage(stage: &str, progress: f64) -> Self {
        Self {
            status: Some(format_stage(stage, progress)),
            progress: Some(progress),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.progress.is_none()
    }
}

/// One strategy for recognising a log format.
pub trait LogMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_match(&self, line: &str) -> Option<LogSignal>;
}

/// Ordered chain of matchers. The first matcher that produces a signal wins.
pub struct LogEventExtractor {
    matchers: Vec<Box<dyn LogMatcher>>,
}

impl Default for LogEventExtractor {
    fn default() -> Self {
        Self {
            matchers: vec![
                Box::new(StageProgressMatcher),
                Box::new(ProgressMatcher),
                Box::new(DebugRecordMatcher),
                Box::new(PhraseMatcher::default()),
            ],
        }
    }
}

impl LogEventExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An extractor with no matchers; useful to build a custom chain.
    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: impl LogMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|matcher| matcher.name()).collect()
    }

    pub fn extract(&self, line: &str) -> Option<LogSignal> {
        self.matchers
            .iter()
            .find_map(|matcher| matcher.try_match(line))
            .filter(|signal| !signal.is_empty())
    }
}

/// `"<stage> (<rounded>%)"`, rounding half up like the UI always has.
pub fn format_stage(stage: &str, progress: f64) -> String {
    format!("{} ({}%)", stage, round_half_up(progress))
}

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_order() {
        let extractor = LogEventExtractor::new();
        assert_eq!(
            extractor.matcher_names(),
            vec!["stage-progress", "progress", "debug-record", "phrase"]
        );
    }

    #[test]
    fn progress_fragment_yields_exact_value() {
        let extractor = LogEventExtractor::new();
        let signal = extractor
            .extract("{'overall_progress': 13.159218108456686, 'total': 100}")
            .unwrap();
        assert_eq!(signal.progress, Some(13.159218108456686));
        assert_eq!(signal.status, None);
    }

    #[test]
    fn stage_and_progress_combine() {
        let extractor = LogEventExtractor::new();
        let signal = extractor
            .extract("{'type': 'progress_update', 'stage': 'Parse Page Layout', 'overall_progress': 42.5}")
            .unwrap();
        assert_eq!(signal.status.as_deref(), Some("Parse Page Layout (43%)"));
        assert_eq!(signal.progress, Some(42.5));
    }

    #[test]
    fn malformed_numbers_yield_nothing() {
        let extractor = LogEventExtractor::new();
        assert_eq!(extractor.extract("'overall_progress': NaN"), None);
        assert_eq!(extractor.extract("'overall_progress': "), None);
        assert_eq!(extractor.extract("'overall_progress': ..."), None);
    }

    #[test]
    fn unrecognised_line_yields_nothing() {
        let extractor = LogEventExtractor::new();
        assert_eq!(extractor.extract("INFO: something unrelated"), None);
    }

    #[test]
    fn custom_chain_is_extendable() {
        struct Always;
        impl LogMatcher for Always {
            fn name(&self) -> &'static str {
                "always"
            }
            fn try_match(&self, _line: &str) -> Option<LogSignal> {
                Some(LogSignal::status("seen"))
            }
        }

        let extractor = LogEventExtractor::empty().with_matcher(Always);
        assert_eq!(
            extractor.extract("anything"),
            Some(LogSignal::status("seen"))
        );
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(format_stage("Translate", 2.5), "Translate (3%)");
        assert_eq!(format_stage("Translate", 99.49), "Translate (99%)");
        assert_eq!(format_stage("Translate", 0.0), "Translate (0%)");
    }
}
