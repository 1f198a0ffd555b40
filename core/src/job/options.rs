use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};

use crate::config::ToolConfig;
use crate::encoding::OutputEncoding;
use crate::process::{local_bin_dir, CommandSpec};
use crate::settings::PdfTranslateSettings;

pub const DEFAULT_PROGRAM: &str = "babeldoc";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PROMPT: &str = "Translate this PDF to Chinese.";
pub const DEFAULT_REPORT_INTERVAL_SECS: f64 = 0.5;

/// Keys turned into fixed flags; never repeated as dynamic flags.
const CONSUMED_KEYS: &[&str] = &["file", "apiKey", "model", "baseUrl", "prompt"];

/// Secondary babeldoc options and their defaults.
pub fn default_extra() -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("qps".into(), Value::from(10));
    extra.insert("watermarkOutputMode".into(), Value::from("watermarked"));
    extra.insert("debug".into(), Value::from(false));
    extra.insert("showCharBox".into(), Value::from(false));
    extra.insert("pages".into(), Value::from(""));
    extra.insert("splitShortLines".into(), Value::from(false));
    extra.insert("ocrWorkaround".into(), Value::from(false));
    extra.insert("enhanceCompatibility".into(), Value::from(false));
    extra.insert("glossaryFiles".into(), Value::from(""));
    extra.insert("minTextLength".into(), Value::from(5));
    extra
}

/// Snapshot of everything one batch run needs, taken when the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub prompt: String,
    pub extra: Map<String, Value>,
    pub program: String,
    pub report_interval_secs: f64,
    pub extra_search_paths: Vec<PathBuf>,
    pub encoding: OutputEncoding,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            prompt: DEFAULT_PROMPT.into(),
            extra: default_extra(),
            program: DEFAULT_PROGRAM.into(),
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            extra_search_paths: Vec::new(),
            encoding: OutputEncoding::default(),
        }
    }
}

impl RunOptions {
    /// Combine the user's PDF settings with the deployment config.
    pub fn from_settings(settings: &PdfTranslateSettings, tool: &ToolConfig) -> Self {
        let mut extra = default_extra();
        for (key, value) in &settings.advanced {
            extra.insert(key.clone(), value.clone());
        }

        Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            prompt: settings.prompt.clone(),
            extra,
            program: tool.babeldoc_program.clone(),
            report_interval_secs: tool.report_interval_secs,
            extra_search_paths: tool.extra_search_paths.clone(),
            encoding: tool.output_encoding.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Full argument list for translating `file`.
    pub fn build_args(&self, file: &Path) -> Vec<String> {
        let output_dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut args = vec![
            "--openai".to_string(),
            "--openai-model".to_string(),
            self.model.clone(),
            "--openai-base-url".to_string(),
            self.base_url.clone(),
            "--openai-api-key".to_string(),
            self.api_key.clone(),
            "--files".to_string(),
            file.to_string_lossy().to_string(),
            "-o".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--custom-system-prompt".to_string(),
            self.prompt.clone(),
            "--enable-json-mode-if-requested".to_string(),
            "--report-interval".to_string(),
            format_number(self.report_interval_secs),
        ];
        args.extend(self.dynamic_flags());
        args
    }

    /// Flags generated from `extra`, in key order.
    pub fn dynamic_flags(&self) -> Vec<String> {
        let mut keys: Vec<&String> = self.extra.keys().collect();
        keys.sort();

        let mut flags = Vec::new();
        for key in keys {
            if CONSUMED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let flag = format!("--{}", kebab_case(key));
            match &self.extra[key.as_str()] {
                Value::Bool(true) => flags.push(flag),
                Value::Bool(false) | Value::Null => {}
                Value::String(text) => {
                    if !text.is_empty() {
                        flags.push(flag);
                        flags.push(text.clone());
                    }
                }
                Value::Number(number) => {
                    flags.push(flag);
                    flags.push(js_number(number));
                }
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .filter_map(scalar_text)
                        .filter(|item| !item.is_empty())
                        .collect::<Vec<_>>()
                        .join(",");
                    if !joined.is_empty() {
                        flags.push(flag);
                        flags.push(joined);
                    }
                }
                Value::Object(_) => {
                    warn!("skipping option '{}': nested objects cannot become flags", key);
                }
            }
        }
        flags
    }

    /// Launch description for one file, `PATH` extended with `~/.local/bin`.
    pub fn command_spec(&self, file: &Path) -> CommandSpec {
        let mut search_paths: Vec<PathBuf> = local_bin_dir().into_iter().collect();
        search_paths.extend(self.extra_search_paths.iter().cloned());

        CommandSpec {
            program: self.program.clone(),
            args: self.build_args(file),
            extra_search_paths: search_paths,
            encoding: self.encoding.clone(),
        }
    }
}

/// `splitShortLines` -> `split-short-lines`.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Number formatting that matches what a JavaScript frontend would send
/// (`5`, not `5.0`).
pub fn js_number(number: &Number) -> String {
    if let Some(value) = number.as_i64() {
        return value.to_string();
    }
    if let Some(value) = number.as_u64() {
        return value.to_string();
    }
    number.as_f64().map(format_number).unwrap_or_default()
}

fn format_number(value: f64) -> String {
    format!("{}", value)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(js_number(number)),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
