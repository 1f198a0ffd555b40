/// Deployment configuration: where the tools live and how to talk to them.
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::encoding::OutputEncoding;
use crate::files::write_atomic;
use crate::job::options::{DEFAULT_PROGRAM, DEFAULT_REPORT_INTERVAL_SECS};

pub const APP_DIR_NAME: &str = "babel-toolbox";
pub const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BOOKMARK_URL: &str = "https://www.wolai.com/3PM5pcLYyZT4dAFP8LMwV2";
pub const DEFAULT_BOOKMARK_WAIT_MS: u64 = 3000;
pub const DEFAULT_BOOKMARK_CACHE_TTL_SECS: u64 = 60 * 60;

/// `<config dir>/babel-toolbox`.
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolConfig {
    pub babeldoc_program: String,
    /// Extra directories searched for the program, after `~/.local/bin`.
    pub extra_search_paths: Vec<PathBuf>,
    pub output_encoding: OutputEncoding,
    pub report_interval_secs: f64,
    pub node_program: String,
    pub bookmark_source_url: String,
    pub bookmark_wait_ms: u64,
    pub bookmark_cache_ttl_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            babeldoc_program: DEFAULT_PROGRAM.into(),
            extra_search_paths: Vec::new(),
            output_encoding: OutputEncoding::default(),
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            node_program: "node".into(),
            bookmark_source_url: DEFAULT_BOOKMARK_URL.into(),
            bookmark_wait_ms: DEFAULT_BOOKMARK_WAIT_MS,
            bookmark_cache_ttl_secs: DEFAULT_BOOKMARK_CACHE_TTL_SECS,
        }
    }
}

impl ToolConfig {
    pub fn default_path() -> Option<PathBuf> {
        app_config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Defaults when the file is absent or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("failed to read {}: {}", path.display(), err);
                }
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(config) => config.sanitized(),
            Err(err) => {
                warn!("ignoring malformed {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let contents = serde_json::to_vec_pretty(self)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        write_atomic(path, &contents)
    }

    fn sanitized(mut self) -> Self {
        if self.babeldoc_program.trim().is_empty() {
            self.babeldoc_program = DEFAULT_PROGRAM.into();
        }
        if self.node_program.trim().is_empty() {
            self.node_program = "node".into();
        }
        if !self.report_interval_secs.is_finite() || self.report_interval_secs <= 0.0 {
            self.report_interval_secs = DEFAULT_REPORT_INTERVAL_SECS;
        }
        self
    }
}
