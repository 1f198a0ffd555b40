//! Small filesystem helpers behind the UI's save/read/open actions.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::time::now_millis;

static IMAGE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^data:image/([a-z]{1,20});base64,").expect("valid image data url regex")
});

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("no downloads directory is available on this system")]
    NoDownloadDir,
    #[error("not a base64 image data URL")]
    InvalidDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },
}

/// Replace `target` with `contents` through a temp file in the same directory.
pub fn write_atomic(target: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(target);
    let written = (|| {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        replace(&temp_path, target)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

#[cfg(target_os = "windows")]
fn replace(temp_path: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(temp_path, target) {
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(target)?;
            fs::rename(temp_path, target)
        }
        other => other,
    }
}

#[cfg(not(target_os = "windows"))]
fn replace(temp_path: &Path, target: &Path) -> io::Result<()> {
    fs::rename(temp_path, target)
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut temp = target.to_path_buf();
    let suffix = format!(".tmp-{}", std::process::id());
    match temp.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(suffix);
            temp.set_file_name(name);
        }
        None => temp.push(format!("settings{suffix}")),
    }
    temp
}

fn download_dir() -> Result<PathBuf, FileError> {
    dirs::download_dir().ok_or(FileError::NoDownloadDir)
}

/// Save `text` as `<downloads>/<millis>.txt`.
pub fn write_text_file(text: &str) -> Result<PathBuf, FileError> {
    write_text_file_in(&download_dir()?, text)
}

pub fn write_text_file_in(dir: &Path, text: &str) -> Result<PathBuf, FileError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.txt", now_millis()));
    fs::write(&path, text)?;
    Ok(path)
}

/// Save a `data:image/<ext>;base64,...` URL as `<downloads>/<millis>.<ext>`.
pub fn write_image_data_url(data_url: &str) -> Result<PathBuf, FileError> {
    write_image_data_url_in(&download_dir()?, data_url)
}

pub fn write_image_data_url_in(dir: &Path, data_url: &str) -> Result<PathBuf, FileError> {
    let captures = IMAGE_DATA_URL
        .captures(data_url)
        .ok_or(FileError::InvalidDataUrl)?;
    let prefix_len = captures.get(0).map(|m| m.end()).unwrap_or(0);
    let extension = captures
        .get(1)
        .map(|m| m.as_str().to_ascii_lowercase())
        .ok_or(FileError::InvalidDataUrl)?;

    let bytes = STANDARD.decode(data_url[prefix_len..].trim())?;
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", now_millis(), extension));
    fs::write(&path, bytes)?;
    Ok(path)
}

pub fn read_file(path: &Path) -> Result<String, FileError> {
    Ok(fs::read_to_string(path)?)
}

/// Open a file, folder or URL with the system handler.
pub fn open_path(target: &str) -> Result<(), FileError> {
    open::that(target).map_err(|err| FileError::Open {
        path: target.to_string(),
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub release: String,
}

pub fn os_info() -> OsInfo {
    OsInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1),
        release: sysinfo::System::kernel_version().unwrap_or_default(),
    }
}
