use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const EXTRACT_LINKS_SCRIPT: &str = include_str!("../../scripts/extract-links.js");
const RESULT_MARKER: &str = "---RESULT---";
/// Time allowed for launching the browser and loading the page, on top of the wait.
const LAUNCH_BUDGET: Duration = Duration::from_secs(60);

/// An anchor as the page reported it, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLink {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// Headless browser that renders a page and lists its links.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn extract_links(&self, url: &str, wait: Duration) -> Result<Vec<RawLink>>;
}

/// Runs the bundled Playwright script with Node.
#[derive(Debug, Clone)]
pub struct PlaywrightBrowser {
    node_program: String,
    script_path: PathBuf,
}

impl PlaywrightBrowser {
    /// `script_path` is where the bundled script is written before each run.
    pub fn new(node_program: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        Self {
            node_program: node_program.into(),
            script_path: script_path.into(),
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    fn install_script(&self) -> Result<()> {
        if let Some(parent) = self.script_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.script_path, EXTRACT_LINKS_SCRIPT)
            .with_context(|| format!("failed to write {}", self.script_path.display()))
    }
}

#[async_trait]
impl BrowserAutomation for PlaywrightBrowser {
    async fn extract_links(&self, url: &str, wait: Duration) -> Result<Vec<RawLink>> {
        self.install_script()?;

        let mut command = Command::new(&self.node_program);
        command
            .arg(&self.script_path)
            .arg(url)
            .arg(wait.as_millis().to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("extracting links from {} with {}", url, self.node_program);
        let output = tokio::time::timeout(wait + LAUNCH_BUDGET, command.output())
            .await
            .map_err(|_| anyhow!("headless browser timed out loading {url}"))?
            .with_context(|| format!("failed to run '{}'", self.node_program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            bail!("headless browser failed: {detail}");
        }

        parse_result(&stdout)
    }
}

/// The JSON array printed after the result marker.
pub fn parse_result(stdout: &str) -> Result<Vec<RawLink>> {
    let payload = stdout
        .split(RESULT_MARKER)
        .nth(1)
        .map(str::trim)
        .ok_or_else(|| anyhow!("no result found in browser output"))?;
    serde_json::from_str(payload).context("failed to parse extracted links")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_links_after_marker() {
        let stdout = "{\"stage\":\"navigate\"}\n---RESULT---\n[{\"title\":\" Docs \",\"url\":\"https://a.dev\"},{\"url\":\"https://b.dev\"}]\n";
        let links = parse_result(stdout).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].title, " Docs ");
        assert_eq!(links[1].title, "");
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = parse_result("[]").unwrap_err();
        assert!(err.to_string().contains("no result"));
    }

    #[test]
    fn bundled_script_prints_marker() {
        assert!(EXTRACT_LINKS_SCRIPT.contains(RESULT_MARKER));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_script_through_given_program() {
        // Stand-in for node: ignores the script and echoes the wait argument back.
        let dir = tempfile::tempdir().unwrap();
        let fake_node = dir.path().join("fake-node");
        std::fs::write(
            &fake_node,
            "#!/bin/sh\necho '---RESULT---'\necho \"[{\\\"title\\\":\\\"$3\\\",\\\"url\\\":\\\"https://x.dev\\\"}]\"\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&fake_node, std::fs::Permissions::from_mode(0o755)).unwrap();

        let browser = PlaywrightBrowser::new(
            fake_node.to_string_lossy().to_string(),
            dir.path().join("scripts").join("extract-links.js"),
        );
        let links = browser
            .extract_links("https://page.example", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(
            links,
            vec![RawLink {
                title: "10".into(),
                url: "https://x.dev".into()
            }]
        );
        assert!(browser.script_path().exists());
    }
}
