/// Cross-module flows: persisted settings feeding a run, and the bookmark
/// cache persisted through its own JSON store.

#[cfg(test)]
mod tests {
    use crate::bookmarks::{BookmarkService, BrowserAutomation, RawLink, CACHE_KEY};
    use crate::config::ToolConfig;
    use crate::encoding::OutputEncoding;
    use crate::job::RunOptions;
    use crate::progress::LogEventExtractor;
    use crate::settings::{
        JsonFileStore, KeyValueStore, PdfTranslateSettings, SettingsRepository, PDF_SECTION,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::tempdir;

    // ============================================
    // Settings -> babeldoc command line
    // ============================================

    #[test]
    fn stored_settings_drive_the_command_line() {
        let dir = tempdir().unwrap();
        let repo = SettingsRepository::new(JsonFileStore::new(dir.path().join("settings.json")));

        let mut settings = PdfTranslateSettings::default();
        settings.api_key = "sk-live".into();
        settings.model = "deepseek-chat".into();
        settings.advanced.insert("qps".into(), json!(4));
        settings.advanced.insert("noDual".into(), json!(true));
        settings.advanced.insert("skipClean".into(), json!(false));
        assert!(repo.save_pdf_settings(&settings));

        let tool = ToolConfig {
            babeldoc_program: "/opt/babeldoc/bin/babeldoc".into(),
            extra_search_paths: vec![PathBuf::from("/opt/babeldoc/bin")],
            output_encoding: OutputEncoding::Utf8,
            ..ToolConfig::default()
        };
        let options = RunOptions::from_settings(&repo.pdf_settings(), &tool);
        let spec = options.command_spec(Path::new("/docs/paper.pdf"));

        assert_eq!(spec.program, "/opt/babeldoc/bin/babeldoc");
        assert_eq!(spec.encoding, OutputEncoding::Utf8);
        assert_eq!(spec.flag_value("--openai-model"), Some("deepseek-chat"));
        assert_eq!(spec.flag_value("--qps"), Some("4"));
        assert_eq!(spec.flag_value("--files"), Some("/docs/paper.pdf"));
        assert_eq!(spec.flag_value("-o"), Some("/docs"));
        assert!(spec.args.contains(&"--no-dual".to_string()));
        assert!(!spec.args.contains(&"--skip-clean".to_string()));
        assert!(spec.extra_search_paths.ends_with(&[PathBuf::from("/opt/babeldoc/bin")]));
        assert!(!spec.display_line().contains("sk-live"));
    }

    #[test]
    fn mistyped_stored_fields_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        store.set(PDF_SECTION, json!({ "apiKey": "sk-1", "model": 42 }));

        let repo = SettingsRepository::new(store);
        let options = RunOptions::from_settings(&repo.pdf_settings(), &ToolConfig::default());
        assert!(options.has_api_key());
        assert_eq!(options.model, PdfTranslateSettings::default().model);
    }

    // ============================================
    // Bookmark cache persisted through JsonFileStore
    // ============================================

    struct Fixed;

    #[async_trait]
    impl BrowserAutomation for Fixed {
        async fn extract_links(&self, _url: &str, _wait: Duration) -> anyhow::Result<Vec<RawLink>> {
            Ok(vec![
                RawLink {
                    title: "Rust".into(),
                    url: "https://rust-lang.org".into(),
                },
                RawLink {
                    title: "Relative".into(),
                    url: "/about".into(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn bookmark_cache_survives_a_new_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let service = BookmarkService::new(Fixed, JsonFileStore::new(&path), &ToolConfig::default());
        let fetched = service.refresh().await.unwrap();
        assert_eq!(fetched.bookmarks.len(), 1);

        let reopened = JsonFileStore::new(&path);
        assert!(reopened.get(CACHE_KEY).is_some());
        let service = BookmarkService::new(Fixed, reopened, &ToolConfig::default());
        let cached = service.load_cached();
        assert!(!cached.stale);
        assert_eq!(cached.bookmarks, fetched.bookmarks);
        assert_eq!(cached.fetched_at, fetched.fetched_at);
    }

    // ============================================
    // Progress extraction over a recorded babeldoc log
    // ============================================

    #[test]
    fn recorded_log_produces_expected_statuses() {
        let log = [
            "INFO:babeldoc.main:Loading ONNX model...",
            "DEBUG:babeldoc.main:{'type': 'progress_update', 'stage': 'Parse PDF and Create Intermediate Representation', 'overall_progress': 1.04}",
            "INFO:babeldoc.translator:start to translate: paper.pdf",
            "{'type': 'progress_update', 'stage': 'Typesetting', 'overall_progress': 87.5}",
            "plain noise",
        ];
        let extractor = LogEventExtractor::new();
        let statuses: Vec<Option<String>> = log
            .iter()
            .map(|line| extractor.extract(line).and_then(|signal| signal.status))
            .collect();

        assert_eq!(
            statuses,
            vec![
                Some("Loading layout model...".to_string()),
                Some("Parse PDF and Create Intermediate Representation (1%)".to_string()),
                Some("Starting translation...".to_string()),
                Some("Typesetting (88%)".to_string()),
                None,
            ]
        );
    }
}
