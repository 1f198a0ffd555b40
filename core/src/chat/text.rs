use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use super::{ChatClient, ChatError, ChatRequest};
use crate::settings::TextTranslateSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Chinese,
    Other,
}

/// What happens with a finished translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslateMode {
    #[default]
    Show,
    /// Copy to the clipboard; incoming text is translated immediately.
    Copy,
}

/// Incoming text is translated unasked only in copy mode with a key set.
pub fn auto_translates(settings: &TextTranslateSettings) -> bool {
    settings.mode == TranslateMode::Copy && !settings.api_key.trim().is_empty()
}

/// Last text seen on the clipboard, so refocusing the window neither repeats
/// a translation nor translates the translation that was just copied.
#[derive(Debug, Default)]
pub struct ClipboardWatch {
    last: Mutex<Option<String>>,
}

impl ClipboardWatch {
    /// Trimmed text when it is non-empty and differs from the last seen.
    pub fn accept(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(text) {
            return None;
        }
        *last = Some(text.to_string());
        Some(text.to_string())
    }

    pub fn remember(&self, text: &str) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.trim().to_string());
    }
}

/// Text handed over on the command line: arguments that are neither flags
/// nor PDF paths, joined by spaces.
pub fn launch_text<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let words: Vec<String> = args
        .into_iter()
        .map(|arg| arg.as_ref().trim().to_string())
        .filter(|arg| !arg.is_empty() && !arg.starts_with('-'))
        .filter(|arg| !arg.to_ascii_lowercase().ends_with(".pdf"))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Any CJK unified ideograph in the common block counts as Chinese.
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|ch| ('\u{4e00}'..='\u{9fa5}').contains(&ch)) {
        Language::Chinese
    } else {
        Language::Other
    }
}

/// Chinese goes to English, everything else to Chinese.
pub fn target_language(text: &str) -> &'static str {
    match detect_language(text) {
        Language::Chinese => "English",
        Language::Other => "Chinese",
    }
}

pub fn user_prompt(text: &str) -> String {
    format!(
        "Translate the following text to {}. Only return the translation, no explanations:\n\n{}",
        target_language(text),
        text
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTranslation {
    pub translation: String,
    pub target_language: String,
    pub mode: TranslateMode,
}

pub struct TextTranslator {
    client: ChatClient,
}

impl Default for TextTranslator {
    fn default() -> Self {
        Self::new(ChatClient::new())
    }
}

impl TextTranslator {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    pub async fn translate(
        &self,
        settings: &TextTranslateSettings,
        text: &str,
    ) -> Result<TextTranslation, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if settings.api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }

        let target = target_language(text);
        debug!("translating {} chars to {}", text.chars().count(), target);
        let request = ChatRequest {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            system: settings.prompt.clone(),
            user: user_prompt(text),
        };
        let translation = self.client.complete(&request).await?;

        Ok(TextTranslation {
            translation,
            target_language: target.to_string(),
            mode: settings.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn detects_chinese_anywhere() {
        assert_eq!(detect_language("hello 世界"), Language::Chinese);
        assert_eq!(detect_language("hello world"), Language::Other);
        assert_eq!(detect_language("こんにちは"), Language::Other);
    }

    #[test]
    fn picks_opposite_target() {
        assert_eq!(target_language("你好"), "English");
        assert_eq!(target_language("Bonjour"), "Chinese");
    }

    #[test]
    fn prompt_wraps_text() {
        assert_eq!(
            user_prompt("Hi"),
            "Translate the following text to Chinese. Only return the translation, no explanations:\n\nHi"
        );
    }

    #[test]
    fn only_copy_mode_with_a_key_translates_unasked() {
        let mut settings = TextTranslateSettings {
            api_key: "sk-test".into(),
            mode: TranslateMode::Copy,
            ..TextTranslateSettings::default()
        };
        assert!(auto_translates(&settings));

        settings.api_key = "  ".into();
        assert!(!auto_translates(&settings));

        settings.api_key = "sk-test".into();
        settings.mode = TranslateMode::Show;
        assert!(!auto_translates(&settings));
    }

    #[test]
    fn clipboard_watch_skips_repeats_and_own_output() {
        let watch = ClipboardWatch::default();
        assert_eq!(watch.accept("  "), None);
        assert_eq!(watch.accept(" hello \n"), Some("hello".to_string()));
        assert_eq!(watch.accept("hello"), None);

        watch.remember("你好");
        assert_eq!(watch.accept("你好"), None);
        assert_eq!(watch.accept("hello"), Some("hello".to_string()));
    }

    #[test]
    fn launch_text_ignores_flags_and_pdfs() {
        assert_eq!(launch_text(Vec::<String>::new()), None);
        assert_eq!(launch_text(["--flag", "/docs/Paper.PDF"]), None);
        assert_eq!(
            launch_text(["good", "--verbose", "morning", "a.pdf"]),
            Some("good morning".to_string())
        );
    }

    #[tokio::test]
    async fn rejects_blank_text_and_key() {
        let translator = TextTranslator::default();
        let settings = TextTranslateSettings::default();
        assert!(matches!(
            translator.translate(&settings, "   ").await,
            Err(ChatError::EmptyInput)
        ));
        assert!(matches!(
            translator.translate(&settings, "hello").await,
            Err(ChatError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn translates_through_chat_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Translate the following text to English."))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Hello" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = TextTranslateSettings {
            api_key: "sk-test".into(),
            base_url: server.uri(),
            mode: TranslateMode::Copy,
            ..TextTranslateSettings::default()
        };
        let result = TextTranslator::default()
            .translate(&settings, "你好")
            .await
            .unwrap();
        assert_eq!(
            result,
            TextTranslation {
                translation: "Hello".into(),
                target_language: "English".into(),
                mode: TranslateMode::Copy,
            }
        );
    }
}
