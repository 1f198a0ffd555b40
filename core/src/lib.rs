pub mod bookmarks;
pub mod chat;
pub mod color;
pub mod config;
pub mod encoding;
pub mod files;
pub mod job;
pub mod process;
pub mod progress;
pub mod settings;
mod time;

#[cfg(test)]
mod integration_tests;

pub use bookmarks::{
    filter_by_title, Bookmark, BookmarkError, BookmarkService, BookmarkView, BrowserAutomation,
    PlaywrightBrowser,
};
pub use chat::{
    auto_translates, launch_text, ChatClient, ChatError, ClipboardWatch, TextTranslation,
    TextTranslator, TranslateMode,
};
pub use config::{app_config_dir, ToolConfig};
pub use encoding::OutputEncoding;
pub use files::{os_info, OsInfo};
pub use job::{
    BatchError, BatchEvent, BatchEventSink, BatchRunner, JobError, JobStatus, RunOptions,
    RunSummary, TranslationJob, RUN_FINISHED_MESSAGE,
};
pub use process::{ProcessRunner, TokioProcessRunner};
pub use progress::{LogEventExtractor, LogSignal};
pub use settings::{
    ConfigFile, JsonFileStore, KeyValueStore, PdfTranslateSettings, SettingsError,
    SettingsRepository, TextTranslateSettings,
};
pub use time::{format_millis_local, now_millis};
