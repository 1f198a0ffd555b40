use std::path::PathBuf;
use std::sync::Arc;

use babel_toolbox_core::bookmarks::{filter_by_title, Bookmark, BookmarkService, BookmarkView};
use babel_toolbox_core::config::{app_config_dir, ToolConfig, CONFIG_FILE};
use babel_toolbox_core::files::{self, OsInfo};
use babel_toolbox_core::job::{BatchEvent, BatchRunner, RunOptions, RunSummary, TranslationJob};
use babel_toolbox_core::settings::{
    ConfigFile, JsonFileStore, PdfTranslateSettings, SettingsRepository, TextTranslateSettings,
    BABELDOC_CONFIG_FILE, SETTINGS_FILE,
};
use babel_toolbox_core::{
    auto_translates, color, format_millis_local, launch_text, ClipboardWatch, PlaywrightBrowser,
    TextTranslation, TextTranslator, TokioProcessRunner, TranslateMode, RUN_FINISHED_MESSAGE,
};
use log::{debug, info, warn, LevelFilter};
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State, WindowEvent};
use tauri_plugin_clipboard_manager::ClipboardExt;
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_opener::OpenerExt;

pub mod event_names {
    pub const TRANSLATION_PROGRESS: &str = "translation-progress";
    pub const TRANSLATION_NOTICE: &str = "translation-notice";
    pub const TEXT_TRANSLATION: &str = "text-translation";
}

const DARKEN_AMOUNT: f64 = 0.1;

struct AppState {
    batch: Arc<BatchRunner<TokioProcessRunner>>,
    settings: SettingsRepository<JsonFileStore>,
    babeldoc_config: ConfigFile,
    tool: ToolConfig,
    bookmarks: BookmarkService<PlaywrightBrowser, JsonFileStore>,
    translator: TextTranslator,
    clipboard_watch: ClipboardWatch,
}

impl AppState {
    fn load(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join(CONFIG_FILE);
        let tool = ToolConfig::load_or_default(&config_path);
        if !config_path.exists() {
            if let Err(error) = tool.save(&config_path) {
                warn!("failed to write default {}: {}", config_path.display(), error);
            }
        }

        let browser = PlaywrightBrowser::new(
            tool.node_program.clone(),
            config_dir.join("scripts").join("extract-links.js"),
        );
        let bookmarks = BookmarkService::new(
            browser,
            JsonFileStore::new(config_dir.join(babel_toolbox_core::bookmarks::CACHE_FILE)),
            &tool,
        );

        Self {
            batch: Arc::new(BatchRunner::new(TokioProcessRunner::new())),
            settings: SettingsRepository::new(JsonFileStore::new(config_dir.join(SETTINGS_FILE))),
            babeldoc_config: ConfigFile::new(config_dir.join(BABELDOC_CONFIG_FILE)),
            tool,
            bookmarks,
            translator: TextTranslator::default(),
            clipboard_watch: ClipboardWatch::default(),
        }
    }
}

fn emit<T: Serialize + Clone>(app: &AppHandle, event: &str, payload: T) {
    if let Err(error) = app.emit(event, payload) {
        warn!("failed to emit {}: {}", event, error);
    }
}

// ============================================
// PDF translation
// ============================================

#[tauri::command]
fn add_files(state: State<'_, AppState>, paths: Vec<String>) -> Vec<TranslationJob> {
    state.batch.add_files(paths)
}

#[tauri::command]
async fn pick_pdf_files(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<Vec<TranslationJob>, String> {
    let Some(picked) = app
        .dialog()
        .file()
        .add_filter("PDF", &["pdf"])
        .blocking_pick_files()
    else {
        return Ok(Vec::new());
    };

    let mut paths = Vec::with_capacity(picked.len());
    for file in picked {
        paths.push(file.into_path().map_err(|error| error.to_string())?);
    }
    Ok(state.batch.add_files(paths))
}

#[tauri::command]
fn remove_file(state: State<'_, AppState>, id: String) -> Result<TranslationJob, String> {
    state.batch.remove_job(&id).map_err(|error| error.to_string())
}

#[tauri::command]
fn list_files(state: State<'_, AppState>) -> Vec<TranslationJob> {
    state.batch.jobs()
}

#[tauri::command]
async fn start_translation(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<RunSummary, String> {
    let options = RunOptions::from_settings(&state.settings.pdf_settings(), &state.tool);
    let sink_app = app.clone();
    let sink = move |event: BatchEvent| emit(&sink_app, event_names::TRANSLATION_PROGRESS, event);

    let summary = state
        .batch
        .run(options, &sink)
        .await
        .map_err(|error| error.to_string())?;
    emit(&app, event_names::TRANSLATION_NOTICE, RUN_FINISHED_MESSAGE);
    Ok(summary)
}

#[tauri::command]
fn stop_translation(state: State<'_, AppState>) -> bool {
    state.batch.stop()
}

#[tauri::command]
fn get_transcript(state: State<'_, AppState>) -> Vec<String> {
    state.batch.transcript()
}

#[tauri::command]
fn open_output_folder(state: State<'_, AppState>, id: String) -> Result<(), String> {
    let job = state
        .batch
        .jobs()
        .into_iter()
        .find(|job| job.id() == id)
        .ok_or_else(|| format!("job not found: {id}"))?;
    files::open_path(&job.output_dir().to_string_lossy()).map_err(|error| error.to_string())
}

// ============================================
// Settings
// ============================================

#[tauri::command]
fn get_pdf_settings(state: State<'_, AppState>) -> PdfTranslateSettings {
    state.settings.pdf_settings()
}

#[tauri::command]
fn save_pdf_settings(
    state: State<'_, AppState>,
    settings: PdfTranslateSettings,
) -> Result<(), String> {
    if state.settings.save_pdf_settings(&settings) {
        Ok(())
    } else {
        Err("Failed to save settings".into())
    }
}

#[tauri::command]
fn get_text_settings(state: State<'_, AppState>) -> TextTranslateSettings {
    state.settings.text_settings()
}

#[tauri::command]
fn save_text_settings(
    state: State<'_, AppState>,
    settings: TextTranslateSettings,
) -> Result<(), String> {
    if state.settings.save_text_settings(&settings) {
        Ok(())
    } else {
        Err("Failed to save settings".into())
    }
}

#[tauri::command]
fn read_babeldoc_config(state: State<'_, AppState>) -> String {
    state.babeldoc_config.read()
}

#[tauri::command]
fn write_babeldoc_config(state: State<'_, AppState>, content: String) -> Result<String, String> {
    state
        .babeldoc_config
        .write(&content)
        .map(|path| path.to_string_lossy().to_string())
        .map_err(|error| error.to_string())
}

#[tauri::command]
async fn export_settings(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<Option<String>, String> {
    let Some(target) = app
        .dialog()
        .file()
        .set_file_name("babel-toolbox-settings.json")
        .add_filter("Settings", &["json", "yaml", "yml"])
        .blocking_save_file()
    else {
        return Ok(None);
    };
    let target = target.into_path().map_err(|error| error.to_string())?;
    state
        .settings
        .store()
        .export_to(&target)
        .map_err(|error| error.to_string())?;
    Ok(Some(target.to_string_lossy().to_string()))
}

#[tauri::command]
async fn import_settings(app: AppHandle, state: State<'_, AppState>) -> Result<usize, String> {
    let Some(source) = app
        .dialog()
        .file()
        .add_filter("Settings", &["json", "yaml", "yml"])
        .blocking_pick_file()
    else {
        return Ok(0);
    };
    let source = source.into_path().map_err(|error| error.to_string())?;
    state
        .settings
        .store()
        .import_from(&source)
        .map_err(|error| error.to_string())
}

// ============================================
// Text translation
// ============================================

async fn translate_and_deliver(
    app: &AppHandle,
    state: &AppState,
    text: &str,
) -> Result<TextTranslation, String> {
    let settings = state.settings.text_settings();
    let result = state
        .translator
        .translate(&settings, text)
        .await
        .map_err(|error| error.to_string())?;
    if result.mode == TranslateMode::Copy {
        app.clipboard()
            .write_text(result.translation.clone())
            .map_err(|error| error.to_string())?;
    }
    Ok(result)
}

#[tauri::command]
async fn translate_text(
    app: AppHandle,
    state: State<'_, AppState>,
    text: String,
) -> Result<TextTranslation, String> {
    translate_and_deliver(&app, &state, &text).await
}

/// Translate whatever text is on the clipboard.
#[tauri::command]
async fn translate_clipboard(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<TextTranslation, String> {
    let text = app
        .clipboard()
        .read_text()
        .map_err(|error| error.to_string())?;
    translate_and_deliver(&app, &state, &text).await
}

/// A translation made without the user asking for it.
#[derive(Debug, Clone, Serialize)]
struct AutoTranslation {
    source: String,
    result: TextTranslation,
}

/// Copy mode: translate `text` unless it was just handled, copy the result
/// and show it in the text tab.
async fn auto_translate(app: AppHandle, text: String) {
    let state = app.state::<AppState>();
    if !auto_translates(&state.settings.text_settings()) {
        return;
    }
    let Some(source) = state.clipboard_watch.accept(&text) else {
        return;
    };
    match translate_and_deliver(&app, &state, &source).await {
        Ok(result) => {
            state.clipboard_watch.remember(&result.translation);
            emit(
                &app,
                event_names::TEXT_TRANSLATION,
                AutoTranslation { source, result },
            );
        }
        Err(error) => warn!("automatic translation failed: {}", error),
    }
}

fn auto_translate_clipboard(app: &AppHandle) {
    let text = match app.clipboard().read_text() {
        Ok(text) => text,
        Err(error) => {
            debug!("clipboard has no text: {}", error);
            return;
        }
    };
    tauri::async_runtime::spawn(auto_translate(app.clone(), text));
}

// ============================================
// Bookmarks
// ============================================

#[tauri::command]
fn load_bookmarks(state: State<'_, AppState>) -> BookmarkView {
    let view = state.bookmarks.load_cached();
    if let Some(label) = view.fetched_at.and_then(format_millis_local) {
        info!(
            "showing {} cached bookmark(s) from {}{}",
            view.bookmarks.len(),
            label,
            if view.stale { " (stale)" } else { "" }
        );
    }
    view
}

#[tauri::command]
async fn refresh_bookmarks(state: State<'_, AppState>) -> Result<BookmarkView, String> {
    state
        .bookmarks
        .refresh()
        .await
        .map_err(|error| error.to_string())
}

#[tauri::command]
fn search_bookmarks(state: State<'_, AppState>, query: String) -> Vec<Bookmark> {
    let view = state.bookmarks.load_cached();
    filter_by_title(&view.bookmarks, &query)
        .into_iter()
        .cloned()
        .collect()
}

#[tauri::command]
fn open_bookmark(app: AppHandle, url: String) -> Result<(), String> {
    app.opener()
        .open_url(url, None::<&str>)
        .map_err(|error| error.to_string())
}

// ============================================
// Helpers
// ============================================

#[tauri::command]
fn darken_color(color: String) -> Result<String, String> {
    color::darken(&color, DARKEN_AMOUNT).map_err(|error| error.to_string())
}

#[tauri::command]
fn get_os_info() -> OsInfo {
    files::os_info()
}

#[tauri::command]
fn write_text_file(text: String) -> Result<String, String> {
    files::write_text_file(&text)
        .map(|path| path.to_string_lossy().to_string())
        .map_err(|error| error.to_string())
}

#[tauri::command]
fn write_image_file(data_url: String) -> Result<String, String> {
    files::write_image_data_url(&data_url)
        .map(|path| path.to_string_lossy().to_string())
        .map_err(|error| error.to_string())
}

#[tauri::command]
fn read_text_file(path: String) -> Result<String, String> {
    files::read_file(&PathBuf::from(path)).map_err(|error| error.to_string())
}

fn launch_args() -> Vec<String> {
    std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().to_string())
        .collect()
}

/// PDFs the app was opened with.
fn launch_pdfs() -> Vec<PathBuf> {
    std::env::args_os()
        .skip(1)
        .map(PathBuf::from)
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::<tauri::Wry>::default()
        .plugin(
            tauri_plugin_log::Builder::default()
                .level(if cfg!(debug_assertions) {
                    LevelFilter::Debug
                } else {
                    LevelFilter::Info
                })
                .build(),
        )
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_clipboard_manager::init())
        .setup(|app| {
            let config_dir = app_config_dir()
                .or_else(|| app.path().app_config_dir().ok())
                .ok_or("no configuration directory is available on this system")?;
            info!("using config directory {}", config_dir.display());

            let state = AppState::load(config_dir);
            let opened = state.batch.add_files(launch_pdfs());
            if !opened.is_empty() {
                info!("queued {} file(s) from launch arguments", opened.len());
            }
            app.manage(state);

            if let Some(text) = launch_text(launch_args()) {
                tauri::async_runtime::spawn(auto_translate(app.handle().clone(), text));
            }
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Focused(true) = event {
                auto_translate_clipboard(window.app_handle());
            }
        })
        .invoke_handler(tauri::generate_handler![
            add_files,
            pick_pdf_files,
            remove_file,
            list_files,
            start_translation,
            stop_translation,
            get_transcript,
            open_output_folder,
            get_pdf_settings,
            save_pdf_settings,
            get_text_settings,
            save_text_settings,
            read_babeldoc_config,
            write_babeldoc_config,
            export_settings,
            import_settings,
            translate_text,
            translate_clipboard,
            load_bookmarks,
            refresh_bookmarks,
            search_bookmarks,
            open_bookmark,
            darken_color,
            get_os_info,
            write_text_file,
            write_image_file,
            read_text_file
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
