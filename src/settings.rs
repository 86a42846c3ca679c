use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfpres";

/// Which part of a page the presentation window shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotesMode {
    /// Split pages that look like slide + notes side by side
    #[default]
    Guess,
    /// Always treat pages as slide + notes
    Show,
    /// Never split
    Hide,
}

impl NotesMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotesMode::Guess => "guess",
            NotesMode::Show => "show",
            NotesMode::Hide => "hide",
        }
    }

    /// Whether a page with the given split guess shows notes
    pub fn splits(&self, split_guess: bool) -> bool {
        match self {
            NotesMode::Guess => split_guess,
            NotesMode::Show => true,
            NotesMode::Hide => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Height in pixels every page is rendered at
    #[serde(default = "default_scale_to_height")]
    pub scale_to_height: u32,

    #[serde(default = "default_overview_columns")]
    pub overview_columns: usize,

    #[serde(default = "default_overview_rows")]
    pub overview_rows: usize,

    #[serde(default = "default_overview_page_width")]
    pub overview_page_width: u32,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default)]
    pub show_preview: bool,

    #[serde(default = "default_true")]
    pub show_console: bool,

    #[serde(default)]
    pub notes_mode: NotesMode,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_scale_to_height() -> u32 {
    768
}

fn default_overview_columns() -> usize {
    4
}

fn default_overview_rows() -> usize {
    3
}

fn default_overview_page_width() -> u32 {
    1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            scale_to_height: default_scale_to_height(),
            overview_columns: default_overview_columns(),
            overview_rows: default_overview_rows(),
            overview_page_width: default_overview_page_width(),
            cache_enabled: true,
            show_preview: false,
            show_console: true,
            notes_mode: NotesMode::default(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load the user's settings, creating the file with defaults when missing.
pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        if let Some(settings) = load_settings_from_path(&path) {
            if let Ok(mut global) = SETTINGS.write() {
                *global = settings;
            }
        }
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

/// Parse a settings file, migrating (and rewriting) it when it is older
/// than [`CURRENT_VERSION`].
pub fn load_settings_from_path(path: &Path) -> Option<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            return None;
        }
    };

    match serde_yaml::from_str::<Settings>(&content) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");
            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                save_settings_to_file(&settings, path);
            }
            Some(settings)
        }
        Err(e) => {
            error!("Failed to parse settings file {path:?}: {e}");
            None
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Version-specific fixups run here, oldest first

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    match fs::write(path, generate_settings_yaml(settings)) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("\n# Pixel height pages are rendered and cached at\n");
    content.push_str(&format!("scale_to_height: {}\n", settings.scale_to_height));
    content.push_str("\n# Overview grid\n");
    content.push_str(&format!("overview_columns: {}\n", settings.overview_columns));
    content.push_str(&format!("overview_rows: {}\n", settings.overview_rows));
    content.push_str(&format!(
        "overview_page_width: {}\n",
        settings.overview_page_width
    ));
    content.push_str("\n# Compress pages in the background\n");
    content.push_str(&format!("cache_enabled: {}\n", settings.cache_enabled));
    content.push_str("\n# Console window\n");
    content.push_str(&format!("show_preview: {}\n", settings.show_preview));
    content.push_str(&format!("show_console: {}\n", settings.show_console));
    content.push_str("\n# guess | show | hide\n");
    content.push_str(&format!("notes_mode: {}\n", settings.notes_mode.as_str()));

    content
}

/// Snapshot of the current settings
pub fn get_settings() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generated_yaml_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            scale_to_height: 1080,
            overview_columns: 5,
            cache_enabled: false,
            notes_mode: NotesMode::Hide,
            ..Settings::default()
        };

        save_settings_to_file(&settings, &path);

        assert_eq!(load_settings_from_path(&path), Some(settings));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 1\nshow_preview: true\n").unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert!(settings.show_preview);
        assert_eq!(settings.scale_to_height, 768);
        assert_eq!(settings.overview_rows, 3);
        assert_eq!(settings.notes_mode, NotesMode::Guess);
    }

    #[test]
    fn old_files_are_migrated_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\noverview_page_width: 800\n").unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.overview_page_width, 800);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with(&format!("version: {CURRENT_VERSION}\n")));
    }

    #[test]
    fn broken_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "notes_mode: sideways\n").unwrap();

        assert_eq!(load_settings_from_path(&path), None);
    }

    #[test]
    fn notes_mode_decides_split() {
        assert!(NotesMode::Guess.splits(true));
        assert!(!NotesMode::Guess.splits(false));
        assert!(NotesMode::Show.splits(false));
        assert!(!NotesMode::Hide.splits(true));
    }
}
