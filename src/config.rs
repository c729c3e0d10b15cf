//! Configuration for the line editor.
//!
//! This module provides:
//! - The `EditorConfig` that every session reads at start
//! - The ANSI `Color` palette used for the prompt and interface elements
//! - Optional TOML defaults loaded from `~/.lineread.toml`
//!
//! # Configuration File
//!
//! All settings have setter methods on [`LineReader`](crate::LineReader);
//! the optional file only changes the defaults:
//!
//! ```toml
//! # ~/.lineread.toml
//! multiline = true
//! beep = false
//! color = true
//! prompt_color = "green"
//!
//! [history]
//! duplicates = false
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// ANSI foreground colors.
///
/// The numeric values are the standard SGR foreground codes: 30-37 for
/// the normal range, 90-97 for the bright range and 39 for the terminal
/// default. `None` suppresses styling for that element entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Color {
    /// No color code emitted at all
    None,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
    /// The terminal's default foreground (SGR 39)
    Default,
}

impl Color {
    /// The SGR foreground code, or `None` for [`Color::None`].
    pub(crate) fn sgr(self) -> Option<u8> {
        match self {
            Color::None => None,
            Color::Black => Some(30),
            Color::Red => Some(31),
            Color::Green => Some(32),
            Color::Yellow => Some(33),
            Color::Blue => Some(34),
            Color::Magenta => Some(35),
            Color::Cyan => Some(36),
            Color::White => Some(37),
            Color::BrightBlack => Some(90),
            Color::BrightRed => Some(91),
            Color::BrightGreen => Some(92),
            Color::BrightYellow => Some(93),
            Color::BrightBlue => Some(94),
            Color::BrightMagenta => Some(95),
            Color::BrightCyan => Some(96),
            Color::BrightWhite => Some(97),
            Color::Default => Some(39),
        }
    }
}

/// Session configuration, read at each `read_line` call.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Marker appended to the prompt text ("> " by default)
    pub prompt_marker: String,
    /// Color for the prompt text and marker
    pub prompt_color: Color,
    /// Allow multi-line input (Alt-Enter / Ctrl-J inserts a newline)
    pub multiline: bool,
    /// Beep on failed completion
    pub beep: bool,
    /// Emit color codes at all
    pub color: bool,
    /// Keep consecutive duplicate history entries
    pub history_duplicates: bool,
    /// Auto-insert a completion when it is the only candidate
    pub auto_tab: bool,
    /// Show an inline preview of the selected completion
    pub completion_preview: bool,
    /// Color for interface info (completion menu numbers)
    pub info_color: Color,
    /// Color for de-emphasized text (completion preview, search misses)
    pub diminish_color: Color,
    /// Color for emphasized text (search match span, menu selection)
    pub highlight_color: Color,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            prompt_marker: "> ".to_string(),
            prompt_color: Color::Default,
            multiline: true,
            beep: true,
            color: true,
            history_duplicates: false,
            auto_tab: false,
            completion_preview: true,
            info_color: Color::BrightBlack,
            diminish_color: Color::White,
            highlight_color: Color::BrightWhite,
        }
    }
}

impl EditorConfig {
    /// Defaults, with overrides applied from `~/.lineread.toml` if present.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Some(path) = Self::config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    match toml::from_str::<FileConfig>(&content) {
                        Ok(file) => file.apply(&mut config),
                        Err(e) => tracing::debug!("ignoring bad config file: {}", e),
                    }
                }
            }
        }
        config
    }

    fn config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".lineread.toml"))
    }
}

/// On-disk override set; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    prompt_marker: Option<String>,
    prompt_color: Option<Color>,
    multiline: Option<bool>,
    beep: Option<bool>,
    color: Option<bool>,
    auto_tab: Option<bool>,
    completion_preview: Option<bool>,
    history: HistoryFileConfig,
    colors: ColorFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryFileConfig {
    duplicates: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ColorFileConfig {
    info: Option<Color>,
    diminish: Option<Color>,
    highlight: Option<Color>,
}

impl FileConfig {
    fn apply(self, config: &mut EditorConfig) {
        if let Some(v) = self.prompt_marker {
            config.prompt_marker = v;
        }
        if let Some(v) = self.prompt_color {
            config.prompt_color = v;
        }
        if let Some(v) = self.multiline {
            config.multiline = v;
        }
        if let Some(v) = self.beep {
            config.beep = v;
        }
        if let Some(v) = self.color {
            config.color = v;
        }
        if let Some(v) = self.auto_tab {
            config.auto_tab = v;
        }
        if let Some(v) = self.completion_preview {
            config.completion_preview = v;
        }
        if let Some(v) = self.history.duplicates {
            config.history_duplicates = v;
        }
        if let Some(v) = self.colors.info {
            config.info_color = v;
        }
        if let Some(v) = self.colors.diminish {
            config.diminish_color = v;
        }
        if let Some(v) = self.colors.highlight {
            config.highlight_color = v;
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_codes() {
        assert_eq!(Color::Black.sgr(), Some(30));
        assert_eq!(Color::White.sgr(), Some(37));
        assert_eq!(Color::BrightBlack.sgr(), Some(90));
        assert_eq!(Color::BrightWhite.sgr(), Some(97));
        assert_eq!(Color::Default.sgr(), Some(39));
        assert_eq!(Color::None.sgr(), None);
    }

    #[test]
    fn test_file_overrides() {
        let file: FileConfig = toml::from_str(
            r#"
            multiline = false
            prompt_color = "bright-green"

            [colors]
            info = "cyan"
            "#,
        )
        .unwrap();
        let mut config = EditorConfig::default();
        file.apply(&mut config);
        assert!(!config.multiline);
        assert_eq!(config.prompt_color, Color::BrightGreen);
        assert_eq!(config.info_color, Color::Cyan);
        // Untouched fields keep their defaults
        assert!(config.completion_preview);
    }
}
