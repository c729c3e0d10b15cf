//! lineread - An embeddable line editor for terminal programs
//!
//! lineread reads a line of input with interactive editing, completion
//! and history, as a plain function call. It needs no global setup and
//! no callbacks for ordinary use; a REPL calls [`LineReader::read_line`]
//! in a loop and gets `Some(line)` per submit or `None` on Ctrl-C,
//! Ctrl-D or end of input.
//!
//! # Features
//!
//! - **Multi-line editing**: Alt-Enter inserts a newline; Up/Down move
//!   within the buffer before recalling history
//! - **UTF-8 aware**: wide glyphs and multi-byte codepoints edit and
//!   render correctly, including at wrap boundaries
//! - **Completion**: Tab opens a menu of candidates from a pluggable
//!   completer, with quote/escape handling and filename completion
//!   built in
//! - **History**: bounded, optionally persisted to a file, with Ctrl-R
//!   incremental reverse search
//! - **Undo/redo**: Ctrl-Z / Ctrl-Y, with typing runs coalesced
//! - **Graceful fallback**: a dumb terminal or redirected input degrades
//!   to a plain verbatim read
//!
//! # Quick Start
//!
//! ```no_run
//! let mut reader = lineread::LineReader::new();
//! reader.set_history(Some("history.txt".into()), -1);
//! while let Some(line) = reader.read_line("calc") {
//!     println!("you typed: {}", line);
//! }
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Left/Right, Ctrl-B/F | Move by character |
//! | Ctrl-Left/Right, Alt-B/F | Move by word |
//! | Home/End, Ctrl-A/E | Start/end of line |
//! | Up/Down | Move by line, then recall history |
//! | Tab | Complete; repeat to navigate the menu |
//! | Ctrl-R | Incremental history search |
//! | Alt-Enter, Ctrl-J | Insert a newline |
//! | Ctrl-K/U | Kill to end/start of line |
//! | Ctrl-W | Delete word before the cursor |
//! | Ctrl-Z / Ctrl-Y | Undo / redo |
//! | Ctrl-L | Repaint |
//! | Ctrl-C | Cancel the line |
//! | Ctrl-D | Delete at cursor, or end input when empty |

mod buffer;
mod complete;
mod config;
mod editor;
mod history;
mod keys;
mod render;
mod term;
mod util;

pub use buffer::{EditBuffer, DEFAULT_NON_WORD};
pub use complete::{
    complete_filename, complete_quoted_word, complete_word, Completer, Completion, CompletionEnv,
    FilenameCompleter,
};
pub use config::{Color, EditorConfig};
pub use editor::LineReader;
pub use history::{History, SearchMatch};
