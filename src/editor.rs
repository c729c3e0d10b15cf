//! Line editor orchestrator
//!
//! `LineReader` owns the configuration, the history and the default
//! completer, and runs one editing session per `read_line` call. The
//! session itself is a state machine fed decoded key events; terminal
//! I/O stays at the edges so the dispatch logic is plain data-in,
//! data-out and can be driven by scripted events in tests.

use std::any::Any;
use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::rc::Rc;

use crate::buffer::EditBuffer;
use crate::complete::{Completer, Completion, CompletionEnv, FilenameCompleter};
use crate::config::{Color, EditorConfig};
use crate::history::History;
use crate::keys::{Key, KeyDecoder, KeyEvent, Mods};
use crate::render::{Frame, MenuView, PromptSpec, Renderer, SearchView};
use crate::term::{RawModeGuard, Result, Terminal, ESC_TIMEOUT};

/// Judges whether the buffer is complete when Enter is pressed in
/// multi-line mode; `false` turns Enter into a newline.
type InputCompleteHook = Box<dyn Fn(&str) -> bool>;

/// The line editor. One instance holds the process-wide pieces: the
/// configuration, the (optionally persisted) history and the default
/// completer. Editing calls block the calling thread; concurrent
/// sessions are not supported.
pub struct LineReader {
    config: EditorConfig,
    history: History,
    completer: Option<Box<dyn Completer>>,
    completer_arg: Option<Rc<dyn Any>>,
    input_complete: Option<InputCompleteHook>,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    /// A reader with defaults (and `~/.lineread.toml` overrides, if any).
    /// The initial completer completes filenames.
    pub fn new() -> Self {
        Self::with_config(EditorConfig::load())
    }

    pub fn with_config(config: EditorConfig) -> Self {
        Self {
            config,
            history: History::new(),
            completer: Some(Box::new(FilenameCompleter::default())),
            completer_arg: None,
            input_complete: None,
        }
    }

    /// Read one line of input, with editing when the terminal allows it.
    ///
    /// Returns `None` on Ctrl-C, on Ctrl-D with an empty buffer, or on
    /// an I/O failure. On submit the text is also added to the history.
    pub fn read_line(&mut self, prompt_text: &str) -> Option<String> {
        // The default completer is taken out for the duration of the
        // session so it can borrow the reader's state freely.
        let mut completer = self.completer.take();
        let arg = self.completer_arg.clone();
        let result = match completer.as_deref_mut() {
            Some(c) => self.read_line_inner(prompt_text, c, arg),
            None => {
                let mut noop = |_: &mut CompletionEnv, _: &str| {};
                self.read_line_inner(prompt_text, &mut noop, arg)
            }
        };
        self.completer = completer;
        result
    }

    /// Read one line using `completer` for this call only. `arg` is
    /// surfaced to it through [`CompletionEnv::arg`]; the default
    /// completer's argument is not.
    pub fn read_line_with_completer(
        &mut self,
        prompt_text: &str,
        completer: &mut dyn Completer,
        arg: Option<Rc<dyn Any>>,
    ) -> Option<String> {
        self.read_line_inner(prompt_text, completer, arg)
    }

    fn read_line_inner(
        &mut self,
        prompt_text: &str,
        completer: &mut dyn Completer,
        arg: Option<Rc<dyn Any>>,
    ) -> Option<String> {
        if !Terminal::is_capable() {
            // No editing capability: plain verbatim read, no history
            return read_plain(io::stdin().lock());
        }
        match self.edit_session(prompt_text, completer, &arg) {
            Ok(Some(text)) => {
                self.history
                    .set_allow_duplicates(self.config.history_duplicates);
                self.history.add(&text);
                Some(text)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("session ended on I/O error: {}", e);
                None
            }
        }
    }

    /// Replace the default completer. Only one can be active; setting a
    /// new one drops the previous. `arg` is surfaced to the completer
    /// through [`CompletionEnv::arg`].
    pub fn set_default_completer(
        &mut self,
        completer: impl Completer + 'static,
        arg: Option<Rc<dyn Any>>,
    ) {
        self.completer = Some(Box::new(completer));
        self.completer_arg = arg;
    }

    /// Supply continuation logic for multi-line input: Enter submits
    /// only when the hook returns `true` for the current buffer.
    pub fn set_input_complete_hook(&mut self, hook: impl Fn(&str) -> bool + 'static) {
        self.input_complete = Some(Box::new(hook));
    }

    // --- history surface ---

    /// Configure history persistence and the entry bound.
    /// `None` keeps history in memory only; -1 selects the default bound.
    pub fn set_history(&mut self, path: Option<PathBuf>, max_entries: i64) {
        self.history.set_file(path, max_entries);
    }

    pub fn history_add(&mut self, entry: &str) {
        self.history
            .set_allow_duplicates(self.config.history_duplicates);
        self.history.add(entry);
    }

    /// Remove the entry added automatically by the last submit.
    pub fn history_remove_last(&mut self) {
        self.history.remove_last();
    }

    pub fn history_clear(&mut self) {
        self.history.clear();
    }

    // --- configuration surface ---

    pub fn set_prompt_marker(&mut self, marker: &str) {
        self.config.prompt_marker = marker.to_string();
    }

    pub fn set_prompt_color(&mut self, color: Color) {
        self.config.prompt_color = color;
    }

    pub fn enable_multiline(&mut self, enable: bool) {
        self.config.multiline = enable;
    }

    pub fn enable_beep(&mut self, enable: bool) {
        self.config.beep = enable;
    }

    pub fn enable_color(&mut self, enable: bool) {
        self.config.color = enable;
    }

    pub fn enable_history_duplicates(&mut self, enable: bool) {
        self.config.history_duplicates = enable;
    }

    pub fn enable_auto_tab(&mut self, enable: bool) {
        self.config.auto_tab = enable;
    }

    pub fn enable_completion_preview(&mut self, enable: bool) {
        self.config.completion_preview = enable;
    }

    pub fn set_iface_colors(&mut self, info: Color, diminish: Color, highlight: Color) {
        self.config.info_color = info;
        self.config.diminish_color = diminish;
        self.config.highlight_color = highlight;
    }

    // --- the interactive session ---

    fn edit_session(
        &mut self,
        prompt_text: &str,
        completer: &mut dyn Completer,
        arg: &Option<Rc<dyn Any>>,
    ) -> Result<Option<String>> {
        let mut term = Terminal::new();
        // Raw mode is restored on every exit path by the guard's Drop
        let _guard = RawModeGuard::enter()?;

        // Start on a fresh row if the cursor is mid-line
        if let Ok(Some(col)) = term.query_cursor_column() {
            if col > 1 {
                term.write("\r\n");
            }
        }
        term.enable_bracketed_paste();

        let prompt = PromptSpec {
            text: prompt_text.to_string(),
            marker: self.config.prompt_marker.clone(),
            color: self.config.prompt_color,
        };
        let mut renderer = Renderer::new(term.extent().0);
        let mut session = Session::new(&self.config, &mut self.history, &self.input_complete);

        let result = run_session(&mut session, &mut renderer, &mut term, &prompt, completer, arg);

        // Paste mode and the final cursor row are restored before any
        // loop error propagates
        let finished = renderer.finish(&mut term);
        term.disable_bracketed_paste();
        let flushed = term.flush();
        let outcome = result?;
        finished?;
        flushed?;
        Ok(outcome)
    }
}

/// Drive one session until submit, cancel or a write error. Terminal
/// cleanup is the caller's, so it also runs when this returns `Err`.
fn run_session(
    session: &mut Session,
    renderer: &mut Renderer,
    term: &mut Terminal,
    prompt: &PromptSpec,
    completer: &mut dyn Completer,
    arg: &Option<Rc<dyn Any>>,
) -> Result<Option<String>> {
    let mut decoder = KeyDecoder::new();
    let mut queued: VecDeque<KeyEvent> = VecDeque::new();
    loop {
        session.redraw(renderer, term, prompt)?;
        if session.take_beep() {
            term.beep()?;
        }
        let ev = match next_event(term, &mut decoder, &mut queued) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::debug!("read failed: {}", e);
                return Ok(None);
            }
        };
        session.handle(ev, completer, arg);
        match session.state {
            SessionState::Submitted => return Ok(Some(session.buffer.text())),
            SessionState::Cancelled => return Ok(None),
            _ => {}
        }
    }
}

/// Read one line verbatim from a non-capable stream.
///
/// No decoding, rendering, completion or history; invalid UTF-8 is
/// replaced rather than failing the read.
fn read_plain<R: BufRead>(mut input: R) -> Option<String> {
    let mut bytes = Vec::new();
    match input.read_until(b'\n', &mut bytes) {
        Ok(0) => None,
        Ok(_) => {
            if bytes.last() == Some(&b'\n') {
                bytes.pop();
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
            }
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) => {
            tracing::debug!("plain read failed: {}", e);
            None
        }
    }
}

/// Pull the next decoded event, bounding escape-sequence lookahead with
/// the read timeout. Paste bodies are exempt from the timeout so a slow
/// terminal cannot split one in half.
fn next_event(
    term: &mut Terminal,
    decoder: &mut KeyDecoder,
    queued: &mut VecDeque<KeyEvent>,
) -> Result<KeyEvent> {
    if let Some(ev) = queued.pop_front() {
        return Ok(ev);
    }
    loop {
        let byte = term.read_byte()?;
        if let Some(ev) = decoder.push(byte) {
            queued.extend(decoder.take_queued());
            return Ok(ev);
        }
        while decoder.is_pending() {
            let next = if decoder.is_pasting() {
                Some(term.read_byte()?)
            } else {
                term.read_byte_timeout(ESC_TIMEOUT)?
            };
            match next {
                Some(byte) => {
                    if let Some(ev) = decoder.push(byte) {
                        queued.extend(decoder.take_queued());
                        return Ok(ev);
                    }
                }
                None => {
                    let mut events = decoder.take_pending();
                    if events.is_empty() {
                        break;
                    }
                    let first = events.remove(0);
                    queued.extend(events);
                    return Ok(first);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Reading,
    ShowingCompletions,
    SearchingHistory,
    Submitted,
    Cancelled,
}

/// Completion menu state for one Tab interaction
struct MenuState {
    candidates: Vec<Completion>,
    selected: Option<usize>,
}

/// Incremental reverse-search state
struct SearchState {
    query: String,
    /// How many matches to skip (Ctrl-R steps further back)
    skip: usize,
}

/// One editing session: the buffer plus all transient interaction state.
/// Key handling mutates this and nothing else, so tests can drive it
/// with scripted events.
struct Session<'a> {
    config: &'a EditorConfig,
    history: &'a mut History,
    input_complete: &'a Option<InputCompleteHook>,
    buffer: EditBuffer,
    state: SessionState,
    menu: Option<MenuState>,
    search: Option<SearchState>,
    /// History recall position and the stashed live buffer
    nav: Option<(usize, String)>,
    beep_pending: bool,
    invalidate_pending: bool,
}

impl<'a> Session<'a> {
    fn new(
        config: &'a EditorConfig,
        history: &'a mut History,
        input_complete: &'a Option<InputCompleteHook>,
    ) -> Self {
        Self {
            config,
            history,
            input_complete,
            buffer: EditBuffer::new(),
            state: SessionState::Reading,
            menu: None,
            search: None,
            nav: None,
            beep_pending: false,
            invalidate_pending: false,
        }
    }

    fn take_beep(&mut self) -> bool {
        let b = self.beep_pending && self.config.beep;
        self.beep_pending = false;
        b
    }

    fn redraw(
        &mut self,
        renderer: &mut Renderer,
        term: &mut Terminal,
        prompt: &PromptSpec,
    ) -> Result<()> {
        if self.invalidate_pending {
            renderer.invalidate();
            self.invalidate_pending = false;
        }
        let preview = self.preview();
        let current_hit = self.search.as_ref().map(|s| {
            let hit = self
                .history
                .search(&s.query)
                .nth(s.skip)
                .map(|m| (m.entry, m.span));
            (s.query.clone(), hit)
        });
        let frame = Frame {
            prompt,
            buffer: &self.buffer,
            preview: preview.as_deref(),
            menu: self.menu.as_ref().map(|m| MenuView {
                candidates: &m.candidates,
                selected: m.selected,
            }),
            search: current_hit.as_ref().map(|(query, hit)| SearchView {
                query,
                hit: hit.clone(),
            }),
            config: self.config,
            color_enabled: self.config.color,
        };
        renderer.redraw(term, &frame)
    }

    /// Dimmed suffix of the selected candidate beyond what is typed.
    fn preview(&self) -> Option<String> {
        if !self.config.completion_preview {
            return None;
        }
        let menu = self.menu.as_ref()?;
        let cand = &menu.candidates[menu.selected?];
        let text = self.buffer.text();
        let cursor = self.buffer.cursor_offset();
        // Delete counts are clamped to the edges but may still land
        // mid-codepoint; no preview for such a candidate
        let start = cursor - cand.delete_before;
        if !text.is_char_boundary(start) {
            return None;
        }
        let typed = &text[start..cursor];
        let suffix = cand.replacement.strip_prefix(typed)?;
        if suffix.is_empty() {
            None
        } else {
            Some(suffix.to_string())
        }
    }

    fn handle(&mut self, ev: KeyEvent, completer: &mut dyn Completer, arg: &Option<Rc<dyn Any>>) {
        if self.search.is_some() {
            self.handle_search(ev);
            return;
        }

        // History recall position survives only consecutive Up/Down
        if !matches!(ev.key, Key::Up | Key::Down | Key::Unknown) {
            self.nav = None;
        }
        // Typing runs coalesce for undo; anything else breaks the run
        if !matches!(ev.key, Key::Char(_)) {
            self.buffer.break_undo_coalescing();
        }

        // An open menu consumes its own keys; everything else closes it
        if self.menu.is_some() {
            match ev.key {
                Key::Tab if ev.mods.is_empty() => {
                    self.menu_step(1);
                    return;
                }
                Key::Tab if ev.mods == Mods::SHIFT => {
                    self.menu_step(-1);
                    return;
                }
                Key::Enter if ev.mods.is_empty() => {
                    self.confirm_selected();
                    return;
                }
                Key::Down => {
                    self.menu_step(1);
                    return;
                }
                Key::Up => {
                    self.menu_step(-1);
                    return;
                }
                Key::PageDown => {
                    self.menu_step(10);
                    return;
                }
                Key::PageUp => {
                    self.menu_step(-10);
                    return;
                }
                Key::Esc => {
                    self.close_menu();
                    return;
                }
                _ => self.close_menu(),
            }
        }

        match (ev.key, ev.mods) {
            (Key::Char(c), m) if m.is_empty() || m == Mods::SHIFT => {
                self.buffer.insert_char(c);
            }
            (Key::Char('b'), m) if m == Mods::ALT => self.buffer.move_word_left(),
            (Key::Char('f'), m) if m == Mods::ALT => self.buffer.move_word_right(),
            (Key::Paste(text), _) => self.buffer.insert_str(&text),
            (Key::Enter, m) if m == Mods::ALT => self.insert_newline(),
            (Key::Ctrl('j'), _) => self.insert_newline(),
            (Key::Enter, _) => self.submit_or_continue(),
            (Key::Tab, m) if m.is_empty() => self.start_completion(completer, arg),
            (Key::Ctrl('c'), _) => self.state = SessionState::Cancelled,
            (Key::Ctrl('d'), _) => {
                if self.buffer.is_empty() {
                    self.state = SessionState::Cancelled;
                } else if !self.buffer.delete_char_at() {
                    self.beep_pending = true;
                }
            }
            (Key::Backspace, _) => {
                if !self.buffer.delete_char_before() {
                    self.beep_pending = true;
                }
            }
            (Key::Delete, _) => {
                if !self.buffer.delete_char_at() {
                    self.beep_pending = true;
                }
            }
            (Key::Left, m) if m.intersects(Mods::CTRL | Mods::ALT) => self.buffer.move_word_left(),
            (Key::Right, m) if m.intersects(Mods::CTRL | Mods::ALT) => {
                self.buffer.move_word_right()
            }
            (Key::Left, _) | (Key::Ctrl('b'), _) => {
                self.buffer.move_left();
            }
            (Key::Right, _) | (Key::Ctrl('f'), _) => {
                self.buffer.move_right();
            }
            (Key::Home, _) | (Key::Ctrl('a'), _) => self.buffer.move_line_start(),
            (Key::End, _) | (Key::Ctrl('e'), _) => self.buffer.move_line_end(),
            (Key::PageUp, _) => self.buffer.move_buffer_start(),
            (Key::PageDown, _) => self.buffer.move_buffer_end(),
            (Key::Up, _) => self.move_up_or_recall(),
            (Key::Down, _) => self.move_down_or_recall(),
            (Key::Ctrl('k'), _) => {
                self.buffer.kill_to_line_end();
            }
            (Key::Ctrl('u'), _) => {
                self.buffer.kill_to_line_start();
            }
            (Key::Ctrl('w'), _) => {
                self.buffer.delete_word_before();
            }
            (Key::Ctrl('z'), _) => {
                if !self.buffer.undo() {
                    self.beep_pending = true;
                }
            }
            (Key::Ctrl('y'), _) => {
                if !self.buffer.redo() {
                    self.beep_pending = true;
                }
            }
            (Key::Ctrl('l'), _) => self.invalidate_pending = true,
            (Key::Ctrl('r'), _) => {
                self.search = Some(SearchState {
                    query: String::new(),
                    skip: 0,
                });
                self.state = SessionState::SearchingHistory;
            }
            (Key::Esc, _) | (Key::Unknown, _) => {}
            _ => {}
        }
    }

    fn insert_newline(&mut self) {
        if self.config.multiline {
            self.buffer.insert_newline();
        } else {
            self.submit_or_continue();
        }
    }

    fn submit_or_continue(&mut self) {
        if self.config.multiline {
            if let Some(hook) = self.input_complete {
                if !hook(&self.buffer.text()) {
                    self.buffer.insert_newline();
                    return;
                }
            }
        }
        self.state = SessionState::Submitted;
    }

    fn move_up_or_recall(&mut self) {
        if self.buffer.move_up() {
            return;
        }
        let target = match self.nav {
            None if !self.history.is_empty() => {
                Some((self.history.len() - 1, self.buffer.text()))
            }
            Some((0, _)) => None,
            Some((i, ref stash)) => Some((i - 1, stash.clone())),
            None => None,
        };
        match target {
            Some((index, stash)) => {
                if let Some(entry) = self.history.get(index) {
                    let entry = entry.to_string();
                    self.buffer.set_text(&entry);
                    self.nav = Some((index, stash));
                }
            }
            None => self.beep_pending = true,
        }
    }

    fn move_down_or_recall(&mut self) {
        if self.buffer.move_down() {
            return;
        }
        match self.nav.take() {
            Some((index, stash)) => {
                if index + 1 < self.history.len() {
                    if let Some(entry) = self.history.get(index + 1) {
                        let entry = entry.to_string();
                        self.buffer.set_text(&entry);
                        self.nav = Some((index + 1, stash));
                    }
                } else {
                    // Past the newest entry: restore the stashed line
                    self.buffer.set_text(&stash);
                }
            }
            None => self.beep_pending = true,
        }
    }

    // --- completion menu ---

    fn start_completion(&mut self, completer: &mut dyn Completer, arg: &Option<Rc<dyn Any>>) {
        let text = self.buffer.text();
        let cursor = self.buffer.cursor_offset();
        let mut env = CompletionEnv::new(text.clone(), cursor, arg.clone());
        let prefix = text[..cursor].to_string();
        completer.complete(&mut env, &prefix);
        let candidates = env.into_completions();

        match candidates.len() {
            0 => self.beep_pending = true,
            1 if self.config.auto_tab => {
                // A singleton expands in place; the menu never shows
                self.apply(&candidates[0]);
            }
            1 => {
                self.menu = Some(MenuState {
                    candidates,
                    selected: Some(0),
                });
                self.state = SessionState::ShowingCompletions;
            }
            _ => {
                self.menu = Some(MenuState {
                    candidates,
                    selected: None,
                });
                self.state = SessionState::ShowingCompletions;
            }
        }
    }

    fn menu_step(&mut self, delta: isize) {
        let Some(ref mut menu) = self.menu else {
            return;
        };
        let len = menu.candidates.len() as isize;
        let current = menu.selected.map(|s| s as isize).unwrap_or(-1);
        let next = (current + delta).rem_euclid(len);
        menu.selected = Some(next as usize);
    }

    fn confirm_selected(&mut self) {
        if let Some(menu) = self.menu.take() {
            if let Some(index) = menu.selected {
                let cand = menu.candidates[index].clone();
                self.apply(&cand);
            }
        }
        self.state = SessionState::Reading;
    }

    fn close_menu(&mut self) {
        self.menu = None;
        self.state = SessionState::Reading;
    }

    fn apply(&mut self, cand: &Completion) {
        self.buffer.delete_range(cand.delete_before, cand.delete_after);
        self.buffer.insert_str(&cand.replacement);
        self.menu = None;
        self.state = SessionState::Reading;
    }

    // --- incremental reverse search ---

    fn handle_search(&mut self, ev: KeyEvent) {
        let Some(ref mut search) = self.search else {
            return;
        };
        match (ev.key, ev.mods) {
            (Key::Char(c), m) if m.is_empty() || m == Mods::SHIFT => {
                search.query.push(c);
                search.skip = 0;
            }
            (Key::Backspace, _) => {
                search.query.pop();
                search.skip = 0;
            }
            (Key::Ctrl('r'), _) => {
                // Step to the next-older match, if there is one
                let further = self
                    .history
                    .search(&search.query)
                    .nth(search.skip + 1)
                    .is_some();
                if further {
                    search.skip += 1;
                } else {
                    self.beep_pending = true;
                }
            }
            (Key::Ctrl('c'), _) => {
                self.search = None;
                self.state = SessionState::Cancelled;
            }
            (Key::Esc, _) | (Key::Ctrl('g'), _) => {
                // Abandon the search, buffer untouched
                self.search = None;
                self.state = SessionState::Reading;
            }
            (Key::Enter, _) | (Key::Left, _) | (Key::Right, _) | (Key::Up, _) | (Key::Down, _) => {
                self.accept_search();
            }
            _ => {}
        }
    }

    fn accept_search(&mut self) {
        if let Some(search) = self.search.take() {
            let hit = self
                .history
                .search(&search.query)
                .nth(search.skip)
                .map(|m| m.entry.to_string());
            if let Some(entry) = hit {
                self.buffer.set_text(&entry);
            }
        }
        self.state = SessionState::Reading;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(key: Key) -> KeyEvent {
        KeyEvent::plain(key)
    }

    fn type_str(session: &mut Session, completer: &mut dyn Completer, text: &str) {
        for c in text.chars() {
            session.handle(plain(Key::Char(c)), completer, &None);
        }
    }

    fn noop() -> impl Completer {
        |_: &mut CompletionEnv, _: &str| {}
    }

    /// Offers "hello" and "help" for prefixes of them.
    fn two_candidates() -> impl Completer {
        |env: &mut CompletionEnv, prefix: &str| {
            for word in ["hello", "help"] {
                if crate::util::starts_with(word, prefix) {
                    env.add_completion(word, word);
                }
            }
        }
    }

    #[test]
    fn test_typing_and_submit() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "hi there");
        session.handle(plain(Key::Enter), &mut c, &None);
        assert_eq!(session.state, SessionState::Submitted);
        assert_eq!(session.buffer.text(), "hi there");
    }

    #[test]
    fn test_cancel_leaves_history_unchanged() {
        let config = EditorConfig::default();
        let mut history = History::new();
        history.add("earlier");
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "half typed");
        session.handle(plain(Key::Ctrl('c')), &mut c, &None);
        assert_eq!(session.state, SessionState::Cancelled);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_ctrl_d_empty_cancels_nonempty_deletes() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "ab");
        session.handle(plain(Key::Home), &mut c, &None);
        session.handle(plain(Key::Ctrl('d')), &mut c, &None);
        assert_eq!(session.buffer.text(), "b");
        assert_eq!(session.state, SessionState::Reading);

        session.handle(plain(Key::Ctrl('d')), &mut c, &None);
        assert!(session.buffer.is_empty());
        session.handle(plain(Key::Ctrl('d')), &mut c, &None);
        assert_eq!(session.state, SessionState::Cancelled);
    }

    #[test]
    fn test_multiline_enter_vs_alt_enter() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "line one");
        session.handle(KeyEvent { key: Key::Enter, mods: Mods::ALT }, &mut c, &None);
        type_str(&mut session, &mut c, "line two");
        assert_eq!(session.buffer.text(), "line one\nline two");
        session.handle(plain(Key::Enter), &mut c, &None);
        assert_eq!(session.state, SessionState::Submitted);
    }

    #[test]
    fn test_continuation_hook_turns_enter_into_newline() {
        let config = EditorConfig::default();
        let mut history = History::new();
        // Input is complete only when it ends with ';'
        let hook: Option<InputCompleteHook> = Some(Box::new(|text: &str| text.ends_with(';')));
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "select 1");
        session.handle(plain(Key::Enter), &mut c, &None);
        assert_eq!(session.state, SessionState::Reading);
        assert_eq!(session.buffer.line_count(), 2);
        type_str(&mut session, &mut c, "from t;");
        session.handle(plain(Key::Enter), &mut c, &None);
        assert_eq!(session.state, SessionState::Submitted);
    }

    #[test]
    fn test_completion_menu_lists_multiple() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = two_candidates();
        type_str(&mut session, &mut c, "hel");
        session.handle(plain(Key::Tab), &mut c, &None);
        assert_eq!(session.state, SessionState::ShowingCompletions);
        let menu = session.menu.as_ref().unwrap();
        assert_eq!(menu.candidates.len(), 2);
        assert_eq!(menu.selected, None);

        // Tab navigates, Enter confirms
        session.handle(plain(Key::Tab), &mut c, &None);
        session.handle(plain(Key::Tab), &mut c, &None);
        assert_eq!(session.menu.as_ref().unwrap().selected, Some(1));
        session.handle(plain(Key::Enter), &mut c, &None);
        assert_eq!(session.buffer.text(), "help");
        assert_eq!(session.state, SessionState::Reading);
    }

    #[test]
    fn test_auto_tab_expands_singleton_only() {
        // Auto-tab on: a singleton candidate inserts without a menu,
        // while multiple candidates still open the menu.
        let mut config = EditorConfig::default();
        config.auto_tab = true;
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = two_candidates();
        type_str(&mut session, &mut c, "hell");
        session.handle(plain(Key::Tab), &mut c, &None);
        assert_eq!(session.buffer.text(), "hello");
        assert!(session.menu.is_none());

        let mut session = Session::new(&config, &mut history, &hook);
        type_str(&mut session, &mut c, "hel");
        session.handle(plain(Key::Tab), &mut c, &None);
        assert!(session.menu.is_some());
        assert_eq!(session.state, SessionState::ShowingCompletions);
    }

    #[test]
    fn test_singleton_without_auto_tab_lists_with_preview() {
        let config = EditorConfig::default();
        assert!(!config.auto_tab);
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = two_candidates();
        type_str(&mut session, &mut c, "hell");
        session.handle(plain(Key::Tab), &mut c, &None);
        // Listed for confirmation, selected so the preview can show
        let menu = session.menu.as_ref().unwrap();
        assert_eq!(menu.candidates.len(), 1);
        assert_eq!(menu.selected, Some(0));
        assert_eq!(session.preview().as_deref(), Some("o"));
        assert_eq!(session.buffer.text(), "hell");
    }

    #[test]
    fn test_preview_skips_mid_codepoint_delete_count() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        // delete_before of 1 lands inside the 3-byte codepoint
        let mut c = |env: &mut CompletionEnv, _: &str| {
            env.add_completion_ex("cand", "candidate", 1, 0);
        };
        type_str(&mut session, &mut c, "\u{3042}");
        session.handle(plain(Key::Tab), &mut c, &None);
        assert!(session.menu.is_some());
        assert_eq!(session.preview(), None);
    }

    #[test]
    fn test_completer_arg_reaches_env() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = |env: &mut CompletionEnv, _: &str| {
            if let Some(n) = env.arg().and_then(|a| a.downcast_ref::<u32>()) {
                let word = format!("item{}", n);
                env.add_completion(&word, &word);
            }
        };
        let arg: Option<Rc<dyn Any>> = Some(Rc::new(7u32));
        session.handle(plain(Key::Tab), &mut c, &arg);
        session.handle(plain(Key::Enter), &mut c, &arg);
        assert_eq!(session.buffer.text(), "item7");
    }

    #[test]
    fn test_zero_candidates_beeps() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = two_candidates();
        type_str(&mut session, &mut c, "xyz");
        session.handle(plain(Key::Tab), &mut c, &None);
        assert!(session.menu.is_none());
        assert!(session.take_beep());
    }

    #[test]
    fn test_typing_dismisses_menu() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = two_candidates();
        type_str(&mut session, &mut c, "hel");
        session.handle(plain(Key::Tab), &mut c, &None);
        assert!(session.menu.is_some());
        session.handle(plain(Key::Char('p')), &mut c, &None);
        assert!(session.menu.is_none());
        assert_eq!(session.buffer.text(), "help");
    }

    #[test]
    fn test_history_recall_up_down() {
        let config = EditorConfig::default();
        let mut history = History::new();
        history.add("first");
        history.add("second");
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "live");
        session.handle(plain(Key::Up), &mut c, &None);
        assert_eq!(session.buffer.text(), "second");
        session.handle(plain(Key::Up), &mut c, &None);
        assert_eq!(session.buffer.text(), "first");
        session.handle(plain(Key::Down), &mut c, &None);
        assert_eq!(session.buffer.text(), "second");
        // Walking past the newest restores the stashed live line
        session.handle(plain(Key::Down), &mut c, &None);
        assert_eq!(session.buffer.text(), "live");
    }

    #[test]
    fn test_up_moves_within_multiline_before_recall() {
        let config = EditorConfig::default();
        let mut history = History::new();
        history.add("old entry");
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "one");
        session.handle(KeyEvent { key: Key::Enter, mods: Mods::ALT }, &mut c, &None);
        type_str(&mut session, &mut c, "two");
        session.handle(plain(Key::Up), &mut c, &None);
        // Still the live buffer: the cursor just moved to the first line
        assert_eq!(session.buffer.text(), "one\ntwo");
        assert_eq!(session.buffer.cursor().0, 0);
        session.handle(plain(Key::Up), &mut c, &None);
        assert_eq!(session.buffer.text(), "old entry");
    }

    #[test]
    fn test_reverse_search_flow() {
        let config = EditorConfig::default();
        let mut history = History::new();
        history.add("grep alpha");
        history.add("make build");
        history.add("grep beta");
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        session.handle(plain(Key::Ctrl('r')), &mut c, &None);
        assert_eq!(session.state, SessionState::SearchingHistory);
        type_str(&mut session, &mut c, "grep");
        // Newest match first; another Ctrl-R steps older
        session.handle(plain(Key::Ctrl('r')), &mut c, &None);
        session.handle(plain(Key::Enter), &mut c, &None);
        assert_eq!(session.buffer.text(), "grep alpha");
        assert_eq!(session.state, SessionState::Reading);
    }

    #[test]
    fn test_reverse_search_escape_keeps_buffer() {
        let config = EditorConfig::default();
        let mut history = History::new();
        history.add("something");
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "typed");
        session.handle(plain(Key::Ctrl('r')), &mut c, &None);
        type_str(&mut session, &mut c, "some");
        session.handle(plain(Key::Esc), &mut c, &None);
        assert_eq!(session.buffer.text(), "typed");
        assert_eq!(session.state, SessionState::Reading);
    }

    #[test]
    fn test_undo_redo_binding() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        type_str(&mut session, &mut c, "abc");
        session.handle(plain(Key::Ctrl('z')), &mut c, &None);
        assert_eq!(session.buffer.text(), "");
        session.handle(plain(Key::Ctrl('y')), &mut c, &None);
        assert_eq!(session.buffer.text(), "abc");
    }

    #[test]
    fn test_paste_is_one_edit() {
        let config = EditorConfig::default();
        let mut history = History::new();
        let hook = None;
        let mut session = Session::new(&config, &mut history, &hook);
        let mut c = noop();
        session.handle(
            plain(Key::Paste("pasted\ntext".to_string())),
            &mut c,
            &None,
        );
        assert_eq!(session.buffer.text(), "pasted\ntext");
        session.handle(plain(Key::Ctrl('z')), &mut c, &None);
        assert_eq!(session.buffer.text(), "");
    }

    #[test]
    fn test_read_plain_verbatim() {
        use std::io::Cursor;
        assert_eq!(
            read_plain(Cursor::new(b"just a line\nrest".to_vec())),
            Some("just a line".to_string())
        );
        assert_eq!(
            read_plain(Cursor::new(b"crlf line\r\n".to_vec())),
            Some("crlf line".to_string())
        );
        // Tabs and escape bytes pass through untouched
        assert_eq!(
            read_plain(Cursor::new(b"a\tb\x1b[c\n".to_vec())),
            Some("a\tb\x1b[c".to_string())
        );
        // EOF without data
        assert_eq!(read_plain(Cursor::new(Vec::new())), None);
        // EOF terminated final line still returned
        assert_eq!(
            read_plain(Cursor::new(b"no newline".to_vec())),
            Some("no newline".to_string())
        );
    }
}
