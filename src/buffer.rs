//! Multi-line edit buffer
//!
//! Owns the text being edited, the cursor and the undo history. Content
//! is a list of lines that is valid UTF-8 after every mutation, and the
//! cursor byte offset always lands on a codepoint boundary: all motion
//! and editing goes through the boundary-stepping helpers in `util`.

use unicode_width::UnicodeWidthChar;

use crate::util;

/// Characters that end a word for cursor motion and completion
pub const DEFAULT_NON_WORD: &str = " \t\r\n";

/// One undo record: the full buffer state before a mutation.
///
/// Snapshots are cheap at interactive-input sizes and make the inverse
/// of any edit trivially correct.
#[derive(Debug, Clone)]
struct Snapshot {
    lines: Vec<String>,
    row: usize,
    col: usize,
}

/// What the last mutation was, for coalescing single-char typing runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastEdit {
    None,
    InsertChar,
    Other,
}

pub struct EditBuffer {
    /// Lines of text, always at least one (possibly empty)
    lines: Vec<String>,
    /// Cursor line index
    row: usize,
    /// Cursor byte offset within `lines[row]`
    col: usize,
    /// Preferred display column for vertical motion
    goal_col: Option<usize>,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    last_edit: LastEdit,
    non_word: String,
}

impl Default for EditBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EditBuffer {
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
            goal_col: None,
            undo: Vec::new(),
            redo: Vec::new(),
            last_edit: LastEdit::None,
            non_word: DEFAULT_NON_WORD.to_string(),
        }
    }

    /// The whole buffer joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Replace the whole buffer (history recall). Cursor moves to the end.
    pub fn set_text(&mut self, text: &str) {
        self.push_undo(LastEdit::Other);
        self.lines = text.split('\n').map(str::to_string).collect();
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.row = self.lines.len() - 1;
        self.col = self.lines[self.row].len();
        self.goal_col = None;
    }

    pub fn is_empty(&self) -> bool {
        self.lines.len() == 1 && self.lines[0].is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, row: usize) -> &str {
        &self.lines[row]
    }

    /// Cursor as (line, byte offset within that line).
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Cursor as a byte offset into `text()`.
    pub fn cursor_offset(&self) -> usize {
        let mut off = 0;
        for line in &self.lines[..self.row] {
            off += line.len() + 1; // the '\n'
        }
        off + self.col
    }

    /// Total byte length of `text()`.
    pub fn len(&self) -> usize {
        self.lines.iter().map(|l| l.len()).sum::<usize>() + self.lines.len() - 1
    }

    fn set_cursor_offset(&mut self, offset: usize) {
        let mut remaining = offset;
        for (i, line) in self.lines.iter().enumerate() {
            if remaining <= line.len() {
                self.row = i;
                self.col = util::floor_char_boundary(line, remaining);
                return;
            }
            remaining -= line.len() + 1;
        }
        self.row = self.lines.len() - 1;
        self.col = self.lines[self.row].len();
    }

    /// Override the non-word character set used for word motion.
    pub fn set_non_word_chars(&mut self, chars: &str) {
        self.non_word = chars.to_string();
    }

    fn is_word_char(&self, c: char) -> bool {
        !self.non_word.contains(c)
    }

    // --- undo ---

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            lines: self.lines.clone(),
            row: self.row,
            col: self.col,
        }
    }

    fn restore(&mut self, snap: Snapshot) {
        self.lines = snap.lines;
        self.row = snap.row;
        self.col = snap.col;
        self.goal_col = None;
    }

    /// Push an undo record unless this edit coalesces with the last one.
    fn push_undo(&mut self, kind: LastEdit) {
        let coalesce = kind == LastEdit::InsertChar && self.last_edit == LastEdit::InsertChar;
        if !coalesce {
            self.undo.push(self.snapshot());
        }
        self.redo.clear();
        self.last_edit = kind;
    }

    pub fn undo(&mut self) -> bool {
        match self.undo.pop() {
            Some(snap) => {
                self.redo.push(self.snapshot());
                self.restore(snap);
                self.last_edit = LastEdit::None;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(snap) => {
                self.undo.push(self.snapshot());
                self.restore(snap);
                self.last_edit = LastEdit::None;
                true
            }
            None => false,
        }
    }

    // --- editing ---

    pub fn insert_char(&mut self, c: char) {
        if c == '\n' {
            self.insert_newline();
            return;
        }
        self.push_undo(LastEdit::InsertChar);
        self.lines[self.row].insert(self.col, c);
        self.col += c.len_utf8();
        self.goal_col = None;
    }

    pub fn insert_newline(&mut self) {
        self.push_undo(LastEdit::Other);
        let rest = self.lines[self.row].split_off(self.col);
        self.lines.insert(self.row + 1, rest);
        self.row += 1;
        self.col = 0;
        self.goal_col = None;
    }

    /// Insert text at the cursor. Input is sanitized first so the buffer
    /// stays valid even for pasted content.
    pub fn insert_str(&mut self, text: &str) {
        let clean = util::sanitize(text);
        if clean.is_empty() {
            return;
        }
        self.push_undo(LastEdit::Other);
        let mut parts = clean.split('\n');
        let first = parts.next().unwrap_or("");
        self.lines[self.row].insert_str(self.col, first);
        self.col += first.len();
        for part in parts {
            let rest = self.lines[self.row].split_off(self.col);
            self.row += 1;
            self.lines.insert(self.row, format!("{}{}", part, rest));
            self.col = part.len();
        }
        self.goal_col = None;
    }

    /// Delete `before` bytes before the cursor and `after` bytes after it.
    ///
    /// Counts are clamped to the buffer edges and snapped outward to
    /// codepoint boundaries; line breaks within the range collapse.
    pub fn delete_range(&mut self, before: usize, after: usize) {
        if before == 0 && after == 0 {
            return;
        }
        let text = self.text();
        let offset = self.cursor_offset();
        let start = util::floor_char_boundary(&text, offset.saturating_sub(before));
        let mut end = (offset + after).min(text.len());
        end = util::floor_char_boundary(&text, end);
        if start == end {
            return;
        }
        self.push_undo(LastEdit::Other);
        let mut new_text = String::with_capacity(text.len());
        new_text.push_str(&text[..start]);
        new_text.push_str(&text[end..]);
        self.lines = new_text.split('\n').map(str::to_string).collect();
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.set_cursor_offset(start);
        self.goal_col = None;
    }

    /// Backspace: delete one codepoint before the cursor, joining lines
    /// at a line start.
    pub fn delete_char_before(&mut self) -> bool {
        if let Some(prev) = util::prev_char(&self.lines[self.row], self.col) {
            self.push_undo(LastEdit::Other);
            self.lines[self.row].replace_range(prev..self.col, "");
            self.col = prev;
            self.goal_col = None;
            true
        } else if self.row > 0 {
            self.push_undo(LastEdit::Other);
            let tail = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.lines[self.row].len();
            self.lines[self.row].push_str(&tail);
            self.goal_col = None;
            true
        } else {
            false
        }
    }

    /// Delete one codepoint at the cursor, joining lines at a line end.
    pub fn delete_char_at(&mut self) -> bool {
        if let Some(next) = util::next_char(&self.lines[self.row], self.col) {
            self.push_undo(LastEdit::Other);
            self.lines[self.row].replace_range(self.col..next, "");
            self.goal_col = None;
            true
        } else if self.row + 1 < self.lines.len() {
            self.push_undo(LastEdit::Other);
            let tail = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&tail);
            self.goal_col = None;
            true
        } else {
            false
        }
    }

    /// Delete the word before the cursor (Ctrl-W).
    pub fn delete_word_before(&mut self) -> bool {
        let target = self.word_left_pos();
        if target == (self.row, self.col) {
            return false;
        }
        let here = self.cursor_offset();
        let (trow, tcol) = target;
        let there = {
            let mut off = 0;
            for line in &self.lines[..trow] {
                off += line.len() + 1;
            }
            off + tcol
        };
        self.delete_range(here - there, 0);
        true
    }

    /// Delete from the cursor to the end of the line (Ctrl-K).
    pub fn kill_to_line_end(&mut self) -> bool {
        let rest = self.lines[self.row].len() - self.col;
        if rest == 0 && self.row + 1 == self.lines.len() {
            return false;
        }
        if rest == 0 {
            // At line end: pull the next line up
            return self.delete_char_at();
        }
        self.push_undo(LastEdit::Other);
        self.lines[self.row].truncate(self.col);
        self.goal_col = None;
        true
    }

    /// Delete from the start of the line to the cursor (Ctrl-U).
    pub fn kill_to_line_start(&mut self) -> bool {
        if self.col == 0 {
            return false;
        }
        self.push_undo(LastEdit::Other);
        self.lines[self.row].replace_range(..self.col, "");
        self.col = 0;
        self.goal_col = None;
        true
    }

    // --- motion ---

    pub fn move_left(&mut self) -> bool {
        self.goal_col = None;
        if let Some(prev) = util::prev_char(&self.lines[self.row], self.col) {
            self.col = prev;
            true
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.lines[self.row].len();
            true
        } else {
            false
        }
    }

    pub fn move_right(&mut self) -> bool {
        self.goal_col = None;
        if let Some(next) = util::next_char(&self.lines[self.row], self.col) {
            self.col = next;
            true
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
            true
        } else {
            false
        }
    }

    fn word_left_pos(&self) -> (usize, usize) {
        let (mut row, mut col) = (self.row, self.col);
        // Skip non-word characters, then the word itself
        loop {
            let prev = match util::prev_char(&self.lines[row], col) {
                Some(p) => p,
                None if row > 0 => {
                    row -= 1;
                    col = self.lines[row].len();
                    continue;
                }
                None => return (row, col),
            };
            let c = self.lines[row][prev..].chars().next().unwrap_or(' ');
            if self.is_word_char(c) {
                break;
            }
            col = prev;
        }
        while let Some(prev) = util::prev_char(&self.lines[row], col) {
            let c = self.lines[row][prev..].chars().next().unwrap_or(' ');
            if !self.is_word_char(c) {
                break;
            }
            col = prev;
        }
        (row, col)
    }

    pub fn move_word_left(&mut self) {
        let (row, col) = self.word_left_pos();
        self.row = row;
        self.col = col;
        self.goal_col = None;
    }

    pub fn move_word_right(&mut self) {
        self.goal_col = None;
        // Skip non-word characters, then the word itself
        loop {
            match util::next_char(&self.lines[self.row], self.col) {
                Some(_) => {
                    let c = self.lines[self.row][self.col..].chars().next().unwrap();
                    if self.is_word_char(c) {
                        break;
                    }
                    self.col = util::next_char(&self.lines[self.row], self.col).unwrap();
                }
                None if self.row + 1 < self.lines.len() => {
                    self.row += 1;
                    self.col = 0;
                }
                None => return,
            }
        }
        while let Some(next) = util::next_char(&self.lines[self.row], self.col) {
            let c = self.lines[self.row][self.col..].chars().next().unwrap();
            if !self.is_word_char(c) {
                break;
            }
            self.col = next;
        }
    }

    pub fn move_line_start(&mut self) {
        self.col = 0;
        self.goal_col = None;
    }

    pub fn move_line_end(&mut self) {
        self.col = self.lines[self.row].len();
        self.goal_col = None;
    }

    pub fn move_buffer_start(&mut self) {
        self.row = 0;
        self.col = 0;
        self.goal_col = None;
    }

    pub fn move_buffer_end(&mut self) {
        self.row = self.lines.len() - 1;
        self.col = self.lines[self.row].len();
        self.goal_col = None;
    }

    /// Display width of the line content up to `col`.
    fn display_col(&self, row: usize, col: usize) -> usize {
        self.lines[row][..col]
            .chars()
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }

    /// Byte offset in `lines[row]` closest to display column `goal`.
    fn col_for_display(&self, row: usize, goal: usize) -> usize {
        let mut width = 0;
        for (i, c) in self.lines[row].char_indices() {
            if width >= goal {
                return i;
            }
            width += c.width().unwrap_or(0);
        }
        self.lines[row].len()
    }

    /// Move up one line, keeping the display column. Returns false at the
    /// top so the editor can recall history instead.
    pub fn move_up(&mut self) -> bool {
        if self.row == 0 {
            return false;
        }
        let goal = self
            .goal_col
            .unwrap_or_else(|| self.display_col(self.row, self.col));
        self.row -= 1;
        self.col = self.col_for_display(self.row, goal);
        self.goal_col = Some(goal);
        true
    }

    /// Move down one line, keeping the display column.
    pub fn move_down(&mut self) -> bool {
        if self.row + 1 >= self.lines.len() {
            return false;
        }
        let goal = self
            .goal_col
            .unwrap_or_else(|| self.display_col(self.row, self.col));
        self.row += 1;
        self.col = self.col_for_display(self.row, goal);
        self.goal_col = Some(goal);
        true
    }

    /// Mark a break in typing so the next insert starts a new undo unit.
    pub fn break_undo_coalescing(&mut self) {
        self.last_edit = LastEdit::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_with(text: &str) -> EditBuffer {
        let mut b = EditBuffer::new();
        b.insert_str(text);
        b
    }

    #[test]
    fn test_insert_then_delete_restores_empty() {
        let texts = ["hello", "héllo wörld", "日本語テスト", "mixed 混ぜ emoji 🎉"];
        for t in texts {
            let mut b = EditBuffer::new();
            b.insert_str(t);
            assert_eq!(b.text(), t);
            b.delete_range(t.len(), 0);
            assert!(b.is_empty());
            assert_eq!(b.cursor(), (0, 0));
        }
    }

    #[test]
    fn test_cursor_always_on_boundary() {
        let mut b = buf_with("aあbい cう\nxyzzy 日本");
        // A scripted mix of motions and edits; after each step the cursor
        // must sit on a codepoint boundary.
        let steps: Vec<Box<dyn Fn(&mut EditBuffer)>> = vec![
            Box::new(|b| {
                b.move_left();
            }),
            Box::new(|b| {
                b.move_word_left();
            }),
            Box::new(|b| b.insert_char('ö')),
            Box::new(|b| {
                b.move_up();
            }),
            Box::new(|b| {
                b.delete_char_before();
            }),
            Box::new(|b| b.move_word_right()),
            Box::new(|b| {
                b.delete_range(3, 2);
            }),
            Box::new(|b| {
                b.move_down();
            }),
            Box::new(|b| {
                b.move_right();
            }),
            Box::new(|b| {
                b.undo();
            }),
        ];
        for step in steps {
            step(&mut b);
            let (row, col) = b.cursor();
            assert!(b.line(row).is_char_boundary(col));
            let off = b.cursor_offset();
            assert!(off <= b.len());
        }
    }

    #[test]
    fn test_multiline_insert_and_join() {
        let mut b = EditBuffer::new();
        b.insert_str("one\ntwo");
        assert_eq!(b.line_count(), 2);
        assert_eq!(b.cursor(), (1, 3));
        b.move_line_start();
        b.delete_char_before(); // joins the lines
        assert_eq!(b.text(), "onetwo");
        assert_eq!(b.cursor(), (0, 3));
    }

    #[test]
    fn test_delete_range_clamps_to_edges() {
        let mut b = buf_with("abc");
        b.delete_range(100, 100);
        assert!(b.is_empty());
    }

    #[test]
    fn test_delete_range_snaps_to_boundaries() {
        let mut b = buf_with("aあb"); // offsets: a=0, あ=1..4, b=4
        // Cursor at end (5); deleting 2 bytes before would split あ at 3,
        // so the start snaps down to 1... but must stay within あ's edge.
        b.delete_range(2, 0);
        assert!(b.text().is_ascii() || b.text().chars().all(|c| c.len_utf8() > 0));
        // Content is still valid UTF-8 by construction; the cursor too
        let (row, col) = b.cursor();
        assert!(b.line(row).is_char_boundary(col));
    }

    #[test]
    fn test_word_motion() {
        let mut b = buf_with("foo bar  baz");
        b.move_word_left();
        assert_eq!(b.cursor(), (0, 9)); // start of "baz"
        b.move_word_left();
        assert_eq!(b.cursor(), (0, 4)); // start of "bar"
        b.move_word_right();
        assert_eq!(b.cursor(), (0, 7)); // end of "bar"
        b.move_buffer_start();
        b.move_word_right();
        assert_eq!(b.cursor(), (0, 3)); // end of "foo"
    }

    #[test]
    fn test_delete_word_before() {
        let mut b = buf_with("foo bar");
        b.delete_word_before();
        assert_eq!(b.text(), "foo ");
        b.delete_word_before();
        assert_eq!(b.text(), "");
    }

    #[test]
    fn test_kill_line() {
        let mut b = buf_with("hello world");
        b.move_line_start();
        b.move_word_right();
        b.kill_to_line_end();
        assert_eq!(b.text(), "hello");
        let mut b = buf_with("hello world");
        b.kill_to_line_start();
        assert_eq!(b.text(), "");
    }

    #[test]
    fn test_undo_redo() {
        let mut b = EditBuffer::new();
        b.insert_str("alpha");
        b.insert_str(" beta");
        assert_eq!(b.text(), "alpha beta");
        assert!(b.undo());
        assert_eq!(b.text(), "alpha");
        assert!(b.undo());
        assert_eq!(b.text(), "");
        assert!(b.redo());
        assert_eq!(b.text(), "alpha");
        assert!(b.redo());
        assert_eq!(b.text(), "alpha beta");
        assert!(!b.redo());
    }

    #[test]
    fn test_fresh_edit_clears_redo() {
        let mut b = EditBuffer::new();
        b.insert_str("one");
        b.undo();
        b.insert_str("two");
        assert!(!b.redo());
        assert_eq!(b.text(), "two");
    }

    #[test]
    fn test_typing_run_coalesces() {
        let mut b = EditBuffer::new();
        for c in "hello".chars() {
            b.insert_char(c);
        }
        assert!(b.undo());
        assert_eq!(b.text(), "");
        // A break in typing starts a new unit
        let mut b = EditBuffer::new();
        for c in "ab".chars() {
            b.insert_char(c);
        }
        b.break_undo_coalescing();
        for c in "cd".chars() {
            b.insert_char(c);
        }
        b.undo();
        assert_eq!(b.text(), "ab");
    }

    #[test]
    fn test_vertical_motion_keeps_display_column() {
        let mut b = EditBuffer::new();
        b.insert_str("wide 日本語 line\nshort\nanother long line here");
        b.move_buffer_end();
        assert!(b.move_up());
        assert!(b.move_up());
        // Back down lands on the remembered display column, not byte 0
        assert!(b.move_down());
        assert!(b.move_down());
        let (row, col) = b.cursor();
        assert_eq!(row, 2);
        assert!(b.line(row).is_char_boundary(col));
    }

    #[test]
    fn test_paste_sanitized() {
        let mut b = EditBuffer::new();
        b.insert_str("a\r\nb\x07c");
        assert_eq!(b.text(), "a\nbc");
    }

    #[test]
    fn test_cursor_offset_round_trip() {
        let mut b = buf_with("line one\nline 二\nthree");
        b.move_buffer_start();
        b.move_down();
        b.move_word_right();
        let off = b.cursor_offset();
        assert!(off <= b.len());
        assert_eq!(&b.text()[off..off], "");
    }
}
