//! UTF-8 convenience primitives
//!
//! Small helpers for stepping over codepoint boundaries and prefix
//! matching. The editor never indexes into text without going through
//! these, which is what keeps the cursor on a boundary by construction.

/// Position of the previous codepoint boundary in `s` before `pos`.
///
/// Returns `None` if `pos` is 0, past the end, or not itself a boundary.
pub fn prev_char(s: &str, pos: usize) -> Option<usize> {
    if pos == 0 || pos > s.len() || !s.is_char_boundary(pos) {
        return None;
    }
    let mut p = pos - 1;
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    Some(p)
}

/// Position of the next codepoint boundary in `s` after `pos`.
///
/// Returns `None` if `pos` is at or past the end, or not itself a boundary.
pub fn next_char(s: &str, pos: usize) -> Option<usize> {
    if pos >= s.len() || !s.is_char_boundary(pos) {
        return None;
    }
    let mut p = pos + 1;
    while p < s.len() && !s.is_char_boundary(p) {
        p += 1;
    }
    Some(p)
}

/// Snap a byte offset down to the nearest codepoint boundary.
pub fn floor_char_boundary(s: &str, pos: usize) -> usize {
    let mut p = pos.min(s.len());
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

/// Does `s` start with `prefix`?
pub fn starts_with(s: &str, prefix: &str) -> bool {
    s.as_bytes().starts_with(prefix.as_bytes())
}

/// Sanitize arbitrary input text before it reaches the edit buffer.
///
/// Normalizes line endings to `\n` and strips control characters other
/// than newline and tab. Pasted bytes go through `from_utf8_lossy`
/// upstream, so the input here is already valid UTF-8.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
