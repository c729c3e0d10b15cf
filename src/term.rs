//! Terminal I/O adapter
//!
//! Raw byte input, buffered output and raw-mode control for one editing
//! session. Decoding is done elsewhere; this layer only moves bytes and
//! manages terminal modes.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crossterm::terminal;
use crossterm::tty::IsTty;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TermError {
    #[error("Failed to read from terminal: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to terminal: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to change terminal mode: {0}")]
    Mode(#[source] io::Error),

    #[error("End of input")]
    Eof,
}

pub type Result<T> = std::result::Result<T, TermError>;

/// Fallback extent when the size query fails
const DEFAULT_EXTENT: (u16, u16) = (80, 24);

/// How long to wait for the rest of an escape sequence
pub const ESC_TIMEOUT: Duration = Duration::from_millis(100);

/// Scoped raw-mode acquisition.
///
/// The previous mode is restored on drop, which covers every exit path:
/// submit, cancel, I/O error and unwinding.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().map_err(TermError::Mode)?;
        Ok(Self { active: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = terminal::disable_raw_mode() {
                tracing::debug!("failed to restore terminal mode: {}", e);
            }
        }
    }
}

/// Terminal byte I/O.
///
/// Reads come from stdin one byte at a time, optionally with a poll
/// timeout. Writes accumulate in an internal buffer and reach the
/// terminal on `flush`, which the editor calls once per redraw.
pub struct Terminal {
    stdin: io::Stdin,
    out: Vec<u8>,
    /// Bytes read ahead of their turn (typed during the cursor query);
    /// served before stdin
    pending: VecDeque<u8>,
}

impl Terminal {
    pub fn new() -> Self {
        Self {
            stdin: io::stdin(),
            out: Vec::with_capacity(4096),
            pending: VecDeque::new(),
        }
    }

    /// Can we run the interactive editor at all?
    ///
    /// Requires both stdin and stdout to be real terminals (which also
    /// rules out redirection) and a `TERM` that is not a known dumb type.
    pub fn is_capable() -> bool {
        if !io::stdin().is_tty() || !io::stdout().is_tty() {
            return false;
        }
        match std::env::var("TERM") {
            Ok(term) => term != "dumb" && term != "cons25" && term != "emacs",
            Err(_) => true,
        }
    }

    /// Blocking read of a single byte. `Eof` when the stream closes.
    pub fn read_byte(&mut self) -> Result<u8> {
        if let Some(b) = self.pending.pop_front() {
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        loop {
            match self.stdin.read(&mut buf) {
                Ok(0) => return Err(TermError::Eof),
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TermError::Read(e)),
            }
        }
    }

    /// Read a single byte, giving up after `timeout`.
    ///
    /// Used to bound escape-sequence lookahead: a lone ESC is only
    /// distinguishable from a sequence lead-in by the silence after it.
    #[cfg(unix)]
    pub fn read_byte_timeout(&mut self, timeout: Duration) -> Result<Option<u8>> {
        if let Some(b) = self.pending.pop_front() {
            return Ok(Some(b));
        }
        let mut pollfd = libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        loop {
            let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };
            if ready < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TermError::Read(e));
            }
            if ready == 0 {
                return Ok(None);
            }
            return self.read_byte().map(Some);
        }
    }

    /// Without poll support the timeout degrades to a blocking read.
    #[cfg(not(unix))]
    pub fn read_byte_timeout(&mut self, _timeout: Duration) -> Result<Option<u8>> {
        self.read_byte().map(Some)
    }

    /// Queue text for the next flush.
    pub fn write(&mut self, text: &str) {
        self.out.extend_from_slice(text.as_bytes());
    }

    /// Write everything queued and sync the terminal.
    pub fn flush(&mut self) -> Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&self.out).map_err(TermError::Write)?;
        stdout.flush().map_err(TermError::Write)?;
        self.out.clear();
        Ok(())
    }

    /// Terminal width and height in cells, with an 80x24 fallback.
    pub fn extent(&self) -> (u16, u16) {
        terminal::size().unwrap_or(DEFAULT_EXTENT)
    }

    pub fn enable_bracketed_paste(&mut self) {
        self.write("\x1b[?2004h");
    }

    pub fn disable_bracketed_paste(&mut self) {
        self.write("\x1b[?2004l");
    }

    pub fn beep(&mut self) -> Result<()> {
        self.write("\x07");
        self.flush()
    }

    /// Query the cursor column via DSR (`ESC [ 6 n`).
    ///
    /// Used once at session start to detect leftover output on the
    /// current row. Returns `None` if the terminal does not answer
    /// within the escape timeout. Anything typed before the reply
    /// arrives is queued for the normal read path, not discarded.
    pub fn query_cursor_column(&mut self) -> Result<Option<u16>> {
        self.write("\x1b[6n");
        self.flush()?;
        let mut matcher = DsrMatcher::new();
        let mut col = None;
        // Bounded so a reply-less terminal cannot stall the session
        for _ in 0..64 {
            let Some(b) = self.read_byte_timeout(ESC_TIMEOUT)? else {
                break;
            };
            if let Some(c) = matcher.push(b) {
                col = Some(c);
                break;
            }
        }
        self.pending.extend(matcher.into_passthrough());
        Ok(col)
    }
}

/// Incremental matcher for a DSR cursor-position reply
/// (`ESC [ row ; col R`).
///
/// Bytes that turn out not to be part of the reply are kept as
/// passthrough input, so keystrokes racing the reply are preserved.
struct DsrMatcher {
    reply: Vec<u8>,
    passthrough: Vec<u8>,
}

impl DsrMatcher {
    fn new() -> Self {
        Self {
            reply: Vec::new(),
            passthrough: Vec::new(),
        }
    }

    /// Feed one byte; `Some(col)` once the reply completes.
    fn push(&mut self, b: u8) -> Option<u16> {
        match (self.reply.len(), b) {
            (0, 0x1b) => self.reply.push(b),
            (0, _) => self.passthrough.push(b),
            (1, b'[') => self.reply.push(b),
            (2.., b'0'..=b'9' | b';') => self.reply.push(b),
            (3.., b'R') => {
                let text = String::from_utf8_lossy(&self.reply[2..]);
                let col = text.rsplit(';').next().and_then(|c| c.parse::<u16>().ok());
                self.reply.clear();
                return col;
            }
            _ => {
                // Candidate was ordinary input after all
                self.passthrough.append(&mut self.reply);
                if b == 0x1b {
                    self.reply.push(b);
                } else {
                    self.passthrough.push(b);
                }
            }
        }
        None
    }

    fn into_passthrough(mut self) -> Vec<u8> {
        self.passthrough.append(&mut self.reply);
        self.passthrough
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(matcher: &mut DsrMatcher, bytes: &[u8]) -> Option<u16> {
        let mut col = None;
        for &b in bytes {
            if let Some(c) = matcher.push(b) {
                col = Some(c);
            }
        }
        col
    }

    #[test]
    fn test_dsr_reply_parses_column() {
        let mut m = DsrMatcher::new();
        assert_eq!(feed(&mut m, b"\x1b[12;34R"), Some(34));
        assert!(m.into_passthrough().is_empty());
    }

    #[test]
    fn test_dsr_typed_ahead_is_kept() {
        let mut m = DsrMatcher::new();
        assert_eq!(feed(&mut m, b"ab\x1b[3;7R"), Some(7));
        assert_eq!(m.into_passthrough(), b"ab".to_vec());
    }

    #[test]
    fn test_dsr_escape_keypress_before_reply_is_kept() {
        let mut m = DsrMatcher::new();
        assert_eq!(feed(&mut m, b"\x1b\x1b[1;2R"), Some(2));
        assert_eq!(m.into_passthrough(), b"\x1b".to_vec());
    }

    #[test]
    fn test_dsr_no_reply_passes_everything_through() {
        let mut m = DsrMatcher::new();
        assert_eq!(feed(&mut m, b"hi\x1b[A"), None);
        assert_eq!(m.into_passthrough(), b"hi\x1b[A".to_vec());
    }

    #[test]
    fn test_pending_bytes_served_before_stdin() {
        let mut term = Terminal::new();
        term.pending.extend(b"hi");
        assert_eq!(term.read_byte().ok(), Some(b'h'));
        assert_eq!(term.read_byte_timeout(ESC_TIMEOUT).ok(), Some(Some(b'i')));
    }

    #[test]
    fn test_paste_toggles_stay_queued_until_flush() {
        let mut term = Terminal::new();
        term.enable_bracketed_paste();
        term.disable_bracketed_paste();
        assert_eq!(term.out, b"\x1b[?2004h\x1b[?2004l".to_vec());
    }
}
