//! Key decoder
//!
//! Turns the raw terminal byte stream into discrete key events. This is
//! a push-based state machine: the session feeds it one byte at a time
//! and collects an event whenever one completes. Truncated escape
//! sequences are flushed by the session after a read timeout, so the
//! decoder itself never blocks or loses sync.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys decoded from CSI parameters or ESC prefixes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mods: u8 {
        const SHIFT = 0b001;
        const ALT   = 0b010;
        const CTRL  = 0b100;
    }
}

/// A decoded key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// A printable codepoint
    Char(char),
    /// A control chord, identified by its letter ('a' for Ctrl-A)
    Ctrl(char),
    Enter,
    Tab,
    Backspace,
    Esc,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    F(u8),
    /// Bracketed paste, batched into one event
    Paste(String),
    /// Unrecognized or truncated sequence; the session ignores these
    Unknown,
}

/// A key with its modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub mods: Mods,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            mods: Mods::empty(),
        }
    }

    fn with(key: Key, mods: Mods) -> Self {
        Self { key, mods }
    }
}

/// Upper bound on CSI parameter bytes before we give up and resync
const CSI_PARAM_LIMIT: usize = 32;

/// Decoder state machine
#[derive(Debug)]
enum DecodeState {
    Ground,
    /// Collecting a multi-byte UTF-8 codepoint
    Utf8 { buf: Vec<u8>, need: usize },
    /// Saw ESC, waiting to learn what it introduces
    Esc,
    /// Inside `ESC [`, collecting parameter/intermediate bytes
    Csi { params: Vec<u8> },
    /// Inside `ESC O` (SS3 function keys)
    Ss3,
    /// Inside a bracketed paste, scanning for the end marker
    Paste { data: Vec<u8>, terminator: usize },
}

/// End marker of a bracketed paste: `ESC [ 2 0 1 ~`
const PASTE_END: &[u8] = b"\x1b[201~";

pub struct KeyDecoder {
    state: DecodeState,
    /// Event displaced when a malformed sequence forces reprocessing
    queued: Option<KeyEvent>,
}

impl Default for KeyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Ground,
            queued: None,
        }
    }

    /// Event held back because a resync produced two at once.
    pub fn take_queued(&mut self) -> Option<KeyEvent> {
        self.queued.take()
    }

    /// Is the decoder mid-sequence, waiting for more bytes?
    pub fn is_pending(&self) -> bool {
        !matches!(self.state, DecodeState::Ground)
    }

    /// Inside a bracketed paste body. Paste reads are not subject to the
    /// escape timeout.
    pub fn is_pasting(&self) -> bool {
        matches!(self.state, DecodeState::Paste { .. })
    }

    /// Feed one byte; returns an event when one completes.
    pub fn push(&mut self, byte: u8) -> Option<KeyEvent> {
        match std::mem::replace(&mut self.state, DecodeState::Ground) {
            DecodeState::Ground => self.ground(byte),
            DecodeState::Utf8 { buf, need } => self.utf8(buf, need, byte),
            DecodeState::Esc => self.esc(byte),
            DecodeState::Csi { params } => self.csi(params, byte),
            DecodeState::Ss3 => Some(self.ss3(byte)),
            DecodeState::Paste { data, terminator } => self.paste(data, terminator, byte),
        }
    }

    /// Flush a truncated sequence after a read timeout.
    ///
    /// A bare ESC becomes the Esc key; anything further along degrades
    /// to `Unknown` (or a partial paste / replacement character), and
    /// decoding resumes from ground state.
    pub fn take_pending(&mut self) -> Vec<KeyEvent> {
        match std::mem::replace(&mut self.state, DecodeState::Ground) {
            DecodeState::Ground => Vec::new(),
            DecodeState::Esc => vec![KeyEvent::plain(Key::Esc)],
            DecodeState::Utf8 { .. } => vec![KeyEvent::plain(Key::Char('\u{FFFD}'))],
            DecodeState::Csi { .. } | DecodeState::Ss3 => vec![KeyEvent::plain(Key::Unknown)],
            DecodeState::Paste { data, .. } => {
                vec![KeyEvent::plain(Key::Paste(
                    String::from_utf8_lossy(&data).into_owned(),
                ))]
            }
        }
    }

    fn ground(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            0x1b => {
                self.state = DecodeState::Esc;
                None
            }
            b'\r' => Some(KeyEvent::plain(Key::Enter)),
            b'\t' => Some(KeyEvent::plain(Key::Tab)),
            0x7f | 0x08 => Some(KeyEvent::plain(Key::Backspace)),
            0x00 => Some(KeyEvent::plain(Key::Unknown)),
            0x01..=0x1a => Some(KeyEvent::plain(Key::Ctrl((byte - 1 + b'a') as char))),
            0x1c..=0x1f => Some(KeyEvent::plain(Key::Unknown)),
            0x20..=0x7e => Some(KeyEvent::plain(Key::Char(byte as char))),
            _ => {
                // UTF-8 lead byte
                let need = match byte {
                    0xc2..=0xdf => 2,
                    0xe0..=0xef => 3,
                    0xf0..=0xf4 => 4,
                    // Continuation or invalid lead: substitute and resync
                    _ => return Some(KeyEvent::plain(Key::Char('\u{FFFD}'))),
                };
                self.state = DecodeState::Utf8 {
                    buf: vec![byte],
                    need,
                };
                None
            }
        }
    }

    fn utf8(&mut self, mut buf: Vec<u8>, need: usize, byte: u8) -> Option<KeyEvent> {
        if !(0x80..=0xbf).contains(&byte) {
            // Truncated codepoint: substitute, then reprocess this byte
            self.queued = self.push(byte);
            return Some(KeyEvent::plain(Key::Char('\u{FFFD}')));
        }
        buf.push(byte);
        if buf.len() < need {
            self.state = DecodeState::Utf8 { buf, need };
            return None;
        }
        let c = std::str::from_utf8(&buf)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or('\u{FFFD}');
        Some(KeyEvent::plain(Key::Char(c)))
    }

    fn esc(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            b'[' => {
                self.state = DecodeState::Csi { params: Vec::new() };
                None
            }
            b'O' => {
                self.state = DecodeState::Ss3;
                None
            }
            0x1b => {
                // ESC ESC: report the first, stay armed for the second
                self.state = DecodeState::Esc;
                Some(KeyEvent::plain(Key::Esc))
            }
            b'\r' => Some(KeyEvent::with(Key::Enter, Mods::ALT)),
            0x7f | 0x08 => Some(KeyEvent::with(Key::Backspace, Mods::ALT)),
            0x20..=0x7e => Some(KeyEvent::with(Key::Char(byte as char), Mods::ALT)),
            _ => Some(KeyEvent::plain(Key::Unknown)),
        }
    }

    fn csi(&mut self, mut params: Vec<u8>, byte: u8) -> Option<KeyEvent> {
        match byte {
            0x30..=0x3f | 0x20..=0x2f => {
                params.push(byte);
                if params.len() > CSI_PARAM_LIMIT {
                    // Runaway sequence: discard the lead-in and resync
                    tracing::debug!("CSI parameter overflow, discarding sequence");
                    return Some(KeyEvent::plain(Key::Unknown));
                }
                self.state = DecodeState::Csi { params };
                None
            }
            0x40..=0x7e => self.csi_final(&params, byte),
            _ => Some(KeyEvent::plain(Key::Unknown)),
        }
    }

    fn csi_final(&mut self, params: &[u8], final_byte: u8) -> Option<KeyEvent> {
        let nums: Vec<u16> = std::str::from_utf8(params)
            .unwrap_or("")
            .split(';')
            .filter_map(|p| p.parse().ok())
            .collect();
        let mods = nums
            .get(1)
            .copied()
            .map(csi_modifiers)
            .unwrap_or_default();

        let key = match final_byte {
            b'A' => Key::Up,
            b'B' => Key::Down,
            b'C' => Key::Right,
            b'D' => Key::Left,
            b'H' => Key::Home,
            b'F' => Key::End,
            b'Z' => {
                return Some(KeyEvent::with(Key::Tab, Mods::SHIFT));
            }
            b'~' => match nums.first().copied().unwrap_or(0) {
                200 => {
                    self.state = DecodeState::Paste {
                        data: Vec::new(),
                        terminator: 0,
                    };
                    return None;
                }
                1 | 7 => Key::Home,
                2 => Key::Insert,
                3 => Key::Delete,
                4 | 8 => Key::End,
                5 => Key::PageUp,
                6 => Key::PageDown,
                n @ 11..=15 => Key::F((n - 10) as u8),
                n @ 17..=21 => Key::F((n - 11) as u8),
                23 => Key::F(11),
                24 => Key::F(12),
                n => {
                    tracing::debug!("unknown CSI tilde code: {}", n);
                    Key::Unknown
                }
            },
            b => {
                tracing::debug!("unknown CSI final byte: {:?}", b as char);
                Key::Unknown
            }
        };
        Some(KeyEvent::with(key, mods))
    }

    fn ss3(&mut self, byte: u8) -> KeyEvent {
        let key = match byte {
            b'A' => Key::Up,
            b'B' => Key::Down,
            b'C' => Key::Right,
            b'D' => Key::Left,
            b'H' => Key::Home,
            b'F' => Key::End,
            b'P' => Key::F(1),
            b'Q' => Key::F(2),
            b'R' => Key::F(3),
            b'S' => Key::F(4),
            _ => Key::Unknown,
        };
        KeyEvent::plain(key)
    }

    fn paste(&mut self, mut data: Vec<u8>, terminator: usize, byte: u8) -> Option<KeyEvent> {
        if byte == PASTE_END[terminator] {
            if terminator + 1 == PASTE_END.len() {
                return Some(KeyEvent::plain(Key::Paste(
                    String::from_utf8_lossy(&data).into_owned(),
                )));
            }
            self.state = DecodeState::Paste {
                data,
                terminator: terminator + 1,
            };
            return None;
        }
        // Partial marker match turned out to be paste content
        data.extend_from_slice(&PASTE_END[..terminator]);
        if byte == PASTE_END[0] {
            self.state = DecodeState::Paste {
                data,
                terminator: 1,
            };
        } else {
            data.push(byte);
            self.state = DecodeState::Paste {
                data,
                terminator: 0,
            };
        }
        None
    }
}

/// xterm encodes modifiers as `1 + bitset` in the second CSI parameter.
fn csi_modifiers(code: u16) -> Mods {
    if code == 0 {
        return Mods::empty();
    }
    let bits = code.saturating_sub(1);
    let mut mods = Mods::empty();
    if bits & 1 != 0 {
        mods |= Mods::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Mods::ALT;
    }
    if bits & 4 != 0 {
        mods |= Mods::CTRL;
    }
    mods
}
