//! Completion engine
//!
//! Completers receive a [`CompletionEnv`] and the input up to the cursor,
//! and register candidates with [`CompletionEnv::add_completion`] or
//! [`CompletionEnv::add_completion_ex`]. The word transformers
//! ([`complete_word`], [`complete_quoted_word`]) strip quotes and escape
//! characters before invoking a user function and re-apply them to the
//! candidates it produces, so user completers only ever see plain words.
//! [`complete_filename`] is the built-in (and default) completer.

use std::any::Any;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use crate::buffer::DEFAULT_NON_WORD;
use crate::util;

/// Stop gathering once a completer has registered this many candidates
const MAX_COMPLETIONS: usize = 1000;

/// Default quote characters for word completion
const DEFAULT_QUOTES: &str = "'\"";

/// A registered completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Shown in the completion menu
    pub display: String,
    /// Inserted on confirmation
    pub replacement: String,
    /// Bytes to delete before the cursor when confirming
    pub delete_before: usize,
    /// Bytes to delete after the cursor when confirming
    pub delete_after: usize,
}

/// The environment passed to a completer for one Tab press.
pub struct CompletionEnv {
    input: String,
    cursor: usize,
    /// Byte length of the prefix handed to the active completer; plain
    /// `add_completion` replaces exactly this much text
    prefix_len: usize,
    arg: Option<Rc<dyn Any>>,
    completions: Vec<Completion>,
    keep_going: bool,
}

impl CompletionEnv {
    pub(crate) fn new(input: String, cursor: usize, arg: Option<Rc<dyn Any>>) -> Self {
        let prefix_len = cursor;
        Self {
            input,
            cursor,
            prefix_len,
            arg,
            completions: Vec::new(),
            keep_going: true,
        }
    }

    /// The raw input and cursor byte offset for this completion.
    ///
    /// Completers should normally use their `prefix` argument instead,
    /// since transformers unquote and unescape it.
    pub fn input(&self) -> (&str, usize) {
        (&self.input, self.cursor)
    }

    /// The opaque argument given when the completer was registered.
    pub fn arg(&self) -> Option<&dyn Any> {
        self.arg.as_deref()
    }

    /// Have any candidates been registered yet?
    pub fn has_completions(&self) -> bool {
        !self.completions.is_empty()
    }

    /// Register a candidate that replaces the completer's prefix.
    ///
    /// Returns the continue flag: `false` means the completer should
    /// stop adding candidates and return.
    pub fn add_completion(&mut self, display: &str, replacement: &str) -> bool {
        let before = self.prefix_len;
        self.add_completion_ex(display, replacement, before, 0)
    }

    /// Register a candidate with explicit delete counts around the cursor.
    ///
    /// `delete_before` and `delete_after` are bytes; they are clamped to
    /// the buffer edges. Returns the continue flag.
    pub fn add_completion_ex(
        &mut self,
        display: &str,
        replacement: &str,
        delete_before: usize,
        delete_after: usize,
    ) -> bool {
        // The stop flag is monotonic: no candidates accepted once set
        if !self.keep_going {
            return false;
        }
        let delete_before = delete_before.min(self.cursor);
        let delete_after = delete_after.min(self.input.len() - self.cursor);
        self.completions.push(Completion {
            display: display.to_string(),
            replacement: replacement.to_string(),
            delete_before,
            delete_after,
        });
        if self.completions.len() >= MAX_COMPLETIONS {
            self.keep_going = false;
        }
        self.keep_going
    }

    pub(crate) fn into_completions(self) -> Vec<Completion> {
        self.completions
    }

    pub(crate) fn set_prefix_len(&mut self, len: usize) {
        self.prefix_len = len.min(self.cursor);
    }

    #[cfg(test)]
    pub(crate) fn stop(&mut self) {
        self.keep_going = false;
    }
}

/// A completer: called on Tab with the input up to the cursor.
///
/// Registration styles mirror the two call sites: a boxed completer kept
/// as the default, or a short-lived one for a single `read_line` call.
/// Closures implement this directly.
pub trait Completer {
    fn complete(&mut self, env: &mut CompletionEnv, prefix: &str);
}

impl<F: FnMut(&mut CompletionEnv, &str)> Completer for F {
    fn complete(&mut self, env: &mut CompletionEnv, prefix: &str) {
        self(env, prefix)
    }
}

/// Quoting behavior detected for the word under completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Unquoted,
    Open(char),
}

/// Word parse result: where the word starts in the prefix and its
/// unquoted, unescaped content.
struct WordParse {
    /// Bytes of raw prefix the word spans (delete count on confirm)
    raw_len: usize,
    /// The word with quotes and escapes removed
    word: String,
    quote: QuoteState,
}

/// Scan the prefix for the word ending at the cursor, honoring quotes
/// and escapes.
fn parse_word(prefix: &str, non_word: &str, escape: Option<char>, quotes: &str) -> WordParse {
    let mut start = 0;
    let mut quote: Option<(usize, char)> = None;
    let mut i = 0;
    while i < prefix.len() {
        let c = prefix[i..].chars().next().unwrap();
        let next = i + c.len_utf8();
        if let Some((_, q)) = quote {
            if Some(c) == escape && next < prefix.len() {
                let e = prefix[next..].chars().next().unwrap();
                i = next + e.len_utf8();
                continue;
            }
            if c == q {
                quote = None;
                start = next;
            }
            i = next;
            continue;
        }
        if Some(c) == escape && next < prefix.len() {
            let e = prefix[next..].chars().next().unwrap();
            i = next + e.len_utf8();
            continue;
        }
        if quotes.contains(c) {
            quote = Some((i, c));
            i = next;
            continue;
        }
        if non_word.contains(c) {
            start = next;
        }
        i = next;
    }
    let (start, quote_state) = match quote {
        Some((qpos, q)) => (qpos, QuoteState::Open(q)),
        None => (start, QuoteState::Unquoted),
    };
    let raw = &prefix[start..];
    let inner = match quote_state {
        QuoteState::Open(q) => raw.strip_prefix(q).unwrap_or(raw),
        QuoteState::Unquoted => raw,
    };
    WordParse {
        raw_len: raw.len(),
        word: unescape(inner, escape),
        quote: quote_state,
    }
}

fn unescape(s: &str, escape: Option<char>) -> String {
    let Some(esc) = escape else {
        return s.to_string();
    };
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == esc {
            match chars.next() {
                Some(e) => out.push(e),
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Re-quote and re-escape a candidate word to match the original input.
fn requote(word: &str, quote: QuoteState, non_word: &str, escape: Option<char>, quotes: &str) -> String {
    match quote {
        QuoteState::Open(q) => {
            let mut out = String::with_capacity(word.len() + 2);
            out.push(q);
            for c in word.chars() {
                if let Some(esc) = escape {
                    if c == q || c == esc {
                        out.push(esc);
                    }
                }
                out.push(c);
            }
            out.push(q);
            out
        }
        QuoteState::Unquoted => {
            let needs_treatment = word
                .chars()
                .any(|c| non_word.contains(c) || quotes.contains(c) || Some(c) == escape);
            if !needs_treatment {
                return word.to_string();
            }
            if let Some(esc) = escape {
                let mut out = String::with_capacity(word.len() + 4);
                for c in word.chars() {
                    if non_word.contains(c) || quotes.contains(c) || c == esc {
                        out.push(esc);
                    }
                    out.push(c);
                }
                out
            } else if let Some(q) = quotes.chars().next() {
                // No escape character configured: fall back to quoting
                format!("{}{}{}", q, word, q)
            } else {
                word.to_string()
            }
        }
    }
}

/// Complete a word with default separators, `\` escaping and `'"` quotes.
pub fn complete_word(env: &mut CompletionEnv, prefix: &str, fun: &mut dyn Completer) {
    complete_quoted_word(env, prefix, fun, DEFAULT_NON_WORD, Some('\\'), DEFAULT_QUOTES);
}

/// Complete a word, handling quotes and escape characters.
///
/// `fun` is invoked with the unquoted, unescaped word ending at the
/// cursor; candidates it registers are re-quoted and re-escaped to match
/// the original input, and their delete counts are rewritten to span the
/// raw word bytes.
pub fn complete_quoted_word(
    env: &mut CompletionEnv,
    prefix: &str,
    fun: &mut dyn Completer,
    non_word_chars: &str,
    escape_char: Option<char>,
    quote_chars: &str,
) {
    let parse = parse_word(prefix, non_word_chars, escape_char, quote_chars);

    let (input, cursor) = env.input();
    let mut inner = CompletionEnv::new(input.to_string(), cursor, env.arg.clone());
    inner.set_prefix_len(parse.word.len());
    fun.complete(&mut inner, &parse.word);

    for c in inner.into_completions() {
        let replacement = requote(
            &c.replacement,
            parse.quote,
            non_word_chars,
            escape_char,
            quote_chars,
        );
        if !env.add_completion_ex(&c.display, &replacement, parse.raw_len, c.delete_after) {
            break;
        }
    }
}

/// Complete a filename against `;`-separated root directories.
///
/// The word is split at the last `dir_separator` into a directory part
/// and a leaf; entries under each root + directory part whose name
/// starts with the leaf become candidates. Directories get the separator
/// appended; files can be filtered by a `;`-separated extension list.
/// Quoting and escaping are handled by the word transformer.
pub fn complete_filename(
    env: &mut CompletionEnv,
    prefix: &str,
    dir_separator: char,
    roots: &str,
    extensions: Option<&str>,
) {
    let roots = if roots.is_empty() { "." } else { roots };
    let roots = roots.to_string();
    let extensions = extensions.map(str::to_string);

    // The separator stays a word character here so directory parts are
    // carried along with the leaf being matched.
    let mut fun = move |env: &mut CompletionEnv, word: &str| {
        list_filenames(env, word, dir_separator, &roots, extensions.as_deref());
    };
    complete_quoted_word(
        env,
        prefix,
        &mut fun,
        DEFAULT_NON_WORD,
        Some('\\'),
        DEFAULT_QUOTES,
    );
}

fn list_filenames(
    env: &mut CompletionEnv,
    word: &str,
    dir_separator: char,
    roots: &str,
    extensions: Option<&str>,
) {
    // Split the word into directory part (kept) and leaf (matched)
    let (dir_part, leaf) = match word.rfind(dir_separator) {
        Some(pos) => (&word[..pos + dir_separator.len_utf8()], &word[pos + dir_separator.len_utf8()..]),
        None => ("", word),
    };

    let mut candidates: Vec<(String, String)> = Vec::new();
    for root in roots.split(';') {
        if root.is_empty() {
            continue;
        }
        let mut base = PathBuf::from(root);
        if !dir_part.is_empty() {
            // Directory parts use the configured separator; normalize for
            // the filesystem call
            base.push(dir_part.trim_end_matches(dir_separator).replace(dir_separator, std::path::MAIN_SEPARATOR_STR));
        }
        let entries = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("completion skipping {:?}: {}", base, e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if !util::starts_with(&name, leaf) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                let mut display = name.clone();
                display.push(dir_separator);
                candidates.push((display, format!("{}{}{}", dir_part, name, dir_separator)));
            } else {
                if let Some(exts) = extensions {
                    let matched = exts
                        .split(';')
                        .filter(|e| !e.is_empty())
                        .any(|e| name.ends_with(e));
                    if !matched {
                        continue;
                    }
                }
                candidates.push((name.clone(), format!("{}{}", dir_part, name)));
            }
        }
    }

    candidates.sort();
    candidates.dedup();
    for (display, replacement) in candidates {
        if !env.add_completion(&display, &replacement) {
            break;
        }
    }
}

/// The built-in default completer: filenames under the current directory.
pub struct FilenameCompleter {
    pub dir_separator: char,
    pub roots: String,
    pub extensions: Option<String>,
}

impl Default for FilenameCompleter {
    fn default() -> Self {
        Self {
            dir_separator: '/',
            roots: ".".to_string(),
            extensions: None,
        }
    }
}

impl Completer for FilenameCompleter {
    fn complete(&mut self, env: &mut CompletionEnv, prefix: &str) {
        complete_filename(
            env,
            prefix,
            self.dir_separator,
            &self.roots,
            self.extensions.as_deref(),
        );
    }
}
