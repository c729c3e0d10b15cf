//! Input history
//!
//! Provides the bounded history store, its file persistence and the
//! incremental reverse search used by Ctrl-R.
//!
//! The on-disk format is one entry per line; backslashes and embedded
//! newlines are escaped so multi-line entries round-trip. The file is
//! rewritten in full on every mutation and truncated to the entry bound.
//! An unreadable or corrupt file is treated as an empty history.

use std::fs;
use std::ops::Range;
use std::path::PathBuf;

/// Default maximum number of entries
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// A single reverse-search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch<'a> {
    /// Index into the history (0 = oldest)
    pub index: usize,
    /// The matched entry
    pub entry: &'a str,
    /// Byte span of the query within the entry, for highlighting
    pub span: Range<usize>,
}

/// Ordered input history, oldest first.
pub struct History {
    entries: Vec<String>,
    file_path: Option<PathBuf>,
    max_entries: usize,
    /// Keep consecutive duplicates (off by default)
    allow_duplicates: bool,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            file_path: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            allow_duplicates: false,
        }
    }

    /// Configure persistence and the entry bound, then (re)load.
    ///
    /// `None` disables persistence. A negative `max_entries` selects the
    /// default bound.
    pub fn set_file(&mut self, path: Option<PathBuf>, max_entries: i64) {
        self.max_entries = if max_entries < 0 {
            DEFAULT_MAX_ENTRIES
        } else {
            max_entries as usize
        };
        self.file_path = path;
        self.entries.clear();
        self.load();
        self.truncate();
    }

    pub fn set_allow_duplicates(&mut self, allow: bool) {
        self.allow_duplicates = allow;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// Add an entry, unless it is blank or a suppressed duplicate.
    pub fn add(&mut self, entry: &str) {
        if entry.trim().is_empty() {
            return;
        }
        if !self.allow_duplicates {
            if let Some(last) = self.entries.last() {
                if last == entry {
                    return;
                }
            }
        }
        self.entries.push(entry.to_string());
        self.truncate();
        self.save();
    }

    /// Reverse the automatic add performed after a submit.
    pub fn remove_last(&mut self) {
        if self.entries.pop().is_some() {
            self.save();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.save();
    }

    /// Incremental reverse search: matches newest first, lazily.
    ///
    /// The iterator borrows the store and is recreated from scratch on
    /// every query change; `span` marks the matched bytes for highlight.
    pub fn search<'a>(&'a self, query: &'a str) -> impl Iterator<Item = SearchMatch<'a>> + 'a {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .filter_map(move |(index, entry)| {
                entry.find(query).map(|start| SearchMatch {
                    index,
                    entry,
                    span: start..start + query.len(),
                })
            })
    }

    fn truncate(&mut self) {
        while self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    fn load(&mut self) {
        let Some(ref path) = self.file_path else {
            return;
        };
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("history not loaded from {:?}: {}", path, e);
                return;
            }
        };
        for line in content.lines() {
            match unescape_entry(line) {
                Some(entry) if !entry.is_empty() => self.entries.push(entry),
                _ => {}
            }
        }
    }

    fn save(&self) {
        let Some(ref path) = self.file_path else {
            return;
        };
        let content: String = self
            .entries
            .iter()
            .map(|e| escape_entry(e))
            .collect::<Vec<_>>()
            .join("\n");
        if let Err(e) = fs::write(path, content) {
            tracing::debug!("history not saved to {:?}: {}", path, e);
        }
    }
}

/// Escape an entry to a single line: `\` -> `\\`, newline -> `\n`.
fn escape_entry(entry: &str) -> String {
    let mut out = String::with_capacity(entry.len());
    for c in entry.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of `escape_entry`; `None` for lines that do not parse.
fn unescape_entry(line: &str) -> Option<String> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_evicts_oldest() {
        let mut h = History::new();
        h.set_file(None, 3);
        for i in 0..4 {
            h.add(&format!("entry {}", i));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.get(0), Some("entry 1"));
        assert_eq!(h.get(2), Some("entry 3"));
    }

    #[test]
    fn test_duplicate_suppression() {
        let mut h = History::new();
        h.add("x");
        h.add("x");
        assert_eq!(h.len(), 1);

        h.set_allow_duplicates(true);
        h.add("x");
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_blank_entries_rejected() {
        let mut h = History::new();
        h.add("");
        h.add("   \t ");
        assert!(h.is_empty());
    }

    #[test]
    fn test_remove_last() {
        let mut h = History::new();
        h.add("one");
        h.add("two");
        h.remove_last();
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(0), Some("one"));
    }

    #[test]
    fn test_negative_max_selects_default() {
        let mut h = History::new();
        h.set_file(None, -1);
        assert_eq!(h.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_escape_round_trip() {
        let cases = ["plain", "two\nlines", "back\\slash", "\\n literal", "a\\\nb"];
        for case in cases {
            let escaped = escape_entry(case);
            assert!(!escaped.contains('\n'));
            assert_eq!(unescape_entry(&escaped).as_deref(), Some(case));
        }
    }

    #[test]
    fn test_bad_escape_skipped() {
        assert_eq!(unescape_entry("dangling\\"), None);
        assert_eq!(unescape_entry("bad\\x"), None);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");

        let mut h = History::new();
        h.set_file(Some(path.clone()), 100);
        h.add("first");
        h.add("multi\nline entry");

        let mut reloaded = History::new();
        reloaded.set_file(Some(path), 100);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(0), Some("first"));
        assert_eq!(reloaded.get(1), Some("multi\nline entry"));
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        fs::write(&path, "ok entry\nbroken\\x line\nanother ok").unwrap();

        let mut h = History::new();
        h.set_file(Some(path), 100);
        // Only the parseable lines survive
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(0), Some("ok entry"));
        assert_eq!(h.get(1), Some("another ok"));

        let mut missing = History::new();
        missing.set_file(Some(PathBuf::from("/nonexistent/dir/history")), 100);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_search_newest_first_with_spans() {
        let mut h = History::new();
        h.add("grep foo");
        h.add("cargo build");
        h.add("grep bar");

        let hits: Vec<_> = h.search("grep").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry, "grep bar");
        assert_eq!(hits[0].span, 0..4);
        assert_eq!(hits[1].entry, "grep foo");

        // Restartable: a fresh iterator scans again
        let again: Vec<_> = h.search("cargo").collect();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].entry, "cargo build");
        assert_eq!(again[0].span, 0..5);
    }

    #[test]
    fn test_search_empty_query_matches_all() {
        let mut h = History::new();
        h.add("a");
        h.add("b");
        let hits: Vec<_> = h.search("").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry, "b");
        assert_eq!(hits[0].span, 0..0);
    }
}
