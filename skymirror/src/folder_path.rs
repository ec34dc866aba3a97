//! Deterministic folder path derivation
//!
//! Path derivation is a pure function of its inputs: the same source and
//! telescope/instrument always produce the same path string, across
//! processes and restarts. Idempotent remote creation and dedup keys both
//! rely on this.

use std::fmt;

use crate::source::TelescopeInstrument;

/// Replacement for characters the storage service cannot accept
const SEGMENT_SUBSTITUTE: char = '_';

/// Upper bound on a single path segment
const MAX_SEGMENT_LEN: usize = 100;

/// Replace filesystem-unsafe characters and trim to a safe length.
///
/// An all-unsafe or empty input still yields a valid (single `_`) segment.
pub fn sanitize_segment(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .take(MAX_SEGMENT_LEN)
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => SEGMENT_SUBSTITUTE,
            c if c.is_whitespace() || c.is_control() => SEGMENT_SUBSTITUTE,
            c => c,
        })
        .collect();

    if out.is_empty() {
        out.push(SEGMENT_SUBSTITUTE);
    }
    out
}

/// An ordered sequence of sanitized path segments on the storage service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    /// Build a path from raw segments, sanitizing each one
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            segments: raw
                .into_iter()
                .map(|s| sanitize_segment(s.as_ref()))
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Extend with one more raw segment
    pub fn child(&self, raw: &str) -> FolderPath {
        let mut segments = self.segments.clone();
        segments.push(sanitize_segment(raw));
        FolderPath { segments }
    }

    /// Every ancestor path root-to-leaf, ending with the full path.
    ///
    /// The storage service rejects nested creation on a missing parent, so
    /// callers must confirm each prefix before attempting its child.
    pub fn prefixes(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.segments.len()).map(move |n| self.segments[..n].join("/"))
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Derives target folder paths for sources and their instrument pairs
#[derive(Debug, Clone)]
pub struct FolderPathBuilder {
    base: FolderPath,
}

impl FolderPathBuilder {
    /// `base_path` is the configured save path (e.g. `Candidates/Skyportal`);
    /// a non-empty `group_tag` adds one more level under it.
    pub fn new(base_path: &str, group_tag: Option<&str>) -> Self {
        let mut base = FolderPath::from_raw(base_path.split('/').filter(|s| !s.is_empty()));
        if let Some(tag) = group_tag.filter(|t| !t.trim().is_empty()) {
            base = base.child(tag);
        }
        Self { base }
    }

    /// The configured base path (pre-created once at startup)
    pub fn base(&self) -> &FolderPath {
        &self.base
    }

    /// `{base}/{source_id}`
    pub fn source_folder(&self, source_id: &str) -> FolderPath {
        self.base.child(source_id)
    }

    /// `{base}/{source_id}/{telescope}-{instrument}`
    pub fn instrument_folder(&self, source_id: &str, pair: &TelescopeInstrument) -> FolderPath {
        self.source_folder(source_id).child(&pair.segment())
    }
}
