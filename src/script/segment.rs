use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized key identifying one speaker across a script.
///
/// Two raw labels that normalize identically are the same speaker, so
/// `"John"`, `"JOHN"` and `" john "` all map to `JOHN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerId(String);

impl SpeakerId {
    pub fn new(raw: &str) -> Self {
        Self(normalize_label(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First whitespace-separated word (`"MARY"` for `"MARY JANE"`).
    pub fn first_token(&self) -> &str {
        self.0.split(' ').next().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpeakerId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl PartialEq<str> for SpeakerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SpeakerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Normalize a raw speaker label.
///
/// Letters are upper-cased, `-`, `_` and `.` act as word separators, every
/// other non-alphanumeric character is dropped and runs of whitespace
/// collapse to one space.
pub fn normalize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else if ch.is_whitespace() || matches!(ch, '-' | '_' | '.') {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// One ordered (speaker, utterance) unit of a parsed script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub speaker: SpeakerId,
    /// Trimmed, never empty.
    pub text: String,
    /// 0-based position within the script.
    pub sequence_index: usize,
}

/// Distinct speakers of `segments` in first-appearance order.
pub fn distinct_speakers(segments: &[Segment]) -> Vec<SpeakerId> {
    let mut seen = HashSet::new();
    segments
        .iter()
        .filter(|s| seen.insert(&s.speaker))
        .map(|s| s.speaker.clone())
        .collect()
}
