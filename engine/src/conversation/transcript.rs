//! Conversation Transcript
//!
//! Append-only record of one conversation run. The transcript always starts
//! with the user's question and only ever grows; entries are appended after
//! a turn fully completes, never while it streams.

use serde::{Deserialize, Serialize};

/// Speaker label for the user's opening question
pub const USER_SPEAKER: &str = "User";

/// One entry in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    /// Speaker label: a persona name or [`USER_SPEAKER`]
    pub speaker: String,

    /// Sanitized content of the turn, or an `[ERROR] ...` marker for a
    /// failed one
    pub content: String,
}

impl TranscriptEntry {
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
        }
    }

    /// Entry for the user's opening question
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(USER_SPEAKER, content)
    }

    /// True if this is the user's question entry
    pub fn is_user(&self) -> bool {
        self.speaker == USER_SPEAKER
    }

    /// True if this entry records a failed turn
    pub fn is_error(&self) -> bool {
        self.content.starts_with("[ERROR]")
    }
}

/// Append-only transcript for a single run
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Create a transcript seeded with the user's question, so it is never
    /// empty
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            entries: vec![TranscriptEntry::user(question)],
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `n` entries, oldest first
    pub fn window(&self, n: usize) -> &[TranscriptEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    /// The most recent non-user speaker, if any persona has spoken
    pub fn last_speaker(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.is_user())
            .map(|e| e.speaker.as_str())
    }

    /// Names of personas that produced at least one entry, in order of
    /// first appearance, excluding the user and any name in `exclude`
    pub fn active_speakers(&self, exclude: &[&str]) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if entry.is_user() || exclude.contains(&entry.speaker.as_str()) {
                continue;
            }
            if !seen.iter().any(|s: &String| s == &entry.speaker) {
                seen.push(entry.speaker.clone());
            }
        }
        seen
    }

    /// Render entries as `Speaker: content` lines for prompts
    pub fn render(entries: &[TranscriptEntry]) -> String {
        entries
            .iter()
            .map(|e| format!("{}: {}", e.speaker, e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
