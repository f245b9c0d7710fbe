//! Moderator Decision Engine
//!
//! Asks the panel's moderator persona who speaks next and whether the
//! conversation should conclude. The moderator's reply is parsed and
//! validated strictly, but the engine itself never fails: any problem on
//! the way to a usable decision (transport error, missing or malformed
//! JSON, schema violation, unknown speaker) collapses into the same
//! deterministic fallback that hands the floor to the judge. A misbehaving
//! moderator can shorten a conversation, never corrupt or block it.

use crate::conversation::transcript::TranscriptEntry;
use crate::llm::{ChatBackend, ChatError, Message};
use crate::persona::Panel;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// A validated next-speaker decision.
///
/// Instances only exist for decisions that passed validation against the
/// panel, or for the deterministic fallback; downstream code never has to
/// re-check the speaker name.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeratorDecision {
    /// Who speaks next; always a debater or the judge
    pub next_speaker: String,

    /// True when the discussion should conclude
    pub should_conclude: bool,

    /// Moderator's short justification, if it gave one
    pub reason: Option<String>,
}

impl ModeratorDecision {
    /// The deterministic decision used when the moderator cannot produce a
    /// usable one: hand the floor to the judge and conclude.
    pub fn fallback(judge: &str, cause: impl fmt::Display) -> Self {
        Self {
            next_speaker: judge.to_string(),
            should_conclude: true,
            reason: Some(format!("fallback: {}", cause)),
        }
    }

    fn from_raw(raw: RawDecision, valid_speakers: &[&str]) -> Result<Self, DecisionError> {
        let name = raw.next_speaker.trim();
        match valid_speakers.iter().find(|s| s.eq_ignore_ascii_case(name)) {
            Some(canonical) => Ok(Self {
                next_speaker: (*canonical).to_string(),
                should_conclude: raw.should_conclude,
                reason: raw.reason,
            }),
            None => Err(DecisionError::UnknownSpeaker(name.to_string())),
        }
    }
}

/// Intermediate deserialization type for the moderator's JSON output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    next_speaker: String,
    should_conclude: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Why a moderator reply was rejected. Never escapes the engine; it only
/// feeds the fallback reason.
#[derive(Debug, thiserror::Error)]
enum DecisionError {
    #[error("moderator call failed: {0}")]
    Call(#[from] ChatError),

    #[error("invalid decision payload: {0}")]
    Payload(String),

    #[error("invalid next speaker {0:?}")]
    UnknownSpeaker(String),
}

pub struct ModeratorEngine {
    backend: Arc<dyn ChatBackend>,

    /// Transcript entries included in the decision prompt
    context_entries: usize,
}

impl ModeratorEngine {
    pub fn new(backend: Arc<dyn ChatBackend>, context_entries: usize) -> Self {
        Self {
            backend,
            context_entries,
        }
    }

    /// Decide who speaks next.
    ///
    /// Always returns a decision. A panel without debaters goes straight to
    /// the judge without a model call; every failure path returns
    /// [`ModeratorDecision::fallback`].
    pub async fn decide(
        &self,
        question: &str,
        transcript: &[TranscriptEntry],
        panel: &Panel,
        debater_turns: usize,
        max_debater_turns: usize,
    ) -> ModeratorDecision {
        if panel.debaters.is_empty() {
            return ModeratorDecision {
                next_speaker: panel.judge.name.clone(),
                should_conclude: true,
                reason: Some("no debaters on the panel".to_string()),
            };
        }

        let result = self
            .request_decision(question, transcript, panel, debater_turns, max_debater_turns)
            .await;

        match result {
            Ok(decision) => {
                tracing::debug!(
                    "moderator picked {} (conclude: {})",
                    decision.next_speaker,
                    decision.should_conclude
                );
                decision
            }
            Err(e) => {
                tracing::warn!("moderator decision failed, handing floor to judge: {}", e);
                ModeratorDecision::fallback(&panel.judge.name, e)
            }
        }
    }

    async fn request_decision(
        &self,
        question: &str,
        transcript: &[TranscriptEntry],
        panel: &Panel,
        debater_turns: usize,
        max_debater_turns: usize,
    ) -> Result<ModeratorDecision, DecisionError> {
        let messages =
            self.build_messages(question, transcript, panel, debater_turns, max_debater_turns);
        let reply = self.backend.send(&panel.moderator.model, &messages).await?;
        parse_decision(&reply, &panel.valid_speakers())
    }

    fn build_messages(
        &self,
        question: &str,
        transcript: &[TranscriptEntry],
        panel: &Panel,
        debater_turns: usize,
        max_debater_turns: usize,
    ) -> Vec<Message> {
        let mut roster = String::new();
        for debater in &panel.debaters {
            roster.push_str(&format!("- {}: {}\n", debater.name, debater.description));
        }

        let recent = &transcript[transcript.len().saturating_sub(self.context_entries)..];
        let mut history = String::new();
        for entry in recent {
            history.push_str(&format!("{}: {}\n", entry.speaker, entry.content));
        }

        let last_speaker = transcript
            .iter()
            .rev()
            .find(|e| !e.is_user())
            .map(|e| e.speaker.as_str())
            .unwrap_or("nobody yet");

        let system = if panel.moderator.system_prompt.is_empty() {
            Message::system(
                "You moderate a panel debate. You decide who speaks next and when to hand \
                the discussion to the judge for a final synthesis.",
            )
        } else {
            Message::system(panel.moderator.system_prompt.clone())
        };

        let request = format!(
            "Question under discussion: {}\n\n\
            Debaters:\n{}\n\
            Judge: {}\n\n\
            Recent discussion:\n{}\n\
            Last speaker: {}\n\
            Debater turns used: {} of {}\n\n\
            Pick who should speak next. Prefer voices that have not been heard yet and \
            avoid giving anyone two turns in a row. When the important ground has been \
            covered, or the turn budget is nearly spent, hand the floor to the judge and \
            conclude.\n\
            Valid speakers: {}\n\n\
            Respond with ONLY a JSON object, no markdown, no explanation:\n\
            {{\"nextSpeaker\":\"<name>\",\"shouldConclude\":<true|false>,\"reason\":\"<one sentence>\"}}",
            question,
            roster,
            panel.judge.name,
            history,
            last_speaker,
            debater_turns,
            max_debater_turns,
            panel.valid_speakers().join(", "),
        );

        vec![system, Message::user(request)]
    }
}

/// Parse a moderator reply into a validated decision
fn parse_decision(
    reply: &str,
    valid_speakers: &[&str],
) -> Result<ModeratorDecision, DecisionError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| DecisionError::Payload("no JSON object in reply".to_string()))?;
    let raw: RawDecision =
        serde_json::from_str(json).map_err(|e| DecisionError::Payload(e.to_string()))?;
    ModeratorDecision::from_raw(raw, valid_speakers)
}

/// Extract the first balanced JSON object from text.
///
/// Scans from the first `{` and tracks brace depth, honoring string
/// literals and escapes, so prose around the object does not confuse
/// extraction.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
