//! Persona and Panel Model
//!
//! Participant shapes consumed by the conversation orchestrator. Loading
//! persona definitions from disk and resolving named panels belong to the
//! caller; the engine only requires the resolved shapes defined here. A
//! [`Panel`] structurally guarantees exactly one judge and one moderator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a persona plays in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersonaRole {
    /// Argues a position over one or more turns
    Debater,

    /// Produces the single final synthesized recommendation
    Judge,

    /// Decides turn order and conclusion; its output is never shown
    Moderator,
}

impl fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonaRole::Debater => write!(f, "debater"),
            PersonaRole::Judge => write!(f, "judge"),
            PersonaRole::Moderator => write!(f, "moderator"),
        }
    }
}

/// A simulated participant backed by a chat model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    /// Unique display name, also used as the transcript speaker label
    pub name: String,

    /// Role in the conversation
    pub role: PersonaRole,

    /// Backend model identifier (e.g., "llama3.1:8b")
    pub model: String,

    /// Short description shown to the moderator and judge
    #[serde(default)]
    pub description: String,

    /// System prompt establishing the persona's voice and stance
    #[serde(default)]
    pub system_prompt: String,

    /// Per-persona override for how many recent transcript entries this
    /// persona sees each turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_window: Option<usize>,
}

impl Persona {
    /// Create a persona with the given name, role, and backend model
    pub fn new(name: impl Into<String>, role: PersonaRole, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            model: model.into(),
            description: String::new(),
            system_prompt: String::new(),
            transcript_window: None,
        }
    }

    /// Set the short description used in moderator and judge prompts
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the system prompt establishing the persona's voice
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Override the transcript window for this persona
    pub fn with_transcript_window(mut self, entries: usize) -> Self {
        self.transcript_window = Some(entries);
        self
    }
}

/// Resolved roster for a single conversation run
#[derive(Debug, Clone)]
pub struct Panel {
    /// Panel name, used in logs only
    pub name: String,

    /// Debaters in their configured order
    pub debaters: Vec<Persona>,

    /// The judge persona
    pub judge: Persona,

    /// The moderator persona
    pub moderator: Persona,
}

impl Panel {
    /// Create a panel from its resolved members
    pub fn new(
        name: impl Into<String>,
        debaters: Vec<Persona>,
        judge: Persona,
        moderator: Persona,
    ) -> Self {
        Self {
            name: name.into(),
            debaters,
            judge,
            moderator,
        }
    }

    /// Names a moderator decision may propose: every debater, in panel
    /// order, followed by the judge
    pub fn valid_speakers(&self) -> Vec<&str> {
        self.debaters
            .iter()
            .map(|p| p.name.as_str())
            .chain(std::iter::once(self.judge.name.as_str()))
            .collect()
    }

    /// True if `name` is a debater or the judge
    pub fn is_member(&self, name: &str) -> bool {
        self.judge.name == name || self.debaters.iter().any(|p| p.name == name)
    }

    /// Look up a debater by name
    pub fn debater(&self, name: &str) -> Option<&Persona> {
        self.debaters.iter().find(|p| p.name == name)
    }
}
