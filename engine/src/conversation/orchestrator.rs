//! Conversation Orchestrator
//!
//! Drives a single multi-persona conversation from the user's question to
//! the judge's final synthesis. The orchestrator owns the per-run state:
//! speaker selection alternates with turn execution until the moderator
//! concludes (or a cap trips), then the judge speaks exactly once, always
//! last. Debater and moderator failures are absorbed so a run keeps moving;
//! only a judge failure aborts it.

use crate::config::ConversationConfig;
use crate::conversation::hooks::{ConversationHooks, NoopHooks};
use crate::conversation::transcript::{Transcript, TranscriptEntry};
use crate::llm::{ChatBackend, ChatError, Message};
use crate::moderator::{ModeratorDecision, ModeratorEngine};
use crate::persona::{Panel, Persona};
use crate::sanitizer::Sanitizer;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Errors that can end a conversation run without a judgment
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// The final synthesis call failed. Debater and moderator failures are
    /// absorbed mid-run; this is the only transport failure that aborts.
    #[error("judge synthesis failed: {0}")]
    Judge(#[source] ChatError),
}

/// Source of the index used when the orchestrator substitutes a different
/// debater for a repeated speaker. Injected so tests can run
/// deterministically.
pub trait SpeakerPicker: Send {
    /// Pick an index in `0..len`; `len` is always at least 1
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform picker backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngPicker;

impl SpeakerPicker for ThreadRngPicker {
    fn pick(&mut self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct ConversationOutcome {
    /// Full transcript: the user question, every turn, then the judgment
    pub transcript: Transcript,

    /// The judge's sanitized final synthesis
    pub judgment: String,

    /// Debater turns actually used
    pub debater_turns: usize,
}

/// Orchestrator for one conversation at a time
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    panel: Panel,
    config: ConversationConfig,
    moderator: ModeratorEngine,
    sanitizer: Sanitizer,
    hooks: Box<dyn ConversationHooks>,
    picker: Box<dyn SpeakerPicker>,
}

impl Conversation {
    /// Create an orchestrator for the given panel.
    ///
    /// # Errors
    ///
    /// Returns an error if the sanitizer patterns fail to compile.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        panel: Panel,
        config: ConversationConfig,
    ) -> anyhow::Result<Self> {
        let moderator =
            ModeratorEngine::new(Arc::clone(&backend), config.moderator_context_entries);
        Ok(Self {
            backend,
            panel,
            config,
            moderator,
            sanitizer: Sanitizer::new()?,
            hooks: Box::new(NoopHooks),
            picker: Box::new(ThreadRngPicker),
        })
    }

    /// Attach hooks for rendering the run
    pub fn with_hooks(mut self, hooks: impl ConversationHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Replace the speaker picker used by the anti-repetition rule
    pub fn with_picker(mut self, picker: impl SpeakerPicker + 'static) -> Self {
        self.picker = Box::new(picker);
        self
    }

    /// Run one conversation to completion.
    ///
    /// Turns run strictly one at a time. Dropping the returned future
    /// between turns cancels the run cleanly; the transcript is only ever
    /// appended to after a turn fully completes.
    pub async fn run(&mut self, question: &str) -> Result<ConversationOutcome, ConversationError> {
        info!(
            "starting conversation on panel '{}' with {} debaters",
            self.panel.name,
            self.panel.debaters.len()
        );

        let mut transcript = Transcript::new(question);
        let mut total_turns = 0usize;
        let mut debater_turns = 0usize;

        // First speaker: the first configured debater, or straight to the
        // judge for a panel without any.
        let mut current = match self.panel.debaters.first() {
            Some(first) => first.name.clone(),
            None => self.panel.judge.name.clone(),
        };

        loop {
            if current == self.panel.judge.name {
                break;
            }
            if total_turns >= self.config.max_turns {
                warn!(
                    "turn cap of {} reached, forcing judge hand-off",
                    self.config.max_turns
                );
                break;
            }

            let Some(persona) = self.panel.debater(&current).cloned() else {
                // Decisions are validated, so this should not happen; never
                // let an unknown name spin the loop.
                warn!("unknown speaker {:?}, forcing judge hand-off", current);
                break;
            };

            self.run_turn(question, &mut transcript, &persona).await;
            total_turns += 1;
            debater_turns += 1;

            if debater_turns >= self.config.max_debater_turns {
                info!(
                    "debater turn budget of {} spent, handing floor to judge",
                    self.config.max_debater_turns
                );
                current = self.panel.judge.name.clone();
                continue;
            }

            let decision = self
                .moderator
                .decide(
                    question,
                    transcript.entries(),
                    &self.panel,
                    debater_turns,
                    self.config.max_debater_turns,
                )
                .await;

            current = self.apply_decision(decision, &current);
        }

        let judgment = self.run_judge(question, &mut transcript).await?;

        info!(
            "conversation complete: {} transcript entries, {} debater turns",
            transcript.len(),
            debater_turns
        );

        Ok(ConversationOutcome {
            transcript,
            judgment,
            debater_turns,
        })
    }

    /// Turn a validated decision into the next speaker name
    fn apply_decision(&mut self, decision: ModeratorDecision, just_spoke: &str) -> String {
        if !self.panel.is_member(&decision.next_speaker) {
            warn!(
                "decision named non-member {:?}, forcing judge hand-off",
                decision.next_speaker
            );
            return self.panel.judge.name.clone();
        }

        if decision.should_conclude {
            debug!("moderator concluded: {:?}", decision.reason);
            return self.panel.judge.name.clone();
        }

        if decision.next_speaker == just_spoke && self.panel.debaters.len() > 1 {
            let substitute = self.pick_other_debater(just_spoke);
            info!(
                "moderator repeated {}, substituting {}",
                just_spoke, substitute
            );
            return substitute;
        }

        decision.next_speaker
    }

    /// Uniformly choose a debater other than `excluded`
    fn pick_other_debater(&mut self, excluded: &str) -> String {
        let candidates: Vec<&Persona> = self
            .panel
            .debaters
            .iter()
            .filter(|p| p.name != excluded)
            .collect();
        let idx = self.picker.pick(candidates.len());
        candidates[idx].name.clone()
    }

    /// Run one debater turn: stream, sanitize, then append.
    ///
    /// A failed turn becomes an `[ERROR] ...` transcript entry under the
    /// debater's name and the run continues.
    async fn run_turn(&mut self, question: &str, transcript: &mut Transcript, persona: &Persona) {
        debug!("turn start: {}", persona.name);
        self.hooks.turn_start(&persona.name);

        let messages = self.build_turn_messages(question, transcript, persona);

        let backend = Arc::clone(&self.backend);
        let result = {
            let hooks = &mut self.hooks;
            let name = persona.name.clone();
            let mut on_fragment = move |fragment: &str| hooks.turn_token(&name, fragment);
            backend
                .stream(&persona.model, &messages, &mut on_fragment)
                .await
        };

        match result {
            Ok(raw) => {
                let content = self.sanitizer.sanitize(&persona.name, &raw);
                self.hooks.turn_complete(&persona.name, &content);
                transcript.push(TranscriptEntry::new(&persona.name, content));
            }
            Err(e) => {
                warn!("turn failed for {}: {}", persona.name, e);
                let message = e.to_string();
                self.hooks.turn_error(&persona.name, &message);
                transcript.push(TranscriptEntry::new(
                    &persona.name,
                    format!("[ERROR] {}", message),
                ));
            }
        }
    }

    /// Run the judge phase. The judge speaks exactly once; its failure is
    /// the one transport error that ends the run.
    async fn run_judge(
        &mut self,
        question: &str,
        transcript: &mut Transcript,
    ) -> Result<String, ConversationError> {
        let judge = self.panel.judge.clone();
        info!("judge phase: {}", judge.name);
        self.hooks.judge_start(&judge.name);

        let messages = self.build_judge_messages(question, transcript);

        let backend = Arc::clone(&self.backend);
        let result = {
            let hooks = &mut self.hooks;
            let name = judge.name.clone();
            let mut on_fragment = move |fragment: &str| hooks.judge_token(&name, fragment);
            backend
                .stream(&judge.model, &messages, &mut on_fragment)
                .await
        };

        match result {
            Ok(raw) => {
                let judgment = self.sanitizer.sanitize(&judge.name, &raw);
                self.hooks.judge_complete(&judge.name, &judgment);
                transcript.push(TranscriptEntry::new(&judge.name, judgment.clone()));
                Ok(judgment)
            }
            Err(e) => {
                error!("judge synthesis failed: {}", e);
                self.hooks.judge_error(&judge.name, &e.to_string());
                Err(ConversationError::Judge(e))
            }
        }
    }

    fn build_turn_messages(
        &self,
        question: &str,
        transcript: &Transcript,
        persona: &Persona,
    ) -> Vec<Message> {
        let window = persona
            .transcript_window
            .unwrap_or(self.config.default_transcript_window);
        let recent = transcript.window(window);

        let judge_name = self.panel.judge.name.as_str();
        let spoken = transcript.active_speakers(&[judge_name]);
        let unspoken: Vec<&str> = self
            .panel
            .debaters
            .iter()
            .map(|p| p.name.as_str())
            .filter(|name| !spoken.iter().any(|s| s == name))
            .collect();

        let first_turn = transcript.len() == 1;

        let mut request = format!("The question under debate: {}\n\n", question);

        if first_turn {
            request.push_str(
                "You are opening the discussion. Nobody has spoken yet, so do not refer \
                to or rebut prior remarks.\n\n",
            );
        } else {
            request.push_str(&format!(
                "Recent discussion (newest last):\n{}\n\n",
                Transcript::render(recent)
            ));
            let spoken_list = if spoken.is_empty() {
                "none".to_string()
            } else {
                spoken.join(", ")
            };
            request.push_str(&format!(
                "Debaters who have already spoken: {}.\n",
                spoken_list
            ));
            if !unspoken.is_empty() {
                request.push_str(&format!(
                    "Debaters who have NOT spoken yet: {}. Do not attribute views to them.\n",
                    unspoken.join(", ")
                ));
            }
            request.push('\n');
        }

        request.push_str(&format!(
            "Speak as {}. Add something new and engage with specific points where \
            relevant. Do not re-summarize the whole debate.",
            persona.name
        ));

        let mut messages = Vec::new();
        if !persona.system_prompt.is_empty() {
            messages.push(Message::system(persona.system_prompt.clone()));
        }
        messages.push(Message::user(request));
        messages
    }

    fn build_judge_messages(&self, question: &str, transcript: &Transcript) -> Vec<Message> {
        let judge = &self.panel.judge;
        let active = transcript.active_speakers(&[judge.name.as_str()]);

        let mut roster = String::new();
        for name in &active {
            let description = self
                .panel
                .debater(name)
                .map(|p| p.description.as_str())
                .unwrap_or("");
            roster.push_str(&format!("- {}: {}\n", name, description));
        }
        if roster.is_empty() {
            roster.push_str("(nobody spoke before the judgment)\n");
        }

        let request = format!(
            "The question under debate: {}\n\n\
            Participants who spoke:\n{}\n\
            Full discussion:\n{}\n\n\
            As {}, weigh the arguments above and deliver the final, actionable \
            recommendation. Settle the question; do not reopen it.",
            question,
            roster,
            Transcript::render(transcript.entries()),
            judge.name,
        );

        let mut messages = Vec::new();
        if !judge.system_prompt.is_empty() {
            messages.push(Message::system(judge.system_prompt.clone()));
        }
        messages.push(Message::user(request));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FragmentHandler;
    use crate::persona::PersonaRole;
    use async_trait::async_trait;

    struct NullBackend;

    #[async_trait]
    impl ChatBackend for NullBackend {
        fn name(&self) -> &str {
            "null"
        }

        async fn send(&self, _model: &str, _messages: &[Message]) -> crate::llm::Result<String> {
            Err(ChatError::Network("unscripted".to_string()))
        }

        async fn stream(
            &self,
            _model: &str,
            _messages: &[Message],
            _on_fragment: FragmentHandler<'_>,
        ) -> crate::llm::Result<String> {
            Err(ChatError::Network("unscripted".to_string()))
        }
    }

    struct FixedPicker(usize);

    impl SpeakerPicker for FixedPicker {
        fn pick(&mut self, _len: usize) -> usize {
            self.0
        }
    }

    fn panel() -> Panel {
        Panel::new(
            "test",
            vec![
                Persona::new("Optimist", PersonaRole::Debater, "m").with_system_prompt("Be sunny."),
                Persona::new("Skeptic", PersonaRole::Debater, "m").with_system_prompt("Doubt."),
            ],
            Persona::new("Arbiter", PersonaRole::Judge, "m").with_system_prompt("Decide."),
            Persona::new("Chair", PersonaRole::Moderator, "m"),
        )
    }

    fn conversation() -> Conversation {
        Conversation::new(Arc::new(NullBackend), panel(), ConversationConfig::default())
            .unwrap()
            .with_picker(FixedPicker(0))
    }

    fn decision(next: &str, conclude: bool) -> ModeratorDecision {
        ModeratorDecision {
            next_speaker: next.to_string(),
            should_conclude: conclude,
            reason: None,
        }
    }

    #[test]
    fn test_apply_decision_concluding_goes_to_judge() {
        let mut conv = conversation();
        let next = conv.apply_decision(decision("Skeptic", true), "Optimist");
        assert_eq!(next, "Arbiter");
    }

    #[test]
    fn test_apply_decision_normal_hand_off() {
        let mut conv = conversation();
        let next = conv.apply_decision(decision("Skeptic", false), "Optimist");
        assert_eq!(next, "Skeptic");
    }

    #[test]
    fn test_apply_decision_substitutes_repeated_speaker() {
        let mut conv = conversation();
        let next = conv.apply_decision(decision("Optimist", false), "Optimist");
        assert_eq!(next, "Skeptic");
    }

    #[test]
    fn test_apply_decision_repeat_allowed_with_single_debater() {
        let mut conv = Conversation::new(
            Arc::new(NullBackend),
            Panel::new(
                "solo",
                vec![Persona::new("Optimist", PersonaRole::Debater, "m")],
                Persona::new("Arbiter", PersonaRole::Judge, "m"),
                Persona::new("Chair", PersonaRole::Moderator, "m"),
            ),
            ConversationConfig::default(),
        )
        .unwrap();
        let next = conv.apply_decision(decision("Optimist", false), "Optimist");
        assert_eq!(next, "Optimist");
    }

    #[test]
    fn test_apply_decision_non_member_forces_judge() {
        let mut conv = conversation();
        let next = conv.apply_decision(decision("Ghost", false), "Optimist");
        assert_eq!(next, "Arbiter");
    }

    #[test]
    fn test_first_turn_prompt_flags_opening() {
        let conv = conversation();
        let transcript = Transcript::new("q");
        let persona = conv.panel.debaters[0].clone();
        let messages = conv.build_turn_messages("q", &transcript, &persona);

        assert_eq!(messages[0].content, "Be sunny.");
        assert!(messages[1].content.contains("opening the discussion"));
        assert!(!messages[1].content.contains("already spoken"));
    }

    #[test]
    fn test_later_turn_prompt_lists_spoken_and_unspoken() {
        let conv = conversation();
        let mut transcript = Transcript::new("q");
        transcript.push(TranscriptEntry::new("Optimist", "Yes."));
        let persona = conv.panel.debaters[1].clone();
        let messages = conv.build_turn_messages("q", &transcript, &persona);

        let request = &messages[1].content;
        assert!(request.contains("already spoken: Optimist"));
        assert!(request.contains("NOT spoken yet: Skeptic"));
        assert!(request.contains("Do not re-summarize"));
    }

    #[test]
    fn test_turn_prompt_honors_window_override() {
        let conv = conversation();
        let mut transcript = Transcript::new("q");
        transcript.push(TranscriptEntry::new("Optimist", "oldest-remark"));
        transcript.push(TranscriptEntry::new("Skeptic", "newest-remark"));

        let persona = conv.panel.debaters[0].clone().with_transcript_window(1);
        let messages = conv.build_turn_messages("q", &transcript, &persona);

        let request = &messages[1].content;
        assert!(request.contains("newest-remark"));
        assert!(!request.contains("oldest-remark"));
    }

    #[test]
    fn test_judge_prompt_has_roster_and_full_transcript() {
        let conv = conversation();
        let mut transcript = Transcript::new("q");
        transcript.push(TranscriptEntry::new("Optimist", "Yes."));
        transcript.push(TranscriptEntry::new("Skeptic", "No."));

        let messages = conv.build_judge_messages("q", &transcript);
        let request = messages.last().unwrap();

        assert!(request.content.contains("- Optimist"));
        assert!(request.content.contains("- Skeptic"));
        assert!(request.content.contains("User: q"));
        assert!(request.content.contains("Skeptic: No."));
    }

    #[test]
    fn test_judge_prompt_empty_panel_roster() {
        let conv = conversation();
        let transcript = Transcript::new("q");
        let messages = conv.build_judge_messages("q", &transcript);
        assert!(messages
            .last()
            .unwrap()
            .content
            .contains("nobody spoke before the judgment"));
    }
}
