//! Conversation Hooks
//!
//! Observation points a presentation layer can implement to render a run as
//! it happens. Every method has a no-op default, is called synchronously on
//! the run's own task, and returns nothing; the orchestrator never changes
//! behavior based on a hook. Token hooks fire once per streamed fragment,
//! and the `*_complete` hooks carry the sanitized text that actually
//! entered the transcript.

/// Lifecycle callbacks for a conversation run
pub trait ConversationHooks: Send {
    /// A debater's turn is starting
    fn turn_start(&mut self, _speaker: &str) {}

    /// One streamed fragment of a debater's turn
    fn turn_token(&mut self, _speaker: &str, _fragment: &str) {}

    /// A debater's turn completed; `content` is the sanitized text
    fn turn_complete(&mut self, _speaker: &str, _content: &str) {}

    /// A debater's turn failed; the run continues
    fn turn_error(&mut self, _speaker: &str, _message: &str) {}

    /// The judge phase is starting
    fn judge_start(&mut self, _judge: &str) {}

    /// One streamed fragment of the judgment
    fn judge_token(&mut self, _judge: &str, _fragment: &str) {}

    /// The judgment completed; `judgment` is the sanitized text
    fn judge_complete(&mut self, _judge: &str, _judgment: &str) {}

    /// The judge call failed; the run ends with an error
    fn judge_error(&mut self, _judge: &str, _message: &str) {}
}

/// Hooks implementation that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ConversationHooks for NoopHooks {}
