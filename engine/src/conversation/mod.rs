//! Conversation orchestration
//!
//! This module runs a panel discussion from the opening question to the
//! judge's verdict. The [`orchestrator`] drives the turn loop, [`transcript`]
//! holds what has been said so far, and [`hooks`] lets embedders observe
//! turns and streamed fragments as they happen.

pub mod hooks;
pub mod orchestrator;
pub mod transcript;

pub use hooks::{ConversationHooks, NoopHooks};
pub use orchestrator::{
    Conversation, ConversationError, ConversationOutcome, SpeakerPicker, ThreadRngPicker,
};
pub use transcript::{Transcript, TranscriptEntry, USER_SPEAKER};
