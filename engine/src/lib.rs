//! Colloquy Engine Library
//!
//! This library runs moderated panel discussions between LLM personas: a set
//! of debaters takes turns on a question, a moderator model picks who speaks
//! next, and a judge model closes with a verdict. It is used by embedding
//! frontends and integration tests.

/// Configuration management module
pub mod config;

/// Conversation orchestration module
pub mod conversation;

/// Chat backend abstraction layer
pub mod llm;

/// Moderator decision engine module
pub mod moderator;

/// Persona and panel definitions
pub mod persona;

/// Reply sanitation module
pub mod sanitizer;

/// Telemetry and Observability
pub mod telemetry;
