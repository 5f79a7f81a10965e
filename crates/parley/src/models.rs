//! These models represent the objects the orchestrator passes around
//!
//! There are several different related formats we need to interact with:
//! - openrouter chat completion messages and streamed deltas
//! - gemini contents/parts and streamed candidates
//! - kimi (moonshot) chat completion messages and streamed deltas
//! - events published to whatever renders the conversation
//!
//! Each backend's wire shape is converted at the provider boundary into these
//! internal structs, which do not exactly match any one of them.
pub mod chunk;
pub mod content;
pub mod conversation;
pub mod message;
pub mod role;
pub mod tool;
