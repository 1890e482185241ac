// ABOUTME: Transcript store module — durable append-only conversation history, one file per session.

pub mod transcript;

pub use transcript::{TranscriptEntry, TranscriptMeta, TranscriptStore};
