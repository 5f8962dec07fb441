use async_trait::async_trait;
use luna_common::{EmotionScore, MemoryKind, Message, Result};
use luna_db::{Companion, Memory};
use serde::Serialize;

/// Everything a brain needs to answer one user message.
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    pub companion: &'a Companion,
    /// Earlier turns, oldest first. Does not include `user_message`.
    pub history: &'a [Message],
    pub memories: &'a [Memory],
    pub user_message: &'a str,
    /// Emotions already detected in `user_message`.
    pub emotions: &'a [EmotionScore],
    pub scenario: Option<&'a str>,
}

/// A memory worth keeping, proposed from a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryCandidate {
    pub kind: MemoryKind,
    pub content: String,
    pub importance: u8,
}

/// The intelligence behind a companion: replies, emotion reading, and
/// memory extraction.
#[async_trait]
pub trait CompanionBrain: Send + Sync {
    /// Provider identifier (e.g. "template", "openai").
    fn provider_id(&self) -> &str;

    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String>;

    /// Score the emotions present in `text`. Never empty.
    fn analyze_emotions(&self, text: &str) -> Vec<EmotionScore>;

    fn extract_memories(&self, text: &str) -> Vec<MemoryCandidate>;
}
