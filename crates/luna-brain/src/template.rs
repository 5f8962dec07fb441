use async_trait::async_trait;
use luna_common::{Emotion, EmotionScore, MemoryKind, Result};
use tracing::debug;

use crate::brain::{CompanionBrain, MemoryCandidate, ReplyRequest};
use crate::lexicon;

/// Built-in brain that needs no external provider. Replies are assembled
/// from the companion's persona, the user's mood and what the companion
/// remembers.
#[derive(Debug, Default, Clone)]
pub struct TemplateBrain;

impl TemplateBrain {
    pub fn new() -> Self {
        Self
    }
}

fn opening(emotion: Emotion, formal: bool) -> &'static str {
    match (emotion, formal) {
        (Emotion::Joy, false) => "That's wonderful to hear!",
        (Emotion::Joy, true) => "I am delighted to hear that.",
        (Emotion::Sadness, false) => "I'm sorry you're feeling down. I'm here for you.",
        (Emotion::Sadness, true) => "I am sorry to hear that. Please know that I am here for you.",
        (Emotion::Anger, false) => "That sounds really frustrating.",
        (Emotion::Anger, true) => "That does sound genuinely frustrating.",
        (Emotion::Fear, false) => "It's okay to feel worried. Let's take it one step at a time.",
        (Emotion::Fear, true) => "Your concern is understandable. We can take this one step at a time.",
        (Emotion::Surprise, false) => "Wow, I didn't see that coming!",
        (Emotion::Surprise, true) => "That is quite unexpected.",
        (Emotion::Love, false) => "Aww, that's so sweet.",
        (Emotion::Love, true) => "That is very kind of you.",
        (Emotion::Neutral, false) => "I see.",
        (Emotion::Neutral, true) => "I understand.",
    }
}

impl TemplateBrain {
    fn compose(&self, request: &ReplyRequest<'_>) -> String {
        let personality = &request.companion.personality;
        let advanced = personality.advanced;
        let formal = advanced.is_some_and(|a| a.formality >= 70)
            || personality.tone.as_deref() == Some("formal");

        let mood = request
            .emotions
            .first()
            .map(|e| e.emotion)
            .unwrap_or(Emotion::Neutral);

        let mut parts: Vec<String> = Vec::new();
        if let Some(scenario) = request.scenario {
            parts.push(format!("*{scenario}*"));
        }
        parts.push(opening(mood, formal).to_string());

        // Greet returning users by name when it is remembered.
        if request.history.is_empty()
            && let Some(name) = request.memories.iter().find_map(|m| {
                (m.kind == MemoryKind::Fact)
                    .then(|| m.content.strip_prefix("User's name is "))
                    .flatten()
            })
        {
            parts.push(format!("It's good to talk with you again, {name}."));
        }

        if advanced.is_some_and(|a| a.empathy >= 70) && mood != Emotion::Neutral {
            parts.push("How are you holding up?".to_string());
        }

        if request.user_message.trim_end().ends_with('?') {
            parts.push("That's a good question. What do you think?".to_string());
        } else if let Some(trait_name) = personality.traits.first() {
            parts.push(format!(
                "As someone {trait_name}, I'd love to hear more about that."
            ));
        } else {
            parts.push("Tell me more.".to_string());
        }

        if advanced.is_some_and(|a| a.humor >= 70) {
            parts.push("(I promise not to make it weird.)".to_string());
        }

        parts.push(format!("- {}", request.companion.name));
        parts.join(" ")
    }
}

#[async_trait]
impl CompanionBrain for TemplateBrain {
    fn provider_id(&self) -> &str {
        "template"
    }

    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String> {
        let reply = self.compose(request);
        debug!(
            "template reply for companion {} ({} chars)",
            request.companion.id,
            reply.len()
        );
        Ok(reply)
    }

    fn analyze_emotions(&self, text: &str) -> Vec<EmotionScore> {
        lexicon::analyze_emotions(text)
    }

    fn extract_memories(&self, text: &str) -> Vec<MemoryCandidate> {
        lexicon::extract_memories(text)
    }
}

#[cfg(test)]
mod tests {
    use super::TemplateBrain;
    use crate::brain::{CompanionBrain, ReplyRequest};
    use chrono::Utc;
    use luna_common::{
        CompanionId, Emotion, EmotionScore, MemoryId, MemoryKind, Message, MessageSender, UserId,
    };
    use luna_db::{AdvancedPersonality, Appearance, Companion, Memory, Personality};

    fn luna() -> Companion {
        Companion {
            id: CompanionId::from_raw("c1"),
            owner_id: UserId::from_raw("u1"),
            workspace_id: None,
            name: "Luna".into(),
            personality: Personality {
                traits: vec!["curious".into()],
                tone: None,
                backstory: None,
                advanced: None,
            },
            appearance: Appearance::default(),
            config: serde_json::json!({}),
            voice: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request<'a>(
        companion: &'a Companion,
        text: &'a str,
        emotions: &'a [EmotionScore],
    ) -> ReplyRequest<'a> {
        ReplyRequest {
            companion,
            history: &[],
            memories: &[],
            user_message: text,
            emotions,
            scenario: None,
        }
    }

    #[tokio::test]
    async fn reply_reacts_to_mood_and_signs_with_name() {
        let brain = TemplateBrain::new();
        let companion = luna();
        let emotions = brain.analyze_emotions("I feel so sad");
        let reply = brain
            .reply(&request(&companion, "I feel so sad", &emotions))
            .await
            .unwrap();

        assert!(reply.starts_with("I'm sorry you're feeling down."));
        assert!(reply.contains("As someone curious"));
        assert!(reply.ends_with("- Luna"));
    }

    #[tokio::test]
    async fn same_input_same_reply() {
        let brain = TemplateBrain::new();
        let companion = luna();
        let emotions = [EmotionScore {
            emotion: Emotion::Joy,
            score: 1.0,
        }];
        let first = brain.reply(&request(&companion, "yay", &emotions)).await.unwrap();
        let second = brain.reply(&request(&companion, "yay", &emotions)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn persona_dials_and_memories_shape_the_reply() {
        let brain = TemplateBrain::new();
        let mut companion = luna();
        companion.personality.advanced = Some(AdvancedPersonality {
            empathy: 90,
            humor: 10,
            formality: 90,
            curiosity: 50,
        });
        let memories = [Memory {
            id: MemoryId::from_raw("m1"),
            companion_id: companion.id.clone(),
            user_id: companion.owner_id.clone(),
            kind: MemoryKind::Fact,
            content: "User's name is Alice".into(),
            importance: 9,
            conversation_id: None,
            created_at: Utc::now(),
        }];
        let emotions = brain.analyze_emotions("I'm worried");
        let reply = brain
            .reply(&ReplyRequest {
                memories: &memories,
                scenario: Some("A rainy café"),
                ..request(&companion, "I'm worried", &emotions)
            })
            .await
            .unwrap();

        assert!(reply.starts_with("*A rainy café* Your concern is understandable."));
        assert!(reply.contains("again, Alice."));
        assert!(reply.contains("How are you holding up?"));

        let history = [Message::new(MessageSender::User, "hello")];
        let later = brain
            .reply(&ReplyRequest {
                memories: &memories,
                history: &history,
                ..request(&companion, "I'm worried", &emotions)
            })
            .await
            .unwrap();
        assert!(!later.contains("Alice"));
    }
}
