use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single turn inside a conversation between a user and a companion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: MessageSender,
    pub content: String,
    #[serde(default)]
    pub emotions: Vec<EmotionScore>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Companion,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Companion => "companion",
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Love,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub emotion: Emotion,
    /// Relative strength in `[0, 1]`.
    pub score: f32,
}

impl Message {
    pub fn new(sender: MessageSender, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            content: content.into(),
            emotions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_emotions(mut self, emotions: Vec<EmotionScore>) -> Self {
        self.emotions = emotions;
        self
    }

    /// The strongest emotion attached to the message, if any.
    pub fn dominant_emotion(&self) -> Option<Emotion> {
        self.emotions
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|e| e.emotion)
    }
}

/// Category of a long-term companion memory.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Fact,
    Preference,
    Event,
    Emotion,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Event => "event",
            Self::Emotion => "emotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fact" => Some(Self::Fact),
            "preference" => Some(Self::Preference),
            "event" => Some(Self::Event),
            "emotion" => Some(Self::Emotion),
            _ => None,
        }
    }
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Love => "love",
            Self::Neutral => "neutral",
        }
    }
}
