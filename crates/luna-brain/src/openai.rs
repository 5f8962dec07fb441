use async_trait::async_trait;
use luna_common::{EmotionScore, Error, MessageSender, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::brain::{CompanionBrain, MemoryCandidate, ReplyRequest};
use crate::lexicon;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
/// Only the most recent turns are sent as context.
const HISTORY_WINDOW: usize = 20;

/// Replies through OpenAI Chat Completions, or any compatible API via
/// `base_url`. Emotion and memory analysis stay local.
pub struct OpenAiBrain {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    system_prompt: Option<String>,
}

impl OpenAiBrain {
    pub fn new(api_key: impl Into<String>, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            system_prompt: None,
        }
    }

    /// Text placed before the generated persona description.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn persona_prompt(&self, request: &ReplyRequest<'_>) -> String {
        let companion = request.companion;
        let personality = &companion.personality;
        let mut prompt = String::new();

        if let Some(base) = &self.system_prompt {
            prompt.push_str(base);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            "You are {}, an AI companion. Stay in character.",
            companion.name
        ));
        if !personality.traits.is_empty() {
            prompt.push_str(&format!(" Your traits: {}.", personality.traits.join(", ")));
        }
        if let Some(tone) = &personality.tone {
            prompt.push_str(&format!(" Speak in a {tone} tone."));
        }
        if let Some(backstory) = &personality.backstory {
            prompt.push_str(&format!(" Backstory: {backstory}"));
        }
        if let Some(a) = personality.advanced {
            prompt.push_str(&format!(
                " On a 0-100 scale you have empathy {}, humor {}, formality {}, curiosity {}.",
                a.empathy, a.humor, a.formality, a.curiosity
            ));
        }
        if let Some(scenario) = request.scenario {
            prompt.push_str(&format!(" The current scenario is: {scenario}."));
        }
        if !request.memories.is_empty() {
            prompt.push_str("\n\nWhat you remember about the user:");
            for memory in request.memories {
                prompt.push_str(&format!("\n- {}", memory.content));
            }
        }
        if let Some(mood) = request.emotions.first() {
            prompt.push_str(&format!(
                "\n\nThe user's message reads as {}.",
                mood.emotion.as_str()
            ));
        }
        prompt
    }

    fn build_request(&self, request: &ReplyRequest<'_>) -> ChatRequest {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: self.persona_prompt(request),
        }];

        let skip = request.history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend(request.history.iter().skip(skip).map(|m| ChatMessage {
            role: match m.sender {
                MessageSender::User => "user",
                MessageSender::Companion => "assistant",
            }
            .to_string(),
            content: m.content.clone(),
        }));

        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.user_message.to_string(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
        }
    }
}

#[async_trait]
impl CompanionBrain for OpenAiBrain {
    fn provider_id(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.model, companion = %request.companion.id))]
    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String> {
        let body = self.build_request(request);
        debug!("openai request with {} messages", body.messages.len());

        let response = self
            .client
            .post(self.endpoint())
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("openai request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "openai API error: status={status}, body={body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("failed to parse openai response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::Provider("openai returned an empty reply".into()))
    }

    fn analyze_emotions(&self, text: &str) -> Vec<EmotionScore> {
        lexicon::analyze_emotions(text)
    }

    fn extract_memories(&self, text: &str) -> Vec<MemoryCandidate> {
        lexicon::extract_memories(text)
    }
}

// --- Wire types (private) ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
