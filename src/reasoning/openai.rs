//! OpenAI 兼容推理服务
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 持有该处理器的 system prompt，将对话 Turn 转为 chat 消息，
//! 完成后解析为最终回复或动作列表。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::conversation::{Turn, TurnRole};
use crate::reasoning::{parse_reasoning_output, ReasoningOutcome, ReasoningService};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容推理服务：Client + model + 该处理器的 system prompt
pub struct OpenAiReasoning {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
    usage: TokenUsage,
}

impl OpenAiReasoning {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            system_prompt: system_prompt.into(),
            usage: TokenUsage::default(),
        }
    }

    /// Turn -> chat 消息：user 保持 user，处理器产出作为 assistant，
    /// 动作结果以 Observation 前缀回灌为 user 消息（供下一轮推理使用）
    fn to_chat_messages(&self, turns: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()
                .map_err(|e| e.to_string())?,
        )];

        for turn in turns {
            let msg = match turn.role {
                TurnRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                TurnRole::Handler | TurnRole::Final => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                TurnRole::ActionResult => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(format!("Observation: {}", turn.content))
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
            };
            messages.push(msg);
        }
        Ok(messages)
    }
}

#[async_trait]
impl ReasoningService for OpenAiReasoning {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn invoke(&self, conversation: &[Turn]) -> Result<ReasoningOutcome, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_chat_messages(conversation)?)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        parse_reasoning_output(&content).map_err(|e| e.to_string())
    }
}
