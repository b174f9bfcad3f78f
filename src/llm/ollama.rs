use crate::llm::client::{
    cancellable, ConversationMessage, LLMClient, LLMResponse, MessageRole, ModelParams,
};
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{
        request::ChatMessageRequest, ChatMessage, ChatMessageResponse, MessageRole as OllamaRole,
    },
    generation::tools::{
        ToolCall as OllamaToolCall, ToolCallFunction, ToolFunctionInfo, ToolInfo, ToolType,
    },
    models::ModelOptions,
    Ollama,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Gateway for an Ollama server's `/api/chat` endpoint.
pub struct OllamaClient {
    client: Ollama,
    model: String,
    params: ModelParams,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Self::with_params(base_url, model, ModelParams::default())
    }

    pub fn with_params(
        base_url: &str,
        model: impl Into<String>,
        params: ModelParams,
    ) -> Result<Self> {
        // The SDK appends "api/chat" to the URL verbatim.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let url = Url::parse(&normalized).map_err(|e| {
            AppError::Configuration(format!("Invalid Ollama base_url '{}': {}", base_url, e))
        })?;

        Ok(Self {
            client: Ollama::from_url(url),
            model: model.into(),
            params,
        })
    }

    fn build_request(
        &self,
        messages: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessageRequest> {
        let messages = messages.iter().map(to_ollama_message).collect();
        let mut request = ChatMessageRequest::new(self.model.clone(), messages);

        if !tools.is_empty() {
            let tools = tools.iter().map(to_tool_info).collect::<Result<Vec<_>>>()?;
            request = request.tools(tools);
        }
        if let Some(think) = self.params.think {
            request = request.think(think);
        }
        if self.params.temperature.is_some() || self.params.max_tokens.is_some() {
            let mut options = ModelOptions::default();
            if let Some(temperature) = self.params.temperature {
                options = options.temperature(temperature);
            }
            if let Some(max_tokens) = self.params.max_tokens {
                options = options.num_predict(max_tokens.min(i32::MAX as u32) as i32);
            }
            request = request.options(options);
        }

        Ok(request)
    }

    async fn send(&self, request: ChatMessageRequest) -> Result<LLMResponse> {
        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| AppError::from_http_failure("Ollama error", &e))?;

        Ok(from_ollama_response(response))
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, tools)?;
        cancellable(cancel, self.send(request)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn to_ollama_message(msg: &ConversationMessage) -> ChatMessage {
    let role = match msg.role {
        MessageRole::System => OllamaRole::System,
        MessageRole::User => OllamaRole::User,
        MessageRole::Assistant => OllamaRole::Assistant,
        MessageRole::Tool => OllamaRole::Tool,
    };
    let mut message = ChatMessage::new(role, msg.content.clone());
    message.tool_calls = msg
        .tool_calls
        .iter()
        .map(|tc| OllamaToolCall {
            function: ToolCallFunction {
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            },
        })
        .collect();
    message
}

fn to_tool_info(tool: &ToolDefinition) -> Result<ToolInfo> {
    let parameters = serde_json::from_value(tool.parameters.clone()).map_err(|e| {
        AppError::Internal(format!("Invalid schema for tool '{}': {}", tool.name, e))
    })?;

    Ok(ToolInfo {
        tool_type: ToolType::Function,
        function: ToolFunctionInfo {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
        },
    })
}

fn from_ollama_response(response: ChatMessageResponse) -> LLMResponse {
    let message = response.message;

    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| ToolCall {
            id: format!("call_{}", i),
            name: call.function.name,
            arguments: decode_arguments(call.function.arguments),
        })
        .collect();

    let thinking = message.thinking.filter(|t| !t.trim().is_empty());
    let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };

    LLMResponse {
        content: message.content,
        thinking,
        tool_calls,
        finish_reason: finish_reason.to_string(),
    }
}

/// Some models return arguments as an encoded JSON string.
fn decode_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| json!({})),
        Value::Null => json!({}),
        other => other,
    }
}
