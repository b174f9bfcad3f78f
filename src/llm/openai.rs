use crate::llm::client::{
    cancellable, ConversationMessage, LLMClient, LLMResponse, MessageRole, ModelParams,
};
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionCall,
        FunctionObject,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Gateway for OpenAI-compatible `/chat/completions` endpoints.
///
/// Works against OpenAI itself, vLLM, llama.cpp server, LM Studio, DeepSeek and
/// other servers that speak the same protocol. Reasoning models that return
/// `reasoning_content` have it surfaced as [`LLMResponse::thinking`].
///
/// The SDK backs off on 429 and 5xx by itself, so only connection-level
/// failures come back retryable from here.
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
    params: ModelParams,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_params(api_key, api_base, model, ModelParams::default())
    }

    pub fn with_params(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        params: ModelParams,
    ) -> Self {
        let api_base: String = api_base.into();
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self {
            client: Client::with_config(config),
            model: model.into(),
            params,
        }
    }

    fn build_request(
        &self,
        messages: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(to_openai_message)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to build request: {}", e)))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);

        if !tools.is_empty() {
            args.tools(tools.iter().map(to_openai_tool).collect::<Vec<_>>());
        }
        if let Some(temperature) = self.params.temperature {
            args.temperature(temperature);
        }
        if let Some(max_tokens) = self.params.max_tokens {
            args.max_completion_tokens(max_tokens);
        }

        args.build()
            .map_err(|e| AppError::Internal(format!("Failed to build request: {}", e)))
    }

    async fn send(&self, request: CreateChatCompletionRequest) -> Result<LLMResponse> {
        // Bring-your-own-type response: the typed struct has no slot for
        // `reasoning_content`.
        let raw: Value = self
            .client
            .chat()
            .create_byot(request)
            .await
            .map_err(|e| classify(&e))?;

        parse_response(raw)
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
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

fn classify(err: &OpenAIError) -> AppError {
    match err {
        OpenAIError::Reqwest(_) => AppError::from_http_failure("OpenAI error", err),
        other => AppError::transport(format!("OpenAI error: {}", other)),
    }
}

fn to_openai_message(
    msg: &ConversationMessage,
) -> std::result::Result<ChatCompletionRequestMessage, OpenAIError> {
    let message: ChatCompletionRequestMessage = match msg.role {
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(msg.content.as_str())
            .build()?
            .into(),
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(msg.content.as_str())
            .build()?
            .into(),
        MessageRole::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !msg.content.is_empty() {
                args.content(msg.content.as_str());
            }
            if !msg.tool_calls.is_empty() {
                args.tool_calls(
                    msg.tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }
            args.build()?.into()
        }
        MessageRole::Tool => ChatCompletionRequestToolMessageArgs::default()
            .content(msg.content.as_str())
            .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
            .build()?
            .into(),
    };
    Ok(message)
}

fn to_openai_tool(tool: &ToolDefinition) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: tool.name.clone(),
            description: Some(tool.description.clone()),
            parameters: Some(tool.parameters.clone()),
            strict: None,
        },
    }
}

fn parse_response(raw: Value) -> Result<LLMResponse> {
    let thinking = raw
        .pointer("/choices/0/message/reasoning_content")
        .or_else(|| raw.pointer("/choices/0/message/reasoning"))
        .and_then(|v| v.as_str())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string);

    let response: CreateChatCompletionResponse = serde_json::from_value(raw)
        .map_err(|e| AppError::transport(format!("Unexpected OpenAI response: {}", e)))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AppError::transport("No choices in OpenAI response"))?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| json!({})),
        })
        .collect();

    let finish_reason = choice
        .finish_reason
        .and_then(|reason| serde_json::to_value(reason).ok())
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| {
            if tool_calls.is_empty() { "stop" } else { "tool_calls" }.to_string()
        });

    Ok(LLMResponse {
        content: choice.message.content.unwrap_or_default(),
        thinking,
        tool_calls,
        finish_reason,
    })
}
