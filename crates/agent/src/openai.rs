use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use funnelsight_core::config::{LlmConfig, LlmProvider};

use crate::llm::{ChatMessage, ChatRole, LlmClient, LlmError, LlmReply, LlmRequest, ToolCall};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Client for `/chat/completions` endpoints with function tools. Serves both
/// the hosted API and Ollama's OpenAI-compatible surface.
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
    provider: LlmProvider,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match config.provider {
            LlmProvider::OpenAi => {
                config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string())
            }
            LlmProvider::Ollama => {
                ollama_v1_base(config.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL))
            }
        };

        if config.provider == LlmProvider::OpenAi && config.api_key.is_none() {
            return Err(LlmError::Configuration("openai requires llm.api_key".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            provider: config.provider,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn try_request(&self, body: &Value) -> Result<LlmReply, LlmError> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body: truncate_body(&text) });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|error| LlmError::Decode(error.to_string()))?;
        parse_completion(parsed)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmReply, LlmError> {
        let body = build_request_body(&self.model, &request);
        let mut attempt = 0u32;

        loop {
            match self.try_request(&body).await {
                Ok(reply) => {
                    debug!(
                        event_name = "llm.reply_received",
                        provider = self.provider.as_str(),
                        model = %self.model,
                        tool_calls = reply.tool_calls.len(),
                        "reasoning reply received"
                    );
                    return Ok(reply);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.retrying",
                        provider = self.provider.as_str(),
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "reasoning request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt - 1))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama serves the OpenAI protocol under `/v1`.
fn ollama_v1_base(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        format!("{}...", body.chars().take(LIMIT).collect::<String>())
    }
}

pub(crate) fn build_request_body(model: &str, request: &LlmRequest) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
    messages.extend(request.messages.iter().map(message_to_wire));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
    });

    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect::<Vec<_>>();
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = json!("auto");
    }

    body
}

fn message_to_wire(message: &ChatMessage) -> Value {
    match message.role {
        ChatRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        ChatRole::Assistant if !message.tool_calls.is_empty() => {
            let tool_calls = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect::<Vec<_>>();
            let content =
                if message.content.is_empty() { Value::Null } else { json!(message.content) };
            json!({ "role": "assistant", "content": content, "tool_calls": tool_calls })
        }
        role => json!({ "role": role.as_str(), "content": message.content }),
    }
}

fn parse_completion(response: CompletionResponse) -> Result<LlmReply, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Decode("completion contained no choices".to_string()))?;
    let message = choice.message;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let arguments = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|error| {
                    LlmError::Decode(format!(
                        "tool `{}` arguments are not JSON: {error}",
                        call.function.name
                    ))
                })?
            };
            Ok(ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    Ok(LlmReply { text: message.content.unwrap_or_default(), tool_calls })
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use funnelsight_core::config::{AppConfig, LlmProvider};

    use super::{
        build_request_body, ollama_v1_base, parse_completion, CompletionResponse,
        OpenAiCompatibleClient,
    };
    use crate::llm::{ChatMessage, LlmError, LlmRequest, ToolCall, ToolSpec};

    #[test]
    fn request_body_carries_system_prompt_tools_and_tool_results() {
        let request = LlmRequest::new("You are a data analyst.", 0.1)
            .with_messages(vec![
                ChatMessage::user("traffic in Chile"),
                ChatMessage::assistant_with_tools(
                    "",
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "sql_query".to_string(),
                        arguments: json!({ "query": "SELECT 1 FROM funnels_resumido" }),
                    }],
                ),
                ChatMessage::tool_result("call_1", "{\"rows_returned\":1}"),
            ])
            .with_tools(vec![ToolSpec {
                name: "sql_query".to_string(),
                description: "Run a read-only query".to_string(),
                parameters: json!({ "type": "object" }),
            }]);

        let body = build_request_body("gpt-4o-mini", &request);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "traffic in Chile");
        assert_eq!(body["messages"][2]["content"], serde_json::Value::Null);
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["name"], "sql_query");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"SELECT 1 FROM funnels_resumido\"}"
        );
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "sql_query");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn requests_without_tools_omit_tool_fields() {
        let body = build_request_body("llama3.1", &LlmRequest::new("system", 0.3));
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn completions_with_tool_calls_are_parsed() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {
                            "name": "sql_query",
                            "arguments": "{\"query\": \"SELECT * FROM funnels_resumido\"}"
                        }
                    }]
                }
            }]
        }))
        .expect("response json");

        let reply = parse_completion(response).expect("parse");
        assert_eq!(reply.text, "");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call_9");
        assert_eq!(reply.tool_calls[0].arguments["query"], "SELECT * FROM funnels_resumido");
    }

    #[test]
    fn malformed_tool_arguments_are_decode_errors() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "sql_query", "arguments": "{not json" }
                    }]
                }
            }]
        }))
        .expect("response json");

        assert!(matches!(parse_completion(response), Err(LlmError::Decode(_))));
    }

    #[test]
    fn empty_choice_lists_are_decode_errors() {
        let response: CompletionResponse =
            serde_json::from_value(json!({ "choices": [] })).expect("response json");
        assert!(matches!(parse_completion(response), Err(LlmError::Decode(_))));
    }

    #[test]
    fn endpoints_follow_the_provider() {
        let mut config = AppConfig::default().llm;
        let ollama = OpenAiCompatibleClient::from_config(&config).expect("ollama client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/v1/chat/completions");

        config.provider = LlmProvider::OpenAi;
        config.base_url = None;
        assert!(matches!(
            OpenAiCompatibleClient::from_config(&config),
            Err(LlmError::Configuration(_))
        ));

        config.api_key = Some(SecretString::from("sk-test".to_string()));
        let openai = OpenAiCompatibleClient::from_config(&config).expect("openai client");
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn ollama_base_is_normalized_once() {
        assert_eq!(ollama_v1_base("http://localhost:11434/"), "http://localhost:11434/v1");
        assert_eq!(ollama_v1_base("http://localhost:11434/v1"), "http://localhost:11434/v1");
    }
}
