//! OpenAI-compatible implementation of [`LlmService`].
//!
//! Function calls go through chat completions with a forced tool choice;
//! assistants, threads, and runs use the v2 assistants endpoints.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use recipeforge_shared::{LlmConfig, RecipeForgeError, Result};

use crate::service::{AssistantSpec, FunctionCall, LlmService, RunAction, RunStatus};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("RecipeForge/", env!("CARGO_PKG_VERSION"));

/// Header value enabling the assistants v2 API.
const ASSISTANTS_BETA: &str = "assistants=v2";

/// Model calls can be slow; this bounds a single request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Base delay between function-call retries (multiplied by attempt number).
const RETRY_BACKOFF_MS: u64 = 500;

/// Messages kept per conversation; older exchanges are dropped first.
const MAX_HISTORY_MESSAGES: usize = 16;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    function: ToolFunction,
}

#[derive(Debug, Deserialize)]
struct ToolFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    status: RunStatus,
    #[serde(default)]
    required_action: Option<RequiredAction>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<ToolCall>,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible API.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    /// Message history per conversation id (user prompts and model replies).
    conversations: DashMap<String, Vec<Value>>,
}

impl OpenAiClient {
    /// Create a client from the `[llm]` config section and a resolved API key.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                RecipeForgeError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
            conversations: DashMap::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON body, mapping provider errors.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecipeForgeError::Llm(format!("{path}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RecipeForgeError::Llm(format!("{path}: failed to read body: {e}")))?;

        if !status.is_success() {
            let snippet = snippet(&text);
            if text.contains("content_filter") || text.contains("content_policy") {
                return Err(RecipeForgeError::ContentFiltered(format!("{path}: {snippet}")));
            }
            return Err(RecipeForgeError::Llm(format!("{path}: HTTP {status}: {snippet}")));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| RecipeForgeError::Llm(format!("{path}: invalid JSON response: {e}")))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn get_run_response(&self, thread_id: &str, run_id: &str) -> Result<RunResponse> {
        let value = self
            .send(Method::GET, &format!("threads/{thread_id}/runs/{run_id}"), None)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| RecipeForgeError::Llm(format!("invalid run response: {e}")))
    }

    /// One chat completion forcing `call.function`; returns the decoded arguments.
    async fn chat_once(&self, call: &FunctionCall, messages: &[Value]) -> Result<(Value, String)> {
        let name = &call.function.name;
        let body = json!({
            "model": self.model,
            "messages": messages,
            "tools": [{"type": "function", "function": call.function}],
            "tool_choice": {"type": "function", "function": {"name": name}},
        });

        let value = self.post("chat/completions", &body).await?;
        let response: ChatResponse = serde_json::from_value(value)
            .map_err(|e| RecipeForgeError::Llm(format!("invalid chat response: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RecipeForgeError::Llm("chat response has no choices".into()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(RecipeForgeError::ContentFiltered(format!(
                "{name}: completion stopped by content filter"
            )));
        }

        let tool_call = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .find(|c| &c.function.name == name)
            .ok_or_else(|| RecipeForgeError::Llm(format!("model did not call {name}")))?;

        let arguments = serde_json::from_str(&tool_call.function.arguments).map_err(|e| {
            RecipeForgeError::Llm(format!("{name}: arguments are not valid JSON: {e}"))
        })?;
        Ok((arguments, tool_call.function.arguments))
    }
}

#[async_trait]
impl LlmService for OpenAiClient {
    #[instrument(skip_all, fields(function = %call.function.name))]
    async fn call_function(&self, call: FunctionCall) -> Result<Value> {
        let history = call
            .conversation_id
            .as_ref()
            .and_then(|id| self.conversations.get(id).map(|h| h.clone()))
            .unwrap_or_default();

        let user_message = json!({"role": "user", "content": call.user_prompt});
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({"role": "system", "content": call.system_prompt}));
        messages.extend(history);
        messages.push(user_message.clone());

        let attempts = call.max_retries.unwrap_or(self.max_retries).max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.chat_once(&call, &messages).await {
                Ok((arguments, raw)) => {
                    if let Some(id) = &call.conversation_id {
                        let mut entry = self.conversations.entry(id.clone()).or_default();
                        entry.push(user_message.clone());
                        entry.push(json!({"role": "assistant", "content": raw}));
                        let excess = entry.len().saturating_sub(MAX_HISTORY_MESSAGES);
                        entry.drain(..excess);
                    }
                    return Ok(arguments);
                }
                Err(e) if e.is_content_filtered() => return Err(e),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "function call failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(
                            RETRY_BACKOFF_MS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RecipeForgeError::Llm("no attempts made".into())))
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String> {
        let tools: Vec<Value> = spec
            .functions
            .iter()
            .map(|f| json!({"type": "function", "function": f}))
            .collect();
        let body = json!({
            "model": self.model,
            "name": spec.name,
            "instructions": spec.instructions,
            "tools": tools,
        });
        let created: IdResponse = decode(self.post("assistants", &body).await?)?;
        debug!(assistant_id = %created.id, name = %spec.name, "assistant created");
        Ok(created.id)
    }

    async fn create_thread(&self) -> Result<String> {
        let created: IdResponse = decode(self.post("threads", &json!({})).await?)?;
        Ok(created.id)
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let body = json!({"role": "user", "content": content});
        self.post(&format!("threads/{thread_id}/messages"), &body)
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        let body = json!({"assistant_id": assistant_id});
        let created: IdResponse =
            decode(self.post(&format!("threads/{thread_id}/runs"), &body).await?)?;
        Ok(created.id)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        Ok(self.get_run_response(thread_id, run_id).await?.status)
    }

    async fn get_run_action(
        &self,
        thread_id: &str,
        run_id: &str,
        function_name: &str,
    ) -> Result<RunAction<Value>> {
        let run = self.get_run_response(thread_id, run_id).await?;
        let tool_call = run
            .required_action
            .map(|a| a.submit_tool_outputs.tool_calls)
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.function.name == function_name)
            .ok_or_else(|| {
                RecipeForgeError::Llm(format!(
                    "run {run_id} ({:?}) has no pending call to {function_name}",
                    run.status
                ))
            })?;

        let arguments = serde_json::from_str(&tool_call.function.arguments).map_err(|e| {
            RecipeForgeError::Llm(format!("{function_name}: arguments are not valid JSON: {e}"))
        })?;
        Ok(RunAction {
            tool_call_id: tool_call.id,
            arguments,
        })
    }

    async fn submit_tool_output(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_call_id: &str,
        output: &str,
    ) -> Result<()> {
        let body = json!({
            "tool_outputs": [{"tool_call_id": tool_call_id, "output": output}],
        });
        self.post(
            &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &body,
        )
        .await?;
        Ok(())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.post(&format!("threads/{thread_id}/runs/{run_id}/cancel"), &json!({}))
            .await?;
        Ok(())
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("assistants/{assistant_id}"), None)
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("threads/{thread_id}"), None)
            .await?;
        Ok(())
    }
}

/// First 300 characters of an error body.
fn snippet(text: &str) -> String {
    text.chars().take(300).collect()
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| RecipeForgeError::Llm(format!("unexpected response shape: {e}")))
}
