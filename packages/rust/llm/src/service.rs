//! The language model service contract.
//!
//! Two interaction styles are supported: one-shot structured function calls
//! (ranking, cleaning, naming, URL selection) and stateful assistant runs
//! (synthesis and critique) that pause on tool calls.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use recipeforge_shared::{RecipeForgeError, Result};

/// JSON-schema description of a function the model must call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A single structured function call.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub function: FunctionSchema,
    /// Continue an existing conversation instead of starting fresh.
    pub conversation_id: Option<String>,
    /// Attempt budget; `None` uses the client default.
    pub max_retries: Option<u32>,
}

impl FunctionCall {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        function: FunctionSchema,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            function,
            conversation_id: None,
            max_retries: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Definition of an assistant that drives a multi-turn run.
#[derive(Debug, Clone)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub functions: Vec<FunctionSchema>,
}

/// Lifecycle status of an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// True once polling can stop: the run either finished or is waiting on us.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }
}

/// A pending tool call on a paused run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunAction<T> {
    pub tool_call_id: String,
    pub arguments: T,
}

/// Everything the orchestration layers need from a model provider.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Force a call to `call.function` and return its raw JSON arguments.
    async fn call_function(&self, call: FunctionCall) -> Result<Value>;

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String>;

    async fn create_thread(&self) -> Result<String>;

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Start a run of `assistant_id` on `thread_id`, returning the run id.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus>;

    /// Read the pending call to `function_name` on a run in `RequiresAction`.
    async fn get_run_action(
        &self,
        thread_id: &str,
        run_id: &str,
        function_name: &str,
    ) -> Result<RunAction<Value>>;

    async fn submit_tool_output(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_call_id: &str,
        output: &str,
    ) -> Result<()>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    async fn delete_assistant(&self, assistant_id: &str) -> Result<()>;

    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// [`LlmService::call_function`] decoded into `T`.
pub async fn call_function_as<T: DeserializeOwned>(
    llm: &dyn LlmService,
    call: FunctionCall,
) -> Result<T> {
    let name = call.function.name.clone();
    let value = llm.call_function(call).await?;
    serde_json::from_value(value)
        .map_err(|e| RecipeForgeError::Llm(format!("{name}: malformed arguments: {e}")))
}

/// [`LlmService::get_run_action`] with arguments decoded into `T`.
pub async fn get_run_action_as<T: DeserializeOwned>(
    llm: &dyn LlmService,
    thread_id: &str,
    run_id: &str,
    function_name: &str,
) -> Result<RunAction<T>> {
    let action = llm.get_run_action(thread_id, run_id, function_name).await?;
    let arguments = serde_json::from_value(action.arguments).map_err(|e| {
        RecipeForgeError::Llm(format!("{function_name}: malformed arguments: {e}"))
    })?;
    Ok(RunAction {
        tool_call_id: action.tool_call_id,
        arguments,
    })
}
