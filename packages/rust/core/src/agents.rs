//! The two conversational agents behind synthesis.
//!
//! [`DraftingAgent`] writes recipes and [`CritiqueAgent`] scores them. The
//! LLM-backed implementations each own one assistant, one thread and at most
//! one open run; [`close`](DraftingAgent::close) tears all three down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use recipeforge_llm::functions;
use recipeforge_llm::{AssistantSpec, LlmService, RunStatus, get_run_action_as};
use recipeforge_shared::{AnalysisResult, RecipeForgeError, Result, SynthesizedRecipe};

/// What the drafter receives at the start of a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftInput {
    /// Opening request for the first draft.
    Request(String),
    /// Critique of the previous draft, answered with a revision.
    Feedback(AnalysisResult),
}

/// Writes and revises recipe drafts.
#[async_trait]
pub trait DraftingAgent: Send {
    async fn submit(&mut self, input: DraftInput) -> Result<()>;

    /// Wait for the draft requested by the last [`submit`](Self::submit).
    async fn await_draft(&mut self) -> Result<SynthesizedRecipe>;

    /// Release every remote resource. Never fails; problems are logged.
    async fn close(&mut self);
}

/// Scores drafts and explains what to improve.
#[async_trait]
pub trait CritiqueAgent: Send {
    /// Open the critique conversation with the first draft.
    async fn start_analysis(&mut self, draft: &SynthesizedRecipe) -> Result<()>;

    /// Hand a revised draft to the open critique conversation.
    async fn submit_revision(&mut self, draft: &SynthesizedRecipe) -> Result<()>;

    /// Wait until the critic has produced its verdict.
    async fn wait_for_analysis(&mut self) -> Result<()>;

    /// Read the verdict the critic produced.
    async fn take_analysis(&mut self) -> Result<AnalysisResult>;

    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Assistant session
// ---------------------------------------------------------------------------

/// One assistant + thread pair and the run currently driving it.
struct AssistantSession {
    llm: Arc<dyn LlmService>,
    label: &'static str,
    assistant_id: Option<String>,
    thread_id: String,
    run_id: Option<String>,
    pending_tool_call: Option<String>,
    poll_interval: Duration,
}

impl AssistantSession {
    async fn open(
        llm: Arc<dyn LlmService>,
        label: &'static str,
        spec: AssistantSpec,
        poll_interval: Duration,
    ) -> Result<Self> {
        let assistant_id = llm.create_assistant(&spec).await?;
        let thread_id = match llm.create_thread().await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = llm.delete_assistant(&assistant_id).await {
                    warn!(agent = label, error = %cleanup, "failed to delete assistant");
                }
                return Err(e);
            }
        };
        debug!(agent = label, assistant = %assistant_id, thread = %thread_id, "agent opened");

        Ok(Self {
            llm,
            label,
            assistant_id: Some(assistant_id),
            thread_id,
            run_id: None,
            pending_tool_call: None,
            poll_interval,
        })
    }

    fn assistant(&self) -> Result<&str> {
        self.assistant_id
            .as_deref()
            .ok_or_else(|| RecipeForgeError::SynthesisProtocol(format!("{} agent is closed", self.label)))
    }

    fn run(&self) -> Result<&str> {
        self.run_id
            .as_deref()
            .ok_or_else(|| RecipeForgeError::SynthesisProtocol(format!("{} agent has no run", self.label)))
    }

    async fn start_run(&mut self, message: &str) -> Result<()> {
        let assistant = self.assistant()?.to_string();
        self.llm.create_message(&self.thread_id, message).await?;
        let run = self.llm.create_run(&self.thread_id, &assistant).await?;
        self.run_id = Some(run);
        self.pending_tool_call = None;
        Ok(())
    }

    /// Answer the run's pending tool call, resuming it.
    async fn reply(&mut self, output: &str) -> Result<()> {
        let run = self.run()?.to_string();
        let call = self.pending_tool_call.take().ok_or_else(|| {
            RecipeForgeError::SynthesisProtocol(format!("{} run has no pending tool call", self.label))
        })?;
        self.llm
            .submit_tool_output(&self.thread_id, &run, &call, output)
            .await
    }

    /// Poll until the run asks for a tool call.
    async fn wait_for_tool_call(&self, completed_message: &str) -> Result<()> {
        let run = self.run()?;
        loop {
            match self.llm.get_run(&self.thread_id, run).await? {
                RunStatus::RequiresAction => return Ok(()),
                RunStatus::Completed => {
                    return Err(RecipeForgeError::SynthesisProtocol(completed_message.into()));
                }
                status if status.is_terminal() => {
                    return Err(RecipeForgeError::Llm(format!(
                        "{} run ended with status {status:?}",
                        self.label
                    )));
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    async fn take_action<T: DeserializeOwned>(&mut self, function: &str) -> Result<T> {
        let run = self.run()?.to_string();
        let action = get_run_action_as::<T>(self.llm.as_ref(), &self.thread_id, &run, function).await?;
        self.pending_tool_call = Some(action.tool_call_id);
        Ok(action.arguments)
    }

    async fn close(&mut self) {
        if let Some(run) = self.run_id.take() {
            if let Err(e) = self.llm.cancel_run(&self.thread_id, &run).await {
                debug!(agent = self.label, error = %e, "run not cancelled");
            }
        }
        let Some(assistant) = self.assistant_id.take() else {
            return;
        };
        if let Err(e) = self.llm.delete_thread(&self.thread_id).await {
            warn!(agent = self.label, error = %e, "failed to delete thread");
        }
        if let Err(e) = self.llm.delete_assistant(&assistant).await {
            warn!(agent = self.label, error = %e, "failed to delete assistant");
        }
        debug!(agent = self.label, "agent closed");
    }
}

/// JSON of a draft without its revision history.
fn draft_json(draft: &SynthesizedRecipe) -> Result<String> {
    let mut snapshot = draft.clone();
    snapshot.revisions.clear();
    serde_json::to_string(&snapshot)
        .map_err(|e| RecipeForgeError::Llm(format!("failed to encode draft: {e}")))
}

// ---------------------------------------------------------------------------
// LLM-backed agents
// ---------------------------------------------------------------------------

/// [`DraftingAgent`] backed by an assistant that calls `submit_recipe`.
pub struct LlmDraftingAgent {
    session: AssistantSession,
}

impl LlmDraftingAgent {
    pub async fn open(llm: Arc<dyn LlmService>, poll_interval: Duration) -> Result<Self> {
        let spec = AssistantSpec {
            name: "recipe-drafter".into(),
            instructions: functions::SYNTHESIZE_INSTRUCTIONS.into(),
            functions: vec![functions::submit_recipe()],
        };
        Ok(Self {
            session: AssistantSession::open(llm, "synthesis", spec, poll_interval).await?,
        })
    }
}

#[async_trait]
impl DraftingAgent for LlmDraftingAgent {
    async fn submit(&mut self, input: DraftInput) -> Result<()> {
        match input {
            DraftInput::Request(prompt) => self.session.start_run(&prompt).await,
            DraftInput::Feedback(result) => {
                let output = serde_json::to_string(&result).map_err(|e| {
                    RecipeForgeError::Llm(format!("failed to encode analysis: {e}"))
                })?;
                self.session.reply(&output).await
            }
        }
    }

    async fn await_draft(&mut self) -> Result<SynthesizedRecipe> {
        self.session
            .wait_for_tool_call("synthesis run completed without producing a recipe")
            .await?;
        self.session.take_action("submit_recipe").await
    }

    async fn close(&mut self) {
        self.session.close().await;
    }
}

/// [`CritiqueAgent`] backed by an assistant that calls `submit_analysis`.
pub struct LlmCritiqueAgent {
    session: AssistantSession,
    preferences: String,
}

impl LlmCritiqueAgent {
    /// `preferences` is the customer brief the critic judges against.
    pub async fn open(
        llm: Arc<dyn LlmService>,
        poll_interval: Duration,
        preferences: String,
    ) -> Result<Self> {
        let spec = AssistantSpec {
            name: "recipe-critic".into(),
            instructions: functions::ANALYZE_INSTRUCTIONS.into(),
            functions: vec![functions::submit_analysis()],
        };
        Ok(Self {
            session: AssistantSession::open(llm, "analysis", spec, poll_interval).await?,
            preferences,
        })
    }
}

#[async_trait]
impl CritiqueAgent for LlmCritiqueAgent {
    async fn start_analysis(&mut self, draft: &SynthesizedRecipe) -> Result<()> {
        let message = format!(
            "{}\n\nReview this recipe:\n{}",
            self.preferences,
            draft_json(draft)?
        );
        self.session.start_run(&message).await
    }

    async fn submit_revision(&mut self, draft: &SynthesizedRecipe) -> Result<()> {
        self.session.reply(&draft_json(draft)?).await
    }

    async fn wait_for_analysis(&mut self) -> Result<()> {
        self.session
            .wait_for_tool_call("analysis run completed without producing a result")
            .await
    }

    async fn take_analysis(&mut self) -> Result<AnalysisResult> {
        self.session.take_action("submit_analysis").await
    }

    async fn close(&mut self) {
        self.session.close().await;
    }
}
