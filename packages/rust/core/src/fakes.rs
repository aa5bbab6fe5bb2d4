//! Scripted collaborators for orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use recipeforge_discovery::RecipeDiscovery;
use recipeforge_llm::{AssistantSpec, FunctionCall, LlmService, RunAction, RunStatus};
use recipeforge_shared::{RecipeForgeError, Result, ScrapedRecipe};

/// Ids passed to the delete calls, in call order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Deletes {
    pub assistants: Vec<String>,
    pub threads: Vec<String>,
}

/// Model stand-in. Ranks by title, names recipes after their title, and
/// plays both synthesis assistants.
#[derive(Default)]
pub(crate) struct FakeLlm {
    scores: HashMap<String, u8>,
    failing_rank: Option<String>,
    alternates: Mutex<VecDeque<String>>,
    analysis_scores: Mutex<VecDeque<u8>>,
    complete_runs: bool,
    fail_thread_at: Option<usize>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    assistants: AtomicUsize,
    threads: AtomicUsize,
    runs: AtomicUsize,
    tool_calls: AtomicUsize,
    deletes: Mutex<Deletes>,
}

impl FakeLlm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rank scores by recipe title; unknown titles score 0.
    pub(crate) fn with_scores(mut self, scores: &[(&str, u8)]) -> Self {
        self.scores
            .extend(scores.iter().map(|(title, score)| (title.to_string(), *score)));
        self
    }

    /// Ranking a recipe with this title fails.
    pub(crate) fn failing_rank(mut self, title: &str) -> Self {
        self.failing_rank = Some(title.into());
        self
    }

    pub(crate) fn with_alternate_names(self, names: &[&str]) -> Self {
        self.alternates
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Critic scores, one per analysis; 100 once exhausted.
    pub(crate) fn with_analysis_scores(self, scores: &[u8]) -> Self {
        self.analysis_scores.lock().unwrap().extend(scores);
        self
    }

    /// Every run completes without asking for a tool call.
    pub(crate) fn completing_runs(mut self) -> Self {
        self.complete_runs = true;
        self
    }

    /// The `n`th thread creation (1-based) fails.
    pub(crate) fn failing_thread(mut self, n: usize) -> Self {
        self.fail_thread_at = Some(n);
        self
    }

    pub(crate) fn count(&self, function: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == function)
            .count()
    }

    /// Conversation ids of every reformulation call.
    pub(crate) fn conversations(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == "alternate_recipe_name")
            .map(|(_, conversation)| conversation.clone())
            .collect()
    }

    pub(crate) fn deletes(&self) -> Deletes {
        self.deletes.lock().unwrap().clone()
    }

    fn next_id(counter: &AtomicUsize, prefix: &str) -> String {
        format!("{prefix}-{}", counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn prompt_title(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Title: "))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl LlmService for FakeLlm {
    async fn call_function(&self, call: FunctionCall) -> Result<Value> {
        let name = call.function.name.clone();
        self.calls
            .lock()
            .unwrap()
            .push((name.clone(), call.conversation_id.clone()));

        let title = prompt_title(&call.user_prompt);
        match name.as_str() {
            "rank_recipe" => {
                if self.failing_rank.as_deref() == Some(title.as_str()) {
                    return Err(RecipeForgeError::Llm("ranking unavailable".into()));
                }
                let score = self.scores.get(&title).copied().unwrap_or(0);
                Ok(json!({ "score": score }))
            }
            "alternate_recipe_name" => {
                let next = self.alternates.lock().unwrap().pop_front().unwrap_or_default();
                Ok(json!({ "name": next }))
            }
            "clean_recipe" => Ok(json!({})),
            "name_recipe" => Ok(json!({ "index_title": title, "aliases": [] })),
            other => Err(RecipeForgeError::Llm(format!("unexpected function {other}"))),
        }
    }

    async fn create_assistant(&self, _spec: &AssistantSpec) -> Result<String> {
        Ok(Self::next_id(&self.assistants, "asst"))
    }

    async fn create_thread(&self) -> Result<String> {
        let id = Self::next_id(&self.threads, "thread");
        if self.fail_thread_at == Some(self.threads.load(Ordering::SeqCst)) {
            return Err(RecipeForgeError::Llm("thread quota exceeded".into()));
        }
        Ok(id)
    }

    async fn create_message(&self, _thread_id: &str, _content: &str) -> Result<()> {
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<String> {
        Ok(Self::next_id(&self.runs, "run"))
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunStatus> {
        Ok(if self.complete_runs {
            RunStatus::Completed
        } else {
            RunStatus::RequiresAction
        })
    }

    async fn get_run_action(
        &self,
        _thread_id: &str,
        _run_id: &str,
        function_name: &str,
    ) -> Result<RunAction<Value>> {
        let arguments = match function_name {
            "submit_recipe" => json!({
                "title": "Tomato Soup",
                "ingredients": ["2 lb tomatoes", "1 onion"],
                "directions": ["Simmer.", "Blend."],
            }),
            "submit_analysis" => {
                let score = self.analysis_scores.lock().unwrap().pop_front().unwrap_or(100);
                json!({ "quality_score": score, "suggestions": "more salt" })
            }
            other => return Err(RecipeForgeError::Llm(format!("unexpected function {other}"))),
        };
        Ok(RunAction {
            tool_call_id: Self::next_id(&self.tool_calls, "call"),
            arguments,
        })
    }

    async fn submit_tool_output(
        &self,
        _thread_id: &str,
        _run_id: &str,
        _tool_call_id: &str,
        _output: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<()> {
        self.deletes
            .lock()
            .unwrap()
            .assistants
            .push(assistant_id.to_string());
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.deletes.lock().unwrap().threads.push(thread_id.to_string());
        Ok(())
    }
}

/// Returns the first `count_needed` of a fixed list; records each call.
pub(crate) struct FakeDiscovery {
    recipes: Vec<ScrapedRecipe>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeDiscovery {
    pub(crate) fn new(recipes: Vec<ScrapedRecipe>) -> Self {
        Self {
            recipes,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(query, count_needed)` per call.
    pub(crate) fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeDiscovery for FakeDiscovery {
    async fn discover(
        &self,
        query: &str,
        _acceptable_score: Option<u8>,
        count_needed: usize,
        _target_source: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ScrapedRecipe>> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), count_needed));
        Ok(self.recipes.iter().take(count_needed).cloned().collect())
    }
}
