//! The drafting/critique convergence loop.
//!
//! A drafter writes a recipe, a critic scores it, and the critique is fed
//! back as the drafter's tool output until a draft clears the quality
//! threshold or the attempt cap is reached. The loop is an explicit state
//! machine over the [`DraftingAgent`] and [`CritiqueAgent`] seams; opening and
//! closing the agents is the caller's job.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use recipeforge_shared::{
    AnalysisResult, CookbookOrder, Recipe, RecipeForgeError, Result, SynthesisConfig,
    SynthesizedRecipe,
};
use recipeforge_storage::recipe_prompt;

use crate::agents::{CritiqueAgent, DraftInput, DraftingAgent};

const FALLBACK_ANALYSIS: &str = "The recipe does not yet meet the quality bar.";
const FALLBACK_SUGGESTIONS: &str =
    "Revise the recipe so it better combines the sources and respects every customer preference.";

/// Where the loop is between two agent calls.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisState {
    /// Hand the drafter a request or the last critique.
    Synthesizing(DraftInput),
    /// Wait for the drafter's `submit_recipe` call.
    AwaitingToolCall,
    /// First draft: open the critique run.
    StartAnalysis(SynthesizedRecipe),
    /// Later drafts: answer the critic's pending tool call.
    SubmitRevision(SynthesizedRecipe),
    /// Wait for the critic's `submit_analysis` call.
    Analyzing(SynthesizedRecipe),
    AwaitingAnalysisResult(SynthesizedRecipe),
    Decide(SynthesizedRecipe, AnalysisResult),
}

enum Step {
    Next(SynthesisState),
    Done(SynthesizedRecipe),
}

/// Bookkeeping carried across passes.
struct LoopContext<'a> {
    config: &'a SynthesisConfig,
    attempt: u32,
    best_score: u8,
    history: Vec<SynthesizedRecipe>,
}

/// Drive the loop from `request` to an accepted draft.
///
/// The accepted draft carries every rejected draft in `revisions`, oldest
/// first. Fails with [`RecipeForgeError::SynthesisExhausted`] once
/// `config.max_attempts` drafts were rejected, and with
/// [`RecipeForgeError::Cancelled`] if `cancel` fires mid-loop.
#[instrument(skip_all, fields(threshold = config.quality_threshold, max_attempts = config.max_attempts))]
pub async fn run_synthesis(
    drafter: &mut dyn DraftingAgent,
    critic: &mut dyn CritiqueAgent,
    request: String,
    config: &SynthesisConfig,
    cancel: &CancellationToken,
) -> Result<SynthesizedRecipe> {
    let mut ctx = LoopContext {
        config,
        attempt: 0,
        best_score: 0,
        history: Vec::new(),
    };
    let mut state = SynthesisState::Synthesizing(DraftInput::Request(request));

    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RecipeForgeError::Cancelled),
            step = advance(state, drafter, critic, &mut ctx) => step?,
        };
        state = match step {
            Step::Next(next) => next,
            Step::Done(draft) => return Ok(draft),
        };
    }
}

async fn advance(
    state: SynthesisState,
    drafter: &mut dyn DraftingAgent,
    critic: &mut dyn CritiqueAgent,
    ctx: &mut LoopContext<'_>,
) -> Result<Step> {
    use SynthesisState::*;

    let next = match state {
        Synthesizing(input) => {
            if ctx.attempt >= ctx.config.max_attempts {
                return Err(RecipeForgeError::SynthesisExhausted {
                    attempts: ctx.attempt,
                    best_score: ctx.best_score,
                });
            }
            ctx.attempt += 1;
            debug!(attempt = ctx.attempt, "requesting draft");
            drafter.submit(input).await?;
            AwaitingToolCall
        }
        AwaitingToolCall => {
            let mut draft = drafter.await_draft().await?;
            draft.attempt_count = ctx.attempt;
            draft.revisions.clear();
            if ctx.attempt == 1 {
                StartAnalysis(draft)
            } else {
                SubmitRevision(draft)
            }
        }
        StartAnalysis(draft) => {
            critic.start_analysis(&draft).await?;
            Analyzing(draft)
        }
        SubmitRevision(draft) => {
            critic.submit_revision(&draft).await?;
            Analyzing(draft)
        }
        Analyzing(draft) => {
            critic.wait_for_analysis().await?;
            AwaitingAnalysisResult(draft)
        }
        AwaitingAnalysisResult(draft) => {
            let result = critic.take_analysis().await?;
            Decide(draft, result)
        }
        Decide(mut draft, mut result) => {
            ctx.best_score = ctx.best_score.max(result.quality_score);
            info!(
                attempt = ctx.attempt,
                score = result.quality_score,
                "draft analyzed"
            );

            if result.quality_score >= ctx.config.quality_threshold {
                draft.add_analysis_result(&result);
                draft.revisions = std::mem::take(&mut ctx.history);
                return Ok(Step::Done(draft));
            }

            fill_fallbacks(&mut result);
            draft.add_analysis_result(&result);
            ctx.history.push(draft);
            Synthesizing(DraftInput::Feedback(result))
        }
    };
    Ok(Step::Next(next))
}

fn fill_fallbacks(result: &mut AnalysisResult) {
    fn blank(text: &Option<String>) -> bool {
        text.as_deref().is_none_or(|t| t.trim().is_empty())
    }
    if blank(&result.analysis) {
        result.analysis = Some(FALLBACK_ANALYSIS.into());
    }
    if blank(&result.suggestions) {
        result.suggestions = Some(FALLBACK_SUGGESTIONS.into());
    }
}

/// Opening request for the drafter: the dish, the customer's order, and
/// every source recipe.
pub fn synthesis_prompt(name: &str, order: &CookbookOrder, recipes: &[Recipe]) -> String {
    let mut out = format!("Create a recipe for \"{name}\".\n\n{}", order_prompt(order));
    out.push_str("\nSource recipes:\n");
    for (n, recipe) in recipes.iter().enumerate() {
        out.push_str(&format!("\n--- Source {} ---\n{}", n + 1, recipe_prompt(recipe)));
    }
    out
}

/// The customer's order as a prompt section.
pub fn order_prompt(order: &CookbookOrder) -> String {
    let mut out = String::from("Customer preferences:\n");
    if let Some(title) = &order.cookbook_title {
        out.push_str(&format!("- Cookbook: {title}\n"));
    }
    if let Some(servings) = order.servings {
        out.push_str(&format!("- Servings: {servings}\n"));
    }
    if order.dietary_restrictions.is_empty() {
        out.push_str("- Dietary restrictions: none\n");
    } else {
        out.push_str(&format!(
            "- Dietary restrictions: {}\n",
            order.dietary_restrictions.join(", ")
        ));
    }
    if let Some(notes) = &order.notes {
        out.push_str(&format!("- Notes: {notes}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;

    /// Returns one draft per submit; remembers what it was fed.
    #[derive(Default)]
    struct ScriptedDrafter {
        inputs: Vec<DraftInput>,
        fail_await: bool,
    }

    #[async_trait]
    impl DraftingAgent for ScriptedDrafter {
        async fn submit(&mut self, input: DraftInput) -> Result<()> {
            self.inputs.push(input);
            Ok(())
        }

        async fn await_draft(&mut self) -> Result<SynthesizedRecipe> {
            if self.fail_await {
                return Err(RecipeForgeError::SynthesisProtocol(
                    "synthesis run completed without producing a recipe".into(),
                ));
            }
            Ok(SynthesizedRecipe {
                title: format!("Draft {}", self.inputs.len()),
                ingredients: vec!["flour".into()],
                directions: vec!["bake".into()],
                ..Default::default()
            })
        }

        async fn close(&mut self) {}
    }

    /// Scores drafts from a queue; records which entry point saw each draft.
    struct ScriptedCritic {
        scores: VecDeque<u8>,
        seen: Vec<(&'static str, String)>,
    }

    impl ScriptedCritic {
        fn new(scores: &[u8]) -> Self {
            Self {
                scores: scores.iter().copied().collect(),
                seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl CritiqueAgent for ScriptedCritic {
        async fn start_analysis(&mut self, draft: &SynthesizedRecipe) -> Result<()> {
            self.seen.push(("start", draft.title.clone()));
            Ok(())
        }
        async fn submit_revision(&mut self, draft: &SynthesizedRecipe) -> Result<()> {
            self.seen.push(("revision", draft.title.clone()));
            Ok(())
        }
        async fn wait_for_analysis(&mut self) -> Result<()> {
            Ok(())
        }
        async fn take_analysis(&mut self) -> Result<AnalysisResult> {
            let score = self.scores.pop_front().unwrap_or(0);
            Ok(AnalysisResult {
                quality_score: score,
                analysis: None,
                suggestions: Some(format!("improve {score}")),
            })
        }
        async fn close(&mut self) {}
    }

    fn config(max_attempts: u32) -> SynthesisConfig {
        SynthesisConfig {
            quality_threshold: 80,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn converges_once_threshold_is_met() {
        let mut drafter = ScriptedDrafter::default();
        let mut critic = ScriptedCritic::new(&[60, 75, 85]);

        let recipe = run_synthesis(
            &mut drafter,
            &mut critic,
            "make soup".into(),
            &config(8),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(recipe.attempt_count, 3);
        assert_eq!(recipe.quality_score, Some(85));
        assert_eq!(recipe.revisions.len(), 2);
        assert_eq!(recipe.revisions[0].attempt_count, 1);
        assert_eq!(recipe.revisions[0].quality_score, Some(60));
        assert_eq!(
            recipe.revisions[0].analysis.as_deref(),
            Some(FALLBACK_ANALYSIS)
        );
        assert!(recipe.revisions.iter().all(|r| r.revisions.is_empty()));

        assert_eq!(
            critic.seen,
            vec![
                ("start", "Draft 1".to_string()),
                ("revision", "Draft 2".to_string()),
                ("revision", "Draft 3".to_string()),
            ]
        );
        assert_eq!(drafter.inputs[0], DraftInput::Request("make soup".into()));
        match &drafter.inputs[1] {
            DraftInput::Feedback(result) => {
                assert_eq!(result.quality_score, 60);
                assert_eq!(result.suggestions.as_deref(), Some("improve 60"));
                assert_eq!(result.analysis.as_deref(), Some(FALLBACK_ANALYSIS));
            }
            other => panic!("expected feedback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_at_attempt_cap() {
        let mut drafter = ScriptedDrafter::default();
        let mut critic = ScriptedCritic::new(&[10, 40, 30]);

        let err = run_synthesis(
            &mut drafter,
            &mut critic,
            "make soup".into(),
            &config(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            RecipeForgeError::SynthesisExhausted {
                attempts: 3,
                best_score: 40
            }
        ));
        assert_eq!(drafter.inputs.len(), 3);
    }

    #[tokio::test]
    async fn protocol_errors_end_the_loop() {
        let mut drafter = ScriptedDrafter {
            fail_await: true,
            ..Default::default()
        };
        let mut critic = ScriptedCritic::new(&[90]);

        let err = run_synthesis(
            &mut drafter,
            &mut critic,
            "make soup".into(),
            &config(8),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RecipeForgeError::SynthesisProtocol(_)));
        assert!(critic.seen.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_drafting() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut drafter = ScriptedDrafter::default();
        let mut critic = ScriptedCritic::new(&[90]);

        let err = run_synthesis(&mut drafter, &mut critic, "x".into(), &config(8), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RecipeForgeError::Cancelled));
        assert!(drafter.inputs.is_empty());
    }

    #[test]
    fn prompt_lists_order_and_sources() {
        let order = CookbookOrder {
            cookbook_title: Some("Weeknights".into()),
            dietary_restrictions: vec!["vegetarian".into(), "nut-free".into()],
            servings: Some(4),
            notes: None,
        };
        let sources = vec![
            Recipe {
                title: "Tomato Soup".into(),
                ingredients: vec!["tomatoes".into()],
                directions: vec!["simmer".into()],
                ..Default::default()
            },
            Recipe {
                title: "Roasted Tomato Bisque".into(),
                ..Default::default()
            },
        ];

        let prompt = synthesis_prompt("Tomato Soup", &order, &sources);
        assert!(prompt.starts_with("Create a recipe for \"Tomato Soup\""));
        assert!(prompt.contains("- Cookbook: Weeknights"));
        assert!(prompt.contains("- Servings: 4"));
        assert!(prompt.contains("- Dietary restrictions: vegetarian, nut-free"));
        assert!(prompt.contains("--- Source 2 ---\nTitle: Roasted Tomato Bisque"));
        assert!(prompt.contains("- tomatoes"));
    }
}
