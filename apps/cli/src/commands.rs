//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use recipeforge_core::{ProgressReporter, RecipeOrchestrator};
use recipeforge_discovery::WebDiscovery;
use recipeforge_llm::{LlmService, OpenAiClient};
use recipeforge_shared::{AppConfig, CookbookOrder, init_config, load_config, validate_api_key};
use recipeforge_storage::RecipeStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RecipeForge: find, rank and synthesize recipes.
#[derive(Parser)]
#[command(
    name = "recipeforge",
    version,
    about = "Find recipes by name, rank them, and synthesize new ones from the best sources.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Find recipes for a dish, relaxing and reformulating the query as needed.
    Find {
        /// Dish name.
        name: String,

        /// Minimum relevancy score (0-100).
        #[arg(long)]
        score: Option<u8>,

        /// Model conversation to continue when reformulating the name.
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Rank recipes for a query.
    Search {
        /// Search query.
        query: String,

        /// Only use stored recipes; never scrape the web.
        #[arg(long)]
        local: bool,

        /// Number of recipes to return.
        #[arg(long)]
        count: Option<usize>,

        /// Minimum relevancy score (0-100).
        #[arg(long)]
        score: Option<u8>,
    },

    /// Synthesize a new recipe from stored recipes.
    Synthesize {
        /// Name of the recipe to create.
        name: String,

        /// Id of a stored source recipe (repeatable).
        #[arg(long = "recipe", required = true)]
        recipes: Vec<String>,

        /// Cookbook the recipe is for.
        #[arg(long)]
        cookbook: Option<String>,

        /// Number of servings.
        #[arg(long)]
        servings: Option<u32>,

        /// Dietary restriction (repeatable).
        #[arg(long = "restriction")]
        restrictions: Vec<String>,

        /// Free-form notes for the cook.
        #[arg(long)]
        notes: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "recipeforge=info",
        1 => "recipeforge=debug",
        _ => "recipeforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Find {
            name,
            score,
            conversation,
        } => cmd_find(&name, score, conversation.as_deref()).await,
        Command::Search {
            query,
            local,
            count,
            score,
        } => cmd_search(&query, !local, count, score).await,
        Command::Synthesize {
            name,
            recipes,
            cookbook,
            servings,
            restrictions,
            notes,
        } => {
            let order = CookbookOrder {
                cookbook_title: cookbook,
                dietary_restrictions: restrictions,
                servings,
                notes,
            };
            cmd_synthesize(&name, &recipes, &order).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Build the orchestrator and everything behind it from the user config.
fn build_orchestrator(config: &AppConfig) -> Result<RecipeOrchestrator> {
    let api_key = validate_api_key(config)?;
    let llm: Arc<dyn LlmService> = Arc::new(OpenAiClient::new(&config.llm, api_key)?);
    let store = RecipeStore::from_config(config, llm.clone());
    let discovery = WebDiscovery::new(config, llm.clone(), Arc::new(store.clone()))?;

    Ok(
        RecipeOrchestrator::new(store, llm, Arc::new(discovery), config)
            .with_progress(Arc::new(CliProgress::new())),
    )
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            token.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Flush queued recipe writes, then clear the spinner.
async fn finish(orchestrator: RecipeOrchestrator) {
    orchestrator.store().wait_idle().await;
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_find(name: &str, score: Option<u8>, conversation: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;
    let cancel = cancel_on_ctrl_c();

    let result = orchestrator
        .get_recipes_by_name(name, score, conversation, &cancel)
        .await;
    finish(orchestrator).await;

    let recipes = result?;
    info!(count = recipes.len(), "recipes found");
    print_json(&recipes)
}

async fn cmd_search(
    query: &str,
    scrape: bool,
    count: Option<usize>,
    score: Option<u8>,
) -> Result<()> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;
    let cancel = cancel_on_ctrl_c();

    let result = orchestrator
        .get_recipes(query, scrape, score, count, None, &cancel)
        .await;
    finish(orchestrator).await;

    print_json(&result?)
}

async fn cmd_synthesize(name: &str, ids: &[String], order: &CookbookOrder) -> Result<()> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;
    let cancel = cancel_on_ctrl_c();

    let mut sources = Vec::with_capacity(ids.len());
    for id in ids {
        let recipe = orchestrator
            .store()
            .get_recipe(id)
            .await?
            .ok_or_else(|| eyre!("no stored recipe with id {id}"))?;
        sources.push(recipe);
    }

    let result = orchestrator.synthesize(&sources, order, name, &cancel).await;
    drop(orchestrator);

    print_json(&result?)
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress display
// ---------------------------------------------------------------------------

struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn ranked(&self, query: &str, qualifying: usize, needed: usize) {
        self.spinner
            .set_message(format!("Ranked \"{query}\": {qualifying}/{needed} qualifying"));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}
