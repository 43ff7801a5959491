use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use meal_recommender::cli::parse_args;
use meal_recommender::constraints::MealRecommendationRequest;
use meal_recommender::corpus::{load_recipe_corpus, RecipeCorpus};
use meal_recommender::embedding::Model2VecEmbedder;
use meal_recommender::llm::LlmClient;
use meal_recommender::nutrition::TableResolver;
use meal_recommender::workflow::WorkflowOrchestrator;
use meal_recommender::WorkflowConfig;

const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();

    let mut config = WorkflowConfig::default();
    if let Some(secs) = args.timeout_secs {
        config.invocation_timeout = Duration::from_secs(secs);
    }

    info!(path = %args.corpus_file.display(), "loading recipe corpus");
    let recipes = load_recipe_corpus(&args.corpus_file).with_context(|| {
        format!("failed to load recipe corpus '{}'", args.corpus_file.display())
    })?;

    info!("loading embedding model");
    let embedder = Model2VecEmbedder::new().context("failed to load embedding model")?;

    info!(recipes = recipes.len(), "building corpus index");
    let corpus = RecipeCorpus::build(recipes, &embedder).context("failed to index corpus")?;

    let resolver = TableResolver::from_csv(&args.nutrition_file).with_context(|| {
        format!(
            "failed to load nutrition table '{}'",
            args.nutrition_file.display()
        )
    })?;

    let request_json = tokio::fs::read_to_string(&args.request_file)
        .await
        .with_context(|| format!("failed to read request '{}'", args.request_file.display()))?;
    let request: MealRecommendationRequest =
        serde_json::from_str(&request_json).context("request file is not valid JSON")?;

    let client = LlmClient::new(API_KEY_ENV_VAR);
    let orchestrator = WorkflowOrchestrator::new(&corpus, &embedder, &resolver, &client, config);

    let response = orchestrator.run(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
