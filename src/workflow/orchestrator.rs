use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::constraints::{normalize_constraints, MealRecommendationRequest, NormalizedConstraints};
use crate::corpus::RecipeCorpus;
use crate::embedding::Embedder;
use crate::error::WorkflowError;
use crate::llm::CompletionClient;
use crate::nutrition::{NutritionCache, NutritionEnricher, NutritionResolver};
use crate::planning::{LlmPlanner, Planner};
use crate::retrieval::RetrievalEngine;
use crate::workflow::explain::{ExplanationGenerator, FailureReporter, MealRecommendation};
use crate::workflow::gate::decide_next;
use crate::workflow::relaxer::{LlmRelaxer, Relaxer};
use crate::workflow::state::{NodeId, WorkflowState};

/// Terminal output of one workflow invocation. A failure is a normal
/// response, not an `Err`; `timed_out` distinguishes the deadline case from
/// constraint exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealRecommendationResponse {
    pub success: bool,
    pub recommendation: Option<MealRecommendation>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub conflicting_constraints: Vec<String>,
    pub timed_out: bool,
    pub retries_used: u32,
    /// Constraints in effect at termination, relaxations included.
    pub final_constraints: Option<NormalizedConstraints>,
}

/// Drives the node graph as a bounded loop. Termination is guaranteed by
/// the quality gate: every pass through Relax increments the retry counter,
/// and the gate stops relaxing once the budget is spent.
pub struct WorkflowOrchestrator<'a> {
    corpus: &'a RecipeCorpus,
    embedder: &'a dyn Embedder,
    resolver: &'a dyn NutritionResolver,
    client: &'a dyn CompletionClient,
    config: WorkflowConfig,
    nutrition_cache: NutritionCache,
}

impl<'a> WorkflowOrchestrator<'a> {
    pub fn new(
        corpus: &'a RecipeCorpus,
        embedder: &'a dyn Embedder,
        resolver: &'a dyn NutritionResolver,
        client: &'a dyn CompletionClient,
        config: WorkflowConfig,
    ) -> Self {
        let nutrition_cache = NutritionCache::new(config.nutrition_cache_ttl);
        Self {
            corpus,
            embedder,
            resolver,
            client,
            config,
            nutrition_cache,
        }
    }

    /// Runs the workflow under the invocation deadline. Structurally invalid
    /// constraints are the only fatal error; everything else resolves into a
    /// response.
    pub async fn run(
        &self,
        request: MealRecommendationRequest,
    ) -> Result<MealRecommendationResponse, WorkflowError> {
        let timeout = self.config.invocation_timeout;
        match tokio::time::timeout(timeout, self.run_to_completion(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "workflow deadline exceeded");
                let error = WorkflowError::Timeout {
                    timeout_secs: timeout.as_secs(),
                };
                Ok(MealRecommendationResponse {
                    success: false,
                    recommendation: None,
                    error_message: Some(error.to_string()),
                    suggestions: vec![
                        "Try again with a smaller recipe corpus or fewer constraints.".to_string(),
                    ],
                    conflicting_constraints: Vec::new(),
                    timed_out: true,
                    retries_used: 0,
                    final_constraints: None,
                })
            }
        }
    }

    async fn run_to_completion(
        &self,
        request: MealRecommendationRequest,
    ) -> Result<MealRecommendationResponse, WorkflowError> {
        let planner = LlmPlanner::new(self.client);
        let relaxer = LlmRelaxer::new(self.client, &self.config);
        let explainer = ExplanationGenerator::new(self.client);
        let reporter = FailureReporter::new(self.client);
        let engine = RetrievalEngine::new(self.corpus, self.embedder, &self.config);
        let enricher = NutritionEnricher::new(self.resolver, &self.nutrition_cache, &self.config);

        let mut state = WorkflowState::new(request);
        let pantry = state.pantry_item_names();
        let mut node = NodeId::Normalize;

        loop {
            match node {
                NodeId::Normalize => {
                    let constraints = normalize_constraints(&state.request, &self.config)?;
                    state.original_exclusions = constraints.excluded_ingredients.clone();
                    info!(query = %constraints.semantic_query, "constraints normalized");
                    state.constraints = Some(constraints);
                    node = NodeId::Plan;
                }
                NodeId::Plan => {
                    let constraints = state
                        .constraints
                        .as_ref()
                        .ok_or_else(|| WorkflowError::Corpus("planning before normalization".into()))?;
                    state.plan = Some(planner.plan(constraints, &pantry).await);
                    node = NodeId::Retrieve;
                }
                NodeId::Retrieve => {
                    let (constraints, plan) = match (&state.constraints, &state.plan) {
                        (Some(c), Some(p)) => (c, p),
                        _ => {
                            return Err(WorkflowError::Corpus(
                                "retrieval before planning".into(),
                            ))
                        }
                    };
                    state.candidates = engine
                        .retrieve(plan, constraints, &pantry)
                        .map_err(|e| WorkflowError::Corpus(e.to_string()))?;
                    node = NodeId::Enrich;
                }
                NodeId::Enrich => {
                    let constraints = state
                        .constraints
                        .as_ref()
                        .ok_or_else(|| WorkflowError::Corpus("enrichment before normalization".into()))?;
                    state.enriched = enricher.enrich(&state.candidates, constraints);
                    node = NodeId::Gate;
                }
                NodeId::Gate => {
                    node = decide_next(
                        state.enriched.len(),
                        state.retry_count,
                        self.config.max_retries,
                    );
                }
                NodeId::Relax => {
                    let constraints = state
                        .constraints
                        .as_ref()
                        .ok_or_else(|| WorkflowError::Corpus("relaxation before normalization".into()))?;
                    match relaxer.relax(constraints, state.retry_count).await {
                        Some(relaxation) => {
                            let mut next = relaxation.constraints;
                            // The safety set is restored wholesale; no relaxer
                            // implementation can shrink it.
                            next.excluded_ingredients = state.original_exclusions.clone();
                            // A broadened query must reach the retrieval pass;
                            // the rest of the plan is kept as planned.
                            if let Some(plan) = state.plan.as_mut() {
                                if next.semantic_query != constraints.semantic_query {
                                    plan.search_query = next.semantic_query.clone();
                                }
                            }
                            state.relaxation_log.push(relaxation.description);
                            state.constraints = Some(next);
                            state.retry_count += 1;
                            node = NodeId::Retrieve;
                        }
                        None => node = NodeId::Fail,
                    }
                }
                NodeId::Explain => {
                    let constraints = state
                        .constraints
                        .as_ref()
                        .ok_or_else(|| WorkflowError::Corpus("explanation before normalization".into()))?;
                    let top = state.enriched.first().ok_or_else(|| {
                        WorkflowError::Corpus("explanation with no enriched recipe".into())
                    })?;
                    let recommendation = explainer.explain(top, constraints).await;
                    info!(
                        recipe = %recommendation.title,
                        retries = state.retry_count,
                        "workflow succeeded"
                    );
                    return Ok(MealRecommendationResponse {
                        success: true,
                        recommendation: Some(recommendation),
                        error_message: None,
                        suggestions: Vec::new(),
                        conflicting_constraints: Vec::new(),
                        timed_out: false,
                        retries_used: state.retry_count,
                        final_constraints: Some(constraints.clone()),
                    });
                }
                NodeId::Fail => {
                    let constraints = state
                        .constraints
                        .as_ref()
                        .ok_or_else(|| WorkflowError::Corpus("failure report before normalization".into()))?;
                    let payload = reporter
                        .report(constraints, &state.relaxation_log, state.retry_count)
                        .await;
                    info!(retries = state.retry_count, "workflow exhausted");
                    return Ok(MealRecommendationResponse {
                        success: false,
                        recommendation: None,
                        error_message: Some(payload.error_message),
                        suggestions: payload.suggestions,
                        conflicting_constraints: payload.conflicting_constraints,
                        timed_out: false,
                        retries_used: state.retry_count,
                        final_constraints: Some(constraints.clone()),
                    });
                }
            }
        }
    }
}
