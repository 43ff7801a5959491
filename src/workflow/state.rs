use std::collections::BTreeSet;

use crate::constraints::{MealRecommendationRequest, NormalizedConstraints};
use crate::nutrition::EnrichedRecipe;
use crate::planning::SearchPlan;
use crate::retrieval::RetrievedCandidate;

/// Nodes of the recommendation workflow. The orchestrator walks these in a
/// bounded loop; routing decisions live in the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    Normalize,
    Plan,
    Retrieve,
    Enrich,
    Gate,
    Relax,
    Explain,
    Fail,
}

/// Everything a single workflow invocation accumulates while it runs.
#[derive(Debug)]
pub struct WorkflowState {
    pub request: MealRecommendationRequest,
    pub constraints: Option<NormalizedConstraints>,
    /// Exclusions as first normalized; relaxation must never shrink these.
    pub original_exclusions: BTreeSet<String>,
    pub plan: Option<SearchPlan>,
    pub candidates: Vec<RetrievedCandidate>,
    pub enriched: Vec<EnrichedRecipe>,
    pub retry_count: u32,
    /// Human-readable record of every relaxation applied, in order.
    pub relaxation_log: Vec<String>,
}

impl WorkflowState {
    pub fn new(request: MealRecommendationRequest) -> Self {
        Self {
            request,
            constraints: None,
            original_exclusions: BTreeSet::new(),
            plan: None,
            candidates: Vec::new(),
            enriched: Vec::new(),
            retry_count: 0,
            relaxation_log: Vec::new(),
        }
    }

    pub fn pantry_item_names(&self) -> Vec<String> {
        self.request
            .pantry_items
            .iter()
            .map(|item| item.name.to_lowercase())
            .collect()
    }
}
