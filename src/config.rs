use std::time::Duration;

/// Tunable workflow constants.
///
/// The exact values are implementation choices, not load-bearing for
/// correctness; tests override them freely.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Half-width of the calorie window built from a point target.
    pub calorie_half_width: u32,
    /// How much each side of the calorie range widens per relaxation.
    pub calorie_relax_step: u32,
    /// Relative tolerance applied to macro gram targets.
    pub macro_tolerance: f32,
    /// Maximum number of ConstraintRelaxer passes per invocation.
    pub max_retries: u32,
    /// Candidates fetched from the vector index before filtering.
    pub semantic_top_k: usize,
    /// Candidate list cap after retrieval ranking.
    pub retrieval_cap: usize,
    /// Candidate list cap after nutrition filtering.
    pub enriched_cap: usize,
    /// Fraction of unresolved ingredients above which a candidate is dropped.
    pub max_unresolved_fraction: f32,
    /// Wall-clock ceiling for one invocation.
    pub invocation_timeout: Duration,
    /// TTL for shared nutrition cache entries.
    pub nutrition_cache_ttl: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            calorie_half_width: 50,
            calorie_relax_step: 100,
            macro_tolerance: 0.15,
            max_retries: 2,
            semantic_top_k: 100,
            retrieval_cap: 25,
            enriched_cap: 12,
            max_unresolved_fraction: 0.5,
            invocation_timeout: Duration::from_secs(300),
            nutrition_cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}
