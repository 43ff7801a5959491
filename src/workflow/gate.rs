use tracing::info;

use crate::workflow::state::NodeId;

/// Routes the workflow after enrichment. Pure function of the counts so the
/// retry bound is easy to audit: at least one enriched recipe means success,
/// otherwise relax until the retry budget is spent, then report failure.
pub fn decide_next(enriched_count: usize, retry_count: u32, max_retries: u32) -> NodeId {
    let next = if enriched_count > 0 {
        NodeId::Explain
    } else if retry_count < max_retries {
        NodeId::Relax
    } else {
        NodeId::Fail
    };
    info!(enriched_count, retry_count, next = ?next, "quality gate decision");
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_enriched_recipe_routes_to_explanation() {
        assert_eq!(decide_next(1, 0, 2), NodeId::Explain);
        assert_eq!(decide_next(12, 2, 2), NodeId::Explain);
    }

    #[test]
    fn empty_results_relax_until_budget_spent() {
        assert_eq!(decide_next(0, 0, 2), NodeId::Relax);
        assert_eq!(decide_next(0, 1, 2), NodeId::Relax);
        assert_eq!(decide_next(0, 2, 2), NodeId::Fail);
        assert_eq!(decide_next(0, 3, 2), NodeId::Fail);
    }

    #[test]
    fn zero_retry_budget_fails_immediately() {
        assert_eq!(decide_next(0, 0, 0), NodeId::Fail);
    }
}
