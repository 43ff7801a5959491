pub mod explain;
pub mod gate;
pub mod orchestrator;
pub mod relaxer;
pub mod state;

pub use explain::{FailurePayload, MealRecommendation};
pub use orchestrator::{MealRecommendationResponse, WorkflowOrchestrator};
pub use state::{NodeId, WorkflowState};
