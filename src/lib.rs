pub mod api_connection;
pub mod cli;
pub mod config;
pub mod constraints;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod nutrition;
pub mod planning;
pub mod retrieval;
pub mod workflow;

pub use config::WorkflowConfig;
pub use constraints::MealRecommendationRequest;
pub use error::WorkflowError;
pub use workflow::{MealRecommendationResponse, WorkflowOrchestrator};
