pub mod llm_grader;
pub mod llm_service;

pub use llm_grader::{LlmGrader, LlmGradingService};
pub use llm_service::{ChatModel, LlmService};
