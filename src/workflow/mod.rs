pub mod grading_ctx;
pub mod grading_flow;
pub mod lifecycle;

pub use grading_ctx::GradingCtx;
pub use grading_flow::GradingItemWorkflow;
pub use lifecycle::{LifecycleState, Phase, Trigger};
