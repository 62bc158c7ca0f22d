//! 引擎层：执行循环与顶层编排器

pub mod loop_;
pub mod orchestrator;

pub use loop_::{execution_loop, EngineLimits, LoopOutcome};
pub use orchestrator::{OrchestrationResult, Orchestrator, OrchestratorConfig};
