//! 动作层：Action trait、注册表、执行器与内置动作

pub mod database;
pub mod echo;
pub mod executor;
pub mod knowledge;
pub mod logs;
pub mod registry;

pub use database::QueryDatabaseAction;
pub use echo::EchoAction;
pub use executor::ActionExecutor;
pub use knowledge::SearchKnowledgeAction;
pub use logs::InvestigateLogsAction;
pub use registry::{Action, ActionRegistry};
