//! 推理服务层：抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockReasoning;
pub use openai::OpenAiReasoning;
pub use traits::{parse_reasoning_output, ReasoningOutcome, ReasoningService};
