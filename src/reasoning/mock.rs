//! Mock 推理服务（用于测试，无需 API）
//!
//! 按脚本顺序弹出预置产出；预置 Err 可模拟推理服务故障。
//! 脚本耗尽后回落为固定最终回复。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::reasoning::{ReasoningOutcome, ReasoningService};

/// 脚本化 Mock：每次 invoke 弹出队首产出
#[derive(Default)]
pub struct MockReasoning {
    script: Mutex<VecDeque<Result<ReasoningOutcome, String>>>,
}

impl MockReasoning {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单条固定最终回复
    pub fn final_answer(text: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.push(Ok(ReasoningOutcome::Final(text.into())));
        mock
    }

    /// 追加一条脚本产出
    pub fn push(&self, outcome: Result<ReasoningOutcome, String>) {
        self.script
            .lock()
            .expect("mock script poisoned")
            .push_back(outcome);
    }

    pub fn push_final(&self, text: impl Into<String>) {
        self.push(Ok(ReasoningOutcome::Final(text.into())));
    }

    pub fn push_actions(&self, actions: Vec<crate::conversation::ActionRequest>) {
        self.push(Ok(ReasoningOutcome::Actions(actions)));
    }

    pub fn push_failure(&self, detail: impl Into<String>) {
        self.push(Err(detail.into()));
    }
}

#[async_trait]
impl ReasoningService for MockReasoning {
    async fn invoke(&self, _conversation: &[Turn]) -> Result<ReasoningOutcome, String> {
        self.script
            .lock()
            .expect("mock script poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ReasoningOutcome::Final("(no scripted reply)".to_string())))
    }
}
