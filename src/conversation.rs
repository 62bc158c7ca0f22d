//! 对话与 Turn
//!
//! Conversation 是单次编排 run 内追加写入的 Turn 序列，由编排器独占持有。
//! 不变量：首条 Turn 必为 user；action-result Turn 总是跟在产生对应动作的 Turn 之后。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Turn 角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// 用户输入
    User,
    /// 处理器产出（含动作请求）
    Handler,
    /// 动作执行结果（成功、失败文本或待审批提示）
    ActionResult,
    /// 最终回复
    Final,
}

/// 推理服务请求的一次动作调用（简化 JSON：{"action": "query_database", "args": {...}}）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionRequest {
    /// 发起处理器名；推理输出中可省略，由执行循环补全
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub handler: String,
    pub action: String,
    #[serde(default)]
    pub args: Value,
}

/// 对话中的一条记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    /// 产出该 Turn 的处理器；user Turn 为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    pub content: String,
    /// 该 Turn 携带的动作请求（仅 handler Turn 非空）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRequest>,
    /// 若该 Turn 表示「等待审批」，记录对应的审批标识
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            handler: None,
            content: content.into(),
            actions: Vec::new(),
            pending_approval: None,
        }
    }

    pub fn handler(
        handler: impl Into<String>,
        content: impl Into<String>,
        actions: Vec<ActionRequest>,
    ) -> Self {
        Self {
            role: TurnRole::Handler,
            handler: Some(handler.into()),
            content: content.into(),
            actions,
            pending_approval: None,
        }
    }

    pub fn action_result(handler: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::ActionResult,
            handler: Some(handler.into()),
            content: content.into(),
            actions: Vec::new(),
            pending_approval: None,
        }
    }

    /// 待审批的 action-result Turn：content 提示审批方式，pending_approval 携带标识
    pub fn pending_approval(
        handler: impl Into<String>,
        approval_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: TurnRole::ActionResult,
            handler: Some(handler.into()),
            content: content.into(),
            actions: Vec::new(),
            pending_approval: Some(approval_id.into()),
        }
    }

    pub fn final_answer(handler: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Final,
            handler: Some(handler.into()),
            content: content.into(),
            actions: Vec::new(),
            pending_approval: None,
        }
    }
}

/// 单次编排 run 的对话：仅追加，不修改历史
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 最近一条 user Turn 的下标
    pub fn last_user_index(&self) -> Option<usize> {
        self.turns
            .iter()
            .rposition(|t| t.role == TurnRole::User)
    }

    /// 最近一条 user Turn 之后的 Turn 切片（路由器据此判断本轮是否已有处理器产出）
    pub fn turns_since_last_user(&self) -> &[Turn] {
        match self.last_user_index() {
            Some(idx) => &self.turns[idx + 1..],
            None => &self.turns[..],
        }
    }

    /// 提取本轮答案：优先最后一条 final Turn，其次最后一条待审批 Turn
    pub fn extract_answer(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Final || t.pending_approval.is_some())
    }
}
