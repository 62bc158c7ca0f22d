//! 引擎错误类型
//!
//! 分两类传播：推理服务失败与内部不变量破坏对当前 run 是致命的，向上抛给调用方；
//! 单个动作失败 / 超时只记录并转为 action-result Turn，循环继续。

use thiserror::Error;

/// 编排引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    /// 推理服务调用失败（含超时），对当前 run 致命
    #[error("Reasoning service failure ({handler}): {detail}")]
    ReasoningFailure { handler: String, detail: String },

    /// 单个动作执行失败，由执行循环转为 action-result Turn，不致命
    #[error("Action execution failed: {0}")]
    ActionFailed(String),

    /// 动作执行超时，同样转为 action-result Turn
    #[error("Action timeout: {0}")]
    ActionTimeout(String),

    /// 审批标识不存在（已被 approve / reject 消费，或从未存在）
    #[error("Approval not found: {0}")]
    ApprovalNotFound(String),

    /// 路由给出了未注册的处理器名，属于内部不变量破坏
    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    /// 推理输出中的 JSON 无法解析为动作列表
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// 当前 run 被取消
    #[error("Cancelled")]
    Cancelled,
}
