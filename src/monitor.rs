//! 监控记录器
//!
//! 进程级只追加的调用台账：处理器调用与动作调用的起止时间、状态与错误。
//! begin_* 返回 token，最终恰好由一次 end_* / fail_* / 终态标记收尾；
//! summary() 给出一致性快照，无活动时两次快照相等（耗时按最后一条记录计算，不随挂钟漂移）。
//! reset() 仅允许在两次编排 run 之间调用；并发 run 建议各持一个实例。

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// 处理器调用记录的句柄
#[derive(Clone, Copy, Debug)]
pub struct HandlerToken(usize);

/// 动作调用记录的句柄
#[derive(Clone, Copy, Debug)]
pub struct ActionToken(usize);

/// 记录状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Started,
    Completed,
    Error,
    /// 动作已入审批台账，等待人工决定；解除后由独立的记录承载实际执行
    PendingApproval,
}

/// 一次处理器调用
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HandlerRecord {
    pub handler: String,
    pub timestamp: DateTime<Utc>,
    pub status: RecordStatus,
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    started: Option<Instant>,
}

/// 一次动作调用
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ActionRecord {
    pub action: String,
    pub args_preview: String,
    pub timestamp: DateTime<Utc>,
    pub status: RecordStatus,
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// PendingApproval 时的审批标识
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(skip)]
    started: Option<Instant>,
}

/// 一般性错误记录（如推理服务失败）
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ErrorRecord {
    pub context: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// summary() 的一致性快照
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MonitoringSummary {
    pub handler_records: Vec<HandlerRecord>,
    pub action_records: Vec<ActionRecord>,
    pub errors: Vec<ErrorRecord>,
    /// 自 reset 起至最后一条记录活动的毫秒数；无活动为 0
    pub total_elapsed_ms: u64,
    pub total_handlers_called: usize,
    pub total_actions_called: usize,
}

struct RecorderInner {
    handlers: Vec<HandlerRecord>,
    actions: Vec<ActionRecord>,
    errors: Vec<ErrorRecord>,
    epoch: Instant,
    /// 最后一次活动距 epoch 的毫秒数，summary 的耗时口径
    last_activity_ms: u64,
}

impl RecorderInner {
    fn new() -> Self {
        Self {
            handlers: Vec::new(),
            actions: Vec::new(),
            errors: Vec::new(),
            epoch: Instant::now(),
            last_activity_ms: 0,
        }
    }

    fn touch(&mut self) {
        self.last_activity_ms = self.epoch.elapsed().as_millis() as u64;
    }
}

/// 监控记录器：内部互斥锁保证并发 run 下的写入安全
pub struct MonitoringRecorder {
    inner: Mutex<RecorderInner>,
}

impl Default for MonitoringRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RecorderInner::new()),
        }
    }

    /// 记录处理器调用开始
    pub fn begin_handler(&self, handler: &str) -> HandlerToken {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        inner.handlers.push(HandlerRecord {
            handler: handler.to_string(),
            timestamp: Utc::now(),
            status: RecordStatus::Started,
            duration_ms: None,
            error: None,
            started: Some(Instant::now()),
        });
        inner.touch();
        HandlerToken(inner.handlers.len() - 1)
    }

    /// 记录处理器正常结束；非 Started 状态上的重复调用被忽略
    pub fn end_handler(&self, token: HandlerToken) {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        if let Some(rec) = inner.handlers.get_mut(token.0) {
            if rec.status == RecordStatus::Started {
                rec.duration_ms = rec.started.map(|s| s.elapsed().as_millis() as u64);
                rec.status = RecordStatus::Completed;
            }
        }
        inner.touch();
    }

    /// 记录处理器异常结束
    pub fn fail_handler(&self, token: HandlerToken, error: &str) {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        if let Some(rec) = inner.handlers.get_mut(token.0) {
            if rec.status == RecordStatus::Started {
                rec.duration_ms = rec.started.map(|s| s.elapsed().as_millis() as u64);
                rec.status = RecordStatus::Error;
                rec.error = Some(error.to_string());
            }
        }
        inner.touch();
    }

    /// 记录动作调用开始
    pub fn begin_action(&self, action: &str, args: &Value) -> ActionToken {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        inner.actions.push(ActionRecord {
            action: action.to_string(),
            args_preview: args_preview(args),
            timestamp: Utc::now(),
            status: RecordStatus::Started,
            duration_ms: None,
            error: None,
            approval_id: None,
            started: Some(Instant::now()),
        });
        inner.touch();
        ActionToken(inner.actions.len() - 1)
    }

    /// 记录动作结束：Ok 为 Completed，Err 为 Error（错误文本入账）
    pub fn end_action(&self, token: ActionToken, outcome: Result<&str, &str>) {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        if let Some(rec) = inner.actions.get_mut(token.0) {
            if rec.status == RecordStatus::Started {
                rec.duration_ms = rec.started.map(|s| s.elapsed().as_millis() as u64);
                match outcome {
                    Ok(_) => rec.status = RecordStatus::Completed,
                    Err(e) => {
                        rec.status = RecordStatus::Error;
                        rec.error = Some(e.to_string());
                    }
                }
            }
        }
        inner.touch();
    }

    /// 标记动作进入待审批：记录终止于 PendingApproval，实际执行另起记录
    pub fn mark_action_pending(&self, token: ActionToken, approval_id: &str) {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        if let Some(rec) = inner.actions.get_mut(token.0) {
            if rec.status == RecordStatus::Started {
                rec.duration_ms = rec.started.map(|s| s.elapsed().as_millis() as u64);
                rec.status = RecordStatus::PendingApproval;
                rec.approval_id = Some(approval_id.to_string());
            }
        }
        inner.touch();
    }

    /// 一般性错误（推理失败、内部不变量破坏等）
    pub fn record_error(&self, context: &str, error: &str) {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        inner.errors.push(ErrorRecord {
            context: context.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        inner.touch();
        tracing::warn!(context = context, error = error, "engine error recorded");
    }

    /// 一致性快照
    pub fn summary(&self) -> MonitoringSummary {
        let inner = self.inner.lock().expect("monitor poisoned");
        MonitoringSummary {
            handler_records: inner.handlers.clone(),
            action_records: inner.actions.clone(),
            errors: inner.errors.clone(),
            total_elapsed_ms: inner.last_activity_ms,
            total_handlers_called: inner.handlers.len(),
            total_actions_called: inner.actions.len(),
        }
    }

    /// 清空全部状态并重置耗时起点。前置条件：没有进行中的 run。
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("monitor poisoned");
        *inner = RecorderInner::new();
    }
}

/// 参数 JSON 的截断预览：超过 200 个字符时在字符边界截断再加省略号
pub(crate) fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    match s.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s,
    }
}
