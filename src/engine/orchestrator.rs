//! 编排器
//!
//! 顶层入口：接收用户消息，驱动路由器与执行循环，直到路由器判定
//! 当前用户轮完成（含审批挂起）。审批决议与待审批列表也从这里暴露。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::actions::ActionExecutor;
use crate::approval::{ApprovalLedger, ApprovalRequest};
use crate::conversation::{Conversation, Turn};
use crate::core::EngineError;
use crate::engine::loop_::{execution_loop, EngineLimits, LoopOutcome};
use crate::handler::HandlerRegistry;
use crate::monitor::{MonitoringRecorder, MonitoringSummary};
use crate::risk::RiskPolicy;
use crate::router::{default_rules, RouteDecision, Router};

/// 编排器的静态配置
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub policy: RiskPolicy,
    pub limits: EngineLimits,
    /// 所有路由规则都不命中时使用的处理器
    pub default_handler: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            policy: RiskPolicy::default(),
            limits: EngineLimits::default(),
            default_handler: "knowledge".to_string(),
        }
    }
}

/// 一次 handle 调用的结果
#[derive(Clone, Debug, Serialize)]
pub struct OrchestrationResult {
    pub run_id: String,
    /// 最终回复文本，或待审批提示
    pub answer: String,
    /// 本次运行中被调用的处理器（按首次出现顺序去重)
    pub handlers_invoked: Vec<String>,
    /// 若运行在审批挂起点结束，携带审批标识
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<String>,
    /// 截至 run 结束的监控快照
    pub monitoring: MonitoringSummary,
    pub duration_ms: u64,
}

/// 顶层编排器。共享组件由调用方构造后传入，可跨运行复用。
pub struct Orchestrator {
    handlers: HandlerRegistry,
    executor: Arc<ActionExecutor>,
    ledger: Arc<ApprovalLedger>,
    monitor: Arc<MonitoringRecorder>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        handlers: HandlerRegistry,
        executor: Arc<ActionExecutor>,
        ledger: Arc<ApprovalLedger>,
        monitor: Arc<MonitoringRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            handlers,
            executor,
            ledger,
            monitor,
            config,
        }
    }

    /// 处理一条用户消息。对话由调用方持有，跨消息累积。
    ///
    /// 路由预算为「处理器数量 + 1」次决策，防止路由器实现缺陷导致
    /// 无界循环；正常路径一条消息至多路由一次。
    pub async fn handle(
        &self,
        message: &str,
        conversation: &mut Conversation,
    ) -> Result<OrchestrationResult, EngineError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, "orchestration run started");

        conversation.push(Turn::user(message));

        let mut router = Router::new(default_rules(), &self.config.default_handler);
        let cancel = CancellationToken::new();
        let budget = self.handlers.len() + 1;
        let mut decisions = 0usize;
        // 本次 run 调用过的处理器，按首次出现顺序；直接取自路由决策，
        // 与共享记录器解耦（并发 run 的记录会交错）
        let mut handlers_invoked: Vec<String> = Vec::new();

        while decisions < budget {
            decisions += 1;
            match router.next(conversation) {
                RouteDecision::Complete => break,
                RouteDecision::Handler(name) => {
                    let Some(handler) = self.handlers.get(&name) else {
                        let msg = format!("route target not registered: {name}");
                        error!(run_id = %run_id, "{msg}");
                        self.monitor.record_error("router", &msg);
                        return Err(EngineError::UnknownHandler(name));
                    };
                    info!(run_id = %run_id, handler = %name, "routed");
                    if !handlers_invoked.contains(&name) {
                        handlers_invoked.push(name.clone());
                    }

                    let outcome = execution_loop(
                        handler,
                        &self.executor,
                        &self.ledger,
                        &self.monitor,
                        &self.config.policy,
                        &self.config.limits,
                        conversation,
                        &cancel,
                    )
                    .await?;

                    if matches!(outcome, LoopOutcome::PendingApproval(_)) {
                        break;
                    }
                }
            }
        }

        let (answer, pending_approval) = match conversation.extract_answer() {
            Some(turn) => (turn.content.clone(), turn.pending_approval.clone()),
            None => (
                "No response was generated for this request.".to_string(),
                None,
            ),
        };

        let summary = self.monitor.summary();
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(run_id = %run_id, duration_ms, handlers = ?handlers_invoked, "orchestration run finished");

        Ok(OrchestrationResult {
            run_id,
            answer,
            handlers_invoked,
            pending_approval,
            monitoring: summary,
            duration_ms,
        })
    }

    /// 对一条待审批动作作出决议。
    ///
    /// 批准：从台账取出请求（至多一次），以原始参数执行动作并返回结果文本。
    /// 拒绝：从台账取出请求，不执行，返回拒绝说明。
    pub async fn resolve_approval(
        &self,
        approval_id: &str,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<String, EngineError> {
        if approve {
            let request = self.ledger.approve(approval_id)?;
            info!(approval_id, action = %request.action, "approval granted, executing");

            let token = self.monitor.begin_action(&request.action, &request.args);
            match self
                .executor
                .execute(&request.action, request.args.clone())
                .await
            {
                Ok(result) => {
                    self.monitor.end_action(token, Ok(&result));
                    Ok(format!(
                        "QUERY APPROVED AND EXECUTED\n\
                         Approval ID: {approval_id}\n\
                         Approved at: {}\n\n{result}",
                        Utc::now().to_rfc3339()
                    ))
                }
                Err(err) => {
                    let msg = err.to_string();
                    self.monitor.end_action(token, Err(&msg));
                    self.monitor.record_error("approval", &msg);
                    Ok(format!(
                        "QUERY APPROVED BUT EXECUTION FAILED\n\
                         Approval ID: {approval_id}\n\
                         Error: {msg}"
                    ))
                }
            }
        } else {
            let request = self.ledger.reject(approval_id)?;
            info!(approval_id, action = %request.action, "approval rejected");
            Ok(format!(
                "QUERY REJECTED\n\
                 Approval ID: {approval_id}\n\
                 Reason: {}\n\
                 Original request: \"{}\"\n\
                 The action was not executed.",
                reason.unwrap_or("rejected by operator"),
                request.intent
            ))
        }
    }

    /// 台账中全部待审批请求的快照
    pub fn list_pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.ledger.list_pending()
    }

    pub fn monitoring_summary(&self) -> MonitoringSummary {
        self.monitor.summary()
    }

    /// 清空监控记录。仅应在两次运行之间调用。
    pub fn reset_monitoring(&self) {
        self.monitor.reset();
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.names()
    }
}
