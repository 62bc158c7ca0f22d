//! 执行循环
//!
//! 单个处理器对当前对话的有界「推理 -> 动作 -> 观察」循环。
//! 每轮调用一次推理服务：产出最终回复则结束；产出动作请求则逐个
//! 分级执行，需要审批的动作入账后立即挂起整个循环（挂起点），
//! 其余动作的结果（含失败文本）追加为 action-result Turn 进入下一轮。

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::ActionExecutor;
use crate::approval::{ApprovalLedger, ProposedAction};
use crate::conversation::{Conversation, Turn};
use crate::core::EngineError;
use crate::handler::Handler;
use crate::monitor::MonitoringRecorder;
use crate::reasoning::ReasoningOutcome;
use crate::risk::{self, RiskPolicy};

/// 循环的运行上限
#[derive(Clone, Debug)]
pub struct EngineLimits {
    /// 单次处理器运行允许的推理轮数
    pub max_rounds: usize,
    /// 单次推理调用的超时（秒）
    pub reasoning_timeout_secs: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            reasoning_timeout_secs: 60,
        }
    }
}

/// 循环的终止方式
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// 处理器给出最终回复
    Final,
    /// 某个动作进入审批台账，循环在挂起点返回
    PendingApproval(String),
    /// 轮数耗尽，已追加截断说明 Turn
    Truncated,
}

/// 运行执行循环直到终止。
///
/// 推理服务失败（含超时）视为致命错误向上传播；动作执行失败不致命，
/// 失败文本作为观察进入对话，交由下一轮推理处置。
#[allow(clippy::too_many_arguments)]
pub async fn execution_loop(
    handler: &Handler,
    executor: &ActionExecutor,
    ledger: &ApprovalLedger,
    monitor: &MonitoringRecorder,
    policy: &RiskPolicy,
    limits: &EngineLimits,
    conversation: &mut Conversation,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, EngineError> {
    let handler_token = monitor.begin_handler(&handler.name);
    let reasoning_timeout = Duration::from_secs(limits.reasoning_timeout_secs);

    // 审批请求携带的自然语言意图：当前轮的用户输入
    let intent = conversation
        .last_user_index()
        .map(|idx| conversation.turns()[idx].content.clone())
        .unwrap_or_default();

    let mut round = 0usize;
    loop {
        if cancel.is_cancelled() {
            monitor.fail_handler(handler_token, "cancelled");
            return Err(EngineError::Cancelled);
        }

        if round >= limits.max_rounds {
            warn!(handler = %handler.name, max_rounds = limits.max_rounds, "round limit reached");
            // 截断说明以 final Turn 收尾，保证它成为本轮的可见回复
            conversation.push(Turn::final_answer(
                &handler.name,
                format!(
                    "Reached the round limit ({}) without a final answer. Stopping here; \
                     please narrow the request and try again.",
                    limits.max_rounds
                ),
            ));
            monitor.end_handler(handler_token);
            return Ok(LoopOutcome::Truncated);
        }
        round += 1;
        debug!(handler = %handler.name, round, "reasoning round");

        let outcome = match timeout(reasoning_timeout, handler.reasoning.invoke(conversation.turns()))
            .await
        {
            Err(_) => {
                let detail = format!("reasoning timed out after {}s", limits.reasoning_timeout_secs);
                monitor.record_error(&handler.name, &detail);
                monitor.fail_handler(handler_token, &detail);
                return Err(EngineError::ReasoningFailure {
                    handler: handler.name.clone(),
                    detail,
                });
            }
            Ok(Err(detail)) => {
                monitor.record_error(&handler.name, &detail);
                monitor.fail_handler(handler_token, &detail);
                return Err(EngineError::ReasoningFailure {
                    handler: handler.name.clone(),
                    detail,
                });
            }
            Ok(Ok(outcome)) => outcome,
        };

        match outcome {
            ReasoningOutcome::Final(text) => {
                info!(handler = %handler.name, round, "final answer produced");
                conversation.push(Turn::final_answer(&handler.name, text));
                monitor.end_handler(handler_token);
                return Ok(LoopOutcome::Final);
            }
            ReasoningOutcome::Actions(requests) => {
                let names: Vec<&str> = requests.iter().map(|r| r.action.as_str()).collect();
                conversation.push(Turn::handler(
                    &handler.name,
                    format!("Requesting {} action(s): {}", requests.len(), names.join(", ")),
                    requests.clone(),
                ));

                for mut request in requests {
                    if request.handler.is_empty() {
                        request.handler = handler.name.clone();
                    }

                    let Some(action) = executor.get_action(&request.action) else {
                        let msg = format!("unknown action: {}", request.action);
                        monitor.record_error(&handler.name, &msg);
                        conversation.push(Turn::action_result(&handler.name, format!("Error: {msg}")));
                        continue;
                    };
                    if !handler.allows_action(&request.action) {
                        let msg = format!(
                            "action '{}' is not available to handler '{}'",
                            request.action, handler.name
                        );
                        monitor.record_error(&handler.name, &msg);
                        conversation.push(Turn::action_result(&handler.name, format!("Error: {msg}")));
                        continue;
                    }

                    // 分级在执行之前，基于动作将要运行的载荷
                    let payload = action.payload(&request.args);
                    let (tier, reason) = risk::classify(&payload, policy);

                    if risk::requires_approval(tier, policy) {
                        let action_token = monitor.begin_action(&request.action, &request.args);
                        let approval_id = ledger.propose(ProposedAction {
                            handler: handler.name.clone(),
                            action: request.action.clone(),
                            args: request.args.clone(),
                            intent: intent.clone(),
                            payload: payload.clone(),
                            tier,
                            reason: reason.clone(),
                        });
                        monitor.mark_action_pending(action_token, &approval_id);
                        info!(handler = %handler.name, approval_id = %approval_id, %tier, "action held for approval");
                        conversation.push(Turn::pending_approval(
                            &handler.name,
                            &approval_id,
                            format!(
                                "HUMAN APPROVAL REQUIRED\n\
                                 Approval ID: {approval_id}\n\
                                 Risk tier: {tier}\n\
                                 Reason: {reason}\n\
                                 Payload:\n{payload}\n\n\
                                 Use `approve {approval_id}` or `reject {approval_id}` to resolve."
                            ),
                        ));
                        monitor.end_handler(handler_token);
                        return Ok(LoopOutcome::PendingApproval(approval_id));
                    }

                    let action_token = monitor.begin_action(&request.action, &request.args);
                    match executor.execute(&request.action, request.args.clone()).await {
                        Ok(result) => {
                            monitor.end_action(action_token, Ok(&result));
                            conversation.push(Turn::action_result(&handler.name, result));
                        }
                        Err(err) => {
                            let msg = err.to_string();
                            monitor.end_action(action_token, Err(&msg));
                            conversation
                                .push(Turn::action_result(&handler.name, format!("Error: {msg}")));
                        }
                    }
                }
            }
        }
    }
}
