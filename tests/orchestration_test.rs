//! 编排器端到端测试：路由、执行、审批挂起与恢复、推理失败
//!
//! 推理服务全部使用脚本化 Mock，动作为真实实现（含内存 SQLite）。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use dispatch::actions::{
    ActionExecutor, ActionRegistry, InvestigateLogsAction, QueryDatabaseAction,
    SearchKnowledgeAction,
};
use dispatch::approval::ApprovalLedger;
use dispatch::conversation::{ActionRequest, Conversation, Turn};
use dispatch::core::EngineError;
use dispatch::engine::{EngineLimits, Orchestrator, OrchestratorConfig};
use dispatch::handler::{Handler, HandlerRegistry};
use dispatch::monitor::{MonitoringRecorder, RecordStatus};
use dispatch::reasoning::{MockReasoning, ReasoningOutcome, ReasoningService};
use dispatch::risk::RiskPolicy;

/// 三个处理器各自挂一个脚本化 Mock；动作箱为真实实现
fn build_orchestrator(
    log_mock: MockReasoning,
    db_mock: MockReasoning,
    knowledge_mock: MockReasoning,
) -> Orchestrator {
    build_with_limits(log_mock, db_mock, knowledge_mock, EngineLimits::default())
}

fn build_with_limits(
    log_mock: MockReasoning,
    db_mock: MockReasoning,
    knowledge_mock: MockReasoning,
    limits: EngineLimits,
) -> Orchestrator {
    let mut registry = ActionRegistry::new();
    registry.register(InvestigateLogsAction);
    registry.register(SearchKnowledgeAction);
    registry.register(QueryDatabaseAction::new().unwrap());
    let executor = Arc::new(ActionExecutor::new(registry, 10));

    let mut handlers = HandlerRegistry::new();
    handlers.register(Handler::new(
        "log",
        "log investigation",
        Arc::new(log_mock),
        vec!["investigate_logs".to_string()],
    ));
    handlers.register(Handler::new(
        "db",
        "database queries",
        Arc::new(db_mock),
        vec!["query_database".to_string()],
    ));
    handlers.register(Handler::new(
        "knowledge",
        "documentation lookup",
        Arc::new(knowledge_mock),
        vec!["search_knowledge".to_string()],
    ));

    Orchestrator::new(
        handlers,
        executor,
        Arc::new(ApprovalLedger::new()),
        Arc::new(MonitoringRecorder::new()),
        OrchestratorConfig {
            policy: RiskPolicy::default(),
            limits,
            default_handler: "knowledge".to_string(),
        },
    )
}

fn query_request(query: &str) -> ActionRequest {
    ActionRequest {
        handler: String::new(),
        action: "query_database".to_string(),
        args: json!({ "query": query }),
    }
}

// 低风险读：路由到 db，动作直接执行，无审批，单次处理器调用
#[tokio::test]
async fn test_bounded_read_runs_without_approval() {
    let db = MockReasoning::new();
    db.push_actions(vec![query_request("show all failed orders")]);
    db.push_final("Two failed orders: BAD001 and BAD002, both gateway timeouts.");
    let orchestrator = build_orchestrator(
        MockReasoning::new(),
        db,
        MockReasoning::new(),
    );

    let mut conv = Conversation::new();
    let result = orchestrator
        .handle("show all failed orders", &mut conv)
        .await
        .unwrap();

    assert_eq!(result.handlers_invoked, vec!["db".to_string()]);
    assert!(result.pending_approval.is_none());
    assert!(result.answer.contains("BAD001"));
    assert!(orchestrator.list_pending_approvals().is_empty());

    let summary = orchestrator.monitoring_summary();
    assert_eq!(summary.total_handlers_called, 1);
    assert_eq!(summary.total_actions_called, 1);
    assert_eq!(summary.action_records[0].status, RecordStatus::Completed);
    // 动作观察（查询结果）进入了对话
    assert!(conv
        .turns()
        .iter()
        .any(|t| t.content.contains("DATABASE QUERY RESULTS")));
}

// 写操作：挂起等待审批，最后一条 Turn 携带审批标识
#[tokio::test]
async fn test_write_suspends_for_approval() {
    let db = MockReasoning::new();
    db.push_actions(vec![query_request("delete order ORD-1")]);
    let orchestrator = build_orchestrator(
        MockReasoning::new(),
        db,
        MockReasoning::new(),
    );

    let mut conv = Conversation::new();
    let result = orchestrator
        .handle("delete order ORD-1", &mut conv)
        .await
        .unwrap();

    let approval_id = result.pending_approval.expect("run should suspend");
    assert!(result.answer.contains("HUMAN APPROVAL REQUIRED"));
    assert!(result.answer.contains(&approval_id));

    let last = conv.turns().last().unwrap();
    assert_eq!(last.pending_approval.as_deref(), Some(approval_id.as_str()));

    let pending = orchestrator.list_pending_approvals();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, approval_id);
    assert!(pending[0].payload.contains("DELETE FROM orders"));

    // 动作记录停在 pending 标记上，没有 end
    let summary = orchestrator.monitoring_summary();
    assert_eq!(summary.action_records.len(), 1);
    assert_eq!(
        summary.action_records[0].status,
        RecordStatus::PendingApproval
    );
    assert_eq!(
        summary.action_records[0].approval_id.as_deref(),
        Some(approval_id.as_str())
    );
}

// 批准：动作恰好执行一次，重复决议返回 ApprovalNotFound
#[tokio::test]
async fn test_approve_executes_exactly_once() {
    let db = MockReasoning::new();
    db.push_actions(vec![query_request("delete order ORD-1")]);
    let orchestrator = build_orchestrator(
        MockReasoning::new(),
        db,
        MockReasoning::new(),
    );

    let mut conv = Conversation::new();
    let result = orchestrator
        .handle("delete order ORD-1", &mut conv)
        .await
        .unwrap();
    let approval_id = result.pending_approval.unwrap();

    let outcome = orchestrator
        .resolve_approval(&approval_id, true, None)
        .await
        .unwrap();
    assert!(outcome.contains("APPROVED AND EXECUTED"));
    assert!(orchestrator.list_pending_approvals().is_empty());

    // 重复批准与重复拒绝都拿不到这条请求了
    let err = orchestrator
        .resolve_approval(&approval_id, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ApprovalNotFound(_)));
    let err = orchestrator
        .resolve_approval(&approval_id, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ApprovalNotFound(_)));

    // 挂起记录之外恰好多了一条完成的执行记录
    let summary = orchestrator.monitoring_summary();
    let completed = summary
        .action_records
        .iter()
        .filter(|r| r.status == RecordStatus::Completed)
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_reject_does_not_execute() {
    let db = MockReasoning::new();
    db.push_actions(vec![query_request("delete order ORD-1")]);
    let orchestrator = build_orchestrator(
        MockReasoning::new(),
        db,
        MockReasoning::new(),
    );

    let mut conv = Conversation::new();
    let result = orchestrator
        .handle("delete order ORD-1", &mut conv)
        .await
        .unwrap();
    let approval_id = result.pending_approval.unwrap();

    let outcome = orchestrator
        .resolve_approval(&approval_id, false, Some("not during business hours"))
        .await
        .unwrap();
    assert!(outcome.contains("REJECTED"));
    assert!(outcome.contains("not during business hours"));
    assert!(outcome.contains("was not executed"));
    assert!(orchestrator.list_pending_approvals().is_empty());

    // 没有任何完成的动作记录
    let summary = orchestrator.monitoring_summary();
    assert!(summary
        .action_records
        .iter()
        .all(|r| r.status != RecordStatus::Completed));
}

// 第三轮推理超时：运行立即终止并上报，之后不再有推理调用
struct TimeoutOnThirdRound {
    calls: AtomicUsize,
}

#[async_trait]
impl ReasoningService for TimeoutOnThirdRound {
    async fn invoke(&self, _conversation: &[Turn]) -> Result<ReasoningOutcome, String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= 3 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(ReasoningOutcome::Actions(vec![ActionRequest {
            handler: String::new(),
            action: "investigate_logs".to_string(),
            args: json!({ "query": "recent errors" }),
        }]))
    }
}

#[tokio::test]
async fn test_reasoning_timeout_ends_run() {
    let service = Arc::new(TimeoutOnThirdRound {
        calls: AtomicUsize::new(0),
    });

    let mut registry = ActionRegistry::new();
    registry.register(InvestigateLogsAction);
    let executor = Arc::new(ActionExecutor::new(registry, 10));
    let mut handlers = HandlerRegistry::new();
    handlers.register(Handler::new(
        "log",
        "log investigation",
        service.clone(),
        vec!["investigate_logs".to_string()],
    ));

    let orchestrator = Orchestrator::new(
        handlers,
        executor,
        Arc::new(ApprovalLedger::new()),
        Arc::new(MonitoringRecorder::new()),
        OrchestratorConfig {
            policy: RiskPolicy::default(),
            limits: EngineLimits {
                max_rounds: 5,
                reasoning_timeout_secs: 1,
            },
            default_handler: "log".to_string(),
        },
    );

    let mut conv = Conversation::new();
    let err = orchestrator
        .handle("compare ORD-1 and ORD-2", &mut conv)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ReasoningFailure { .. }));
    assert_eq!(service.calls.load(Ordering::SeqCst), 3);

    let summary = orchestrator.monitoring_summary();
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].error.contains("timed out"));
    assert_eq!(summary.handler_records[0].status, RecordStatus::Error);
}

// 轮数耗尽：截断说明必须成为 run 的可见回复，而非兜底文案
#[tokio::test]
async fn test_round_limit_notice_is_the_answer() {
    let db = MockReasoning::new();
    db.push_actions(vec![query_request("show all failed orders")]);
    db.push_actions(vec![query_request("show all failed orders")]);
    let orchestrator = build_with_limits(
        MockReasoning::new(),
        db,
        MockReasoning::new(),
        EngineLimits {
            max_rounds: 1,
            reasoning_timeout_secs: 5,
        },
    );

    let mut conv = Conversation::new();
    let result = orchestrator
        .handle("show all failed orders", &mut conv)
        .await
        .unwrap();

    assert!(
        result.answer.contains("Reached the round limit"),
        "answer was: {}",
        result.answer
    );
    assert!(result.pending_approval.is_none());
    assert_eq!(result.handlers_invoked, vec!["db".to_string()]);
}

// 慢推理的处理器，用于制造跨 run 的时间交错
struct SlowFinal {
    delay_ms: u64,
    text: &'static str,
}

#[async_trait]
impl ReasoningService for SlowFinal {
    async fn invoke(&self, _conversation: &[Turn]) -> Result<ReasoningOutcome, String> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(ReasoningOutcome::Final(self.text.to_string()))
    }
}

// 并发共享同一编排器：各 run 的 handlers_invoked 只含自己路由到的处理器，
// 即便另一个 run 的监控记录落在本 run 的时间窗内
#[tokio::test]
async fn test_concurrent_runs_attribute_only_own_handlers() {
    let registry = ActionRegistry::new();
    let executor = Arc::new(ActionExecutor::new(registry, 10));
    let mut handlers = HandlerRegistry::new();
    handlers.register(Handler::new(
        "db",
        "database queries",
        Arc::new(SlowFinal {
            delay_ms: 200,
            text: "42 orders in total.",
        }),
        Vec::new(),
    ));
    handlers.register(Handler::new(
        "knowledge",
        "documentation lookup",
        Arc::new(SlowFinal {
            delay_ms: 0,
            text: "Mostly gateway timeouts.",
        }),
        Vec::new(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        handlers,
        executor,
        Arc::new(ApprovalLedger::new()),
        Arc::new(MonitoringRecorder::new()),
        OrchestratorConfig {
            policy: RiskPolicy::default(),
            limits: EngineLimits::default(),
            default_handler: "knowledge".to_string(),
        },
    ));

    let slow = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let mut conv = Conversation::new();
            orchestrator
                .handle("how many orders are there in total?", &mut conv)
                .await
                .unwrap()
        })
    };
    // 等慢 run 进入推理后，在其时间窗内完成另一个 run
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut conv = Conversation::new();
    let fast = orchestrator
        .handle("why do payments fail?", &mut conv)
        .await
        .unwrap();
    let slow = slow.await.unwrap();

    assert_eq!(fast.handlers_invoked, vec!["knowledge".to_string()]);
    assert_eq!(slow.handlers_invoked, vec!["db".to_string()]);
    // 共享记录器本身仍然记下了两次调用
    assert_eq!(orchestrator.monitoring_summary().total_handlers_called, 2);
}

// 路由不变量：一条用户消息至多一次处理器运行，后续消息重新路由
#[tokio::test]
async fn test_one_handler_per_user_message() {
    let db = MockReasoning::new();
    db.push_final("42 orders in total.");
    let knowledge = MockReasoning::new();
    knowledge.push_final("Payments fail mostly on gateway timeouts.");
    let orchestrator = build_orchestrator(MockReasoning::new(), db, knowledge);

    let mut conv = Conversation::new();
    let first = orchestrator
        .handle("how many orders are there in total?", &mut conv)
        .await
        .unwrap();
    assert_eq!(first.handlers_invoked, vec!["db".to_string()]);

    let second = orchestrator
        .handle("why do payments fail?", &mut conv)
        .await
        .unwrap();
    assert_eq!(second.handlers_invoked, vec!["knowledge".to_string()]);
    assert!(second.answer.contains("gateway timeouts"));

    // 两条消息共四个关键 Turn：user / final 交替
    assert_eq!(conv.turns().len(), 4);
}

// 兜底路由：规则全不命中时走 default_handler
#[tokio::test]
async fn test_fallback_routes_to_default_handler() {
    let knowledge = MockReasoning::new();
    knowledge.push_final("Hello! Ask me about orders, logs, or documentation.");
    let orchestrator = build_orchestrator(MockReasoning::new(), MockReasoning::new(), knowledge);

    let mut conv = Conversation::new();
    let result = orchestrator.handle("hi there", &mut conv).await.unwrap();
    assert_eq!(result.handlers_invoked, vec!["knowledge".to_string()]);
}

// 未知动作不致命：失败文本进入对话，处理器可在下一轮收尾
#[tokio::test]
async fn test_unscripted_action_failure_recovers() {
    let db = MockReasoning::new();
    db.push_actions(vec![ActionRequest {
        handler: String::new(),
        action: "drop_table".to_string(),
        args: json!({}),
    }]);
    db.push_final("I cannot do that; only read queries are available.");
    let orchestrator = build_orchestrator(
        MockReasoning::new(),
        db,
        MockReasoning::new(),
    );

    let mut conv = Conversation::new();
    let result = orchestrator
        .handle("show revenue statistics", &mut conv)
        .await
        .unwrap();

    assert!(result.answer.contains("cannot"));
    let summary = orchestrator.monitoring_summary();
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].error.contains("unknown action"));
}
