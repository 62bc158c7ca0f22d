//! 审批台账
//!
//! 风险动作先 propose 入账，挂起等待人工决定；approve / reject 移除并返回请求本体，
//! 对同一标识至多成功一次，之后一律 ApprovalNotFound。单个标识上的操作由互斥锁保证线性化。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::EngineError;
use crate::risk::RiskTier;

/// 一条等待审批的动作请求
#[derive(Clone, Debug, Serialize)]
pub struct ApprovalRequest {
    /// 台账内唯一标识，形如 apr-3
    pub id: String,
    /// 发起处理器名
    pub handler: String,
    /// 动作名与参数，批准后据此执行
    pub action: String,
    pub args: Value,
    /// 自然语言意图（来自用户请求）
    pub intent: String,
    /// 具体载荷（如生成的 SQL），供审批人查看
    pub payload: String,
    pub tier: RiskTier,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// 入账时由调用方提供的字段（id 与时间戳由台账补全）
#[derive(Clone, Debug)]
pub struct ProposedAction {
    pub handler: String,
    pub action: String,
    pub args: Value,
    pub intent: String,
    pub payload: String,
    pub tier: RiskTier,
    pub reason: String,
}

/// 进程级共享的审批台账；所有操作并发安全
#[derive(Default)]
pub struct ApprovalLedger {
    seq: AtomicU64,
    /// 按创建顺序保存，list_pending 直接快照
    pending: Mutex<Vec<ApprovalRequest>>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入账：分配新标识并保存为 pending。总是成功。
    pub fn propose(&self, proposed: ProposedAction) -> String {
        let id = format!("apr-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let request = ApprovalRequest {
            id: id.clone(),
            handler: proposed.handler,
            action: proposed.action,
            args: proposed.args,
            intent: proposed.intent,
            payload: proposed.payload,
            tier: proposed.tier,
            reason: proposed.reason,
            created_at: Utc::now(),
        };
        let mut pending = self.pending.lock().expect("approval ledger poisoned");
        pending.push(request);
        tracing::info!(approval_id = %id, "approval proposed");
        id
    }

    /// 批准：移除并返回请求，由调用方执行。重复调用返回 ApprovalNotFound。
    pub fn approve(&self, id: &str) -> Result<ApprovalRequest, EngineError> {
        self.take(id)
    }

    /// 驳回：同样的移除语义，不执行
    pub fn reject(&self, id: &str) -> Result<ApprovalRequest, EngineError> {
        self.take(id)
    }

    fn take(&self, id: &str) -> Result<ApprovalRequest, EngineError> {
        let mut pending = self.pending.lock().expect("approval ledger poisoned");
        match pending.iter().position(|r| r.id == id) {
            Some(idx) => Ok(pending.remove(idx)),
            None => Err(EngineError::ApprovalNotFound(id.to_string())),
        }
    }

    /// pending 快照，按创建时间排序
    pub fn list_pending(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .expect("approval ledger poisoned")
            .clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("approval ledger poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskTier;
    use std::sync::Arc;

    fn proposed(intent: &str) -> ProposedAction {
        ProposedAction {
            handler: "db".to_string(),
            action: "query_database".to_string(),
            args: serde_json::json!({"query": intent}),
            intent: intent.to_string(),
            payload: "DELETE FROM orders".to_string(),
            tier: RiskTier::High,
            reason: "payload contains write operation: DELETE".to_string(),
        }
    }

    #[test]
    fn test_approve_is_at_most_once() {
        let ledger = ApprovalLedger::new();
        let id = ledger.propose(proposed("delete order"));

        assert!(ledger.approve(&id).is_ok());
        assert!(matches!(
            ledger.approve(&id),
            Err(EngineError::ApprovalNotFound(_))
        ));
        assert!(matches!(
            ledger.reject(&id),
            Err(EngineError::ApprovalNotFound(_))
        ));
    }

    #[test]
    fn test_reject_removes_without_execution_path() {
        let ledger = ApprovalLedger::new();
        let id = ledger.propose(proposed("drop table"));

        let req = ledger.reject(&id).unwrap();
        assert_eq!(req.id, id);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn test_list_pending_is_creation_ordered() {
        let ledger = ApprovalLedger::new();
        let a = ledger.propose(proposed("first"));
        let b = ledger.propose(proposed("second"));

        let pending = ledger.list_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, a);
        assert_eq!(pending[1].id, b);
    }

    #[tokio::test]
    async fn test_concurrent_propose_ids_never_collide() {
        let ledger = Arc::new(ApprovalLedger::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger.propose(proposed("concurrent"))
            }));
        }
        let mut ids = Vec::new();
        for t in tasks {
            ids.push(t.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
    }
}
