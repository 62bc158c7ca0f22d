//! 动作风险分级与审批策略
//!
//! classify 是纯函数：同一 payload 与同一敏感资源集必然得到同一 (tier, reason)。
//! 规则按序匹配，首个命中生效：写操作 -> high；敏感资源 -> medium；
//! 无结果上限的读 -> medium；其余 -> low。

use serde::{Deserialize, Serialize};

/// 风险层级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// 审批策略：启动时加载一次，运行期只读
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// 总开关；关闭后所有动作直接执行
    pub enabled: bool,
    /// 写操作（INSERT / UPDATE / DELETE / DDL）必须审批
    pub require_approval_for_writes: bool,
    /// 触及敏感资源的查询必须审批
    pub require_approval_for_sensitive_tables: bool,
    /// 带 LIMIT 的只读查询自动放行
    pub auto_approve_safe_queries: bool,
    /// 敏感资源名集合
    pub sensitive_tables: Vec<String>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            require_approval_for_writes: true,
            require_approval_for_sensitive_tables: true,
            auto_approve_safe_queries: true,
            sensitive_tables: vec![
                "users".to_string(),
                "payments".to_string(),
                "credentials".to_string(),
                "api_keys".to_string(),
            ],
        }
    }
}

/// 被视为写操作的 SQL 关键词，按序检查
const WRITE_OPERATIONS: [&str; 7] = [
    "UPDATE", "DELETE", "INSERT", "DROP", "ALTER", "TRUNCATE", "CREATE",
];

/// 对动作 payload 分级，返回 (tier, reason)。无副作用。
pub fn classify(payload: &str, policy: &RiskPolicy) -> (RiskTier, String) {
    let upper = payload.to_uppercase();

    for op in WRITE_OPERATIONS {
        if upper.contains(op) {
            return (
                RiskTier::High,
                format!("payload contains write operation: {op}"),
            );
        }
    }

    for table in &policy.sensitive_tables {
        if upper.contains(&table.to_uppercase()) {
            return (
                RiskTier::Medium,
                format!("payload references sensitive resource: {table}"),
            );
        }
    }

    if upper.contains("SELECT") && !upper.contains("LIMIT") {
        return (RiskTier::Medium, "unbounded read".to_string());
    }

    (RiskTier::Low, "bounded read-only".to_string())
}

/// 按策略判断该层级是否需要人工审批
pub fn requires_approval(tier: RiskTier, policy: &RiskPolicy) -> bool {
    if !policy.enabled {
        return false;
    }
    match tier {
        RiskTier::High => policy.require_approval_for_writes,
        RiskTier::Medium => policy.require_approval_for_sensitive_tables,
        RiskTier::Low => !policy.auto_approve_safe_queries,
    }
}
