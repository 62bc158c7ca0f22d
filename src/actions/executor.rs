//! 动作执行器
//!
//! 持有 ActionRegistry 与全局超时，execute(action_name, args) 在超时内调用 registry.execute，
//! 超时或失败时转为 EngineError（ActionTimeout / ActionFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::actions::ActionRegistry;
use crate::core::EngineError;
use crate::monitor::args_preview;

/// 动作执行器：对每次调用施加超时，并将结果映射为 EngineError
pub struct ActionExecutor {
    registry: ActionRegistry,
    timeout: Duration,
}

impl ActionExecutor {
    pub fn new(registry: ActionRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定动作；超时返回 ActionTimeout，动作返回 Err 则转为 ActionFailed；输出 JSON 审计日志
    pub async fn execute(
        &self,
        action_name: &str,
        args: serde_json::Value,
    ) -> Result<String, EngineError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(action_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": action_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(EngineError::ActionFailed(e)),
            Err(_) => Err(EngineError::ActionTimeout(action_name.to_string())),
        }
    }

    pub fn get_action(&self, name: &str) -> Option<std::sync::Arc<dyn crate::actions::Action>> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}
