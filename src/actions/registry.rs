//! 动作注册表
//!
//! 所有动作实现 Action trait（name / description / payload / execute），由 ActionRegistry
//! 按名注册与查找；ActionExecutor 在调用时加超时并统一转 EngineError。
//! payload 返回「若执行将发生什么」的具体载荷（如生成的 SQL），供风险分级在执行前进行。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 动作 trait：名称、描述（供推理服务理解）、参数 schema、载荷预览、异步执行（args 为 JSON）
#[async_trait]
pub trait Action: Send + Sync {
    /// 动作名称（推理输出 JSON 中的 "action" 字段）
    fn name(&self) -> &str;

    /// 动作描述（供推理服务理解功能与参数格式）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象表示无参数或格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 给定参数时的执行载荷（风险分级的输入）。
    /// 默认为参数本身的 JSON 文本；会生成 SQL 等具体语句的动作应覆盖为生成结果，
    /// 且必须与 execute 实际执行的内容一致（确定性生成）。
    fn payload(&self, args: &Value) -> String {
        args.to_string()
    }

    /// 执行动作
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 动作注册表：按名称存储 Arc<dyn Action>
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Action + 'static) {
        let name = action.name().to_string();
        self.actions.insert(name, Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| format!("Unknown action: {name}"))?;
        action.execute(args).await
    }

    /// 指定动作子集的 schema JSON（供处理器 system prompt 使用）
    pub fn schema_json_for(&self, names: &[String]) -> String {
        let actions: Vec<Value> = names
            .iter()
            .filter_map(|n| self.actions.get(n))
            .map(|action| {
                serde_json::json!({
                    "name": action.name(),
                    "description": action.description(),
                    "parameters": action.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&actions).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::EchoAction;

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ActionRegistry::new();
        registry.register(EchoAction);

        let result = registry
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, "hi");
    }

    #[tokio::test]
    async fn test_unknown_action_is_error() {
        let registry = ActionRegistry::new();
        let result = registry.execute("missing", serde_json::json!({})).await;
        assert!(result.unwrap_err().contains("Unknown action"));
    }

    #[test]
    fn test_default_payload_is_args_json() {
        let action = EchoAction;
        let args = serde_json::json!({"text": "hi"});
        assert_eq!(action.payload(&args), args.to_string());
    }
}
