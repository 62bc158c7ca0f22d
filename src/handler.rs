//! 处理器描述与注册表
//!
//! Handler 是一个具名专家：推理服务 + 可用动作名集合 + 能力描述。
//! 注册后不可变；注册表保持注册顺序（编排器的总轮数预算依从处理器数量推导）。

use std::sync::Arc;

use crate::reasoning::ReasoningService;

/// 处理器描述：名称唯一，注册后不可变
pub struct Handler {
    pub name: String,
    /// 能力摘要（路由说明与文档用）
    pub capability: String,
    pub reasoning: Arc<dyn ReasoningService>,
    /// 该处理器可用的动作名（有序）；空表示不允许任何动作
    pub actions: Vec<String>,
}

impl Handler {
    pub fn new(
        name: impl Into<String>,
        capability: impl Into<String>,
        reasoning: Arc<dyn ReasoningService>,
        actions: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            capability: capability.into(),
            reasoning,
            actions,
        }
    }

    /// 该处理器是否允许请求指定动作
    pub fn allows_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// 处理器注册表：按注册顺序保存
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::MockReasoning;

    #[test]
    fn test_registry_preserves_order_and_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.register(Handler::new(
            "log",
            "log investigation",
            Arc::new(MockReasoning::new()),
            vec!["investigate_logs".to_string()],
        ));
        registry.register(Handler::new(
            "db",
            "database queries",
            Arc::new(MockReasoning::new()),
            vec!["query_database".to_string()],
        ));

        assert_eq!(registry.names(), vec!["log", "db"]);
        let db = registry.get("db").unwrap();
        assert!(db.allows_action("query_database"));
        assert!(!db.allows_action("investigate_logs"));
        assert!(registry.get("missing").is_none());
    }
}
