//! 监督路由状态机
//!
//! next(conversation) 返回下一个处理器名或 Complete。状态机：awaiting-route -> routed -> complete；
//! 新的 user Turn 使状态回到 awaiting-route。同一 user Turn 内一旦已有处理器产出即 Complete，
//! 保证每个路由决策点至多触发一次处理器调用，整体循环必然终止。
//! 规则是有序的 (predicate, target) 列表，按优先级求值，便于单独测试。

use std::sync::OnceLock;

use regex::Regex;

use crate::conversation::{Conversation, TurnRole};

/// 路由状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterState {
    AwaitingRoute,
    Routed,
    /// 仅对当前 user Turn 终止；新的 user Turn 重置
    Complete,
}

/// 路由决策
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Handler(String),
    Complete,
}

/// 一条路由规则：fn 指针谓词，零开销、可单测
pub struct RouteRule {
    pub id: &'static str,
    pub predicate: fn(&str) -> bool,
    pub target: &'static str,
}

fn order_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[A-Z]+-?\d+\b").expect("order id regex"))
}

fn mentions_order_ids(text: &str) -> bool {
    order_id_pattern().is_match(text) || text.to_lowercase().contains("compare")
}

fn mentions_mutation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["delete", "update", "insert", "drop", "remove"]
        .iter()
        .any(|w| lower.contains(w))
}

fn mentions_aggregation(text: &str) -> bool {
    let lower = text.to_lowercase();
    [
        "show", "list", "count", "total", "all orders", "statistics", "revenue", "how many",
    ]
    .iter()
    .any(|w| lower.contains(w))
}

fn mentions_explanation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["what", "why", "explain", "how", "causes", "guide", "documentation"]
        .iter()
        .any(|w| lower.contains(w))
}

/// 缺省规则集：数据写意图 -> db（先于订单号规则，否则 "delete order ORD-1" 会被订单号劫持到 log）；
/// 订单号 / 对比 -> log；聚合词 -> db；解释性提问 -> knowledge
pub fn default_rules() -> Vec<RouteRule> {
    vec![
        RouteRule {
            id: "data-mutation",
            predicate: mentions_mutation,
            target: "db",
        },
        RouteRule {
            id: "order-ids-or-compare",
            predicate: mentions_order_ids,
            target: "log",
        },
        RouteRule {
            id: "data-aggregation",
            predicate: mentions_aggregation,
            target: "db",
        },
        RouteRule {
            id: "explanatory",
            predicate: mentions_explanation,
            target: "knowledge",
        },
    ]
}

/// 路由器：每次编排 run 持有一个实例
pub struct Router {
    rules: Vec<RouteRule>,
    default_handler: String,
    state: RouterState,
    /// 已见过的最近 user Turn 下标，用于识别新一轮输入
    last_user_seen: Option<usize>,
}

impl Router {
    pub fn new(rules: Vec<RouteRule>, default_handler: impl Into<String>) -> Self {
        Self {
            rules,
            default_handler: default_handler.into(),
            state: RouterState::AwaitingRoute,
            last_user_seen: None,
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    /// 给出下一步决策。对话为空或无 user Turn 时直接 Complete。
    pub fn next(&mut self, conversation: &Conversation) -> RouteDecision {
        let Some(user_idx) = conversation.last_user_index() else {
            self.state = RouterState::Complete;
            return RouteDecision::Complete;
        };

        // 新的 user Turn：状态机重置
        if self.last_user_seen != Some(user_idx) {
            self.last_user_seen = Some(user_idx);
            self.state = RouterState::AwaitingRoute;
        }

        // 本轮已有处理器产出 -> Complete，禁止同轮二次路由
        let produced = conversation
            .turns_since_last_user()
            .iter()
            .any(|t| matches!(t.role, TurnRole::Handler | TurnRole::Final | TurnRole::ActionResult));
        if produced || self.state == RouterState::Complete {
            self.state = RouterState::Complete;
            return RouteDecision::Complete;
        }

        let text = &conversation.turns()[user_idx].content;
        let target = self
            .rules
            .iter()
            .find(|rule| (rule.predicate)(text))
            .map(|rule| {
                tracing::debug!(rule = rule.id, target = rule.target, "route rule matched");
                rule.target.to_string()
            })
            .unwrap_or_else(|| self.default_handler.clone());

        self.state = RouterState::Routed;
        RouteDecision::Handler(target)
    }
}
