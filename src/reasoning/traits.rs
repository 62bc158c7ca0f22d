//! 推理服务抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 ReasoningService：给定对话，返回最终回复
//! 或一组待执行的动作请求。实现不得修改传入的对话；超时由调用方施加，重试须幂等安全。

use async_trait::async_trait;

use crate::conversation::{ActionRequest, Turn};
use crate::core::EngineError;

/// 一次推理调用的产出
#[derive(Debug, Clone)]
pub enum ReasoningOutcome {
    /// 直接给出最终回复
    Final(String),
    /// 请求按序执行的动作列表
    Actions(Vec<ActionRequest>),
}

/// 推理服务 trait：给定对话产出 Final 或动作列表
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn invoke(&self, conversation: &[Turn]) -> Result<ReasoningOutcome, String>;

    /// 累计 token 使用统计：(prompt, completion, total)；默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 动作列表的 JSON 包裹形式：{"actions": [...]}
#[derive(serde::Deserialize)]
struct ActionEnvelope {
    actions: Vec<ActionRequest>,
}

/// 解析推理文本输出：
/// - ```json 代码块或裸 JSON 中的 {"actions": [...]} / [...] / 单个 {"action": ...} 解析为动作列表；
/// - 带 json 代码块但内容非法时报 JsonParse；
/// - 其余文本一律视为最终回复（普通散文里允许出现花括号）。
pub fn parse_reasoning_output(output: &str) -> Result<ReasoningOutcome, EngineError> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
        return parse_json_actions(block)
            .ok_or_else(|| EngineError::JsonParse(format!("invalid action block: {block}")));
    }

    let candidate = match (trimmed.find(['{', '[']), trimmed.rfind(['}', ']'])) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return Ok(ReasoningOutcome::Final(trimmed.to_string())),
    };

    match parse_json_actions(candidate) {
        Some(outcome) => Ok(outcome),
        None => Ok(ReasoningOutcome::Final(trimmed.to_string())),
    }
}

fn parse_json_actions(json_str: &str) -> Option<ReasoningOutcome> {
    if let Ok(envelope) = serde_json::from_str::<ActionEnvelope>(json_str) {
        return Some(ReasoningOutcome::Actions(envelope.actions));
    }
    if let Ok(list) = serde_json::from_str::<Vec<ActionRequest>>(json_str) {
        return Some(ReasoningOutcome::Actions(list));
    }
    if let Ok(single) = serde_json::from_str::<ActionRequest>(json_str) {
        if !single.action.is_empty() {
            return Some(ReasoningOutcome::Actions(vec![single]));
        }
    }
    None
}
