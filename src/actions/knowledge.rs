//! 知识检索动作
//!
//! 对内置知识库做关键词检索（生产环境应接向量检索后端），返回带来源引用的条目。
//! Args: {"question": "...", "search_type": "documentation|troubleshooting|configuration|all"}

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::Action;

#[derive(Debug, Deserialize)]
struct KnowledgeArgs {
    #[serde(default)]
    question: String,
    #[serde(default = "default_search_type")]
    search_type: String,
}

fn default_search_type() -> String {
    "all".to_string()
}

const PAYMENT_FAILURES_DOC: &str = "\
KNOWLEDGE BASE: Payment Gateway Failures

Root causes:
1. Gateway timeout (most common)
   - Cause: third-party service exceeds 30s response time
   - Frequency: ~5% of transactions during peak hours
2. Declined transactions
   - Cause: insufficient funds, fraud detection, card expiry
   - Frequency: ~2% of transactions
3. Network issues
   - Cause: connection failures, packet loss
   - Frequency: <1% of transactions

Recommended solutions:
- Implement circuit breaker pattern (timeout 5s, fallback: queue for retry)
- Add retry logic (max 3 retries, exponential backoff 1s/2s/4s, timeout errors only)
- Implement backup payment processor
- Alert on gateway response time > 2s

Related documentation:
- docs/troubleshooting/payment-gateway.md
- docs/architecture/payment-processing.md
- incidents/2024-089-payment-timeout.md

Incident history:
- Incident #2024-089: similar issue resolved by timeout adjustment,
  resolution time 2 hours, 95% reduction in timeouts afterwards";

const CONFIGURATION_DOC: &str = "\
KNOWLEDGE BASE: System Configuration

Current payment gateway settings:
  provider: stripe
  timeout: 30000ms
  retry_attempts: 0        (ISSUE: no retries configured)
  circuit_breaker: false   (ISSUE: not enabled)

Recommended configuration:
  timeout: 5000ms
  retry_attempts: 3 (exponential backoff)
  circuit_breaker: true (failure_threshold 5, half_open_after 30s)
  monitoring: alert_threshold_ms 2000

Configuration location: /config/payment-gateway.yaml";

/// 知识检索动作：关键词匹配内置文档
pub struct SearchKnowledgeAction;

impl SearchKnowledgeAction {
    fn lookup(question: &str, search_type: &str) -> String {
        let q = question.to_lowercase();
        if q.contains("payment") || q.contains("failure") {
            PAYMENT_FAILURES_DOC.to_string()
        } else if q.contains("config") {
            CONFIGURATION_DOC.to_string()
        } else {
            format!(
                "KNOWLEDGE BASE SEARCH\n\
                 Question: \"{question}\"\n\
                 Search type: {search_type}\n\
                 \n\
                 Found 3 relevant documents:\n\
                 1. Payment Gateway Troubleshooting Guide (relevance 92%)\n\
                    - docs/troubleshooting/payment-gateway.md\n\
                 2. Order Processing Architecture (relevance 85%)\n\
                    - docs/architecture/order-processing.md\n\
                 3. Historical Incident Report #2024-089 (relevance 78%)\n\
                    - incidents/2024-089-payment-timeout.md\n\
                 \n\
                 Summary: payment gateway issues are typically resolved by reducing\n\
                 timeout thresholds (30s -> 5s), implementing a circuit breaker,\n\
                 adding retry logic with exponential backoff, and proactive monitoring."
            )
        }
    }
}

#[async_trait]
impl Action for SearchKnowledgeAction {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documentation, troubleshooting guides and configuration \
         info, with source citations. Args: {\"question\": \"...\", \"search_type\": \"all\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"},
                "search_type": {
                    "type": "string",
                    "enum": ["documentation", "troubleshooting", "configuration", "all"]
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: KnowledgeArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        Ok(Self::lookup(&args.question, &args.search_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payment_question_hits_payment_doc() {
        let out = SearchKnowledgeAction
            .execute(serde_json::json!({"question": "why do payment failures happen"}))
            .await
            .unwrap();
        assert!(out.contains("Payment Gateway Failures"));
        assert!(out.contains("circuit breaker"));
    }

    #[tokio::test]
    async fn test_unknown_question_returns_summary() {
        let out = SearchKnowledgeAction
            .execute(serde_json::json!({"question": "shipping carriers"}))
            .await
            .unwrap();
        assert!(out.contains("Found 3 relevant documents"));
    }
}
