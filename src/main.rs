//! Dispatch - 多处理器编排引擎
//!
//! 入口：初始化日志、按配置装配处理器与编排器，运行 stdin 命令循环。
//! 命令：`approve <id>` / `reject <id>` / `pending` / `summary` / `quit`，
//! 其余输入作为用户消息交给编排器。

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use dispatch::actions::{
    ActionExecutor, ActionRegistry, InvestigateLogsAction, QueryDatabaseAction,
    SearchKnowledgeAction,
};
use dispatch::approval::ApprovalLedger;
use dispatch::config::{load_config, AppConfig};
use dispatch::conversation::Conversation;
use dispatch::engine::{Orchestrator, OrchestratorConfig};
use dispatch::handler::{Handler, HandlerRegistry};
use dispatch::monitor::MonitoringRecorder;
use dispatch::reasoning::{MockReasoning, OpenAiReasoning, ReasoningService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dispatch::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let orchestrator = build_orchestrator(&cfg).context("Failed to build orchestrator")?;

    println!("Dispatch orchestration engine");
    println!(
        "Handlers: {}. Commands: approve <id> | reject <id> | pending | summary | quit",
        orchestrator.handler_names().join(", ")
    );

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => break,
            "pending" => {
                let pending = orchestrator.list_pending_approvals();
                if pending.is_empty() {
                    println!("No pending approvals.");
                } else {
                    for req in pending {
                        println!(
                            "{}  [{}] {}  ({})\n  payload: {}",
                            req.id, req.tier, req.action, req.reason, req.payload
                        );
                    }
                }
            }
            "summary" => {
                let summary = orchestrator.monitoring_summary();
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            _ => {
                if let Some(id) = input.strip_prefix("approve ") {
                    match orchestrator.resolve_approval(id.trim(), true, None).await {
                        Ok(text) => println!("{text}"),
                        Err(err) => eprintln!("Error: {err}"),
                    }
                } else if let Some(id) = input.strip_prefix("reject ") {
                    match orchestrator.resolve_approval(id.trim(), false, None).await {
                        Ok(text) => println!("{text}"),
                        Err(err) => eprintln!("Error: {err}"),
                    }
                } else {
                    match orchestrator.handle(input, &mut conversation).await {
                        Ok(result) => {
                            println!("{}", result.answer);
                            println!(
                                "[handlers: {} | {}ms]",
                                result.handlers_invoked.join(", "),
                                result.duration_ms
                            );
                        }
                        Err(err) => eprintln!("Error: {err}"),
                    }
                }
            }
        }
    }

    Ok(())
}

/// 按配置装配动作箱、三个处理器与编排器
fn build_orchestrator(cfg: &AppConfig) -> anyhow::Result<Orchestrator> {
    let mut registry = ActionRegistry::new();
    registry.register(InvestigateLogsAction);
    registry.register(SearchKnowledgeAction);
    registry.register(QueryDatabaseAction::new().context("Failed to open in-memory database")?);

    let executor = Arc::new(ActionExecutor::new(registry, cfg.engine.action_timeout_secs));

    let mut handlers = HandlerRegistry::new();
    for (name, capability, actions) in [
        (
            "log",
            "Investigates order processing logs: timelines, comparisons, error searches.",
            vec!["investigate_logs".to_string()],
        ),
        (
            "db",
            "Answers data questions by generating and running SQL against the orders database.",
            vec!["query_database".to_string()],
        ),
        (
            "knowledge",
            "Explains system behavior from internal documentation.",
            vec!["search_knowledge".to_string()],
        ),
    ] {
        let schema = executor.registry().schema_json_for(&actions);
        let reasoning = create_reasoning_from_config(cfg, name, capability, &schema);
        handlers.register(Handler::new(name, capability, reasoning, actions));
    }

    let ledger = Arc::new(ApprovalLedger::new());
    let monitor = Arc::new(MonitoringRecorder::new());
    let orchestrator_cfg = OrchestratorConfig {
        policy: cfg.risk_policy(),
        limits: cfg.engine_limits(),
        default_handler: cfg.engine.default_handler.clone(),
    };

    Ok(Orchestrator::new(
        handlers,
        executor,
        ledger,
        monitor,
        orchestrator_cfg,
    ))
}

/// 有 OPENAI_API_KEY 时走 OpenAI 兼容端点，否则退回 Mock
fn create_reasoning_from_config(
    cfg: &AppConfig,
    handler: &str,
    capability: &str,
    action_schema: &str,
) -> Arc<dyn ReasoningService> {
    let system_prompt = format!(
        "You are the '{handler}' handler of an orchestration engine. {capability}\n\
         Available actions (JSON schema):\n{action_schema}\n\
         To call actions, reply with exactly one fenced block:\n\
         ```json\n{{\"actions\": [{{\"action\": \"<name>\", \"args\": {{...}}}}]}}\n```\n\
         When you have enough observations, reply with the final answer as plain text."
    );

    if std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!(handler, model = %cfg.llm.model, "using OpenAI-compatible reasoning");
        Arc::new(OpenAiReasoning::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
            system_prompt,
        ))
    } else {
        tracing::warn!(handler, "OPENAI_API_KEY not set, using mock reasoning");
        Arc::new(MockReasoning::final_answer(format!(
            "({handler} offline) No reasoning backend is configured. Set OPENAI_API_KEY to enable this handler."
        )))
    }
}
