//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DISPATCH__*` 覆盖
//! （双下划线表示嵌套，如 `DISPATCH__LLM__MODEL=gpt-4o-mini`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::EngineLimits;
use crate::risk::RiskPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub policy: PolicySection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：推理后端与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次推理调用超时（秒）
    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            timeout_secs: default_reasoning_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_reasoning_timeout() -> u64 {
    60
}

/// [engine] 段：执行循环与动作执行的上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 单次处理器运行的推理轮数上限
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// 单次动作执行超时（秒）
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    /// 路由兜底处理器
    #[serde(default = "default_handler_name")]
    pub default_handler: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            action_timeout_secs: default_action_timeout(),
            default_handler: default_handler_name(),
        }
    }
}

fn default_max_rounds() -> usize {
    20
}

fn default_action_timeout() -> u64 {
    30
}

fn default_handler_name() -> String {
    "knowledge".to_string()
}

/// [policy] 段：风险分级与审批开关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub require_approval_for_writes: bool,
    #[serde(default = "default_true")]
    pub require_approval_for_sensitive_tables: bool,
    #[serde(default = "default_true")]
    pub auto_approve_safe_queries: bool,
    pub sensitive_tables: Option<Vec<String>>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            enabled: true,
            require_approval_for_writes: true,
            require_approval_for_sensitive_tables: true,
            auto_approve_safe_queries: true,
            sensitive_tables: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// 换算为执行循环上限
    pub fn engine_limits(&self) -> EngineLimits {
        EngineLimits {
            max_rounds: self.engine.max_rounds,
            reasoning_timeout_secs: self.llm.timeout_secs,
        }
    }

    /// 换算为风险策略；sensitive_tables 未配置时用内置默认表
    pub fn risk_policy(&self) -> RiskPolicy {
        let mut policy = RiskPolicy {
            enabled: self.policy.enabled,
            require_approval_for_writes: self.policy.require_approval_for_writes,
            require_approval_for_sensitive_tables: self.policy.require_approval_for_sensitive_tables,
            auto_approve_safe_queries: self.policy.auto_approve_safe_queries,
            ..RiskPolicy::default()
        };
        if let Some(ref tables) = self.policy.sensitive_tables {
            policy.sensitive_tables = tables.clone();
        }
        policy
    }
}

/// 从 config 目录加载配置，环境变量 DISPATCH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DISPATCH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DISPATCH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
