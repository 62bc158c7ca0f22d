//! Dispatch - Rust 多智能体编排引擎
//!
//! 模块划分：
//! - **actions**: 动作箱（日志调查、知识检索、数据库查询、echo）与执行器
//! - **approval**: 审批台账（propose / approve / reject / list_pending）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **conversation**: 对话与 Turn（user / handler / action-result / final）
//! - **core**: 引擎错误类型
//! - **engine**: 执行循环与顶层编排器（handle / resolve_approval）
//! - **handler**: 处理器描述与注册表（推理服务 + 可用动作集）
//! - **monitor**: 监控记录器（处理器 / 动作调用的起止与摘要）
//! - **reasoning**: 推理服务抽象与实现（OpenAI 兼容 / Mock）
//! - **risk**: 动作风险分级（low / medium / high）与审批策略
//! - **router**: 监督路由状态机（按规则选处理器或 COMPLETE）

pub mod actions;
pub mod approval;
pub mod config;
pub mod conversation;
pub mod core;
pub mod engine;
pub mod handler;
pub mod monitor;
pub mod observability;
pub mod reasoning;
pub mod risk;
pub mod router;

pub use engine::{OrchestrationResult, Orchestrator};
