//! # AI Assist Grading
//!
//! 一个用于 AI 辅助论述文评分的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 高亮引擎（Highlight）
//! - `highlight/` - 纯函数，把模型给出的证据句映射回原文片段
//! - `normalizer` / `pattern` / `segmenter` - 规范化、宽松匹配模式、证据句拆分
//!
//! ### ② 业务能力层（Clients / Services）
//! - `clients/` - `GradingService` trait 与基于 HTTP 的评分服务端客户端
//! - `services/` - 大模型调用（`LlmService`）与本地大模型评分（`LlmGrader`）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份答卷"的评分生命周期
//! - `GradingCtx` - 上下文封装（学生 + 评分员 + 编号）
//! - `GradingItemWorkflow` - 状态机（待评分 → AI评分中 → AI结果已出 → 修改中 → 已确认）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/session` - 评分会话：登录、查询、批量评分
//! - `orchestrator/app` - 终端命令循环
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod highlight;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{GradingService, HttpGradingClient};
pub use config::{Config, GradingBackend};
pub use error::{AppError, AppResult};
pub use highlight::{annotate, Span, SpanKind};
pub use models::{Dimension, LookupQuery, StudentRecord};
pub use orchestrator::{App, GradingSession};
pub use workflow::{GradingCtx, GradingItemWorkflow, LifecycleState, Phase};
