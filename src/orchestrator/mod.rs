//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责会话管理和命令调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session` - 评分会话
//! - 管理评分员身份（登录 / 注销）
//! - 查询答卷，为每份答卷创建独立的 GradingItemWorkflow
//! - 单项操作路由、批量并发评分（join_all）
//! - 输出会话统计
//!
//! ### `app` - 终端界面
//! - 组装评分后端（服务端 / 本地大模型）
//! - 逐行解析命令并交给 session 执行
//! - 渲染带证据高亮的答卷
//!
//! ## 层次关系
//!
//! ```text
//! app (命令循环)
//!     ↓
//! session (处理 Vec<GradingItemWorkflow>)
//!     ↓
//! workflow::GradingItemWorkflow (处理单份答卷)
//!     ↓
//! clients / services (能力层：评分服务端 / 大模型)
//! ```

pub mod app;
pub mod session;

pub use app::{App, Command};
pub use session::GradingSession;
