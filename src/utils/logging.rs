/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

use crate::config::Config;
use crate::models::LookupQuery;
use crate::workflow::Phase;

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - AI 辅助评分");
    info!("🌐 评分服务端: {}", config.api_base_url);
    info!("🤖 评分后端: {:?}", config.grading_backend);
    info!(
        "⏱️ 超时: AI 评分 {} 秒 / 确认 {} 秒",
        config.ai_timeout_secs, config.confirm_timeout_secs
    );
    info!("{}", "=".repeat(60));
}

/// 记录查询结果
pub fn log_search_loaded(query: &LookupQuery, total: usize) {
    info!("✓ {} 查询完成，共 {} 份答卷", query, total);
}

/// 会话统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub collecting: usize,
    pub ai_pending: usize,
    pub ai_ready: usize,
    pub editing: usize,
    pub confirmed: usize,
}

impl SessionStats {
    pub fn record(&mut self, phase: Phase) {
        match phase {
            Phase::Collecting => self.collecting += 1,
            Phase::AiPending => self.ai_pending += 1,
            Phase::AiReady => self.ai_ready += 1,
            Phase::Editing => self.editing += 1,
            Phase::Confirmed => self.confirmed += 1,
        }
    }

    pub fn count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Collecting => self.collecting,
            Phase::AiPending => self.ai_pending,
            Phase::AiReady => self.ai_ready,
            Phase::Editing => self.editing,
            Phase::Confirmed => self.confirmed,
        }
    }

    pub fn total(&self) -> usize {
        Phase::ALL.iter().map(|phase| self.count(*phase)).sum()
    }
}

/// 打印会话统计信息
pub fn print_session_stats(stats: &SessionStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 评分会话统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for phase in Phase::ALL {
        info!("{}: {}", phase, stats.count(phase));
    }
    info!("✅ 已确认: {}/{}", stats.confirmed, stats.total());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
