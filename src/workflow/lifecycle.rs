//! 评分项生命周期

use std::fmt;

use chrono::{DateTime, Local};

use crate::models::AiGrade;

/// 生命周期状态
///
/// 每个变体只携带该状态下有效的数据：待评分时没有 AI 结果，
/// 已确认时不存在"可编辑"的可能
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// 初始状态，专家分数和理由可编辑
    Collecting,
    /// AI 评分请求进行中，输入锁定
    AiPending {
        /// 从修改状态重新发起时保留的上一次结果，失败时恢复
        previous: Option<AiGrade>,
    },
    /// AI 结果已返回，输入锁定
    AiReady { grade: AiGrade },
    /// 查看结果后重新打开输入
    Editing { grade: AiGrade },
    /// 最终确认（终态）
    Confirmed {
        grade: AiGrade,
        confirmed_at: DateTime<Local>,
    },
}

impl LifecycleState {
    pub fn phase(&self) -> Phase {
        match self {
            LifecycleState::Collecting => Phase::Collecting,
            LifecycleState::AiPending { .. } => Phase::AiPending,
            LifecycleState::AiReady { .. } => Phase::AiReady,
            LifecycleState::Editing { .. } => Phase::Editing,
            LifecycleState::Confirmed { .. } => Phase::Confirmed,
        }
    }

    /// 当前可展示的 AI 结果（请求进行中时不展示）
    pub fn grade(&self) -> Option<&AiGrade> {
        match self {
            LifecycleState::AiReady { grade }
            | LifecycleState::Editing { grade }
            | LifecycleState::Confirmed { grade, .. } => Some(grade),
            LifecycleState::Collecting | LifecycleState::AiPending { .. } => None,
        }
    }
}

/// 状态名（不带数据），用于日志、统计和错误信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Collecting,
    AiPending,
    AiReady,
    Editing,
    Confirmed,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Collecting,
        Phase::AiPending,
        Phase::AiReady,
        Phase::Editing,
        Phase::Confirmed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Collecting => "待评分",
            Phase::AiPending => "AI评分中",
            Phase::AiReady => "AI结果已出",
            Phase::Editing => "修改中",
            Phase::Confirmed => "已确认",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 评分员触发的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    RequestAiGrading,
    ResolveAiGrading,
    RequestEdit,
    RequestConfirm,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::RequestAiGrading => "请求AI评分",
            Trigger::ResolveAiGrading => "接收AI评分结果",
            Trigger::RequestEdit => "修改分数",
            Trigger::RequestConfirm => "确认分数",
        };
        write!(f, "{}", name)
    }
}
