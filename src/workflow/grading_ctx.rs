//! 评分项上下文
//!
//! 封装"我正在给哪位评分员名下的哪位学生评分"这一信息

use std::fmt::Display;

use crate::models::{RaterIdentity, StudentRecord};

/// 评分项上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingCtx {
    /// 学生主键
    pub student_uid: String,

    /// 学号（仅用于日志显示）
    pub student_id: String,

    /// 评分员主键
    pub rater_uid: String,

    /// 在本次查询结果中的位置（从1开始）
    pub item_index: usize,
}

impl GradingCtx {
    /// 创建新的评分项上下文
    pub fn new(student: &StudentRecord, rater: &RaterIdentity, item_index: usize) -> Self {
        Self {
            student_uid: student.student_uid.clone(),
            student_id: student.student_id.clone(),
            rater_uid: rater.rater_uid.clone(),
            item_index,
        }
    }
}

impl Display for GradingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[学生 #{} 第{}项]", self.student_id, self.item_index)
    }
}
