//! 学生查询表达式
//!
//! 支持三种写法：
//! - 单个学号：`10101`
//! - 区间：`10101-10105`
//! - 列表：`10101,10103,10107`

use std::fmt;

use crate::error::LookupError;

/// 解析后的查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupQuery {
    Single(String),
    Range { start: String, end: String },
    List(Vec<String>),
}

impl LookupQuery {
    /// 解析用户输入的查询表达式
    pub fn parse(input: &str) -> Result<Self, LookupError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LookupError::Empty);
        }

        if input.contains('-') {
            let (start, end) = input
                .split_once('-')
                .map(|(s, e)| (s.trim(), e.trim()))
                .ok_or_else(|| LookupError::InvalidRange {
                    input: input.to_string(),
                })?;
            if start.is_empty() || end.is_empty() || end.contains('-') || input.contains(',') {
                return Err(LookupError::InvalidRange {
                    input: input.to_string(),
                });
            }
            if let (Ok(a), Ok(b)) = (start.parse::<u64>(), end.parse::<u64>()) {
                if a > b {
                    return Err(LookupError::ReversedRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
            }
            return Ok(LookupQuery::Range {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        if input.contains(',') {
            let ids: Vec<String> = input.split(',').map(|s| s.trim().to_string()).collect();
            if ids.iter().any(|id| id.is_empty()) {
                return Err(LookupError::EmptyListItem {
                    input: input.to_string(),
                });
            }
            return Ok(LookupQuery::List(ids));
        }

        Ok(LookupQuery::Single(input.to_string()))
    }

    /// 是否为批量查询
    pub fn is_batch(&self) -> bool {
        !matches!(self, LookupQuery::Single(_))
    }

    /// 查询接口路径中使用的表达式
    pub fn expression(&self) -> String {
        match self {
            LookupQuery::Single(id) => id.clone(),
            LookupQuery::Range { start, end } => format!("{}-{}", start, end),
            LookupQuery::List(ids) => ids.join(","),
        }
    }
}

impl fmt::Display for LookupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupQuery::Single(id) => write!(f, "学号 {}", id),
            LookupQuery::Range { start, end } => write!(f, "学号区间 {}-{}", start, end),
            LookupQuery::List(ids) => write!(f, "{} 个学号", ids.len()),
        }
    }
}
