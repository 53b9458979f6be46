//! 摘录切分
//!
//! 模型给出的一条关键句可能用 `/` 或行内编号（` 2.`）把多个片段拼在一起，
//! 需要拆开后分别在原文中定位

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Dimension;

/// 片段分隔符：斜杠，或"空白 + 数字 + 句点"形式的行内编号
static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/|\s+[0-9]+\.").expect("分隔符正则必须合法"));

/// 一个待匹配的候选片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub category: Dimension,
}

/// 把一条摘录拆成若干非空片段（已去除首尾空白）
pub fn split_excerpt(excerpt: &str) -> Vec<&str> {
    SEPARATOR
        .split(excerpt)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// 拆分某个维度下的全部摘录，保持原有顺序
pub fn fragments_for(category: Dimension, excerpts: &[String]) -> Vec<Fragment> {
    excerpts
        .iter()
        .flat_map(|excerpt| split_excerpt(excerpt))
        .map(|text| Fragment {
            text: text.to_string(),
            category,
        })
        .collect()
}
