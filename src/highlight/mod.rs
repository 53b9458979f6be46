//! 答卷高亮引擎
//!
//! 输入原始作答文本和按维度分组的关键句（模型给出的评分证据），
//! 输出一串首尾相接、互不重叠的片段，每个片段标记为普通文本或某个维度的证据。
//!
//! ## 流程
//!
//! 1. 拆分关键句（`segmenter`）
//! 2. 所有候选按字面长度降序排序（稳定排序，长片段优先）
//! 3. 拼接为一个宽松交替模式（`pattern`）
//! 4. 用该模式切分原文，保留匹配到的部分
//! 5. 每一段按规范化文本（`normalizer`）与候选比较，第一个相等的候选决定维度
//!
//! 输出片段始终是原文的子串，拼接后与原文完全一致。

pub mod normalizer;
pub mod pattern;
pub mod segmenter;

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Range;

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{Dimension, PerDimension};
use normalizer::normalize;
use segmenter::{fragments_for, Fragment};

/// 片段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Plain,
    Evidence(Dimension),
}

/// 原文中的一段连续文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    /// 在原文中的字节区间
    pub range: Range<usize>,
    pub kind: SpanKind,
}

impl Span {
    fn new(raw_text: &str, range: Range<usize>, kind: SpanKind) -> Self {
        Self {
            text: raw_text[range.clone()].to_string(),
            range,
            kind,
        }
    }

    pub fn is_evidence(&self) -> bool {
        matches!(self.kind, SpanKind::Evidence(_))
    }

    pub fn category(&self) -> Option<Dimension> {
        match self.kind {
            SpanKind::Plain => None,
            SpanKind::Evidence(dimension) => Some(dimension),
        }
    }
}

/// 生成高亮片段
///
/// 没有任何关键句（或拆分后没有候选）时返回覆盖全文的单个普通片段。
/// 找不到的关键句直接忽略，不会报错。
pub fn annotate(raw_text: &str, excerpts: &BTreeMap<Dimension, Vec<String>>) -> Vec<Span> {
    let whole = || vec![Span::new(raw_text, 0..raw_text.len(), SpanKind::Plain)];

    if excerpts.values().all(|list| list.is_empty()) {
        return whole();
    }

    let mut candidates: Vec<Fragment> = excerpts
        .iter()
        .flat_map(|(category, list)| fragments_for(*category, list))
        .collect();

    if candidates.is_empty() {
        return whole();
    }

    // 长度按 UTF-16 计，与浏览器端的排序保持一致
    candidates.sort_by_key(|fragment| Reverse(fragment.text.encode_utf16().count()));

    let combined = pattern::alternation(candidates.iter().map(|f| f.text.as_str()));
    let matcher = match Regex::new(&combined) {
        Ok(re) => re,
        Err(e) => {
            warn!("⚠️ 高亮模式编译失败，按原文显示: {}", e);
            return whole();
        }
    };

    debug!("高亮候选 {} 个，原文 {} 字节", candidates.len(), raw_text.len());

    let normalized: Vec<String> = candidates.iter().map(|f| normalize(&f.text)).collect();
    let classify = |piece: &str| -> SpanKind {
        let key = normalize(piece);
        candidates
            .iter()
            .zip(&normalized)
            .find(|(_, candidate)| **candidate == key)
            .map(|(fragment, _)| SpanKind::Evidence(fragment.category))
            .unwrap_or(SpanKind::Plain)
    };

    let mut spans = Vec::new();
    let mut push_piece = |range: Range<usize>| {
        if range.is_empty() {
            return;
        }
        let kind = classify(&raw_text[range.clone()]);
        spans.push(Span::new(raw_text, range, kind));
    };

    let mut last = 0;
    for found in matcher.find_iter(raw_text) {
        push_piece(last..found.start());
        push_piece(found.range());
        last = found.end();
    }
    push_piece(last..raw_text.len());

    spans
}

/// 各维度被高亮的字符数
pub fn coverage(spans: &[Span]) -> PerDimension<usize> {
    let mut counts = PerDimension::new(0, 0);
    for span in spans {
        if let Some(dimension) = span.category() {
            *counts.get_mut(dimension) += span.text.chars().count();
        }
    }
    counts
}
