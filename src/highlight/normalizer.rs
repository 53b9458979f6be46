//! 比较用的规范化文本
//!
//! 只用于判断片段归属，不用于展示

/// 去掉所有空白以及 `, . ? !` 后的文本
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '.' | '?' | '!'))
        .collect()
}
