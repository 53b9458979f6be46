//! 宽松匹配模式
//!
//! 摘录中的特殊字符全部转义，连续空白视为"任意数量的空白"，
//! 这样重新排版过的摘录仍然能在原文中找到

/// 把字面摘录转换为正则模式片段
pub fn flexible_pattern(literal: &str) -> String {
    let mut pattern = String::with_capacity(literal.len() * 2);
    let mut in_whitespace = false;
    let mut buf = [0u8; 4];

    for c in literal.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                pattern.push_str(r"\s+");
            }
            in_whitespace = true;
        } else {
            pattern.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            in_whitespace = false;
        }
    }

    pattern
}

/// 按给定顺序拼接为一个交替模式（先列出的分支优先）
pub fn alternation<'a>(literals: impl IntoIterator<Item = &'a str>) -> String {
    literals
        .into_iter()
        .map(|literal| format!("(?:{})", flexible_pattern(literal)))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_escapes_special_characters() {
        let re = Regex::new(&flexible_pattern("f(x) = 2*x + 1?")).unwrap();
        assert!(re.is_match("we know f(x) = 2*x + 1? yes"));
        assert!(!re.is_match("fx = 2x + 1"));
    }

    #[test]
    fn test_whitespace_runs_are_flexible() {
        let re = Regex::new(&flexible_pattern("A  B")).unwrap();
        assert!(re.is_match("A B"));
        assert!(re.is_match("A\nB"));
        assert!(re.is_match("A \t\n B"));
        assert!(!re.is_match("AB"));
    }

    #[test]
    fn test_alternation_wraps_each_branch() {
        assert_eq!(alternation(["a b", "c|d"]), r"(?:a\s+b)|(?:c\|d)");
    }
}
