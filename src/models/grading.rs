//! 评分数据模型与接口载荷

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::dimension::{Dimension, PerDimension};

/// 专家分数允许的闭区间
pub const SCORE_RANGE: RangeInclusive<i32> = 1..=10;

/// 专家输入（分数 + 评分理由）
///
/// 分数保存原始输入，区间校验推迟到请求 AI 评分时进行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpertInput {
    pub scores: PerDimension<Option<i32>>,
    pub rationale: String,
}

/// AI 评分结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiResult {
    #[serde(deserialize_with = "deserialize_scores")]
    pub scores: PerDimension<i32>,
    #[serde(default)]
    pub rationales: PerDimension<Vec<String>>,
    #[serde(default)]
    pub key_sentences: PerDimension<Vec<String>>,
}

impl AiResult {
    /// 按维度整理的证据摘录，供高亮使用
    pub fn evidence(&self) -> BTreeMap<Dimension, Vec<String>> {
        self.key_sentences
            .iter()
            .map(|(dimension, sentences)| (dimension, sentences.clone()))
            .collect()
    }
}

/// 一次成功的 AI 评分：结果 + 分数引用令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiGrade {
    pub result: AiResult,
    /// 确认最终分数时回传给服务端的引用
    pub score_uid: String,
}

/// `POST /ai_grade` 请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiGradeRequest {
    pub student_uid: String,
    pub student_id: String,
    pub rater_uid: String,
    pub expert_crt_score: i32,
    pub expert_knw_score: i32,
    pub expert_rationale: String,
    /// 原始作答，仅供本地评分后端使用，不上传
    #[serde(skip)]
    pub student_answer: String,
}

/// `POST /ai_grade` 响应体
#[derive(Debug, Clone, Deserialize)]
pub struct AiGradeResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub ai_result: Option<AiResult>,
    #[serde(default)]
    pub score_uid: Option<String>,
}

/// `POST /add_final_score` 请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalScoreRequest {
    pub score_uid: String,
    pub student_uid: String,
    pub rater_uid: String,
    pub knw_score: i32,
    pub crt_score: i32,
}

/// 通用状态响应 `{"status": "ok"}`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `POST /login` 请求体
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub rater_id: &'a str,
    pub password: &'a str,
}

/// `POST /login` 响应体
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub rater_uid: Option<String>,
    #[serde(default)]
    pub rater_id: Option<String>,
}

/// 将 JSON 数值或数字字符串转换为整数分数（四舍五入，不做区间截断）
pub fn score_from_value(value: &Value) -> Option<i32> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round() as i32)
}

fn deserialize_scores<'de, D>(deserializer: D) -> Result<PerDimension<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = PerDimension::<Value>::deserialize(deserializer)?;
    let scientific = score_from_value(&raw.scientific)
        .ok_or_else(|| D::Error::custom(format!("无效的分数: {}", raw.scientific)))?;
    let critical = score_from_value(&raw.critical)
        .ok_or_else(|| D::Error::custom(format!("无效的分数: {}", raw.critical)))?;
    Ok(PerDimension::new(scientific, critical))
}
