//! 大模型评分 - 业务能力层
//!
//! 按固定评分标准让大模型给答卷打分，并给出理由和原文证据句。
//!
//! - 输出必须是 JSON，键为 `scientificKnowledge` / `criticalThinking`
//! - 每个维度至少 2 条理由、2 条证据句，且数量相等
//! - 分数四舍五入并截断到 [1, 10]
//! - 同一篇答卷（规范化后）在同一版本的提示词和模型下只评一次

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::clients::GradingService;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::{
    score_from_value, AiGrade, AiGradeRequest, AiResult, Dimension, FinalScoreRequest,
    LookupQuery, PerDimension, RaterIdentity, StudentRecord, SCORE_RANGE,
};
use crate::services::llm_service::ChatModel;

/// 示例版本
pub const FEW_SHOT_VERSION: &str = "fs_v3";
/// 评分标准版本
pub const RUBRIC_VERSION: &str = "rubric_v2";

/// 每个维度至少需要的理由 / 证据句数量
const MIN_EVIDENCE: usize = 2;

/// 评分缓存默认容量（答卷篇数）
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

const SYSTEM_MESSAGE: &str = "你是一名专业的教育助教，负责按照固定的评分标准评价学生的论述文。";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    essay: String,
    few_shot: &'static str,
    rubric: &'static str,
    model: String,
}

/// 模型原始输出
#[derive(Debug, Deserialize)]
struct RawGrading {
    #[serde(default)]
    scores: Option<Map<String, Value>>,
    #[serde(default)]
    rationales: Option<Map<String, Value>>,
    #[serde(default, rename = "keySentences", alias = "key_sentences")]
    key_sentences: Option<Map<String, Value>>,
}

/// 评分缓存，超出容量时淘汰最早写入的答卷
struct GradeCache {
    entries: HashMap<CacheKey, AiResult>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl GradeCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &CacheKey) -> Option<&AiResult> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: CacheKey, result: AiResult) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), result).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 大模型评分器
pub struct LlmGrader {
    chat: Arc<dyn ChatModel>,
    cache: Mutex<GradeCache>,
}

impl LlmGrader {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self::with_cache_capacity(chat, DEFAULT_CACHE_CAPACITY)
    }

    /// 指定缓存容量，0 表示不缓存
    pub fn with_cache_capacity(chat: Arc<dyn ChatModel>, capacity: usize) -> Self {
        Self {
            chat,
            cache: Mutex::new(GradeCache::new(capacity)),
        }
    }

    /// 评分一篇答卷
    pub async fn grade(&self, essay: &str) -> AppResult<AiResult> {
        let canon = canonicalize(essay);
        let key = CacheKey {
            essay: canon.clone(),
            few_shot: FEW_SHOT_VERSION,
            rubric: RUBRIC_VERSION,
            model: self.chat.model_name().to_string(),
        };

        if let Some(hit) = self.cached(&key) {
            debug!("命中评分缓存 ({} 字)", canon.chars().count());
            return Ok(hit);
        }

        let model = self.chat.model_name().to_string();
        info!("🤖 调用模型 {} 评分 ({} 字)...", model, canon.chars().count());

        let raw = self
            .chat
            .complete(&build_prompt(&canon), Some(SYSTEM_MESSAGE))
            .await
            .map_err(|e| AppError::llm_api_failed(&model, e))?;

        if raw.trim().is_empty() {
            return Err(LlmError::EmptyContent { model }.into());
        }

        let result = parse_response(&raw).map_err(|e| {
            warn!("⚠️ 模型输出无法使用: {}", e);
            debug!("模型原始输出:\n{}", raw);
            e
        })?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    fn cached(&self, key: &CacheKey) -> Option<AiResult> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    /// 已缓存的答卷数量
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or_default()
    }
}

/// 规范化答卷文本（统一换行，去除首尾空白）
pub fn canonicalize(essay: &str) -> String {
    essay.replace("\r\n", "\n").trim().to_string()
}

/// 将模型给出的分数转换为 [1, 10] 内的整数
pub fn normalize_score(key: &str, value: &Value) -> Result<i32, LlmError> {
    score_from_value(value)
        .map(|n| n.clamp(*SCORE_RANGE.start(), *SCORE_RANGE.end()))
        .ok_or_else(|| LlmError::InvalidScore {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn build_prompt(canon: &str) -> String {
    format!(
        r#"请评价下面的学生作文。

【评分标准（版本 {rubric}，示例版本 {few_shot}）】
1. 批判性思维 (criticalThinking)
2. 数理科学思维 (scientificKnowledge)

每个维度给出 1~10 之间的整数分。
每个维度给出至少 2 条评分理由，并为每条理由摘录 1 句支撑它的原文句子（原样摘录，不要改写）。

【输出格式】
{{
  "scores": {{"scientificKnowledge": 7, "criticalThinking": 6}},
  "rationales": {{"scientificKnowledge": ["...", "..."], "criticalThinking": ["...", "..."]}},
  "keySentences": {{"scientificKnowledge": ["...", "..."], "criticalThinking": ["...", "..."]}}
}}

⚠️ 只输出 JSON。
⚠️ 不要输出解释、注释、Markdown 或 ```json``` 代码块。
⚠️ JSON 之外的任何文本都视为错误。

学生作文：
---
{canon}
---"#,
        rubric = RUBRIC_VERSION,
        few_shot = FEW_SHOT_VERSION,
        canon = canon,
    )
}

/// 去掉可能包裹在外面的 Markdown 代码块
fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// 解析并校验模型输出
pub fn parse_response(raw: &str) -> Result<AiResult, LlmError> {
    let text = strip_code_fence(raw);
    let parsed: RawGrading =
        serde_json::from_str(text).map_err(|source| LlmError::InvalidJson { source })?;

    let (scores, rationales, key_sentences) =
        match (parsed.scores, parsed.rationales, parsed.key_sentences) {
            (Some(s), Some(r), Some(k)) if !s.is_empty() && !r.is_empty() && !k.is_empty() => {
                (s, r, k)
            }
            _ => {
                return Err(LlmError::InvalidShape(
                    "缺少 scores / rationales / keySentences".to_string(),
                ))
            }
        };

    let scores = by_dimension("scores", &scores)?;
    let rationales = by_dimension("rationales", &rationales)?;
    let key_sentences = by_dimension("keySentences", &key_sentences)?;

    let mut result = AiResult {
        scores: PerDimension::default(),
        rationales: PerDimension::default(),
        key_sentences: PerDimension::default(),
    };

    for dimension in Dimension::ALL {
        let key = dimension.rubric_key();
        *result.scores.get_mut(dimension) = normalize_score(key, scores.get(dimension))?;

        let reasons = string_list(key, "理由", rationales.get(dimension))?;
        let sentences = string_list(key, "证据句", key_sentences.get(dimension))?;

        if reasons.len() < MIN_EVIDENCE || sentences.len() < MIN_EVIDENCE {
            return Err(LlmError::InvalidShape(format!(
                "{}: 理由和证据句各需至少 {} 条",
                key, MIN_EVIDENCE
            )));
        }
        if reasons.len() != sentences.len() {
            return Err(LlmError::InvalidShape(format!(
                "{}: 理由 {} 条与证据句 {} 条数量不一致",
                key,
                reasons.len(),
                sentences.len()
            )));
        }

        *result.rationales.get_mut(dimension) = reasons;
        *result.key_sentences.get_mut(dimension) = sentences;
    }

    Ok(result)
}

/// 按维度别名整理一个 JSON 对象
fn by_dimension<'a>(
    section: &str,
    map: &'a Map<String, Value>,
) -> Result<PerDimension<&'a Value>, LlmError> {
    let mut slots: PerDimension<Option<&Value>> = PerDimension::default();
    for (key, value) in map {
        if let Some(dimension) = Dimension::lookup(key) {
            let slot = slots.get_mut(dimension);
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }
    let missing = |dimension: Dimension| {
        LlmError::InvalidShape(format!("{}: 缺少 {}", section, dimension.rubric_key()))
    };
    Ok(PerDimension::new(
        slots.scientific.ok_or_else(|| missing(Dimension::Scientific))?,
        slots.critical.ok_or_else(|| missing(Dimension::Critical))?,
    ))
}

fn string_list(key: &str, label: &str, value: &Value) -> Result<Vec<String>, LlmError> {
    let items = value
        .as_array()
        .ok_or_else(|| LlmError::InvalidShape(format!("{}: {}不是数组", key, label)))?;
    items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
            _ => Err(LlmError::InvalidShape(format!("{}: 存在空{}", key, label))),
        })
        .collect()
}

/// 在本地用大模型评分的服务
///
/// 登录、查询、确认仍交给评分服务端，只有 AI 评分在本地完成
pub struct LlmGradingService {
    inner: Arc<dyn GradingService>,
    grader: LlmGrader,
}

impl LlmGradingService {
    pub fn new(inner: Arc<dyn GradingService>, grader: LlmGrader) -> Self {
        Self { inner, grader }
    }

    /// 本地评分器（用于查看缓存情况）
    pub fn grader(&self) -> &LlmGrader {
        &self.grader
    }
}

#[async_trait]
impl GradingService for LlmGradingService {
    async fn login(&self, rater_id: &str, password: &str) -> AppResult<RaterIdentity> {
        self.inner.login(rater_id, password).await
    }

    async fn fetch_students(&self, query: &LookupQuery) -> AppResult<Vec<StudentRecord>> {
        self.inner.fetch_students(query).await
    }

    async fn request_ai_grading(&self, request: &AiGradeRequest) -> AppResult<AiGrade> {
        if request.student_answer.trim().is_empty() {
            return Err(AppError::rejected("ai_grade", "答卷内容为空"));
        }

        let result = self.grader.grade(&request.student_answer).await?;
        let score_uid = format!(
            "llm-{}-{}",
            request.student_uid,
            Local::now().format("%Y%m%d%H%M%S%3f")
        );
        Ok(AiGrade { result, score_uid })
    }

    async fn confirm_final_score(&self, request: &FinalScoreRequest) -> AppResult<()> {
        self.inner.confirm_final_score(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedChat {
        reply: String,
        calls: AtomicUsize,
    }

    impl ScriptedChat {
        fn new(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(
            &self,
            _user_message: &str,
            _system_message: Option<&str>,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct UnreachableBackend;

    #[async_trait]
    impl GradingService for UnreachableBackend {
        async fn login(&self, rater_id: &str, _password: &str) -> AppResult<RaterIdentity> {
            Ok(RaterIdentity {
                rater_uid: "rater-uid".into(),
                rater_id: rater_id.into(),
            })
        }

        async fn fetch_students(&self, _query: &LookupQuery) -> AppResult<Vec<StudentRecord>> {
            Ok(vec![StudentRecord::new("u1", "10101", "answer")])
        }

        async fn request_ai_grading(&self, _request: &AiGradeRequest) -> AppResult<AiGrade> {
            Err(AppError::rejected("ai_grade", "不应调用服务端评分"))
        }

        async fn confirm_final_score(&self, _request: &FinalScoreRequest) -> AppResult<()> {
            Ok(())
        }
    }

    fn valid_reply() -> Value {
        json!({
            "scores": {"scientificKnowledge": 7.4, "criticalThinking": "12"},
            "rationales": {
                "scientificKnowledge": ["概念使用准确", "数据引用恰当"],
                "criticalThinking": ["提出了反例", "结论有所保留"]
            },
            "keySentences": {
                "scientificKnowledge": ["물은 100도에서 끓는다", "기압이 낮으면"],
                "criticalThinking": ["그러나 항상 그런 것은 아니다", "더 조사가 필요하다"]
            }
        })
    }

    #[test]
    fn test_parse_valid_response() {
        let result = parse_response(&valid_reply().to_string()).unwrap();
        assert_eq!(result.scores, PerDimension::new(7, 10));
        assert_eq!(result.rationales.critical.len(), 2);
        assert_eq!(result.key_sentences.scientific[0], "물은 100도에서 끓는다");
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let raw = format!("```json\n{}\n```", valid_reply());
        assert!(parse_response(&raw).is_ok());
        let raw = format!("```\n{}\n```", valid_reply());
        assert!(parse_response(&raw).is_ok());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_response("评分如下：7 分"),
            Err(LlmError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_missing_section() {
        let mut reply = valid_reply();
        reply.as_object_mut().unwrap().remove("keySentences");
        assert!(matches!(
            parse_response(&reply.to_string()),
            Err(LlmError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_parse_rejects_too_few_or_mismatched_evidence() {
        let mut reply = valid_reply();
        reply["rationales"]["criticalThinking"] = json!(["只有一条"]);
        reply["keySentences"]["criticalThinking"] = json!(["一句"]);
        assert!(matches!(
            parse_response(&reply.to_string()),
            Err(LlmError::InvalidShape(_))
        ));

        let mut reply = valid_reply();
        reply["keySentences"]["scientificKnowledge"] = json!(["a", "b", "c"]);
        assert!(matches!(
            parse_response(&reply.to_string()),
            Err(LlmError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_parse_rejects_blank_strings() {
        let mut reply = valid_reply();
        reply["rationales"]["scientificKnowledge"] = json!(["理由", "   "]);
        assert!(matches!(
            parse_response(&reply.to_string()),
            Err(LlmError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unparsable_score() {
        let mut reply = valid_reply();
        reply["scores"]["criticalThinking"] = json!("high");
        assert!(matches!(
            parse_response(&reply.to_string()),
            Err(LlmError::InvalidScore { .. })
        ));
    }

    #[test]
    fn test_normalize_score_rounds_and_clamps() {
        assert_eq!(normalize_score("k", &json!(0)).unwrap(), 1);
        assert_eq!(normalize_score("k", &json!(10.6)).unwrap(), 10);
        assert_eq!(normalize_score("k", &json!("5.5")).unwrap(), 6);
        assert!(normalize_score("k", &json!([])).is_err());
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("  line1\r\nline2 \n"), "line1\nline2");
    }

    #[tokio::test]
    async fn test_grade_uses_cache_for_same_canonical_essay() {
        let chat = ScriptedChat::new(valid_reply().to_string());
        let grader = LlmGrader::new(chat.clone());

        let first = grader.grade("line1\r\nline2").await.unwrap();
        let second = grader.grade("  line1\nline2\n").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
        assert_eq!(grader.cache_len(), 1);

        grader.grade("another essay").await.unwrap();
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest_essay_when_full() {
        let chat = ScriptedChat::new(valid_reply().to_string());
        let grader = LlmGrader::with_cache_capacity(chat.clone(), 2);

        grader.grade("essay one").await.unwrap();
        grader.grade("essay two").await.unwrap();
        grader.grade("essay one").await.unwrap();
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2);

        grader.grade("essay three").await.unwrap();
        assert_eq!(grader.cache_len(), 2);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);

        // 最早写入的 "essay one" 已被淘汰
        grader.grade("essay one").await.unwrap();
        assert_eq!(chat.calls.load(Ordering::SeqCst), 4);
        grader.grade("essay three").await.unwrap();
        assert_eq!(chat.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_grade_failures_are_not_cached() {
        let chat = ScriptedChat::new("not json");
        let grader = LlmGrader::new(chat.clone());

        assert!(grader.grade("essay").await.is_err());
        assert!(grader.grade("essay").await.is_err());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2);
        assert_eq!(grader.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_grade_empty_reply() {
        let grader = LlmGrader::new(ScriptedChat::new("  "));
        assert!(matches!(
            grader.grade("essay").await,
            Err(AppError::Llm(LlmError::EmptyContent { .. }))
        ));
    }

    #[tokio::test]
    async fn test_llm_service_grades_locally_and_delegates_rest() {
        let chat = ScriptedChat::new(valid_reply().to_string());
        let service = LlmGradingService::new(Arc::new(UnreachableBackend), LlmGrader::new(chat));

        let rater = service.login("kim", "000000").await.unwrap();
        assert_eq!(rater.rater_uid, "rater-uid");

        let request = AiGradeRequest {
            student_uid: "u1".into(),
            student_id: "10101".into(),
            rater_uid: rater.rater_uid.clone(),
            expert_crt_score: 5,
            expert_knw_score: 6,
            expert_rationale: String::new(),
            student_answer: "물은 100도에서 끓는다. 기압이 낮으면 다르다.".into(),
        };
        let grade = service.request_ai_grading(&request).await.unwrap();
        assert!(grade.score_uid.starts_with("llm-u1-"));
        assert_eq!(grade.result.scores.scientific, 7);
        assert_eq!(service.grader().cache_len(), 1);

        let empty = AiGradeRequest {
            student_answer: "   ".into(),
            ..request
        };
        assert!(service.request_ai_grading(&empty).await.is_err());
    }
}
