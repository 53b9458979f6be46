//! 评分会话 - 编排层
//!
//! ## 职责
//!
//! 1. **身份管理**：登录 / 注销（注销即完整重置）
//! 2. **查询**：解析查询表达式，为每份答卷创建一个独立的 `GradingItemWorkflow`
//! 3. **调度**：把评分员的操作路由到对应评分项，批量评分时并发执行
//! 4. **统计**：按状态汇总
//!
//! 评分项从 1 开始编号，与 `GradingCtx::item_index` 一致。

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::clients::GradingService;
use crate::config::Config;
use crate::error::{AppResult, SessionError};
use crate::highlight::Span;
use crate::models::{Dimension, LookupQuery, RaterIdentity};
use crate::utils::logging::{log_search_loaded, SessionStats};
use crate::workflow::{GradingCtx, GradingItemWorkflow};

/// 一位评分员的评分会话
pub struct GradingSession {
    service: Arc<dyn GradingService>,
    ai_timeout: Duration,
    confirm_timeout: Duration,
    rater: Option<RaterIdentity>,
    items: Vec<GradingItemWorkflow>,
    last_query: Option<LookupQuery>,
}

impl GradingSession {
    pub fn new(service: Arc<dyn GradingService>, config: &Config) -> Self {
        Self {
            service,
            ai_timeout: config.ai_timeout(),
            confirm_timeout: config.confirm_timeout(),
            rater: None,
            items: Vec::new(),
            last_query: None,
        }
    }

    pub fn rater(&self) -> Option<&RaterIdentity> {
        self.rater.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.rater.is_some()
    }

    pub fn items(&self) -> &[GradingItemWorkflow] {
        &self.items
    }

    pub fn last_query(&self) -> Option<&LookupQuery> {
        self.last_query.as_ref()
    }

    /// 登录；换了评分员时先清空上一位评分员的评分项
    pub async fn login(&mut self, rater_id: &str, password: &str) -> AppResult<&RaterIdentity> {
        let rater_id = rater_id.trim();
        if rater_id.is_empty() {
            return Err(SessionError::MissingRaterId.into());
        }

        let identity = self.service.login(rater_id, password).await?;
        if self
            .rater
            .as_ref()
            .is_some_and(|current| current.rater_uid != identity.rater_uid)
        {
            self.logout();
        }

        info!("👤 评分员 {} 登录成功", identity.rater_id);
        Ok(&*self.rater.insert(identity))
    }

    /// 注销：清空身份、评分项和查询记录
    pub fn logout(&mut self) {
        if let Some(rater) = self.rater.take() {
            info!("👋 评分员 {} 已注销，清空 {} 份答卷", rater.rater_id, self.items.len());
        }
        self.items.clear();
        self.last_query = None;
    }

    fn require_rater(&self) -> Result<&RaterIdentity, SessionError> {
        self.rater.as_ref().ok_or(SessionError::NotLoggedIn)
    }

    /// 查询学生答卷
    ///
    /// 成功时替换全部评分项；失败时保留原有评分项
    pub async fn search(&mut self, input: &str) -> AppResult<usize> {
        let rater = self.require_rater()?.clone();
        let query = LookupQuery::parse(input)?;

        info!("🔍 正在查询 {}...", query);
        let records = self.service.fetch_students(&query).await?;

        self.items = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                GradingItemWorkflow::new(
                    GradingCtx::new(record, &rater, i + 1),
                    record.student_answer.clone(),
                )
            })
            .collect();

        log_search_loaded(&query, self.items.len());
        self.last_query = Some(query);
        Ok(self.items.len())
    }

    fn slot(
        items: &mut [GradingItemWorkflow],
        index: usize,
    ) -> Result<&mut GradingItemWorkflow, SessionError> {
        let len = items.len();
        index
            .checked_sub(1)
            .and_then(|i| items.get_mut(i))
            .ok_or(SessionError::ItemNotFound { index, len })
    }

    pub fn item(&self, index: usize) -> Result<&GradingItemWorkflow, SessionError> {
        index
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .ok_or(SessionError::ItemNotFound {
                index,
                len: self.items.len(),
            })
    }

    pub fn item_mut(&mut self, index: usize) -> Result<&mut GradingItemWorkflow, SessionError> {
        Self::slot(&mut self.items, index)
    }

    /// 填写专家分数（`None` 表示清空）
    pub fn set_scores(
        &mut self,
        index: usize,
        scientific: Option<i32>,
        critical: Option<i32>,
    ) -> AppResult<()> {
        let item = self.item_mut(index)?;
        item.set_score(Dimension::Scientific, scientific)?;
        item.set_score(Dimension::Critical, critical)?;
        Ok(())
    }

    /// 填写评分理由
    pub fn set_rationale(&mut self, index: usize, rationale: impl Into<String>) -> AppResult<()> {
        self.item_mut(index)?.set_rationale(rationale)?;
        Ok(())
    }

    /// 对单个评分项请求 AI 评分
    pub async fn grade(&mut self, index: usize) -> AppResult<()> {
        let item = Self::slot(&mut self.items, index)?;
        item.run_ai_grading(self.service.as_ref(), self.ai_timeout)
            .await
    }

    /// 并发评分所有已填好分数、且当前允许评分的评分项
    ///
    /// 返回 `(评分项编号, 结果)`，各项互不影响
    pub async fn grade_all_ready(&mut self) -> Vec<(usize, AppResult<()>)> {
        let service = self.service.as_ref();
        let timeout = self.ai_timeout;

        let tasks = self
            .items
            .iter_mut()
            .filter(|item| item.can_request_ai() && item.validated_scores().is_ok())
            .map(move |item| async move {
                let index = item.ctx().item_index;
                (index, item.run_ai_grading(service, timeout).await)
            });

        let results = join_all(tasks).await;

        let success = results.iter().filter(|(_, r)| r.is_ok()).count();
        if results.is_empty() {
            warn!("⚠️ 没有可以评分的答卷（请先填写专家分数）");
        } else {
            info!("✓ 批量 AI 评分完成: 成功 {}/{}", success, results.len());
        }
        results
    }

    /// 重新打开专家输入
    pub fn edit(&mut self, index: usize) -> AppResult<()> {
        self.item_mut(index)?.request_edit()?;
        Ok(())
    }

    /// 确认最终分数
    pub async fn confirm(&mut self, index: usize) -> AppResult<()> {
        let item = Self::slot(&mut self.items, index)?;
        item.run_confirm(self.service.as_ref(), self.confirm_timeout)
            .await
    }

    /// 带证据高亮的答卷
    pub fn annotated(&self, index: usize) -> Result<Vec<Span>, SessionError> {
        Ok(self.item(index)?.annotated_answer())
    }

    /// 按状态统计
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for item in &self.items {
            stats.record(item.phase());
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, AppError, LookupError};
    use crate::models::{AiGrade, AiGradeRequest, AiResult, FinalScoreRequest, PerDimension, StudentRecord};
    use crate::workflow::Phase;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct InMemoryService {
        students: Vec<StudentRecord>,
        fail_fetch: AtomicBool,
        fetch_calls: AtomicUsize,
    }

    impl InMemoryService {
        fn with_students(n: usize) -> Self {
            Self {
                students: (1..=n)
                    .map(|i| {
                        StudentRecord::new(
                            format!("uid-{}", i),
                            format!("{}", 10100 + i),
                            format!("answer {} mentions heat", i),
                        )
                    })
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl GradingService for InMemoryService {
        async fn login(&self, rater_id: &str, _password: &str) -> AppResult<RaterIdentity> {
            Ok(RaterIdentity {
                rater_uid: format!("uid-of-{}", rater_id),
                rater_id: rater_id.to_string(),
            })
        }

        async fn fetch_students(&self, query: &LookupQuery) -> AppResult<Vec<StudentRecord>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(AppError::rejected("students", "服务端错误"));
            }
            let wanted = |id: &str| match query {
                LookupQuery::Single(single) => id == single,
                LookupQuery::List(ids) => ids.iter().any(|x| x == id),
                LookupQuery::Range { start, end } => id >= start.as_str() && id <= end.as_str(),
            };
            let found: Vec<_> = self
                .students
                .iter()
                .filter(|s| wanted(&s.student_id))
                .cloned()
                .collect();
            if found.is_empty() {
                return Err(ApiError::NotFound {
                    lookup: query.expression(),
                }
                .into());
            }
            Ok(found)
        }

        async fn request_ai_grading(&self, request: &AiGradeRequest) -> AppResult<AiGrade> {
            Ok(AiGrade {
                result: AiResult {
                    scores: PerDimension::new(request.expert_knw_score, 5),
                    rationales: PerDimension::default(),
                    key_sentences: PerDimension::new(vec!["heat".into()], Vec::new()),
                },
                score_uid: format!("score-{}", request.student_uid),
            })
        }

        async fn confirm_final_score(&self, _request: &FinalScoreRequest) -> AppResult<()> {
            Ok(())
        }
    }

    fn session(service: InMemoryService) -> (GradingSession, Arc<InMemoryService>) {
        let service = Arc::new(service);
        (
            GradingSession::new(service.clone(), &Config::default()),
            service,
        )
    }

    #[tokio::test]
    async fn test_search_requires_login() {
        let (mut session, service) = session(InMemoryService::with_students(3));
        let err = session.search("10101").await.unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::NotLoggedIn)));
        assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_requires_rater_id() {
        let (mut session, _) = session(InMemoryService::default());
        assert!(matches!(
            session.login("  ", "000000").await,
            Err(AppError::Session(SessionError::MissingRaterId))
        ));
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_search_populates_independent_items() {
        let (mut session, _) = session(InMemoryService::with_students(5));
        session.login("kim", "000000").await.unwrap();

        assert_eq!(session.search("10101-10103").await.unwrap(), 3);
        let ids: Vec<_> = session
            .items()
            .iter()
            .map(|item| (item.ctx().item_index, item.ctx().student_id.clone()))
            .collect();
        assert_eq!(
            ids,
            vec![
                (1, "10101".to_string()),
                (2, "10102".to_string()),
                (3, "10103".to_string())
            ]
        );
        assert!(session
            .items()
            .iter()
            .all(|item| item.ctx().rater_uid == "uid-of-kim" && item.phase() == Phase::Collecting));

        session.set_scores(1, Some(6), Some(7)).unwrap();
        session.grade(1).await.unwrap();
        assert_eq!(session.item(1).unwrap().phase(), Phase::AiReady);
        assert_eq!(session.item(2).unwrap().phase(), Phase::Collecting);
    }

    #[tokio::test]
    async fn test_new_search_discards_items_and_failure_keeps_them() {
        let (mut session, service) = session(InMemoryService::with_students(5));
        session.login("kim", "000000").await.unwrap();
        session.search("10101,10102").await.unwrap();
        session.set_scores(1, Some(6), Some(7)).unwrap();

        service.fail_fetch.store(true, Ordering::SeqCst);
        assert!(session.search("10104").await.is_err());
        assert_eq!(session.items().len(), 2);
        assert_eq!(session.item(1).unwrap().expert().scores.scientific, Some(6));

        assert!(matches!(
            session.search("   ").await,
            Err(AppError::Lookup(LookupError::Empty))
        ));
        assert_eq!(session.items().len(), 2);

        service.fail_fetch.store(false, Ordering::SeqCst);
        session.search("10104").await.unwrap();
        assert_eq!(session.items().len(), 1);
        assert_eq!(session.item(1).unwrap().ctx().student_id, "10104");
        assert_eq!(session.item(1).unwrap().expert().scores.scientific, None);
        assert_eq!(session.last_query(), Some(&LookupQuery::Single("10104".into())));
    }

    #[tokio::test]
    async fn test_item_index_out_of_range() {
        let (mut session, _) = session(InMemoryService::with_students(2));
        session.login("kim", "000000").await.unwrap();
        session.search("10101").await.unwrap();

        assert_eq!(
            session.item(0).err(),
            Some(SessionError::ItemNotFound { index: 0, len: 1 })
        );
        assert!(matches!(
            session.grade(2).await,
            Err(AppError::Session(SessionError::ItemNotFound { index: 2, len: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_grade_all_ready_skips_incomplete_items() {
        let (mut session, _) = session(InMemoryService::with_students(3));
        session.login("kim", "000000").await.unwrap();
        session.search("10101-10103").await.unwrap();
        session.set_scores(1, Some(3), Some(4)).unwrap();
        session.set_scores(3, Some(9), Some(0)).unwrap();
        session.set_scores(2, Some(8), Some(8)).unwrap();

        let results = session.grade_all_ready().await;
        let graded: Vec<_> = results.iter().map(|(i, r)| (*i, r.is_ok())).collect();
        assert_eq!(graded, vec![(1, true), (2, true)]);

        let stats = session.stats();
        assert_eq!(stats.ai_ready, 2);
        assert_eq!(stats.collecting, 1);
        assert_eq!(
            session.item(2).unwrap().ai_grade().unwrap().score_uid,
            "score-uid-2"
        );
    }

    #[tokio::test]
    async fn test_full_item_lifecycle_and_annotation() {
        let (mut session, _) = session(InMemoryService::with_students(1));
        session.login("kim", "000000").await.unwrap();
        session.search("10101").await.unwrap();
        session.set_scores(1, Some(6), Some(7)).unwrap();
        session.set_rationale(1, "설명이 정확함").unwrap();

        session.grade(1).await.unwrap();
        let spans = session.annotated(1).unwrap();
        assert!(spans.iter().any(|s| s.text == "heat" && s.is_evidence()));

        session.edit(1).unwrap();
        session.set_scores(1, Some(8), Some(7)).unwrap();
        session.grade(1).await.unwrap();
        assert_eq!(session.item(1).unwrap().ai_grade().unwrap().result.scores.scientific, 8);

        session.confirm(1).await.unwrap();
        assert_eq!(session.item(1).unwrap().phase(), Phase::Confirmed);
        assert!(session.set_scores(1, Some(1), Some(1)).is_err());
        assert_eq!(session.stats().confirmed, 1);
    }

    #[tokio::test]
    async fn test_logout_resets_session() {
        let (mut session, _) = session(InMemoryService::with_students(2));
        session.login("kim", "000000").await.unwrap();
        session.search("10101-10102").await.unwrap();

        session.logout();

        assert!(!session.is_logged_in());
        assert!(session.items().is_empty());
        assert!(session.last_query().is_none());
        assert_eq!(session.stats().total(), 0);
        assert!(matches!(
            session.search("10101").await,
            Err(AppError::Session(SessionError::NotLoggedIn))
        ));
    }

    #[tokio::test]
    async fn test_switching_rater_clears_items() {
        let (mut session, _) = session(InMemoryService::with_students(2));
        session.login("kim", "000000").await.unwrap();
        session.search("10101-10102").await.unwrap();

        session.login("kim", "000000").await.unwrap();
        assert_eq!(session.items().len(), 2);

        session.login("lee", "000000").await.unwrap();
        assert!(session.items().is_empty());
        assert_eq!(session.rater().unwrap().rater_id, "lee");
    }
}
