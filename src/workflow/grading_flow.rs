//! 单个评分项的处理流程 - 流程层
//!
//! 核心职责：定义"一位学生的答卷"从专家评分到最终确认的完整生命周期
//!
//! 流程顺序：
//! 1. 填写专家分数 / 理由（待评分）
//! 2. 请求 AI 评分（锁定输入）→ 查看结果
//! 3. 可选：重新打开输入修改，再次请求 AI 评分
//! 4. 确认最终分数（不可逆）
//!
//! 状态转换本身是纯函数式的（`begin_*` / `complete_*`），
//! `run_*` 负责调用远程服务并在失败、超时时回滚。

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

use crate::clients::GradingService;
use crate::error::{AppError, AppResult, WorkflowError};
use crate::highlight::{self, Span};
use crate::models::{
    AiGrade, AiGradeRequest, Dimension, ExpertInput, FinalScoreRequest, PerDimension, SCORE_RANGE,
};
use crate::utils::logging::truncate_text;
use crate::workflow::grading_ctx::GradingCtx;
use crate::workflow::lifecycle::{LifecycleState, Phase, Trigger};

/// 单个评分项的状态机
///
/// - 独占该评分项的全部可变状态
/// - 不同评分项之间互不共享锁定状态
/// - `AiPending` 本身就是互斥手段：请求进行中不能再次发起
#[derive(Debug, Clone)]
pub struct GradingItemWorkflow {
    ctx: GradingCtx,
    answer: String,
    expert: ExpertInput,
    state: LifecycleState,
}

impl GradingItemWorkflow {
    /// 创建新的评分项（初始状态：待评分）
    pub fn new(ctx: GradingCtx, answer: impl Into<String>) -> Self {
        Self {
            ctx,
            answer: answer.into(),
            expert: ExpertInput::default(),
            state: LifecycleState::Collecting,
        }
    }

    pub fn ctx(&self) -> &GradingCtx {
        &self.ctx
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn expert(&self) -> &ExpertInput {
        &self.expert
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn ai_grade(&self) -> Option<&AiGrade> {
        self.state.grade()
    }

    // ========== 控件可用性 ==========

    /// 专家分数 / 理由是否可编辑
    pub fn can_edit_inputs(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Collecting | LifecycleState::Editing { .. }
        )
    }

    /// 是否可以发起 AI 评分
    pub fn can_request_ai(&self) -> bool {
        self.can_edit_inputs()
    }

    /// 是否可以重新打开输入
    pub fn can_request_edit(&self) -> bool {
        matches!(self.state, LifecycleState::AiReady { .. })
    }

    /// 是否可以确认最终分数
    pub fn can_confirm(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::AiReady { .. } | LifecycleState::Editing { .. }
        )
    }

    // ========== 专家输入 ==========

    /// 设置某个维度的专家分数（区间校验在请求 AI 评分时进行）
    pub fn set_score(
        &mut self,
        dimension: Dimension,
        value: Option<i32>,
    ) -> Result<(), WorkflowError> {
        self.ensure_inputs_editable()?;
        *self.expert.scores.get_mut(dimension) = value;
        Ok(())
    }

    /// 设置评分理由
    pub fn set_rationale(&mut self, rationale: impl Into<String>) -> Result<(), WorkflowError> {
        self.ensure_inputs_editable()?;
        self.expert.rationale = rationale.into();
        Ok(())
    }

    /// 校验两个维度的专家分数：都已填写且在 [1, 10] 内
    pub fn validated_scores(&self) -> Result<PerDimension<i32>, WorkflowError> {
        for (dimension, value) in self.expert.scores.iter() {
            if value.is_none() {
                return Err(WorkflowError::MissingScore { dimension });
            }
        }
        for (dimension, value) in self.expert.scores.iter() {
            if let Some(value) = *value {
                if !SCORE_RANGE.contains(&value) {
                    return Err(WorkflowError::ScoreOutOfRange { dimension, value });
                }
            }
        }
        Ok(self.expert.scores.map(|_, value| value.unwrap_or_default()))
    }

    fn ensure_inputs_editable(&self) -> Result<(), WorkflowError> {
        self.ensure_not_confirmed()?;
        if self.can_edit_inputs() {
            Ok(())
        } else {
            Err(WorkflowError::InputsLocked {
                phase: self.phase(),
            })
        }
    }

    fn ensure_not_confirmed(&self) -> Result<(), WorkflowError> {
        match self.state {
            LifecycleState::Confirmed { .. } => Err(WorkflowError::AlreadyConfirmed),
            _ => Ok(()),
        }
    }

    fn illegal(&self, trigger: Trigger) -> WorkflowError {
        WorkflowError::IllegalTransition {
            phase: self.phase(),
            trigger,
        }
    }

    // ========== 状态转换 ==========

    /// 待评分 / 修改中 → AI评分中
    ///
    /// 返回需要发送给评分接口的请求；校验失败时状态不变
    pub fn begin_ai_grading(&mut self) -> Result<AiGradeRequest, WorkflowError> {
        self.ensure_not_confirmed()?;
        let previous = match &self.state {
            LifecycleState::Collecting => None,
            LifecycleState::Editing { grade } => Some(grade.clone()),
            _ => return Err(self.illegal(Trigger::RequestAiGrading)),
        };
        let scores = self.validated_scores()?;

        let request = AiGradeRequest {
            student_uid: self.ctx.student_uid.clone(),
            student_id: self.ctx.student_id.clone(),
            rater_uid: self.ctx.rater_uid.clone(),
            expert_crt_score: scores.critical,
            expert_knw_score: scores.scientific,
            expert_rationale: self.expert.rationale.clone(),
            student_answer: self.answer.clone(),
        };

        self.state = LifecycleState::AiPending { previous };
        Ok(request)
    }

    /// AI评分中 → AI结果已出
    pub fn complete_ai_grading(&mut self, grade: AiGrade) -> Result<(), WorkflowError> {
        self.ensure_not_confirmed()?;
        if !matches!(self.state, LifecycleState::AiPending { .. }) {
            return Err(self.illegal(Trigger::ResolveAiGrading));
        }
        self.state = LifecycleState::AiReady { grade };
        Ok(())
    }

    /// AI评分中 → 发起前的状态（不保存任何部分结果）
    ///
    /// 返回恢复后的状态
    pub fn fail_ai_grading(&mut self) -> Result<Phase, WorkflowError> {
        self.ensure_not_confirmed()?;
        match std::mem::replace(&mut self.state, LifecycleState::Collecting) {
            LifecycleState::AiPending { previous } => {
                self.state = match previous {
                    Some(grade) => LifecycleState::Editing { grade },
                    None => LifecycleState::Collecting,
                };
                Ok(self.phase())
            }
            other => {
                self.state = other;
                Err(self.illegal(Trigger::ResolveAiGrading))
            }
        }
    }

    /// AI结果已出 → 修改中
    pub fn request_edit(&mut self) -> Result<(), WorkflowError> {
        self.ensure_not_confirmed()?;
        match std::mem::replace(&mut self.state, LifecycleState::Collecting) {
            LifecycleState::AiReady { grade } => {
                self.state = LifecycleState::Editing { grade };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.illegal(Trigger::RequestEdit))
            }
        }
    }

    /// 构建最终确认请求（状态不变，远程调用成功后再调用 `complete_confirm`）
    pub fn begin_confirm(&self) -> Result<FinalScoreRequest, WorkflowError> {
        match &self.state {
            LifecycleState::AiReady { grade } | LifecycleState::Editing { grade } => {
                Ok(FinalScoreRequest {
                    score_uid: grade.score_uid.clone(),
                    student_uid: self.ctx.student_uid.clone(),
                    rater_uid: self.ctx.rater_uid.clone(),
                    knw_score: grade.result.scores.scientific,
                    crt_score: grade.result.scores.critical,
                })
            }
            LifecycleState::Confirmed { .. } => Err(WorkflowError::AlreadyConfirmed),
            LifecycleState::Collecting => Err(WorkflowError::NoAiResult),
            LifecycleState::AiPending { .. } => Err(self.illegal(Trigger::RequestConfirm)),
        }
    }

    /// AI结果已出 / 修改中 → 已确认
    pub fn complete_confirm(&mut self) -> Result<(), WorkflowError> {
        self.ensure_not_confirmed()?;
        match std::mem::replace(&mut self.state, LifecycleState::Collecting) {
            LifecycleState::AiReady { grade } | LifecycleState::Editing { grade } => {
                self.state = LifecycleState::Confirmed {
                    grade,
                    confirmed_at: Local::now(),
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.illegal(Trigger::RequestConfirm))
            }
        }
    }

    // ========== 展示 ==========

    /// 带证据高亮的答卷
    pub fn annotated_answer(&self) -> Vec<Span> {
        match self.ai_grade() {
            Some(grade) => highlight::annotate(&self.answer, &grade.result.evidence()),
            None => highlight::annotate(&self.answer, &BTreeMap::new()),
        }
    }

    // ========== 远程调用 ==========

    /// 请求 AI 评分
    ///
    /// 失败、被拒绝或超时都会回到发起前的状态，并把错误返回给调用方
    pub async fn run_ai_grading(
        &mut self,
        service: &dyn GradingService,
        timeout: Duration,
    ) -> AppResult<()> {
        let request = self.begin_ai_grading()?;

        info!(
            "{} 🤖 正在请求 AI 评分 (专家分数: {} {} / {} {})...",
            self.ctx,
            Dimension::Scientific,
            request.expert_knw_score,
            Dimension::Critical,
            request.expert_crt_score
        );
        if !request.expert_rationale.is_empty() {
            info!(
                "{} 评分理由: {}",
                self.ctx,
                truncate_text(&request.expert_rationale, 40)
            );
        }

        let error = match tokio::time::timeout(timeout, service.request_ai_grading(&request)).await
        {
            Ok(Ok(grade)) => {
                info!(
                    "{} ✓ AI 评分完成: {} {} / {} {}",
                    self.ctx,
                    Dimension::Scientific,
                    grade.result.scores.scientific,
                    Dimension::Critical,
                    grade.result.scores.critical
                );
                self.complete_ai_grading(grade)?;
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => AppError::timeout("ai_grade", timeout.as_secs()),
        };

        let restored = self.fail_ai_grading()?;
        warn!(
            "{} ⚠️ AI 评分失败，已恢复为「{}」: {}",
            self.ctx, restored, error
        );
        Err(error)
    }

    /// 确认最终分数
    ///
    /// 失败时状态不变，由评分员手动重试
    pub async fn run_confirm(
        &mut self,
        service: &dyn GradingService,
        timeout: Duration,
    ) -> AppResult<()> {
        let request = self.begin_confirm()?;

        info!(
            "{} 📤 正在确认最终分数: {} {} / {} {}",
            self.ctx,
            Dimension::Scientific,
            request.knw_score,
            Dimension::Critical,
            request.crt_score
        );

        let error =
            match tokio::time::timeout(timeout, service.confirm_final_score(&request)).await {
                Ok(Ok(())) => {
                    self.complete_confirm()?;
                    info!("{} ✓ 分数已确认", self.ctx);
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_) => AppError::timeout("add_final_score", timeout.as_secs()),
            };

        warn!(
            "{} ⚠️ 分数确认失败，状态保持「{}」: {}",
            self.ctx,
            self.phase(),
            error
        );
        Err(error)
    }
}
