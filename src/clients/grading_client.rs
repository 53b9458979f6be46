//! 评分服务端 API 客户端
//!
//! 封装所有与评分服务端相关的调用逻辑：登录、查询学生、AI 评分、确认分数

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::{
    AiGrade, AiGradeRequest, AiGradeResponse, FinalScoreRequest, LoginRequest, LoginResponse,
    LookupQuery, RaterIdentity, StatusResponse, StudentRecord,
};

/// 评分服务
///
/// 流程层只依赖这个 trait，测试中可替换为内存实现
#[async_trait]
pub trait GradingService: Send + Sync {
    /// 评分员登录
    async fn login(&self, rater_id: &str, password: &str) -> AppResult<RaterIdentity>;

    /// 按查询表达式获取学生答卷
    async fn fetch_students(&self, query: &LookupQuery) -> AppResult<Vec<StudentRecord>>;

    /// 请求 AI 评分，返回结果与分数引用令牌
    async fn request_ai_grading(&self, request: &AiGradeRequest) -> AppResult<AiGrade>;

    /// 确认最终分数
    async fn confirm_final_score(&self, request: &FinalScoreRequest) -> AppResult<()>;
}

/// 基于 HTTP/JSON 的评分服务客户端
pub struct HttpGradingClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpGradingClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|_| ApiError::InvalidUrl {
            url: config.api_base_url.clone(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl {
                url: config.api_base_url.clone(),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { base_url, http })
    }

    /// 拼接接口地址，路径段会被转义
    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl {
                url: self.base_url.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post_json<B, T>(&self, name: &str, body: &B) -> AppResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(&[name])?;
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(name, e))?;
        read_json(name, response).await
    }
}

/// 读取响应体：非 2xx 视为错误，其余按 JSON 解析
async fn read_json<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> AppResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::api_request_failed(endpoint, e))?;

    if !status.is_success() {
        return Err(ApiError::BadResponse {
            endpoint: endpoint.to_string(),
            code: Some(status.as_u16()),
            message: Some(body).filter(|b| !b.trim().is_empty()),
        }
        .into());
    }

    debug!("{} 响应: {} 字节", endpoint, body.len());
    Ok(serde_json::from_str(&body)?)
}

// ========== 响应映射 ==========

fn identity_from_login(rater_id: &str, response: LoginResponse) -> AppResult<RaterIdentity> {
    match (response.success, response.rater_uid) {
        (true, Some(rater_uid)) => Ok(RaterIdentity {
            rater_uid,
            rater_id: response.rater_id.unwrap_or_else(|| rater_id.to_string()),
        }),
        _ => Err(AppError::rejected("login", "账号或密码错误")),
    }
}

fn ensure_found(status: StatusCode, lookup: &str) -> AppResult<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound {
            lookup: lookup.to_string(),
        }
        .into());
    }
    Ok(())
}

fn non_empty_records(records: Vec<StudentRecord>, lookup: &str) -> AppResult<Vec<StudentRecord>> {
    if records.is_empty() {
        return Err(ApiError::NotFound {
            lookup: lookup.to_string(),
        }
        .into());
    }
    Ok(records)
}

fn grade_from_response(response: AiGradeResponse) -> AppResult<AiGrade> {
    if !response.success {
        let message = response
            .message
            .unwrap_or_else(|| "AI 评分失败".to_string());
        return Err(AppError::rejected("ai_grade", message));
    }

    match (response.ai_result, response.score_uid) {
        (Some(result), Some(score_uid)) => Ok(AiGrade { result, score_uid }),
        _ => Err(AppError::rejected("ai_grade", "响应缺少 ai_result 或 score_uid")),
    }
}

fn confirm_from_status(response: StatusResponse) -> AppResult<()> {
    if response.is_ok() {
        return Ok(());
    }
    Err(AppError::rejected(
        "add_final_score",
        response
            .message
            .unwrap_or_else(|| format!("status={}", response.status)),
    ))
}

#[async_trait]
impl GradingService for HttpGradingClient {
    async fn login(&self, rater_id: &str, password: &str) -> AppResult<RaterIdentity> {
        let response: LoginResponse = self
            .post_json("login", &LoginRequest { rater_id, password })
            .await?;
        identity_from_login(rater_id, response)
    }

    async fn fetch_students(&self, query: &LookupQuery) -> AppResult<Vec<StudentRecord>> {
        let expression = query.expression();
        let (name, url) = if query.is_batch() {
            ("students", self.endpoint(&["students", &expression])?)
        } else {
            ("student", self.endpoint(&["student", &expression])?)
        };

        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(name, e))?;

        ensure_found(response.status(), &expression)?;

        let records = if query.is_batch() {
            read_json::<Vec<StudentRecord>>(name, response).await?
        } else {
            vec![read_json::<StudentRecord>(name, response).await?]
        };

        non_empty_records(records, &expression)
    }

    async fn request_ai_grading(&self, request: &AiGradeRequest) -> AppResult<AiGrade> {
        let response: AiGradeResponse = self.post_json("ai_grade", request).await?;
        grade_from_response(response)
    }

    async fn confirm_final_score(&self, request: &FinalScoreRequest) -> AppResult<()> {
        let response: StatusResponse = self.post_json("add_final_score", request).await?;
        confirm_from_status(response)
    }
}
