use thiserror::Error;

use crate::models::Dimension;
use crate::workflow::{Phase, Trigger};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 评分流程（状态机）错误
    #[error("流程错误: {0}")]
    Workflow(#[from] WorkflowError),
    /// 查询表达式错误
    #[error("查询错误: {0}")]
    Lookup(#[from] LookupError),
    /// 会话错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 评分流程错误
///
/// 全部在发起远程调用之前产生，状态保持不变
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// 专家分数未填写
    #[error("请先填写专家分数: {dimension}")]
    MissingScore { dimension: Dimension },
    /// 专家分数超出区间
    #[error("{dimension} 分数 {value} 超出范围 [1, 10]")]
    ScoreOutOfRange { dimension: Dimension, value: i32 },
    /// 当前状态下专家输入已锁定
    #[error("当前状态 {phase} 下专家输入已锁定")]
    InputsLocked { phase: Phase },
    /// 状态转换不合法
    #[error("状态 {phase} 不允许操作: {trigger}")]
    IllegalTransition { phase: Phase, trigger: Trigger },
    /// 分数已最终确认，不可再修改
    #[error("分数已确认，不可再修改")]
    AlreadyConfirmed,
    /// 尚无 AI 评分结果
    #[error("尚无 AI 评分结果，无法确认")]
    NoAiResult,
}

/// 查询表达式错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("请输入学号")]
    Empty,
    #[error("无效的学号区间: {input}")]
    InvalidRange { input: String },
    #[error("学号区间起点 {start} 大于终点 {end}")]
    ReversedRange { start: String, end: String },
    #[error("学号列表中存在空项: {input}")]
    EmptyListItem { input: String },
}

/// 会话错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("尚未登录")]
    NotLoggedIn,
    #[error("请输入评分员账号")]
    MissingRaterId,
    #[error("评分项 #{index} 不存在（共 {len} 项）")]
    ItemNotFound { index: usize, len: usize },
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// HTTP 状态异常
    #[error("API返回错误响应 ({endpoint}): code={code:?}, message={message:?}")]
    BadResponse {
        endpoint: String,
        code: Option<u16>,
        message: Option<String>,
    },
    /// 查询无结果
    #[error("未找到学生: {lookup}")]
    NotFound { lookup: String },
    /// 服务端明确返回失败
    #[error("服务端拒绝请求 ({endpoint}): {message}")]
    Rejected { endpoint: String, message: String },
    /// 请求超时
    #[error("请求超时 ({endpoint}): 超过 {secs} 秒")]
    Timeout { endpoint: String, secs: u64 },
    /// JSON 解析失败
    #[error("JSON解析失败: {source}")]
    JsonParseFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 地址无效
    #[error("无效的接口地址: {url}")]
    InvalidUrl { url: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容不是合法 JSON
    #[error("LLM返回内容不是合法 JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
    /// JSON 结构不符合评分格式
    #[error("评分结果格式错误: {0}")]
    InvalidShape(String),
    /// 分数无法解析
    #[error("分数转换失败 ({key}): {value}")]
    InvalidScore { key: String, value: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 未知的评分后端
    #[error("未知的评分后端: '{0}'（可选: remote / llm）")]
    UnknownBackend(String),
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|url| url.path().to_string())
            .unwrap_or_default();
        AppError::Api(ApiError::RequestFailed {
            endpoint,
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建服务端拒绝错误
    pub fn rejected(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Api(ApiError::Rejected {
            endpoint: endpoint.into(),
            message: message.into(),
        })
    }

    /// 创建超时错误
    pub fn timeout(endpoint: impl Into<String>, secs: u64) -> Self {
        AppError::Api(ApiError::Timeout {
            endpoint: endpoint.into(),
            secs,
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: source.into(),
        })
    }

    /// 是否为校验类错误（未发起任何远程调用）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Workflow(_) | AppError::Lookup(_) | AppError::Session(_)
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
