use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "grading.toml";

/// AI 评分由谁完成
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingBackend {
    /// 评分服务端的 `/ai_grade` 接口
    #[default]
    Remote,
    /// 本地直接调用大模型，其余接口仍走评分服务端
    Llm,
}

impl FromStr for GradingBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(GradingBackend::Remote),
            "llm" => Ok(GradingBackend::Llm),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 评分服务端地址
    pub api_base_url: String,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// AI 评分超时（秒）
    pub ai_timeout_secs: u64,
    /// 确认分数超时（秒）
    pub confirm_timeout_secs: u64,
    /// 查看答卷时是否显示可用操作等详细信息
    pub verbose_logging: bool,
    pub grading_backend: GradingBackend,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 评分员（可选，用于启动时自动登录）---
    pub rater_id: Option<String>,
    pub rater_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
            ai_timeout_secs: 120,
            confirm_timeout_secs: 30,
            verbose_logging: false,
            grading_backend: GradingBackend::Remote,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai"
                .to_string(),
            llm_model_name: "gemini-2.5-flash".to_string(),
            rater_id: None,
            rater_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，缺失的键使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 配置文件（`GRADING_CONFIG` 或默认路径，存在时）+ 环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GRADING_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = if Path::new(&path).exists() {
            info!("📄 读取配置文件: {}", path);
            Self::from_toml_file(&path)?
        } else {
            debug!("未找到配置文件 {}，使用默认配置", path);
            Self::default()
        };
        base.with_env_overrides()
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let default = self;
        let grading_backend = backend_override(
            std::env::var("GRADING_BACKEND").ok().as_deref(),
            default.grading_backend,
        )?;
        Ok(Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(default.api_base_url),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            ai_timeout_secs: std::env::var("AI_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.ai_timeout_secs),
            confirm_timeout_secs: std::env::var("CONFIRM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.confirm_timeout_secs),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            grading_backend,
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            rater_id: std::env::var("RATER_ID").ok().or(default.rater_id),
            rater_password: std::env::var("RATER_PASSWORD").ok().or(default.rater_password),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

/// 环境变量中的评分后端：未设置时沿用已有配置，无法识别时报错
fn backend_override(
    value: Option<&str>,
    fallback: GradingBackend,
) -> Result<GradingBackend, ConfigError> {
    match value {
        Some(v) => v.parse(),
        None => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            api_base_url = "https://grading.example.com"
            ai_timeout_secs = 45
            grading_backend = "llm"
            rater_id = "kim"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "https://grading.example.com");
        assert_eq!(config.ai_timeout(), Duration::from_secs(45));
        assert_eq!(config.grading_backend, GradingBackend::Llm);
        assert_eq!(config.rater_id.as_deref(), Some("kim"));
        assert_eq!(config.confirm_timeout_secs, Config::default().confirm_timeout_secs);
        assert_eq!(config.llm_model_name, "gemini-2.5-flash");
        assert!(config.rater_password.is_none());
    }

    #[test]
    fn test_toml_rejects_unknown_backend() {
        assert!(Config::from_toml_str(r#"grading_backend = "offline""#).is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("LLM".parse::<GradingBackend>().unwrap(), GradingBackend::Llm);
        assert_eq!(" remote ".parse::<GradingBackend>().unwrap(), GradingBackend::Remote);
        assert!(matches!(
            "cloud".parse::<GradingBackend>(),
            Err(ConfigError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_backend_override_rejects_unknown_value() {
        assert_eq!(
            backend_override(None, GradingBackend::Llm).unwrap(),
            GradingBackend::Llm
        );
        assert_eq!(
            backend_override(Some("remote"), GradingBackend::Llm).unwrap(),
            GradingBackend::Remote
        );
        assert!(matches!(
            backend_override(Some("offline"), GradingBackend::Remote),
            Err(ConfigError::UnknownBackend(v)) if v == "offline"
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::from_toml_file("/nonexistent/grading.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/grading.toml"));
    }
}
