//! LLM 服务 - 业务能力层
//!
//! 只负责"调用大模型"能力，不关心评分规则
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini OpenAI 兼容端点、Azure 等）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;

/// 文本对话模型
///
/// 评分器只依赖这个 trait，测试中可替换为脚本化实现
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 发送一轮对话，返回模型回复（已去除首尾空白）
    async fn complete(&self, user_message: &str, system_message: Option<&str>) -> Result<String>;

    /// 模型名称（参与缓存键）
    fn model_name(&self) -> &str;
}

/// LLM 服务
///
/// 职责：
/// - 调用兼容 OpenAI 的 Chat Completions 接口
/// - 固定温度为 0，保证同一篇答卷评分稳定
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.chars().count());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(4096u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ChatModel for LlmService {
    async fn complete(&self, user_message: &str, system_message: Option<&str>) -> Result<String> {
        self.send_to_llm(user_message, system_message).await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_from_config() {
        let config = Config {
            llm_model_name: "gemini-2.5-pro".to_string(),
            ..Config::default()
        };
        let service = LlmService::new(&config);
        assert_eq!(ChatModel::model_name(&service), "gemini-2.5-pro");
    }

    /// 测试通用 LLM 调用
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_send_to_llm_simple -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_send_to_llm_simple() {
        let _ = tracing_subscriber::fmt::try_init();

        let service = LlmService::new(&Config::from_env().unwrap());

        let result = service
            .send_to_llm("用一句话介绍你自己", Some("你是一个简洁的助手，回答要简短。"))
            .await;

        match result {
            Ok(response) => {
                println!("\n========== LLM 响应 ==========");
                println!("{}", response);
                println!("==============================\n");
                assert!(!response.is_empty());
            }
            Err(e) => panic!("测试失败: {}", e),
        }
    }
}
