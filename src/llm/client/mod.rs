//! LLM客户端 - 基于 rig 的推理服务实现

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use tracing::{error, info, warn};

use crate::config::LLMConfig;
use crate::llm::{ReasoningRequest, ReasoningService, ResponseFormat};

mod providers;
pub mod utils;

use providers::ProviderClient;
use utils::evaluate_befitting_model;

/// JSON 模式下追加到系统提示词末尾的约束
const JSON_ONLY_INSTRUCTION: &str =
    "Output only a valid JSON object. Do not wrap it in prose and do not add comments.";

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!("🔄 正在检查模型连接...");
        match self.prompt("You are a helpful assistant.", "Hello").await {
            Ok(_) => {
                info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                error!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries, max_retries, err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 单轮对话，按prompt长度选择模型，失败后切换到备选模型
    pub async fn prompt(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);

        self.prompt_inner(system_prompt, user_prompt, befitting_model, fallover_model)
            .await
    }

    async fn prompt_inner(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<String> {
        let agent = self
            .client
            .create_agent(&befitting_model, system_prompt, &self.config)?;

        let result = self
            .retry_with_backoff(|| async { agent.prompt(user_prompt).await })
            .await;

        match (result, fallover_model) {
            (Ok(reply), _) => Ok(reply),
            (Err(e), Some(model)) => {
                warn!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                    self.config.retry_attempts, model, e
                );
                Box::pin(self.prompt_inner(system_prompt, user_prompt, model, None)).await
            }
            (Err(e), None) => {
                error!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败...{}",
                    self.config.retry_attempts, e
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ReasoningService for LLMClient {
    async fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        let system_prompt = match request.format {
            ResponseFormat::Text => request.prompt_sys.clone(),
            ResponseFormat::JsonObject => {
                format!("{}\n\n{}", request.prompt_sys, JSON_ONLY_INSTRUCTION)
            }
        };

        let reply = self.prompt(&system_prompt, &request.prompt_user).await?;
        tracing::debug!(
            kind = request.kind.as_str(),
            reply_len = reply.len(),
            "推理调用完成"
        );
        Ok(reply)
    }
}
