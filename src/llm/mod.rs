//! 推理服务接口，以及基于 rig 的默认实现

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;

use crate::error::with_deadline;

pub mod client;

/// 推理调用的用途，用于日志标记和测试中的路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// 问题拆解
    Decompose,
    /// 结合祖先上下文改写问题
    Rewrite,
    /// 构建结构化搜索查询
    BuildQuery,
    /// 子问题回答合成
    Answer,
    /// 根节点最终汇总
    Summarize,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Decompose => "decompose",
            PromptKind::Rewrite => "rewrite",
            PromptKind::BuildQuery => "build_query",
            PromptKind::Answer => "answer",
            PromptKind::Summarize => "summarize",
        }
    }
}

/// 期望的返回格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// 一次推理调用的全部参数
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub kind: PromptKind,
    pub prompt_sys: String,
    pub prompt_user: String,
    pub format: ResponseFormat,
}

impl ReasoningRequest {
    pub fn text(kind: PromptKind, prompt_sys: impl Into<String>, prompt_user: impl Into<String>) -> Self {
        Self {
            kind,
            prompt_sys: prompt_sys.into(),
            prompt_user: prompt_user.into(),
            format: ResponseFormat::Text,
        }
    }

    pub fn json(kind: PromptKind, prompt_sys: impl Into<String>, prompt_user: impl Into<String>) -> Self {
        Self {
            kind,
            prompt_sys: prompt_sys.into(),
            prompt_user: prompt_user.into(),
            format: ResponseFormat::JsonObject,
        }
    }
}

/// 推理服务：拆解、改写、构建查询、回答合成都通过它完成
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn generate(&self, request: &ReasoningRequest) -> Result<String>;
}

/// 给任意推理服务加上统一的截止时间
pub struct DeadlineReasoner {
    inner: Arc<dyn ReasoningService>,
    deadline: Duration,
}

impl DeadlineReasoner {
    pub fn new(inner: Arc<dyn ReasoningService>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl ReasoningService for DeadlineReasoner {
    async fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        with_deadline("reasoning", self.deadline, self.inner.generate(request)).await
    }
}

/// 从模型回复中截取 JSON 对象部分，兼容 ```json 代码块包裹和前后的说明文字
pub fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// 生成附加在提示词中的 JSON Schema 说明
pub fn schema_instruction<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    let rendered = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "Reply with a single JSON object that conforms to the following JSON Schema, without any extra text:\n```json\n{}\n```",
        rendered
    )
}
