use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::llm::{
    PromptKind, ReasoningRequest, ReasoningService, extract_json_block, schema_instruction,
};
use crate::search::{QuestionAnswer, Query};

/// 把子问题转换成结构化搜索查询
#[derive(Clone)]
pub struct QueryBuilder {
    reasoner: Arc<dyn ReasoningService>,
}

impl QueryBuilder {
    pub fn new(reasoner: Arc<dyn ReasoningService>) -> Self {
        Self { reasoner }
    }

    /// 构建查询；模型回复无法解析时退化为以问题原文作为查询文本
    pub async fn build(
        &self,
        question: &str,
        hint: Option<&str>,
        context: &[QuestionAnswer],
    ) -> Result<Query> {
        let prompt_sys = format!(
            "{}\n\n{}",
            include_str!("prompts/query_builder_sys.tpl"),
            schema_instruction::<Query>()
        );
        let prompt_user = Self::build_user_prompt(question, hint, context);

        let request = ReasoningRequest::json(PromptKind::BuildQuery, prompt_sys, prompt_user);
        let reply = self.reasoner.generate(&request).await?;

        let query = Self::parse_query(&reply).unwrap_or_else(|| {
            warn!("⚠️ 查询构建结果无法解析，使用问题原文作为查询: {}", question);
            Query::plain(question)
        });
        debug!(query = %query.search_text(), platform = ?query.platform, "查询构建完成");
        Ok(query)
    }

    fn build_user_prompt(question: &str, hint: Option<&str>, context: &[QuestionAnswer]) -> String {
        let hint_section = match hint {
            Some(hint) if !hint.trim().is_empty() => format!("## Hint\n{}\n", hint.trim()),
            _ => String::new(),
        };

        let known_section = if context.is_empty() {
            String::new()
        } else {
            let known = context
                .iter()
                .map(|qa| format!("- Question: {}\n  Answer: {}", qa.content, qa.answer))
                .collect::<Vec<_>>()
                .join("\n");
            format!("## Known information\n{}\n", known)
        };

        format!(
            include_str!("prompts/query_builder_user.tpl"),
            question, hint_section, known_section
        )
    }

    fn parse_query(reply: &str) -> Option<Query> {
        let mut query: Query = serde_json::from_str(extract_json_block(reply)).ok()?;
        query.text = query.text.trim().to_string();
        if query.text.is_empty() {
            return None;
        }

        query.commands = query
            .commands
            .map(|commands| {
                commands
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|commands| !commands.is_empty());
        Some(query)
    }
}
