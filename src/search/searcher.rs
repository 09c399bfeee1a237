use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::with_deadline;
use crate::llm::{PromptKind, ReasoningRequest, ReasoningService};
use crate::search::{
    FetchQueue, NO_RELATED_CONTENT, NO_RELATED_LINKS, Page, QuestionAnswer, Query, SearchEngine,
    SearchTransport,
};
use crate::utils::timing::{TimingKeys, TimingReport, TimingScope};

/// Searcher 的运行参数
#[derive(Debug, Clone)]
pub struct SearcherOptions {
    pub default_engine: SearchEngine,
    pub max_results: usize,
    pub max_concurrency: usize,
    pub fetch_timeout: Duration,
    pub search_timeout: Duration,
    pub max_page_chars: usize,
    /// 追加到回答合成提示词末尾的语言指令
    pub language_instruction: Option<String>,
}

impl Default for SearcherOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SearcherOptions {
    pub fn from_config(config: &Config) -> Self {
        let search = &config.search;
        Self {
            default_engine: search.engine,
            max_results: search.max_results,
            max_concurrency: search.max_concurrency,
            fetch_timeout: Duration::from_millis(search.fetch_timeout_ms),
            search_timeout: Duration::from_secs(search.search_timeout_seconds.max(1)),
            max_page_chars: search.max_page_chars,
            language_instruction: Some(config.target_language.prompt_instruction().to_string()),
        }
    }
}

/// 一次搜索的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// 本次搜索对应的问题
    pub content: String,
    pub pages: Vec<Page>,
    pub answer: String,
    pub timing: TimingReport,
}

/// 搜索链接、抓取网页并合成子问题回答
#[derive(Clone)]
pub struct Searcher {
    transport: Arc<dyn SearchTransport>,
    reasoner: Arc<dyn ReasoningService>,
    options: SearcherOptions,
}

impl Searcher {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        reasoner: Arc<dyn ReasoningService>,
        options: SearcherOptions,
    ) -> Self {
        Self {
            transport,
            reasoner,
            options,
        }
    }

    /// 执行搜索：链接检索 -> 网页抓取 -> 回答合成
    pub async fn run(
        &self,
        query: &Query,
        question: &str,
        ancestors: &[QuestionAnswer],
    ) -> Result<SearchResponse> {
        let mut timer = TimingScope::new();
        let engine = query.platform.unwrap_or(self.options.default_engine);
        let search_text = query.search_text();

        timer.start_phase(TimingKeys::LINK_SEARCH);
        let links = with_deadline(
            "link search",
            self.options.search_timeout,
            self.transport.search(&search_text, engine),
        )
        .await?;
        timer.end_phase(TimingKeys::LINK_SEARCH);

        let links: Vec<Page> = links
            .into_iter()
            .filter(|link| !link.url.trim().is_empty())
            .take(self.options.max_results)
            .enumerate()
            .map(|(id, link)| Page {
                id,
                title: link.title,
                url: link.url,
                content: None,
            })
            .collect();

        info!(engine = %engine, links = links.len(), "🔎 搜索完成: {}", search_text);

        if links.is_empty() {
            return Ok(SearchResponse {
                content: question.to_string(),
                pages: vec![],
                answer: NO_RELATED_LINKS.to_string(),
                timing: timer.report(),
            });
        }

        timer.start_phase(TimingKeys::PAGE_FETCH);
        let pages = self.fetch_pages(links).await;
        timer.end_phase(TimingKeys::PAGE_FETCH);

        if pages.is_empty() {
            debug!("所有网页均未抓取到内容: {}", question);
            return Ok(SearchResponse {
                content: question.to_string(),
                pages: vec![],
                answer: NO_RELATED_CONTENT.to_string(),
                timing: timer.report(),
            });
        }

        timer.start_phase(TimingKeys::ANSWER_SYNTHESIS);
        let answer = self.answer(question, &pages, ancestors).await?;
        timer.end_phase(TimingKeys::ANSWER_SYNTHESIS);

        Ok(SearchResponse {
            content: question.to_string(),
            pages,
            answer,
            timing: timer.report(),
        })
    }

    /// 通过有界并发队列抓取网页，只保留抓到内容的网页
    async fn fetch_pages(&self, links: Vec<Page>) -> Vec<Page> {
        let queue = FetchQueue::new(
            "fetch:content",
            self.options.max_concurrency,
            self.options.fetch_timeout,
        );

        let tasks = links
            .iter()
            .map(|link| self.transport.fetch(&link.url))
            .collect::<Vec<_>>();
        let contents = queue.run(tasks).await;

        links
            .into_iter()
            .zip(contents)
            .filter_map(|(mut page, content)| {
                let content = content?.trim().to_string();
                if content.is_empty() {
                    return None;
                }
                page.content = Some(content);
                Some(page)
            })
            .collect()
    }

    /// 基于祖先问答和网页内容合成回答
    pub async fn answer(
        &self,
        question: &str,
        pages: &[Page],
        ancestors: &[QuestionAnswer],
    ) -> Result<String> {
        let known = ancestors
            .iter()
            .map(|qa| format!("- Question: {}\n- Answer: {}", qa.content, qa.answer))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let results = pages
            .iter()
            .map(|page| {
                format!(
                    "[{}]\n- Title: {}\n- Link: {}\n- Content: {}",
                    page.id,
                    page.title,
                    page.url,
                    truncate_chars(page.content.as_deref().unwrap_or_default(), self.options.max_page_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt_sys = match &self.options.language_instruction {
            Some(instruction) => format!("{}\n{}", include_str!("prompts/answer_sys.tpl"), instruction),
            None => include_str!("prompts/answer_sys.tpl").to_string(),
        };
        let prompt_user = format!(
            include_str!("prompts/answer_user.tpl"),
            known, question, results
        );

        let request = ReasoningRequest::text(PromptKind::Answer, prompt_sys, prompt_user);
        let answer = self.reasoner.generate(&request).await?;
        Ok(answer.trim().to_string())
    }
}

/// 按字符数截断，保证不会切断多字节字符
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
