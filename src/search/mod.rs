//! 搜索层：查询构建、链接搜索、网页抓取与子问题回答合成

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod fetch_queue;
pub mod query_builder;
pub mod searcher;
pub mod transport;

pub use fetch_queue::FetchQueue;
pub use query_builder::QueryBuilder;
pub use searcher::{SearchResponse, Searcher, SearcherOptions};
pub use transport::WebTransport;

/// 搜索结果为空时的哨兵回答
pub const NO_RELATED_LINKS: &str = "no related links found";

/// 所有网页都没有抓到内容时的哨兵回答
pub const NO_RELATED_CONTENT: &str = "no sufficiently related page content found";

/// 判断回答是否为哨兵值
pub fn is_sentinel_answer(answer: &str) -> bool {
    let answer = answer.trim();
    answer == NO_RELATED_LINKS || answer == NO_RELATED_CONTENT
}

/// 搜索平台
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    #[default]
    Bing,
    Baidu,
}

impl std::fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchEngine::Bing => write!(f, "bing"),
            SearchEngine::Baidu => write!(f, "baidu"),
        }
    }
}

impl std::str::FromStr for SearchEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bing" => Ok(SearchEngine::Bing),
            "baidu" => Ok(SearchEngine::Baidu),
            _ => Err(format!("Unknown search engine: {}", s)),
        }
    }
}

/// 结构化搜索查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Query {
    /// 用于搜索的关键词文本
    pub text: String,

    /// 指定搜索平台（bing 或 baidu），不指定时使用默认搜索引擎
    #[serde(default, deserialize_with = "lenient_engine")]
    #[schemars(with = "Option<SearchEngine>")]
    pub platform: Option<SearchEngine>,

    /// 搜索引擎专用的限定符，例如 `site:gov.cn`
    #[serde(default)]
    pub commands: Option<Vec<String>>,
}

/// 大小写不敏感地解析平台；空值或不支持的平台视为未指定
fn lenient_engine<'de, D>(deserializer: D) -> Result<Option<SearchEngine>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| s.trim().parse::<SearchEngine>().ok()))
}

impl Query {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            platform: None,
            commands: None,
        }
    }

    /// 实际提交给搜索引擎的文本：查询文本与限定符以空格拼接
    pub fn search_text(&self) -> String {
        match &self.commands {
            Some(commands) if !commands.is_empty() => {
                format!("{} {}", self.text, commands.join(" "))
            }
            _ => self.text.clone(),
        }
    }
}

/// 搜索结果链接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
}

/// 子问题检索到的网页
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 在本次检索结果中的序号，从0开始
    pub id: usize,
    pub title: String,
    pub url: String,
    /// 抓取失败时为空
    pub content: Option<String>,
}

/// 祖先节点的问答对
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub content: String,
    pub answer: String,
}

/// 链接搜索与网页抓取
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// 返回按搜索引擎排序的结果链接
    async fn search(&self, text: &str, engine: SearchEngine) -> Result<Vec<SearchLink>>;

    /// 返回网页的纯文本内容，空字符串表示没有内容
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[cfg(test)]
mod tests;
