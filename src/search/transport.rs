use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::SearchConfig;
use crate::search::{SearchEngine, SearchLink, SearchTransport};

const BING_SEARCH_URL: &str = "https://www.bing.com/search";
const BAIDU_SEARCH_URL: &str = "https://www.baidu.com/s";

/// Bing 自然结果的标题链接
const BING_RESULT_SELECTOR: &str = "li.b_algo h2 a[href]";
/// 百度自然结果的标题链接
const BAIDU_RESULT_SELECTOR: &str = "h3.t a[href]";

/// 网页转纯文本时的行宽
const TEXT_WIDTH: usize = 120;

/// 基于 reqwest 的默认搜索与抓取实现，解析 Bing / 百度的结果页
pub struct WebTransport {
    client: reqwest::Client,
}

impl WebTransport {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.fetch_timeout_ms.max(1)))
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            builder = builder
                .proxy(reqwest::Proxy::all(proxy).context(format!("Invalid proxy: {}", proxy))?);
        }

        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// 从结果页中解析出链接，标题与链接中的 HTML 实体由解析器解码
    pub fn parse_results(&self, html: &str, engine: SearchEngine) -> Vec<SearchLink> {
        let selector = match engine {
            SearchEngine::Bing => BING_RESULT_SELECTOR,
            SearchEngine::Baidu => BAIDU_RESULT_SELECTOR,
        };
        let Ok(selector) = Selector::parse(selector) else {
            return vec![];
        };

        let document = Html::parse_document(html);
        document
            .select(&selector)
            .filter_map(|anchor| {
                let url = anchor.value().attr("href")?.trim();
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return None;
                }
                Some(SearchLink {
                    title: compact_text(anchor),
                    url: url.to_string(),
                })
            })
            .collect()
    }
}

fn compact_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SearchTransport for WebTransport {
    async fn search(&self, text: &str, engine: SearchEngine) -> Result<Vec<SearchLink>> {
        let request = match engine {
            SearchEngine::Bing => self.client.get(BING_SEARCH_URL).query(&[("q", text)]),
            SearchEngine::Baidu => self.client.get(BAIDU_SEARCH_URL).query(&[("wd", text)]),
        };

        let html = request
            .send()
            .await
            .context("Search request failed")?
            .error_for_status()?
            .text()
            .await
            .context("Failed to read search result page")?;

        let links = self.parse_results(&html, engine);
        debug!(engine = %engine, links = links.len(), "结果页解析完成");
        Ok(links)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch URL")?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        let text = if content_type.contains("html") {
            html2text::from_read(&body[..], TEXT_WIDTH)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string())
        } else if content_type.is_empty() || content_type.starts_with("text/") {
            String::from_utf8_lossy(&body).to_string()
        } else {
            // 二进制内容不参与回答合成
            String::new()
        };

        Ok(text.trim().to_string())
    }
}
