//! 单元测试共用的内存替身：按脚本回复的推理服务与可控的搜索传输层

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::llm::{PromptKind, ReasoningRequest, ReasoningService};
use crate::search::{SearchEngine, SearchLink, SearchTransport};

type Handler = Box<dyn Fn(&ReasoningRequest) -> Result<String> + Send + Sync>;

/// 按闭包回复并记录全部请求的推理服务
pub struct ScriptedReasoner {
    handler: Handler,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ReasoningRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of(&self, kind: PromptKind) -> Vec<ReasoningRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }
}

#[derive(Clone)]
enum FakePage {
    Content(String),
    Failure,
    Stuck,
}

/// 以子串匹配搜索文本返回链接，按URL返回网页内容
#[derive(Default)]
pub struct FakeTransport {
    results: Vec<(String, Vec<SearchLink>)>,
    pages: HashMap<String, FakePage>,
    stuck_search: bool,
    searches: Mutex<Vec<(String, SearchEngine)>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 搜索文本包含 `pattern` 时返回这些链接，先注册的优先
    pub fn with_links(mut self, pattern: &str, links: &[(&str, &str)]) -> Self {
        let links = links
            .iter()
            .map(|(title, url)| SearchLink {
                title: title.to_string(),
                url: url.to_string(),
            })
            .collect();
        self.results.push((pattern.to_string(), links));
        self
    }

    pub fn with_page(mut self, url: &str, content: &str) -> Self {
        self.pages
            .insert(url.to_string(), FakePage::Content(content.to_string()));
        self
    }

    pub fn with_failing_page(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), FakePage::Failure);
        self
    }

    pub fn with_stuck_page(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), FakePage::Stuck);
        self
    }

    pub fn with_stuck_search(mut self) -> Self {
        self.stuck_search = true;
        self
    }

    pub fn searches(&self) -> Vec<(String, SearchEngine)> {
        self.searches.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchTransport for FakeTransport {
    async fn search(&self, text: &str, engine: SearchEngine) -> Result<Vec<SearchLink>> {
        self.searches
            .lock()
            .unwrap()
            .push((text.to_string(), engine));
        if self.stuck_search {
            std::future::pending::<()>().await;
        }
        Ok(self
            .results
            .iter()
            .find(|(pattern, _)| text.contains(pattern.as_str()))
            .map(|(_, links)| links.clone())
            .unwrap_or_default())
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.lock().unwrap().push(url.to_string());
        match self.pages.get(url).cloned() {
            Some(FakePage::Content(content)) => Ok(content),
            Some(FakePage::Failure) => Err(anyhow!("connection reset: {}", url)),
            Some(FakePage::Stuck) => {
                std::future::pending::<()>().await;
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }
}
