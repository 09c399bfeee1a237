use crate::config::{Config, LLMProvider, SiblingExecution};
use crate::i18n::TargetLanguage;
use crate::search::SearchEngine;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::warn;

/// DeepSearch-RS - 由Rust与AI驱动的问题拆解式深度搜索引擎
#[derive(Parser, Debug)]
#[command(name = "deepsearch-rs")]
#[command(
    about = "AI-based deep search engine. It decomposes a complex question into a tree of searchable sub-questions, answers each one from the web, and aggregates them into a final answer with citations."
)]
#[command(author = "Sopaco")]
#[command(version)]
pub struct Args {
    /// 需要回答的问题
    pub question: String,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 默认搜索引擎 (bing, baidu)
    #[arg(short, long)]
    pub engine: Option<String>,

    /// HTTP代理地址
    #[arg(long)]
    pub proxy: Option<String>,

    /// 每个子问题最多抓取的网页数
    #[arg(long)]
    pub max_results: Option<usize>,

    /// 网页抓取并发数
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// 单个网页抓取超时（毫秒）
    #[arg(long)]
    pub fetch_timeout_ms: Option<u64>,

    /// 同级子问题并发执行
    #[arg(long)]
    pub parallel: bool,

    /// 并发执行时同时处理的子树数量
    #[arg(long)]
    pub max_parallels: Option<usize>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// 高能效模型，优先用于拆解、改写、构建查询等常规推理
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于长上下文回答合成，以及作为efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 目标语言 (zh, en, ja, ko, de, fr, ru)
    #[arg(long)]
    pub target_language: Option<String>,

    /// 诊断产物目录
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// 不落盘诊断产物
    #[arg(long)]
    pub no_diagnostics: bool,

    /// 以JSON格式写出完整结果的文件
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,
}

/// 详细模式输出DEBUG日志，否则输出INFO
pub fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

impl Args {
    /// 将CLI参数转换为配置，命令行参数覆盖配置文件中的设置
    pub fn into_config(self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        // 搜索配置
        if let Some(engine_str) = self.engine {
            match engine_str.parse::<SearchEngine>() {
                Ok(engine) => config.search.engine = engine,
                Err(_) => warn!(
                    "⚠️ 警告: 未知的搜索引擎: {}，使用 {}",
                    engine_str, config.search.engine
                ),
            }
        }
        if let Some(proxy) = self.proxy {
            config.search.proxy = Some(proxy);
        }
        if let Some(max_results) = self.max_results {
            config.search.max_results = max_results;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.search.max_concurrency = max_concurrency;
        }
        if let Some(fetch_timeout_ms) = self.fetch_timeout_ms {
            config.search.fetch_timeout_ms = fetch_timeout_ms;
        }

        // 问题树执行配置
        if self.parallel {
            config.graph.sibling_execution = SiblingExecution::Parallel;
        }
        if let Some(max_parallels) = self.max_parallels {
            config.graph.max_parallels = max_parallels;
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                warn!(
                    "⚠️ 警告: 未知的provider: {}，使用 {}",
                    provider_str, config.llm.provider
                );
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 目标语言配置
        if let Some(target_language_str) = self.target_language {
            if let Ok(target_language) = target_language_str.parse::<TargetLanguage>() {
                config.target_language = target_language;
            } else {
                warn!(
                    "⚠️ 警告: 未知的目标语言: {}，使用 {}",
                    target_language_str,
                    config.target_language.display_name()
                );
            }
        }

        // 诊断配置
        if let Some(log_dir) = self.log_dir {
            config.diagnostics.log_dir = log_dir;
        }
        if self.no_diagnostics {
            config.diagnostics.enabled = false;
        }

        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}
