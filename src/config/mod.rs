use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::i18n::TargetLanguage;
use crate::search::SearchEngine;

/// 默认配置文件名，未显式指定 `--config` 时在当前目录查找
pub const DEFAULT_CONFIG_FILE: &str = "deepsearch.toml";

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 同级子问题的执行策略
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SiblingExecution {
    /// 深度优先、逐个执行（默认）
    #[default]
    Sequential,
    /// 同级子树并发执行，并发数受 `graph.max_parallels` 限制
    Parallel,
}

impl std::fmt::Display for SiblingExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiblingExecution::Sequential => write!(f, "sequential"),
            SiblingExecution::Parallel => write!(f, "parallel"),
        }
    }
}

impl std::str::FromStr for SiblingExecution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" => Ok(SiblingExecution::Sequential),
            "parallel" => Ok(SiblingExecution::Parallel),
            _ => Err(format!("Unknown sibling execution strategy: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// 搜索与网页抓取配置
    pub search: SearchConfig,

    /// 问题树执行配置
    pub graph: GraphConfig,

    /// 诊断产物配置
    pub diagnostics: DiagnosticsConfig,

    /// 回答使用的目标语言
    pub target_language: TargetLanguage,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，用于拆解、改写、构建查询等常规推理
    pub model_efficient: String,

    /// 高质量模型，用于长上下文的回答合成，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 单次推理调用（含重试）的截止时间（秒）
    pub timeout_seconds: u64,
}

/// 搜索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// 默认搜索引擎，查询可以单独指定平台
    pub engine: SearchEngine,

    /// HTTP代理地址
    pub proxy: Option<String>,

    /// 每个子问题最多抓取的网页数
    pub max_results: usize,

    /// 网页抓取并发数
    pub max_concurrency: usize,

    /// 单个网页抓取超时（毫秒）
    pub fetch_timeout_ms: u64,

    /// 搜索结果页请求的截止时间（秒）
    pub search_timeout_seconds: u64,

    /// 提供给回答合成的单页最大字符数
    pub max_page_chars: usize,

    /// 请求使用的User-Agent
    pub user_agent: String,
}

/// 问题树执行配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    /// 同级子问题执行策略
    pub sibling_execution: SiblingExecution,

    /// 并发策略下同时执行的子树数量
    pub max_parallels: usize,
}

/// 诊断产物配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// 是否落盘中间产物
    pub enabled: bool,

    /// 产物目录
    pub log_dir: PathBuf,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 按优先级加载配置：显式路径 > 当前目录下的默认配置文件 > 默认值
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let default_path = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::from_file(&default_path);
        }

        Ok(Config::default())
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("DEEPSEARCH_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model_efficient: String::from("gpt-4o-mini"),
            model_powerful: String::from("gpt-4o"),
            max_tokens: 8192,
            temperature: 0.2,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 180,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine: SearchEngine::default(),
            proxy: None,
            max_results: 5,
            max_concurrency: 2,
            fetch_timeout_ms: 10_000,
            search_timeout_seconds: 30,
            max_page_chars: 8000,
            user_agent: String::from(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
            ),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sibling_execution: SiblingExecution::default(),
            max_parallels: 3,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: PathBuf::from("./logs"),
        }
    }
}
