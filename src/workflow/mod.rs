//! 命令行工作流：构建默认适配器、回答问题并输出报告

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::config::Config;
use crate::graph::{PlanOutcome, SearchGraph};
use crate::llm::client::LLMClient;
use crate::search::WebTransport;

/// 启动问答工作流
pub async fn launch(config: &Config, question: &str, output: Option<&Path>) -> Result<PlanOutcome> {
    let llm_client = LLMClient::new(config.llm.clone())?;

    // 启动时检查模型连接
    llm_client.check_connection().await?;

    let transport = WebTransport::new(&config.search)?;
    let graph = SearchGraph::new(config, Arc::new(llm_client), Arc::new(transport));

    run(&graph, question, output).await
}

/// 在给定的 SearchGraph 上回答问题，打印报告并按需写出完整结果
pub async fn run(graph: &SearchGraph, question: &str, output: Option<&Path>) -> Result<PlanOutcome> {
    let outcome = graph.plan(question).await;

    if let Some(path) = output {
        write_outcome(&outcome, path).await?;
        info!("💾 完整结果已写入 {}", path.display());
    }

    if outcome.answer.trim().is_empty() {
        bail!("未能生成最终回答，请查看诊断产物了解详情");
    }

    println!("{}", render_report(&outcome));
    Ok(outcome)
}

/// 最终回答、引用来源和耗时报告
pub fn render_report(outcome: &PlanOutcome) -> String {
    let mut report = format!("# 回答\n\n{}\n", outcome.answer.trim());

    let citations = outcome.citations();
    if !citations.is_empty() {
        report.push_str("\n## 来源\n");
        for citation in citations {
            report.push_str(&format!("[{}] {}\n", citation.index, citation.question));
            for url in &citation.urls {
                report.push_str(&format!("    - {}\n", url));
            }
        }
    }

    report.push('\n');
    report.push_str(&outcome.timing.generate_timing_report());
    report
}

/// 以JSON格式写出完整的 PlanOutcome
pub async fn write_outcome(outcome: &PlanOutcome, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context(format!("Failed to create output dir: {:?}", parent))?;
    }

    let content = serde_json::to_string_pretty(outcome)?;
    tokio::fs::write(path, content)
        .await
        .context(format!("Failed to write output file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests;
