#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::graph::{Node, NodeState, NodeType, PlanOutcome, ROOT_NODE_ID, SearchGraph};
    use crate::llm::PromptKind;
    use crate::search::Page;
    use crate::test_support::{FakeTransport, ScriptedReasoner};
    use crate::utils::timing::TimingReport;
    use crate::workflow::{render_report, run, write_outcome};
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn answered_outcome() -> PlanOutcome {
        let mut root = Node::new(ROOT_NODE_ID.to_string(), NodeType::Root, "question", None);
        root.state = NodeState::Finished;
        root.answer = Some("Paris [0]".to_string());
        root.children = vec!["leaf".to_string()];

        let mut leaf = Node::new(
            "leaf".to_string(),
            NodeType::Searcher,
            "What is the capital of France?",
            Some(ROOT_NODE_ID.to_string()),
        );
        leaf.state = NodeState::Finished;
        leaf.answer = Some("Paris [0]".to_string());
        leaf.pages = vec![Page {
            id: 0,
            title: "Paris".to_string(),
            url: "https://en.wikipedia.org/wiki/Paris".to_string(),
            content: Some("Paris is the capital of France.".to_string()),
        }];

        let mut timing = TimingReport::default();
        timing.total_ms = 1234.0;

        PlanOutcome {
            answer: "Paris [0]".to_string(),
            nodes: HashMap::from([(ROOT_NODE_ID.to_string(), root), ("leaf".to_string(), leaf)]),
            edges: HashMap::from([(ROOT_NODE_ID.to_string(), vec!["leaf".to_string()])]),
            timing,
        }
    }

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.diagnostics.enabled = false;
        config
    }

    #[test]
    fn test_render_report_lists_sources() {
        let report = render_report(&answered_outcome());

        assert!(report.starts_with("# 回答"));
        assert!(report.contains("[0] What is the capital of France?"));
        assert!(report.contains("    - https://en.wikipedia.org/wiki/Paris"));
        assert!(report.contains("总执行时间: 1.23秒"));
    }

    #[tokio::test]
    async fn test_write_outcome_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("result.json");

        write_outcome(&answered_outcome(), &path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: PlanOutcome = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.answer, "Paris [0]");
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.nodes["leaf"].state, NodeState::Finished);
    }

    #[tokio::test]
    async fn test_run_writes_output_and_returns_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("answer.json");
        let reasoner = Arc::new(ScriptedReasoner::new(|request| match request.kind {
            PromptKind::Decompose => Ok(r#"{"nodes": [{"content": "capital of France"}]}"#.to_string()),
            PromptKind::BuildQuery => Ok(r#"{"text": "capital of France"}"#.to_string()),
            PromptKind::Answer => Ok("Paris [0]".to_string()),
            PromptKind::Summarize => Ok("Paris is the capital [0].".to_string()),
            PromptKind::Rewrite => Ok("capital of France".to_string()),
        }));
        let transport = Arc::new(
            FakeTransport::new()
                .with_links("capital", &[("Paris", "https://paris.fr")])
                .with_page("https://paris.fr", "Paris is the capital of France."),
        );
        let graph = SearchGraph::new(&quiet_config(), reasoner, transport);

        let outcome = run(&graph, "What is the capital of France?", Some(&output))
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Paris is the capital [0].");
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_run_fails_without_answer() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("answer.json");
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Err(anyhow!("offline"))));
        let transport = Arc::new(FakeTransport::new());
        let graph = SearchGraph::new(&quiet_config(), reasoner, transport);

        let result = run(&graph, "anything", Some(&output)).await;

        assert!(result.is_err());
        // 失败时仍然写出结果，便于排查
        assert!(output.exists());
    }
}
