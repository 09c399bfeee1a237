#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::SearchGraphError;
    use crate::llm::{PromptKind, ReasoningService};
    use crate::search::searcher::truncate_chars;
    use crate::search::{
        FetchQueue, NO_RELATED_CONTENT, NO_RELATED_LINKS, Query, QueryBuilder, QuestionAnswer,
        SearchEngine, Searcher, SearcherOptions, SearchTransport, is_sentinel_answer,
    };
    use crate::test_support::{FakeTransport, ScriptedReasoner};
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn options() -> SearcherOptions {
        SearcherOptions {
            fetch_timeout: Duration::from_millis(200),
            search_timeout: Duration::from_millis(200),
            language_instruction: None,
            ..Default::default()
        }
    }

    fn searcher(
        transport: Arc<FakeTransport>,
        reasoner: Arc<ScriptedReasoner>,
        options: SearcherOptions,
    ) -> Searcher {
        Searcher::new(
            transport as Arc<dyn SearchTransport>,
            reasoner as Arc<dyn ReasoningService>,
            options,
        )
    }

    #[test]
    fn test_search_engine_parse_and_display() {
        assert_eq!("Baidu".parse::<SearchEngine>().unwrap(), SearchEngine::Baidu);
        assert_eq!(SearchEngine::Bing.to_string(), "bing");
        assert!("google".parse::<SearchEngine>().is_err());
    }

    #[test]
    fn test_query_search_text_joins_commands() {
        let query = Query {
            text: "beijing population 2023".to_string(),
            platform: None,
            commands: Some(vec!["site:gov.cn".to_string(), "filetype:pdf".to_string()]),
        };
        assert_eq!(
            query.search_text(),
            "beijing population 2023 site:gov.cn filetype:pdf"
        );
        assert_eq!(Query::plain("abc").search_text(), "abc");
    }

    #[test]
    fn test_query_deserializes_without_optional_fields() {
        let query: Query = serde_json::from_str(r#"{"text": "capital of France"}"#).unwrap();
        assert_eq!(query, Query::plain("capital of France"));

        let query: Query =
            serde_json::from_str(r#"{"text": "x", "platform": "baidu", "commands": []}"#).unwrap();
        assert_eq!(query.platform, Some(SearchEngine::Baidu));
    }

    #[test]
    fn test_sentinel_answers() {
        assert!(is_sentinel_answer(NO_RELATED_LINKS));
        assert!(is_sentinel_answer(&format!(" {}\n", NO_RELATED_CONTENT)));
        assert!(!is_sentinel_answer("Paris [0]"));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("巴黎是法国首都", 2), "巴黎");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    async fn numbered_task(value: i32) -> anyhow::Result<i32> {
        if value == 2 {
            return Err(anyhow!("boom"));
        }
        Ok(value)
    }

    #[tokio::test]
    async fn test_fetch_queue_tolerates_stuck_task() {
        let transport = FakeTransport::new()
            .with_page("u0", "c0")
            .with_page("u1", "c1")
            .with_stuck_page("u2")
            .with_page("u3", "c3")
            .with_page("u4", "c4");
        let urls = ["u0", "u1", "u2", "u3", "u4"];
        let queue = FetchQueue::new("fetch:test", 2, Duration::from_millis(300));

        let started = Instant::now();
        let tasks = urls.iter().map(|url| transport.fetch(url)).collect::<Vec<_>>();
        let results = queue.run(tasks).await;

        assert_eq!(
            results,
            vec![
                Some("c0".to_string()),
                Some("c1".to_string()),
                None,
                Some("c3".to_string()),
                Some("c4".to_string()),
            ]
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_queue_failure_leaves_empty_slot() {
        let queue = FetchQueue::new("fetch:test", 0, Duration::from_secs(1));
        assert_eq!(queue.concurrency(), 1);

        let tasks = vec![numbered_task(1), numbered_task(2), numbered_task(3)];
        assert_eq!(queue.run(tasks).await, vec![Some(1), None, Some(3)]);
    }

    #[tokio::test]
    async fn test_fetch_queue_empty_input() {
        let queue = FetchQueue::new("fetch:test", 2, Duration::from_secs(1));
        let tasks: Vec<std::future::Ready<anyhow::Result<()>>> = vec![];
        assert!(queue.run(tasks).await.is_empty());
    }

    #[tokio::test]
    async fn test_query_builder_parses_fenced_reply() {
        let reasoner = Arc::new(ScriptedReasoner::new(|_| {
            Ok("```json\n{\"text\": \"beijing population\", \"platform\": \"baidu\", \"commands\": [\"site:gov.cn\", \"  \"]}\n```".to_string())
        }));
        let builder = QueryBuilder::new(reasoner.clone());

        let query = builder.build("How many people live in Beijing?", None, &[]).await.unwrap();
        assert_eq!(query.text, "beijing population");
        assert_eq!(query.platform, Some(SearchEngine::Baidu));
        assert_eq!(query.commands, Some(vec!["site:gov.cn".to_string()]));

        let requests = reasoner.requests_of(PromptKind::BuildQuery);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt_user.contains("How many people live in Beijing?"));
        assert!(requests[0].prompt_sys.contains("commands"));
    }

    #[tokio::test]
    async fn test_query_builder_keeps_query_with_unusable_platform() {
        let cases = [
            (json!("Bing"), Some(SearchEngine::Bing)),
            (json!(" BAIDU "), Some(SearchEngine::Baidu)),
            (json!(""), None),
            (json!("google"), None),
            (json!(3), None),
            (serde_json::Value::Null, None),
        ];

        for (platform, expected) in cases {
            let reply = json!({
                "text": "paris population 2023",
                "platform": platform.clone(),
                "commands": ["site:insee.fr"],
            })
            .to_string();
            let reasoner = Arc::new(ScriptedReasoner::new(move |_| Ok(reply.clone())));
            let builder = QueryBuilder::new(reasoner);

            let query = builder
                .build("What was the population of Paris in 2023?", None, &[])
                .await
                .unwrap();

            assert_eq!(query.text, "paris population 2023", "platform {}", platform);
            assert_eq!(query.commands, Some(vec!["site:insee.fr".to_string()]));
            assert_eq!(query.platform, expected, "platform {}", platform);
        }
    }

    #[test]
    fn test_searcher_options_clamp_zero_search_timeout() {
        let mut config = Config::default();
        config.search.search_timeout_seconds = 0;

        let options = SearcherOptions::from_config(&config);
        assert_eq!(options.search_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_query_builder_falls_back_to_question() {
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok("I cannot help".to_string())));
        let builder = QueryBuilder::new(reasoner);

        let query = builder.build("capital of France", None, &[]).await.unwrap();
        assert_eq!(query, Query::plain("capital of France"));
    }

    #[tokio::test]
    async fn test_query_builder_includes_hint_and_context() {
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok(r#"{"text": "q"}"#.to_string())));
        let builder = QueryBuilder::new(reasoner.clone());
        let context = vec![QuestionAnswer {
            content: "What is the capital of France?".to_string(),
            answer: "Paris".to_string(),
        }];

        builder
            .build("its population", Some("use different keywords"), &context)
            .await
            .unwrap();

        let prompt = &reasoner.requests()[0].prompt_user;
        assert!(prompt.contains("use different keywords"));
        assert!(prompt.contains("Answer: Paris"));
    }

    #[tokio::test]
    async fn test_query_builder_propagates_reasoning_error() {
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Err(anyhow!("model down"))));
        let builder = QueryBuilder::new(reasoner);
        assert!(builder.build("q", None, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_searcher_no_links_returns_sentinel_without_reasoning() {
        let transport = Arc::new(FakeTransport::new());
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok("unused".to_string())));
        let searcher = searcher(transport, reasoner.clone(), options());

        let response = searcher
            .run(&Query::plain("nothing here"), "nothing here", &[])
            .await
            .unwrap();

        assert!(response.pages.is_empty());
        assert_eq!(response.answer, NO_RELATED_LINKS);
        assert!(reasoner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_searcher_without_page_content_returns_sentinel() {
        let transport = Arc::new(
            FakeTransport::new()
                .with_links("topic", &[("a", "https://a"), ("b", "https://b")])
                .with_failing_page("https://a")
                .with_page("https://b", "   "),
        );
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok("unused".to_string())));
        let searcher = searcher(transport, reasoner.clone(), options());

        let response = searcher.run(&Query::plain("topic"), "topic", &[]).await.unwrap();

        assert!(response.pages.is_empty());
        assert_eq!(response.answer, NO_RELATED_CONTENT);
        assert!(reasoner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_searcher_keeps_fetched_pages_and_synthesizes() {
        let transport = Arc::new(
            FakeTransport::new()
                .with_links(
                    "paris",
                    &[
                        ("no url", ""),
                        ("A", "https://a"),
                        ("B", "https://b"),
                        ("C", "https://c"),
                    ],
                )
                .with_page("https://a", "Paris is the capital of France.")
                .with_stuck_page("https://b")
                .with_page("https://c", "France's capital city is Paris."),
        );
        let reasoner = Arc::new(ScriptedReasoner::new(|_| {
            Ok("  The capital is Paris [0][2].  ".to_string())
        }));
        let searcher = searcher(transport.clone(), reasoner.clone(), options());
        let ancestors = vec![QuestionAnswer {
            content: "About France".to_string(),
            answer: "France is a country in Europe.".to_string(),
        }];

        let response = searcher
            .run(&Query::plain("paris capital"), "What is the capital?", &ancestors)
            .await
            .unwrap();

        assert_eq!(response.answer, "The capital is Paris [0][2].");
        assert_eq!(response.content, "What is the capital?");
        let ids: Vec<usize> = response.pages.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(response.pages.iter().all(|p| p.content.is_some()));
        assert!(response.timing.phase_ms("answer_synthesis").is_some());

        let requests = reasoner.requests_of(PromptKind::Answer);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt_user.contains("France is a country in Europe."));
        assert!(requests[0].prompt_user.contains("[2]"));
        assert!(!requests[0].prompt_user.contains("https://b"));
    }

    #[tokio::test]
    async fn test_searcher_respects_max_results_and_truncation() {
        let long_page = "x".repeat(50);
        let transport = Arc::new(
            FakeTransport::new()
                .with_links("q", &[("1", "https://1"), ("2", "https://2"), ("3", "https://3")])
                .with_page("https://1", &long_page)
                .with_page("https://2", &long_page)
                .with_page("https://3", &long_page),
        );
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok("answer".to_string())));
        let searcher = searcher(
            transport.clone(),
            reasoner.clone(),
            SearcherOptions {
                max_results: 2,
                max_page_chars: 10,
                ..options()
            },
        );

        let response = searcher.run(&Query::plain("q"), "q", &[]).await.unwrap();

        assert_eq!(response.pages.len(), 2);
        assert_eq!(transport.fetches().len(), 2);
        let prompt = &reasoner.requests()[0].prompt_user;
        assert!(prompt.contains(&"x".repeat(10)));
        assert!(!prompt.contains(&"x".repeat(11)));
    }

    #[tokio::test]
    async fn test_searcher_uses_query_platform_and_commands() {
        let transport = Arc::new(FakeTransport::new());
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok(String::new())));
        let searcher = searcher(transport.clone(), reasoner, options());
        let query = Query {
            text: "population".to_string(),
            platform: Some(SearchEngine::Baidu),
            commands: Some(vec!["site:gov.cn".to_string()]),
        };

        searcher.run(&query, "population", &[]).await.unwrap();
        searcher.run(&Query::plain("other"), "other", &[]).await.unwrap();

        assert_eq!(
            transport.searches(),
            vec![
                ("population site:gov.cn".to_string(), SearchEngine::Baidu),
                ("other".to_string(), SearchEngine::Bing),
            ]
        );
    }

    #[tokio::test]
    async fn test_searcher_link_search_deadline() {
        let transport = Arc::new(FakeTransport::new().with_stuck_search());
        let reasoner = Arc::new(ScriptedReasoner::new(|_| Ok(String::new())));
        let searcher = searcher(transport, reasoner, options());

        let err = searcher.run(&Query::plain("q"), "q", &[]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchGraphError>(),
            Some(SearchGraphError::DeadlineExceeded { .. })
        ));
    }
}
