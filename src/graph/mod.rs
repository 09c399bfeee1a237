//! 问题树编排：拆解、逐节点检索、失败传播与根节点汇总

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SiblingExecution};
use crate::diagnostics::Diagnostics;
use crate::error::SearchGraphError;
use crate::llm::{
    DeadlineReasoner, PromptKind, ReasoningRequest, ReasoningService, schema_instruction,
};
use crate::search::{
    Query, QueryBuilder, QuestionAnswer, SearchResponse, SearchTransport, Searcher,
    SearcherOptions, is_sentinel_answer,
};
use crate::utils::threads::do_parallel_with_limit;
use crate::utils::timing::{TimingKeys, TimingScope};

pub mod tree;
pub mod types;

pub use tree::QuestionTree;
pub use types::{
    Citation, Decomposition, Node, NodeId, NodeState, NodeType, PlanOutcome, ROOT_NODE_ID, RawNode,
};

/// 每个节点最多尝试的检索次数
const MAX_ATTEMPTS: usize = 2;

/// 第二次尝试时追加在问题后的改写后缀
const RETRY_SUFFIX: &str = "another phrasing";

/// 第二次尝试时给查询构建的提示
const RETRY_HINT: &str = "use different keywords to reorganize the query";

/// 单次 plan 独占的问题树
struct PlanSession {
    tree: RwLock<QuestionTree>,
}

impl PlanSession {
    fn new() -> Self {
        Self {
            tree: RwLock::new(QuestionTree::new()),
        }
    }

    fn into_tree(self) -> QuestionTree {
        self.tree.into_inner()
    }
}

/// 一次检索尝试的产出
struct AttemptOutput {
    query: Query,
    response: SearchResponse,
}

impl AttemptOutput {
    fn is_usable(&self) -> bool {
        let answer = self.response.answer.trim();
        !self.response.pages.is_empty() && !answer.is_empty() && !is_sentinel_answer(answer)
    }
}

/// 问题树搜索引擎
pub struct SearchGraph {
    reasoner: Arc<dyn ReasoningService>,
    query_builder: QueryBuilder,
    searcher: Searcher,
    diagnostics: Diagnostics,
    strategy: SiblingExecution,
    max_parallels: usize,
    language_instruction: String,
    last_tree: RwLock<Option<QuestionTree>>,
}

impl SearchGraph {
    /// 推理服务会统一加上 `llm.timeout_seconds` 的截止时间
    pub fn new(
        config: &Config,
        reasoner: Arc<dyn ReasoningService>,
        transport: Arc<dyn SearchTransport>,
    ) -> Self {
        let reasoner: Arc<dyn ReasoningService> = Arc::new(DeadlineReasoner::new(
            reasoner,
            Duration::from_secs(config.llm.timeout_seconds.max(1)),
        ));

        Self {
            query_builder: QueryBuilder::new(reasoner.clone()),
            searcher: Searcher::new(
                transport,
                reasoner.clone(),
                SearcherOptions::from_config(config),
            ),
            reasoner,
            diagnostics: Diagnostics::new(&config.diagnostics),
            strategy: config.graph.sibling_execution,
            max_parallels: config.graph.max_parallels.max(1),
            language_instruction: config.target_language.prompt_instruction().to_string(),
            last_tree: RwLock::new(None),
        }
    }

    /// 回答问题。任何规划层面的失败都会得到空结果，不会返回错误
    pub async fn plan(&self, question: &str) -> PlanOutcome {
        let mut timer = TimingScope::new();
        timer.start_phase(TimingKeys::TOTAL);
        info!("🚀 开始处理问题: {}", question);

        let session = PlanSession::new();
        let result = self.plan_inner(question, &session, &mut timer).await;
        timer.end_phase(TimingKeys::TOTAL);
        let timing = timer.report();
        let tree = session.into_tree();

        let outcome = match result {
            Ok(()) => {
                self.diagnostics
                    .record(
                        "timing_metrics",
                        &json!({ "question": question, "metrics": timing }),
                    )
                    .await;
                self.diagnostics
                    .record(
                        "final_search_graph",
                        &json!({ "nodes": tree.nodes(), "edges": tree.edges() }),
                    )
                    .await;

                let answer = tree
                    .get(ROOT_NODE_ID)
                    .and_then(|root| root.answer.clone())
                    .unwrap_or_default();
                let (nodes, edges) = tree.clone().into_parts();
                info!(
                    nodes = nodes.len(),
                    "🎉 问题处理完成，耗时 {:.2}秒",
                    timing.total_ms / 1000.0
                );
                PlanOutcome {
                    answer,
                    nodes,
                    edges,
                    timing,
                }
            }
            Err(e) => {
                error!("❌ 问题处理失败: {:#}", e);
                self.diagnostics
                    .record(
                        "plan_error",
                        &json!({ "error": format!("{:#}", e), "question": question }),
                    )
                    .await;
                PlanOutcome::empty(timing)
            }
        };

        *self.last_tree.write().await = Some(tree);
        outcome
    }

    /// 清除上一次运行保留的问题树
    pub async fn reset(&self) {
        *self.last_tree.write().await = None;
    }

    /// 上一次运行的问题树快照
    pub async fn last_tree(&self) -> Option<QuestionTree> {
        self.last_tree.read().await.clone()
    }

    async fn plan_inner(
        &self,
        question: &str,
        session: &PlanSession,
        timer: &mut TimingScope,
    ) -> Result<()> {
        timer.start_phase(TimingKeys::LLM_PLANNING);
        let decomposition = self.decompose(question).await?;
        timer.end_phase(TimingKeys::LLM_PLANNING);

        let raw_nodes = if decomposition.is_empty() {
            warn!("⚠️ 问题拆解结果为空，将原问题作为唯一的子问题");
            vec![RawNode {
                content: question.to_string(),
                children: vec![],
            }]
        } else {
            decomposition.nodes
        };

        {
            let mut tree = session.tree.write().await;
            tree.add_root(question);
            tree.materialize(&raw_nodes, ROOT_NODE_ID)?;
            info!(nodes = tree.len() - 1, "🌳 问题树构建完成");
        }

        timer.start_phase(TimingKeys::PROCESS_NODES);
        self.process_nodes(session, ROOT_NODE_ID.to_string()).await;
        timer.end_phase(TimingKeys::PROCESS_NODES);

        timer.start_phase(TimingKeys::PROCESS_ROOT);
        self.process_root_node(session).await?;
        timer.end_phase(TimingKeys::PROCESS_ROOT);

        Ok(())
    }

    async fn decompose(&self, question: &str) -> Result<Decomposition> {
        let prompt_sys = format!(
            "{}\n\n{}",
            include_str!("prompts/plan_sys.tpl"),
            schema_instruction::<Decomposition>()
        );
        let prompt_user = format!(include_str!("prompts/plan_user.tpl"), question);

        let reply = self
            .reasoner
            .generate(&ReasoningRequest::json(
                PromptKind::Decompose,
                prompt_sys,
                prompt_user,
            ))
            .await?;
        debug!("拆解模型回复: {}", reply);
        self.diagnostics
            .record(
                "plan_llm_response",
                &json!({ "question": question, "response": reply }),
            )
            .await;

        Ok(Decomposition::parse_lenient(&reply))
    }

    /// 处理一组兄弟节点：每个节点先执行自身，再处理其子树
    fn process_nodes<'a>(&'a self, session: &'a PlanSession, parent_id: NodeId) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let children = session.tree.read().await.children_of(&parent_id);
            if children.is_empty() {
                return;
            }
            debug!(parent_id = %parent_id, children = children.len(), strategy = %self.strategy, "处理子节点");

            match self.strategy {
                SiblingExecution::Sequential => {
                    for child in children {
                        self.process_subtree(session, child).await;
                    }
                }
                SiblingExecution::Parallel => {
                    let futures = children
                        .into_iter()
                        .map(|child| self.process_subtree(session, child))
                        .collect::<Vec<_>>();
                    do_parallel_with_limit(futures, self.max_parallels).await;
                }
            }
        })
    }

    async fn process_subtree(&self, session: &PlanSession, node_id: NodeId) {
        let state = session.tree.read().await.get(&node_id).map(|node| node.state);
        match state {
            Some(NodeState::NotStarted) => self.execute_node(session, &node_id).await,
            Some(state) => {
                debug!(node_id = %node_id, state = ?state, "跳过已结束的节点");
            }
            None => {
                warn!("⚠️ 节点 {} 不存在", node_id);
                return;
            }
        }

        self.process_nodes(session, node_id).await;
    }

    async fn execute_node(&self, session: &PlanSession, node_id: &str) {
        let mut timer = TimingScope::new();
        timer.start_phase(TimingKeys::NODE_EXECUTION);

        let (original_content, ancestors) = {
            let mut tree = session.tree.write().await;
            let Some(node) = tree.get_mut(node_id) else {
                warn!("⚠️ 节点 {} 不存在", node_id);
                return;
            };
            node.state = NodeState::Running;
            let content = node.content.clone();
            (content, tree.ancestor_answers(node_id))
        };
        info!(node_id, ancestors = ancestors.len(), "🔍 执行子问题: {}", original_content);

        match self
            .run_attempts(session, node_id, &original_content, &ancestors, &mut timer)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(node_id, "❌ 子问题两次检索均未得到可用结果");
                let adjusted_content = self.current_content(session, node_id).await;
                self.diagnostics
                    .record(
                        &format!("node_{}_all_attempts_failed", node_id),
                        &json!({
                            "node_id": node_id,
                            "original_content": original_content,
                            "adjusted_content": adjusted_content,
                        }),
                    )
                    .await;
                self.fail_subtree(session, node_id, "failed").await;
            }
            Err(e) => {
                error!(node_id, "❌ 子问题执行出错: {:#}", e);
                let content = self.current_content(session, node_id).await;
                self.diagnostics
                    .record(
                        &format!("node_{}_error", node_id),
                        &json!({
                            "node_id": node_id,
                            "error": format!("{:#}", e),
                            "content": content,
                        }),
                    )
                    .await;
                self.fail_subtree(session, node_id, "failed with error").await;
            }
        }
    }

    /// 改写问题并最多检索两次；返回成功的尝试序号，两次都不可用时返回 None
    async fn run_attempts(
        &self,
        session: &PlanSession,
        node_id: &str,
        original_content: &str,
        ancestors: &[QuestionAnswer],
        timer: &mut TimingScope,
    ) -> Result<Option<usize>> {
        timer.start_phase(TimingKeys::QUESTION_ADJUSTMENT);
        let question = if ancestors.is_empty() {
            original_content.to_string()
        } else {
            let adjusted = self.rewrite(original_content, ancestors).await?;
            if adjusted != original_content {
                info!(node_id, "✏️ 问题已改写: \"{}\" -> \"{}\"", original_content, adjusted);
            }
            if let Some(node) = session.tree.write().await.get_mut(node_id) {
                node.content = adjusted.clone();
            }
            adjusted
        };
        timer.end_phase(TimingKeys::QUESTION_ADJUSTMENT);

        for attempt in 1..=MAX_ATTEMPTS {
            match self
                .attempt(session, node_id, &question, ancestors, attempt, timer)
                .await
            {
                Ok(output) if output.is_usable() => {
                    {
                        let mut tree = session.tree.write().await;
                        if let Some(node) = tree.get_mut(node_id) {
                            node.answer = Some(output.response.answer.trim().to_string());
                            node.pages = output.response.pages.clone();
                            node.state = NodeState::Finished;
                        }
                    }
                    timer.end_phase(TimingKeys::NODE_EXECUTION);
                    info!(node_id, attempt, pages = output.response.pages.len(), "✅ 子问题完成");

                    self.diagnostics
                        .record(
                            &format!("node_{}_result", node_id),
                            &json!({
                                "node_id": node_id,
                                "attempt": attempt,
                                "original_content": original_content,
                                "adjusted_content": question,
                                "query": output.query,
                                "answer": output.response.answer,
                                "pages": output.response.pages,
                                "ancestor_responses": ancestors,
                            }),
                        )
                        .await;
                    self.diagnostics
                        .record(
                            &format!("node_{}_timing", node_id),
                            &json!({
                                "node_id": node_id,
                                "attempt": attempt,
                                "metrics": timer.report(),
                                "search_metrics": output.response.timing,
                            }),
                        )
                        .await;
                    return Ok(Some(attempt));
                }
                Ok(output) => {
                    if attempt < MAX_ATTEMPTS {
                        info!(node_id, attempt, answer = %output.response.answer, "🔁 首次检索结果不可用，换一种查询重试");
                        self.diagnostics
                            .record(
                                &format!("node_{}_first_attempt_failed", node_id),
                                &json!({
                                    "node_id": node_id,
                                    "query": output.query,
                                    "response": output.response,
                                }),
                            )
                            .await;
                    }
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(node_id, attempt, "⚠️ 首次检索出错，换一种查询重试: {:#}", e);
                    self.diagnostics
                        .record(
                            &format!("node_{}_first_attempt_failed", node_id),
                            &json!({ "node_id": node_id, "error": format!("{:#}", e) }),
                        )
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// 构建查询并执行一次检索，查询无论结果如何都会记录到节点上
    async fn attempt(
        &self,
        session: &PlanSession,
        node_id: &str,
        question: &str,
        ancestors: &[QuestionAnswer],
        attempt: usize,
        timer: &mut TimingScope,
    ) -> Result<AttemptOutput> {
        let (query_question, hint) = if attempt == 1 {
            (question.to_string(), None)
        } else {
            (format!("{} {}", question, RETRY_SUFFIX), Some(RETRY_HINT))
        };

        let building_key = TimingKeys::query_building(attempt);
        timer.start_phase(&building_key);
        let query = self
            .query_builder
            .build(&query_question, hint, ancestors)
            .await?;
        timer.end_phase(&building_key);

        if let Some(node) = session.tree.write().await.get_mut(node_id) {
            node.queries.push(query.clone());
        }

        let search_key = TimingKeys::search_execution(attempt);
        timer.start_phase(&search_key);
        let response = self.searcher.run(&query, question, ancestors).await?;
        timer.end_phase(&search_key);

        Ok(AttemptOutput { query, response })
    }

    async fn rewrite(&self, content: &str, ancestors: &[QuestionAnswer]) -> Result<String> {
        let context = ancestors
            .iter()
            .map(|qa| format!("Question: {}\nAnswer: {}", qa.content, qa.answer))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt_user = format!(include_str!("prompts/rewrite_user.tpl"), context, content);

        let reply = self
            .reasoner
            .generate(&ReasoningRequest::text(
                PromptKind::Rewrite,
                include_str!("prompts/rewrite_sys.tpl"),
                prompt_user,
            ))
            .await?;

        let rewritten = reply.trim();
        if rewritten.is_empty() {
            return Ok(content.to_string());
        }
        Ok(rewritten.to_string())
    }

    async fn current_content(&self, session: &PlanSession, node_id: &str) -> String {
        session
            .tree
            .read()
            .await
            .get(node_id)
            .map(|node| node.content.clone())
            .unwrap_or_default()
    }

    /// 节点置为 ERROR，子孙节点全部跳过
    async fn fail_subtree(&self, session: &PlanSession, node_id: &str, reason: &str) {
        let skipped = {
            let mut tree = session.tree.write().await;
            if let Some(node) = tree.get_mut(node_id) {
                node.state = NodeState::Error;
                node.answer = None;
                node.pages.clear();
            }
            tree.mark_descendants_failed(node_id)
        };

        for skipped_id in skipped {
            debug!(node_id = %skipped_id, parent_id = node_id, "跳过失败节点的子孙");
            self.diagnostics
                .record(
                    &format!("node_{}_skipped", skipped_id),
                    &json!({ "reason": format!("Parent node {} {}", node_id, reason) }),
                )
                .await;
        }
    }

    /// 全部子孙节点结束后，汇总已回答的子问题得到最终回答
    async fn process_root_node(&self, session: &PlanSession) -> Result<()> {
        info!("🧩 开始汇总根节点");
        let (question, descendants) = {
            let tree = session.tree.read().await;
            let root = tree
                .get(ROOT_NODE_ID)
                .ok_or_else(|| SearchGraphError::NodeNotFound(ROOT_NODE_ID.to_string()))?;
            let descendants = tree
                .descendants(ROOT_NODE_ID)
                .iter()
                .filter_map(|id| tree.get(id).cloned())
                .collect::<Vec<_>>();
            (root.content.clone(), descendants)
        };

        let pending = descendants
            .iter()
            .filter(|node| !node.state.is_terminal())
            .count();
        if pending > 0 {
            let err = SearchGraphError::IncompleteDescendants { pending };
            error!("❌ {}", err);
            self.diagnostics
                .record(
                    "root_node_error",
                    &json!({
                        "error": err.to_string(),
                        "descendants": descendants
                            .iter()
                            .map(|node| json!({ "id": node.id, "state": node.state, "content": node.content }))
                            .collect::<Vec<_>>(),
                    }),
                )
                .await;
            return Ok(());
        }

        let responses = descendants
            .iter()
            .filter_map(|node| {
                Some(QuestionAnswer {
                    content: node.content.clone(),
                    answer: node.non_empty_answer()?.to_string(),
                })
            })
            .collect::<Vec<_>>();

        let context = responses
            .iter()
            .enumerate()
            .map(|(index, qa)| format!("[{}] Question: {}\nAnswer: {}", index, qa.content, qa.answer))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt_sys = format!(
            "{}\n{}",
            include_str!("prompts/summary_sys.tpl"),
            self.language_instruction
        );
        let prompt_user = format!(include_str!("prompts/summary_user.tpl"), question, context);

        let answer = self
            .reasoner
            .generate(&ReasoningRequest::text(
                PromptKind::Summarize,
                prompt_sys,
                prompt_user,
            ))
            .await?;
        let answer = answer.trim().to_string();

        {
            let mut tree = session.tree.write().await;
            if let Some(root) = tree.get_mut(ROOT_NODE_ID) {
                root.answer = Some(answer.clone());
                root.state = NodeState::Finished;
            }
        }

        info!(sources = responses.len(), "✅ 根节点汇总完成");
        self.diagnostics
            .record(
                "root_node_result",
                &json!({ "answer": answer, "descendant_responses": responses }),
            )
            .await;
        Ok(())
    }
}
