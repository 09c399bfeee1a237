use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::search::{Page, Query};
use crate::utils::timing::TimingReport;

pub type NodeId = String;

/// 根节点使用固定ID
pub const ROOT_NODE_ID: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    Searcher,
}

/// 节点生命周期：NOT_STARTED -> RUNNING -> FINISHED | ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    NotStarted,
    Running,
    Finished,
    Error,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Finished | NodeState::Error)
    }
}

/// 问题树中的节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// 拆解阶段给出的原始问题，不会被修改
    pub original_content: String,
    /// 当前问题，执行时可能结合祖先上下文改写一次
    pub content: String,
    pub state: NodeState,
    /// 仅在 FINISHED 时存在
    pub answer: Option<String>,
    pub pages: Vec<Page>,
    /// 每次尝试使用的查询
    pub queries: Vec<Query>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, node_type: NodeType, content: &str, parent: Option<NodeId>) -> Self {
        Self {
            id,
            node_type,
            original_content: content.to_string(),
            content: content.to_string(),
            state: NodeState::NotStarted,
            answer: None,
            pages: vec![],
            queries: vec![],
            parent,
            children: vec![],
        }
    }

    /// 非空回答
    pub fn non_empty_answer(&self) -> Option<&str> {
        self.answer.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// 拆解结果中的一个子问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawNode {
    /// 子问题内容，必须是可以直接搜索的单一问题
    pub content: String,
    /// 依赖本子问题答案的后续子问题
    #[serde(default)]
    pub children: Vec<RawNode>,
}

/// 问题拆解结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decomposition {
    pub nodes: Vec<RawNode>,
}

impl Decomposition {
    /// 宽松解析：任何不符合结构的部分都被丢弃，内容为空的节点连同其子节点一起丢弃
    pub fn parse_lenient(raw: &str) -> Self {
        let value: serde_json::Value =
            match serde_json::from_str(crate::llm::extract_json_block(raw)) {
                Ok(value) => value,
                Err(_) => return Self::default(),
            };

        Self {
            nodes: Self::parse_nodes(value.get("nodes")),
        }
    }

    fn parse_nodes(value: Option<&serde_json::Value>) -> Vec<RawNode> {
        let Some(items) = value.and_then(|v| v.as_array()) else {
            return vec![];
        };

        items
            .iter()
            .filter_map(|item| {
                let content = item.get("content")?.as_str()?.trim();
                if content.is_empty() {
                    return None;
                }
                Some(RawNode {
                    content: content.to_string(),
                    children: Self::parse_nodes(item.get("children")),
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// 根节点回答中的一条引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 与根节点回答中 `[i]` 标记对应的序号
    pub index: usize,
    pub node_id: NodeId,
    pub question: String,
    pub answer: String,
    pub urls: Vec<String>,
}

/// 一次 plan 的完整结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub answer: String,
    pub nodes: HashMap<NodeId, Node>,
    /// 父节点ID -> 有序的子节点ID
    pub edges: HashMap<NodeId, Vec<NodeId>>,
    pub timing: TimingReport,
}

impl PlanOutcome {
    pub fn empty(timing: TimingReport) -> Self {
        Self {
            timing,
            ..Default::default()
        }
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(ROOT_NODE_ID)
    }

    /// 先序遍历的子孙节点ID，与根节点聚合时的顺序一致
    pub fn descendants_in_order(&self) -> Vec<NodeId> {
        let mut ordered = vec![];
        let mut stack: Vec<&NodeId> = self
            .edges
            .get(ROOT_NODE_ID)
            .map(|children| children.iter().rev().collect())
            .unwrap_or_default();

        while let Some(id) = stack.pop() {
            ordered.push(id.clone());
            if let Some(children) = self.edges.get(id) {
                stack.extend(children.iter().rev());
            }
        }
        ordered
    }

    /// 根节点回答引用的子问题，序号与聚合提示词中的序号一致
    pub fn citations(&self) -> Vec<Citation> {
        self.descendants_in_order()
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter_map(|node| Some((node, node.non_empty_answer()?)))
            .enumerate()
            .map(|(index, (node, answer))| Citation {
                index,
                node_id: node.id.clone(),
                question: node.content.clone(),
                answer: answer.to_string(),
                urls: node.pages.iter().map(|p| p.url.clone()).collect(),
            })
            .collect()
    }
}
