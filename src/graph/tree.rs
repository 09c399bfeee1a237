use std::collections::HashMap;

use anyhow::Result;

use crate::error::SearchGraphError;
use crate::graph::types::{Node, NodeId, NodeState, NodeType, ROOT_NODE_ID, RawNode};
use crate::search::QuestionAnswer;

/// 显式父子引用的问题树，单次 plan 独占一棵
#[derive(Debug, Clone, Default)]
pub struct QuestionTree {
    nodes: HashMap<NodeId, Node>,
}

impl QuestionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, content: &str) -> NodeId {
        let root = Node::new(ROOT_NODE_ID.to_string(), NodeType::Root, content, None);
        self.nodes.insert(root.id.clone(), root);
        ROOT_NODE_ID.to_string()
    }

    pub fn add_node(&mut self, content: &str, parent_id: &str) -> Result<NodeId> {
        let id = uuid::Uuid::new_v4().to_string();
        let parent = self
            .nodes
            .get_mut(parent_id)
            .ok_or_else(|| SearchGraphError::NodeNotFound(parent_id.to_string()))?;
        parent.children.push(id.clone());

        let node = Node::new(
            id.clone(),
            NodeType::Searcher,
            content,
            Some(parent_id.to_string()),
        );
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// 按拆解结构递归创建节点，保持兄弟顺序
    pub fn materialize(&mut self, raw_nodes: &[RawNode], parent_id: &str) -> Result<Vec<NodeId>> {
        let mut created = Vec::with_capacity(raw_nodes.len());
        for raw in raw_nodes {
            let id = self.add_node(&raw.content, parent_id)?;
            self.materialize(&raw.children, &id)?;
            created.push(id);
        }
        Ok(created)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children_of(&self, id: &str) -> Vec<NodeId> {
        self.nodes
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// 从直接父节点到根节点，最近的在前
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut ancestors = vec![];
        let mut current = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent_id) = current {
            current = self.nodes.get(&parent_id).and_then(|n| n.parent.clone());
            ancestors.push(parent_id);
        }
        ancestors
    }

    /// 先序遍历的全部子孙节点，不含自身
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut descendants = vec![];
        for child in self.children_of(id) {
            let grand_children = self.descendants(&child);
            descendants.push(child);
            descendants.extend(grand_children);
        }
        descendants
    }

    /// 已有非空回答的祖先问答对，最近的在前
    pub fn ancestor_answers(&self, id: &str) -> Vec<QuestionAnswer> {
        self.ancestors(id)
            .iter()
            .filter_map(|ancestor_id| self.nodes.get(ancestor_id))
            .filter_map(|node| {
                Some(QuestionAnswer {
                    content: node.content.clone(),
                    answer: node.non_empty_answer()?.to_string(),
                })
            })
            .collect()
    }

    /// 把全部子孙节点标记为 ERROR，返回本次新标记的节点；已是 ERROR 的节点不重复标记
    pub fn mark_descendants_failed(&mut self, id: &str) -> Vec<NodeId> {
        let mut marked = vec![];
        for descendant_id in self.descendants(id) {
            let Some(node) = self.nodes.get_mut(&descendant_id) else {
                continue;
            };
            if node.state == NodeState::Error {
                continue;
            }
            node.state = NodeState::Error;
            node.answer = None;
            node.pages.clear();
            marked.push(descendant_id);
        }
        marked
    }

    /// 由父子引用导出的边：父节点ID -> 有序的子节点ID
    pub fn edges(&self) -> HashMap<NodeId, Vec<NodeId>> {
        self.nodes
            .values()
            .filter(|node| node.node_type == NodeType::Root || !node.children.is_empty())
            .map(|node| (node.id.clone(), node.children.clone()))
            .collect()
    }

    pub fn nodes(&self) -> &HashMap<NodeId, Node> {
        &self.nodes
    }

    pub fn into_parts(self) -> (HashMap<NodeId, Node>, HashMap<NodeId, Vec<NodeId>>) {
        let edges = self.edges();
        (self.nodes, edges)
    }
}
