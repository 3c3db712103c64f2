// Tala AST Module
// Node arena produced by the parser and walked by the interpreter

mod node;

pub use node::{BinaryOp, LogicalOp, Node, NodeId, NodeKind, UnaryOp};

use crate::error::Span;
use crate::instrument::{ExecutionEventNode, Tags};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A parsed program or fragment. Nodes refer to each other by `NodeId`.
/// Probes are attached once, before the tree is shared.
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    file: String,
    source: String,
    probes: FxHashMap<NodeId, Arc<dyn ExecutionEventNode>>,
}

impl fmt::Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ast")
            .field("file", &self.file)
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("probes", &self.probes.len())
            .finish()
    }
}

impl Ast {
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            file: file.into(),
            source: source.into(),
            probes: FxHashMap::default(),
        }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span, tags: Tags) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span, tags });
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Root node. An empty tree has none and evaluates to `Nothing`.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn probe(&self, id: NodeId) -> Option<&Arc<dyn ExecutionEventNode>> {
        if self.probes.is_empty() {
            return None;
        }
        self.probes.get(&id)
    }

    pub(crate) fn attach_probe(&mut self, id: NodeId, probe: Arc<dyn ExecutionEventNode>) {
        self.probes.insert(id, probe);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }
}
