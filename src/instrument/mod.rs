// Tala Instrumentation Module
// Tags, source filters and execution event probes wrapped around AST nodes

use crate::ast::{Ast, Node, NodeId};
use crate::vm::scope::{CallerInfo, Frame};
use crate::vm::value::{Stateful, Value};
use crate::vm::Interpreter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Node tag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tags(u8);

impl Tags {
    pub const NONE: Tags = Tags(0);
    pub const EXPRESSION: Tags = Tags(1);
    pub const CALL: Tags = Tags(1 << 1);
    pub const ROOT: Tags = Tags(1 << 2);
    /// Execution always stops here when a debugger is installed
    pub const ALWAYS_HALT: Tags = Tags(1 << 3);

    pub fn contains(self, other: Tags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Tags {
    type Output = Tags;

    fn bitor(self, rhs: Tags) -> Tags {
        Tags(self.0 | rhs.0)
    }
}

/// Selects the nodes a factory is offered
#[derive(Debug, Clone, Copy)]
pub struct SourceFilter {
    tags: Tags,
}

impl SourceFilter {
    pub fn tag_is(tags: Tags) -> Self {
        Self { tags }
    }

    pub fn matches(&self, node: &Node) -> bool {
        node.tags.contains(self.tags)
    }
}

/// Identity of one halt event. Also the debugger session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HaltId(u64);

static NEXT_HALT_ID: AtomicU64 = AtomicU64::new(1);

impl HaltId {
    pub(crate) fn next() -> Self {
        HaltId(NEXT_HALT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HaltId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-local exit out of a probed node.
///
/// Only the event that created it can catch it: the interpreter compares
/// `halt` with the id of each probed node it unwinds through and resumes
/// at the matching one with `payload` as that node's result.
#[derive(Debug)]
pub struct Unwind {
    halt: HaltId,
    payload: Stateful,
}

impl Unwind {
    pub fn halt_id(&self) -> HaltId {
        self.halt
    }

    pub(crate) fn into_payload(self) -> Stateful {
        self.payload
    }
}

/// What a probe sees when execution reaches its node
pub struct EventContext<'a> {
    interpreter: &'a Interpreter,
    halt: HaltId,
    node: &'a Node,
    file: &'a str,
    frame: Arc<Frame>,
    state: Value,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        interpreter: &'a Interpreter,
        node: &'a Node,
        file: &'a str,
        frame: Arc<Frame>,
        state: Value,
    ) -> Self {
        Self {
            interpreter,
            halt: HaltId::next(),
            node,
            file,
            frame,
            state,
        }
    }

    pub fn interpreter(&self) -> &'a Interpreter {
        self.interpreter
    }

    pub fn halt_id(&self) -> HaltId {
        self.halt
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn file(&self) -> &'a str {
        self.file
    }

    /// Interpreter state at the moment the node was entered
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Frame and scope of the node, if the node carries a scope
    pub fn caller_info(&self) -> Option<CallerInfo> {
        self.node
            .scope()
            .map(|scope| CallerInfo::new(self.frame.clone(), scope.clone()))
    }

    /// An unwind that resumes this event's node with `payload`
    pub fn create_unwind(&self, payload: Stateful) -> Unwind {
        Unwind {
            halt: self.halt,
            payload,
        }
    }
}

/// Probe attached to a single node
pub trait ExecutionEventNode: Send + Sync {
    /// Called before the node runs. Returning an unwind skips the node.
    fn on_enter(&self, _event: &EventContext<'_>) -> Result<(), Unwind> {
        Ok(())
    }

    fn on_return(&self, _event: &EventContext<'_>, _result: &Value) {}

    /// Called when an unwind created by this event reaches the node. The
    /// returned pair becomes the node's result and the new state.
    fn on_unwind(&self, _event: &EventContext<'_>, payload: Stateful) -> Stateful {
        payload
    }
}

/// Builds probes for nodes matching a filter
pub trait ExecutionEventFactory: Send + Sync {
    fn create(&self, node: &Node) -> Option<Arc<dyn ExecutionEventNode>>;
}

impl<F> ExecutionEventFactory for F
where
    F: Fn(&Node) -> Option<Arc<dyn ExecutionEventNode>> + Send + Sync,
{
    fn create(&self, node: &Node) -> Option<Arc<dyn ExecutionEventNode>> {
        self(node)
    }
}

struct EventBinding {
    filter: SourceFilter,
    factory: Arc<dyn ExecutionEventFactory>,
}

/// Factories to run over every freshly parsed tree
#[derive(Default)]
pub struct Instrumenter {
    bindings: Vec<EventBinding>,
}

impl Instrumenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_execution_event_factory(
        &mut self,
        filter: SourceFilter,
        factory: Arc<dyn ExecutionEventFactory>,
    ) {
        self.bindings.push(EventBinding { filter, factory });
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Attach probes to `ast`. The first factory that accepts a node wins.
    pub(crate) fn instrument(&self, ast: &mut Ast) {
        if self.bindings.is_empty() {
            return;
        }
        let mut probes: Vec<(NodeId, Arc<dyn ExecutionEventNode>)> = Vec::new();
        for (id, node) in ast.nodes() {
            let probe = self
                .bindings
                .iter()
                .filter(|binding| binding.filter.matches(node))
                .find_map(|binding| binding.factory.create(node));
            if let Some(probe) = probe {
                probes.push((id, probe));
            }
        }
        if !probes.is_empty() {
            tracing::trace!(file = ast.file(), count = probes.len(), "attached probes");
        }
        for (id, probe) in probes {
            ast.attach_probe(id, probe);
        }
    }
}
