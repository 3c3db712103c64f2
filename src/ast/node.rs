use crate::builtins::Builtin;
use crate::error::Span;
use crate::instrument::Tags;
use crate::polyglot::CallSite;
use crate::vm::scope::{FramePointer, LocalScope};
use crate::vm::value::Value;
use std::fmt;
use std::sync::Arc;

/// Index of a node inside its `Ast`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

pub enum NodeKind {
    Literal(Value),
    Read {
        name: String,
        pointer: FramePointer,
    },
    Builtin(Builtin),
    Let {
        name: String,
        slot: usize,
        value: NodeId,
    },
    /// Statements in order; the value is the last statement's value
    Block(Vec<NodeId>),
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Array(Vec<NodeId>),
    Function {
        name: Option<String>,
        arity: usize,
        body: NodeId,
        scope: Arc<LocalScope>,
    },
    Foreign(Arc<CallSite>),
    /// Halt point. `scope` is the lexical scope it appears in.
    Breakpoint {
        scope: Arc<LocalScope>,
    },
}

pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub tags: Tags,
}

impl Node {
    /// Lexical scope carried by the node, if any
    pub fn scope(&self) -> Option<&Arc<LocalScope>> {
        match &self.kind {
            NodeKind::Breakpoint { scope } => Some(scope),
            _ => None,
        }
    }

    pub fn is_breakpoint(&self) -> bool {
        matches!(self.kind, NodeKind::Breakpoint { .. })
    }
}
