use std::sync::Arc;

use crate::error::Position;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Attribute(Box<Expr>, String),  // foo.bar
    Index(Box<Expr>, Box<Expr>),   // foo['bar']
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>), // a < b <= c
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// One line of a `py:` code block.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub pos: Position,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Assign { targets: Vec<String>, value: Expr },
    AugAssign { name: String, op: BinOp, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// A `def` block: a named, overridable body.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub cond: Option<Expr>, // None for the trailing else
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub pos: Position,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(String),
    Expr {
        expr: Expr,
        filters: Vec<Expr>,
    },
    If {
        branches: Vec<Branch>,
    },
    For {
        targets: Vec<String>, // e.g. ["i", "item"]
        iterable: Expr,
        body: Vec<Node>,
    },
    Break,
    Continue,
    Default {
        name: String,
        expr: Expr,
    },
    Code(Vec<Statement>),
    Comment(String),
    Def(Arc<BlockDef>),
    Inherit(Expr),
}

impl Node {
    pub fn new(pos: Position, kind: NodeKind) -> Self {
        Self { pos, kind }
    }
}
