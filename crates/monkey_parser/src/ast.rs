use monkey_lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Node<T> {
    pub inner: T,
    pub span: Span,
}

impl<T> Node<T> {
    pub fn new(inner: T, span: Span) -> Self {
        Node { inner, span }
    }
}

pub type Expr = Node<ExprKind>;
pub type Stmt = Node<StmtKind>;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Bool(bool),
    Str(String),
    Ident(String),
    Prefix { op: String, right: Box<Expr> },
    Infix { op: String, left: Box<Expr>, right: Box<Expr> },
    If {
        condition: Box<Expr>,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },
    FunctionLiteral { params: Vec<String>, body: Vec<Stmt> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Index { left: Box<Expr>, index: Box<Expr> },
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Return(Expr),
    Expr(Expr),
}
