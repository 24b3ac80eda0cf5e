use monkey_lexer::{Span, Token, TokenKind};
use crate::ast::*;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest = 0,
    Equals = 1,
    LessGreater = 2,
    Sum = 3,
    Product = 4,
    Prefix = 5,
    Call = 6,
    Index = 7,
}

fn infix_prec(tok: &TokenKind) -> Prec {
    match tok {
        TokenKind::Eq | TokenKind::NotEq => Prec::Equals,
        TokenKind::Lt | TokenKind::Gt => Prec::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Prec::Sum,
        TokenKind::Slash | TokenKind::Asterisk => Prec::Product,
        TokenKind::LParen => Prec::Call,
        TokenKind::LBracket => Prec::Index,
        _ => Prec::Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new() }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }
    fn peek_kind(&self) -> &TokenKind { &self.peek().kind }
    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 { self.pos += 1; }
        tok
    }
    fn current_span(&self) -> Span { self.peek().span.clone() }
    fn match_tok(&mut self, kind: &TokenKind) -> bool {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind) {
            self.advance(); true
        } else { false }
    }
    fn expect(&mut self, kind: &TokenKind, label: &str) -> bool {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            self.errors.push(ParseError::UnexpectedToken {
                expected: label.to_string(),
                found: self.peek_kind().clone(),
                span: self.current_span(),
            });
            false
        }
    }
    fn skip_to_semicolon(&mut self) {
        while !matches!(self.peek_kind(), TokenKind::Semicolon | TokenKind::Eof) {
            self.advance();
        }
    }

    pub fn parse(&mut self) -> Program {
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Eof) {
            stmts.push(self.parse_stmt());
        }
        Program { stmts }
    }

    fn parse_stmt(&mut self) -> Stmt {
        match self.peek_kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::Return => self.parse_return(),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_let(&mut self) -> Stmt {
        let span = self.current_span();
        self.advance();
        let name = match self.peek_kind().clone() {
            TokenKind::Ident(s) => { self.advance(); s }
            _ => {
                self.errors.push(ParseError::UnexpectedToken {
                    expected: "identifier".to_string(), found: self.peek_kind().clone(), span: self.current_span(),
                });
                self.skip_to_semicolon();
                self.match_tok(&TokenKind::Semicolon);
                return Node::new(StmtKind::Expr(Node::new(ExprKind::Error, span.clone())), span);
            }
        };
        self.expect(&TokenKind::Assign, "'='");
        let value = self.parse_expr(Prec::Lowest);
        self.match_tok(&TokenKind::Semicolon);
        Node::new(StmtKind::Let { name, value }, span)
    }

    fn parse_return(&mut self) -> Stmt {
        let span = self.current_span();
        self.advance();
        let value = self.parse_expr(Prec::Lowest);
        self.match_tok(&TokenKind::Semicolon);
        Node::new(StmtKind::Return(value), span)
    }

    fn parse_expr_stmt(&mut self) -> Stmt {
        let span = self.current_span();
        let expr = self.parse_expr(Prec::Lowest);
        self.match_tok(&TokenKind::Semicolon);
        Node::new(StmtKind::Expr(expr), span)
    }

    fn parse_block(&mut self) -> Vec<Stmt> {
        self.expect(&TokenKind::LBrace, "'{'");
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.parse_stmt());
        }
        self.expect(&TokenKind::RBrace, "'}'");
        stmts
    }

    fn parse_expr(&mut self, prec: Prec) -> Expr {
        let mut left = self.parse_prefix();
        while !matches!(self.peek_kind(), TokenKind::Semicolon) && prec < infix_prec(self.peek_kind()) {
            left = self.parse_infix(left);
        }
        left
    }

    fn parse_prefix(&mut self) -> Expr {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Int(n) => { self.advance(); Node::new(ExprKind::Int(n), span) }
            TokenKind::Str(s) => { self.advance(); Node::new(ExprKind::Str(s), span) }
            TokenKind::True => { self.advance(); Node::new(ExprKind::Bool(true), span) }
            TokenKind::False => { self.advance(); Node::new(ExprKind::Bool(false), span) }
            TokenKind::Ident(s) => { self.advance(); Node::new(ExprKind::Ident(s), span) }
            TokenKind::Bang => {
                self.advance();
                let right = self.parse_expr(Prec::Prefix);
                Node::new(ExprKind::Prefix { op: "!".to_string(), right: Box::new(right) }, span)
            }
            TokenKind::Minus => {
                self.advance();
                let right = self.parse_expr(Prec::Prefix);
                Node::new(ExprKind::Prefix { op: "-".to_string(), right: Box::new(right) }, span)
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr(Prec::Lowest);
                self.expect(&TokenKind::RParen, "')'");
                e
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            TokenKind::If => self.parse_if_expr(),
            TokenKind::Function => self.parse_function_literal(),
            other => {
                self.errors.push(ParseError::NoPrefixParseFn { found: other, span: span.clone() });
                self.advance();
                Node::new(ExprKind::Error, span)
            }
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Expr {
        let span = left.span.clone();
        match self.peek_kind().clone() {
            TokenKind::LParen => {
                self.advance();
                let args = self.parse_expr_list(&TokenKind::RParen);
                Node::new(ExprKind::Call { callee: Box::new(left), args }, span)
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expr(Prec::Lowest);
                self.expect(&TokenKind::RBracket, "']'");
                Node::new(ExprKind::Index { left: Box::new(left), index: Box::new(index) }, span)
            }
            kind => {
                let prec = infix_prec(&kind);
                let op = token_to_op(&kind);
                self.advance();
                let right = self.parse_expr(prec);
                Node::new(ExprKind::Infix { op, left: Box::new(left), right: Box::new(right) }, span)
            }
        }
    }

    fn parse_expr_list(&mut self, end: &TokenKind) -> Vec<Expr> {
        let mut items = Vec::new();
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(end) {
            self.advance();
            return items;
        }
        items.push(self.parse_expr(Prec::Lowest));
        while self.match_tok(&TokenKind::Comma) {
            items.push(self.parse_expr(Prec::Lowest));
        }
        self.expect(end, "closing delimiter");
        items
    }

    fn parse_array_literal(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        let items = self.parse_expr_list(&TokenKind::RBracket);
        Node::new(ExprKind::Array(items), span)
    }

    fn parse_hash_literal(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        let mut pairs = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            let key = self.parse_expr(Prec::Lowest);
            self.expect(&TokenKind::Colon, "':'");
            let value = self.parse_expr(Prec::Lowest);
            pairs.push((key, value));
            if !self.match_tok(&TokenKind::Comma) { break; }
        }
        self.expect(&TokenKind::RBrace, "'}'");
        Node::new(ExprKind::Hash(pairs), span)
    }

    fn parse_if_expr(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        self.expect(&TokenKind::LParen, "'('");
        let condition = self.parse_expr(Prec::Lowest);
        self.expect(&TokenKind::RParen, "')'");
        let consequence = self.parse_block();
        let alternative = if self.match_tok(&TokenKind::Else) {
            Some(self.parse_block())
        } else { None };
        Node::new(ExprKind::If { condition: Box::new(condition), consequence, alternative }, span)
    }

    fn parse_function_literal(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        self.expect(&TokenKind::LParen, "'('");
        let params = self.parse_function_params();
        let body = self.parse_block();
        Node::new(ExprKind::FunctionLiteral { params, body }, span)
    }

    fn parse_function_params(&mut self) -> Vec<String> {
        let mut params = Vec::new();
        if self.match_tok(&TokenKind::RParen) {
            return params;
        }
        loop {
            match self.peek_kind().clone() {
                TokenKind::Ident(s) => { self.advance(); params.push(s); }
                _ => {
                    self.errors.push(ParseError::UnexpectedToken {
                        expected: "parameter name".to_string(), found: self.peek_kind().clone(), span: self.current_span(),
                    });
                    break;
                }
            }
            if !self.match_tok(&TokenKind::Comma) { break; }
        }
        self.expect(&TokenKind::RParen, "')'");
        params
    }
}

fn token_to_op(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Asterisk => "*",
        TokenKind::Slash => "/",
        TokenKind::Eq => "==",
        TokenKind::NotEq => "!=",
        TokenKind::Lt => "<",
        TokenKind::Gt => ">",
        _ => "?",
    }.to_string()
}
