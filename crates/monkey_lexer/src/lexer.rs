use crate::error::{LexError, LexResult};
use crate::token::{lookup_keyword, Span, Token, TokenKind};

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    pub errors: Vec<LexError>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' { self.line += 1; self.column = 1; } else { self.column += 1; }
        Some(ch)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) { self.advance(); true } else { false }
    }

    fn make_token(&self, kind: TokenKind, start: usize, start_col: usize, lexeme: &str) -> Token {
        Token::new(kind, Span::new(self.line, start_col, start, self.pos), lexeme)
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            if self.pos >= self.source.len() {
                tokens.push(Token::new(TokenKind::Eof, Span::new(self.line, self.column, self.pos, self.pos), ""));
                break;
            }
            match self.next_token() {
                Ok(Some(tok)) => tokens.push(tok),
                Ok(None) => {}
                Err(e) => {
                    self.errors.push(e);
                    let start = self.pos;
                    let col = self.column;
                    let ch = self.advance().unwrap_or('\0');
                    tokens.push(self.make_token(TokenKind::Illegal(ch), start, col, &ch.to_string()));
                }
            }
        }
        tokens
    }

    fn next_token(&mut self) -> LexResult<Option<Token>> {
        let start = self.pos;
        let start_col = self.column;

        let ch = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };

        if ch.is_whitespace() { self.advance(); return Ok(None); }

        self.advance();

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '=' => if self.match_char('=') { TokenKind::Eq } else { TokenKind::Assign },
            '!' => if self.match_char('=') { TokenKind::NotEq } else { TokenKind::Bang },
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '"' => return Ok(Some(self.lex_string(start, start_col)?)),
            c if c.is_ascii_digit() => return Ok(Some(self.lex_number(c, start, start_col)?)),
            c if c.is_alphabetic() || c == '_' => return Ok(Some(self.lex_identifier(c, start, start_col))),
            other => return Err(LexError::UnexpectedCharacter { ch: other, span: Span::new(self.line, start_col, start, self.pos) }),
        };

        let lexeme: String = self.source[start..self.pos].iter().collect();
        Ok(Some(self.make_token(kind, start, start_col, &lexeme)))
    }

    fn lex_string(&mut self, start: usize, start_col: usize) -> LexResult<Token> {
        let mut content = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { span: Span::new(self.line, start_col, start, self.pos) }),
                Some('"') => { self.advance(); break; }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n')  => content.push('\n'),
                        Some('t')  => content.push('\t'),
                        Some('r')  => content.push('\r'),
                        Some('\\') => content.push('\\'),
                        Some('"')  => content.push('"'),
                        Some(c)    => { content.push('\\'); content.push(c); }
                        None => return Err(LexError::UnterminatedString { span: Span::new(self.line, start_col, start, self.pos) }),
                    }
                }
                Some(c) => { content.push(c); self.advance(); }
            }
        }
        let lexeme: String = self.source[start..self.pos].iter().collect();
        Ok(Token::new(TokenKind::Str(content), Span::new(self.line, start_col, start, self.pos), lexeme))
    }

    fn lex_number(&mut self, first: char, start: usize, start_col: usize) -> LexResult<Token> {
        let mut raw = String::new();
        raw.push(first);
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            raw.push(self.advance().unwrap());
        }
        let val: i64 = raw.parse().map_err(|_| LexError::InvalidNumber {
            raw: raw.clone(),
            span: Span::new(self.line, start_col, start, self.pos),
        })?;
        let lexeme: String = self.source[start..self.pos].iter().collect();
        Ok(Token::new(TokenKind::Int(val), Span::new(self.line, start_col, start, self.pos), lexeme))
    }

    fn lex_identifier(&mut self, first: char, start: usize, start_col: usize) -> Token {
        let mut name = String::new();
        name.push(first);
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            name.push(self.advance().unwrap());
        }
        let kind = lookup_keyword(&name).unwrap_or(TokenKind::Ident(name.clone()));
        Token::new(kind, Span::new(self.line, start_col, start, self.pos), name)
    }
}
