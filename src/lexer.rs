use crate::error::{Span, SprigError};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Semicolon,
    Slash,
    Star,
    Percent,

    // One, two or three character tokens
    Minus,
    MinusMinus,
    MinusMinusMinus,
    Plus,
    PlusPlus,
    PlusPlusPlus,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Class,
    Def,
    Else,
    Exit,
    False,
    For,
    Foreach,
    If,
    Let,
    Next,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    While,

    // Special
    Eof,
}

/// Literal payload carried by number and string tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
    pub span: Span,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        lexeme: String,
        literal: Option<Literal>,
        line: usize,
        span: Span,
    ) -> Self {
        Self {
            token_type,
            lexeme,
            literal,
            line,
            span,
        }
    }
}

pub struct Lexer {
    source: String,
    tokens: Vec<Token>,
    errors: Vec<SprigError>,
    start: usize,
    current: usize,
    line: usize,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: String) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("and", TokenType::And);
        keywords.insert("class", TokenType::Class);
        keywords.insert("def", TokenType::Def);
        keywords.insert("else", TokenType::Else);
        keywords.insert("exit", TokenType::Exit);
        keywords.insert("false", TokenType::False);
        keywords.insert("for", TokenType::For);
        keywords.insert("foreach", TokenType::Foreach);
        keywords.insert("if", TokenType::If);
        keywords.insert("let", TokenType::Let);
        keywords.insert("next", TokenType::Next);
        keywords.insert("nil", TokenType::Nil);
        keywords.insert("or", TokenType::Or);
        keywords.insert("print", TokenType::Print);
        keywords.insert("return", TokenType::Return);
        keywords.insert("super", TokenType::Super);
        keywords.insert("this", TokenType::This);
        keywords.insert("true", TokenType::True);
        keywords.insert("while", TokenType::While);

        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            keywords,
        }
    }

    /// Scans the entire source. Errors accumulate rather than aborting, so
    /// one bad character does not hide the next one.
    pub fn scan_tokens(mut self) -> Result<Vec<Token>, Vec<SprigError>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            String::new(),
            None,
            self.line,
            Span::new(self.current, self.current),
        ));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn scan_token(&mut self) {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            '[' => self.add_token(TokenType::LeftBracket),
            ']' => self.add_token(TokenType::RightBracket),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            '%' => self.add_token(TokenType::Percent),
            '-' => {
                // Maximal munch: `-`, `--` and `---` are distinct operators
                let token_type = if self.match_char('-') {
                    if self.match_char('-') {
                        TokenType::MinusMinusMinus
                    } else {
                        TokenType::MinusMinus
                    }
                } else {
                    TokenType::Minus
                };
                self.add_token(token_type);
            }
            '+' => {
                let token_type = if self.match_char('+') {
                    if self.match_char('+') {
                        TokenType::PlusPlusPlus
                    } else {
                        TokenType::PlusPlus
                    }
                } else {
                    TokenType::Plus
                };
                self.add_token(token_type);
            }
            '!' => {
                let token_type = if self.match_char('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(token_type);
            }
            '=' => {
                let token_type = if self.match_char('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(token_type);
            }
            '<' => {
                let token_type = if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(token_type);
            }
            '>' => {
                let token_type = if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type);
            }
            '/' => {
                if self.match_char('/') {
                    // Comment goes until end of line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' => {
                // Ignore whitespace
            }
            '\n' => {
                self.line += 1;
            }
            '"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            _ => {
                self.errors.push(SprigError::lex_error(
                    Span::new(self.start, self.current),
                    self.line,
                    format!("Unexpected character: '{}'", c),
                ));
            }
        }
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current..].chars().next().unwrap_or('\0');
        self.current += c.len_utf8();
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn peek(&self) -> char {
        self.source[self.current..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn string(&mut self) {
        // No escape processing at lex time; a print-time pass expands the
        // literal `\n` sequence instead.
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.errors.push(SprigError::lex_error(
                Span::new(self.start, self.current),
                self.line,
                "Unterminated string".to_string(),
            ));
            return;
        }

        // Consume the closing quote
        self.advance();

        let value = self.source[self.start + 1..self.current - 1].to_string();
        self.add_token_literal(TokenType::String, Some(Literal::Str(value)));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // Look for a fractional part
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        // Every number is a 64-bit float; parse cannot fail on this shape
        let value: f64 = self.source[self.start..self.current].parse().unwrap_or(0.0);
        self.add_token_literal(TokenType::Number, Some(Literal::Number(value)));
    }

    fn identifier(&mut self) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        // Keywords match case-insensitively
        let text = self.source[self.start..self.current].to_lowercase();
        let token_type = self
            .keywords
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenType::Identifier);

        self.add_token(token_type);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.add_token_literal(token_type, None);
    }

    fn add_token_literal(&mut self, token_type: TokenType, literal: Option<Literal>) {
        let lexeme = self.source[self.start..self.current].to_string();
        self.tokens.push(Token::new(
            token_type,
            lexeme,
            literal,
            self.line,
            Span::new(self.start, self.current),
        ));
    }
}
