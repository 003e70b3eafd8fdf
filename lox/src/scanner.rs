use phf::phf_map;

use crate::error::LoxError;
use crate::token::{Literal, Token, TokenType};

/// Reserved words and the token types they scan to.
pub static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "break" => TokenType::Break,
    "class" => TokenType::Class,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "fun" => TokenType::Fun,
    "if" => TokenType::If,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};

pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub struct Scanner<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: usize,
    start_line: usize,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            start_line: 1,
            done: false,
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, LoxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.is_at_end() {
                self.done = true;
                return Some(Ok(Token {
                    token_type: TokenType::Eof,
                    lexeme: String::new(),
                    literal: None,
                    line: self.line,
                    span: self.current..self.current,
                }));
            }

            self.start = self.current;
            self.start_line = self.line;
            let c = self.advance();

            let token_type = match c {
                ' ' | '\r' | '\t' => continue,
                '\n' => {
                    self.line += 1;
                    continue;
                }
                '(' => TokenType::LeftParen,
                ')' => TokenType::RightParen,
                '{' => TokenType::LeftBrace,
                '}' => TokenType::RightBrace,
                ',' => TokenType::Comma,
                '.' => TokenType::Dot,
                '-' => TokenType::Minus,
                '+' => TokenType::Plus,
                ';' => TokenType::Semicolon,
                '*' => TokenType::Star,
                '/' => {
                    if self.match_char('/') {
                        while self.peek().is_some_and(|c| c != '\n') {
                            self.advance();
                        }
                        continue;
                    } else if self.match_char('*') {
                        if let Err(e) = self.block_comment() {
                            return Some(Err(e));
                        }
                        continue;
                    }
                    TokenType::Slash
                }
                '!' => self.either('=', TokenType::BangEqual, TokenType::Bang),
                '=' => self.either('=', TokenType::EqualEqual, TokenType::Equal),
                '<' => self.either('=', TokenType::LessEqual, TokenType::Less),
                '>' => self.either('=', TokenType::GreaterEqual, TokenType::Greater),
                '"' => return Some(self.string()),
                c if c.is_ascii_digit() => return Some(Ok(self.number())),
                c if is_identifier_start(c) => return Some(Ok(self.identifier())),
                _ => {
                    return Some(Err(LoxError::Scan {
                        message: format!("Unexpected character '{}'.", c),
                        line: self.line,
                        span: self.start..self.current,
                    }));
                }
            };

            return Some(Ok(self.add_token(token_type)));
        }
    }
}

impl Scanner<'_> {
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current..]
            .chars()
            .next()
            .expect("advance called at end of source");
        self.current += c.len_utf8();
        c
    }

    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn either(&mut self, next: char, matched: TokenType, otherwise: TokenType) -> TokenType {
        if self.match_char(next) {
            matched
        } else {
            otherwise
        }
    }

    fn add_token(&self, token_type: TokenType) -> Token {
        Token {
            token_type,
            lexeme: self.source[self.start..self.current].to_string(),
            literal: None,
            line: self.start_line,
            span: self.start..self.current,
        }
    }

    fn add_token_with_literal(&self, token_type: TokenType, literal: Literal) -> Token {
        Token {
            literal: Some(literal),
            ..self.add_token(token_type)
        }
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_some_and(is_identifier_char) {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        let token_type = KEYWORDS
            .get(text)
            .copied()
            .unwrap_or(TokenType::Identifier);
        self.add_token(token_type)
    }

    fn number(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        // A dot only starts a fraction when a digit follows it.
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.source[self.start..self.current];
        let value = text.parse::<f64>().unwrap_or(f64::NAN);
        self.add_token_with_literal(TokenType::Number, Literal::Number(value))
    }

    fn string(&mut self) -> Result<Token, LoxError> {
        loop {
            match self.peek() {
                None => {
                    return Err(LoxError::Scan {
                        message: "Unterminated string.".to_string(),
                        line: self.start_line,
                        span: self.start..self.current,
                    });
                }
                Some('"') => {
                    let value = self.source[self.start + 1..self.current].to_string();
                    self.advance();
                    return Ok(
                        self.add_token_with_literal(TokenType::String, Literal::String(value))
                    );
                }
                Some('\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn block_comment(&mut self) -> Result<(), LoxError> {
        let mut depth = 1;

        while depth > 0 && !self.is_at_end() {
            let c = self.advance();

            if c == '\n' {
                self.line += 1;
            } else if c == '/' && self.peek() == Some('*') {
                self.advance();
                depth += 1;
            } else if c == '*' && self.peek() == Some('/') {
                self.advance();
                depth -= 1;
            }
        }

        if depth > 0 {
            return Err(LoxError::Scan {
                message: "Unterminated block comment.".to_string(),
                line: self.start_line,
                span: self.start..self.current,
            });
        }

        Ok(())
    }
}
