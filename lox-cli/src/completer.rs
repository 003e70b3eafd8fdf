use std::borrow::Cow;
use std::cell::RefCell;

use lox::{KEYWORDS, NATIVE_FUNCTIONS, Scanner, TokenType};
use rustyline::Context;
use rustyline::Helper;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::validate::Validator;

const KEYWORD: &str = "\x1b[35m";
const STRING: &str = "\x1b[32m";
const NUMBER: &str = "\x1b[33m";
const VARIABLE: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Rustyline helper with completion and highlighting for the Lox REPL
pub struct LoxHelper {
    variables: RefCell<Vec<String>>,
}

impl LoxHelper {
    pub fn new() -> Self {
        Self {
            variables: RefCell::new(Vec::new()),
        }
    }

    pub fn set_variables(&self, vars: Vec<String>) {
        *self.variables.borrow_mut() = vars;
    }

    /// Start of the identifier under the cursor
    fn find_word_start(line: &str, pos: usize) -> usize {
        line[..pos]
            .char_indices()
            .rev()
            .find(|(_, c)| !lox::is_identifier_char(*c))
            .map_or(0, |(i, c)| i + c.len_utf8())
    }

    fn get_completions(prefix: &str, variables: &[String]) -> Vec<String> {
        if prefix.is_empty() {
            return Vec::new();
        }

        let mut completions = Vec::new();
        for candidate in KEYWORDS.keys().chain(NATIVE_FUNCTIONS) {
            if candidate.starts_with(prefix) {
                completions.push(candidate.to_string());
            }
        }
        for var in variables {
            if var.starts_with(prefix) {
                completions.push(var.clone());
            }
        }

        completions.sort();
        completions.dedup();
        completions
    }

    /// Colors keywords, literals and known globals. Text the scanner skips,
    /// such as whitespace, comments and bad characters, is copied unchanged.
    pub fn highlight_line(line: &str, variables: &[String]) -> String {
        let mut result = String::new();
        let mut pos = 0;

        for token in Scanner::new(line).flatten() {
            if token.token_type == TokenType::Eof {
                break;
            }
            if token.span.start > pos {
                result.push_str(&line[pos..token.span.start]);
            }

            let text = &line[token.span.clone()];
            let color = match token.token_type {
                TokenType::String => Some(STRING),
                TokenType::Number => Some(NUMBER),
                TokenType::Identifier if variables.contains(&token.lexeme) => Some(VARIABLE),
                TokenType::Identifier => None,
                _ if KEYWORDS.contains_key(text) => Some(KEYWORD),
                _ => None,
            };

            match color {
                Some(color) => {
                    result.push_str(color);
                    result.push_str(text);
                    result.push_str(RESET);
                }
                None => result.push_str(text),
            }
            pos = token.span.end;
        }

        if pos < line.len() {
            result.push_str(&line[pos..]);
        }
        result
    }
}

impl Helper for LoxHelper {}

impl Highlighter for LoxHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let variables = self.variables.borrow();
        Cow::Owned(Self::highlight_line(line, &variables))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

impl Hinter for LoxHelper {
    type Hint = String;
}

impl Validator for LoxHelper {}

impl Completer for LoxHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::find_word_start(line, pos);
        let variables = self.variables.borrow();
        let pairs = Self::get_completions(&line[start..pos], &variables)
            .into_iter()
            .map(|s| Pair {
                display: s.clone(),
                replacement: s,
            })
            .collect();

        Ok((start, pairs))
    }
}
