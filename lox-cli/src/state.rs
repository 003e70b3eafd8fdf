use lox::{KEYWORDS, TokenType};

/// Input collected by the REPL until it forms something worth running.
pub struct ReplState {
    buffer: String,
    brace_depth: usize,
}

impl ReplState {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            brace_depth: 0,
        }
    }

    pub fn prompt(&self) -> String {
        if self.brace_depth == 0 {
            "> ".to_string()
        } else {
            format!("..{} ", self.brace_depth)
        }
    }

    /// Returns true once braces are balanced and the buffer can run.
    pub fn process_line(&mut self, line: &str) -> bool {
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => self.brace_depth = self.brace_depth.saturating_sub(1),
                _ => {}
            }
        }

        self.buffer.push_str(line);
        self.buffer.push('\n');

        self.brace_depth == 0
    }

    pub fn take_buffer(&mut self) -> String {
        self.brace_depth = 0;
        std::mem::take(&mut self.buffer)
    }

    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.brace_depth = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// A bare expression with no trailing `;` gets its value printed.
    pub fn should_auto_print(input: &str) -> bool {
        let trimmed = input.trim();
        if trimmed.starts_with("//") {
            return false;
        }

        let code = match trimmed.find("//") {
            Some(idx) => trimmed[..idx].trim(),
            None => trimmed,
        };
        let code = match code.rfind("/*") {
            Some(start) if code.ends_with("*/") => code[..start].trim(),
            _ => code,
        };

        if code.is_empty() || code.ends_with('}') || code.ends_with(';') {
            return false;
        }

        // Statements missing their `;` go to the parser as typed so it can
        // report the real problem.
        !starts_with_statement_keyword(code)
    }

    /// Turns a bare expression into an expression statement.
    pub fn complete_statement(input: &str) -> String {
        format!("{};", input.trim())
    }
}

fn starts_with_statement_keyword(code: &str) -> bool {
    let word: String = code
        .chars()
        .take_while(|c| lox::is_identifier_char(*c))
        .collect();

    matches!(
        KEYWORDS.get(word.as_str()),
        Some(
            TokenType::Break
                | TokenType::Class
                | TokenType::Else
                | TokenType::For
                | TokenType::Fun
                | TokenType::If
                | TokenType::Print
                | TokenType::Return
                | TokenType::Var
                | TokenType::While
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_empty_state() {
        let state = ReplState::new();
        assert!(state.is_empty());
        assert_eq!(state.brace_depth, 0);
    }

    #[test]
    fn prompt_returns_normal_when_not_in_block() {
        assert_eq!(ReplState::new().prompt(), "> ");
    }

    #[test]
    fn prompt_shows_depth_when_in_block() {
        let mut state = ReplState::new();
        state.process_line("{");
        assert_eq!(state.prompt(), "..1 ");

        state.process_line("fun f() {");
        assert_eq!(state.prompt(), "..2 ");
    }

    #[test]
    fn process_line_ready_when_braces_balanced() {
        let mut state = ReplState::new();
        assert!(state.process_line("print 1;"));
    }

    #[test]
    fn process_line_waits_for_closing_brace() {
        let mut state = ReplState::new();
        assert!(!state.process_line("class A {"));
        assert!(!state.process_line("  m() { return 1; }"));
        assert!(state.process_line("}"));
    }

    #[test]
    fn take_buffer_returns_accumulated_lines() {
        let mut state = ReplState::new();
        state.process_line("{");
        state.process_line("print 1;");
        state.process_line("}");

        assert_eq!(state.take_buffer(), "{\nprint 1;\n}\n");
        assert!(state.is_empty());
    }

    #[test]
    fn cancel_clears_buffer_and_depth() {
        let mut state = ReplState::new();
        state.process_line("{");
        state.process_line("print 1;");
        state.cancel();

        assert!(state.is_empty());
        assert_eq!(state.prompt(), "> ");
    }

    #[test]
    fn handles_unmatched_closing_brace() {
        let mut state = ReplState::new();
        assert!(state.process_line("}"));
        assert_eq!(state.brace_depth, 0);
    }

    #[test]
    fn auto_prints_bare_expressions() {
        assert!(ReplState::should_auto_print("1 + 2"));
        assert!(ReplState::should_auto_print("\"lox\""));
        assert!(ReplState::should_auto_print("x"));
        assert!(ReplState::should_auto_print("counter()"));
    }

    #[test]
    fn auto_prints_expressions_starting_with_value_keywords() {
        assert!(ReplState::should_auto_print("true"));
        assert!(ReplState::should_auto_print("nil == false"));
        assert!(ReplState::should_auto_print("this"));
    }

    #[test]
    fn does_not_auto_print_statements() {
        assert!(!ReplState::should_auto_print("print 1;"));
        assert!(!ReplState::should_auto_print("1 + 2;"));
        assert!(!ReplState::should_auto_print("{ print 1; }"));
        assert!(!ReplState::should_auto_print("fun f() {\n}\n"));
    }

    #[test]
    fn does_not_auto_print_statements_missing_semicolon() {
        assert!(!ReplState::should_auto_print("print a"));
        assert!(!ReplState::should_auto_print("var x = 1"));
        assert!(!ReplState::should_auto_print("return x"));
        assert!(!ReplState::should_auto_print("while (x) x = x - 1"));
    }

    #[test]
    fn identifiers_with_keyword_prefix_still_auto_print() {
        assert!(ReplState::should_auto_print("variable"));
        assert!(ReplState::should_auto_print("printer"));
    }

    #[test]
    fn does_not_auto_print_empty_or_comments() {
        assert!(!ReplState::should_auto_print(""));
        assert!(!ReplState::should_auto_print("  \n"));
        assert!(!ReplState::should_auto_print("// comment"));
        assert!(!ReplState::should_auto_print("/* block */"));
        assert!(!ReplState::should_auto_print("print 1; // trailing"));
    }

    #[test]
    fn complete_statement_appends_semicolon() {
        assert_eq!(ReplState::complete_statement("1 + 2\n"), "1 + 2;");
    }
}
