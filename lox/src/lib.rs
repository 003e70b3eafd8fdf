mod ast;
mod environment;
mod error;
mod interpreter;
mod parser;
mod resolver;
mod runner;
mod scanner;
mod token;
mod value;

use std::io::Write;
use std::path::Path;

use log::info;

pub use ast::{Expr, ExprId, FunctionDecl, Rpn, Stmt};
pub use environment::{Environment, Globals};
pub use error::{ErrorKind, LoxError, Warning};
pub use interpreter::{Flow, Interpreter};
pub use parser::Parser;
pub use resolver::{Resolution, Resolutions, Resolver};
pub use runner::Runner;
pub use scanner::{KEYWORDS, Scanner, is_identifier_char, is_identifier_start};
pub use token::{Literal, Span, Token, TokenType, format_number};
pub use value::{Class, Function, INITIALIZER_NAME, Instance, LoxFunction, NativeFunction, Value};

/// Native functions available in every interpreter
pub const NATIVE_FUNCTIONS: &[&str] = &["clock"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Warn about locals that are declared but never read.
    pub report_unused: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            report_unused: true,
        }
    }
}

/// What one run produced. Errors all come from the same phase, since a
/// failing phase stops the pipeline.
#[derive(Debug, Default)]
pub struct Outcome {
    pub errors: Vec<LoxError>,
    pub warnings: Vec<Warning>,
    /// Value of the last top-level expression statement that ran.
    pub value: Option<Value>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_runtime_error(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind() == ErrorKind::Runtime)
    }

    fn failed(errors: Vec<LoxError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }
}

fn scan(source: &str) -> Result<Vec<Token>, Vec<LoxError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for result in Scanner::new(source) {
        match result {
            Ok(token) => tokens.push(token),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

/// Scans and parses `source` without running it.
pub fn parse(source: &str) -> Result<Vec<Stmt>, Vec<LoxError>> {
    let mut parser = Parser::new(scan(source)?);
    let statements = parser.parse();
    let errors = parser.take_errors();
    if errors.is_empty() {
        Ok(statements)
    } else {
        Err(errors)
    }
}

/// Scans, parses, resolves and evaluates source, keeping globals between runs.
pub struct Lox {
    interpreter: Interpreter,
    options: Options,
    next_id: usize,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            interpreter: Interpreter::new(),
            options,
            next_id: 0,
        }
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.interpreter.variable_names()
    }

    pub fn run<O: Write>(&mut self, source: &str, mut stdout: O) -> Outcome {
        info!("scanning {} bytes", source.len());
        let tokens = match scan(source) {
            Ok(tokens) => tokens,
            Err(errors) => return Outcome::failed(errors),
        };

        info!("parsing {} tokens", tokens.len());
        let mut parser = Parser::starting_at(tokens, self.next_id);
        let statements = parser.parse();
        self.next_id = parser.next_id();
        let errors = parser.take_errors();
        if !errors.is_empty() {
            return Outcome::failed(errors);
        }

        info!("resolving {} statements", statements.len());
        let resolution = Resolver::new()
            .report_unused(self.options.report_unused)
            .resolve(&statements);
        if !resolution.is_ok() {
            return Outcome {
                errors: resolution.errors,
                warnings: resolution.warnings,
                value: None,
            };
        }
        self.interpreter.add_resolutions(resolution.locals);

        info!("evaluating");
        match self.interpreter.interpret(&statements, &mut stdout) {
            Ok(value) => Outcome {
                errors: Vec::new(),
                warnings: resolution.warnings,
                value,
            },
            Err(e) => Outcome {
                errors: vec![e],
                warnings: resolution.warnings,
                value: None,
            },
        }
    }

    /// Reads and runs a script. Only failing to read it is an `Err`.
    pub fn run_file<O: Write>(
        &mut self,
        path: impl AsRef<Path>,
        stdout: O,
    ) -> Result<Outcome, LoxError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        info!("running {}", path.as_ref().display());
        Ok(self.run(&source, stdout))
    }
}

impl Runner for Lox {
    fn run<W: Write>(&mut self, source: &str, stdout: W) -> Outcome {
        Lox::run(self, source, stdout)
    }

    fn variable_names(&self) -> Vec<String> {
        Lox::variable_names(self)
    }
}
