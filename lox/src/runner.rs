//! Runner trait used by the CLI to drive an interpreter

use std::io::Write;

use crate::Outcome;

/// Something that runs Lox source and remembers state between runs.
pub trait Runner {
    /// Run source code and write program output to `stdout`.
    ///
    /// Diagnostics come back in the [`Outcome`]; nothing is printed for them.
    fn run<W: Write>(&mut self, source: &str, stdout: W) -> Outcome;

    /// Names of all globals currently defined.
    ///
    /// Used for REPL autocompletion.
    fn variable_names(&self) -> Vec<String>;
}
