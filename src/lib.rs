use crate::vm::{VMError, VM};
use log::trace;
use std::io::Write;
use thiserror::Error;

pub mod chunk;
pub mod compiler;
pub mod scanner;
pub mod table;
pub mod value;
pub mod vm;

pub use compiler::{compile, CompileErrors, Program};

/// Compiles `source` and runs it, writing the output of `print` statements
/// to `write`. Globals live only as long as this call.
pub fn interpret<W: Write>(source: &str, write: &mut W) -> Result<(), InterpretError> {
    trace!("Got input string: {source}");
    let program = compile(source)?;
    run(&program, write)
}

/// Runs an already compiled program.
pub fn run<W: Write>(program: &Program, write: &mut W) -> Result<(), InterpretError> {
    let mut vm = VM::new(write, program);
    vm.run()?;
    Ok(())
}

#[derive(Error, Debug, Clone)]
pub enum InterpretError {
    #[error(transparent)]
    CompileErrors(#[from] CompileErrors),
    #[error(transparent)]
    InterpretError(#[from] VMError),
}

impl InterpretError {
    pub fn result(&self) -> InterpretResult {
        match self {
            InterpretError::CompileErrors(_) => InterpretResult::CompileError,
            InterpretError::InterpretError(_) => InterpretResult::RuntimeError,
        }
    }
}

/// Outcome of one `interpret` call as seen by a host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

impl InterpretResult {
    /// Conventional process exit status for the outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError => 65,
            InterpretResult::RuntimeError => 70,
        }
    }
}

impl From<&Result<(), InterpretError>> for InterpretResult {
    fn from(value: &Result<(), InterpretError>) -> Self {
        match value {
            Ok(()) => InterpretResult::Ok,
            Err(e) => e.result(),
        }
    }
}
