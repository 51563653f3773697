use crate::chunk::{Chunk, Opcode};
use crate::compiler::Program;
use crate::table::Table;
use crate::value::{StringValue, Value};
use arrayvec::ArrayVec;
use log::{debug, error, trace};
use num_enum::TryFromPrimitiveError;
use std::io::Write;
use thiserror::Error;

type VMResult<A> = Result<A, VMErrorKind>;

pub const STACK_SIZE: usize = 1024;
pub const FRAMES_MAX: usize = 64;

/// A running call: the chunk being executed, the position in it, and where
/// its local slots start on the shared stack.
#[derive(Debug)]
struct CallFrame<'p> {
    chunk: &'p Chunk,
    ip: usize,
    base: usize,
}

impl<'p> CallFrame<'p> {
    fn new(chunk: &'p Chunk, base: usize) -> Self {
        Self { chunk, ip: 0, base }
    }
}

#[derive(Debug)]
pub struct VM<'a, 'p, W: Write> {
    write: &'a mut W,
    program: &'p Program,
    frames: ArrayVec<CallFrame<'p>, FRAMES_MAX>,
    stack: ArrayVec<Value, STACK_SIZE>,
    globals: Table<Value>,
}

impl<'a, 'p, W: Write> VM<'a, 'p, W> {
    pub fn new(write: &'a mut W, program: &'p Program) -> Self {
        Self {
            write,
            program,
            frames: ArrayVec::new(),
            stack: ArrayVec::new(),
            globals: Table::new(),
        }
    }

    /// Runs the program's main chunk to completion.
    pub fn run(&mut self) -> Result<(), VMError> {
        self.stack.clear();
        self.frames.clear();
        let program = self.program;
        self.frames.push(CallFrame::new(&program.main, 0));
        self.execute().map_err(|kind| self.locate(kind))
    }

    fn locate(&self, kind: VMErrorKind) -> VMError {
        let (line, function) = match self.frames.last() {
            Some(frame) => (
                frame.chunk.line_at(frame.ip.saturating_sub(1)).unwrap_or(0),
                frame.chunk.name().to_string(),
            ),
            None => (0, self.program.main.name().to_string()),
        };
        debug!("Aborting in {function} at line {line}: {kind}");
        VMError {
            kind,
            line,
            function,
        }
    }

    fn execute(&mut self) -> VMResult<()> {
        loop {
            trace!("Stack:\n{stack:?}", stack = self.stack);
            if let Some(frame) = self.frames.last() {
                trace!(
                    "Instruction in {name} at {ip}: {instruction}",
                    name = frame.chunk.name(),
                    ip = frame.ip,
                    instruction = frame
                        .chunk
                        .disassemble_instruction_at(frame.ip)
                        .unwrap_or_else(|| "Not found, crash imminent".to_string())
                );
            }
            let opcode =
                Opcode::try_from(self.read_byte()?).map_err(IncorrectInvariantError::from)?;
            match opcode {
                Opcode::Return => {
                    if self.return_from_call(Value::Nil)? {
                        break;
                    }
                }
                Opcode::ReturnValue => {
                    let result = self.pop()?;
                    if self.return_from_call(result)? {
                        break;
                    }
                }
                Opcode::Constant => {
                    let constant = self.read_constant()?.clone();
                    self.push(constant)?;
                }
                Opcode::Nil => self.push(Value::Nil)?,
                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Not => {
                    let value = self.pop()?;
                    self.push(Value::Boolean(value.is_falsey()))?
                }
                Opcode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Boolean(a == b))?
                }
                Opcode::Greater => self.binary_op(">", |a, b| a > b, Value::Boolean)?,
                Opcode::Less => self.binary_op("<", |a, b| a < b, Value::Boolean)?,
                Opcode::Negate => {
                    let value = self.pop()?;
                    let num = value.as_number().ok_or(RuntimeError::InvalidOperand {
                        operation: "-",
                        operand: value.type_name(),
                    })?;
                    self.push(Value::Number(-num))?;
                }
                Opcode::Add => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let value = match (&a, &b) {
                        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                        (Value::String(a), Value::String(b)) => {
                            Value::String(StringValue::concat(a, b))
                        }
                        _ => {
                            return Err(RuntimeError::InvalidOperands {
                                operation: "+",
                                expected: "two numbers or two strings",
                                left: a.type_name(),
                                right: b.type_name(),
                            }
                            .into())
                        }
                    };
                    self.push(value)?;
                }
                Opcode::Subtract => self.binary_op("-", |a, b| a - b, Value::Number)?,
                Opcode::Multiply => self.binary_op("*", |a, b| a * b, Value::Number)?,
                Opcode::Divide => {
                    if let (Some(_), Some(divisor)) =
                        (self.peek(1)?.as_number(), self.peek(0)?.as_number())
                    {
                        if divisor == 0.0 {
                            return Err(RuntimeError::DivisionByZero.into());
                        }
                    }
                    self.binary_op("/", |a, b| a / b, Value::Number)?
                }
                Opcode::Print => {
                    let value = self.pop()?;
                    self.print_value(value)?;
                }
                Opcode::Pop => {
                    let _ = self.pop()?;
                }
                Opcode::DefineGlobal => {
                    let name = self.read_string()?;
                    let value = self.pop()?;
                    self.globals.insert(name.clone(), value);
                }
                Opcode::GetGlobal => {
                    let name = self.read_string()?;
                    let value = self
                        .globals
                        .get(name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
                    self.push(value)?;
                }
                Opcode::SetGlobal => {
                    let name = self.read_string()?;
                    // Assignment is an expression: the value stays on the stack
                    let value = self.peek(0)?.clone();
                    match self.globals.get_mut(name) {
                        Some(slot) => *slot = value,
                        None => return Err(RuntimeError::UndefinedVariable(name.to_string()).into()),
                    }
                }
                Opcode::GetLocal => {
                    let slot = self.local_slot()?;
                    let value = self.stack[slot].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let slot = self.local_slot()?;
                    let value = self.peek(0)?.clone();
                    self.stack[slot] = value;
                }
                Opcode::JumpIfFalse => {
                    let offset = self.read_u16()?;
                    if self.peek(0)?.is_falsey() {
                        self.frame()?.ip += offset as usize;
                    }
                }
                Opcode::Jump => {
                    let offset = self.read_u16()?;
                    self.frame()?.ip += offset as usize;
                }
                Opcode::Loop => {
                    let offset = self.read_u16()?;
                    let frame = self.frame()?;
                    frame.ip = frame.ip.checked_sub(offset as usize).ok_or(
                        RuntimeError::InvalidInstructionPointer {
                            pointer: frame.ip,
                            chunk_length: frame.chunk.len(),
                        },
                    )?;
                }
                Opcode::Call => {
                    let name = self.read_string()?;
                    self.call(name)?;
                }
            }
        }

        Ok(())
    }

    fn call(&mut self, name: &StringValue) -> VMResult<()> {
        let program = self.program;
        let chunk = program
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;
        let arity = chunk.arity() as usize;
        if self.stack.len() < arity {
            return Err(RuntimeError::ArityMismatch {
                name: name.to_string(),
                expected: arity,
                available: self.stack.len(),
            }
            .into());
        }
        // The arguments become the callee's first local slots
        let base = self.stack.len() - arity;
        trace!("Calling {name} with base {base}");
        self.frames
            .try_push(CallFrame::new(chunk, base))
            .map_err(|_| RuntimeError::CallDepthExceeded.into())
    }

    /// Pops the current frame and hands `result` to the caller. Returns true
    /// once the main frame itself has returned.
    fn return_from_call(&mut self, result: Value) -> VMResult<bool> {
        let frame = self
            .frames
            .pop()
            .ok_or(IncorrectInvariantError::NoActiveFrame)?;
        if self.frames.is_empty() {
            return Ok(true);
        }
        trace!("Returning {result} from {}", frame.chunk.name());
        self.stack.truncate(frame.base);
        self.push(result)?;
        Ok(false)
    }

    fn print_value(&mut self, value: Value) -> VMResult<()> {
        if let Err(e) = writeln!(self.write, "{}", value) {
            error!("Error writing output value: {e}")
        }
        Ok(())
    }

    fn frame(&mut self) -> VMResult<&mut CallFrame<'p>> {
        self.frames
            .last_mut()
            .ok_or_else(|| IncorrectInvariantError::NoActiveFrame.into())
    }

    fn read_byte(&mut self) -> VMResult<u8> {
        let frame = self.frame()?;
        let byte = frame
            .chunk
            .get(frame.ip)
            .copied()
            .ok_or(RuntimeError::InvalidInstructionPointer {
                pointer: frame.ip,
                chunk_length: frame.chunk.len(),
            })?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> VMResult<u16> {
        let high = self.read_byte()?;
        let low = self.read_byte()?;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn read_constant(&mut self) -> VMResult<&'p Value> {
        let byte = self.read_byte()?;
        let chunk = self.frame()?.chunk;
        let constant = chunk
            .get_constant(byte)
            .ok_or(IncorrectInvariantError::InvalidConstant { index: byte })?;
        Ok(constant)
    }

    fn read_string(&mut self) -> VMResult<&'p StringValue> {
        self.read_constant()?
            .as_string()
            .ok_or_else(|| IncorrectInvariantError::InvalidTypes.into())
    }

    /// Absolute stack index of the local slot operand that follows.
    fn local_slot(&mut self) -> VMResult<usize> {
        let slot = self.read_byte()?;
        let index = self.frame()?.base + slot as usize;
        if index < self.stack.len() {
            Ok(index)
        } else {
            Err(IncorrectInvariantError::InvalidLocal { slot }.into())
        }
    }

    fn push(&mut self, value: Value) -> VMResult<()> {
        self.stack
            .try_push(value)
            .map_err(|_| RuntimeError::StackOverflow.into())
    }

    fn pop(&mut self) -> VMResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| IncorrectInvariantError::StackUnderflow.into())
    }

    fn peek(&self, distance: usize) -> VMResult<&Value> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|index| self.stack.get(index))
            .ok_or_else(|| IncorrectInvariantError::StackUnderflow.into())
    }

    fn binary_op<T>(
        &mut self,
        operation: &'static str,
        f: impl Fn(f64, f64) -> T,
        v: fn(T) -> Value,
    ) -> VMResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;

        let res = match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => v(f(a, b)),
            _ => {
                return Err(RuntimeError::InvalidOperands {
                    operation,
                    expected: "numbers",
                    left: a.type_name(),
                    right: b.type_name(),
                }
                .into())
            }
        };
        self.push(res)
    }
}

/// A failed run, with the line and function that were executing.
#[derive(Error, Debug, Clone)]
#[error("{kind}\n[line {line}] in {function}")]
pub struct VMError {
    pub kind: VMErrorKind,
    pub line: usize,
    pub function: String,
}

#[derive(Error, Debug, Clone)]
pub enum VMErrorKind {
    #[error("Runtime error (invalid bytecode): {0}")]
    IncorrectInvariantError(#[from] IncorrectInvariantError),
    #[error("Runtime error: {0}")]
    RuntimeError(#[from] RuntimeError),
}

#[derive(Error, Debug, Clone)]
pub enum IncorrectInvariantError {
    #[error("Invalid opcode: {0}.")]
    InvalidOpcode(#[from] TryFromPrimitiveError<Opcode>),
    #[error("Invalid constant index {index}.")]
    InvalidConstant { index: u8 },
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Name operand is not a string.")]
    InvalidTypes,
    #[error("Invalid local slot {slot}.")]
    InvalidLocal { slot: u8 },
    #[error("No active call frame.")]
    NoActiveFrame,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Instruction pointer {pointer} is outside the chunk of length {chunk_length}.")]
    InvalidInstructionPointer { pointer: usize, chunk_length: usize },
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Call depth exceeded.")]
    CallDepthExceeded,
    #[error("Operands must be {expected}. '{operation}' got {left} and {right}.")]
    InvalidOperands {
        operation: &'static str,
        expected: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Operand must be a number. '{operation}' got {operand}.")]
    InvalidOperand {
        operation: &'static str,
        operand: &'static str,
    },
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Undefined function '{0}'.")]
    UndefinedFunction(String),
    #[error("Function '{name}' takes {expected} arguments but only {available} values are on the stack.")]
    ArityMismatch {
        name: String,
        expected: usize,
        available: usize,
    },
}
