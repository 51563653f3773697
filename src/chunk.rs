use crate::value::Value;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::Write;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Return,
    ReturnValue,
    Constant,
    Nil,
    True,
    False,
    Not,
    Equal,
    Greater,
    Less,
    Negate,
    Add,
    Subtract,
    Multiply,
    Divide,
    Print,
    Pop,
    DefineGlobal,
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    JumpIfFalse,
    Jump,
    Loop,
    Call,
}

impl Opcode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Encoded size in bytes, opcode included.
    pub fn width(self) -> usize {
        use Opcode::*;
        match self {
            Constant | DefineGlobal | GetGlobal | SetGlobal | GetLocal | SetLocal | Call => 2,
            JumpIfFalse | Jump | Loop => 3,
            _ => 1,
        }
    }
}

pub struct Chunk {
    code: Vec<u8>,
    constants: Vec<Value>,
    name: String,
    arity: u8,
    lines: Vec<usize>,
}

impl Chunk {
    pub fn new(name: String, arity: u8) -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            name,
            arity,
            lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> u8 {
        self.arity
    }

    pub fn set_arity(&mut self, arity: u8) {
        self.arity = arity;
    }

    pub fn line_at(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    fn add_byte(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn add_opcode(&mut self, opcode: Opcode, line: usize) {
        self.add_byte(opcode.as_byte(), line)
    }

    pub fn add_opcode_and_operand(&mut self, opcode: Opcode, operand: u8, line: usize) {
        self.add_byte(opcode.as_byte(), line);
        self.add_byte(operand, line);
    }

    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        let existing_index = self
            .constants
            .iter()
            .position(|c| *c == value)
            .map(|idx| idx as u8);
        if existing_index.is_some() {
            existing_index
        } else if self.constants.len() < 256 {
            self.constants.push(value);
            Some((self.constants.len() - 1) as u8)
        } else {
            None
        }
    }

    pub fn get_constant(&self, index: u8) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    /// Offset the next `while` or `for` loop body jumps back to.
    pub fn get_loop_start(&self) -> usize {
        self.code.len()
    }

    /// Emits `opcode` with a placeholder 16-bit operand and returns the
    /// operand's offset for `patch_jump`.
    pub fn add_dummy_jump(&mut self, opcode: Opcode, line: usize) -> usize {
        self.add_opcode(opcode, line);
        self.add_byte(0xff, line);
        self.add_byte(0xff, line);
        self.code.len() - 2
    }

    /// Points the jump whose operand sits at `offset` to the current end of
    /// the chunk.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), ChunkError> {
        let jump = self.code.len() - offset - 2;
        let jump = u16::try_from(jump).map_err(|_| ChunkError::JumpTooLarge(jump))?;
        let [high, low] = jump.to_be_bytes();
        self.code[offset] = high;
        self.code[offset + 1] = low;
        Ok(())
    }

    pub fn emit_loop(&mut self, loop_start: usize, line: usize) -> Result<(), ChunkError> {
        self.add_opcode(Opcode::Loop, line);
        let offset = self.code.len() - loop_start + 2;
        let offset = u16::try_from(offset).map_err(|_| ChunkError::LoopTooLarge(offset))?;
        let [high, low] = offset.to_be_bytes();
        self.add_byte(high, line);
        self.add_byte(low, line);
        Ok(())
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let high = *self.code.get(offset)?;
        let low = *self.code.get(offset + 1)?;
        Some(u16::from_be_bytes([high, low]))
    }

    pub fn disassemble(&self) -> String {
        let mut result = String::new();
        let mut previous_line: Option<usize> = None;

        writeln!(result, "== {} ==", self.name).unwrap();

        let mut offset = 0;
        while offset < self.code.len() {
            let line = self.lines[offset];
            write!(result, "0x{offset:04x} ").unwrap();
            if previous_line == Some(line) {
                write!(result, "   | ").unwrap();
            } else {
                write!(result, "{line:04} ").unwrap();
                previous_line = Some(line);
            }
            offset = self.write_single_instruction(&mut result, offset);
            writeln!(result).unwrap();
        }

        result
    }

    pub fn disassemble_instruction_at(&self, offset: usize) -> Option<String> {
        let line = self.line_at(offset)?;
        let mut result = String::new();
        write!(result, "0x{offset:04x} {line:04} ").unwrap();
        self.write_single_instruction(&mut result, offset);
        Some(result)
    }

    /// Writes the instruction at `offset` and returns the offset of the next one.
    fn write_single_instruction(&self, result: &mut String, offset: usize) -> usize {
        let byte = self.code[offset];
        let opcode = match Opcode::try_from(byte) {
            Ok(opcode) => opcode,
            Err(_) => {
                write!(result, "Unknown opcode 0x{byte:02x}").unwrap();
                return offset + 1;
            }
        };
        let operand = self.code.get(offset + 1).copied();
        match opcode {
            Opcode::Constant
            | Opcode::DefineGlobal
            | Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::Call => result.push_str(&self.constant_instruction(opcode, operand)),
            Opcode::GetLocal | Opcode::SetLocal => {
                result.push_str(&byte_instruction(opcode, operand))
            }
            Opcode::JumpIfFalse | Opcode::Jump | Opcode::Loop => {
                result.push_str(&self.jump_instruction(opcode, offset))
            }
            _ => result.push_str(&simple_instruction(opcode)),
        }
        offset + opcode.width()
    }

    fn constant_instruction(&self, opcode: Opcode, operand: Option<u8>) -> String {
        let value = if let Some(idx) = operand {
            if let Some(value) = self.get_constant(idx) {
                format!("{idx} {value}")
            } else {
                format!("(index 0x{idx:02x} unknown)")
            }
        } else {
            "(unknown)".to_string()
        };
        format!("{opcode:?} {value}")
    }

    fn jump_instruction(&self, opcode: Opcode, offset: usize) -> String {
        match self.read_u16(offset + 1) {
            Some(jump) => {
                let next = offset + 3;
                let target = if opcode == Opcode::Loop {
                    next.checked_sub(jump as usize)
                } else {
                    Some(next + jump as usize)
                };
                match target {
                    Some(target) => format!("{opcode:?} 0x{offset:04x} -> 0x{target:04x}"),
                    None => format!("{opcode:?} 0x{offset:04x} -> (invalid)"),
                }
            }
            None => format!("{opcode:?} (unknown)"),
        }
    }
}

fn simple_instruction(opcode: Opcode) -> String {
    format!("{opcode:?}")
}

fn byte_instruction(opcode: Opcode, operand: Option<u8>) -> String {
    let value = if let Some(idx) = operand {
        format!("{idx}")
    } else {
        "(unknown)".to_string()
    };
    format!("{opcode:?} {value}")
}

impl Debug for Chunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.disassemble())?;
        writeln!(f, "Constants:")?;
        for (i, c) in self.constants.iter().enumerate() {
            writeln!(f, "{i:04}: {c:?}")?;
        }
        Ok(())
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.code
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkError {
    #[error("Too much code to jump over ({0} bytes).")]
    JumpTooLarge(usize),
    #[error("Loop body too large ({0} bytes).")]
    LoopTooLarge(usize),
}
