use crate::chunk::{Chunk, ChunkError, Opcode};
use crate::scanner::{ScanError, Scanner, Token, TokenKind};
use crate::table::Table;
use crate::value::{StringValue, Value};
use arrayvec::ArrayVec;
use log::{debug, trace};
use std::fmt::{Display, Formatter, Write};
use std::num::NonZeroUsize;
use thiserror::Error;

type CompileResult<A> = Result<A, CompileErrors>;

const MAX_LOCALS: usize = 256;
const MAX_ARGUMENTS: usize = 255;
// Statements and subexpressions together
const MAX_NESTING: usize = 256;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Ord, Eq)]
enum BindingPower {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl BindingPower {
    fn next(&self) -> Self {
        use BindingPower::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

/// Output of a successful compilation: the top-level chunk plus one chunk
/// per declared function, keyed by function name.
#[derive(Debug)]
pub struct Program {
    pub main: Chunk,
    pub functions: Table<Chunk>,
}

impl Program {
    pub fn disassemble(&self) -> String {
        let mut result = self.main.disassemble();
        for (_, chunk) in self.functions.iter() {
            writeln!(result).unwrap();
            result.push_str(&chunk.disassemble());
        }
        result
    }
}

pub fn compile(source: &str) -> CompileResult<Program> {
    let mut compiler = Compiler::new(source);
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_opcode(Opcode::Return);
    compiler.check_calls();

    if !compiler.errors.is_empty() {
        return Err(compiler.errors);
    }

    let Compiler {
        function,
        functions,
        ..
    } = compiler;
    debug!("Emitting chunk:\n{:?}", &function.chunk);
    Ok(Program {
        main: function.chunk,
        functions,
    })
}

struct Compiler<'a> {
    scanner: Scanner<'a>,
    current: Token<'a>,
    previous: Token<'a>,
    errors: CompileErrors,
    function: FunctionState<'a>,
    functions: Table<Chunk>,
    calls: Vec<CallSite>,
    nesting: usize,
}

/// Per-function compilation state. Only one level of nesting exists: the
/// script and, while a `fun` body is being compiled, that function.
struct FunctionState<'a> {
    chunk: Chunk,
    kind: FunctionKind,
    locals: ArrayVec<Local<'a>, MAX_LOCALS>,
    scope_depth: usize,
}

impl<'a> FunctionState<'a> {
    fn new(chunk: Chunk, kind: FunctionKind) -> Self {
        Self {
            chunk,
            kind,
            locals: ArrayVec::new(),
            scope_depth: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

#[derive(Debug)]
struct Local<'a> {
    name: &'a str,
    // None until the initializer has been compiled
    depth: Option<NonZeroUsize>,
}

/// A call whose callee is checked once every function has been declared.
#[derive(Debug)]
struct CallSite {
    name: StringValue,
    argument_count: u8,
    location: Location,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            scanner: Scanner::new(source),
            current: Token::synthetic(1),
            previous: Token::synthetic(1),
            errors: CompileErrors::default(),
            function: FunctionState::new(Chunk::new("main".to_string(), 0), FunctionKind::Script),
            functions: Table::new(),
            calls: Vec::new(),
            nesting: 0,
        }
    }

    fn advance(&mut self) {
        let next = self.next_valid_token();
        self.previous = std::mem::replace(&mut self.current, next);
    }

    /// Scan errors are recorded and their tokens skipped.
    fn next_valid_token(&mut self) -> Token<'a> {
        loop {
            let token = self.scanner.scan_token();
            if let Some(e) = &token.error {
                self.errors.push(e.clone().into());
                continue;
            }
            return token;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &'static str) -> CompileResult<()> {
        if self.match_token(kind) {
            Ok(())
        } else {
            Err(ParseError::Expected(self.at_current(), expected).into())
        }
    }

    fn at_current(&self) -> Location {
        Location::of(&self.current)
    }

    fn at_previous(&self) -> Location {
        Location::of(&self.previous)
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.function.chunk
    }

    fn emit_opcode(&mut self, opcode: Opcode) {
        let line = self.previous.line;
        self.chunk().add_opcode(opcode, line)
    }

    fn emit_opcode_and_operand(&mut self, opcode: Opcode, operand: u8) {
        let line = self.previous.line;
        self.chunk().add_opcode_and_operand(opcode, operand, line)
    }

    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        let line = self.previous.line;
        self.chunk().add_dummy_jump(opcode, line)
    }

    fn patch_jump(&mut self, offset: usize) -> CompileResult<()> {
        self.function
            .chunk
            .patch_jump(offset)
            .map_err(|e| ParseError::Chunk(Location::of(&self.previous), e).into())
    }

    fn emit_loop(&mut self, loop_start: usize) -> CompileResult<()> {
        let line = self.previous.line;
        self.function
            .chunk
            .emit_loop(loop_start, line)
            .map_err(|e| ParseError::Chunk(Location::of(&self.previous), e).into())
    }

    fn make_constant(&mut self, value: Value) -> CompileResult<u8> {
        self.function
            .chunk
            .add_constant(value)
            .ok_or_else(|| ParseError::TooManyConstants(Location::of(&self.previous)).into())
    }

    fn emit_constant(&mut self, value: Value) -> CompileResult<()> {
        let constant = self.make_constant(value)?;
        self.emit_opcode_and_operand(Opcode::Constant, constant);
        Ok(())
    }

    fn declaration(&mut self) {
        let result = if self.match_token(TokenKind::Fun) {
            self.fun_declaration()
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration()
        } else {
            self.statement()
        };
        if let Err(e) = result {
            self.synchronize(e);
        }
    }

    fn synchronize(&mut self, e: CompileErrors) {
        trace!("Synchronizing after {} error(s)", e.errors().len());
        self.errors.extend(e);
        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    fn fun_declaration(&mut self) -> CompileResult<()> {
        if self.function.kind != FunctionKind::Script || self.function.scope_depth > 0 {
            // Keep compiling the body so the rest of the source still parses
            self.errors
                .push(ParseError::NestedFunction(self.at_previous()).into());
        }
        self.consume(TokenKind::Identifier, "function name")?;
        let location = self.at_previous();
        let name = StringValue::new(self.previous.lexeme);
        if self.functions.contains_key(&name) {
            self.errors
                .push(ParseError::DuplicateFunction(location, name.to_string()).into());
        }

        let state = FunctionState::new(Chunk::new(name.to_string(), 0), FunctionKind::Function);
        let enclosing = std::mem::replace(&mut self.function, state);
        let result = self.function_body();
        let FunctionState { chunk, .. } = std::mem::replace(&mut self.function, enclosing);
        result?;

        debug!("Emitting chunk:\n{:?}", &chunk);
        self.functions.insert(name, chunk);
        Ok(())
    }

    fn function_body(&mut self) -> CompileResult<()> {
        // Parameters live in the function's outermost scope
        self.function.scope_depth = 1;
        self.consume(TokenKind::LeftParen, "'(' after function name")?;
        let mut arity = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                if arity == MAX_ARGUMENTS {
                    return Err(ParseError::TooManyParameters(self.at_current()).into());
                }
                arity += 1;
                let global = self.parse_variable("parameter name")?;
                self.define_variable(global);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.function.chunk.set_arity(arity as u8);
        self.consume(TokenKind::RightParen, "')' after parameters")?;
        self.consume(TokenKind::LeftBrace, "'{' before function body")?;
        self.block()?;
        // Returning truncates the frame, so the body's locals need no pops
        self.emit_opcode(Opcode::Return);
        Ok(())
    }

    fn var_declaration(&mut self) -> CompileResult<()> {
        let global = self.parse_variable("variable name")?;
        if self.match_token(TokenKind::Equal) {
            self.expression()?;
        } else {
            self.emit_opcode(Opcode::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "';' after variable declaration",
        )?;
        self.define_variable(global);
        Ok(())
    }

    /// Returns the name's constant index for globals, `None` for locals.
    fn parse_variable(&mut self, expected: &'static str) -> CompileResult<Option<u8>> {
        self.consume(TokenKind::Identifier, expected)?;
        let name = self.previous.lexeme;
        self.declare_variable(name)?;
        if self.function.scope_depth > 0 {
            Ok(None)
        } else {
            self.identifier_constant(name).map(Some)
        }
    }

    fn identifier_constant(&mut self, name: &str) -> CompileResult<u8> {
        self.make_constant(Value::String(StringValue::new(name)))
    }

    fn declare_variable(&mut self, name: &'a str) -> CompileResult<()> {
        let scope_depth = match NonZeroUsize::new(self.function.scope_depth) {
            Some(depth) => depth,
            None => return Ok(()),
        };
        for local in self.function.locals.iter().rev() {
            if matches!(local.depth, Some(depth) if depth < scope_depth) {
                break;
            }
            if local.name == name {
                return Err(ParseError::DuplicateLocal(self.at_previous()).into());
            }
        }
        self.function
            .locals
            .try_push(Local { name, depth: None })
            .map_err(|_| ParseError::TooManyLocals(self.at_previous()).into())
    }

    fn define_variable(&mut self, global: Option<u8>) {
        if let Some(idx) = global {
            self.emit_opcode_and_operand(Opcode::DefineGlobal, idx);
        } else {
            // The initializer's value already sits in the local's slot
            let depth = NonZeroUsize::new(self.function.scope_depth);
            if let Some(local) = self.function.locals.last_mut() {
                local.depth = depth;
            }
        }
    }

    fn statement(&mut self) -> CompileResult<()> {
        self.nested(Self::statement_by_kind)
    }

    fn statement_by_kind(&mut self) -> CompileResult<()> {
        match self.current.kind {
            TokenKind::Print => {
                self.advance();
                self.print_statement()
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.scoped(|s| s.block())
            }
            TokenKind::If => {
                self.advance();
                self.if_statement()
            }
            TokenKind::While => {
                self.advance();
                self.while_statement()
            }
            TokenKind::For => {
                self.advance();
                self.for_statement()
            }
            TokenKind::Return => {
                self.advance();
                self.return_statement()
            }
            _ => self.expression_statement(),
        }
    }

    /// Runs `f` one level deeper, failing instead of recursing past
    /// `MAX_NESTING`.
    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<()>) -> CompileResult<()> {
        if self.nesting == MAX_NESTING {
            return Err(ParseError::TooDeeplyNested(self.at_current()).into());
        }
        self.nesting += 1;
        let res = f(self);
        self.nesting -= 1;
        res
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<()>) -> CompileResult<()> {
        self.function.scope_depth += 1;
        let res = f(self);
        self.function.scope_depth -= 1;
        while let Some(last) = self.function.locals.last() {
            if last.depth.map_or(true, |d| d.get() > self.function.scope_depth) {
                self.emit_opcode(Opcode::Pop);
                let _ = self.function.locals.pop();
            } else {
                break;
            }
        }
        res
    }

    fn block(&mut self) -> CompileResult<()> {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "'}' after block")
    }

    fn print_statement(&mut self) -> CompileResult<()> {
        self.expression()?;
        self.consume(TokenKind::Semicolon, "';' after value")?;
        self.emit_opcode(Opcode::Print);
        Ok(())
    }

    fn expression_statement(&mut self) -> CompileResult<()> {
        self.expression()?;
        self.consume(TokenKind::Semicolon, "';' after expression")?;
        self.emit_opcode(Opcode::Pop);
        Ok(())
    }

    fn return_statement(&mut self) -> CompileResult<()> {
        if self.function.kind == FunctionKind::Script {
            return Err(ParseError::ReturnAtTopLevel(self.at_previous()).into());
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_opcode(Opcode::Return);
        } else {
            self.expression()?;
            self.consume(TokenKind::Semicolon, "';' after return value")?;
            self.emit_opcode(Opcode::ReturnValue);
        }
        Ok(())
    }

    fn if_statement(&mut self) -> CompileResult<()> {
        self.consume(TokenKind::LeftParen, "'(' after 'if'")?;
        self.expression()?;
        self.consume(TokenKind::RightParen, "')' after condition")?;

        let then_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_opcode(Opcode::Pop);
        self.statement()?;
        let else_jump = self.emit_jump(Opcode::Jump);

        self.patch_jump(then_jump)?;
        self.emit_opcode(Opcode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement()?;
        }
        self.patch_jump(else_jump)
    }

    fn while_statement(&mut self) -> CompileResult<()> {
        let loop_start = self.function.chunk.get_loop_start();
        self.consume(TokenKind::LeftParen, "'(' after 'while'")?;
        self.expression()?;
        self.consume(TokenKind::RightParen, "')' after condition")?;

        let exit_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_opcode(Opcode::Pop);
        self.statement()?;
        self.emit_loop(loop_start)?;

        self.patch_jump(exit_jump)?;
        self.emit_opcode(Opcode::Pop);
        Ok(())
    }

    fn for_statement(&mut self) -> CompileResult<()> {
        self.scoped(|s| {
            s.consume(TokenKind::LeftParen, "'(' after 'for'")?;
            if s.match_token(TokenKind::Semicolon) {
                // No initializer
            } else if s.match_token(TokenKind::Var) {
                s.var_declaration()?;
            } else {
                s.expression_statement()?;
            }

            let mut loop_start = s.function.chunk.get_loop_start();

            let exit_jump = if s.match_token(TokenKind::Semicolon) {
                None
            } else {
                s.expression()?;
                s.consume(TokenKind::Semicolon, "';' after loop condition")?;
                let exit_jump = s.emit_jump(Opcode::JumpIfFalse);
                s.emit_opcode(Opcode::Pop);
                Some(exit_jump)
            };

            if !s.match_token(TokenKind::RightParen) {
                // The increment runs after the body: jump over it now, loop
                // back to it from the end of the body.
                let body_jump = s.emit_jump(Opcode::Jump);
                let increment_start = s.function.chunk.get_loop_start();
                s.expression()?;
                s.emit_opcode(Opcode::Pop);
                s.consume(TokenKind::RightParen, "')' after for clauses")?;
                s.emit_loop(loop_start)?;
                loop_start = increment_start;
                s.patch_jump(body_jump)?;
            }

            s.statement()?;
            s.emit_loop(loop_start)?;

            if let Some(exit_jump) = exit_jump {
                s.patch_jump(exit_jump)?;
                s.emit_opcode(Opcode::Pop);
            }
            Ok(())
        })
    }

    fn expression(&mut self) -> CompileResult<()> {
        self.parse_precedence(BindingPower::Assignment)
    }

    fn parse_precedence(&mut self, precedence: BindingPower) -> CompileResult<()> {
        self.nested(|s| s.parse_operators(precedence))
    }

    fn parse_operators(&mut self, precedence: BindingPower) -> CompileResult<()> {
        self.advance();
        let prefix_rule = match get_rule(self.previous.kind).prefix {
            Some(rule) => rule,
            None => return Err(ParseError::Expected(self.at_previous(), "expression").into()),
        };
        let can_assign = precedence <= BindingPower::Assignment;
        prefix_rule(self, can_assign)?;

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            match get_rule(self.previous.kind).infix {
                Some(infix_rule) => infix_rule(self, can_assign)?,
                None => break,
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            return Err(ParseError::InvalidAssignmentTarget(self.at_previous()).into());
        }
        Ok(())
    }

    fn parse_grouping(&mut self, _can_assign: bool) -> CompileResult<()> {
        self.expression()?;
        self.consume(TokenKind::RightParen, "')' after expression")
    }

    fn parse_call(&mut self, _can_assign: bool) -> CompileResult<()> {
        Err(ParseError::InvalidCallTarget(self.at_previous()).into())
    }

    fn parse_unary(&mut self, _can_assign: bool) -> CompileResult<()> {
        let operator = self.previous.kind;
        let line = self.previous.line;
        self.parse_precedence(BindingPower::Unary)?;
        match operator {
            TokenKind::Minus => self.chunk().add_opcode(Opcode::Negate, line),
            TokenKind::Bang => self.chunk().add_opcode(Opcode::Not, line),
            _ => unreachable!("Unexpected unary token, got {operator:?}"),
        }
        Ok(())
    }

    fn parse_binary(&mut self, _can_assign: bool) -> CompileResult<()> {
        let operator = self.previous.kind;
        let line = self.previous.line;
        self.parse_precedence(get_rule(operator).precedence.next())?;
        let chunk = self.chunk();
        match operator {
            TokenKind::Plus => chunk.add_opcode(Opcode::Add, line),
            TokenKind::Minus => chunk.add_opcode(Opcode::Subtract, line),
            TokenKind::Asterisk => chunk.add_opcode(Opcode::Multiply, line),
            TokenKind::Slash => chunk.add_opcode(Opcode::Divide, line),
            TokenKind::EqualEqual => chunk.add_opcode(Opcode::Equal, line),
            TokenKind::BangEqual => {
                chunk.add_opcode(Opcode::Equal, line);
                chunk.add_opcode(Opcode::Not, line);
            }
            TokenKind::Greater => chunk.add_opcode(Opcode::Greater, line),
            TokenKind::GreaterEqual => {
                chunk.add_opcode(Opcode::Less, line);
                chunk.add_opcode(Opcode::Not, line);
            }
            TokenKind::Less => chunk.add_opcode(Opcode::Less, line),
            TokenKind::LessEqual => {
                chunk.add_opcode(Opcode::Greater, line);
                chunk.add_opcode(Opcode::Not, line);
            }
            _ => unreachable!("Unexpected binary token, got {operator:?}"),
        }
        Ok(())
    }

    fn parse_number(&mut self, _can_assign: bool) -> CompileResult<()> {
        let number: f64 = self
            .previous
            .lexeme
            .parse()
            .map_err(|_| CompileErrors::from(ParseError::InvalidNumber(self.at_previous())))?;
        self.emit_constant(Value::Number(number))
    }

    fn parse_string(&mut self, _can_assign: bool) -> CompileResult<()> {
        let lexeme = self.previous.lexeme;
        // Strip the quotes
        let contents = &lexeme[1..lexeme.len() - 1];
        self.emit_constant(Value::String(StringValue::new(contents)))
    }

    fn parse_literal(&mut self, _can_assign: bool) -> CompileResult<()> {
        match self.previous.kind {
            TokenKind::True => self.emit_opcode(Opcode::True),
            TokenKind::False => self.emit_opcode(Opcode::False),
            TokenKind::Nil => self.emit_opcode(Opcode::Nil),
            kind => unreachable!("Unexpected literal token, got {kind:?}"),
        }
        Ok(())
    }

    fn parse_identifier(&mut self, can_assign: bool) -> CompileResult<()> {
        let name = self.previous.lexeme;
        if self.check(TokenKind::LeftParen) {
            self.call(name)
        } else {
            self.named_variable(name, can_assign)
        }
    }

    fn named_variable(&mut self, name: &'a str, can_assign: bool) -> CompileResult<()> {
        let (get_op, set_op, idx) = if let Some(slot) = self.resolve_local(name) {
            (Opcode::GetLocal, Opcode::SetLocal, slot)
        } else {
            let idx = self.identifier_constant(name)?;
            (Opcode::GetGlobal, Opcode::SetGlobal, idx)
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression()?;
            self.emit_opcode_and_operand(set_op, idx);
        } else {
            self.emit_opcode_and_operand(get_op, idx);
        }
        Ok(())
    }

    /// Locals still inside their own initializer are skipped, so
    /// `var a = a;` reads the enclosing `a`.
    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.function
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.depth.is_some() && local.name == name)
            .map(|(slot, _)| slot as u8)
    }

    fn call(&mut self, name: &'a str) -> CompileResult<()> {
        let location = self.at_previous();
        self.consume(TokenKind::LeftParen, "'(' before arguments")?;
        let argument_count = self.argument_list()?;
        let name = StringValue::new(name);
        let idx = self.make_constant(Value::String(name.clone()))?;
        self.emit_opcode_and_operand(Opcode::Call, idx);
        self.calls.push(CallSite {
            name,
            argument_count,
            location,
        });
        Ok(())
    }

    fn argument_list(&mut self) -> CompileResult<u8> {
        let mut argument_count = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression()?;
                if argument_count == MAX_ARGUMENTS {
                    return Err(ParseError::TooManyArguments(self.at_previous()).into());
                }
                argument_count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after arguments")?;
        Ok(argument_count as u8)
    }

    fn parse_and(&mut self, _can_assign: bool) -> CompileResult<()> {
        let end_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_opcode(Opcode::Pop);
        self.parse_precedence(BindingPower::And)?;
        self.patch_jump(end_jump)
    }

    fn parse_or(&mut self, _can_assign: bool) -> CompileResult<()> {
        let else_jump = self.emit_jump(Opcode::JumpIfFalse);
        let end_jump = self.emit_jump(Opcode::Jump);
        self.patch_jump(else_jump)?;
        self.emit_opcode(Opcode::Pop);
        self.parse_precedence(BindingPower::Or)?;
        self.patch_jump(end_jump)
    }

    fn check_calls(&mut self) {
        for call in self.calls.drain(..) {
            match self.functions.get(&call.name) {
                None => self.errors.push(
                    ParseError::UndefinedFunction(call.location, call.name.to_string()).into(),
                ),
                Some(chunk) if chunk.arity() != call.argument_count => {
                    self.errors.push(
                        ParseError::ArityMismatch {
                            location: call.location,
                            expected: chunk.arity(),
                            got: call.argument_count,
                        }
                        .into(),
                    )
                }
                Some(_) => {}
            }
        }
    }
}

type ParseFn<'a> = fn(&mut Compiler<'a>, bool) -> CompileResult<()>;

struct ParseRule<'a> {
    prefix: Option<ParseFn<'a>>,
    infix: Option<ParseFn<'a>>,
    precedence: BindingPower,
}

impl<'a> ParseRule<'a> {
    fn new(
        prefix: Option<ParseFn<'a>>,
        infix: Option<ParseFn<'a>>,
        precedence: BindingPower,
    ) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

fn get_rule<'a>(kind: TokenKind) -> ParseRule<'a> {
    use BindingPower as Bp;
    use TokenKind::*;
    match kind {
        LeftParen => ParseRule::new(
            Some(Compiler::parse_grouping),
            Some(Compiler::parse_call),
            Bp::Call,
        ),
        Minus => ParseRule::new(
            Some(Compiler::parse_unary),
            Some(Compiler::parse_binary),
            Bp::Term,
        ),
        Plus => ParseRule::new(None, Some(Compiler::parse_binary), Bp::Term),
        Slash | Asterisk => ParseRule::new(None, Some(Compiler::parse_binary), Bp::Factor),
        Bang => ParseRule::new(Some(Compiler::parse_unary), None, Bp::None),
        BangEqual | EqualEqual => ParseRule::new(None, Some(Compiler::parse_binary), Bp::Equality),
        Greater | GreaterEqual | Less | LessEqual => {
            ParseRule::new(None, Some(Compiler::parse_binary), Bp::Comparison)
        }
        Identifier => ParseRule::new(Some(Compiler::parse_identifier), None, Bp::None),
        String => ParseRule::new(Some(Compiler::parse_string), None, Bp::None),
        Number => ParseRule::new(Some(Compiler::parse_number), None, Bp::None),
        And => ParseRule::new(None, Some(Compiler::parse_and), Bp::And),
        Or => ParseRule::new(None, Some(Compiler::parse_or), Bp::Or),
        True | False | Nil => ParseRule::new(Some(Compiler::parse_literal), None, Bp::None),
        RightParen | LeftBrace | RightBrace | Comma | Dot | Semicolon | Equal | Class | Else
        | For | Fun | If | Print | Return | Super | This | Var | While | Error | Eof => {
            ParseRule::new(None, None, Bp::None)
        }
    }
}

/// Where an error was found: the offending lexeme, or the end of input.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub line: usize,
    pub lexeme: Option<String>,
}

impl Location {
    fn of(token: &Token) -> Self {
        Self {
            line: token.line,
            lexeme: (token.kind != TokenKind::Eof).then(|| token.lexeme.to_string()),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.lexeme {
            Some(lexeme) => write!(f, "[line {}] Error at '{}'", self.line, lexeme),
            None => write!(f, "[line {}] Error at end", self.line),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub struct CompileErrors {
    errors: Vec<CompileError>,
}

impl Display for CompileErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} compilation error{}",
            self.errors.len(),
            if self.errors.len() == 1 { "" } else { "s" }
        )?;
        for e in self.errors.iter() {
            writeln!(f, "{e}")?;
        }
        Ok(())
    }
}

impl CompileErrors {
    pub fn new() -> Self {
        Self {
            errors: Vec::with_capacity(4),
        }
    }

    fn push(&mut self, e: CompileError) {
        self.errors.push(e)
    }

    fn extend(&mut self, other: CompileErrors) {
        self.errors.extend(other.errors)
    }

    fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }
}

impl Default for CompileErrors {
    fn default() -> Self {
        Self::new()
    }
}

impl From<CompileError> for CompileErrors {
    fn from(value: CompileError) -> Self {
        let mut this = CompileErrors::new();
        this.push(value);
        this
    }
}

impl From<ParseError> for CompileErrors {
    fn from(value: ParseError) -> Self {
        CompileError::from(value).into()
    }
}

impl From<ScanError> for CompileErrors {
    fn from(value: ScanError) -> Self {
        CompileError::from(value).into()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    ScanError(#[from] ScanError),
    #[error(transparent)]
    ParseError(#[from] ParseError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{0}: Expect {1}.")]
    Expected(Location, &'static str),
    #[error("{0}: Too many constants in one chunk.")]
    TooManyConstants(Location),
    #[error("{0}: Too many local variables in function.")]
    TooManyLocals(Location),
    #[error("{0}: Can't have more than 255 arguments.")]
    TooManyArguments(Location),
    #[error("{0}: Can't have more than 255 parameters.")]
    TooManyParameters(Location),
    #[error("{0}: Invalid assignment target.")]
    InvalidAssignmentTarget(Location),
    #[error("{0}: Already a variable with this name in this scope.")]
    DuplicateLocal(Location),
    #[error("{0}: Invalid number literal.")]
    InvalidNumber(Location),
    #[error("{0}: {1}")]
    Chunk(Location, ChunkError),
    #[error("{0}: Can't return from top-level code.")]
    ReturnAtTopLevel(Location),
    #[error("{0}: Functions can only be declared at top level.")]
    NestedFunction(Location),
    #[error("{0}: Already a function named '{1}'.")]
    DuplicateFunction(Location, String),
    #[error("{0}: Undefined function '{1}'.")]
    UndefinedFunction(Location, String),
    #[error("{location}: Expected {expected} arguments but got {got}.")]
    ArityMismatch {
        location: Location,
        expected: u8,
        got: u8,
    },
    #[error("{0}: Can only call functions by name.")]
    InvalidCallTarget(Location),
    #[error("{0}: Too much nesting.")]
    TooDeeplyNested(Location),
}
