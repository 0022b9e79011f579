use crate::ir::{BinaryFn, Fault, InstructionStream, Number, Opcode, Token};
use thiserror::Error;
use tracing::{debug, trace};

/// Maximum operand stack depth unless configured otherwise
pub const DEFAULT_MAX_STACK_DEPTH: usize = 2048;

/// What the engine accepts as a successful halt
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum HaltMode {
    /// Return the top of the stack, ignoring anything below it
    #[default]
    Lenient,
    /// Require exactly one value to remain on the stack
    Strict,
}

/// Configuration options for the engine
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EngineConfig {
    halt: HaltMode,
    max_stack_depth: usize,
    step_limit: Option<usize>,
    trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            halt: HaltMode::Lenient,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            step_limit: None,
            trace: false,
        }
    }
}

impl EngineConfig {
    /// Returns a configuration that rejects programs leaving more than one value behind
    pub fn strict() -> EngineConfig {
        EngineConfig {
            halt: HaltMode::Strict,
            ..EngineConfig::default()
        }
    }

    /// Returns a configuration that aborts after `steps` executed instructions
    pub fn bounded(steps: usize) -> EngineConfig {
        EngineConfig {
            step_limit: Some(steps),
            ..EngineConfig::default()
        }
    }

    /// Returns a configuration that logs every executed instruction along with the stack
    pub fn debug() -> EngineConfig {
        EngineConfig {
            trace: true,
            ..EngineConfig::default()
        }
    }

    pub fn with_halt(mut self, halt: HaltMode) -> EngineConfig {
        self.halt = halt;
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> EngineConfig {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_step_limit(mut self, steps: Option<usize>) -> EngineConfig {
        self.step_limit = steps;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> EngineConfig {
        self.trace = trace;
        self
    }

    pub fn halt(&self) -> HaltMode {
        self.halt
    }

    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn step_limit(&self) -> Option<usize> {
        self.step_limit
    }

    pub fn trace(&self) -> bool {
        self.trace
    }
}

/// Fieldless discriminant of [`ExecutionError`], handy for matching in callers and tests
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    UnknownOpcode,
    MissingOperand,
    StackUnderflow,
    EmptyResult,
    DivisionByZero,
    ArithmeticOverflow,
    StackOverflow,
    StepLimitExceeded,
    DirtyStack,
}

/// Every way an execution can fail. All of them halt the program.
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum ExecutionError {
    #[error("unknown opcode `{token}` at pc {pc}")]
    UnknownOpcode { pc: usize, token: String },
    #[error("{opcode} at pc {pc} is missing its numeric operand")]
    MissingOperand { pc: usize, opcode: Opcode },
    #[error("stack underflow at pc {pc}: {opcode} needs {needed} value(s), found {found}")]
    StackUnderflow {
        pc: usize,
        opcode: Opcode,
        needed: usize,
        found: usize,
    },
    #[error("program halted with an empty stack")]
    EmptyResult,
    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },
    #[error("arithmetic overflow in {opcode} at pc {pc}")]
    ArithmeticOverflow { pc: usize, opcode: Opcode },
    #[error("stack overflow at pc {pc}, depth is limited to {limit}")]
    StackOverflow { pc: usize, limit: usize },
    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: usize },
    #[error("program halted with {remaining} values on the stack, expected exactly one")]
    DirtyStack { remaining: usize },
}

impl ExecutionError {
    pub(crate) fn throw<T>(self) -> Result<T, ExecutionError> {
        Err(self)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::UnknownOpcode { .. } => ErrorKind::UnknownOpcode,
            ExecutionError::MissingOperand { .. } => ErrorKind::MissingOperand,
            ExecutionError::StackUnderflow { .. } => ErrorKind::StackUnderflow,
            ExecutionError::EmptyResult => ErrorKind::EmptyResult,
            ExecutionError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
            ExecutionError::ArithmeticOverflow { .. } => ErrorKind::ArithmeticOverflow,
            ExecutionError::StackOverflow { .. } => ErrorKind::StackOverflow,
            ExecutionError::StepLimitExceeded { .. } => ErrorKind::StepLimitExceeded,
            ExecutionError::DirtyStack { .. } => ErrorKind::DirtyStack,
        }
    }

    /// Program counter of the instruction that failed, if the failure belongs to one
    pub fn pc(&self) -> Option<usize> {
        match self {
            ExecutionError::UnknownOpcode { pc, .. }
            | ExecutionError::MissingOperand { pc, .. }
            | ExecutionError::StackUnderflow { pc, .. }
            | ExecutionError::DivisionByZero { pc }
            | ExecutionError::ArithmeticOverflow { pc, .. }
            | ExecutionError::StackOverflow { pc, .. } => Some(*pc),
            ExecutionError::EmptyResult
            | ExecutionError::StepLimitExceeded { .. }
            | ExecutionError::DirtyStack { .. } => None,
        }
    }
}

/// The execution engine. It holds nothing but its configuration, so one engine can run any
/// number of streams, from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        Engine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `stream` to completion and returns the value left on top of the stack
    pub fn execute(&self, stream: &InstructionStream) -> Result<Number, ExecutionError> {
        let result = Execution::new(&self.config, stream).run();
        if let Err(err) = &result {
            debug!(error = %err, "execution failed");
        }
        result
    }
}

/// Runs `stream` with the default configuration
///
/// ```
/// use tinystack::{execute, InstructionStream, Opcode};
///
/// let stream = InstructionStream::builder()
///     .push(3)
///     .push(4)
///     .op(Opcode::Add)
///     .push(5)
///     .op(Opcode::Minus)
///     .build();
/// assert_eq!(execute(&stream), Ok(2));
/// ```
pub fn execute(stream: &InstructionStream) -> Result<Number, ExecutionError> {
    Engine::default().execute(stream)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Running,
    Halted,
}

/// Per-call machine state. Lives exactly as long as one `execute` call.
struct Execution<'a> {
    config: &'a EngineConfig,
    stream: &'a InstructionStream,
    stack: Vec<Number>,
    program_counter: usize,
    steps: usize,
    state: State,
}

impl<'a> Execution<'a> {
    fn new(config: &'a EngineConfig, stream: &'a InstructionStream) -> Execution<'a> {
        Execution {
            config,
            stream,
            stack: vec![],
            program_counter: 0,
            steps: 0,
            state: State::Running,
        }
    }

    fn next_instruction(&mut self) -> Option<usize> {
        if self.state == State::Running && self.program_counter < self.stream.len() {
            return Some(self.program_counter);
        }
        self.state = State::Halted;

        None
    }

    fn run(mut self) -> Result<Number, ExecutionError> {
        while let Some(pc) = self.next_instruction() {
            if let Err(err) = self.exec(pc) {
                self.state = State::Halted;
                return Err(err);
            }
        }

        self.finish()
    }

    fn finish(&self) -> Result<Number, ExecutionError> {
        trace!(steps = self.steps, depth = self.stack.len(), "halted");
        match (self.config.halt, self.stack.as_slice()) {
            (_, []) => ExecutionError::EmptyResult.throw(),
            (HaltMode::Lenient, [.., top]) | (HaltMode::Strict, [top]) => Ok(*top),
            (HaltMode::Strict, rest) => ExecutionError::DirtyStack {
                remaining: rest.len(),
            }
            .throw(),
        }
    }

    fn exec(&mut self, pc: usize) -> Result<(), ExecutionError> {
        if let Some(limit) = self.config.step_limit {
            if self.steps >= limit {
                return ExecutionError::StepLimitExceeded { limit }.throw();
            }
        }
        self.steps += 1;

        let opcode = match self.stream.get(pc) {
            Some(Token::Op(op)) => *op,
            other => {
                return ExecutionError::UnknownOpcode {
                    pc,
                    token: other.map(Token::to_string).unwrap_or_default(),
                }
                .throw()
            }
        };
        if self.config.trace {
            debug!(pc, %opcode, stack = ?self.stack, "exec");
        }

        let def = opcode.definition();
        if self.stack.len() < def.pops {
            return ExecutionError::StackUnderflow {
                pc,
                opcode,
                needed: def.pops,
                found: self.stack.len(),
            }
            .throw();
        }

        match (opcode, def.apply) {
            (_, Some(apply)) => self.binary(pc, opcode, apply)?,
            (Opcode::Push, None) => self.push_literal(pc, opcode)?,
            (_, None) => self.discard(pc, opcode, def.pops)?,
        }
        self.program_counter += def.width();

        Ok(())
    }

    fn push_literal(&mut self, pc: usize, opcode: Opcode) -> Result<(), ExecutionError> {
        match self.stream.get(pc + 1) {
            Some(Token::Literal(value)) => self.push(pc, *value),
            _ => ExecutionError::MissingOperand { pc, opcode }.throw(),
        }
    }

    fn discard(&mut self, pc: usize, opcode: Opcode, count: usize) -> Result<(), ExecutionError> {
        for _ in 0..count {
            self.pop(pc, opcode)?;
        }

        Ok(())
    }

    fn binary(&mut self, pc: usize, opcode: Opcode, apply: BinaryFn) -> Result<(), ExecutionError> {
        let right = self.pop(pc, opcode)?;
        let left = self.pop(pc, opcode)?;
        match apply(left, right) {
            Ok(value) => self.push(pc, value),
            Err(Fault::DivisionByZero) => ExecutionError::DivisionByZero { pc }.throw(),
            Err(Fault::Overflow) => ExecutionError::ArithmeticOverflow { pc, opcode }.throw(),
        }
    }

    fn push(&mut self, pc: usize, value: Number) -> Result<(), ExecutionError> {
        if self.stack.len() >= self.config.max_stack_depth {
            return ExecutionError::StackOverflow {
                pc,
                limit: self.config.max_stack_depth,
            }
            .throw();
        }
        self.stack.push(value);

        Ok(())
    }

    fn pop(&mut self, pc: usize, opcode: Opcode) -> Result<Number, ExecutionError> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => ExecutionError::StackUnderflow {
                pc,
                opcode,
                needed: opcode.definition().pops,
                found: 0,
            }
            .throw(),
        }
    }
}
