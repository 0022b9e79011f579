use std::fmt::{self, Display};
use std::slice::Iter;

/// The numeric value type every literal and stack slot holds
pub type Number = i64;

/// Why a binary operator could not produce a value
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Fault {
    Overflow,
    DivisionByZero,
}

pub(crate) type BinaryFn = fn(Number, Number) -> Result<Number, Fault>;

/// Static description of an opcode: its printable name, how many inline operands follow it in
/// the stream, how many values it needs on the stack and, for binary operators, how to combine
/// `left` and `right`.
#[derive(Debug)]
pub struct Definition {
    pub name: &'static str,
    pub operands: usize,
    pub pops: usize,
    pub(crate) apply: Option<BinaryFn>,
}

impl Definition {
    /// Whether this opcode is a binary operator
    pub fn is_binary(&self) -> bool {
        self.apply.is_some()
    }

    /// Number of stream tokens one instruction of this kind occupies
    pub fn width(&self) -> usize {
        1 + self.operands
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Opcode {
    Push,
    Add,
    Minus,
    Mul,
    Div,
    Pop,
}

static PUSH: Definition = Definition {
    name: "PUSH",
    operands: 1,
    pops: 0,
    apply: None,
};

static ADD: Definition = Definition {
    name: "ADD",
    operands: 0,
    pops: 2,
    apply: Some(|left, right| left.checked_add(right).ok_or(Fault::Overflow)),
};

static MINUS: Definition = Definition {
    name: "MINUS",
    operands: 0,
    pops: 2,
    apply: Some(|left, right| left.checked_sub(right).ok_or(Fault::Overflow)),
};

static MUL: Definition = Definition {
    name: "MUL",
    operands: 0,
    pops: 2,
    apply: Some(|left, right| left.checked_mul(right).ok_or(Fault::Overflow)),
};

static DIV: Definition = Definition {
    name: "DIV",
    operands: 0,
    pops: 2,
    apply: Some(|left, right| {
        if right == 0 {
            return Err(Fault::DivisionByZero);
        }
        left.checked_div(right).ok_or(Fault::Overflow)
    }),
};

static POP: Definition = Definition {
    name: "POP",
    operands: 0,
    pops: 1,
    apply: None,
};

impl Opcode {
    pub const ALL: [Opcode; 6] = [
        Opcode::Push,
        Opcode::Add,
        Opcode::Minus,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Pop,
    ];

    pub fn definition(self) -> &'static Definition {
        match self {
            Opcode::Push => &PUSH,
            Opcode::Add => &ADD,
            Opcode::Minus => &MINUS,
            Opcode::Mul => &MUL,
            Opcode::Div => &DIV,
            Opcode::Pop => &POP,
        }
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    /// Looks up an opcode by its tag. Tags are matched exactly, `push` is not `PUSH`.
    pub fn lookup(tag: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.name() == tag)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One element of an instruction stream. Opcode tags the table does not know are kept as
/// `Unknown` so the engine can report them where they would have been executed.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Token {
    Op(Opcode),
    Unknown(Box<str>),
    Literal(Number),
}

impl Token {
    /// Builds an opcode token from its tag, falling back to `Unknown`
    pub fn tag(tag: &str) -> Token {
        match Opcode::lookup(tag) {
            Some(op) => Token::Op(op),
            None => Token::Unknown(tag.into()),
        }
    }
}

impl From<Opcode> for Token {
    fn from(op: Opcode) -> Self {
        Token::Op(op)
    }
}

impl From<Number> for Token {
    fn from(value: Number) -> Self {
        Token::Literal(value)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Op(op) => write!(f, "{}", op),
            Token::Unknown(tag) => f.write_str(tag),
            Token::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// A flat, immutable sequence of opcodes and their inline operands
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct InstructionStream {
    tokens: Vec<Token>,
}

impl InstructionStream {
    pub fn new(tokens: Vec<Token>) -> InstructionStream {
        InstructionStream { tokens }
    }

    pub fn builder() -> StreamBuilder {
        StreamBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Token> {
        self.tokens.get(pc)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn iter(&self) -> Iter<'_, Token> {
        self.tokens.iter()
    }

    /// Returns a printable listing of the stream, one instruction per line prefixed with its
    /// offset
    pub fn disassemble(&self) -> Disassembly<'_> {
        Disassembly { stream: self }
    }
}

impl From<Vec<Token>> for InstructionStream {
    fn from(tokens: Vec<Token>) -> Self {
        InstructionStream::new(tokens)
    }
}

impl FromIterator<Token> for InstructionStream {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        InstructionStream::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Token;
    type IntoIter = Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

/// Incrementally assembles an instruction stream
///
/// ```
/// use tinystack::{InstructionStream, Opcode};
///
/// let stream = InstructionStream::builder()
///     .push(3)
///     .push(4)
///     .op(Opcode::Add)
///     .build();
/// assert_eq!(stream.len(), 5);
/// ```
#[derive(Debug, Default)]
pub struct StreamBuilder {
    tokens: Vec<Token>,
}

impl StreamBuilder {
    pub fn push(mut self, value: Number) -> StreamBuilder {
        self.tokens.push(Token::Op(Opcode::Push));
        self.tokens.push(Token::Literal(value));
        self
    }

    pub fn op(mut self, op: Opcode) -> StreamBuilder {
        self.tokens.push(Token::Op(op));
        self
    }

    pub fn token(mut self, token: impl Into<Token>) -> StreamBuilder {
        self.tokens.push(token.into());
        self
    }

    pub fn build(self) -> InstructionStream {
        InstructionStream::new(self.tokens)
    }
}

pub struct Disassembly<'a> {
    stream: &'a InstructionStream,
}

impl Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens = self.stream.tokens();
        let mut offset = 0;
        while offset < tokens.len() {
            write!(f, "{:04} ", offset)?;
            let op = match &tokens[offset] {
                Token::Op(op) => *op,
                Token::Unknown(tag) => {
                    writeln!(f, "ERROR: unknown opcode {}", tag)?;
                    offset += 1;
                    continue;
                }
                Token::Literal(value) => {
                    writeln!(f, "ERROR: stray literal {}", value)?;
                    offset += 1;
                    continue;
                }
            };

            let def = op.definition();
            write!(f, "{}", def.name)?;
            let mut complete = true;
            for i in 1..=def.operands {
                match tokens.get(offset + i) {
                    Some(Token::Literal(value)) => write!(f, " {}", value)?,
                    _ => {
                        write!(f, " ERROR: missing operand")?;
                        complete = false;
                        break;
                    }
                }
            }
            writeln!(f)?;
            // a broken instruction only covers its own tag, the next token gets its own line
            offset += if complete { def.width() } else { 1 };
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Fault, InstructionStream, Opcode, Token};

    #[test]
    fn lookup_is_exact() {
        assert_eq!(Opcode::lookup("PUSH"), Some(Opcode::Push));
        assert_eq!(Opcode::lookup("MINUS"), Some(Opcode::Minus));
        assert_eq!(Opcode::lookup("push"), None);
        assert_eq!(Opcode::lookup("FOO"), None);
    }

    #[test]
    fn every_opcode_round_trips_through_its_tag() {
        for op in Opcode::ALL {
            assert_eq!(Token::tag(op.name()), Token::Op(op));
        }
        assert_eq!(Token::tag("FOO"), Token::Unknown("FOO".into()));
    }

    #[test]
    fn definitions() {
        assert_eq!(Opcode::Push.definition().width(), 2);
        assert!(!Opcode::Push.definition().is_binary());
        assert_eq!(Opcode::Pop.definition().pops, 1);
        for op in [Opcode::Add, Opcode::Minus, Opcode::Mul, Opcode::Div] {
            let def = op.definition();
            assert!(def.is_binary());
            assert_eq!(def.pops, 2);
            assert_eq!(def.width(), 1);
        }
    }

    #[test]
    fn binary_faults() {
        let div = Opcode::Div.definition().apply.unwrap();
        assert_eq!(div(7, 2), Ok(3));
        assert_eq!(div(-7, 2), Ok(-3));
        assert_eq!(div(1, 0), Err(Fault::DivisionByZero));
        assert_eq!(div(i64::MIN, -1), Err(Fault::Overflow));

        let add = Opcode::Add.definition().apply.unwrap();
        assert_eq!(add(i64::MAX, 1), Err(Fault::Overflow));
    }

    #[test]
    fn builder_lays_operands_inline() {
        let stream = InstructionStream::builder()
            .push(3)
            .push(4)
            .op(Opcode::Add)
            .build();
        assert_eq!(
            stream.tokens(),
            &[
                Token::Op(Opcode::Push),
                Token::Literal(3),
                Token::Op(Opcode::Push),
                Token::Literal(4),
                Token::Op(Opcode::Add),
            ]
        );
    }

    #[test]
    fn disassemble_canonical() {
        let stream = InstructionStream::builder()
            .push(3)
            .push(4)
            .op(Opcode::Add)
            .push(5)
            .op(Opcode::Minus)
            .build();
        let expected = "0000 PUSH 3\n0002 PUSH 4\n0004 ADD\n0005 PUSH 5\n0007 MINUS\n";
        assert_eq!(stream.disassemble().to_string(), expected);
    }

    #[test]
    fn disassemble_reports_broken_tokens() {
        let stream: InstructionStream = vec![
            Token::tag("FOO"),
            Token::Literal(9),
            Token::Op(Opcode::Push),
        ]
        .into();
        let expected = "0000 ERROR: unknown opcode FOO\n0001 ERROR: stray literal 9\n0002 PUSH ERROR: missing operand\n";
        assert_eq!(stream.disassemble().to_string(), expected);
    }

    #[test]
    fn disassemble_resumes_after_missing_operand() {
        let stream: InstructionStream = vec![
            Token::Op(Opcode::Push),
            Token::Op(Opcode::Add),
            Token::Op(Opcode::Push),
            Token::Literal(5),
        ]
        .into();
        let expected = "0000 PUSH ERROR: missing operand\n0001 ADD\n0002 PUSH 5\n";
        assert_eq!(stream.disassemble().to_string(), expected);
    }
}
