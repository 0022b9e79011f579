//! A tiny embeddable stack-based bytecode interpreter.
//!
//! An [`InstructionStream`] is a flat sequence of opcodes and inline operands. The [`Engine`]
//! runs it against a private operand stack and returns whatever is left on top:
//!
//! ```
//! use tinystack::{execute, InstructionStream};
//!
//! let stream: InstructionStream = "PUSH 3 PUSH 4 ADD PUSH 5 MINUS".parse().unwrap();
//! assert_eq!(execute(&stream), Ok(2));
//! ```

pub mod ir;
pub mod listing;
pub mod vm;
pub mod wasm;

pub use ir::{Definition, Disassembly, InstructionStream, Number, Opcode, StreamBuilder, Token};
pub use listing::{Listing, ListingError};
pub use vm::{execute, Engine, EngineConfig, ErrorKind, ExecutionError, HaltMode};
