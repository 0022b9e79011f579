use crate::ir::Number;
use crate::listing::Listing;
use crate::vm::{Engine, EngineConfig, ExecutionError, HaltMode};
#[cfg(target_arch = "wasm32")]
use crate::listing::ListingError;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::wasm_bindgen;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

/// Tokenizes and runs `listing`, flattening any failure into the message handed to JS.
/// `execute_listing` wraps this for the wasm build.
pub fn run_listing(listing: &str, strict: bool) -> Result<Number, String> {
    let stream = Listing::from_source(listing)
        .into_stream()
        .map_err(|err| format!("tinystack listing error occurred: {}", err))?;
    let halt = if strict {
        HaltMode::Strict
    } else {
        HaltMode::Lenient
    };
    let engine = Engine::new(EngineConfig::default().with_halt(halt));

    engine.execute(&stream).map_err(|err| error_message(&err))
}

pub fn disassemble_text(listing: &str) -> Result<String, String> {
    let stream = Listing::from_source(listing)
        .into_stream()
        .map_err(|err| format!("tinystack listing error occurred: {}", err))?;

    Ok(stream.disassemble().to_string())
}

fn error_message(err: &ExecutionError) -> String {
    format!("tinystack error occurred: {:?}, {}", err.kind(), err)
}

#[cfg(target_arch = "wasm32")]
impl From<ExecutionError> for JsValue {
    fn from(err: ExecutionError) -> Self {
        JsValue::from(error_message(&err))
    }
}

#[cfg(target_arch = "wasm32")]
impl From<ListingError> for JsValue {
    fn from(err: ListingError) -> Self {
        JsValue::from(format!("tinystack listing error occurred: {}", err))
    }
}

/// Tokenizes `listing` and executes it
///
/// - `listing` the instruction stream as flat text, e.g. `PUSH 3 PUSH 4 ADD`
/// - `strict` reject programs that leave more than one value on the stack
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn execute_listing(listing: &str, strict: bool) -> Result<Number, JsValue> {
    run_listing(listing, strict).map_err(JsValue::from)
}

/// Returns the disassembly of `listing`, one instruction per line
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn disassemble_listing(listing: &str) -> Result<String, JsValue> {
    disassemble_text(listing).map_err(JsValue::from)
}

#[cfg(test)]
mod tests {
    use super::{disassemble_text, run_listing};

    #[test]
    fn execute_and_disassemble() {
        assert_eq!(run_listing("PUSH 3 PUSH 4 ADD PUSH 5 MINUS", false), Ok(2));
        assert_eq!(run_listing("PUSH 1 PUSH 2", false), Ok(2));
        assert_eq!(
            disassemble_text("PUSH 3 PUSH 4 ADD").as_deref(),
            Ok("0000 PUSH 3\n0002 PUSH 4\n0004 ADD\n")
        );
    }

    #[test]
    fn failures_become_messages() {
        assert_eq!(
            run_listing("ADD", false),
            Err("tinystack error occurred: StackUnderflow, stack underflow at pc 0: ADD needs 2 value(s), found 0".to_string())
        );
        assert_eq!(
            run_listing("PUSH 1 PUSH 2", true),
            Err("tinystack error occurred: DirtyStack, program halted with 2 values on the stack, expected exactly one".to_string())
        );
        assert!(run_listing("PUSH 3x", false)
            .unwrap_err()
            .contains("MissingOperand"));
    }
}
