pub mod chunk;
pub mod compiler;
pub mod error;
pub mod opcode;
pub mod serialize;
pub mod stdlib;
pub mod symbol;
pub mod value;
pub mod vm;

pub use compiler::{Bytecode, Compiler};
pub use error::{CompileError, MonkeyError, MonkeyResult, RuntimeError};
pub use symbol::SymbolTable;
pub use value::Value;
pub use vm::Vm;

/// Lexes, parses, compiles and runs a whole program in one shot, returning
/// the value of its last top-level expression statement. The REPL and the
/// `run`/`build` CLI commands use the `Compiler`/`Vm` types directly instead,
/// so that globals and constants can persist across lines or be written out
/// as a bytecode artifact.
pub fn run(source: &str) -> MonkeyResult<Value> {
    let (program, lex_errors, parse_errors) = monkey_parser::parse(source);
    if let Some(e) = lex_errors.first() {
        return Err(MonkeyError::Syntax(e.to_string()));
    }
    if let Some(e) = parse_errors.first() {
        return Err(MonkeyError::Syntax(e.to_string()));
    }
    let bytecode = Compiler::new().compile(&program)?;
    let mut vm = Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped_stack_elem())
}
