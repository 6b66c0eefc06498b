#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

pub mod ast;
pub mod codegen;
pub mod error;
pub mod interp;
pub mod lex;
pub mod parse;
pub mod symtab;

pub use error::{Error, Result};

/// Compiles `source` and runs it through the native codegen/executor path.
///
/// Returns once the emitted machine code has returned control to the host.
pub fn run(source: &str) -> Result<()> {
    let (program, symtab) = parse::Parser::new(source)?.parse_program()?;
    let emitter = codegen::compile(&program, symtab.len())?;
    let executable = emitter.finish()?;
    executable.execute()?;
    Ok(())
}

/// Compiles and interprets `source` with the tree-walking reference oracle,
/// writing `cout` output to `out`.
pub fn interpret(source: &str, out: &mut impl std::io::Write) -> Result<()> {
    let (program, symtab) = parse::Parser::new(source)?.parse_program()?;
    interp::run(&program, symtab.len(), out)?;
    Ok(())
}
