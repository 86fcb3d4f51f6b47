//! Minimal source-to-bytecode bridge compiler.
//!
//! Not a general-purpose parser for the language described in the spec —
//! only the surface syntax the end-to-end scenarios in spec §8 exercise:
//! integer/string/array literals, `var` bindings, `fn` closures (including
//! local-variable upvalue capture), the four arithmetic operators, calls,
//! `sizeof`, and indexing. A real front end is expected to replace this
//! module wholesale without touching the VM, loader, or value code it
//! targets — `compile_program`/`compile_expr` are the only seam.
//!
//! Tokenization is hand-rolled rather than built on a parsing-combinator or
//! grammar crate: this is the one place the bridge intentionally does not
//! reach for a heavier dependency, since a real front end replaces the
//! whole module rather than extending it.

mod ast;
mod codegen;
mod lexer;
mod parser;

use crate::image::{ImageError, ParsedImage};
use lexer::{LexError, Lexer};
use parser::{ParseError, Parser};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Compiles a full program (a sequence of top-level statements) into an
/// object-file image ready for [`crate::loader::load`].
pub fn compile_program(src: &str) -> Result<ParsedImage, CompileError> {
    let tokens = Lexer::tokenize(src)?;
    let stmts = Parser::new(&tokens).parse_program()?;
    Ok(codegen::compile_program(&stmts)?)
}

/// Compiles a single expression as a zero-argument top-level function that
/// returns its value — used by `Context::compile_expr` and by the
/// statement-then-expression retry spec §7 describes for a REPL host.
pub fn compile_expr(src: &str) -> Result<ParsedImage, CompileError> {
    let tokens = Lexer::tokenize(src)?;
    let expr = Parser::new(&tokens).parse_expr_entry()?;
    Ok(codegen::compile_expr(&expr)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::StringInterner;
    use crate::loader;

    #[test]
    fn compile_program_roundtrips_through_the_loader() {
        let image = compile_program("var a = 1; var b = 2; return a + b;").unwrap();
        let mut interner = StringInterner::new();
        loader::load(&image, &mut interner).unwrap();
    }

    #[test]
    fn compile_expr_wraps_a_bare_expression() {
        let image = compile_expr("2 + 3 * 4").unwrap();
        let mut interner = StringInterner::new();
        loader::load(&image, &mut interner).unwrap();
    }

    #[test]
    fn surfaces_lex_errors_as_compile_errors() {
        assert!(matches!(compile_program("1 ~ 2;"), Err(CompileError::Lex(_))));
    }

    #[test]
    fn surfaces_parse_errors_as_compile_errors() {
        assert!(matches!(compile_program("var a = ;"), Err(CompileError::Parse(_))));
    }
}
