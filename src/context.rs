//! [`Context`]: the embedding-facing handle onto a loaded program and its
//! running VM (spec §4.5).
//!
//! Modeled on the teacher's `Transactor<'a, S>`: a non-consuming builder
//! that owns interpreter state across many calls, exposing `load*`/`exec*`
//! methods that each either produce a value or record an error retrievable
//! afterward via `geterrmsg`/`geterrtype`/`stacktrace`, rather than
//! returning a `Result` the caller must match on immediately. A `Context`
//! is `!Sync` (it owns an `Rc`-based VM) — sharing a program across threads
//! means loading it into one `Context` per thread (spec §5).

use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use crate::compiler;
use crate::error::{ErrorKind, SparklingError};
use crate::image::{self, ParsedImage};
use crate::interner::StringInterner;
use crate::interpreter::Vm;
use crate::loader;
use crate::object::{Function, NativeCallback, NativeFunction};
use crate::value::Value;

/// Strips a leading `#!` shebang line before compilation (spec §6): if the
/// source starts with `#!`, everything up to and including the first line
/// terminator is discarded. A `\r\n` pair is treated as one terminator; a
/// lone `\r` or `\n` is consumed on its own.
fn strip_shebang(src: &str) -> &str {
    if !src.starts_with("#!") {
        return src;
    }
    match src.find(['\n', '\r']) {
        None => "",
        Some(pos) if src[pos..].starts_with("\r\n") => &src[pos + 2..],
        Some(pos) => &src[pos + 1..],
    }
}

fn display_value(v: &Value) -> String {
    if let Some(s) = v.as_str() {
        return s.to_string();
    }
    match v {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Object(_) => format!("<{}>", v.ty().name()),
    }
}

fn register_print(vm: &mut Vm, output: Rc<RefCell<dyn Write>>) {
    let callback: NativeCallback = Rc::new(move |args: &[Value]| {
        let rendered: Vec<String> = args.iter().map(display_value).collect();
        writeln!(output.borrow_mut(), "{}", rendered.join(" ")).map_err(crate::error::RuntimeError::Halt)?;
        Ok(Value::Nil)
    });
    vm.globals_mut().set(
        Rc::from("print"),
        Value::function(Function::Native(NativeFunction {
            name: Rc::from("print"),
            argc: 0,
            callback,
        })),
    );
}

/// Owns a [`Vm`], the per-context string interner, the native global
/// namespace, and the last error raised by any `load*`/`exec*`/`callfunc`
/// call.
pub struct Context {
    vm: Vm,
    interner: StringInterner,
    last_error: Option<SparklingError>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A fresh context whose `print` builtin writes to stdout.
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(io::stdout())))
    }

    /// A fresh context whose `print` builtin writes to `output` — used by
    /// hosts (and tests) that want to capture program output rather than
    /// let it go to the process's stdout.
    pub fn with_output(output: Rc<RefCell<dyn Write>>) -> Self {
        let mut vm = Vm::new();
        register_print(&mut vm, output);
        Self {
            vm,
            interner: StringInterner::new(),
            last_error: None,
        }
    }

    /// Sets `DIV`'s int/int exact-division behavior (spec §9's open
    /// question — see [`crate::interpreter::DivMode`]); defaults to
    /// `DivMode::AlwaysFloat`.
    pub fn set_div_mode(&mut self, div_mode: crate::interpreter::DivMode) {
        self.vm.set_div_mode(div_mode);
    }

    fn clear_error(&mut self) {
        self.last_error = None;
    }

    fn fail(&mut self, error: SparklingError) {
        self.last_error = Some(error);
    }

    fn materialize(&mut self, image: ParsedImage) -> Option<Value> {
        match loader::load(&image, &mut self.interner) {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(SparklingError::from(e));
                None
            }
        }
    }

    /// Compiles and loads `src` as a top-level program, returning the
    /// callable top-level function on success.
    pub fn loadstring(&mut self, src: &str) -> Option<Value> {
        self.clear_error();
        match compiler::compile_program(strip_shebang(src)) {
            Ok(image) => self.materialize(image),
            Err(e) => {
                self.fail(SparklingError::syntax(e.to_string()));
                None
            }
        }
    }

    /// Reads `path` as UTF-8 source text and loads it as a top-level
    /// program (spec §6's shebang-skip rule applies here too).
    pub fn loadsrcfile(&mut self, path: impl AsRef<Path>) -> Option<Value> {
        self.clear_error();
        match fs::read_to_string(path) {
            Ok(src) => self.loadstring(&src),
            Err(e) => {
                self.fail(SparklingError::generic(e.to_string()));
                None
            }
        }
    }

    /// Reads `path` as a compiled object file (spec §4.2) and loads it.
    pub fn loadobjfile(&mut self, path: impl AsRef<Path>) -> Option<Value> {
        self.clear_error();
        let load_result = fs::read(path)
            .map_err(|e| SparklingError::generic(e.to_string()))
            .and_then(|bytes| image::bytes_to_words(&bytes).map_err(SparklingError::from))
            .and_then(|words| image::parse(Rc::from(words)).map_err(SparklingError::from));
        match load_result {
            Ok(image) => self.materialize(image),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    /// Compiles `src` as a single expression, wrapped as a zero-argument
    /// top-level function that returns its value.
    pub fn compile_expr(&mut self, src: &str) -> Option<Value> {
        self.clear_error();
        match compiler::compile_expr(src) {
            Ok(image) => self.materialize(image),
            Err(e) => {
                self.fail(SparklingError::syntax(e.to_string()));
                None
            }
        }
    }

    /// Calls `function` with `args`, returning its result. Errors are
    /// recorded and retrievable via `geterrmsg`/`geterrtype`/`stacktrace`.
    pub fn callfunc(&mut self, function: &Value, args: Vec<Value>) -> Option<Value> {
        self.clear_error();
        let Some(f) = function.as_object().and_then(|o| o.as_function()).cloned() else {
            self.fail(SparklingError::generic("callfunc target is not a callable value"));
            return None;
        };
        match self.vm.call(f, args) {
            Ok(value) => Some(value),
            Err((err, backtrace)) => {
                match err.panic_reason() {
                    Some(reason) => self.fail(SparklingError::runtime(reason.clone(), backtrace)),
                    None => self.fail(SparklingError::generic(err.to_string())),
                }
                None
            }
        }
    }

    /// `loadstring` followed by a zero-argument `callfunc`.
    pub fn execstring(&mut self, src: &str) -> Option<Value> {
        let f = self.loadstring(src)?;
        self.callfunc(&f, Vec::new())
    }

    /// `loadobjfile` followed by a zero-argument `callfunc`.
    pub fn execobjfile(&mut self, path: impl AsRef<Path>) -> Option<Value> {
        let f = self.loadobjfile(path)?;
        self.callfunc(&f, Vec::new())
    }

    pub fn geterrmsg(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.message.as_str())
    }

    pub fn geterrtype(&self) -> ErrorKind {
        self.last_error.as_ref().map(|e| e.kind).unwrap_or_default()
    }

    /// One rendered line per call-stack frame, innermost first; empty if
    /// the last error carried no backtrace (or there was no error).
    pub fn stacktrace(&self) -> Vec<String> {
        self.last_error
            .as_ref()
            .and_then(|e| e.backtrace.as_ref())
            .map(|bt| bt.frames().iter().map(|f| f.function_name.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_buffer() -> (Context, Rc<RefCell<Vec<u8>>>) {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let ctx = Context::with_output(buf.clone());
        (ctx, buf)
    }

    fn written(buf: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8(buf.borrow().clone()).unwrap()
    }

    #[test]
    fn prints_a_simple_expression() {
        let (mut ctx, buf) = output_buffer();
        ctx.execstring("print(2 + 3);").expect("should run");
        assert_eq!(written(&buf), "5\n");
    }

    #[test]
    fn prints_array_sizeof() {
        let (mut ctx, buf) = output_buffer();
        ctx.execstring("var a = [1, 2, 3]; print(sizeof(a));").expect("should run");
        assert_eq!(written(&buf), "3\n");
    }

    #[test]
    fn calls_a_closure() {
        let (mut ctx, buf) = output_buffer();
        ctx.execstring("var f = fn (x) { return x * x; }; print(f(7));").expect("should run");
        assert_eq!(written(&buf), "49\n");
    }

    #[test]
    fn captures_a_local_upvalue() {
        let (mut ctx, buf) = output_buffer();
        ctx.execstring("var c = fn(x) { return fn() { return x; }; }; print(c(42)());").expect("should run");
        assert_eq!(written(&buf), "42\n");
    }

    #[test]
    fn reports_a_runtime_error_with_one_frame_backtrace() {
        let (mut ctx, _buf) = output_buffer();
        let result = ctx.execstring("nonexistent_global();");
        assert!(result.is_none());
        assert_eq!(ctx.geterrtype(), ErrorKind::Runtime);
        assert_eq!(ctx.stacktrace().len(), 1);
    }

    #[test]
    fn strips_a_shebang_line_before_compiling() {
        let (mut ctx, buf) = output_buffer();
        ctx.execstring("#!/usr/bin/env spn\nprint(1);").expect("should run");
        assert_eq!(written(&buf), "1\n");
    }
}
