//! End-to-end tests driving the public embedding API: source goes in
//! through `Context`, bytecode comes out through the loader and VM, output
//! comes back out through an injected sink.

use std::cell::RefCell;
use std::rc::Rc;

use sparkling::prelude::*;

fn run(src: &str) -> String {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::with_output(buf.clone());
    ctx.execstring(src).unwrap_or_else(|| panic!("{:?}: {:?}", src, ctx.geterrmsg()));
    String::from_utf8(buf.borrow().clone()).unwrap()
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(run("print(2 + 3 * 4);"), "14\n");
    assert_eq!(run("print((2 + 3) * 4);"), "20\n");
}

#[test]
fn array_indexing_round_trips() {
    assert_eq!(run("var a = [10, 20, 30]; print(a[1]);"), "20\n");
}

#[test]
fn nested_calls() {
    assert_eq!(
        run("var add = fn(a, b) { return a + b; }; var twice = fn(f, x) { return f(x, x); }; print(twice(add, 21));"),
        "42\n"
    );
}

#[test]
fn a_context_runs_multiple_independent_loads_against_the_same_vm() {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::with_output(buf.clone());
    ctx.execstring("print(1);").expect("first load should run");
    ctx.execstring("print(2);").expect("second load should run");
    assert_eq!(String::from_utf8(buf.borrow().clone()).unwrap(), "1\n2\n");
}

#[test]
fn a_loaded_top_level_function_can_be_called_directly() {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::with_output(buf.clone());
    let program = ctx.loadstring("print(9);").expect("should load");
    ctx.callfunc(&program, Vec::new()).expect("should run");
    assert_eq!(String::from_utf8(buf.borrow().clone()).unwrap(), "9\n");
}

#[test]
fn division_by_zero_is_a_recoverable_panic_not_a_process_abort() {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::with_output(buf.clone());
    let result = ctx.execstring("print(1 / 0);");
    assert!(result.is_none());
    assert_eq!(ctx.geterrtype(), ErrorKind::Runtime);
}

#[test]
fn div_mode_defaults_to_always_float() {
    assert_eq!(run("print(4 / 2);"), "2\n");
}

#[test]
fn div_mode_can_be_switched_to_int_when_exact() {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::with_output(buf.clone());
    ctx.set_div_mode(DivMode::IntWhenExact);
    ctx.execstring("print(4 / 2); print(5 / 2);").expect("should run");
    assert_eq!(String::from_utf8(buf.borrow().clone()).unwrap(), "2\n2.5\n");
}
