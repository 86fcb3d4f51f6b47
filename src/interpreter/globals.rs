//! The per-`Context` global namespace (spec §4.4 "Globals").
//!
//! `GLBVAL` inserts into this map; `LDSYM` consults it only when resolving
//! a still-unresolved [`crate::symtab::LocalSymbol::Stub`] — once resolved,
//! the local symbol table's own cell satisfies every later `LDSYM` of that
//! index without coming back here, per the lazy-resolve idempotence
//! property (spec §8).

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

#[derive(Debug, Default)]
pub struct Globals {
    table: HashMap<Rc<str>, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    pub fn set(&mut self, name: Rc<str>, value: Value) {
        self.table.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.table.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut globals = Globals::new();
        globals.set(Rc::from("pi"), Value::float(3.25));
        assert_eq!(globals.get("pi"), Some(Value::float(3.25)));
        assert_eq!(globals.get("missing"), None);
    }
}
