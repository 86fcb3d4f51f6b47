//! Per-program local symbol table (spec §3, §4.3, §4.4).
//!
//! One [`LocalSymtab`] is built per loaded object file and shared (via
//! `Rc`) by the top-level program and every nested function defined inside
//! it, since `LDSYM`'s 16-bit immediate indexes this single table
//! regardless of which function in the image is currently executing.
//! `SymStub` entries upgrade to `Value` in place on first successful
//! resolution — modeled here as a `RefCell` cell per entry, matching the
//! spec's "symbol-stub patch-in-place" redesign note (an array of cells
//! whose variant can be upgraded under `Context` ownership).

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::PanicReason;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum LocalSymbol {
    /// Already resolved: a loaded string/function constant, or a
    /// previously-resolved global.
    Value(Value),
    /// An unresolved reference to a global, by name.
    Stub(Rc<str>),
}

#[derive(Debug, Default)]
pub struct LocalSymtab {
    entries: Vec<RefCell<LocalSymbol>>,
}

impl LocalSymtab {
    pub fn new(entries: Vec<LocalSymbol>) -> Self {
        Self {
            entries: entries.into_iter().map(RefCell::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads local-symbol-table entry `index`, resolving it against
    /// `lookup` (consulted only when the entry is still a stub) and
    /// rewriting the entry in place on success, per `LDSYM`'s semantics.
    pub fn resolve(&self, index: usize, lookup: impl FnOnce(&str) -> Option<Value>) -> Result<Value, PanicReason> {
        let cell = self
            .entries
            .get(index)
            .ok_or_else(|| PanicReason::Custom(format!("local symbol index {index} out of range")))?;

        let mut slot = cell.borrow_mut();
        match &*slot {
            LocalSymbol::Value(v) => Ok(v.clone()),
            LocalSymbol::Stub(name) => {
                let resolved = lookup(name).ok_or_else(|| PanicReason::UnresolvedGlobal(name.to_string()))?;
                *slot = LocalSymbol::Value(resolved.clone());
                Ok(resolved)
            }
        }
    }

    /// Overwrites entry `index` with an already-resolved value. Used by the
    /// loader to back-patch `FUNCDEF` slots once the table they need to
    /// reference (itself) exists.
    pub fn patch(&self, index: usize, value: Value) {
        *self.entries[index].borrow_mut() = LocalSymbol::Value(value);
    }

    #[cfg(test)]
    pub fn is_resolved(&self, index: usize) -> bool {
        matches!(*self.entries[index].borrow(), LocalSymbol::Value(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_stub_once_then_stops_consulting_lookup() {
        let table = LocalSymtab::new(vec![LocalSymbol::Stub(Rc::from("answer"))]);
        let calls = RefCell::new(0);

        let first = table.resolve(0, |name| {
            *calls.borrow_mut() += 1;
            (name == "answer").then(|| Value::int(42))
        });
        assert_eq!(first.unwrap(), Value::int(42));
        assert!(table.is_resolved(0));

        // A lookup that would now panic if consulted again proves the
        // second resolve didn't touch it.
        let second = table.resolve(0, |_| panic!("should not consult globals again"));
        assert_eq!(second.unwrap(), Value::int(42));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn unresolved_stub_is_a_panic_reason() {
        let table = LocalSymtab::new(vec![LocalSymbol::Stub(Rc::from("missing"))]);
        let err = table.resolve(0, |_| None).unwrap_err();
        assert!(matches!(err, PanicReason::UnresolvedGlobal(name) if name == "missing"));
    }
}
