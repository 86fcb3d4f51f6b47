//! The three function variants the spec calls for: a top-level program, a
//! script function sharing its enclosing program's word image, and a
//! native callback. All three answer to the same value-level API
//! (`argc`, `name`, `call`-ability through the interpreter).

use std::rc::Rc;

use crate::consts::Word;
use crate::error::RuntimeError;
use crate::symtab::LocalSymtab;
use crate::value::Value;

/// A top-level `FUNCTION` body loaded from an entire object file image. It
/// owns the word array; every [`ScriptFunction`] defined inside it holds a
/// clone of the same `Rc` rather than copying the bytes, so the image's
/// lifetime is exactly "as long as the longest-lived function referencing
/// it", per the spec's design notes. `symtab` is the one local symbol
/// table shared by the whole image — `LDSYM`'s index space is per object
/// file, not per nested function.
#[derive(Debug)]
pub struct TopLevelProgram {
    pub image: Rc<[Word]>,
    pub argc: u8,
    pub nregs: u8,
    pub symtab: Rc<LocalSymtab>,
}

/// The static part of a nested `FUNCTION` definition: where its body lives
/// in the shared image, and its declared arity. Shared (via `Rc`) between
/// every closure instance created from the same `FUNCDEF`/`CLOSURE` site —
/// only the captured upvalues differ between instances.
#[derive(Debug)]
pub struct ScriptDef {
    pub image: Rc<[Word]>,
    /// Word offset of this function's `FUNCTION` header within `image`.
    pub entry: usize,
    pub argc: u8,
    pub nregs: u8,
    pub name: Option<Rc<str>>,
    pub symtab: Rc<LocalSymtab>,
}

/// A closure: a [`ScriptDef`] plus the upvalues captured at the site of its
/// `CLOSURE` instruction. Upvalues are captured by value (a snapshot at
/// construction time) and thereafter read-only, per the spec's glossary
/// entry for "Upvalue".
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    pub def: Rc<ScriptDef>,
    pub upvalues: Rc<[Value]>,
}

pub type NativeCallback = Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub argc: u8,
    pub callback: NativeCallback,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Function {
    TopLevel(Rc<TopLevelProgram>),
    Script(ScriptFunction),
    Native(NativeFunction),
}

impl Function {
    pub fn argc(&self) -> u8 {
        match self {
            Function::TopLevel(p) => p.argc,
            Function::Script(s) => s.def.argc,
            Function::Native(n) => n.argc,
        }
    }

    pub fn nregs(&self) -> u8 {
        match self {
            Function::TopLevel(p) => p.nregs,
            Function::Script(s) => s.def.nregs,
            Function::Native(_) => 0,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Function::TopLevel(_) => "<top-level>",
            Function::Script(s) => s.def.name.as_deref().unwrap_or("<anonymous>"),
            Function::Native(n) => &n.name,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Function::Native(_))
    }

    /// Shared word image and entry offset, for script/top-level functions.
    pub fn image_and_entry(&self) -> Option<(&Rc<[Word]>, usize)> {
        match self {
            Function::TopLevel(p) => Some((&p.image, 0)),
            Function::Script(s) => Some((&s.def.image, s.def.entry)),
            Function::Native(_) => None,
        }
    }

    pub fn upvalues(&self) -> &[Value] {
        match self {
            Function::Script(s) => &s.upvalues,
            _ => &[],
        }
    }

    /// The local symbol table `LDSYM` indexes against, shared by every
    /// function defined in the same object-file image. `None` for native
    /// functions, which have no bytecode and so no local symbols.
    pub fn symtab(&self) -> Option<&Rc<LocalSymtab>> {
        match self {
            Function::TopLevel(p) => Some(&p.symtab),
            Function::Script(s) => Some(&s.def.symtab),
            Function::Native(_) => None,
        }
    }

    /// Identity comparison used by `EQ`: two function values are equal iff
    /// they are literally the same closure/native callback instance.
    pub fn identity_eq(&self, other: &Function) -> bool {
        self.identity_ptr() == other.identity_ptr()
    }

    pub fn identity_ptr(&self) -> usize {
        match self {
            Function::TopLevel(p) => Rc::as_ptr(p) as usize,
            Function::Script(s) => Rc::as_ptr(&s.def) as usize ^ (Rc::as_ptr(&s.upvalues) as *const () as usize),
            Function::Native(n) => Rc::as_ptr(&n.callback) as *const () as usize,
        }
    }
}
