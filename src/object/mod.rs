//! Heap object model.
//!
//! Every heap object in the original runtime carries a class descriptor
//! (instance size, UID, optional equality/compare/hash, destructor) and a
//! reference count. We express the four built-in kinds as variants of one
//! enum — cheaper to dispatch on than the original's function-pointer
//! vtable, and `rustc` gets to devirtualize the common paths — while still
//! giving host embedders an extension point via [`NativeObject`] for
//! classes whose UID lives at or above [`crate::consts::USER_CLASS_UID_BASE`].
//! This mirrors the rewrite guidance in the spec's design notes: built-ins
//! as a closed enum, user classes as a trait object.

mod array;
pub mod function;
mod hashmap;
mod string;

pub use array::Array;
pub use function::{Function, NativeCallback, NativeFunction};
pub use hashmap::Hashmap;
pub use string::SpnString;

use std::any::Any;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::consts::{CLASS_UID_ARRAY, CLASS_UID_FUNCTION, CLASS_UID_HASHMAP, CLASS_UID_STRING};
use crate::value::Type;

/// A heap-allocated object. `Rc<Object>` is the strong reference the spec
/// requires every string/array/hashmap/function [`crate::value::Value`] to
/// hold.
#[derive(Debug)]
pub enum Object {
    Str(SpnString),
    Array(std::cell::RefCell<Array>),
    Hashmap(std::cell::RefCell<Hashmap>),
    Function(Function),
    /// A host-embedded object belonging to a class UID `>= USER_CLASS_UID_BASE`.
    /// Not constructed by anything in this crate; present purely as the
    /// extension seam the spec's "userinfo" tag and class-UID space imply.
    Native(Rc<dyn NativeObject>),
}

impl Object {
    pub fn new_string(s: Rc<str>) -> Self {
        Object::Str(SpnString::new(s))
    }

    pub fn new_array(items: Vec<crate::value::Value>) -> Self {
        Object::Array(std::cell::RefCell::new(Array::new(items)))
    }

    pub fn new_hashmap() -> Self {
        Object::Hashmap(std::cell::RefCell::new(Hashmap::new()))
    }

    pub const fn ty(&self) -> Type {
        match self {
            Object::Str(_) => Type::String,
            Object::Array(_) => Type::Array,
            Object::Hashmap(_) => Type::Hashmap,
            Object::Function(_) => Type::Function,
            Object::Native(_) => Type::UserInfo,
        }
    }

    pub fn class_uid(&self) -> u32 {
        match self {
            Object::Str(_) => CLASS_UID_STRING,
            Object::Array(_) => CLASS_UID_ARRAY,
            Object::Hashmap(_) => CLASS_UID_HASHMAP,
            Object::Function(_) => CLASS_UID_FUNCTION,
            Object::Native(n) => n.class_uid(),
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Object::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&std::cell::RefCell<Array>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_hashmap(&self) -> Option<&std::cell::RefCell<Hashmap>> {
        match self {
            Object::Hashmap(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Object::Function(f) => Some(f),
            _ => None,
        }
    }

    /// `SIZEOF`: length for string/array, entry count for hashmap, argument
    /// count for function.
    pub fn size_of(&self) -> Option<i64> {
        match self {
            Object::Str(s) => Some(s.len() as i64),
            Object::Array(a) => Some(a.borrow().len() as i64),
            Object::Hashmap(h) => Some(h.borrow().len() as i64),
            Object::Function(f) => Some(f.argc() as i64),
            Object::Native(_) => None,
        }
    }

    /// Equality dispatch: same class UID required, then either pointer
    /// identity or the class's equality predicate (built-ins compare by
    /// value; native objects supply their own).
    pub fn equal(self: &Rc<Self>, other: &Rc<Self>) -> bool {
        if Rc::ptr_eq(self, other) {
            return true;
        }
        match (self.as_ref(), other.as_ref()) {
            (Object::Str(a), Object::Str(b)) => a.as_str() == b.as_str(),
            (Object::Array(a), Object::Array(b)) => *a.borrow() == *b.borrow(),
            (Object::Hashmap(a), Object::Hashmap(b)) => *a.borrow() == *b.borrow(),
            (Object::Function(a), Object::Function(b)) => a.identity_eq(b),
            (Object::Native(a), Object::Native(b)) => a.class_uid() == b.class_uid() && a.native_eq(b.as_ref()),
            _ => false,
        }
    }

    /// Ordered comparison, used by `LT`/`LE`/`GT`/`GE`. `None` when the
    /// class has no ordering (arrays, hashmaps, functions, most native
    /// objects), matching the spec's "comparison across non-comparable
    /// pairs raises a runtime error".
    pub fn compare(&self, other: &Rc<Self>) -> Option<Ordering> {
        match (self, other.as_ref()) {
            (Object::Str(a), Object::Str(b)) => Some(a.as_str().cmp(b.as_str())),
            (Object::Native(a), Object::Native(b)) if a.class_uid() == b.class_uid() => a.native_cmp(b.as_ref()),
            _ => None,
        }
    }

    pub fn hash_value<H: Hasher>(&self, state: &mut H) {
        match self {
            Object::Str(s) => state.write_u64(s.cached_hash()),
            Object::Array(a) => {
                for v in a.borrow().items() {
                    v.hash(state);
                }
            }
            Object::Hashmap(_) => {
                // Hashmaps are mutable and not hashable as keys; callers
                // must reject them via `value::hashable` before reaching
                // here. We still provide a stable (if degenerate) hash so
                // `#[derive(Hash)]`-style containers elsewhere don't panic.
                state.write_u8(0);
            }
            Object::Function(f) => state.write_usize(f.identity_ptr()),
            Object::Native(n) => n.native_hash(state as &mut dyn Hasher),
        }
    }
}

/// Extension point for host-embedded object classes (class UID space
/// `>= USER_CLASS_UID_BASE`). Not used by anything inside this crate; it
/// exists so an embedder can plug a "strong userinfo" object into the
/// `Value`/`Object` model without this crate needing to know its shape.
pub trait NativeObject: std::fmt::Debug + Any {
    /// The class UID this object belongs to; must be `>= USER_CLASS_UID_BASE`.
    fn class_uid(&self) -> u32;

    fn native_eq(&self, _other: &dyn NativeObject) -> bool {
        false
    }

    fn native_cmp(&self, _other: &dyn NativeObject) -> Option<Ordering> {
        None
    }

    fn native_hash(&self, state: &mut dyn Hasher) {
        state.write_usize(self as *const Self as *const () as usize);
    }
}
