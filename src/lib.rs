#![allow(clippy::try_err)]
// Wrong clippy convention; check
// https://rust-lang.github.io/api-guidelines/naming.html
#![allow(clippy::wrong_self_convention)]

pub mod backtrace;
pub mod compiler;
pub mod consts;
pub mod context;
pub mod error;
pub mod image;
pub mod instruction;
pub mod interner;
pub mod interpreter;
pub mod loader;
pub mod object;
pub mod opcode;
pub mod symtab;
pub mod value;

pub mod prelude {
    pub use crate::consts::{Word, MAX_FUNCTION_NEST, MAX_REGISTERS};
    pub use crate::context::Context;
    pub use crate::error::{ErrorKind, PanicReason, RuntimeError, SparklingError};
    pub use crate::instruction::Instruction;
    pub use crate::interpreter::{CallFrame, DivMode, Vm};
    pub use crate::object::{Function, Object};
    pub use crate::opcode::Opcode;
    pub use crate::value::{Type, Value};
}
