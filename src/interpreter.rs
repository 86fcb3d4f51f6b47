//! [`Vm`]: the register-based virtual machine (spec §4.4).

mod alu;
mod frame;
mod globals;

use std::rc::Rc;

use tracing::{debug, trace};

use crate::backtrace::{Backtrace, Frame as BacktraceFrame};
use crate::consts::MAX_FUNCTION_NEST;
use crate::error::{PanicReason, RuntimeError};
use crate::instruction::{call_arg_words, nth_packed_register, padded_words, Instruction};
use crate::object::function::ScriptFunction;
use crate::object::Function;
use crate::opcode::{ConstKind, Opcode, UpvalKind};
use crate::value::Value;

pub use alu::DivMode;
pub use frame::CallFrame;
pub use globals::Globals;

/// No-op placeholder for the debug-hook seam the teacher's `state.rs`
/// exposes behind a feature flag; this crate doesn't yet implement
/// breakpoints/step-debugging, so the hook is always the unit type.
pub type Debugger = ();

/// Register-based virtual machine. Owns the call stack and the global
/// namespace; the loaded image and the string interning table live in
/// [`crate::context::Context`], which owns a `Vm`.
#[derive(Debug, Default)]
pub struct Vm {
    frames: Vec<CallFrame>,
    globals: Globals,
    /// Set when the outermost frame returns; there is no caller frame left
    /// to receive the value, so `exec_ret` stashes it here instead.
    last_return: Option<Value>,
    #[allow(dead_code)]
    debugger: Debugger,
    /// Resolves spec §9's open `DIV` question (see [`alu::DivMode`])
    /// without guessing at a single settled behavior.
    div_mode: DivMode,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            globals: Globals::new(),
            last_return: None,
            debugger: Debugger::default(),
            div_mode: DivMode::default(),
        }
    }

    /// A `Vm` with `DIV`'s int/int exact-division behavior set explicitly,
    /// rather than defaulting to `DivMode::AlwaysFloat`.
    pub fn with_div_mode(div_mode: DivMode) -> Self {
        Self { div_mode, ..Self::new() }
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    pub fn set_div_mode(&mut self, div_mode: DivMode) {
        self.div_mode = div_mode;
    }

    pub fn call_stack(&self) -> &[CallFrame] {
        &self.frames
    }

    fn backtrace(&self) -> Backtrace {
        Backtrace::new(
            self.frames
                .iter()
                .rev()
                .map(|f| BacktraceFrame {
                    function_name: f.function_name().to_owned(),
                    program_counter: f.pc,
                })
                .collect(),
        )
    }

    /// Calls `function` with `args`, running it (and any nested calls it
    /// makes) to completion and returning its result.
    pub fn call(&mut self, function: Function, args: Vec<Value>) -> Result<Value, (RuntimeError, Backtrace)> {
        if function.is_native() {
            return self.call_native(&function, &args).map_err(|e| {
                let bt = self.backtrace();
                (e, bt)
            });
        }

        if self.frames.len() >= MAX_FUNCTION_NEST {
            return Err((RuntimeError::Recoverable(PanicReason::StackOverflow(MAX_FUNCTION_NEST)), self.backtrace()));
        }

        self.frames.push(CallFrame::new(function, Rc::from(args), None));
        self.run().map_err(|e| {
            let bt = self.backtrace();
            (e, bt)
        })
    }

    fn call_native(&mut self, function: &Function, args: &[Value]) -> Result<Value, RuntimeError> {
        match function {
            Function::Native(n) => (n.callback)(args),
            _ => unreachable!("call_native is only invoked for Function::Native"),
        }
    }

    /// Dispatches instructions until the frame present when `run` was
    /// entered (and every frame it calls into) has returned.
    fn run(&mut self) -> Result<Value, RuntimeError> {
        let base_depth = self.frames.len() - 1;
        while self.frames.len() > base_depth {
            self.step()?;
        }
        Ok(self.last_return.take().unwrap_or(Value::Nil))
    }

    fn fetch(&self) -> Instruction {
        let frame = self.frames.last().expect("step is only called with at least one frame");
        let (image, _) = frame.function.image_and_entry().expect("a running frame always has an image");
        Instruction::from_word(image[frame.pc])
    }

    fn words(&self) -> Rc<[crate::consts::Word]> {
        let frame = self.frames.last().expect("non-empty call stack");
        frame.function.image_and_entry().expect("a running frame always has an image").0.clone()
    }

    fn step(&mut self) -> Result<(), RuntimeError> {
        let ins = self.fetch();
        let op = ins.opcode().map_err(|e| RuntimeError::Recoverable(PanicReason::Custom(e.to_string())))?;
        trace!(?op, pc = self.current().pc, "dispatch");

        match op {
            Opcode::Call => self.exec_call(ins)?,
            Opcode::Ret => self.exec_ret(ins)?,
            Opcode::Jmp => self.exec_jmp()?,
            Opcode::Jze => self.exec_jcond(ins, false)?,
            Opcode::Jnz => self.exec_jcond(ins, true)?,

            Opcode::Eq => self.exec_binop(ins, |a, b| Ok(alu::eq(a, b)))?,
            Opcode::Ne => self.exec_binop(ins, |a, b| Ok(alu::ne(a, b)))?,
            Opcode::Lt => self.exec_binop(ins, alu::lt)?,
            Opcode::Le => self.exec_binop(ins, alu::le)?,
            Opcode::Gt => self.exec_binop(ins, alu::gt)?,
            Opcode::Ge => self.exec_binop(ins, alu::ge)?,
            Opcode::Add => self.exec_binop(ins, alu::add)?,
            Opcode::Sub => self.exec_binop(ins, alu::sub)?,
            Opcode::Mul => self.exec_binop(ins, alu::mul)?,
            Opcode::Div => {
                let div_mode = self.div_mode;
                self.exec_binop(ins, |a, b| alu::div(a, b, div_mode))?
            }
            Opcode::Mod => self.exec_binop(ins, alu::modulo)?,

            Opcode::And => self.exec_binop(ins, alu::bitand)?,
            Opcode::Or => self.exec_binop(ins, alu::bitor)?,
            Opcode::Xor => self.exec_binop(ins, alu::bitxor)?,
            Opcode::Shl => self.exec_binop(ins, alu::shl)?,
            Opcode::Shr => self.exec_binop(ins, alu::shr)?,

            Opcode::Bitnot => self.exec_unop(ins, alu::bitnot)?,
            Opcode::Lognot => self.exec_unop(ins, |v| Ok(alu::lognot(v)))?,
            Opcode::Sizeof => self.exec_unop(ins, alu::sizeof)?,
            Opcode::Typeof => self.exec_unop(ins, |v| Ok(alu::typeof_name(v)))?,
            Opcode::Neg => self.exec_unop(ins, alu::neg)?,
            Opcode::Inc => self.exec_unop_inplace(ins, alu::inc)?,
            Opcode::Dec => self.exec_unop_inplace(ins, alu::dec)?,

            Opcode::Concat => self.exec_binop(ins, alu::concat)?,
            Opcode::Mov => self.exec_mov(ins)?,
            Opcode::Ldconst => self.exec_ldconst(ins)?,
            Opcode::Ldsym => self.exec_ldsym(ins)?,
            Opcode::Glbval => self.exec_glbval(ins)?,
            Opcode::Newarr => self.exec_newarr(ins)?,
            Opcode::Arrget => self.exec_arrget(ins)?,
            Opcode::Arrset => self.exec_arrset(ins)?,
            Opcode::Ldargc => self.exec_ldargc(ins)?,
            Opcode::Ntharg => self.exec_ntharg(ins)?,
            // A `CALL` jumps straight past the callee's header via
            // `CallFrame::new`'s use of `image_and_entry`, so the VM never
            // falls through into one mid-dispatch; stepping over it here
            // only matters for defensive completeness.
            Opcode::Function => self.advance(crate::consts::FUNCHDR_LEN),
            Opcode::Closure => self.exec_closure(ins)?,
            Opcode::Ldupval => self.exec_ldupval(ins)?,
        }
        Ok(())
    }

    fn advance(&mut self, words: usize) {
        self.current_mut().pc += words;
    }

    fn current(&self) -> &CallFrame {
        self.frames.last().expect("non-empty call stack")
    }

    fn current_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("non-empty call stack")
    }

    fn exec_binop(&mut self, ins: Instruction, f: impl FnOnce(&Value, &Value) -> Result<Value, PanicReason>) -> Result<(), RuntimeError> {
        let lhs = self.current().get(ins.b());
        let rhs = self.current().get(ins.c());
        let result = f(&lhs, &rhs)?;
        self.current_mut().set(ins.a(), result);
        self.advance(1);
        Ok(())
    }

    fn exec_unop(&mut self, ins: Instruction, f: impl FnOnce(&Value) -> Result<Value, PanicReason>) -> Result<(), RuntimeError> {
        let v = self.current().get(ins.b());
        let result = f(&v)?;
        self.current_mut().set(ins.a(), result);
        self.advance(1);
        Ok(())
    }

    /// `INC`/`DEC` read and write the same register (operand `A`); every
    /// other unary op reads `B` and writes `A`.
    fn exec_unop_inplace(&mut self, ins: Instruction, f: impl FnOnce(&Value) -> Result<Value, PanicReason>) -> Result<(), RuntimeError> {
        let v = self.current().get(ins.a());
        let result = f(&v)?;
        self.current_mut().set(ins.a(), result);
        self.advance(1);
        Ok(())
    }

    fn exec_mov(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let v = self.current().get(ins.b());
        self.current_mut().set(ins.a(), v);
        self.advance(1);
        Ok(())
    }

    fn exec_jmp(&mut self) -> Result<(), RuntimeError> {
        let words = self.words();
        let pc = self.current().pc;
        let offset = words[pc + 1] as i64;
        self.current_mut().pc = ((pc + 2) as i64 + offset) as usize;
        Ok(())
    }

    fn exec_jcond(&mut self, ins: Instruction, jump_if_nonzero: bool) -> Result<(), RuntimeError> {
        let cond = self.current().get(ins.a()).truthy();
        if cond == jump_if_nonzero {
            let words = self.words();
            let pc = self.current().pc;
            let offset = words[pc + 1] as i64;
            self.current_mut().pc = ((pc + 2) as i64 + offset) as usize;
        } else {
            self.advance(2);
        }
        Ok(())
    }

    fn exec_ldconst(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let kind = ConstKind::try_from(ins.b()).map_err(|e| RuntimeError::Recoverable(PanicReason::Custom(e.to_string())))?;
        let pc = self.current().pc;
        let (value, extra_words) = match kind {
            ConstKind::Nil => (Value::nil(), 0),
            ConstKind::True => (Value::bool(true), 0),
            ConstKind::False => (Value::bool(false), 0),
            ConstKind::Int => (Value::int(self.words()[pc + 1] as i64), 1),
            ConstKind::Float => (Value::float(f64::from_bits(self.words()[pc + 1])), 1),
        };
        self.current_mut().set(ins.a(), value);
        self.advance(1 + extra_words);
        Ok(())
    }

    /// `LDSYM`: symbol index packed across `A`/`B` (`OPMID`), destination
    /// register in `C` — the 16-bit index leaves no room for a register
    /// operand in the same byte pair.
    fn exec_ldsym(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let symidx = ins.opmid() as usize;
        let symtab = self.current().function.symtab().cloned().expect("a running frame always has a symtab");
        let value = symtab.resolve(symidx, |name| self.globals.get(name))?;
        self.current_mut().set(ins.c(), value);
        self.advance(1);
        Ok(())
    }

    /// `GLBVAL`: inline name length packed across `A`/`B` (`OPMID`), source
    /// register in `C`.
    fn exec_glbval(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let len = ins.opmid() as usize;
        let pc = self.current().pc;
        let name = read_inline_string(&self.words(), pc + 1, len)?;
        let value = self.current().get(ins.c());
        self.globals.set(name, value);
        self.advance(1 + padded_words(len));
        Ok(())
    }

    fn exec_newarr(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        self.current_mut().set(ins.a(), Value::array(Vec::new()));
        self.advance(1);
        Ok(())
    }

    fn exec_arrget(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let array_val = self.current().get(ins.b());
        let index_val = self.current().get(ins.c());
        let index = index_val.as_int().ok_or_else(|| PanicReason::TypeMismatch {
            expected: "int",
            actual: index_val.ty(),
        })?;
        let object = array_val.as_object().ok_or_else(|| PanicReason::TypeMismatch {
            expected: "array",
            actual: array_val.ty(),
        })?;
        let array = object.as_array().ok_or_else(|| PanicReason::TypeMismatch {
            expected: "array",
            actual: array_val.ty(),
        })?;
        let len = array.borrow().len();
        let value = array.borrow().get(index).cloned().ok_or(PanicReason::IndexOutOfBounds { index, length: len })?;
        self.current_mut().set(ins.a(), value);
        self.advance(1);
        Ok(())
    }

    fn exec_arrset(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let array_val = self.current().get(ins.a());
        let index_val = self.current().get(ins.b());
        let value = self.current().get(ins.c());
        let index = index_val.as_int().ok_or_else(|| PanicReason::TypeMismatch {
            expected: "int",
            actual: index_val.ty(),
        })?;
        let object = array_val.as_object().ok_or_else(|| PanicReason::TypeMismatch {
            expected: "array",
            actual: array_val.ty(),
        })?;
        let array = object.as_array().ok_or_else(|| PanicReason::TypeMismatch {
            expected: "array",
            actual: array_val.ty(),
        })?;
        let len = array.borrow().len();
        if !array.borrow_mut().set(index, value) {
            return Err(RuntimeError::Recoverable(PanicReason::IndexOutOfBounds { index, length: len }));
        }
        self.advance(1);
        Ok(())
    }

    fn exec_ldargc(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let argc = self.current().args.len() as i64;
        self.current_mut().set(ins.a(), Value::int(argc));
        self.advance(1);
        Ok(())
    }

    fn exec_ntharg(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let n = self.current().get(ins.b());
        let n = n.as_int().ok_or_else(|| PanicReason::TypeMismatch { expected: "int", actual: n.ty() })?;
        let value = usize::try_from(n).ok().and_then(|i| self.current().args.get(i).cloned()).unwrap_or(Value::Nil);
        self.current_mut().set(ins.a(), value);
        self.advance(1);
        Ok(())
    }

    fn exec_closure(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let dest = ins.a();
        let n = ins.b() as usize;
        let pc = self.current().pc;
        let words = self.words();

        let mut upvalues = Vec::with_capacity(n);
        for i in 0..n {
            let descriptor = Instruction::from_word(words[pc + 1 + i]);
            let kind = UpvalKind::try_from(descriptor.raw_op()).map_err(|e| RuntimeError::Recoverable(PanicReason::Custom(e.to_string())))?;
            let value = match kind {
                UpvalKind::Local => self.current().get(descriptor.a()),
                UpvalKind::Outer => self.current().function.upvalues().get(descriptor.a() as usize).cloned().unwrap_or(Value::Nil),
            };
            upvalues.push(value);
        }

        // `dest` names the register holding the not-yet-closed-over
        // prototype, loaded there earlier by `LDSYM`/`FUNCDEF`.
        let proto_val = self.current().get(dest);
        let proto = proto_val.as_object().and_then(|o| o.as_function()).and_then(|f| match f {
            Function::Script(s) => Some(s.clone()),
            _ => None,
        });
        let Some(proto) = proto else {
            return Err(RuntimeError::Recoverable(PanicReason::TypeMismatch {
                expected: "script function prototype",
                actual: proto_val.ty(),
            }));
        };

        let closure = ScriptFunction {
            def: proto.def.clone(),
            upvalues: Rc::from(upvalues),
        };
        self.current_mut().set(dest, Value::function(Function::Script(closure)));
        self.advance(1 + n);
        Ok(())
    }

    fn exec_ldupval(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let value = self.current().function.upvalues().get(ins.b() as usize).cloned().unwrap_or(Value::Nil);
        self.current_mut().set(ins.a(), value);
        self.advance(1);
        Ok(())
    }

    fn exec_call(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let dest = ins.a();
        let callee_val = self.current().get(ins.b());
        let argc = ins.c() as usize;

        let arg_words = call_arg_words(argc);
        let pc = self.current().pc;
        let words = self.words();
        let mut args = Vec::with_capacity(argc);
        for i in 0..argc {
            let reg = nth_packed_register(&words[pc + 1..pc + 1 + arg_words], i);
            args.push(self.current().get(reg));
        }
        self.advance(1 + arg_words);

        let callee = callee_val
            .as_object()
            .and_then(|o| o.as_function())
            .cloned()
            .ok_or_else(|| PanicReason::NotCallable(callee_val.ty()))?;

        if callee.is_native() {
            debug!(callee = callee.name(), "native call");
            let result = self.call_native(&callee, &args)?;
            self.current_mut().set(dest, result);
            return Ok(());
        }

        if self.frames.len() >= MAX_FUNCTION_NEST {
            return Err(RuntimeError::Recoverable(PanicReason::StackOverflow(MAX_FUNCTION_NEST)));
        }

        debug!(callee = callee.name(), argc, "call");
        self.frames.push(CallFrame::new(callee, Rc::from(args), Some(dest)));
        Ok(())
    }

    fn exec_ret(&mut self, ins: Instruction) -> Result<(), RuntimeError> {
        let value = self.current().get(ins.a());
        let dest_register = self.current().dest_register;
        self.frames.pop();

        match (dest_register, self.frames.last_mut()) {
            (Some(reg), Some(caller)) => caller.set(reg, value),
            _ => self.last_return = Some(value),
        }
        Ok(())
    }
}

fn read_inline_string(words: &[crate::consts::Word], offset: usize, len: usize) -> Result<Rc<str>, RuntimeError> {
    let bytes: Vec<u8> = words[offset..offset + padded_words(len)].iter().flat_map(|w| w.to_ne_bytes()).collect();
    let text = std::str::from_utf8(&bytes[..len])
        .map_err(|_| RuntimeError::Recoverable(PanicReason::Custom("inline string is not valid UTF-8".into())))?;
    Ok(Rc::from(text))
}
