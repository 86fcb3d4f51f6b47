//! Tree-walking codegen from the bridge compiler's AST to the bytecode
//! format described in spec §4.1/§4.2.
//!
//! Register allocation is a simple bump counter per function scope — every
//! subexpression gets a fresh register rather than reusing dead ones. That
//! wastes registers on deeply nested expressions, but the register window
//! is per-call-frame and this compiler only ever needs to fit the small
//! programs its six end-to-end scenarios exercise.
//!
//! Nested `fn` bodies are compiled to self-contained `FUNCTION` header+body
//! blocks appended after the enclosing function's own code, each ending in
//! its own `RET` — fallthrough into a sibling or nested block can never
//! happen because every block unconditionally returns before reaching the
//! next one, so no `JMP`-over-the-nested-body instruction is needed.

use std::collections::HashMap;
use std::rc::Rc;

use crate::consts::{Word, FUNCHDR_LEN};
use crate::image::{self, FunctionHeader, ImageError, ParsedImage, SymtabEntry};
use crate::instruction::{pack_register_indices, Instruction};
use crate::opcode::{ConstKind, Opcode, UpvalKind};

use super::ast::{BinOp, Expr, Stmt};

enum UpvalSrc {
    Local(u8),
    Outer(u8),
}

struct FuncScope {
    locals: HashMap<String, u8>,
    next_reg: u8,
    max_reg: u8,
    upvalues: Vec<UpvalSrc>,
    upvalue_index: HashMap<String, u8>,
    code: Vec<Word>,
}

impl FuncScope {
    fn new(params: &[String]) -> Self {
        let mut locals = HashMap::new();
        for (i, p) in params.iter().enumerate() {
            locals.insert(p.clone(), (i + 1) as u8);
        }
        let next_reg = (params.len() + 1) as u8;
        Self {
            locals,
            next_reg,
            max_reg: next_reg.saturating_sub(1),
            upvalues: Vec::new(),
            upvalue_index: HashMap::new(),
            code: Vec::new(),
        }
    }

    fn alloc(&mut self) -> u8 {
        let reg = self.next_reg;
        self.next_reg += 1;
        self.max_reg = self.max_reg.max(reg);
        reg
    }

    fn emit(&mut self, ins: Instruction) {
        self.code.push(ins.to_word());
    }

    fn emit_word(&mut self, word: Word) {
        self.code.push(word);
    }
}

enum Resolved {
    Local(u8),
    Upvalue(u8),
    Global(usize),
}

struct Codegen {
    scopes: Vec<FuncScope>,
    symtab: Vec<SymtabEntry>,
    strings: HashMap<String, usize>,
    globals: HashMap<String, usize>,
    appended: Vec<Vec<Word>>,
    pending_funcdefs: Vec<(usize, usize)>,
    lambdas: usize,
}

impl Codegen {
    fn new() -> Self {
        Self {
            scopes: Vec::new(),
            symtab: Vec::new(),
            strings: HashMap::new(),
            globals: HashMap::new(),
            appended: Vec::new(),
            pending_funcdefs: Vec::new(),
            lambdas: 0,
        }
    }

    fn top(&mut self) -> &mut FuncScope {
        self.scopes.last_mut().expect("codegen always runs inside a function scope")
    }

    fn intern_string(&mut self, text: &str) -> usize {
        if let Some(&idx) = self.strings.get(text) {
            return idx;
        }
        let idx = self.symtab.len();
        self.symtab.push(SymtabEntry::StrConst { text: Rc::from(text) });
        self.strings.insert(text.to_string(), idx);
        idx
    }

    fn intern_global(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.globals.get(name) {
            return idx;
        }
        let idx = self.symtab.len();
        self.symtab.push(SymtabEntry::SymStub { name: Rc::from(name) });
        self.globals.insert(name.to_string(), idx);
        idx
    }

    /// Resolves `name` against the active scope chain: a same-function
    /// local, an already-captured upvalue, a local (or upvalue) of an
    /// enclosing function — captured fresh, possibly through several
    /// intermediate scopes — or, failing all of those, a global.
    fn resolve(&mut self, name: &str) -> Resolved {
        let top = self.scopes.len() - 1;
        if let Some(&reg) = self.scopes[top].locals.get(name) {
            return Resolved::Local(reg);
        }
        if let Some(&idx) = self.scopes[top].upvalue_index.get(name) {
            return Resolved::Upvalue(idx);
        }
        if let Some(idx) = resolve_upvalue(&mut self.scopes, top, name) {
            return Resolved::Upvalue(idx);
        }
        Resolved::Global(self.intern_global(name))
    }

    fn compile_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var(name, expr) => {
                let value_reg = self.compile_expr(expr);
                let local_reg = self.top().alloc();
                if local_reg != value_reg {
                    self.top().emit(Instruction::new(Opcode::Mov, local_reg, value_reg, 0));
                }
                self.top().locals.insert(name.clone(), local_reg);
            }
            Stmt::Return(Some(expr)) => {
                let reg = self.compile_expr(expr);
                if reg != 0 {
                    self.top().emit(Instruction::new(Opcode::Mov, 0, reg, 0));
                }
                self.top().emit(Instruction::new(Opcode::Ret, 0, 0, 0));
            }
            Stmt::Return(None) => {
                self.top().emit(Instruction::new(Opcode::Ret, 0, 0, 0));
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr);
            }
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> u8 {
        match expr {
            Expr::Int(n) => {
                let reg = self.top().alloc();
                self.top().emit(Instruction::new(Opcode::Ldconst, reg, ConstKind::Int as u8, 0));
                self.top().emit_word(*n as u64 as Word);
                reg
            }
            Expr::Str(s) => {
                let idx = self.intern_string(s);
                let reg = self.top().alloc();
                self.top().emit(symidx(Opcode::Ldsym, idx, reg));
                reg
            }
            Expr::Array(items) => {
                let array_reg = self.top().alloc();
                self.top().emit(Instruction::new(Opcode::Newarr, array_reg, 0, 0));
                for (i, item) in items.iter().enumerate() {
                    let value_reg = self.compile_expr(item);
                    let index_reg = self.compile_expr(&Expr::Int(i as i64));
                    self.top().emit(Instruction::new(Opcode::Arrset, array_reg, index_reg, value_reg));
                }
                array_reg
            }
            Expr::Ident(name) => match self.resolve(name) {
                Resolved::Local(reg) => reg,
                Resolved::Upvalue(idx) => {
                    let reg = self.top().alloc();
                    self.top().emit(Instruction::new(Opcode::Ldupval, reg, idx, 0));
                    reg
                }
                Resolved::Global(idx) => {
                    let reg = self.top().alloc();
                    self.top().emit(symidx(Opcode::Ldsym, idx, reg));
                    reg
                }
            },
            Expr::Binary(op, lhs, rhs) => {
                let lreg = self.compile_expr(lhs);
                let rreg = self.compile_expr(rhs);
                let reg = self.top().alloc();
                let opcode = match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                };
                self.top().emit(Instruction::new(opcode, reg, lreg, rreg));
                reg
            }
            Expr::Call(callee, args) => {
                let callee_reg = self.compile_expr(callee);
                let arg_regs: Vec<u8> = args.iter().map(|a| self.compile_expr(a)).collect();
                let dest = self.top().alloc();
                self.top().emit(Instruction::new(Opcode::Call, dest, callee_reg, arg_regs.len() as u8));
                for word in pack_register_indices(&arg_regs) {
                    self.top().emit_word(word);
                }
                dest
            }
            Expr::Index(base, index) => {
                let base_reg = self.compile_expr(base);
                let index_reg = self.compile_expr(index);
                let dest = self.top().alloc();
                self.top().emit(Instruction::new(Opcode::Arrget, dest, base_reg, index_reg));
                dest
            }
            Expr::Sizeof(inner) => {
                let reg = self.compile_expr(inner);
                let dest = self.top().alloc();
                self.top().emit(Instruction::new(Opcode::Sizeof, dest, reg, 0));
                dest
            }
            Expr::Fn(params, body) => self.compile_fn(params, body),
        }
    }

    fn compile_fn(&mut self, params: &[String], body: &[Stmt]) -> u8 {
        self.scopes.push(FuncScope::new(params));
        self.compile_block(body);
        self.top().emit(Instruction::new(Opcode::Ret, 0, 0, 0));
        let scope = self.scopes.pop().expect("scope pushed immediately above");

        let argc = params.len() as u8;
        let nregs = scope.max_reg.max(argc).saturating_add(1);
        let bodylen = scope.code.len() as u32;

        let mut block = Vec::with_capacity(FUNCHDR_LEN + scope.code.len());
        block.push(Instruction::new(Opcode::Function, 0, 0, 0).to_word());
        block.push(0); // nested symcnt: unused, only the top-level symtab is ever walked
        block.push(bodylen as Word);
        block.push(argc as Word);
        block.push(nregs as Word);
        block.extend(scope.code.iter().copied());

        let block_index = self.appended.len();
        self.appended.push(block);

        self.lambdas += 1;
        let name: Rc<str> = Rc::from(format!("<lambda{}>", self.lambdas));
        let symtab_index = self.symtab.len();
        self.symtab.push(SymtabEntry::FuncDef { offset: 0, name });
        self.pending_funcdefs.push((symtab_index, block_index));

        let reg = self.top().alloc();
        self.top().emit(symidx(Opcode::Ldsym, symtab_index, reg));

        if !scope.upvalues.is_empty() {
            self.top().emit(Instruction::new(Opcode::Closure, reg, scope.upvalues.len() as u8, 0));
            for upval in &scope.upvalues {
                let word = match upval {
                    UpvalSrc::Local(src) => Instruction::from_raw(UpvalKind::Local as u8, *src, 0, 0).to_word(),
                    UpvalSrc::Outer(idx) => Instruction::from_raw(UpvalKind::Outer as u8, *idx, 0, 0).to_word(),
                };
                self.top().emit_word(word);
            }
        }

        reg
    }

    fn finish(mut self, top_scope: FuncScope, argc: u8) -> Result<ParsedImage, ImageError> {
        let nregs = top_scope.max_reg.max(argc).saturating_add(1);
        let bodylen = (top_scope.code.len() + self.appended.iter().map(Vec::len).sum::<usize>()) as u32;

        let mut words = Vec::with_capacity(FUNCHDR_LEN + bodylen as usize);
        words.push(Instruction::new(Opcode::Function, 0, 0, 0).to_word());
        words.push(self.symtab.len() as Word);
        words.push(bodylen as Word);
        words.push(argc as Word);
        words.push(nregs as Word);
        words.extend(top_scope.code.iter().copied());

        let mut offset = FUNCHDR_LEN + top_scope.code.len();
        let mut block_offsets = Vec::with_capacity(self.appended.len());
        for block in &self.appended {
            block_offsets.push(offset);
            offset += block.len();
            words.extend(block.iter().copied());
        }

        for (symtab_idx, block_idx) in &self.pending_funcdefs {
            if let SymtabEntry::FuncDef { offset, .. } = &mut self.symtab[*symtab_idx] {
                *offset = block_offsets[*block_idx];
            }
        }

        let header = FunctionHeader {
            symcnt: self.symtab.len() as u32,
            bodylen,
            argc,
            nregs,
        };
        let partial = ParsedImage {
            words: Rc::from(words),
            header,
            entry: 0,
            symtab: self.symtab,
        };
        let full_words = image::encode(&partial);
        image::parse(Rc::from(full_words))
    }
}

/// Builds an `LDSYM`/`GLBVAL`-style instruction whose 16-bit immediate
/// (here, a local-symbol-table index) is packed across operands A and B,
/// leaving operand C free for the register operand.
fn symidx(op: Opcode, idx: usize, reg: u8) -> Instruction {
    Instruction::new(op, (idx & 0xff) as u8, ((idx >> 8) & 0xff) as u8, reg)
}

/// Walks the scope chain outward from `level`, finding the nearest
/// enclosing scope that already owns `name` (as a local or an upvalue),
/// then threads one upvalue hop through every intermediate scope between
/// that owner and `level`.
fn resolve_upvalue(scopes: &mut [FuncScope], level: usize, name: &str) -> Option<u8> {
    let mut owner = None;
    for l in (0..level).rev() {
        if scopes[l].locals.contains_key(name) {
            owner = Some((l, true));
            break;
        }
        if scopes[l].upvalue_index.contains_key(name) {
            owner = Some((l, false));
            break;
        }
    }
    let (owner_level, is_local) = owner?;

    let mut src = if is_local {
        UpvalSrc::Local(*scopes[owner_level].locals.get(name).expect("just matched"))
    } else {
        UpvalSrc::Outer(*scopes[owner_level].upvalue_index.get(name).expect("just matched"))
    };

    let mut idx = 0;
    for l in (owner_level + 1)..=level {
        idx = add_upvalue(&mut scopes[l], src, name);
        src = UpvalSrc::Outer(idx);
    }
    Some(idx)
}

fn add_upvalue(scope: &mut FuncScope, src: UpvalSrc, name: &str) -> u8 {
    if let Some(&idx) = scope.upvalue_index.get(name) {
        return idx;
    }
    let idx = scope.upvalues.len() as u8;
    scope.upvalues.push(src);
    scope.upvalue_index.insert(name.to_string(), idx);
    idx
}

pub(super) fn compile_program(stmts: &[Stmt]) -> Result<ParsedImage, ImageError> {
    let mut cg = Codegen::new();
    cg.scopes.push(FuncScope::new(&[]));
    cg.compile_block(stmts);
    cg.top().emit(Instruction::new(Opcode::Ret, 0, 0, 0));
    let scope = cg.scopes.pop().expect("top-level scope pushed immediately above");
    cg.finish(scope, 0)
}

pub(super) fn compile_expr(expr: &Expr) -> Result<ParsedImage, ImageError> {
    let mut cg = Codegen::new();
    cg.scopes.push(FuncScope::new(&[]));
    let reg = cg.compile_expr(expr);
    if reg != 0 {
        cg.top().emit(Instruction::new(Opcode::Mov, 0, reg, 0));
    }
    cg.top().emit(Instruction::new(Opcode::Ret, 0, 0, 0));
    let scope = cg.scopes.pop().expect("top-level scope pushed immediately above");
    cg.finish(scope, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ast::Stmt as AstStmt, lexer::Lexer, parser::Parser};
    use crate::loader;
    use crate::interner::StringInterner;

    fn compile(src: &str) -> ParsedImage {
        let tokens = Lexer::tokenize(src).unwrap();
        let stmts: Vec<AstStmt> = Parser::new(&tokens).parse_program().unwrap();
        compile_program(&stmts).unwrap()
    }

    #[test]
    fn compiles_and_loads_a_literal_program() {
        let image = compile("var a = 2 + 3;");
        let mut interner = StringInterner::new();
        loader::load(&image, &mut interner).expect("a simple program should load");
    }

    #[test]
    fn compiles_nested_closure_with_funcdef_offset() {
        let image = compile("var f = fn(x) { return x * x; };");
        assert_eq!(image.symtab.len(), 1);
        match &image.symtab[0] {
            SymtabEntry::FuncDef { offset, .. } => assert!(*offset >= FUNCHDR_LEN),
            other => panic!("expected a FuncDef entry, got {other:?}"),
        }
        let mut interner = StringInterner::new();
        loader::load(&image, &mut interner).expect("closure program should load");
    }
}
