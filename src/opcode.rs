//! The instruction set (spec §4.1).
//!
//! Opcode numbering is not arbitrary: the disassembler (and the
//! opcode-index-stability property in spec §8) relies on three dense,
//! contiguous ranges so it can format a mnemonic by table lookup
//! (`name_table[op - RANGE_START]`) rather than a giant `match`. This is
//! lifted directly from the original implementation's disassembler, which
//! warns in-line ("beware the order of these opcodes... we rely on them
//! being in the order in which they are enumerated") — we keep the same
//! three ranges and the same internal order.

use std::convert::TryFrom;

use strum::{EnumCount, EnumIter};

/// One bytecode operation. The `#[repr(u8)]` discriminants are the on-disk
/// encoding written into bits 0-7 of an instruction word (spec §4.1); they
/// are part of the object-file format and must never be renumbered once a
/// range's internal order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    Call = 0,
    Ret = 1,
    Jmp = 2,
    Jze = 3,
    Jnz = 4,

    // --- dense comparison/arithmetic range: Eq..Mod, do not reorder ---
    Eq = 5,
    Ne = 6,
    Lt = 7,
    Le = 8,
    Gt = 9,
    Ge = 10,
    Add = 11,
    Sub = 12,
    Mul = 13,
    Div = 14,
    Mod = 15,
    // --- end dense range ---

    // --- dense bitwise range: And..Shr, do not reorder ---
    And = 16,
    Or = 17,
    Xor = 18,
    Shl = 19,
    Shr = 20,
    // --- end dense range ---

    // --- dense unary range: Bitnot..Typeof, do not reorder ---
    Bitnot = 21,
    Lognot = 22,
    Sizeof = 23,
    Typeof = 24,
    // --- end dense range ---

    Neg = 25,
    Inc = 26,
    Dec = 27,
    Concat = 28,
    Mov = 29,
    Ldconst = 30,
    Ldsym = 31,
    Glbval = 32,
    Newarr = 33,
    Arrget = 34,
    Arrset = 35,
    Ldargc = 36,
    Ntharg = 37,
    Function = 38,
    Closure = 39,
    Ldupval = 40,
}

/// Start/end (inclusive) of the dense comparison+arithmetic range.
pub const RANGE_EQ_MOD: (Opcode, Opcode) = (Opcode::Eq, Opcode::Mod);
/// Start/end (inclusive) of the dense bitwise-ternary range.
pub const RANGE_AND_SHR: (Opcode, Opcode) = (Opcode::And, Opcode::Shr);
/// Start/end (inclusive) of the dense unary range.
pub const RANGE_BITNOT_TYPEOF: (Opcode, Opcode) = (Opcode::Bitnot, Opcode::Typeof);

const EQ_MOD_NAMES: [&str; 11] = ["eq", "ne", "lt", "le", "gt", "ge", "add", "sub", "mul", "div", "mod"];
const AND_SHR_NAMES: [&str; 5] = ["and", "or", "xor", "shl", "shr"];
const BITNOT_TYPEOF_NAMES: [&str; 4] = ["bitnot", "lognot", "sizeof", "typeof"];

impl Opcode {
    pub const COUNT_U8: u8 = Self::COUNT as u8;

    /// The disassembler mnemonic for this opcode.
    pub fn mnemonic(self) -> &'static str {
        let op = self as u8;
        if (Opcode::Eq as u8..=Opcode::Mod as u8).contains(&op) {
            return EQ_MOD_NAMES[(op - Opcode::Eq as u8) as usize];
        }
        if (Opcode::And as u8..=Opcode::Shr as u8).contains(&op) {
            return AND_SHR_NAMES[(op - Opcode::And as u8) as usize];
        }
        if (Opcode::Bitnot as u8..=Opcode::Typeof as u8).contains(&op) {
            return BITNOT_TYPEOF_NAMES[(op - Opcode::Bitnot as u8) as usize];
        }
        match self {
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Jmp => "jmp",
            Opcode::Jze => "jze",
            Opcode::Jnz => "jnz",
            Opcode::Neg => "neg",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Concat => "concat",
            Opcode::Mov => "mov",
            Opcode::Ldconst => "ld",
            Opcode::Ldsym => "ld",
            Opcode::Glbval => "st",
            Opcode::Newarr => "newarr",
            Opcode::Arrget => "arrget",
            Opcode::Arrset => "arrset",
            Opcode::Ldargc => "ld",
            Opcode::Ntharg => "getarg",
            Opcode::Function => "function",
            Opcode::Closure => "closure",
            Opcode::Ldupval => "ldupval",
            _ => unreachable!("covered by dense-range branches above"),
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            0 => Call,
            1 => Ret,
            2 => Jmp,
            3 => Jze,
            4 => Jnz,
            5 => Eq,
            6 => Ne,
            7 => Lt,
            8 => Le,
            9 => Gt,
            10 => Ge,
            11 => Add,
            12 => Sub,
            13 => Mul,
            14 => Div,
            15 => Mod,
            16 => And,
            17 => Or,
            18 => Xor,
            19 => Shl,
            20 => Shr,
            21 => Bitnot,
            22 => Lognot,
            23 => Sizeof,
            24 => Typeof,
            25 => Neg,
            26 => Inc,
            27 => Dec,
            28 => Concat,
            29 => Mov,
            30 => Ldconst,
            31 => Ldsym,
            32 => Glbval,
            33 => Newarr,
            34 => Arrget,
            35 => Arrset,
            36 => Ldargc,
            37 => Ntharg,
            38 => Function,
            39 => Closure,
            40 => Ldupval,
            other => return Err(InvalidOpcode(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized opcode byte {0:#04x}")]
pub struct InvalidOpcode(pub u8);

/// The constant-kind selector carried in operand B of `LDCONST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstKind {
    Nil = 0,
    True = 1,
    False = 2,
    Int = 3,
    Float = 4,
}

impl TryFrom<u8> for ConstKind {
    type Error = InvalidOpcode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ConstKind::Nil,
            1 => ConstKind::True,
            2 => ConstKind::False,
            3 => ConstKind::Int,
            4 => ConstKind::Float,
            other => return Err(InvalidOpcode(other)),
        })
    }
}

/// The descriptor-kind selector carried in the opcode field of a `CLOSURE`
/// upvalue descriptor word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpvalKind {
    /// Capture the caller's register `A` by value.
    Local = 0,
    /// Re-capture upvalue `A` of the enclosing function.
    Outer = 1,
}

impl TryFrom<u8> for UpvalKind {
    type Error = InvalidOpcode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => UpvalKind::Local,
            1 => UpvalKind::Outer,
            other => return Err(InvalidOpcode(other)),
        })
    }
}

/// The local-symbol-table entry kind selector (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymtabKind {
    StrConst = 0,
    SymStub = 1,
    FuncDef = 2,
}

impl TryFrom<u8> for SymtabKind {
    type Error = InvalidOpcode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => SymtabKind::StrConst,
            1 => SymtabKind::SymStub,
            2 => SymtabKind::FuncDef,
            other => return Err(InvalidOpcode(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_ranges_are_contiguous_and_named_by_offset() {
        for (i, name) in EQ_MOD_NAMES.iter().enumerate() {
            let op = Opcode::try_from(Opcode::Eq as u8 + i as u8).unwrap();
            assert_eq!(op.mnemonic(), *name);
        }
        for (i, name) in AND_SHR_NAMES.iter().enumerate() {
            let op = Opcode::try_from(Opcode::And as u8 + i as u8).unwrap();
            assert_eq!(op.mnemonic(), *name);
        }
        for (i, name) in BITNOT_TYPEOF_NAMES.iter().enumerate() {
            let op = Opcode::try_from(Opcode::Bitnot as u8 + i as u8).unwrap();
            assert_eq!(op.mnemonic(), *name);
        }
    }

    #[test]
    fn roundtrips_every_discriminant() {
        for raw in 0..Opcode::COUNT_U8 {
            let op = Opcode::try_from(raw).expect("dense 0..COUNT must all decode");
            assert_eq!(op as u8, raw);
        }
    }
}
