//! VM word size, register limits, and object-file layout constants.

use std::mem;

/// A VM word is the smallest machine-word-sized integer type, guaranteed to
/// be at least 32 bits wide. We fix it at 64 bits on all host platforms so
/// that object files built on one machine load identically on another of the
/// same endianness, regardless of native `usize` width.
pub type Word = u64;

/// Signed counterpart of [`Word`], used for jump offsets.
pub type SWord = i64;

/// Size of a [`Word`] in octets.
pub const WORD_SIZE: usize = mem::size_of::<Word>();

/// Minimum octets guaranteed to fit in a word (the spec requires >= 32 bits;
/// we provide 64, but code that cares about the portable minimum should use
/// this constant rather than [`WORD_SIZE`]).
pub const SPN_WORD_OCTETS: usize = 4;

/// Maximum number of registers in a single call frame's window.
///
/// `ARGC` and `NREGS` in a `FUNCTION` header are encoded as a single byte
/// operand (see [`crate::instruction`]), so this can never exceed 256.
pub const MAX_REGISTERS: usize = 256;

/// Maximum nesting depth of `FUNCTION` bodies the loader/disassembler will
/// walk before giving up; matches the original implementation's paranoia
/// about unbounded nesting corrupting a naive disassembler.
pub const MAX_FUNCTION_NEST: usize = 0x1000;

/// Number of words in a `FUNCTION` header, including the opcode word itself.
pub const FUNCHDR_LEN: usize = 5;

/// Index (after the opcode word) of the `SYMCNT` header field.
pub const FUNCHDR_IDX_SYMCNT: usize = 0;
/// Index (after the opcode word) of the `BODYLEN` header field.
pub const FUNCHDR_IDX_BODYLEN: usize = 1;
/// Index (after the opcode word) of the `ARGC` header field.
pub const FUNCHDR_IDX_ARGC: usize = 2;
/// Index (after the opcode word) of the `NREGS` header field.
pub const FUNCHDR_IDX_NREGS: usize = 3;

/// Lowest class UID available for host/embedder-defined object classes.
/// Values below this are reserved for the built-in kinds in §3 of the spec.
pub const USER_CLASS_UID_BASE: u32 = 0x10000;

/// Class UID of the built-in `String` object.
pub const CLASS_UID_STRING: u32 = 1;
/// Class UID of the built-in `Array` object.
pub const CLASS_UID_ARRAY: u32 = 2;
/// Class UID of the built-in `Hashmap` object.
pub const CLASS_UID_HASHMAP: u32 = 3;
/// Class UID of the built-in `Function` object.
pub const CLASS_UID_FUNCTION: u32 = 4;
