//! Object-file parsing and re-encoding (spec §4.2, §6).
//!
//! An object file is a flat word array holding exactly one top-level
//! `FUNCTION`: its header, its body, and its local symbol table. Parsing
//! here is deliberately inert — it produces a [`ParsedImage`] describing
//! offsets into the shared word buffer without allocating any live
//! `Value`/`Object`; [`crate::loader`] is the next stage that turns a
//! `ParsedImage` into heap objects bound to a `Context`. This mirrors the
//! teacher's split between a validated-but-inert `CheckedTransaction` and
//! the live `Interpreter` it feeds.

use std::convert::TryFrom;
use std::rc::Rc;

use itertools::Itertools;

use crate::consts::{Word, FUNCHDR_IDX_ARGC, FUNCHDR_IDX_BODYLEN, FUNCHDR_IDX_NREGS, FUNCHDR_IDX_SYMCNT, FUNCHDR_LEN, WORD_SIZE};
use crate::instruction::{padded_words, Instruction};
use crate::opcode::{Opcode, SymtabKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionHeader {
    pub symcnt: u32,
    pub bodylen: u32,
    pub argc: u8,
    pub nregs: u8,
}

/// One parsed local-symbol-table entry (spec §4.2). String payloads are
/// sliced directly out of the shared word buffer, not copied.
#[derive(Debug, Clone)]
pub enum SymtabEntry {
    StrConst { text: Rc<str> },
    SymStub { name: Rc<str> },
    FuncDef { offset: usize, name: Rc<str> },
}

/// A parsed, validated object-file image: the top-level header, the word
/// range that is its body, and its symbol table. Shares the underlying
/// `Rc<[Word]>` with every [`crate::object::Function`] created from it.
#[derive(Debug, Clone)]
pub struct ParsedImage {
    pub words: Rc<[Word]>,
    pub header: FunctionHeader,
    /// Word offset of the top-level `FUNCTION` opcode word (always 0).
    pub entry: usize,
    pub symtab: Vec<SymtabEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("object file length ({0} bytes) is not a multiple of the word size")]
    MisalignedLength(usize),
    #[error("object file is empty")]
    Empty,
    #[error("word 0 is not a FUNCTION header (found opcode {0:#04x})")]
    MissingTopLevelHeader(u8),
    #[error("FUNCTION header declares argc ({argc}) greater than nregs ({nregs})")]
    ArgcExceedsNregs { argc: u8, nregs: u8 },
    #[error("object file truncated: header/body claims {0} words but only {1} are present")]
    TruncatedBody(usize, usize),
    #[error("symbol table entry {index} has unknown kind {kind:#04x}")]
    UnknownSymtabKind { index: usize, kind: u8 },
    #[error("symbol table entry {index}: declared length {declared} does not match actual NUL-terminated length {actual}")]
    LengthMismatch { index: usize, declared: usize, actual: usize },
    #[error("symbol table entry {index} payload is not valid UTF-8")]
    InvalidUtf8 { index: usize },
    #[error("symbol table entry {index} payload runs past the end of the file")]
    TruncatedSymtab { index: usize },
    #[error("object file has {extra} trailing word(s) after the symbol table")]
    TrailingData { extra: usize },
}

/// Splits a raw byte buffer into native-endian words. Object files are not
/// portable across differing endianness/word-width hosts (spec §6); we
/// only promise round-tripping on the host that wrote the file.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    if bytes.len() % WORD_SIZE != 0 {
        return Err(ImageError::MisalignedLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(WORD_SIZE)
        .map(|chunk| Word::from_ne_bytes(chunk.try_into().unwrap()))
        .collect())
}

pub fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_ne_bytes()).collect_vec()
}

/// Reads a NUL-terminated string starting at `words[offset]`, returning the
/// string and the number of whole words it (plus its terminator) occupies.
fn read_cstring(words: &[Word], offset: usize, declared_len: usize, index: usize) -> Result<(Rc<str>, usize), ImageError> {
    let bytes = words_to_bytes(words);
    let start = offset * WORD_SIZE;
    if start > bytes.len() {
        return Err(ImageError::TruncatedSymtab { index });
    }
    let nul_pos = bytes[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(ImageError::TruncatedSymtab { index })?;
    if nul_pos != declared_len {
        return Err(ImageError::LengthMismatch {
            index,
            declared: declared_len,
            actual: nul_pos,
        });
    }
    let text = std::str::from_utf8(&bytes[start..start + nul_pos])
        .map_err(|_| ImageError::InvalidUtf8 { index })?
        .to_owned();
    Ok((Rc::from(text), padded_words(nul_pos)))
}

/// Parses a whole object-file image out of `words` (spec §4.2/§4.3).
pub fn parse(words: Rc<[Word]>) -> Result<ParsedImage, ImageError> {
    if words.is_empty() {
        return Err(ImageError::Empty);
    }

    let head = Instruction::from_word(words[0]);
    if head.raw_op() != Opcode::Function as u8 {
        return Err(ImageError::MissingTopLevelHeader(head.raw_op()));
    }
    if words.len() < FUNCHDR_LEN {
        return Err(ImageError::TruncatedBody(FUNCHDR_LEN, words.len()));
    }

    let header = FunctionHeader {
        symcnt: words[1 + FUNCHDR_IDX_SYMCNT] as u32,
        bodylen: words[1 + FUNCHDR_IDX_BODYLEN] as u32,
        argc: words[1 + FUNCHDR_IDX_ARGC] as u8,
        nregs: words[1 + FUNCHDR_IDX_NREGS] as u8,
    };
    if header.argc > header.nregs {
        return Err(ImageError::ArgcExceedsNregs {
            argc: header.argc,
            nregs: header.nregs,
        });
    }

    let symtab_off = FUNCHDR_LEN + header.bodylen as usize;
    if symtab_off > words.len() {
        return Err(ImageError::TruncatedBody(symtab_off, words.len()));
    }

    let mut cursor = symtab_off;
    let mut symtab = Vec::with_capacity(header.symcnt as usize);
    for index in 0..header.symcnt as usize {
        if cursor >= words.len() {
            return Err(ImageError::TruncatedSymtab { index });
        }
        let tag = Instruction::from_word(words[cursor]);
        let kind = SymtabKind::try_from(tag.raw_op())
            .map_err(|_| ImageError::UnknownSymtabKind { index, kind: tag.raw_op() })?;
        cursor += 1;

        match kind {
            SymtabKind::StrConst => {
                let declared = tag.oplong() as usize;
                let (text, words_used) = read_cstring(&words, cursor, declared, index)?;
                cursor += words_used;
                symtab.push(SymtabEntry::StrConst { text });
            }
            SymtabKind::SymStub => {
                let declared = tag.oplong() as usize;
                let (name, words_used) = read_cstring(&words, cursor, declared, index)?;
                cursor += words_used;
                symtab.push(SymtabEntry::SymStub { name });
            }
            SymtabKind::FuncDef => {
                if cursor + 2 > words.len() {
                    return Err(ImageError::TruncatedSymtab { index });
                }
                let offset = words[cursor] as usize;
                let namelen = words[cursor + 1] as usize;
                cursor += 2;
                let (name, words_used) = read_cstring(&words, cursor, namelen, index)?;
                cursor += words_used;
                symtab.push(SymtabEntry::FuncDef { offset, name });
            }
        }
    }

    if cursor != words.len() {
        return Err(ImageError::TrailingData { extra: words.len() - cursor });
    }

    Ok(ParsedImage {
        words,
        header,
        entry: 0,
        symtab,
    })
}

/// Re-encodes a NUL-terminated, word-padded string literal.
fn encode_cstring(out: &mut Vec<Word>, text: &str) {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    bytes.resize(padded_words(text.len()) * WORD_SIZE, 0);
    out.extend(bytes_to_words(&bytes).expect("padded to a whole number of words"));
}

/// Re-emits `image` as a fresh word buffer. For any image produced by
/// [`parse`], `encode(&parse(words)?) == words[..]` (the header round-trip
/// property, spec §8) — the body is copied verbatim and the symbol table
/// is regenerated from the same structured data `parse` extracted from it.
pub fn encode(image: &ParsedImage) -> Vec<Word> {
    let mut out = Vec::with_capacity(image.words.len());
    let body_end = FUNCHDR_LEN + image.header.bodylen as usize;
    out.extend_from_slice(&image.words[..body_end]);

    for entry in &image.symtab {
        match entry {
            SymtabEntry::StrConst { text } => {
                out.push(encode_symtab_tag(SymtabKind::StrConst, text.len() as u32));
                encode_cstring(&mut out, text);
            }
            SymtabEntry::SymStub { name } => {
                out.push(encode_symtab_tag(SymtabKind::SymStub, name.len() as u32));
                encode_cstring(&mut out, name);
            }
            SymtabEntry::FuncDef { offset, name } => {
                out.push(encode_symtab_tag(SymtabKind::FuncDef, 0));
                out.push(*offset as Word);
                out.push(name.len() as Word);
                encode_cstring(&mut out, name);
            }
        }
    }

    out
}

/// Packs a symtab tag byte (kind selector) plus a 24-bit immediate into one
/// word, the same `(op, oplong)` layout [`Instruction::with_oplong`] uses —
/// symtab tag words are never dispatched as instructions, so we pack the
/// bits directly rather than going through `Opcode`.
fn encode_symtab_tag(kind: SymtabKind, oplong: u32) -> Word {
    (kind as u32 | (oplong << 8)) as Word
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::Word;

    fn build_trivial_image() -> Vec<Word> {
        // FUNCTION header: symcnt=1, bodylen=1, argc=0, nregs=1
        let mut words = vec![
            Instruction::new(Opcode::Function, 0, 0, 0).to_word(),
            1, // symcnt
            1, // bodylen
            0, // argc
            1, // nregs
        ];
        // body: a single RET r0
        words.push(Instruction::new(Opcode::Ret, 0, 0, 0).to_word());
        // symtab: one string constant "hi"
        words.push(encode_symtab_tag(SymtabKind::StrConst, 2));
        let mut payload = b"hi\0".to_vec();
        payload.resize(padded_words(2) * WORD_SIZE, 0);
        words.extend(bytes_to_words(&payload).unwrap());
        words
    }

    #[test]
    fn parses_trivial_image() {
        let words = build_trivial_image();
        let parsed = parse(Rc::from(words.clone())).unwrap();
        assert_eq!(parsed.header.symcnt, 1);
        assert_eq!(parsed.symtab.len(), 1);
        match &parsed.symtab[0] {
            SymtabEntry::StrConst { text } => assert_eq!(&**text, "hi"),
            _ => panic!("expected a string constant"),
        }
    }

    #[test]
    fn header_round_trip() {
        let words = build_trivial_image();
        let parsed = parse(Rc::from(words.clone())).unwrap();
        let re_encoded = encode(&parsed);
        assert_eq!(re_encoded, words);
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut words = build_trivial_image();
        // Corrupt the declared string length.
        let tag_idx = FUNCHDR_LEN + 1;
        words[tag_idx] = encode_symtab_tag(SymtabKind::StrConst, 99);
        let err = parse(Rc::from(words)).unwrap_err();
        assert!(matches!(err, ImageError::LengthMismatch { .. }));
    }
}
