//! Materializes a [`crate::image::ParsedImage`] into live heap objects
//! (spec §4.3).
//!
//! Parsing (`image::parse`) is pure and side-effect free; loading is the
//! stage that actually allocates `Value`s — interned strings, `Function`
//! objects for `FUNCDEF`s, and the shared [`LocalSymtab`] `LDSYM` indexes
//! against for the lifetime of every function in this image. This mirrors
//! the teacher's separation of a validated-but-inert `CheckedTransaction`
//! from the live `Interpreter` built from it.

use std::rc::Rc;

use itertools::Itertools;
use tracing::debug;

use crate::consts::{FUNCHDR_IDX_ARGC, FUNCHDR_IDX_BODYLEN, FUNCHDR_IDX_NREGS, FUNCHDR_LEN, Word};
use crate::image::{ImageError, ParsedImage, SymtabEntry};
use crate::interner::StringInterner;
use crate::object::function::{ScriptDef, ScriptFunction, TopLevelProgram};
use crate::object::Function;
use crate::symtab::{LocalSymbol, LocalSymtab};
use crate::value::Value;

/// Reads the `(bodylen, argc, nregs)` fields of the `FUNCTION` header
/// located at word offset `entry` within `words` — used for nested headers
/// a `FUNCDEF` symtab entry points at (the top-level header at offset 0 is
/// already validated by [`crate::image::parse`]).
fn read_nested_header(words: &[Word], entry: usize) -> Result<(u32, u8, u8), ImageError> {
    if entry + FUNCHDR_LEN > words.len() {
        return Err(ImageError::TruncatedBody(entry + FUNCHDR_LEN, words.len()));
    }
    Ok((
        words[entry + 1 + FUNCHDR_IDX_BODYLEN] as u32,
        words[entry + 1 + FUNCHDR_IDX_ARGC] as u8,
        words[entry + 1 + FUNCHDR_IDX_NREGS] as u8,
    ))
}

/// Loads `image` into a top-level [`Function`] ready to be called. String
/// literals are interned through `interner` so that identical literal text
/// loaded from different object files (or successive REPL entries) shares
/// one allocation — an optimization invisible to anything but
/// `Rc::ptr_eq`, per §4.3's interning note.
pub fn load(image: &ParsedImage, interner: &mut StringInterner) -> Result<Value, ImageError> {
    debug!(symcnt = image.symtab.len(), bodylen = image.header.bodylen, "loading object image");

    // `FUNCDEF` entries need an `Rc<LocalSymtab>` for their `ScriptDef`,
    // but the symtab itself is built from this same entry list. Seed
    // `FUNCDEF` slots with a placeholder stub (never actually resolved
    // against globals, since we immediately patch it below) and fill in
    // the real closures once `symtab` exists to hand them.
    let mut entries = Vec::with_capacity(image.symtab.len());
    for entry in &image.symtab {
        let seed = match entry {
            SymtabEntry::StrConst { text } => LocalSymbol::Value(Value::string(interner.intern(text))),
            SymtabEntry::SymStub { name } => LocalSymbol::Stub(name.clone()),
            SymtabEntry::FuncDef { name, .. } => LocalSymbol::Stub(name.clone()),
        };
        entries.push(seed);
    }

    let symtab = Rc::new(LocalSymtab::new(entries));

    for (index, entry) in image.symtab.iter().enumerate() {
        if let SymtabEntry::FuncDef { offset, name } = entry {
            let (_bodylen, argc, nregs) =
                read_nested_header(&image.words, *offset).map_err(|_| ImageError::TruncatedSymtab { index })?;
            let def = ScriptDef {
                image: image.words.clone(),
                entry: *offset,
                argc,
                nregs,
                name: Some(name.clone()),
                symtab: symtab.clone(),
            };
            let value = Value::function(Function::Script(ScriptFunction {
                def: Rc::new(def),
                upvalues: Rc::from(Vec::new()),
            }));
            symtab.patch(index, value);
        }
    }

    let top = TopLevelProgram {
        image: image.words.clone(),
        argc: image.header.argc,
        nregs: image.header.nregs,
        symtab,
    };

    Ok(Value::function(Function::TopLevel(Rc::new(top))))
}

/// Diagnostic summary of an image's symbol table, used by tests and by the
/// `compiler` module's bridge codegen to report what it emitted.
pub fn symtab_summary(image: &ParsedImage) -> String {
    image
        .symtab
        .iter()
        .map(|e| match e {
            SymtabEntry::StrConst { text } => format!("str {text:?}"),
            SymtabEntry::SymStub { name } => format!("stub {name}"),
            SymtabEntry::FuncDef { offset, name } => format!("funcdef {name}@{offset:#x}"),
        })
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;

    fn build_image_with_one_funcdef() -> ParsedImage {
        // Outer FUNCTION: symcnt=1, bodylen=6, argc=0, nregs=1.
        let mut words = vec![
            Instruction::new(Opcode::Function, 0, 0, 0).to_word(),
            1,
            6,
            0,
            1,
        ];
        // body (6 words, starting at index 5): a nested FUNCTION header
        // (argc=0, nregs=1 — its own symcnt/bodylen fields are unused,
        // since only the top-level symtab is ever walked) followed by RET.
        words.push(Instruction::new(Opcode::Function, 0, 0, 0).to_word()); // index 5
        words.push(1); // nested symcnt, unused
        words.push(1); // nested bodylen, unused
        words.push(0); // nested argc
        words.push(1); // nested nregs
        words.push(Instruction::new(Opcode::Ret, 0, 0, 0).to_word()); // index 10
        // symtab (starts at index 11): one FuncDef naming "help", pointing
        // at the nested header above (offset 5).
        words.push(2); // SymtabKind::FuncDef
        words.push(5); // offset
        words.push(4); // namelen
        let mut payload = b"help\0".to_vec();
        payload.resize(crate::instruction::padded_words(4) * crate::consts::WORD_SIZE, 0);
        words.extend(crate::image::bytes_to_words(&payload).unwrap());
        crate::image::parse(Rc::from(words)).expect("well-formed test image")
    }

    #[test]
    fn loads_funcdef_as_callable_script_function() {
        let parsed = build_image_with_one_funcdef();
        let mut interner = StringInterner::new();
        let top = load(&parsed, &mut interner).expect("load should succeed");

        let top_fn = top.as_object().unwrap().as_function().unwrap();
        let symtab = top_fn.symtab().unwrap();
        assert!(symtab.is_resolved(0));
    }
}
