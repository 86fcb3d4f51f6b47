//! Call-stack snapshot captured at the moment a runtime error occurs.
//!
//! Grounded in the teacher's `Backtrace::from_vm_error`, which copies the
//! pieces of VM state relevant to diagnosing the failure out of the live
//! interpreter rather than holding a borrow into it. Here that is just the
//! list of function names on the call stack, innermost frame first, which
//! is exactly what `Context::stacktrace` (spec §4.5) returns to the host.

#[derive(Debug, Clone)]
pub struct Frame {
    pub function_name: String,
    /// Word offset of the instruction being executed in this frame when
    /// the error was raised (or, for an outer frame, the `CALL` it is
    /// suspended at).
    pub program_counter: usize,
}

#[derive(Debug, Clone)]
pub struct Backtrace {
    /// Innermost frame first, matching the spec's "1-frame stack trace"
    /// example for a top-level failure.
    frames: Vec<Frame>,
}

impl Backtrace {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Renders the backtrace the way `Context::stacktrace` hands it back
    /// to the host: one line per frame, innermost first.
    pub fn render(&self) -> String {
        self.frames
            .iter()
            .map(|f| format!("  at {} (+{:#x})", f.function_name, f.program_counter))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
