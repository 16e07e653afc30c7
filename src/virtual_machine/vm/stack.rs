use crate::virtual_machine::program::{CodeAddr, CodeImage};
use crate::virtual_machine::word::Word;

/// One call-stack slot.
///
/// `CALL` pushes a return address, `PUSH` a plain value. Both share the
/// stack, so a `RET` that finds a value instead of an address is an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StackEntry {
    Return(CodeAddr),
    Value(Word),
}

impl StackEntry {
    /// Debug text, e.g. `Update + 0x3` or `5u`.
    pub fn describe(&self, code: &CodeImage) -> String {
        match self {
            StackEntry::Return(addr) => code.describe(*addr),
            StackEntry::Value(word) => word.to_string(),
        }
    }
}
