//! CPU status flags.

use std::fmt;

/// Status flags written by arithmetic and compare instructions.
///
/// Each instruction writes only the flags its variant rules name; the others
/// keep their previous value until the next write or a reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub zero: bool,
    pub carry: bool,
    pub overflow: bool,
    pub negative: bool,
}

impl Flags {
    /// Clears all four flags.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ZF: {}  CF: {}  OF: {}  NF: {}",
            self.zero as u8, self.carry as u8, self.overflow as u8, self.negative as u8
        )
    }
}
