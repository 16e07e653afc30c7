use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::word::{REGISTER_COUNT, Word};

/// Highest register an arithmetic result may be written to.
pub const GENERAL_REGISTER_MAX: u16 = 7;

/// Highest register index overall.
pub const REGISTER_MAX: u16 = REGISTER_COUNT as u16 - 1;

/// Registers written by the host rather than by programs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputRegister {
    /// Last key pressed.
    Key = 8,
    /// Pointer button state.
    Pointer = 9,
    /// Pointer X, signed.
    PointerX = 10,
    /// Pointer Y, signed.
    PointerY = 11,
}

impl InputRegister {
    pub const fn index(self) -> u16 {
        self as u16
    }
}

/// Register file.
///
/// `R0`..`R7` are general purpose, `R8`..`R11` carry input state (see
/// [`InputRegister`]). Pointer coordinates start out signed, everything else
/// unsigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Registers {
    regs: [Word; REGISTER_COUNT],
}

impl Registers {
    pub(super) fn new() -> Self {
        let mut regs = [Word::Unsigned16(0); REGISTER_COUNT];
        regs[InputRegister::PointerX as usize] = Word::Signed16(0);
        regs[InputRegister::PointerY as usize] = Word::Signed16(0);
        Self { regs }
    }

    pub(super) fn as_array(&self) -> &[Word; REGISTER_COUNT] {
        &self.regs
    }

    /// Reads any register.
    ///
    /// Returns [`VMError::InvalidRegister`] if `idx` is past `R11`.
    pub(super) fn get(&self, idx: u16) -> Result<Word, VMError> {
        self.regs
            .get(idx as usize)
            .copied()
            .ok_or(VMError::InvalidRegister { index: idx })
    }

    /// Reads a general-purpose register, `R0`..`R7`.
    pub(super) fn get_general(&self, idx: u16) -> Result<Word, VMError> {
        check_general(idx)?;
        self.get(idx)
    }

    /// Stores into any register.
    pub(super) fn set(&mut self, idx: u16, value: Word) -> Result<(), VMError> {
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(VMError::InvalidRegister { index: idx })?;
        *slot = value;
        Ok(())
    }

    /// Stores into a general-purpose register, `R0`..`R7`.
    pub(super) fn set_general(&mut self, idx: u16, value: Word) -> Result<(), VMError> {
        check_general(idx)?;
        self.set(idx, value)
    }

    pub(super) fn set_input(&mut self, reg: InputRegister, value: Word) {
        self.regs[reg as usize] = value;
    }

    /// Replaces a register reference with its register's content.
    pub(super) fn resolve(&self, value: Word) -> Result<Word, VMError> {
        value.resolve(&self.regs)
    }

    /// Zeroes `R0`..`R7`; input registers keep their state.
    pub(super) fn clear_general(&mut self) {
        for reg in &mut self.regs[..=GENERAL_REGISTER_MAX as usize] {
            *reg = Word::Unsigned16(0);
        }
    }
}

fn check_general(idx: u16) -> Result<(), VMError> {
    if idx > GENERAL_REGISTER_MAX {
        return Err(VMError::InvalidRegister { index: idx });
    }
    Ok(())
}
