use chipcade_derive::Error;

/// Errors raised while assembling modules or executing instructions.
///
/// The set is deliberately flat: the console shows [`VMError::kind_name`] next
/// to the message and every kind halts the CPU the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    /// Source line could not be decoded into an instruction.
    #[error("line {line}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    /// Label defined twice in the same module.
    #[error("line {line}: duplicate label {label}")]
    DuplicateLabel { line: usize, label: String },
    /// A code module with this name already exists.
    #[error("duplicate module {0}")]
    DuplicateModule(String),
    /// No code module with this name exists.
    #[error("unknown module {0}")]
    UnknownModule(String),
    /// Register index outside the range allowed for the operand.
    #[error("invalid register R{index}")]
    InvalidRegister { index: u16 },
    /// Memory block unknown or offset past its end.
    #[error("invalid memory address {block} + {offset:#x}")]
    InvalidMemoryAddress { block: String, offset: usize },
    /// Jump or call target that does not resolve, or a non-address return entry.
    #[error("invalid code address {0}")]
    InvalidCodeAddress(String),
    /// Compared words carry different variants.
    #[error("cannot compare {lhs} with {rhs}")]
    InvalidComparison { lhs: &'static str, rhs: &'static str },
    /// Arithmetic on mismatched variants, unsupported variant, or division by zero.
    #[error("invalid arithmetic {op} on {lhs} and {rhs}")]
    InvalidArithmetic {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    /// `SPRSET` names an image group that does not exist.
    #[error("invalid image group {0}")]
    InvalidImageGroup(String),
    /// Layer index outside 0..=7.
    #[error("invalid layer index {0}")]
    InvalidLayerIndex(i32),
    /// Sprite index outside 0..=255.
    #[error("invalid sprite index {0}")]
    InvalidSpriteIndex(i32),
    /// Resolution string malformed or out of 1..=9999.
    #[error("invalid resolution {0}")]
    InvalidResolution(String),
    /// Font not known to the host.
    #[error("unknown font {0}")]
    UnknownFont(String),
    /// Reading a source file failed.
    #[error("io error: {0}")]
    Io(String),
}
