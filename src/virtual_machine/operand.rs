//! Typed instruction operands.
//!
//! Each operand kind owns its text syntax: `parse` accepts what the decoder
//! reads and `Display` writes the canonical form back.
//!
//! | Kind          | Syntax                                   |
//! |---------------|------------------------------------------|
//! | [`CodeTarget`]| `Tag`, `Module.Tag`                      |
//! | [`MemRef`]    | `Block`, `Block + 0x10`, `Block+16`      |
//! | [`ObjRef`]    | `S5` / `L2` literal, `R3` via register   |
//! | [`Resolution`]| `320x200`                                |

use crate::virtual_machine::word::parse_register_index;
use std::fmt;

/// Highest register that may hold a sprite or layer index.
pub const OBJECT_REGISTER_MAX: u16 = 7;

/// Whether `name` can be used as a label: non-empty, no whitespace, `.` or
/// `+`, and not starting with a digit.
pub fn is_valid_label(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !name.contains(|c: char| {
            c.is_whitespace() || matches!(c, '.' | ':' | '#' | ',' | '+')
        })
}

/// Jump or call destination.
///
/// `module` is `None` for labels in the current module.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodeTarget {
    pub module: Option<String>,
    pub tag: String,
}

impl CodeTarget {
    pub fn local(tag: impl Into<String>) -> Self {
        Self {
            module: None,
            tag: tag.into(),
        }
    }

    pub fn in_module(module: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            tag: tag.into(),
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.split_once('.') {
            Some((module, tag)) if !module.is_empty() && is_valid_label(tag) => {
                Some(Self::in_module(module, tag))
            }
            Some(_) => None,
            None if is_valid_label(text) => Some(Self::local(text)),
            None => None,
        }
    }
}

impl fmt::Display for CodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}.{}", self.tag),
            None => f.write_str(&self.tag),
        }
    }
}

/// Named memory block plus word offset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemRef {
    pub block: String,
    pub offset: u16,
}

impl MemRef {
    pub fn new(block: impl Into<String>, offset: u16) -> Self {
        Self {
            block: block.into(),
            offset,
        }
    }

    /// Parses `Block` or `Block+offset`; the offset is decimal or `0x` hex.
    ///
    /// The tokenizer has already glued whitespace around `+`.
    pub fn parse(text: &str) -> Option<Self> {
        let (block, offset) = match text.split_once('+') {
            Some((block, offset)) => (block.trim(), parse_offset(offset.trim())?),
            None => (text.trim(), 0),
        };
        is_valid_label(block).then(|| Self::new(block, offset))
    }

    /// Reference `n` words further into the same block.
    pub fn advanced(&self, n: u16) -> Option<Self> {
        Some(Self::new(self.block.clone(), self.offset.checked_add(n)?))
    }
}

fn parse_offset(text: &str) -> Option<u16> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            f.write_str(&self.block)
        } else {
            write!(f, "{} + {:#X}", self.block, self.offset)
        }
    }
}

/// Sprite or layer selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjRef {
    /// Literal index (`S5`, `L2`).
    Index(u16),
    /// Index read from a general register (`R3`).
    Register(u16),
}

impl ObjRef {
    /// Parses `<prefix><n>` or `R<n>`.
    pub fn parse(text: &str, prefix: char) -> Option<Self> {
        if let Some(reg) = parse_register_index(text) {
            return Some(ObjRef::Register(reg));
        }
        let mut chars = text.chars();
        let first = chars.next()?;
        if !first.eq_ignore_ascii_case(&prefix) {
            return None;
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(ObjRef::Index)
    }

    /// Canonical text with the literal `prefix`.
    pub fn to_text(self, prefix: char) -> String {
        match self {
            ObjRef::Index(i) => format!("{prefix}{i}"),
            ObjRef::Register(r) => format!("R{r}"),
        }
    }
}

/// Layer resolution text, validated when the instruction runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Resolution(pub String);

impl Resolution {
    pub const MAX_SIDE: u16 = 9999;

    /// Width and height if both are in `1..=9999`.
    pub fn dimensions(&self) -> Option<(u16, u16)> {
        let (w, h) = self.0.split_once(['x', 'X'])?;
        let w: u16 = w.trim().parse().ok()?;
        let h: u16 = h.trim().parse().ok()?;
        let valid = |v: u16| (1..=Self::MAX_SIDE).contains(&v);
        (valid(w) && valid(h)).then_some((w, h))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
