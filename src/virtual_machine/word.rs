//! 16-bit machine word.
//!
//! Every register, memory cell and literal operand holds a [`Word`]: a tagged
//! 16-bit value whose variant decides how arithmetic wraps and which
//! [`Flags`] an operation writes.
//!
//! # Variants
//!
//! | Variant        | Payload                       | Identifier text |
//! |----------------|-------------------------------|-----------------|
//! | `Unsigned16`   | `u16`, wrapping               | `42u`           |
//! | `Signed16`     | `i16`, wrapping + overflow    | `-5s`           |
//! | `Float16`      | IEEE-754 binary16 bit pattern | `1.5f`          |
//! | `Char`         | 16-bit code point             | `` `A` ``       |
//! | `RegisterRef`  | register index                | `R3`            |
//!
//! Floats are computed by widening to `f32` and narrowed back afterwards,
//! through the explicit bit-level codec in [`f16_to_f32`] / [`f32_to_f16`].

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::flags::Flags;
use rand::Rng;
use rand_core::RngCore;
use std::fmt;

/// Number of addressable registers.
pub const REGISTER_COUNT: usize = 12;

/// Canonical quiet NaN in binary16.
const F16_QUIET_NAN: u16 = 0x7E00;
const F16_INFINITY: u16 = 0x7C00;

/// Tagged 16-bit value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Word {
    Unsigned16(u16),
    Signed16(i16),
    /// Raw binary16 bits.
    Float16(u16),
    Char(u16),
    /// Operand that names a register; resolved before use.
    RegisterRef(u16),
}

/// Binary arithmetic operation applied by [`Word::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "ADD",
            ArithOp::Sub => "SUB",
            ArithOp::Mul => "MUL",
            ArithOp::Div => "DIV",
            ArithOp::Mod => "MOD",
        }
    }
}

impl Default for Word {
    fn default() -> Self {
        Word::Unsigned16(0)
    }
}

impl Word {
    /// Wraps an `f32` as a `Float16` word.
    pub fn from_f32(value: f32) -> Self {
        Word::Float16(f32_to_f16(value))
    }

    /// Returns the variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Word::Unsigned16(_) => "Unsigned16",
            Word::Signed16(_) => "Signed16",
            Word::Float16(_) => "Float16",
            Word::Char(_) => "Char",
            Word::RegisterRef(_) => "RegisterRef",
        }
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Word::Unsigned16(_))
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Word::Char(_))
    }

    /// Replaces a register reference with the register's content.
    ///
    /// Any other variant is returned unchanged.
    pub fn resolve(self, registers: &[Word; REGISTER_COUNT]) -> Result<Word, VMError> {
        match self {
            Word::RegisterRef(index) => registers
                .get(index as usize)
                .copied()
                .ok_or(VMError::InvalidRegister { index }),
            other => Ok(other),
        }
    }

    // ==================== Conversions ====================

    pub fn to_f32(self) -> f32 {
        match self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => v as f32,
            Word::Signed16(v) => v as f32,
            Word::Float16(bits) => f16_to_f32(bits),
        }
    }

    /// Integer view; floats truncate toward zero and saturate.
    pub fn to_i32(self) -> i32 {
        match self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => v as i32,
            Word::Signed16(v) => v as i32,
            Word::Float16(bits) => f16_to_f32(bits) as i32,
        }
    }

    /// Signed values are reinterpreted bit for bit; floats saturate.
    pub fn to_unsigned16(self) -> Word {
        Word::Unsigned16(match self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => v,
            Word::Signed16(v) => v as u16,
            Word::Float16(bits) => f16_to_f32(bits) as u16,
        })
    }

    /// Unsigned values are reinterpreted bit for bit; floats saturate.
    pub fn to_signed16(self) -> Word {
        Word::Signed16(match self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => v as i16,
            Word::Signed16(v) => v,
            Word::Float16(bits) => f16_to_f32(bits) as i16,
        })
    }

    pub fn to_float16(self) -> Word {
        match self {
            Word::Float16(_) => self,
            other => Word::from_f32(other.to_f32()),
        }
    }

    pub fn to_char(self) -> Word {
        match self {
            Word::Float16(bits) => Word::Char(f16_to_f32(bits) as u16),
            other => match other.to_unsigned16() {
                Word::Unsigned16(v) => Word::Char(v),
                _ => Word::Char(0),
            },
        }
    }

    // ==================== Arithmetic ====================

    pub fn add(&mut self, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        self.apply(ArithOp::Add, rhs, flags)
    }

    pub fn sub(&mut self, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        self.apply(ArithOp::Sub, rhs, flags)
    }

    pub fn mul(&mut self, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        self.apply(ArithOp::Mul, rhs, flags)
    }

    pub fn div(&mut self, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        self.apply(ArithOp::Div, rhs, flags)
    }

    pub fn modulo(&mut self, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        self.apply(ArithOp::Mod, rhs, flags)
    }

    /// Applies `op` in place, writing the flags of the operand variant.
    ///
    /// On failure the left operand is left unchanged. Division or modulo by
    /// zero sets carry (unsigned, float) or overflow (signed) before failing.
    pub fn apply(&mut self, op: ArithOp, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        let result = match (*self, rhs) {
            (Word::Unsigned16(a), Word::Unsigned16(b)) => {
                unsigned_op(op, a, b, flags).map(Word::Unsigned16)
            }
            (Word::Char(a), Word::Char(b)) if matches!(op, ArithOp::Add | ArithOp::Sub) => {
                unsigned_op(op, a, b, flags).map(Word::Char)
            }
            (Word::Signed16(a), Word::Signed16(b)) => signed_op(op, a, b, flags).map(Word::Signed16),
            (Word::Float16(a), Word::Float16(b)) => {
                float_op(op, f16_to_f32(a), f16_to_f32(b), flags).map(Word::from_f32)
            }
            _ => None,
        };

        match result {
            Some(word) => {
                *self = word;
                Ok(())
            }
            None => Err(VMError::InvalidArithmetic {
                op: op.mnemonic(),
                lhs: self.type_name(),
                rhs: rhs.type_name(),
            }),
        }
    }

    /// Adds one in place; never fails.
    pub fn inc(&mut self, flags: &mut Flags) {
        match *self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => {
                let r = v.wrapping_add(1);
                flags.zero = r == 0;
                flags.carry = r < v;
                self.set_integer_payload(r);
            }
            Word::Signed16(v) => {
                let r = v.wrapping_add(1);
                flags.zero = r == 0;
                flags.overflow = v == i16::MAX;
                flags.negative = r < 0;
                *self = Word::Signed16(r);
            }
            Word::Float16(bits) => {
                let r = f16_to_f32(bits) + 1.0;
                set_float_flags(r, flags);
                *self = Word::from_f32(r);
            }
        }
    }

    /// Subtracts one in place; never fails.
    pub fn dec(&mut self, flags: &mut Flags) {
        match *self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => {
                let r = v.wrapping_sub(1);
                flags.zero = r == 0;
                flags.carry = v == 0;
                self.set_integer_payload(r);
            }
            Word::Signed16(v) => {
                let r = v.wrapping_sub(1);
                flags.zero = r == 0;
                flags.overflow = v == i16::MIN;
                flags.negative = r < 0;
                *self = Word::Signed16(r);
            }
            Word::Float16(bits) => {
                let r = f16_to_f32(bits) - 1.0;
                set_float_flags(r, flags);
                *self = Word::from_f32(r);
            }
        }
    }

    fn set_integer_payload(&mut self, value: u16) {
        match self {
            Word::Unsigned16(v) | Word::Char(v) | Word::RegisterRef(v) => *v = value,
            Word::Signed16(_) | Word::Float16(_) => {}
        }
    }

    /// Compares without storing a result; only the flags change.
    pub fn cmp(&self, rhs: Word, flags: &mut Flags) -> Result<(), VMError> {
        match (*self, rhs) {
            (Word::Unsigned16(a), Word::Unsigned16(b)) | (Word::Char(a), Word::Char(b)) => {
                flags.zero = a == b;
                flags.carry = a < b;
            }
            (Word::Signed16(a), Word::Signed16(b)) => {
                let r = a.wrapping_sub(b);
                flags.zero = r == 0;
                flags.overflow = sub_overflows(a, b, r);
                flags.negative = r < 0;
            }
            (Word::Float16(a), Word::Float16(b)) => {
                set_float_flags(f16_to_f32(a) - f16_to_f32(b), flags);
            }
            _ => {
                return Err(VMError::InvalidComparison {
                    lhs: self.type_name(),
                    rhs: rhs.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Uniform random word of `max`'s variant in `[0, max]`.
    ///
    /// A negative signed bound yields `[max, 0]`.
    pub fn random_up_to<R: RngCore>(max: Word, rng: &mut R) -> Word {
        match max {
            Word::Unsigned16(m) => Word::Unsigned16(rng.gen_range(0..=m)),
            Word::Char(m) => Word::Char(rng.gen_range(0..=m)),
            Word::RegisterRef(m) => Word::RegisterRef(rng.gen_range(0..=m)),
            Word::Signed16(m) => {
                let v = rng.gen_range(0..=m.unsigned_abs()) as i32;
                Word::Signed16((if m < 0 { -v } else { v }) as i16)
            }
            Word::Float16(bits) => {
                let unit: f64 = rng.r#gen();
                Word::from_f32((unit * f16_to_f32(bits) as f64) as f32)
            }
        }
    }

    // ==================== Text ====================

    /// Parses an identifier such as `42u`, `-5s`, `1.5f`, `` `A` `` or `R3`.
    ///
    /// Recognition order: register, character literal, decimal point (float),
    /// `0x` hex, `0b`/`%` binary, leading minus (signed), explicit suffix, and
    /// finally a bare number as unsigned when `unsigned_default` is set.
    pub fn from_text(text: &str, unsigned_default: bool) -> Option<Word> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(index) = parse_register_index(text) {
            return Some(Word::RegisterRef(index));
        }
        if let Some(code) = parse_char_literal(text) {
            return Some(Word::Char(code));
        }
        if text.contains('.') {
            return parse_float(text.strip_suffix(['f', 'F']).unwrap_or(text));
        }

        let lower = text.to_ascii_lowercase();
        if let Some(hex) = lower.strip_prefix("0x") {
            let hex = hex.strip_suffix('u').unwrap_or(hex);
            return u16::from_str_radix(hex, 16).ok().map(Word::Unsigned16);
        }
        if let Some(bin) = lower.strip_prefix("0b").or_else(|| lower.strip_prefix('%')) {
            let bin = bin.strip_suffix('u').unwrap_or(bin);
            return u16::from_str_radix(bin, 2).ok().map(Word::Unsigned16);
        }
        if lower.starts_with('-') {
            if let Some(float) = lower.strip_suffix('f') {
                return parse_float(float);
            }
            let digits = lower.strip_suffix('s').unwrap_or(&lower);
            return digits.parse::<i16>().ok().map(Word::Signed16);
        }
        if let Some(digits) = lower.strip_suffix('u') {
            return digits.parse::<u16>().ok().map(Word::Unsigned16);
        }
        if let Some(digits) = lower.strip_suffix('s') {
            return digits.parse::<i16>().ok().map(Word::Signed16);
        }
        if let Some(float) = lower.strip_suffix('f') {
            return parse_float(float);
        }
        if unsigned_default {
            return lower.parse::<u16>().ok().map(Word::Unsigned16);
        }
        None
    }

    /// Text shown on screen: no suffix, floats with three decimals.
    pub fn display_text(&self) -> String {
        match *self {
            Word::Unsigned16(v) => v.to_string(),
            Word::Signed16(v) => v.to_string(),
            Word::Float16(bits) => format!("{:.3}", f16_to_f32(bits)),
            Word::Char(c) => char::from_u32(c as u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string(),
            Word::RegisterRef(r) => format!("R{r}"),
        }
    }

    /// Character payload if this is a printable `Char`.
    pub fn as_char(&self) -> Option<char> {
        match *self {
            Word::Char(c) => char::from_u32(c as u32),
            _ => None,
        }
    }
}

/// Identifier text; [`Word::from_text`] parses it back to the same word.
impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Word::Unsigned16(v) => write!(f, "{v}u"),
            Word::Signed16(v) => write!(f, "{v}s"),
            Word::Float16(bits) => write!(f, "{}f", float_text(f16_to_f32(bits))),
            Word::Char(c) => match char::from_u32(c as u32) {
                Some(ch) if !ch.is_control() && ch != '`' && (ch == ' ' || !ch.is_whitespace()) => {
                    write!(f, "`{ch}`")
                }
                _ => write!(f, "`\\u{{{c:x}}}`"),
            },
            Word::RegisterRef(r) => write!(f, "R{r}"),
        }
    }
}

fn unsigned_op(op: ArithOp, a: u16, b: u16, flags: &mut Flags) -> Option<u16> {
    let r = match op {
        ArithOp::Add => {
            let r = a.wrapping_add(b);
            flags.carry = r < a;
            r
        }
        ArithOp::Sub => {
            flags.carry = a < b;
            a.wrapping_sub(b)
        }
        ArithOp::Mul => {
            let r = a.wrapping_mul(b);
            // Heuristic carry: misses wrapped products such as 0x1000 * 0x11.
            flags.carry = r < a || r < b;
            r
        }
        ArithOp::Div | ArithOp::Mod => {
            if b == 0 {
                flags.carry = true;
                return None;
            }
            flags.carry = false;
            if op == ArithOp::Div { a / b } else { a % b }
        }
    };
    flags.zero = r == 0;
    Some(r)
}

fn signed_op(op: ArithOp, a: i16, b: i16, flags: &mut Flags) -> Option<i16> {
    let r = match op {
        ArithOp::Add => {
            let r = a.wrapping_add(b);
            flags.overflow = add_overflows(a, b, r);
            r
        }
        ArithOp::Sub => {
            let r = a.wrapping_sub(b);
            flags.overflow = sub_overflows(a, b, r);
            r
        }
        ArithOp::Mul => {
            let r = a.wrapping_mul(b);
            flags.overflow = add_overflows(a, b, r);
            r
        }
        ArithOp::Div => {
            if b == 0 {
                flags.overflow = true;
                return None;
            }
            flags.overflow = a == i16::MIN && b == -1;
            a.wrapping_div(b)
        }
        ArithOp::Mod => {
            if b == 0 {
                flags.overflow = true;
                return None;
            }
            flags.overflow = false;
            a.wrapping_rem(b)
        }
    };
    flags.zero = r == 0;
    flags.negative = r < 0;
    Some(r)
}

fn float_op(op: ArithOp, a: f32, b: f32, flags: &mut Flags) -> Option<f32> {
    let r = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div | ArithOp::Mod => {
            if b == 0.0 {
                flags.carry = true;
                return None;
            }
            if op == ArithOp::Div { a / b } else { a % b }
        }
    };
    set_float_flags(r, flags);
    Some(r)
}

fn set_float_flags(r: f32, flags: &mut Flags) {
    flags.zero = r == 0.0;
    flags.negative = r < 0.0;
}

fn add_overflows(a: i16, b: i16, r: i16) -> bool {
    (a > 0 && b > 0 && r < 0) || (a < 0 && b < 0 && r > 0)
}

fn sub_overflows(a: i16, b: i16, r: i16) -> bool {
    (a > 0 && b < 0 && r < 0) || (a < 0 && b > 0 && r > 0)
}

/// Parses `R<n>` / `r<n>`.
pub(crate) fn parse_register_index(text: &str) -> Option<u16> {
    let digits = text.strip_prefix(['R', 'r'])?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parses `` `A` ``, `'A'`, `"A"` or `` `\u{41}` ``.
fn parse_char_literal(text: &str) -> Option<u16> {
    let quote = text.chars().next()?;
    if !matches!(quote, '`' | '\'' | '"') || text.len() < 3 || !text.ends_with(quote) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    if let Some(hex) = inner.strip_prefix("\\u{").and_then(|s| s.strip_suffix('}')) {
        return u16::from_str_radix(hex, 16).ok();
    }
    let mut chars = inner.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    u16::try_from(ch as u32).ok()
}

fn parse_float(text: &str) -> Option<Word> {
    text.parse::<f32>().ok().map(Word::from_f32)
}

/// Shortest text that parses back to the same `f32`, always with a `.`.
fn float_text(value: f32) -> String {
    if value.is_nan() {
        return "NaN".into();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf".into() } else { "inf".into() };
    }
    let mut text = value.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Widens binary16 bits to `f32`.
///
/// Layout: 1 sign bit, 5 exponent bits (bias 15), 10 mantissa bits.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) as u32) << 31;
    let exponent = ((bits >> 10) & 0x1F) as u32;
    let mantissa = (bits & 0x3FF) as u32;

    let out = match exponent {
        0 if mantissa == 0 => sign,
        0 => {
            // Subnormal: shift the leading one into the implicit position.
            let mut m = mantissa;
            let mut e = 127 - 14;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | (e << 23) | ((m & 0x3FF) << 13)
        }
        0x1F => sign | 0x7F80_0000 | (mantissa << 13),
        _ => sign | ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(out)
}

/// Narrows an `f32` to binary16 bits, truncating the mantissa.
///
/// Values beyond the binary16 range become infinity, values below the
/// smallest subnormal become signed zero, and NaN becomes the quiet NaN.
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x7F_FFFF;

    if exponent == 0xFF {
        return sign | if mantissa != 0 { F16_QUIET_NAN } else { F16_INFINITY };
    }

    let e = exponent - 127 + 15;
    if e >= 0x1F {
        return sign | F16_INFINITY;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = mantissa | 0x80_0000;
        return sign | (m >> (14 - e)) as u16;
    }
    sign | ((e as u16) << 10) | (mantissa >> 13) as u16
}
