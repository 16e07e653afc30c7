//! Assembly text decoder and encoder.
//!
//! Converts between editable source text and [`Instruction`] values. Uses
//! [`for_each_instruction!`](crate::for_each_instruction) to generate:
//! - `parse_instruction` for tokenized input
//! - `format_operands` for the canonical text form
//!
//! # Syntax
//!
//! ```text
//! MNEMONIC operand1, operand2, ...  # optional comment
//! Label:
//! # whole-line comment
//! ```
//!
//! - Mnemonics and register prefixes are case-insensitive (`ldi r0 1u` works)
//! - Registers are `R0`..`R11`; sprites `S<n>`, layers `L<n>`
//! - Values carry a type suffix: `10u`, `-3s`, `1.5f`, `` `A` ``
//! - Memory addresses are `Block` or `Block + 0x10`
//! - Commas between operands are optional
//! - Every line is one instruction: blank lines decode to `NOP`
//!
//! # Program files
//!
//! [`assemble_program`] reads a sectioned file:
//!
//! ```text
//! [ code Init ]
//! LDI R0, 1u
//! [ data Scores 8 ]
//! 1u 2u 3u
//! [ images Ship 4 16x16 ]
//! [ palette ]
//! 0x000000 0xFFFFFF 0xFF000080
//! ```

use crate::for_each_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, OperandKind, Opcode};
use crate::virtual_machine::operand::{CodeTarget, MemRef, ObjRef, Resolution, is_valid_label};
use crate::virtual_machine::program::{
    Color, ImageGroup, MATH_MODULE_NAME, MemoryMap, Module, ProgramImage, Resources,
};
use crate::virtual_machine::word::{Word, parse_register_index};
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const SPRITE_PREFIX: char = 'S';
const LAYER_PREFIX: char = 'L';

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::Syntax {
            line,
            column,
            message,
        } => Some((*line, *column, message.clone())),
        VMError::DuplicateLabel { line, label } => {
            Some((*line, 1, format!("duplicate label {label}")))
        }
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
pub fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    column: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Renders `err` against `source`, falling back to the plain message.
pub fn describe_error(file: &str, source: &str, err: &VMError) -> String {
    match assembly_error_location(err) {
        Some((line, column, message)) => {
            render_assembly_diagnostic(file, source, line, column, &message)
        }
        None => format!("error: {err}"),
    }
}

fn syntax(line: usize, column: usize, message: impl Into<String>) -> VMError {
    VMError::Syntax {
        line,
        column,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
    /// Byte range in the line.
    start: usize,
    end: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` outside a quoted literal starts a comment
/// - commas are ignored
/// - `"`, `'` and `` ` `` delimit literals that may hold spaces and commas
/// - whitespace around `+` is glued so `Block + 0x10` stays one token
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut raw: Vec<Token> = Vec::with_capacity(8);
    let mut start: Option<usize> = None;
    let mut quote: Option<u8> = None;

    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'#' => break,
            b'"' | b'\'' | b'`' => {
                if start.is_none() {
                    start = Some(i);
                }
                quote = Some(b);
            }
            b',' | b' ' | b'\t' | b'\r' => {
                if let Some(s) = start.take() {
                    raw.push(token(line, s, i));
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(syntax(
            line_no,
            start.map_or(1, |s| s + 1),
            "unterminated quoted literal",
        ));
    }

    if let Some(s) = start {
        raw.push(token(line, s, i));
    }

    let mut out: Vec<Token> = Vec::with_capacity(raw.len());
    for tok in raw {
        match out.last_mut() {
            Some(prev) if prev.text.ends_with('+') || tok.text.starts_with('+') => {
                prev.end = tok.end;
                prev.text = &line[prev.start..prev.end];
            }
            _ => out.push(tok),
        }
    }

    Ok(out)
}

fn token(line: &str, start: usize, end: usize) -> Token<'_> {
    Token {
        text: &line[start..end],
        offset: start + 1,
        start,
        end,
    }
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Strips one pair of surrounding double quotes.
fn unquote(tok: &str) -> Option<&str> {
    tok.strip_prefix('"').and_then(|t| t.strip_suffix('"'))
}

/// Parse a name operand: bare identifier or double-quoted text.
pub(crate) fn parse_name(tok: &str) -> Option<String> {
    match unquote(tok) {
        Some(inner) if !inner.is_empty() => Some(inner.to_string()),
        Some(_) => None,
        None if !tok.contains(['"', '\'', '`']) => Some(tok.to_string()),
        None => None,
    }
}

fn format_name(name: &str) -> String {
    if is_valid_label(name) {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}

/// Parse a small decimal image index.
pub(crate) fn parse_frame(tok: &str) -> Option<u16> {
    if tok.is_empty() || !tok.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tok.parse().ok()
}

fn expect_operand<T>(
    tok: &Token,
    line_no: usize,
    kind: OperandKind,
    value: Option<T>,
) -> Result<T, VMError> {
    value.ok_or_else(|| {
        syntax(
            line_no,
            tok.offset,
            format!("expected {}, found `{}`", kind.describe(), tok.text),
        )
    })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $group:ident
        ),* $(,)?
    ) => {
        /// Parse one instruction from tokens, mnemonic first.
        fn parse_instruction(tokens: &[Token], line_no: usize) -> Result<Instruction, VMError> {
            let Some(head) = tokens.first() else {
                return Ok(Instruction::Nop {});
            };

            let opcode = Opcode::from_mnemonic(head.text).ok_or_else(|| {
                syntax(line_no, head.offset, format!("unknown instruction {}", head.text))
            })?;

            let expected = opcode.operand_kinds().len();
            if tokens.len() != expected + 1 {
                return Err(syntax(
                    line_no,
                    head.offset,
                    format!(
                        "operand count mismatch: {} expects {}, found {}",
                        opcode.mnemonic(),
                        expected,
                        tokens.len() - 1
                    ),
                ));
            }

            match opcode {
                $(
                    Opcode::$name => define_parse_instruction!(
                        @construct tokens line_no; $name $( $field : $kind ),*
                    ),
                )*
            }
        }

        /// Canonical operand texts, in source order.
        fn format_operands(instr: &Instruction) -> Vec<String> {
            match instr {
                $(
                    Instruction::$name { $( $field ),* } => vec![
                        $( define_parse_instruction!(@format $kind, $field) ),*
                    ],
                )*
            }
        }
    };

    // ---------- parsing ----------
    (@construct $tokens:ident $line:ident; $name:ident) => {
        Ok(Instruction::$name {})
    };

    (@construct $tokens:ident $line:ident; $name:ident $( $field:ident : $kind:ident ),+ ) => {{
        let mut operands = $tokens[1..].iter();
        Ok(Instruction::$name {
            $(
                $field: {
                    let tok = operands
                        .next()
                        .ok_or_else(|| syntax($line, 1, "missing operand"))?;
                    expect_operand(
                        tok,
                        $line,
                        OperandKind::$kind,
                        define_parse_instruction!(@parse $kind, tok.text),
                    )?
                },
            )*
        })
    }};

    (@parse Reg, $tok:expr)    => { parse_register_index($tok) };
    (@parse Value, $tok:expr)  => { Word::from_text($tok, true) };
    (@parse Target, $tok:expr) => { CodeTarget::parse($tok) };
    (@parse Mem, $tok:expr)    => { MemRef::parse($tok) };
    (@parse Sprite, $tok:expr) => { ObjRef::parse($tok, SPRITE_PREFIX) };
    (@parse Layer, $tok:expr)  => { ObjRef::parse($tok, LAYER_PREFIX) };
    (@parse Name, $tok:expr)   => { parse_name($tok) };
    (@parse Res, $tok:expr)    => { Some(Resolution($tok.to_string())) };
    (@parse Frame, $tok:expr)  => { parse_frame($tok) };
    (@parse Label, $tok:expr)  => { is_valid_label($tok).then(|| $tok.to_string()) };
    (@parse Text, $tok:expr)   => { Some(unquote($tok).unwrap_or($tok).to_string()) };

    // ---------- formatting ----------
    (@format Reg, $v:ident)    => { format!("R{}", $v) };
    (@format Value, $v:ident)  => { $v.to_string() };
    (@format Target, $v:ident) => { $v.to_string() };
    (@format Mem, $v:ident)    => { $v.to_string() };
    (@format Sprite, $v:ident) => { $v.to_text(SPRITE_PREFIX) };
    (@format Layer, $v:ident)  => { $v.to_text(LAYER_PREFIX) };
    (@format Name, $v:ident)   => { format_name($v) };
    (@format Res, $v:ident)    => { $v.to_string() };
    (@format Frame, $v:ident)  => { $v.to_string() };
    (@format Label, $v:ident)  => { $v.clone() };
    (@format Text, $v:ident)   => { format!("\"{}\"", $v) };
}

for_each_instruction!(define_parse_instruction);

/// Decodes one source line. `line_no` is 1-based and used for errors only.
pub fn parse_line(line_no: usize, line: &str) -> Result<Instruction, VMError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Instruction::Nop {});
    }
    if let Some(text) = trimmed.strip_prefix(COMMENT_CHAR) {
        return Ok(Instruction::Comment {
            text: text.trim().to_string(),
        });
    }

    let tokens = tokenize(line_no, line)?;
    match tokens.as_slice() {
        [] => Ok(Instruction::Nop {}),
        [first, rest @ ..] if is_label_def(first.text) => {
            if let Some(extra) = rest.first() {
                return Err(syntax(line_no, extra.offset, "unexpected text after label"));
            }
            let name = label_name(first.text);
            if !is_valid_label(name) {
                return Err(syntax(line_no, first.offset, format!("invalid label {name}")));
            }
            Ok(Instruction::Tag {
                name: name.to_string(),
            })
        }
        _ => parse_instruction(&tokens, line_no),
    }
}

/// Canonical text of one instruction.
///
/// [`parse_line`] decodes the result back to an equal instruction.
pub fn format_instruction(instr: &Instruction) -> String {
    match instr {
        Instruction::Tag { name } => format!("{name}{LABEL_SUFFIX}"),
        Instruction::Comment { text } if text.is_empty() => COMMENT_CHAR.to_string(),
        Instruction::Comment { text } => format!("{COMMENT_CHAR} {text}"),
        _ => {
            let mnemonic = instr.opcode().mnemonic();
            let operands = format_operands(instr);
            if operands.is_empty() {
                mnemonic.to_string()
            } else {
                format!("{mnemonic} {}", operands.join(", "))
            }
        }
    }
}

/// Decodes every line of a module source, one instruction per line.
///
/// Labels are checked when the result is turned into a [`Module`].
pub fn assemble_module(source: &str) -> Result<Vec<Instruction>, VMError> {
    assemble_lines(source.lines(), 1)
}

fn assemble_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    first_line: usize,
) -> Result<Vec<Instruction>, VMError> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| parse_line(first_line + i, line))
        .collect()
}

/// Canonical source text of a module, one line per instruction.
pub fn format_module(code: &[Instruction]) -> String {
    let mut out = String::new();
    for instr in code {
        out.push_str(&format_instruction(instr));
        out.push('\n');
    }
    out
}

/// Which part of a program file is being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// Before any section marker.
    None,
    /// `[ code Name ]`
    Code(String),
    /// `[ data Name <len> ]`
    Data { name: String, len: usize },
    /// `[ images Name <frames> <WxH> ]`
    Images(ImageGroup),
    /// `[ palette ]`
    Palette,
}

/// Checks if a line is a section marker and returns the section if so.
fn parse_section_marker(line_no: usize, line: &str) -> Result<Option<Section>, VMError> {
    let trimmed = line.trim();
    let Some(inner) = trimmed
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
    else {
        return Ok(None);
    };

    let bad = |message: &str| syntax(line_no, 1, format!("{message} in section marker {trimmed}"));
    let words: Vec<&str> = inner.split_whitespace().collect();
    let section = match words.as_slice() {
        [kind, name] if kind.eq_ignore_ascii_case("code") => {
            if !is_valid_label(name) || *name == MATH_MODULE_NAME {
                return Err(bad("invalid module name"));
            }
            Section::Code(name.to_string())
        }
        [kind, name, rest @ ..] if kind.eq_ignore_ascii_case("data") && rest.len() <= 1 => {
            if !is_valid_label(name) {
                return Err(bad("invalid block name"));
            }
            let len = match rest.first() {
                Some(len) => len.parse().map_err(|_| bad("invalid length"))?,
                None => 0,
            };
            Section::Data {
                name: name.to_string(),
                len,
            }
        }
        [kind, name, frames, rest @ ..] if kind.eq_ignore_ascii_case("images") && rest.len() <= 1 => {
            let frames = frames.parse().map_err(|_| bad("invalid frame count"))?;
            let mut group = ImageGroup::new(*name, frames);
            if let Some(size) = rest.first() {
                let (width, height) = Resolution(size.to_string())
                    .dimensions()
                    .ok_or_else(|| bad("invalid frame size"))?;
                group.width = width;
                group.height = height;
            }
            Section::Images(group)
        }
        [kind] if kind.eq_ignore_ascii_case("palette") => Section::Palette,
        _ => return Err(bad("unknown section")),
    };
    Ok(Some(section))
}

/// Accumulates sections while a program file is read.
struct ProgramBuilder<'a> {
    section: Section,
    first_line: usize,
    lines: Vec<&'a str>,
    words: Vec<Word>,
    modules: Vec<Module>,
    memory: MemoryMap,
    resources: Resources,
    palette_seen: bool,
}

impl<'a> ProgramBuilder<'a> {
    fn new() -> Self {
        Self {
            section: Section::None,
            first_line: 1,
            lines: Vec::new(),
            words: Vec::new(),
            modules: Vec::new(),
            memory: MemoryMap::new(),
            resources: Resources::default(),
            palette_seen: false,
        }
    }

    fn open(&mut self, line_no: usize, section: Section) -> Result<(), VMError> {
        self.close()?;
        match &section {
            Section::Code(name) if self.modules.iter().any(|m| m.name() == name) => {
                return Err(syntax(line_no, 1, format!("duplicate module {name}")));
            }
            Section::Data { name, .. } if self.memory.block(name).is_some() => {
                return Err(syntax(line_no, 1, format!("duplicate data block {name}")));
            }
            Section::Images(group) if self.resources.image_group(&group.name).is_some() => {
                return Err(syntax(line_no, 1, format!("duplicate image group {}", group.name)));
            }
            Section::Palette if !self.palette_seen => {
                self.resources.palette.clear();
                self.palette_seen = true;
            }
            _ => {}
        }
        self.section = section;
        self.first_line = line_no + 1;
        Ok(())
    }

    fn feed(&mut self, line_no: usize, line: &'a str) -> Result<(), VMError> {
        match &self.section {
            Section::Code(_) => {
                self.lines.push(line);
                return Ok(());
            }
            Section::None | Section::Images(_) => {
                return match tokenize(line_no, line)?.first() {
                    Some(tok) => Err(syntax(line_no, tok.offset, "unexpected text outside a section")),
                    None => Ok(()),
                };
            }
            Section::Data { .. } | Section::Palette => {}
        }

        for tok in tokenize(line_no, line)? {
            if self.section == Section::Palette {
                let color = Color::parse(tok.text).ok_or_else(|| {
                    syntax(line_no, tok.offset, format!("expected colour, found `{}`", tok.text))
                })?;
                self.resources.palette.push(color);
            } else {
                let word = Word::from_text(tok.text, true).ok_or_else(|| {
                    syntax(line_no, tok.offset, format!("expected value, found `{}`", tok.text))
                })?;
                self.words.push(word);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), VMError> {
        match std::mem::replace(&mut self.section, Section::None) {
            Section::Code(name) => {
                let mut lines = std::mem::take(&mut self.lines);
                while lines.last().is_some_and(|l| l.trim().is_empty()) {
                    lines.pop();
                }
                let code = assemble_lines(lines, self.first_line)?;
                self.modules
                    .push(Module::with_first_line(name, code, self.first_line)?);
            }
            Section::Data { name, len } => {
                let mut words = std::mem::take(&mut self.words);
                if words.len() < len {
                    words.resize(len, Word::default());
                }
                self.memory.insert_block(name, words);
            }
            Section::Images(group) => self.resources.image_groups.push(group),
            Section::None | Section::Palette => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ProgramImage, VMError> {
        self.close()?;
        let mut image = ProgramImage::new(self.modules);
        image.memory = self.memory;
        image.resources = self.resources;
        Ok(image)
    }
}

/// Assembles a sectioned program file into a [`ProgramImage`].
///
/// Modules keep file order, so the first `[ code ]` section becomes module 0
/// (`Init` by convention) and the second module 1 (`Update`).
pub fn assemble_program(source: &str) -> Result<ProgramImage, VMError> {
    let mut builder = ProgramBuilder::new();
    for (i, line) in source.lines().enumerate() {
        let line_no = i + 1;
        match parse_section_marker(line_no, line)? {
            Some(section) => builder.open(line_no, section)?,
            None => builder.feed(line_no, line)?,
        }
    }
    builder.finish()
}

/// Convenience: assemble a program directly from a file path.
///
/// Failures are logged as a compiler-style diagnostic before being returned.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<ProgramImage, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref)
        .map_err(|e| VMError::Io(format!("{}: {e}", path_ref.display())))?;
    let result = assemble_program(&source);
    if let Err(err) = &result {
        crate::error!("{}", describe_error(&path_ref.display().to_string(), &source, err));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn parse(line: &str) -> Instruction {
        parse_line(1, line).unwrap()
    }

    fn texts(line: &str) -> Vec<String> {
        tokenize(1, line)
            .unwrap()
            .into_iter()
            .map(|t| t.text.to_string())
            .collect()
    }

    // ==================== Tokenizer ====================

    #[test]
    fn tokenize_ignores_commas_and_comments() {
        assert_eq!(texts("ADD R0, R1 # add"), vec!["ADD", "R0", "R1"]);
        assert_eq!(texts("  ,, NOP"), vec!["NOP"]);
    }

    #[test]
    fn tokenize_glues_plus() {
        assert_eq!(texts("LD R0, Data + 0x10"), vec!["LD", "R0", "Data + 0x10"]);
        assert_eq!(texts("ST Data+ 2, 1u"), vec!["ST", "Data+ 2", "1u"]);
    }

    #[test]
    fn labels_cannot_contain_plus() {
        assert!(parse_line(1, "a+:").is_err());
        assert!(parse_line(1, "CALLTM a+, 1u").is_err());
        assert!(parse_line(1, "J a+").is_err());
        assert!(assemble_module("J Loop\nLoop:").is_ok());
    }

    #[test]
    fn tokenize_keeps_quoted_literals() {
        assert_eq!(texts("LDI R0, `,`"), vec!["LDI", "R0", "`,`"]);
        assert_eq!(texts("LDI R0, `#`"), vec!["LDI", "R0", "`#`"]);
        assert_eq!(
            texts("FNTSET \"Big Font\", 12u"),
            vec!["FNTSET", "\"Big Font\"", "12u"]
        );
    }

    #[test]
    fn tokenize_reports_offsets() {
        let tokens = tokenize(1, "  J   Loop").unwrap();
        assert_eq!(tokens[0].offset, 3);
        assert_eq!(tokens[1].offset, 7);
    }

    #[test]
    fn tokenize_unterminated_literal() {
        let err = tokenize(4, "FNTSET \"Big, 1u").unwrap_err();
        assert!(matches!(err, VMError::Syntax { line: 4, column: 8, .. }));
    }

    // ==================== Lines ====================

    #[test]
    fn blank_line_is_nop() {
        assert_eq!(parse(""), Instruction::Nop {});
        assert_eq!(parse("   \t"), Instruction::Nop {});
    }

    #[test]
    fn comment_and_label_lines() {
        assert_eq!(
            parse("#   move the ship"),
            Instruction::Comment {
                text: "move the ship".into()
            }
        );
        assert_eq!(parse("Loop:"), Instruction::Tag { name: "Loop".into() });
        assert_eq!(parse("Loop: # top"), Instruction::Tag { name: "Loop".into() });
        assert!(parse_line(1, "Loop: NOP").is_err());
        assert!(parse_line(1, "9lives:").is_err());
    }

    #[test]
    fn accepts_loose_forms() {
        let expected = Instruction::Ldi {
            rd: 0,
            value: Word::Unsigned16(10),
        };
        assert_eq!(parse("LDI R0 10u"), expected);
        assert_eq!(parse("ldi r0, 10"), expected);
        assert_eq!(parse("LDI R0, 0xA"), expected);
        assert_eq!(
            parse("LD R0 Data+16"),
            Instruction::Ld {
                rd: 0,
                src: MemRef::new("Data", 16)
            }
        );
    }

    #[test]
    fn unknown_instruction() {
        let err = parse_line(7, "  FOO R0").unwrap_err();
        assert_eq!(
            err,
            VMError::Syntax {
                line: 7,
                column: 3,
                message: "unknown instruction FOO".into()
            }
        );
    }

    #[test]
    fn wrong_arity() {
        let err = parse_line(1, "ADD R0").unwrap_err();
        assert!(
            matches!(err, VMError::Syntax { ref message, .. } if message.contains("operand count mismatch"))
        );
        assert!(parse_line(1, "RET R0").is_err());
    }

    #[test]
    fn wrong_operand_kind() {
        let err = parse_line(1, "ADD 5u, R1").unwrap_err();
        assert_eq!(
            err,
            VMError::Syntax {
                line: 1,
                column: 5,
                message: "expected register, found `5u`".into()
            }
        );
        assert!(parse_line(1, "SPRX L1, 5u").is_err());
        assert!(parse_line(1, "LDI R0, 12q").is_err());
        assert!(parse_line(1, "SPRANM S0, 1, x").is_err());
    }

    // ==================== Canonical text ====================

    #[test]
    fn canonical_forms() {
        let cases = [
            ("add r0 r1", "ADD R0, R1"),
            ("LDI R0 10u", "LDI R0, 10u"),
            ("ld r0 Data+16", "LD R0, Data + 0x10"),
            ("j Update.Loop", "J Update.Loop"),
            ("sprx r3 -4s", "SPRX R3, -4s"),
            ("lyrres l1 640x400", "LYRRES L1, 640x400"),
            ("fntset \"Big Font\" 8u", "FNTSET \"Big Font\", 8u"),
            ("Loop:", "Loop:"),
            ("#note", "# note"),
            ("", "NOP"),
        ];
        for (input, canonical) in cases {
            assert_eq!(format_instruction(&parse(input)), canonical, "{input}");
        }
    }

    fn sample(kind: OperandKind, n: u16) -> String {
        match kind {
            OperandKind::Reg => format!("R{}", n % 12),
            OperandKind::Value => match n % 5 {
                0 => Word::Unsigned16(n * 7).to_string(),
                1 => Word::Signed16(-(n as i16)).to_string(),
                2 => Word::from_f32(n as f32 + 0.5).to_string(),
                3 => Word::Char(b',' as u16).to_string(),
                _ => Word::RegisterRef(n % 12).to_string(),
            },
            OperandKind::Target => CodeTarget::in_module("Update", format!("L{n}")).to_string(),
            OperandKind::Mem => MemRef::new("Data", n * 3).to_string(),
            OperandKind::Sprite => ObjRef::Index(n).to_text(SPRITE_PREFIX),
            OperandKind::Layer => ObjRef::Register(n % 8).to_text(LAYER_PREFIX),
            OperandKind::Name => format_name(&format!("name {n}")),
            OperandKind::Res => Resolution(format!("{}x200", n + 1)).to_string(),
            OperandKind::Frame => n.to_string(),
            OperandKind::Label => format!("Tag{n}"),
            OperandKind::Text => format!("\"text {n}\""),
        }
    }

    #[test]
    fn every_opcode_round_trips() {
        for (i, opcode) in Opcode::ALL.iter().enumerate() {
            let operands: Vec<String> = opcode
                .operand_kinds()
                .iter()
                .enumerate()
                .map(|(j, kind)| sample(*kind, (i + j) as u16))
                .collect();
            let line = format!("{} {}", opcode.mnemonic(), operands.join(", "));
            let instr = parse_line(1, &line).unwrap_or_else(|e| panic!("{line}: {e}"));
            assert_eq!(instr.opcode(), *opcode);
            let text = format_instruction(&instr);
            assert_eq!(parse_line(1, &text).unwrap(), instr, "{text}");
        }
    }

    #[test]
    fn module_round_trips() {
        let source = "Init:\nLDI R0, 1u\n\n# done\nCALL Math.Abs\nRET\n";
        let code = assemble_module(source).unwrap();
        assert_eq!(code.len(), 6);
        assert_eq!(code[2], Instruction::Nop {});
        assert_eq!(assemble_module(&format_module(&code)).unwrap(), code);
    }

    #[test]
    fn module_errors_carry_line() {
        let err = assemble_module("NOP\nNOP\nBAD").unwrap_err();
        assert!(matches!(err, VMError::Syntax { line: 3, .. }));
    }

    // ==================== Programs ====================

    const PROGRAM: &str = "\
# demo cartridge
[ code Init ]
LDI R0, 1u
ST Scores + 0x1, R0

[ code Update ]
Loop:
J Loop
[ data Scores 4 ]
5u 6u, `A`
[ images Ship 2 16x8 ]
[ palette ]
0x000000 0xFF0000
0x00FF0080
";

    #[test]
    fn assemble_program_sections() {
        let image = assemble_program(PROGRAM).unwrap();
        let modules = image.code.modules();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name(), "Init");
        assert_eq!(modules[0].len(), 2);
        assert_eq!(modules[1].label("Loop"), Some(0));

        let scores = image.memory.block("Scores").unwrap();
        assert_eq!(
            scores,
            &[
                Word::Unsigned16(5),
                Word::Unsigned16(6),
                Word::Char('A' as u16),
                Word::Unsigned16(0)
            ]
        );

        let ship = image.resources.image_group("Ship").unwrap();
        assert_eq!((ship.frames, ship.width, ship.height), (2, 16, 8));
        assert_eq!(image.resources.palette.len(), 3);
        assert_eq!(image.resources.palette[2].a, 0x80);
    }

    #[test]
    fn assemble_program_reports_file_lines() {
        let err = assemble_program("[ code Init ]\nNOP\nBAD R0").unwrap_err();
        assert!(matches!(err, VMError::Syntax { line: 3, .. }));

        let err = assemble_program("[ code Init ]\nA:\nA:").unwrap_err();
        assert_eq!(
            err,
            VMError::DuplicateLabel {
                line: 3,
                label: "A".into()
            }
        );
    }

    #[test]
    fn assemble_program_rejects_bad_layout() {
        assert!(assemble_program("NOP").is_err());
        assert!(assemble_program("[ code Init ]\n[ code Init ]").is_err());
        assert!(assemble_program("[ code Math ]").is_err());
        assert!(assemble_program("[ sound Boom ]").is_err());
        assert!(assemble_program("[ data D x ]").is_err());
        assert!(assemble_program("[ images Ship 1 0x8 ]").is_err());
        assert!(assemble_program("[ palette ]\nred").is_err());
        assert!(assemble_program("[ data D ]\n1q").is_err());
    }

    #[test]
    fn default_palette_kept_without_section() {
        let image = assemble_program("[ code Init ]\nRET").unwrap();
        assert_eq!(image.resources.palette, Resources::default().palette);
    }

    #[test]
    fn assemble_file_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PROGRAM.as_bytes()).unwrap();
        let image = assemble_file(file.path()).unwrap();
        assert_eq!(image.code.modules().len(), 2);

        let missing = file.path().with_extension("missing");
        assert!(matches!(assemble_file(missing), Err(VMError::Io(_))));
    }

    // ==================== Diagnostics ====================

    #[test]
    fn diagnostic_points_at_column() {
        let source = "NOP\n  FOO R0";
        let err = assemble_module(source).unwrap_err();
        let diag = describe_error("demo.ccasm", source, &err);
        assert_eq!(
            diag,
            "error: unknown instruction FOO\n --> demo.ccasm:2:3\n  |\n   2 |   FOO R0\n  |   ^\n"
        );
        assert_eq!(
            describe_error("x", "", &VMError::UnknownFont("Mono".into())),
            "error: unknown font Mono"
        );
    }
}
