//! Program image: code modules, memory blocks and resources.
//!
//! A [`ProgramImage`] is everything a loaded cartridge consists of:
//!
//! - [`CodeImage`]: ordered named modules plus the built-in `Math` module, each
//!   with a label table built when the module is (re)compiled
//! - [`MemoryMap`]: named growable blocks of [`Word`]s used by `LD` / `ST`
//! - [`Resources`]: image groups referenced by `SPRSET` and the `RECT` palette
//!
//! The image digest hashes a versioned canonical rendering of all three parts,
//! so two images with the same digest behave identically.

use crate::virtual_machine::assembler::format_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::mathlib;
use crate::virtual_machine::operand::{CodeTarget, MemRef};
use crate::virtual_machine::word::Word;
use sha3::{Digest, Sha3_256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Magic bytes prefixed to the digest input.
const MAGIC: &[u8; 8] = b"CHIPCADE";

/// Current image format version.
const CURRENT_VERSION: Version = Version::new(0, 3, 0);

/// Module name reserved for the built-in math routines.
pub const MATH_MODULE_NAME: &str = "Math";
/// Module index under which the math routines are addressed.
pub const MATH_MODULE_INDEX: usize = 1000;

/// Semantic version of the image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version {
    major: u8,
    minor: u8,
    patch: u8,
}

impl Version {
    const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    const fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }
}

// =========================
// Code
// =========================

/// Position of one instruction: module index plus instruction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CodeAddr {
    pub module: usize,
    pub index: usize,
}

impl CodeAddr {
    pub const fn new(module: usize, index: usize) -> Self {
        Self { module, index }
    }

    /// First instruction of `module`.
    pub const fn start(module: usize) -> Self {
        Self::new(module, 0)
    }

    /// The instruction after this one.
    pub const fn next(self) -> Self {
        Self::new(self.module, self.index + 1)
    }
}

/// A named instruction list with its label table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    code: Vec<Instruction>,
    labels: HashMap<String, usize>,
}

impl Module {
    /// Builds a module, rejecting duplicate labels.
    ///
    /// Errors report the label's line as `index + 1`.
    pub fn new(name: impl Into<String>, code: Vec<Instruction>) -> Result<Self, VMError> {
        Self::with_first_line(name, code, 1)
    }

    /// A module without instructions.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Like [`Module::new`], with errors reported relative to `first_line`.
    pub(crate) fn with_first_line(
        name: impl Into<String>,
        code: Vec<Instruction>,
        first_line: usize,
    ) -> Result<Self, VMError> {
        let labels = build_labels(&code, first_line)?;
        Ok(Self {
            name: name.into(),
            code,
            labels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Instruction index of `tag`.
    pub fn label(&self, tag: &str) -> Option<usize> {
        self.labels.get(tag).copied()
    }
}

fn build_labels(code: &[Instruction], first_line: usize) -> Result<HashMap<String, usize>, VMError> {
    let mut labels = HashMap::new();
    for (index, instr) in code.iter().enumerate() {
        if let Instruction::Tag { name } = instr {
            if labels.insert(name.clone(), index).is_some() {
                return Err(VMError::DuplicateLabel {
                    line: first_line + index,
                    label: name.clone(),
                });
            }
        }
    }
    Ok(labels)
}

/// All code of a program: user modules in order plus the math module.
#[derive(Debug, Clone)]
pub struct CodeImage {
    modules: Vec<Module>,
    math: Module,
}

impl CodeImage {
    pub fn new(modules: Vec<Module>) -> Self {
        Self {
            modules,
            math: mathlib::module(),
        }
    }

    /// User modules in index order (the math module is not included).
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Module at `index`; [`MATH_MODULE_INDEX`] selects the math module.
    pub fn module(&self, index: usize) -> Option<&Module> {
        if index == MATH_MODULE_INDEX {
            Some(&self.math)
        } else {
            self.modules.get(index)
        }
    }

    pub fn module_index(&self, name: &str) -> Option<usize> {
        if name == MATH_MODULE_NAME {
            return Some(MATH_MODULE_INDEX);
        }
        self.modules.iter().position(|m| m.name == name)
    }

    /// Instruction at `addr`, `None` when out of bounds.
    pub fn fetch(&self, addr: CodeAddr) -> Option<&Instruction> {
        self.module(addr.module)?.code.get(addr.index)
    }

    /// Resolves a jump target seen while executing in module `current`.
    pub fn resolve(&self, target: &CodeTarget, current: usize) -> Result<CodeAddr, VMError> {
        let unresolved = || VMError::InvalidCodeAddress(target.to_string());
        let module = match &target.module {
            Some(name) => self.module_index(name).ok_or_else(unresolved)?,
            None => current,
        };
        let index = self
            .module(module)
            .and_then(|m| m.label(&target.tag))
            .ok_or_else(unresolved)?;
        Ok(CodeAddr::new(module, index))
    }

    /// Appends a module, returning its index.
    pub fn push_module(&mut self, module: Module) -> Result<usize, VMError> {
        if self.module_index(module.name()).is_some() {
            return Err(VMError::DuplicateModule(module.name().to_string()));
        }
        self.modules.push(module);
        Ok(self.modules.len() - 1)
    }

    /// Swaps in new code for the named module and rebuilds its label table.
    ///
    /// On error the previous instruction list stays in place.
    pub fn replace_module(&mut self, name: &str, code: Vec<Instruction>) -> Result<(), VMError> {
        let index = self
            .modules
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| VMError::UnknownModule(name.to_string()))?;
        self.modules[index] = Module::new(name, code)?;
        Ok(())
    }

    /// Debug rendering of an address, e.g. `Update + 0x3`.
    pub fn describe(&self, addr: CodeAddr) -> String {
        match self.module(addr.module) {
            Some(module) => format!("{} + {:#X}", module.name, addr.index),
            None => format!("<module {}> + {:#X}", addr.module, addr.index),
        }
    }

    /// Jump and call targets that do not resolve, in code order.
    pub fn unresolved_targets(&self) -> Vec<(CodeAddr, CodeTarget)> {
        let mut out = Vec::new();
        for (module, m) in self.modules.iter().enumerate() {
            for (index, instr) in m.code.iter().enumerate() {
                if let Some(target) = jump_target(instr) {
                    if self.resolve(target, module).is_err() {
                        out.push((CodeAddr::new(module, index), target.clone()));
                    }
                }
            }
        }
        out
    }
}

fn jump_target(instr: &Instruction) -> Option<&CodeTarget> {
    match instr {
        Instruction::J { target }
        | Instruction::Je { target }
        | Instruction::Jne { target }
        | Instruction::Jl { target }
        | Instruction::Jg { target }
        | Instruction::Jc { target }
        | Instruction::Jo { target }
        | Instruction::Call { target }
        | Instruction::Calltm { target, .. } => Some(target),
        _ => None,
    }
}

// =========================
// Memory
// =========================

/// Named memory blocks, kept in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    blocks: BTreeMap<String, Vec<Word>>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or grows `name` to at least `len` words of `Unsigned16(0)`.
    pub fn define(&mut self, name: impl Into<String>, len: usize) {
        let block = self.blocks.entry(name.into()).or_default();
        if block.len() < len {
            block.resize(len, Word::default());
        }
    }

    /// Installs `words` as block `name`, replacing any previous contents.
    pub fn insert_block(&mut self, name: impl Into<String>, words: Vec<Word>) {
        self.blocks.insert(name.into(), words);
    }

    pub fn block(&self, name: &str) -> Option<&[Word]> {
        self.blocks.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn get(&self, addr: &MemRef) -> Result<Word, VMError> {
        self.blocks
            .get(&addr.block)
            .and_then(|block| block.get(addr.offset as usize))
            .copied()
            .ok_or_else(|| invalid_address(addr))
    }

    pub fn set(&mut self, addr: &MemRef, value: Word) -> Result<(), VMError> {
        let cell = self
            .blocks
            .get_mut(&addr.block)
            .and_then(|block| block.get_mut(addr.offset as usize))
            .ok_or_else(|| invalid_address(addr))?;
        *cell = value;
        Ok(())
    }

    /// Reads consecutive `Char` words from `addr` up to the first non-character
    /// or the end of the block.
    pub fn read_text(&self, addr: &MemRef) -> Result<String, VMError> {
        let block = self
            .blocks
            .get(&addr.block)
            .ok_or_else(|| invalid_address(addr))?;
        let tail = block
            .get(addr.offset as usize..)
            .ok_or_else(|| invalid_address(addr))?;
        Ok(tail.iter().map_while(Word::as_char).collect())
    }
}

fn invalid_address(addr: &MemRef) -> VMError {
    VMError::InvalidMemoryAddress {
        block: addr.block.clone(),
        offset: addr.offset as usize,
    }
}

// =========================
// Resources
// =========================

/// RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xFF }
    }

    /// Parses `0xRRGGBB` or `0xRRGGBBAA`.
    pub fn parse(text: &str) -> Option<Self> {
        let hex = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
        let value = u32::from_str_radix(hex, 16).ok()?;
        match hex.len() {
            6 => {
                let [_, r, g, b] = value.to_be_bytes();
                Some(Self::rgb(r, g, b))
            }
            8 => {
                let [r, g, b, a] = value.to_be_bytes();
                Some(Self { r, g, b, a })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)?;
        if self.a != 0xFF {
            write!(f, "{:02X}", self.a)?;
        }
        Ok(())
    }
}

/// First sixteen entries of the "Duel" palette.
const DEFAULT_PALETTE: [u32; 16] = [
    0x000000, 0x222323, 0x434549, 0x626871, 0x828B98, 0xA6AEBA, 0xCDD2DA, 0xF5F7FA, 0x625D54,
    0x857565, 0x9E8C79, 0xAEA189, 0xBBAFA4, 0xCCC3B1, 0xEADBC9, 0xFFF3D6,
];

pub fn default_palette() -> Vec<Color> {
    DEFAULT_PALETTE
        .iter()
        .map(|rgb| {
            let [_, r, g, b] = rgb.to_be_bytes();
            Color::rgb(r, g, b)
        })
        .collect()
}

/// Named sequence of equally sized sprite frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGroup {
    pub name: String,
    pub frames: u16,
    pub width: u16,
    pub height: u16,
}

impl ImageGroup {
    pub const DEFAULT_SIZE: u16 = 32;

    pub fn new(name: impl Into<String>, frames: u16) -> Self {
        Self {
            name: name.into(),
            frames,
            width: Self::DEFAULT_SIZE,
            height: Self::DEFAULT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    pub image_groups: Vec<ImageGroup>,
    pub palette: Vec<Color>,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            image_groups: Vec::new(),
            palette: default_palette(),
        }
    }
}

impl Resources {
    pub fn image_group(&self, name: &str) -> Option<&ImageGroup> {
        self.image_groups.iter().find(|g| g.name == name)
    }

    pub fn color(&self, index: i32) -> Option<Color> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.palette.get(i))
            .copied()
    }
}

// =========================
// Image
// =========================

/// A loaded program.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    pub code: CodeImage,
    pub memory: MemoryMap,
    pub resources: Resources,
}

impl ProgramImage {
    pub fn new(modules: Vec<Module>) -> Self {
        Self {
            code: CodeImage::new(modules),
            memory: MemoryMap::new(),
            resources: Resources::default(),
        }
    }

    /// SHA3-256 over the versioned canonical rendering of the image.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(MAGIC);
        hasher.update(CURRENT_VERSION.to_bytes());
        for module in self.code.modules() {
            hasher.update(b"[code]");
            hasher.update(module.name().as_bytes());
            for instr in module.code() {
                hasher.update(format_instruction(instr).as_bytes());
                hasher.update(b"\n");
            }
        }
        for (name, block) in &self.memory.blocks {
            hasher.update(b"[data]");
            hasher.update(name.as_bytes());
            for word in block {
                hasher.update(word.to_string().as_bytes());
                hasher.update(b" ");
            }
        }
        for group in &self.resources.image_groups {
            hasher.update(b"[images]");
            hasher.update(group.name.as_bytes());
            hasher.update(group.frames.to_le_bytes());
            hasher.update(group.width.to_le_bytes());
            hasher.update(group.height.to_le_bytes());
        }
        hasher.update(b"[palette]");
        for color in &self.resources.palette {
            hasher.update([color.r, color.g, color.b, color.a]);
        }
        hasher.finalize().into()
    }

    /// Lower-case hex rendering of [`ProgramImage::digest`].
    pub fn digest_hex(&self) -> String {
        self.digest().iter().map(|b| format!("{b:02x}")).collect()
    }
}
