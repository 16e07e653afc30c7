//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction list and invokes a callback macro for code
//! generation, so the decoder, the encoder and the opcode tables never drift
//! apart.
//!
//! This module generates:
//! - The [`Opcode`] enum with mnemonics, groups and operand shapes
//! - The [`Instruction`] enum with one typed variant per opcode
//!
//! See [`assembler`](super::assembler) for the text decoder and encoder
//! generated from the same list.
//!
//! # Operand kinds
//!
//! - `Reg`: register index `R0`..`R11`
//! - `Value`: a [`Word`] literal or register reference
//! - `Target`: [`CodeTarget`] label, optionally module qualified
//! - `Mem`: [`MemRef`] memory block plus offset
//! - `Sprite` / `Layer`: [`ObjRef`] literal or register held index
//! - `Name`: identifier or quoted text
//! - `Res`: [`Resolution`] text
//! - `Frame`: small decimal image index
//! - `Label` / `Text`: tag name and comment body

use crate::virtual_machine::operand::{CodeTarget, MemRef, ObjRef, Resolution};
use crate::virtual_machine::word::Word;
use std::fmt;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Arithmetic
            // =========================
            /// ADD Rd, value ; Rd = Rd + value
            Add = "ADD" => [rd: Reg, value: Value], Arithmetic,
            /// SUB Rd, value ; Rd = Rd - value
            Sub = "SUB" => [rd: Reg, value: Value], Arithmetic,
            /// MUL Rd, value ; Rd = Rd * value
            Mul = "MUL" => [rd: Reg, value: Value], Arithmetic,
            /// DIV Rd, value ; Rd = Rd / value (fails on zero)
            Div = "DIV" => [rd: Reg, value: Value], Arithmetic,
            /// MOD Rd, value ; Rd = Rd % value (fails on zero)
            Mod = "MOD" => [rd: Reg, value: Value], Arithmetic,
            /// INC Rd ; Rd = Rd + 1
            Inc = "INC" => [rd: Reg], Arithmetic,
            /// DEC Rd ; Rd = Rd - 1
            Dec = "DEC" => [rd: Reg], Arithmetic,
            // =========================
            // Math
            // =========================
            /// SIN Rd, value ; Rd = sin(value) as float
            Sin = "SIN" => [rd: Reg, value: Value], Math,
            /// COS Rd, value ; Rd = cos(value) as float
            Cos = "COS" => [rd: Reg, value: Value], Math,
            /// RAND Rd, max ; Rd = random in [0, max], same variant as max
            Rand = "RAND" => [rd: Reg, max: Value], Math,
            // =========================
            // Compare
            // =========================
            /// CMP Rd, value ; flags from Rd - value
            Cmp = "CMP" => [rd: Reg, value: Value], Compare,
            // =========================
            // Data movement
            // =========================
            /// LD Rd, Block + offset ; Rd = memory
            Ld = "LD" => [rd: Reg, src: Mem], Data,
            /// ST Block + offset, value ; memory = value
            St = "ST" => [dst: Mem, value: Value], Data,
            /// LDI Rd, value ; Rd = value
            Ldi = "LDI" => [rd: Reg, value: Value], Data,
            /// PUSH value ; push a plain value onto the call stack
            Push = "PUSH" => [value: Value], Stack,
            // =========================
            // Control flow
            // =========================
            /// J target ; unconditional jump
            J = "J" => [target: Target], Control,
            /// JE target ; jump if zero
            Je = "JE" => [target: Target], Control,
            /// JNE target ; jump if not zero
            Jne = "JNE" => [target: Target], Control,
            /// JL target ; jump if less (carry or negative != overflow)
            Jl = "JL" => [target: Target], Control,
            /// JG target ; jump if greater
            Jg = "JG" => [target: Target], Control,
            /// JC target ; jump if carry
            Jc = "JC" => [target: Target], Control,
            /// JO target ; jump if overflow
            Jo = "JO" => [target: Target], Control,
            /// CALL target ; push return address and jump
            Call = "CALL" => [target: Target], Control,
            /// RET ; pop return address, stop on empty stack
            Ret = "RET" => [], Control,
            /// CALLTM target, seconds ; run target once the countdown expires
            Calltm = "CALLTM" => [target: Target, seconds: Value], Timer,
            /// BRKPT ; pause execution after this instruction
            Brkpt = "BRKPT" => [], Debug,
            // =========================
            // Queries
            // =========================
            /// TIME Rd ; Rd = elapsed seconds as float
            Time = "TIME" => [rd: Reg], Query,
            /// LDRESX Rd ; Rd = display width
            Ldresx = "LDRESX" => [rd: Reg], Query,
            /// LDRESY Rd ; Rd = display height
            Ldresy = "LDRESY" => [rd: Reg], Query,
            /// LDSPR Rd, sprite, attribute ; Rd = sprite attribute as float
            Ldspr = "LDSPR" => [rd: Reg, sprite: Sprite, attr: Name], Query,
            // =========================
            // Graphics
            // =========================
            /// RECT ; rectangle from R0..R4 (x, y, width, height, palette index)
            Rect = "RECT" => [], Graphics,
            /// SPRSET sprite, group ; bind an image group
            Sprset = "SPRSET" => [sprite: Sprite, group: Name], Sprite,
            /// SPRX sprite, value ; x position
            Sprx = "SPRX" => [sprite: Sprite, value: Value], Sprite,
            /// SPRY sprite, value ; y position
            Spry = "SPRY" => [sprite: Sprite, value: Value], Sprite,
            /// SPRROT sprite, value ; rotation in degrees
            Sprrot = "SPRROT" => [sprite: Sprite, value: Value], Sprite,
            /// SPRROO sprite, value ; rotation offset in degrees
            Sprroo = "SPRROO" => [sprite: Sprite, value: Value], Sprite,
            /// SPRSPD sprite, value ; speed along the rotation
            Sprspd = "SPRSPD" => [sprite: Sprite, value: Value], Sprite,
            /// SPRACC sprite, value ; acceleration impulse
            Spracc = "SPRACC" => [sprite: Sprite, value: Value], Sprite,
            /// SPRIMG sprite, value ; current image index
            Sprimg = "SPRIMG" => [sprite: Sprite, value: Value], Sprite,
            /// SPRVIS sprite, value ; visible and moving when non-zero
            Sprvis = "SPRVIS" => [sprite: Sprite, value: Value], Sprite,
            /// SPRWRP sprite, value ; wrap at layer edges when 1
            Sprwrp = "SPRWRP" => [sprite: Sprite, value: Value], Sprite,
            /// SPRLYR sprite, layer ; attach to a layer
            Sprlyr = "SPRLYR" => [sprite: Sprite, layer: Layer], Sprite,
            /// SPRGRP sprite, value ; collision group
            Sprgrp = "SPRGRP" => [sprite: Sprite, value: Value], Sprite,
            /// SPRCOL sprite, group ; zero flag = collides with a sprite of group
            Sprcol = "SPRCOL" => [sprite: Sprite, group: Value], Sprite,
            /// SPRFRI sprite, value ; friction factor
            Sprfri = "SPRFRI" => [sprite: Sprite, value: Value], Sprite,
            /// SPRMXS sprite, value ; maximum speed
            Sprmxs = "SPRMXS" => [sprite: Sprite, value: Value], Sprite,
            /// SPRPRI sprite, value ; draw priority
            Sprpri = "SPRPRI" => [sprite: Sprite, value: Value], Sprite,
            /// SPRFPS sprite, value ; animation frames per second
            Sprfps = "SPRFPS" => [sprite: Sprite, value: Value], Sprite,
            /// SPRANM sprite, from, to ; animate over an image range
            Spranm = "SPRANM" => [sprite: Sprite, from: Frame, to: Frame], Sprite,
            /// SPRSTP sprite ; finish the animation cycle, then hide
            Sprstp = "SPRSTP" => [sprite: Sprite], Sprite,
            /// SPRHLT sprite ; zero the velocity
            Sprhlt = "SPRHLT" => [sprite: Sprite], Sprite,
            /// SPRALP sprite, value ; alpha
            Spralp = "SPRALP" => [sprite: Sprite, value: Value], Sprite,
            /// SPRSCL sprite, value ; scale
            Sprscl = "SPRSCL" => [sprite: Sprite, value: Value], Sprite,
            /// LYRRES layer, WxH ; layer resolution
            Lyrres = "LYRRES" => [layer: Layer, res: Res], Layer,
            /// LYRVIS layer, value ; layer visibility
            Lyrvis = "LYRVIS" => [layer: Layer, value: Value], Layer,
            // =========================
            // Text
            // =========================
            /// FNTSET font, size ; select a host font
            Fntset = "FNTSET" => [font: Name, size: Value], Text,
            /// TXTVAL value ; draw value at (R0, R1) with palette index R2
            Txtval = "TXTVAL" => [value: Value], Text,
            /// TXTMEM Block + offset ; draw the characters stored there
            Txtmem = "TXTMEM" => [src: Mem], Text,
            // =========================
            // Meta
            // =========================
            /// NOP ; no effect
            Nop = "NOP" => [], Meta,
            /// `Name:` ; jump target, no effect
            Tag = "TAG" => [name: Label], Meta,
            /// `# text` ; comment, no effect
            Comment = "COMNT" => [text: Text], Meta,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $group:ident
        ),* $(,)?
    ) => {
        // =========================
        // Opcode table
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name,
            )*
        }

        impl Opcode {
            /// Every opcode in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name ),* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            pub const fn group(&self) -> OpGroup {
                match self {
                    $( Opcode::$name => OpGroup::$group, )*
                }
            }

            /// Operand kinds in source order.
            pub const fn operand_kinds(&self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }

            /// Case-insensitive mnemonic lookup.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                $(
                    if name.eq_ignore_ascii_case($mnemonic) {
                        return Some(Opcode::$name);
                    }
                )*
                None
            }
        }

        // =========================
        // Instruction values
        // =========================
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name {
                    $( $field: $crate::define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl Instruction {
            pub const fn opcode(&self) -> Opcode {
                match self {
                    $( Instruction::$name { .. } => Opcode::$name, )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)    => { u16 };
    (@ty Value)  => { Word };
    (@ty Target) => { CodeTarget };
    (@ty Mem)    => { MemRef };
    (@ty Sprite) => { ObjRef };
    (@ty Layer)  => { ObjRef };
    (@ty Name)   => { String };
    (@ty Res)    => { Resolution };
    (@ty Frame)  => { u16 };
    (@ty Label)  => { String };
    (@ty Text)   => { String };
}

/// Operand kinds, used by the decoder for diagnostics and by tooling.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    Reg,
    Value,
    Target,
    Mem,
    Sprite,
    Layer,
    Name,
    Res,
    Frame,
    Label,
    Text,
}

impl OperandKind {
    /// Human readable name for error messages.
    pub const fn describe(&self) -> &'static str {
        match self {
            OperandKind::Reg => "register",
            OperandKind::Value => "value",
            OperandKind::Target => "code address",
            OperandKind::Mem => "memory address",
            OperandKind::Sprite => "sprite",
            OperandKind::Layer => "layer",
            OperandKind::Name => "name",
            OperandKind::Res => "resolution",
            OperandKind::Frame => "image index",
            OperandKind::Label => "label",
            OperandKind::Text => "text",
        }
    }
}

/// Coarse opcode family, shown in opcode listings.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OpGroup {
    Arithmetic,
    Math,
    Compare,
    Data,
    Stack,
    Control,
    Timer,
    Debug,
    Query,
    Graphics,
    Sprite,
    Layer,
    Text,
    Meta,
}

impl fmt::Display for OpGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Whether executing this instruction has no effect.
    pub fn is_inert(&self) -> bool {
        matches!(
            self,
            Instruction::Nop {} | Instruction::Tag { .. } | Instruction::Comment { .. }
        )
    }
}
