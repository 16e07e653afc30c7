//! The ChipCade virtual machine.
//!
//! Programs are plain-text assembly split into named code modules. The
//! assembler turns them into a [`program::ProgramImage`] whose jump targets
//! are resolved per module. The [`vm::Cpu`] executes that image against a
//! [`host::Host`] and queues drawing work on the [`gcp::Gcp`], which is
//! replayed into a [`gcp::Renderer`] once per frame.
//!
//! # Architecture
//!
//! - **Words**: every register, stack slot and memory cell holds a typed
//!   [`word::Word`] (`u16`, `i16`, half-precision float or char)
//! - **Registers**: `R0`..`R7` are general purpose, `R8`..`R11` carry input
//! - **Stack**: typed entries, so return addresses never mix with values
//! - **Timers**: `CALLTM` schedules a jump that fires after a delay
//! - **Graphics**: sprite, layer and text instructions become GCP commands
//!
//! # Modules
//!
//! - [`assembler`]: Text to instructions, program files and diagnostics
//! - [`console`]: Frame driver owning one loaded program
//! - [`errors`]: Assembly and execution error types
//! - [`flags`]: Status flags written by arithmetic and `CMP`
//! - [`gcp`]: Graphics command queue and the renderer seam
//! - [`host`]: Input and sprite queries the CPU makes
//! - [`isa`]: Instruction set definition
//! - [`mathlib`]: Built-in `Math` module
//! - [`operand`]: Operand kinds shared by the ISA and the assembler
//! - [`program`]: Code, memory and resource images
//! - [`scene`]: Headless sprite scene implementing host and renderer
//! - [`vm`]: The CPU
//! - [`word`]: Word type and arithmetic

pub mod assembler;
pub mod console;
pub mod errors;
pub mod flags;
pub mod gcp;
pub mod host;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod mathlib;
pub mod operand;
pub mod program;
pub mod scene;
pub mod vm;
pub mod word;
