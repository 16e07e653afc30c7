//! ChipCade fantasy console.
//!
//! Provides the assembler, CPU, graphics command queue and a headless
//! console driver for ChipCade programs.

pub mod config;
pub mod utils;
pub mod virtual_machine;
