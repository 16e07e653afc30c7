//! ChipCade assembler CLI.
//!
//! Assembles a program file, reports unresolved jump targets and prints the
//! image digest. With `--format` it also prints the canonical source of every
//! module.
//!
//! # Usage
//! ```text
//! assembler <program.cc> [OPTIONS]
//! ```
//!
//! # Options
//! - `-c, --check`: Fail when a jump target does not resolve
//! - `-f, --format`: Print the canonical source of every module
//! - `-o, --output <file>`: Write the canonical source to a file (implies `--format`)

use chipcade::virtual_machine::assembler::{assemble_file, format_module};
use chipcade::virtual_machine::program::ProgramImage;
use chipcade::{error, info, warn};
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut check = false;
    let mut format = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--check" | "-c" => {
                check = true;
                i += 1;
            }
            "--format" | "-f" => {
                format = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    // Diagnostics are already logged by assemble_file.
    let image = match assemble_file(input_path) {
        Ok(image) => image,
        Err(_) => process::exit(1),
    };

    let unresolved = image.code.unresolved_targets();
    for (addr, target) in &unresolved {
        warn!(
            "{}: jump target '{}' does not resolve",
            image.code.describe(*addr),
            target
        );
    }

    info!(
        "{}: {} modules, {} unresolved targets",
        input_path,
        image.code.modules().len(),
        unresolved.len()
    );

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, render_listing(&image)) {
                error!("Failed to write output file: {}", e);
                process::exit(1);
            }
            info!("Wrote {} -> {}", input_path, path);
        }
        None if format => print!("{}", render_listing(&image)),
        None => {}
    }
    info!("Digest {}", image.digest_hex());

    if check && !unresolved.is_empty() {
        process::exit(1);
    }
}

/// Canonical code sections followed by the data block names.
fn render_listing(image: &ProgramImage) -> String {
    let mut out = String::new();
    for module in image.code.modules() {
        let _ = writeln!(out, "[ code {} ]", module.name());
        out.push_str(&format_module(module.code()));
    }
    for name in image.memory.names() {
        let len = image.memory.block(name).map_or(0, <[_]>::len);
        let _ = writeln!(out, "; data {name}: {len} words");
    }
    out
}

const USAGE: &str = "\
ChipCade Assembler

USAGE:
    {program} <program.cc> [OPTIONS]

ARGS:
    <program.cc>    Program file to assemble

OPTIONS:
    -c, --check            Fail when a jump target does not resolve
    -f, --format           Print the canonical source of every module
    -o, --output <file>    Write the canonical source to a file
    -h, --help             Print this help message

EXAMPLES:
    # Print canonical source and digest
    {program} game.cc --format

    # Validate in CI
    {program} game.cc --check
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
