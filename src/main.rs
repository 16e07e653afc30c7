//! ChipCade headless player.
//!
//! Assembles a program file, plays it for a number of frames against the
//! headless scene and prints the final machine state.
//!
//! # Usage
//! ```text
//! chipcade <program.cc> [OPTIONS]
//! ```
//!
//! # Options
//! - `--frames <n>`: Frames to run after `Init` (default 60)
//! - `--seed <n>`: Seed for `RAND` (overrides `CHIPCADE_SEED`)
//! - `--budget <n>`: Instructions per pass, 0 for unlimited (overrides `CHIPCADE_BUDGET`)
//! - `--press <key>@<frame>`: Press a key before the given frame
//! - `--trace`: Log every executed instruction

use chipcade::config::{MachineConfig, parse_u64};
use chipcade::utils::log::{Level, set_min_level};
use chipcade::virtual_machine::assembler::assemble_file;
use chipcade::virtual_machine::console::{Console, ConsoleState};
use chipcade::virtual_machine::vm::{GENERAL_REGISTER_MAX, RunOutcome};
use chipcade::{error, info};
use std::env;
use std::path::Path;
use std::process;

const DEFAULT_FRAMES: u64 = 60;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut config = MachineConfig::from_env();
    let mut frames = DEFAULT_FRAMES;
    let mut presses: Vec<(u16, u64)> = Vec::new();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--frames" | "--seed" | "--budget" | "--press") => {
                i += 1;
                let Some(value) = args.get(i) else {
                    error!("{k} requires an argument");
                    process::exit(1);
                };
                match k {
                    "--frames" => frames = number_or_exit(k, value),
                    "--seed" => config.rng_seed = number_or_exit(k, value),
                    "--budget" => {
                        config.instruction_budget = match number_or_exit(k, value) {
                            0 => None,
                            n => Some(n),
                        }
                    }
                    _ => presses.push(parse_press(value).unwrap_or_else(|| {
                        error!("Invalid key press '{value}', expected <key>@<frame>");
                        process::exit(1);
                    })),
                }
                i += 1;
            }
            "--trace" => {
                set_min_level(Level::Debug);
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

    let image = match assemble_file(input_path) {
        Ok(image) => image,
        Err(e) => {
            error!("Assembly failed: {} ({})", e, e.kind_name());
            process::exit(1);
        }
    };

    let mut console = Console::new(config);
    console.load(image);

    let mut outcome = console.play();
    let mut frame = 0;
    while frame < frames && console.state() == ConsoleState::Running {
        for (key, _) in presses.iter().filter(|(_, at)| *at == frame) {
            console.key_down(*key);
        }
        let Some(report) = console.tick() else {
            break;
        };
        println!(
            "frame {:>4}: {} commands, {} timers, {} draws",
            frame,
            report.commands,
            report.events_run,
            console.scene().draws().len()
        );
        outcome = report.outcome;
        frame += 1;
    }

    print_state(&console);

    match outcome {
        RunOutcome::Halted(err) => {
            error!("{}", err.describe(&console.image().code));
            process::exit(2);
        }
        RunOutcome::Breakpoint => info!("Stopped at breakpoint after {frame} frames"),
        RunOutcome::Stopped | RunOutcome::BudgetExhausted => info!("Ran {frame} frames"),
    }
}

fn print_state(console: &Console) {
    let cpu = console.cpu();
    println!("pc    {}", console.image().code.describe(cpu.pc()));
    println!("flags {}", cpu.flags());
    for (index, word) in cpu.registers().iter().enumerate() {
        let kind = if index <= GENERAL_REGISTER_MAX as usize {
            ""
        } else {
            " (input)"
        };
        println!("R{index:<2}   {word}{kind}");
    }
    println!("stack {} entries", cpu.stack().len());
    println!("timers {} pending", cpu.pending_events().len());
    let visible = console.scene().sprites().iter().filter(|s| s.visible).count();
    println!("sprites {visible} visible");
}

fn number_or_exit(flag: &str, value: &str) -> u64 {
    parse_u64(value).unwrap_or_else(|| {
        error!("Invalid value for {flag}: '{value}' is not a valid number");
        process::exit(1);
    })
}

/// `<key>@<frame>`, e.g. `32@10`.
fn parse_press(text: &str) -> Option<(u16, u64)> {
    let (key, frame) = text.split_once('@')?;
    let key = u16::try_from(parse_u64(key)?).ok()?;
    Some((key, parse_u64(frame)?))
}

const USAGE: &str = "\
ChipCade Player

USAGE:
    {program} <program.cc> [OPTIONS]

ARGS:
    <program.cc>    Program file with [ code ], [ data ], [ images ] sections

OPTIONS:
    --frames <n>            Frames to run after Init (default 60)
    --seed <n>              Seed for RAND, decimal or 0x hex
    --budget <n>            Instructions per pass, 0 for unlimited
    --press <key>@<frame>   Press a key before the given frame (repeatable)
    --trace                 Log every executed instruction
    -h, --help              Print this help message

ENVIRONMENT:
    CHIPCADE_SEED      Default RAND seed
    CHIPCADE_BUDGET    Default instruction budget
    CHIPCADE_LOG       Minimum log level (debug, info, warn, error)

EXAMPLES:
    # Run one second of frames
    {program} game.cc

    # Press space on frame 5 and run 10 frames
    {program} game.cc --frames 10 --press 32@5
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
