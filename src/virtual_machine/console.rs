//! Console driver.
//!
//! [`Console`] owns one loaded program and everything that runs it: the CPU,
//! the GCP queue and the headless scene. Callers drive it frame by frame with
//! [`Console::tick`].
//!
//! A frame runs the timed events that came due, then the `Update` module
//! from its first instruction, then replays the GCP queue into the scene.

use crate::config::MachineConfig;
use crate::virtual_machine::assembler::assemble_module;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::gcp::Gcp;
use crate::virtual_machine::program::{CodeAddr, ProgramImage};
use crate::virtual_machine::scene::Scene;
use crate::virtual_machine::vm::{Cpu, ExecuteResult, InputRegister, MachineError, RunOutcome};
use crate::virtual_machine::word::Word;
use crate::{debug, info, warn};

/// Module run once by [`Console::play`].
pub const INIT_MODULE: usize = 0;
/// Module run every frame by [`Console::tick`].
pub const UPDATE_MODULE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleState {
    Stopped,
    Running,
    /// Paused by the user or a breakpoint; [`Console::step`] still works.
    Paused,
    /// A runtime error is recorded in the CPU.
    Halted,
}

/// What one [`Console::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub events_run: usize,
    /// Commands replayed into the scene.
    pub commands: usize,
    pub outcome: RunOutcome,
}

pub struct Console {
    config: MachineConfig,
    image: ProgramImage,
    cpu: Cpu,
    gcp: Gcp,
    scene: Scene,
    state: ConsoleState,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl Console {
    /// A console with an empty program.
    pub fn new(config: MachineConfig) -> Self {
        Self {
            cpu: Cpu::new(&config),
            scene: Scene::new(&config),
            image: ProgramImage::new(Vec::new()),
            gcp: Gcp::new(),
            state: ConsoleState::Stopped,
            config,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn image(&self) -> &ProgramImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut ProgramImage {
        &mut self.image
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn gcp(&self) -> &Gcp {
        &self.gcp
    }

    pub fn state(&self) -> ConsoleState {
        self.state
    }

    /// Replaces the running program. The console is stopped first.
    pub fn load(&mut self, image: ProgramImage) {
        self.stop();
        info!(
            "Loaded program {} ({} modules)",
            &image.digest_hex()[..16],
            image.code.modules().len()
        );
        self.image = image;
    }

    /// Resets the machine and runs `Init`.
    pub fn play(&mut self) -> RunOutcome {
        self.cpu.reset();
        self.cpu.reseed(self.config.rng_seed);
        self.scene.reset();
        self.gcp.clear();
        self.state = ConsoleState::Running;
        info!("Playing");

        let outcome = self.cpu.execute_from(
            CodeAddr::start(INIT_MODULE),
            &mut self.image,
            &mut self.gcp,
            &mut self.scene,
        );
        self.track(&outcome);
        outcome
    }

    /// Runs one frame. Does nothing unless the console is running.
    pub fn tick(&mut self) -> Option<FrameReport> {
        if self.state != ConsoleState::Running {
            return None;
        }

        let delta_ms = self.config.frame_delta_ms;
        let due = self.cpu.advance_time(delta_ms);
        let events_run = due.len();
        for addr in due {
            debug!("Timer fired at {}", self.image.code.describe(addr));
            let outcome =
                self.cpu
                    .execute_from(addr, &mut self.image, &mut self.gcp, &mut self.scene);
            if !self.track(&outcome) {
                return Some(self.finish_frame(events_run, outcome));
            }
        }

        let outcome = self.cpu.execute_from(
            CodeAddr::start(UPDATE_MODULE),
            &mut self.image,
            &mut self.gcp,
            &mut self.scene,
        );
        self.track(&outcome);
        Some(self.finish_frame(events_run, outcome))
    }

    fn finish_frame(&mut self, events_run: usize, outcome: RunOutcome) -> FrameReport {
        let commands = self.gcp.len();
        self.scene.advance(self.config.frame_delta_ms as f32 / 1000.0);
        self.gcp.draw(&mut self.scene);
        FrameReport {
            events_run,
            commands,
            outcome,
        }
    }

    /// Updates the console state from a pass outcome. Returns whether the
    /// frame may continue.
    fn track(&mut self, outcome: &RunOutcome) -> bool {
        match outcome {
            RunOutcome::Stopped => true,
            RunOutcome::BudgetExhausted => {
                warn!(
                    "Instruction budget exhausted at {}",
                    self.image.code.describe(self.cpu.pc())
                );
                true
            }
            RunOutcome::Breakpoint => {
                info!(
                    "Breakpoint at {}",
                    self.image.code.describe(self.cpu.pc())
                );
                self.state = ConsoleState::Paused;
                false
            }
            RunOutcome::Halted(_) => {
                self.state = ConsoleState::Halted;
                false
            }
        }
    }

    /// Resets registers, flags, stack and timers; the program stays loaded.
    pub fn stop(&mut self) {
        self.cpu.reset();
        self.gcp.clear();
        if self.state != ConsoleState::Stopped {
            info!("Stopped");
        }
        self.state = ConsoleState::Stopped;
    }

    pub fn pause(&mut self) {
        if self.state == ConsoleState::Running {
            self.state = ConsoleState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == ConsoleState::Paused {
            self.state = ConsoleState::Running;
        }
    }

    /// Executes one instruction at the CPU's pointer and pauses.
    pub fn step(&mut self) -> Result<ExecuteResult, MachineError> {
        let result = self
            .cpu
            .step(&mut self.image, &mut self.gcp, &mut self.scene);
        self.state = match result {
            Ok(_) => ConsoleState::Paused,
            Err(_) => ConsoleState::Halted,
        };
        result
    }

    /// Clears a recorded error so the console can resume from the faulting
    /// instruction.
    pub fn clear_error(&mut self) {
        self.cpu.clear_error();
        if self.state == ConsoleState::Halted {
            self.state = ConsoleState::Paused;
        }
    }

    /// Compiles `source` and swaps it in for module `name`.
    ///
    /// On a syntax error the module keeps its previous instructions.
    pub fn replace_module_source(&mut self, name: &str, source: &str) -> Result<(), VMError> {
        let code = assemble_module(source)?;
        self.image.code.replace_module(name, code)?;
        info!("Recompiled module {name}");
        Ok(())
    }

    // ==================== Input ====================

    /// Presses a key: it is held in the scene and latched into `R8`.
    pub fn key_down(&mut self, code: u16) {
        self.scene.key_down(code as i32);
        self.cpu
            .set_input(InputRegister::Key, Word::Unsigned16(code));
    }

    pub fn key_up(&mut self, code: u16) {
        self.scene.key_up(code as i32);
    }

    /// Pointer button state into `R9` and position into `R10`/`R11`.
    pub fn set_pointer(&mut self, pressed: bool, x: i16, y: i16) {
        self.cpu
            .set_input(InputRegister::Pointer, Word::Unsigned16(pressed as u16));
        self.cpu
            .set_input(InputRegister::PointerX, Word::Signed16(x));
        self.cpu
            .set_input(InputRegister::PointerY, Word::Signed16(y));
    }
}
