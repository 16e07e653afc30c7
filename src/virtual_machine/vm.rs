//! CPU execution engine.
//!
//! The CPU walks the decoded instructions of a [`ProgramImage`] one at a time.
//! Each instruction reports an [`ExecuteResult`] that tells the loop where to
//! go next. A runtime error never escapes a single instruction: it is recorded
//! as a [`MachineError`] together with the faulting address, and the CPU stays
//! halted until [`Cpu::clear_error`] or [`Cpu::reset`].
//!
//! Graphics instructions validate their operands and append a command to the
//! [`Gcp`] queue; input and renderer state is read through [`Host`].

use crate::config::MachineConfig;
use crate::virtual_machine::assembler::format_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::flags::Flags;
use crate::virtual_machine::gcp::{Gcp, GcpCmd};
use crate::virtual_machine::host::{Axis, Host, SpriteAttr};
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::{CodeTarget, MemRef, OBJECT_REGISTER_MAX, ObjRef, Resolution};
use crate::virtual_machine::program::{CodeAddr, CodeImage, MemoryMap, ProgramImage, Resources};
use crate::virtual_machine::word::{ArithOp, REGISTER_COUNT, Word};
use events::EventQueue;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use registers::Registers;
use std::fmt;

mod events;
mod registers;
mod stack;
#[cfg(test)]
mod tests;

pub use events::TimedEvent;
pub use registers::{GENERAL_REGISTER_MAX, InputRegister, REGISTER_MAX};
pub use stack::StackEntry;

/// Number of addressable sprites.
pub const SPRITE_COUNT: usize = 256;
/// Number of addressable layers.
pub const LAYER_COUNT: usize = 8;

/// Where execution continues after one instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecuteResult {
    /// Continue with the following instruction.
    NextInstruction,
    /// The pointer was already moved.
    Jumped,
    /// End of this pass.
    Stop,
    /// Continue with the following instruction, but end this pass first.
    Breakpoint,
}

/// How a pass of [`Cpu::execute`] ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    Stopped,
    /// Paused after a `BRKPT`; the next pass resumes behind it.
    Breakpoint,
    Halted(MachineError),
    /// The configured instruction budget ran out.
    BudgetExhausted,
}

/// A runtime error and the instruction that raised it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineError {
    pub error: VMError,
    pub at: CodeAddr,
}

impl MachineError {
    /// Text for the console, e.g. `InvalidSpriteIndex: invalid sprite index 300 at Update + 0x2`.
    pub fn describe(&self, code: &CodeImage) -> String {
        format!(
            "{}: {} at {}",
            self.error.kind_name(),
            self.error,
            code.describe(self.at)
        )
    }
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at module {} index {}",
            self.error, self.at.module, self.at.index
        )
    }
}

/// Branch condition of the jump family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Condition {
    Always,
    Zero,
    NotZero,
    Less,
    Greater,
    Carry,
    Overflow,
}

impl Condition {
    /// `unsigned` selects carry-based ordering after an unsigned compare.
    fn holds(self, flags: &Flags, unsigned: bool) -> bool {
        match self {
            Condition::Always => true,
            Condition::Zero => flags.zero,
            Condition::NotZero => !flags.zero,
            Condition::Less if unsigned => flags.carry,
            Condition::Less => flags.negative != flags.overflow,
            Condition::Greater if unsigned => !flags.carry && !flags.zero,
            Condition::Greater => !flags.zero && flags.negative == flags.overflow,
            Condition::Carry => flags.carry,
            Condition::Overflow => flags.overflow,
        }
    }
}

/// Everything outside the CPU one instruction may touch.
struct ExecCtx<'a, H: Host + ?Sized> {
    code: &'a CodeImage,
    memory: &'a mut MemoryMap,
    resources: &'a Resources,
    gcp: &'a mut Gcp,
    host: &'a mut H,
}

/// Dispatches an instruction to its `op_*` handler.
///
/// `plain` handlers only touch CPU state, `with_ctx` handlers also receive the
/// [`ExecCtx`]. Bracketed expressions are passed ahead of the operands.
macro_rules! exec_vm {
    (
        vm = $vm:ident,
        ctx = $ctx:ident,
        instr = $instr:ident,
        plain {
            $( $pv:ident => $ph:ident $( [ $( $pe:expr ),* ] )? ( $( $pf:ident : $pk:ident ),* ) ),* $(,)?
        }
        with_ctx {
            $( $cv:ident => $ch:ident $( [ $( $ce:expr ),* ] )? ( $( $cf:ident : $ck:ident ),* ) ),* $(,)?
        }
    ) => {{
        match $instr {
            $(
                Instruction::$pv { $( $pf, )* .. } => {
                    $( let $pf = exec_vm!(@read $pf, $pk); )*
                    $vm.$ph($( $( $pe, )* )? $( $pf ),*)
                }
            )*
            $(
                Instruction::$cv { $( $cf, )* .. } => {
                    $( let $cf = exec_vm!(@read $cf, $ck); )*
                    $vm.$ch($ctx, $( $( $ce, )* )? $( $cf ),*)
                }
            )*
        }
    }};

    // Copy operands by value
    (@read $f:ident, Reg) => { *$f };
    (@read $f:ident, Value) => { *$f };
    (@read $f:ident, Sprite) => { *$f };
    (@read $f:ident, Layer) => { *$f };
    (@read $f:ident, Frame) => { *$f };

    // Borrow the rest
    (@read $f:ident, Target) => { $f };
    (@read $f:ident, Mem) => { $f };
    (@read $f:ident, Res) => { $f };
    (@read $f:ident, Name) => { $f.as_str() };
}

/// The ChipCade CPU.
#[derive(Clone, Debug)]
pub struct Cpu {
    registers: Registers,
    flags: Flags,
    stack: Vec<StackEntry>,
    pc: CodeAddr,
    /// Whether the last `CMP` compared unsigned words; selects how `JL`/`JG`
    /// read the flags.
    last_cmp_unsigned: bool,
    events: EventQueue,
    elapsed_ms: u64,
    rng: ChaCha8Rng,
    error: Option<MachineError>,
    budget: Option<u64>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(&MachineConfig::default())
    }
}

impl Cpu {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            registers: Registers::new(),
            flags: Flags::default(),
            stack: Vec::new(),
            pc: CodeAddr::default(),
            last_cmp_unsigned: false,
            events: EventQueue::default(),
            elapsed_ms: 0,
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            error: None,
            budget: config.instruction_budget,
        }
    }

    // ==================== State access ====================

    pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
        self.registers.as_array()
    }

    pub fn register(&self, index: u16) -> Option<Word> {
        self.registers.get(index).ok()
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Call stack, oldest entry first.
    pub fn stack(&self) -> &[StackEntry] {
        &self.stack
    }

    pub fn pc(&self) -> CodeAddr {
        self.pc
    }

    pub fn set_pc(&mut self, addr: CodeAddr) {
        self.pc = addr;
    }

    pub fn error(&self) -> Option<&MachineError> {
        self.error.as_ref()
    }

    /// Leaves the halted state; the pointer stays on the faulting instruction.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn pending_events(&self) -> &[TimedEvent] {
        self.events.pending()
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed_ms as f32 / 1000.0
    }

    pub fn budget(&self) -> Option<u64> {
        self.budget
    }

    pub fn set_budget(&mut self, budget: Option<u64>) {
        self.budget = budget;
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Host input into `R8`..`R11`.
    pub fn set_input(&mut self, reg: InputRegister, value: Word) {
        self.registers.set_input(reg, value);
    }

    /// Returns the CPU to its power-on state for a new run.
    ///
    /// Clears `R0`..`R7`, flags, stack, timed events, error, pointer and
    /// elapsed time. Input registers keep the host's last values.
    pub fn reset(&mut self) {
        self.registers.clear_general();
        self.flags.clear();
        self.stack.clear();
        self.events.clear();
        self.error = None;
        self.pc = CodeAddr::default();
        self.last_cmp_unsigned = false;
        self.elapsed_ms = 0;
    }

    /// Advances the clock by one frame and returns the timed events that came due.
    pub fn advance_time(&mut self, delta_ms: u32) -> Vec<CodeAddr> {
        self.elapsed_ms = self.elapsed_ms.saturating_add(delta_ms as u64);
        self.events.advance(delta_ms)
    }

    // ==================== Execution ====================

    /// Runs from `addr` until the code stops, pauses, fails or the budget
    /// runs out. Does nothing while an error is recorded.
    pub fn execute_from<H: Host + ?Sized>(
        &mut self,
        addr: CodeAddr,
        image: &mut ProgramImage,
        gcp: &mut Gcp,
        host: &mut H,
    ) -> RunOutcome {
        if let Some(err) = &self.error {
            return RunOutcome::Halted(err.clone());
        }
        self.pc = addr;
        self.execute(image, gcp, host)
    }

    /// Runs from the current pointer.
    pub fn execute<H: Host + ?Sized>(
        &mut self,
        image: &mut ProgramImage,
        gcp: &mut Gcp,
        host: &mut H,
    ) -> RunOutcome {
        let mut executed: u64 = 0;
        loop {
            if self.budget.is_some_and(|limit| executed >= limit) {
                return RunOutcome::BudgetExhausted;
            }
            match self.step(image, gcp, host) {
                Ok(ExecuteResult::NextInstruction | ExecuteResult::Jumped) => executed += 1,
                Ok(ExecuteResult::Stop) => return RunOutcome::Stopped,
                Ok(ExecuteResult::Breakpoint) => return RunOutcome::Breakpoint,
                Err(err) => return RunOutcome::Halted(err),
            }
        }
    }

    /// Executes exactly one instruction.
    ///
    /// A pointer past the end of its module is an implicit `Stop`.
    pub fn step<H: Host + ?Sized>(
        &mut self,
        image: &mut ProgramImage,
        gcp: &mut Gcp,
        host: &mut H,
    ) -> Result<ExecuteResult, MachineError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let ProgramImage {
            code,
            memory,
            resources,
        } = image;
        let code: &CodeImage = code;
        let Some(instr) = code.fetch(self.pc) else {
            return Ok(ExecuteResult::Stop);
        };
        crate::debug!("{}: {}", code.describe(self.pc), format_instruction(instr));

        let mut ctx = ExecCtx {
            code,
            memory,
            resources,
            gcp,
            host,
        };
        let result = self.execute_instruction(instr, &mut ctx);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(result),
        }
    }

    /// Runs one instruction and moves the pointer.
    ///
    /// Errors are recorded, logged and turned into [`ExecuteResult::Stop`].
    fn execute_instruction<H: Host + ?Sized>(
        &mut self,
        instr: &Instruction,
        ctx: &mut ExecCtx<'_, H>,
    ) -> ExecuteResult {
        let at = self.pc;
        match self.dispatch(instr, ctx) {
            Ok(result) => {
                if matches!(
                    result,
                    ExecuteResult::NextInstruction | ExecuteResult::Breakpoint
                ) {
                    self.pc = at.next();
                }
                result
            }
            Err(error) => {
                crate::warn!(
                    "CPU halted at {}: {} ({})",
                    ctx.code.describe(at),
                    error,
                    error.kind_name()
                );
                self.error = Some(MachineError { error, at });
                ExecuteResult::Stop
            }
        }
    }

    fn dispatch<H: Host + ?Sized>(
        &mut self,
        instr: &Instruction,
        ctx: &mut ExecCtx<'_, H>,
    ) -> Result<ExecuteResult, VMError> {
        exec_vm!(
            vm = self,
            ctx = ctx,
            instr = instr,
            plain {
                Add => op_arith[ArithOp::Add](rd: Reg, value: Value),
                Sub => op_arith[ArithOp::Sub](rd: Reg, value: Value),
                Mul => op_arith[ArithOp::Mul](rd: Reg, value: Value),
                Div => op_arith[ArithOp::Div](rd: Reg, value: Value),
                Mod => op_arith[ArithOp::Mod](rd: Reg, value: Value),
                Inc => op_inc(rd: Reg),
                Dec => op_dec(rd: Reg),
                Sin => op_trig[f32::sin](rd: Reg, value: Value),
                Cos => op_trig[f32::cos](rd: Reg, value: Value),
                Rand => op_rand(rd: Reg, max: Value),
                Push => op_push(value: Value),
                Ret => op_ret(),
                Brkpt => op_brkpt(),
                Time => op_time(rd: Reg),
                Nop => op_nop(),
                Tag => op_nop(),
                Comment => op_nop(),
            }
            with_ctx {
                Cmp => op_cmp(rd: Reg, value: Value),
                Ld => op_ld(rd: Reg, src: Mem),
                St => op_st(dst: Mem, value: Value),
                Ldi => op_ldi(rd: Reg, value: Value),
                J => op_branch[Condition::Always](target: Target),
                Je => op_branch[Condition::Zero](target: Target),
                Jne => op_branch[Condition::NotZero](target: Target),
                Jl => op_branch[Condition::Less](target: Target),
                Jg => op_branch[Condition::Greater](target: Target),
                Jc => op_branch[Condition::Carry](target: Target),
                Jo => op_branch[Condition::Overflow](target: Target),
                Call => op_call(target: Target),
                Calltm => op_calltm(target: Target, seconds: Value),
                Ldresx => op_ldres[Axis::X](rd: Reg),
                Ldresy => op_ldres[Axis::Y](rd: Reg),
                Ldspr => op_ldspr(rd: Reg, sprite: Sprite, attr: Name),
                Rect => op_rect(),
                Sprset => op_sprset(sprite: Sprite, group: Name),
                Sprx => op_sprpos[Axis::X](sprite: Sprite, value: Value),
                Spry => op_sprpos[Axis::Y](sprite: Sprite, value: Value),
                Sprrot => op_sprite_value[|sprite, v| GcpCmd::SpriteRotation { sprite, degrees: v.to_f32() }](sprite: Sprite, value: Value),
                Sprroo => op_sprite_value[|sprite, v| GcpCmd::SpriteRotationOffset { sprite, degrees: v.to_f32() }](sprite: Sprite, value: Value),
                Sprspd => op_sprite_value[|sprite, v| GcpCmd::SpriteSpeed { sprite, speed: v.to_f32() }](sprite: Sprite, value: Value),
                Spracc => op_sprite_value[|sprite, v| GcpCmd::SpriteAcceleration { sprite, value: v.to_f32() }](sprite: Sprite, value: Value),
                Sprimg => op_sprite_value[|sprite, v| GcpCmd::SpriteImage { sprite, image: v.to_i32() }](sprite: Sprite, value: Value),
                Sprvis => op_sprite_value[|sprite, v| GcpCmd::SpriteVisible { sprite, visible: v.to_i32() != 0 }](sprite: Sprite, value: Value),
                Sprwrp => op_sprite_value[|sprite, v| GcpCmd::SpriteWrap { sprite, wrap: v.to_i32() == 1 }](sprite: Sprite, value: Value),
                Sprgrp => op_sprite_value[|sprite, v| GcpCmd::SpriteGroup { sprite, group: v.to_i32() }](sprite: Sprite, value: Value),
                Sprfri => op_sprite_value[|sprite, v| GcpCmd::SpriteFriction { sprite, friction: v.to_f32() }](sprite: Sprite, value: Value),
                Sprmxs => op_sprite_value[|sprite, v| GcpCmd::SpriteMaxSpeed { sprite, speed: v.to_f32() }](sprite: Sprite, value: Value),
                Sprpri => op_sprite_value[|sprite, v| GcpCmd::SpritePriority { sprite, priority: v.to_i32() }](sprite: Sprite, value: Value),
                Sprfps => op_sprite_value[|sprite, v| GcpCmd::SpriteFps { sprite, fps: v.to_i32() }](sprite: Sprite, value: Value),
                Spralp => op_sprite_value[|sprite, v| GcpCmd::SpriteAlpha { sprite, alpha: v.to_f32() }](sprite: Sprite, value: Value),
                Sprscl => op_sprite_value[|sprite, v| GcpCmd::SpriteScale { sprite, scale: v.to_f32() }](sprite: Sprite, value: Value),
                Sprstp => op_sprite_cmd[|sprite| GcpCmd::SpriteStopAnimation { sprite }](sprite: Sprite),
                Sprhlt => op_sprite_cmd[|sprite| GcpCmd::SpriteHalt { sprite }](sprite: Sprite),
                Sprlyr => op_sprlyr(sprite: Sprite, layer: Layer),
                Sprcol => op_sprcol(sprite: Sprite, group: Value),
                Spranm => op_spranm(sprite: Sprite, from: Frame, to: Frame),
                Lyrres => op_lyrres(layer: Layer, res: Res),
                Lyrvis => op_lyrvis(layer: Layer, value: Value),
                Fntset => op_fntset(font: Name, size: Value),
                Txtval => op_txtval(value: Value),
                Txtmem => op_txtmem(src: Mem),
            }
        )
    }

    // ==================== Operand helpers ====================

    fn value(&self, value: Word) -> Result<Word, VMError> {
        self.registers.resolve(value)
    }

    /// Index held by a sprite or layer operand.
    ///
    /// Only `R0`..`R7` may carry an index; any other register is reported
    /// through `invalid`.
    fn object_index(&self, obj: ObjRef, invalid: fn(i32) -> VMError) -> Result<i32, VMError> {
        match obj {
            ObjRef::Index(index) => Ok(index as i32),
            ObjRef::Register(reg) if reg <= OBJECT_REGISTER_MAX => {
                Ok(self.registers.get(reg)?.to_i32())
            }
            ObjRef::Register(reg) => Err(invalid(reg as i32)),
        }
    }

    fn sprite_index(&self, sprite: ObjRef) -> Result<u8, VMError> {
        let index = self.object_index(sprite, VMError::InvalidSpriteIndex)?;
        u8::try_from(index).map_err(|_| VMError::InvalidSpriteIndex(index))
    }

    fn layer_index(&self, layer: ObjRef) -> Result<u8, VMError> {
        let index = self.object_index(layer, VMError::InvalidLayerIndex)?;
        match u8::try_from(index) {
            Ok(layer) if (layer as usize) < LAYER_COUNT => Ok(layer),
            _ => Err(VMError::InvalidLayerIndex(index)),
        }
    }

    // ==================== Arithmetic ====================

    fn op_arith(&mut self, op: ArithOp, rd: u16, value: Word) -> Result<ExecuteResult, VMError> {
        let rhs = self.value(value)?;
        let mut lhs = self.registers.get_general(rd)?;
        lhs.apply(op, rhs, &mut self.flags)?;
        self.registers.set_general(rd, lhs)?;
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_inc(&mut self, rd: u16) -> Result<ExecuteResult, VMError> {
        let mut word = self.registers.get_general(rd)?;
        word.inc(&mut self.flags);
        self.registers.set_general(rd, word)?;
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_dec(&mut self, rd: u16) -> Result<ExecuteResult, VMError> {
        let mut word = self.registers.get_general(rd)?;
        word.dec(&mut self.flags);
        self.registers.set_general(rd, word)?;
        Ok(ExecuteResult::NextInstruction)
    }

    /// `SIN` / `COS` on radians; the result is always a float.
    fn op_trig(&mut self, f: fn(f32) -> f32, rd: u16, value: Word) -> Result<ExecuteResult, VMError> {
        let x = self.value(value)?.to_f32();
        self.registers.set_general(rd, Word::from_f32(f(x)))?;
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_rand(&mut self, rd: u16, max: Word) -> Result<ExecuteResult, VMError> {
        let max = self.value(max)?;
        let word = Word::random_up_to(max, &mut self.rng);
        self.registers.set_general(rd, word)?;
        Ok(ExecuteResult::NextInstruction)
    }

    // ==================== Compare ====================

    /// Writes all four flags from `Rd - value`.
    ///
    /// On `R8` the compare instead asks the host whether key `value` is held.
    fn op_cmp<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        rd: u16,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let rhs = self.value(value)?;
        let lhs = self.registers.get(rd)?;
        let mut flags = Flags::default();
        if rd == InputRegister::Key.index() {
            flags.zero = ctx.host.is_key_down(rhs.to_i32());
        } else {
            lhs.cmp(rhs, &mut flags)?;
        }
        self.flags = flags;
        self.last_cmp_unsigned = lhs.is_unsigned() || lhs.is_char();
        Ok(ExecuteResult::NextInstruction)
    }

    // ==================== Data movement ====================

    fn op_ld<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        rd: u16,
        src: &MemRef,
    ) -> Result<ExecuteResult, VMError> {
        let word = ctx.memory.get(src)?;
        self.registers.set(rd, word)?;
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_st<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        dst: &MemRef,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let word = self.value(value)?;
        ctx.memory.set(dst, word)?;
        Ok(ExecuteResult::NextInstruction)
    }

    /// Loading `R8` also releases the key it held, so a key press is seen once.
    fn op_ldi<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        rd: u16,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let word = self.value(value)?;
        if rd == InputRegister::Key.index() {
            let held = self.registers.get(rd)?;
            ctx.host.release_key(held.to_i32());
        }
        self.registers.set(rd, word)?;
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_push(&mut self, value: Word) -> Result<ExecuteResult, VMError> {
        let word = self.value(value)?;
        self.stack.push(StackEntry::Value(word));
        Ok(ExecuteResult::NextInstruction)
    }

    // ==================== Control flow ====================

    fn op_branch<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        cond: Condition,
        target: &CodeTarget,
    ) -> Result<ExecuteResult, VMError> {
        if !cond.holds(&self.flags, self.last_cmp_unsigned) {
            return Ok(ExecuteResult::NextInstruction);
        }
        self.pc = ctx.code.resolve(target, self.pc.module)?;
        Ok(ExecuteResult::Jumped)
    }

    fn op_call<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        target: &CodeTarget,
    ) -> Result<ExecuteResult, VMError> {
        let dest = ctx.code.resolve(target, self.pc.module)?;
        self.stack.push(StackEntry::Return(self.pc.next()));
        self.pc = dest;
        Ok(ExecuteResult::Jumped)
    }

    /// An empty stack ends the pass.
    fn op_ret(&mut self) -> Result<ExecuteResult, VMError> {
        match self.stack.pop() {
            None => Ok(ExecuteResult::Stop),
            Some(StackEntry::Return(addr)) => {
                self.pc = addr;
                Ok(ExecuteResult::Jumped)
            }
            Some(StackEntry::Value(word)) => Err(VMError::InvalidCodeAddress(word.to_string())),
        }
    }

    fn op_calltm<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        target: &CodeTarget,
        seconds: Word,
    ) -> Result<ExecuteResult, VMError> {
        let dest = ctx.code.resolve(target, self.pc.module)?;
        let seconds = self.value(seconds)?.to_f32();
        self.events.schedule(dest, (seconds * 1000.0).round() as i32);
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_brkpt(&mut self) -> Result<ExecuteResult, VMError> {
        Ok(ExecuteResult::Breakpoint)
    }

    fn op_nop(&mut self) -> Result<ExecuteResult, VMError> {
        Ok(ExecuteResult::NextInstruction)
    }

    // ==================== Queries ====================

    fn op_time(&mut self, rd: u16) -> Result<ExecuteResult, VMError> {
        self.registers
            .set_general(rd, Word::from_f32(self.elapsed_secs()))?;
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_ldres<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        axis: Axis,
        rd: u16,
    ) -> Result<ExecuteResult, VMError> {
        let (width, height) = ctx.host.display_size();
        let size = match axis {
            Axis::X => width,
            Axis::Y => height,
        };
        self.registers.set(rd, Word::Unsigned16(size))?;
        Ok(ExecuteResult::NextInstruction)
    }

    /// Unknown attribute names leave `Rd` untouched.
    fn op_ldspr<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        rd: u16,
        sprite: ObjRef,
        attr: &str,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        self.registers.get(rd)?;
        if let Some(attr) = SpriteAttr::parse(attr) {
            let value = ctx.host.sprite_attribute(sprite, attr);
            self.registers.set(rd, Word::from_f32(value))?;
        }
        Ok(ExecuteResult::NextInstruction)
    }

    // ==================== Graphics ====================

    /// Draws `R0`..`R3` as x, y, width, height in palette colour `R4`.
    ///
    /// A palette index outside the palette draws nothing.
    fn op_rect<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
    ) -> Result<ExecuteResult, VMError> {
        let [x, y, width, height, color, ..] = *self.registers.as_array();
        if let Some(color) = ctx.resources.color(color.to_i32()) {
            ctx.gcp.add_cmd(GcpCmd::Rect {
                x: x.to_f32(),
                y: y.to_f32(),
                width: width.to_f32(),
                height: height.to_f32(),
                color,
            });
        }
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_sprset<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        sprite: ObjRef,
        group: &str,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        let group = ctx
            .resources
            .image_group(group)
            .cloned()
            .ok_or_else(|| VMError::InvalidImageGroup(group.to_string()))?;
        ctx.gcp.add_cmd(GcpCmd::SpriteSet { sprite, group });
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_sprite_value<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        make: impl FnOnce(u8, Word) -> GcpCmd,
        sprite: ObjRef,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        let value = self.value(value)?;
        ctx.gcp.add_cmd(make(sprite, value));
        Ok(ExecuteResult::NextInstruction)
    }

    /// Moves the sprite in the host at once so later collision and
    /// attribute queries in the same pass see it, then queues the command.
    fn op_sprpos<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        axis: Axis,
        sprite: ObjRef,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        let value = self.value(value)?.to_f32();
        ctx.host.set_sprite_position(sprite, axis, value);
        ctx.gcp.add_cmd(match axis {
            Axis::X => GcpCmd::SpriteX { sprite, value },
            Axis::Y => GcpCmd::SpriteY { sprite, value },
        });
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_sprite_cmd<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        make: impl FnOnce(u8) -> GcpCmd,
        sprite: ObjRef,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        ctx.gcp.add_cmd(make(sprite));
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_sprlyr<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        sprite: ObjRef,
        layer: ObjRef,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        let layer = self.layer_index(layer)?;
        ctx.gcp.add_cmd(GcpCmd::SpriteLayer { sprite, layer });
        Ok(ExecuteResult::NextInstruction)
    }

    /// Sets only the zero flag: set when the sprite touches one of `group`.
    fn op_sprcol<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        sprite: ObjRef,
        group: Word,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        let group = self.value(group)?.to_i32();
        self.flags.zero = ctx.host.sprite_collides(sprite, group);
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_spranm<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        sprite: ObjRef,
        from: u16,
        to: u16,
    ) -> Result<ExecuteResult, VMError> {
        let sprite = self.sprite_index(sprite)?;
        ctx.gcp.add_cmd(GcpCmd::SpriteAnimate { sprite, from, to });
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_lyrres<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        layer: ObjRef,
        res: &Resolution,
    ) -> Result<ExecuteResult, VMError> {
        let layer = self.layer_index(layer)?;
        let (width, height) = res
            .dimensions()
            .ok_or_else(|| VMError::InvalidResolution(res.to_string()))?;
        ctx.gcp.add_cmd(GcpCmd::LayerResolution {
            layer,
            width,
            height,
        });
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_lyrvis<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        layer: ObjRef,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let layer = self.layer_index(layer)?;
        let visible = self.value(value)?.to_i32() != 0;
        ctx.gcp.add_cmd(GcpCmd::LayerVisible { layer, visible });
        Ok(ExecuteResult::NextInstruction)
    }

    // ==================== Text ====================

    fn op_fntset<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        font: &str,
        size: Word,
    ) -> Result<ExecuteResult, VMError> {
        if !ctx.host.has_font(font) {
            return Err(VMError::UnknownFont(font.to_string()));
        }
        let size = self.value(size)?.to_f32();
        ctx.gcp.add_cmd(GcpCmd::FontSet {
            name: font.to_lowercase(),
            size,
        });
        Ok(ExecuteResult::NextInstruction)
    }

    fn op_txtval<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        value: Word,
    ) -> Result<ExecuteResult, VMError> {
        let text = self.value(value)?.display_text();
        self.enqueue_text(ctx, text);
        Ok(ExecuteResult::NextInstruction)
    }

    /// Prints the characters stored from `src` on, or the single value there
    /// when it is not a character.
    fn op_txtmem<H: Host + ?Sized>(
        &mut self,
        ctx: &mut ExecCtx<'_, H>,
        src: &MemRef,
    ) -> Result<ExecuteResult, VMError> {
        let first = ctx.memory.get(src)?;
        let text = if first.is_char() {
            ctx.memory.read_text(src)?
        } else {
            first.display_text()
        };
        self.enqueue_text(ctx, text);
        Ok(ExecuteResult::NextInstruction)
    }

    /// Text at (`R0`, `R1`) in palette colour `R2`.
    fn enqueue_text<H: Host + ?Sized>(&self, ctx: &mut ExecCtx<'_, H>, text: String) {
        let [x, y, color, ..] = *self.registers.as_array();
        ctx.gcp.add_cmd(GcpCmd::Text {
            text,
            x: x.to_f32(),
            y: y.to_f32(),
            color_index: color.to_i32(),
        });
    }
}
