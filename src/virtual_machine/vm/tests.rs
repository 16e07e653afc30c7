use super::*;
use crate::virtual_machine::assembler::{assemble_module, assemble_program};
use crate::virtual_machine::program::{ImageGroup, MATH_MODULE_INDEX, Module};
use std::collections::{HashMap, HashSet};

/// Host double with scripted answers.
#[derive(Default)]
struct TestHost {
    keys: HashSet<i32>,
    released: Vec<i32>,
    colliding: HashSet<(u8, i32)>,
    attributes: HashMap<(u8, &'static str), f32>,
}

impl Host for TestHost {
    fn is_key_down(&self, code: i32) -> bool {
        self.keys.contains(&code)
    }

    fn release_key(&mut self, code: i32) {
        self.keys.remove(&code);
        self.released.push(code);
    }

    fn display_size(&self) -> (u16, u16) {
        (320, 200)
    }

    fn sprite_collides(&self, sprite: u8, group: i32) -> bool {
        self.colliding.contains(&(sprite, group))
    }

    fn sprite_attribute(&self, sprite: u8, attr: SpriteAttr) -> f32 {
        self.attributes
            .get(&(sprite, attr.name()))
            .copied()
            .unwrap_or(0.0)
    }

    fn set_sprite_position(&mut self, sprite: u8, axis: Axis, value: f32) {
        let attr = match axis {
            Axis::X => SpriteAttr::X,
            Axis::Y => SpriteAttr::Y,
        };
        self.attributes.insert((sprite, attr.name()), value);
    }

    fn has_font(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case("square")
    }
}

struct Machine {
    cpu: Cpu,
    image: ProgramImage,
    gcp: Gcp,
    host: TestHost,
}

impl Machine {
    fn new(image: ProgramImage) -> Self {
        Self {
            cpu: Cpu::default(),
            image,
            gcp: Gcp::new(),
            host: TestHost::default(),
        }
    }

    /// One module named `Init`.
    fn with_source(source: &str) -> Self {
        let code = assemble_module(source).expect("assembly failed");
        let module = Module::new("Init", code).expect("module failed");
        Self::new(ProgramImage::new(vec![module]))
    }

    fn with_program(source: &str) -> Self {
        Self::new(assemble_program(source).expect("assembly failed"))
    }

    fn run(&mut self) -> RunOutcome {
        self.cpu
            .execute(&mut self.image, &mut self.gcp, &mut self.host)
    }

    fn run_from(&mut self, addr: CodeAddr) -> RunOutcome {
        self.cpu
            .execute_from(addr, &mut self.image, &mut self.gcp, &mut self.host)
    }

    fn reg(&self, index: u16) -> Word {
        self.cpu.register(index).expect("register out of range")
    }

    fn halted_with(&self) -> &VMError {
        &self.cpu.error().expect("cpu did not halt").error
    }
}

fn run(source: &str) -> Machine {
    let mut machine = Machine::with_source(source);
    assert_eq!(machine.run(), RunOutcome::Stopped, "program did not stop");
    machine
}

fn run_and_halt(source: &str) -> Machine {
    let mut machine = Machine::with_source(source);
    let outcome = machine.run();
    assert!(matches!(outcome, RunOutcome::Halted(_)), "{outcome:?}");
    machine
}

// ==================== Power-on state ====================

#[test]
fn registers_start_zeroed_with_signed_pointer() {
    let cpu = Cpu::default();
    for index in 0..10 {
        assert_eq!(cpu.register(index), Some(Word::Unsigned16(0)));
    }
    assert_eq!(cpu.register(10), Some(Word::Signed16(0)));
    assert_eq!(cpu.register(11), Some(Word::Signed16(0)));
    assert_eq!(cpu.register(12), None);
    assert_eq!(cpu.pc(), CodeAddr::start(0));
}

#[test]
fn empty_module_stops_immediately() {
    let machine = run("");
    assert_eq!(machine.cpu.pc(), CodeAddr::start(0));
}

// ==================== Arithmetic ====================

#[test]
fn add_and_sub_unsigned() {
    let machine = run("LDI R0, 10\nADD R0, 5\nSUB R0, 3u");
    assert_eq!(machine.reg(0), Word::Unsigned16(12));
}

#[test]
fn add_reads_register_operand() {
    let machine = run("LDI R0, 7\nLDI R1, 8\nADD R0, R1");
    assert_eq!(machine.reg(0), Word::Unsigned16(15));
}

#[test]
fn unsigned_add_wraps_and_sets_carry() {
    let machine = run("LDI R0, 65535\nADD R0, 1");
    assert_eq!(machine.reg(0), Word::Unsigned16(0));
    assert!(machine.cpu.flags().carry);
}

#[test]
fn signed_sub_sets_negative() {
    let machine = run("LDI R0, 2s\nSUB R0, 5s");
    assert_eq!(machine.reg(0), Word::Signed16(-3));
    assert!(machine.cpu.flags().negative);
    assert!(!machine.cpu.flags().overflow);
}

#[test]
fn signed_add_overflow_wraps() {
    let machine = run("LDI R0, 32767s\nADD R0, 1s");
    assert_eq!(machine.reg(0), Word::Signed16(i16::MIN));
    assert!(machine.cpu.flags().overflow);
}

#[test]
fn float_mul() {
    let machine = run("LDI R0, 1.5\nMUL R0, 2.0");
    assert_eq!(machine.reg(0), Word::from_f32(3.0));
}

#[test]
fn inc_and_dec() {
    let machine = run("LDI R0, 9\nINC R0\nINC R0\nLDI R1, 0\nDEC R1");
    assert_eq!(machine.reg(0), Word::Unsigned16(11));
    assert_eq!(machine.reg(1), Word::Unsigned16(u16::MAX));
    assert!(machine.cpu.flags().carry);
}

#[test]
fn sin_and_cos_produce_floats() {
    let machine = run("LDI R1, 0.0\nSIN R0, R1\nCOS R2, R1");
    assert_eq!(machine.reg(0), Word::from_f32(0.0));
    assert_eq!(machine.reg(2), Word::from_f32(1.0));
}

#[test]
fn rand_stays_within_bound_and_variant() {
    let machine = run("RAND R0, 10\nRAND R1, -4s\nRAND R2, 1.0");
    assert!(matches!(machine.reg(0), Word::Unsigned16(v) if v <= 10));
    assert!(matches!(machine.reg(1), Word::Signed16(v) if (-4..=0).contains(&v)));
    let f = machine.reg(2).to_f32();
    assert!((0.0..=1.0).contains(&f), "{f}");
}

#[test]
fn rand_is_reproducible_for_a_seed() {
    let a = run("RAND R0, 60000\nRAND R1, 60000");
    let b = run("RAND R0, 60000\nRAND R1, 60000");
    assert_eq!(a.reg(0), b.reg(0));
    assert_eq!(a.reg(1), b.reg(1));
}

// ==================== Comparison ====================

#[test]
fn signed_compare_and_jump_less() {
    let machine = run(
        "LDI R0, -5s
CMP R0, 3s
JL Less
LDI R1, 1
RET
Less:
LDI R1, 2",
    );
    assert_eq!(machine.reg(1), Word::Unsigned16(2));
}

#[test]
fn unsigned_compare_uses_carry() {
    let machine = run(
        "LDI R0, 3
CMP R0, 65000
JL Less
LDI R1, 1
RET
Less:
LDI R1, 2",
    );
    assert_eq!(machine.reg(1), Word::Unsigned16(2));
    assert!(machine.cpu.flags().carry);
}

#[test]
fn jump_greater_and_equal() {
    let machine = run(
        "LDI R0, 7
CMP R0, 7
JE Equal
LDI R1, 1
Equal:
CMP R0, 2
JG Greater
LDI R2, 1
Greater:
CMP R0, 9
JG Wrong
LDI R3, 3
Wrong:",
    );
    assert_eq!(machine.reg(1), Word::Unsigned16(0));
    assert_eq!(machine.reg(2), Word::Unsigned16(0));
    assert_eq!(machine.reg(3), Word::Unsigned16(3));
}

#[test]
fn compare_overwrites_every_flag() {
    let machine = run("LDI R0, 65535\nADD R0, 1\nLDI R1, 1.0\nCMP R1, 2.0");
    let flags = machine.cpu.flags();
    assert!(!flags.carry, "carry from ADD survived CMP");
    assert!(flags.negative);
    assert!(!flags.zero);
}

#[test]
fn compare_mismatched_variants_halts() {
    let machine = run_and_halt("LDI R0, 1s\nCMP R0, 1u");
    assert!(matches!(
        machine.halted_with(),
        VMError::InvalidComparison { .. }
    ));
}

#[test]
fn compare_key_register_asks_host() {
    let mut machine = Machine::with_source(
        "CMP R8, 32
JE Held
LDI R0, 1
RET
Held:
LDI R0, 2",
    );
    machine.host.keys.insert(32);
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::Unsigned16(2));
}

#[test]
fn loading_key_register_releases_held_key() {
    let mut machine = Machine::with_source("LDI R8, 0");
    machine.host.keys.insert(65);
    machine
        .cpu
        .set_input(InputRegister::Key, Word::Unsigned16(65));
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.host.released, vec![65]);
    assert!(!machine.host.keys.contains(&65));
    assert_eq!(machine.reg(8), Word::Unsigned16(0));
}

// ==================== Error Cases ====================

#[test]
fn division_by_zero_halts_without_panicking() {
    let machine = run_and_halt("LDI R0, 4\nDIV R0, 0");
    assert!(matches!(
        machine.halted_with(),
        VMError::InvalidArithmetic { op: "DIV", .. }
    ));
    assert_eq!(machine.reg(0), Word::Unsigned16(4));
    assert_eq!(machine.cpu.error().map(|e| e.at), Some(CodeAddr::new(0, 1)));
}

#[test]
fn modulo_by_zero_halts() {
    let machine = run_and_halt("LDI R0, 4s\nMOD R0, 0s");
    assert!(matches!(
        machine.halted_with(),
        VMError::InvalidArithmetic { op: "MOD", .. }
    ));
}

#[test]
fn mismatched_arithmetic_halts() {
    let machine = run_and_halt("LDI R0, 1u\nADD R0, 1.0");
    assert!(matches!(
        machine.halted_with(),
        VMError::InvalidArithmetic { .. }
    ));
}

#[test]
fn arithmetic_on_input_register_is_rejected() {
    let machine = run_and_halt("ADD R8, 1");
    assert_eq!(machine.halted_with(), &VMError::InvalidRegister { index: 8 });
}

#[test]
fn register_operand_past_r11_is_rejected() {
    let machine = run_and_halt("LDI R0, R12");
    assert_eq!(
        machine.halted_with(),
        &VMError::InvalidRegister { index: 12 }
    );
}

#[test]
fn unknown_jump_target_halts() {
    let machine = run_and_halt("J Nowhere");
    assert_eq!(
        machine.halted_with(),
        &VMError::InvalidCodeAddress("Nowhere".into())
    );
}

#[test]
fn halted_cpu_does_nothing_until_cleared() {
    let mut machine = run_and_halt("DIV R0, 0\nLDI R1, 1");
    assert!(matches!(machine.run(), RunOutcome::Halted(_)));
    assert!(matches!(
        machine.run_from(CodeAddr::new(0, 1)),
        RunOutcome::Halted(_)
    ));
    assert_eq!(machine.reg(1), Word::Unsigned16(0));

    machine.cpu.clear_error();
    machine.cpu.set_pc(CodeAddr::new(0, 1));
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(1), Word::Unsigned16(1));
}

#[test]
fn error_description_names_kind_and_location() {
    let machine = run_and_halt("NOP\nSPRX S300, 1");
    let text = machine
        .cpu
        .error()
        .unwrap()
        .describe(&machine.image.code);
    assert_eq!(
        text,
        "InvalidSpriteIndex: invalid sprite index 300 at Init + 0x1"
    );
}

// ==================== Memory ====================

#[test]
fn load_and_store() {
    let mut machine = Machine::with_program(
        "[ data Data 4 ]
1 2s 3.5 `A`
[ code Init ]
LD R0, Data + 2
ST Data + 3, R0
LDI R1, 9
ST Data, R1",
    );
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::from_f32(3.5));
    let block = machine.image.memory.block("Data").unwrap();
    assert_eq!(block[0], Word::Unsigned16(9));
    assert_eq!(block[3], Word::from_f32(3.5));
}

#[test]
fn load_past_block_end_halts() {
    let mut machine = Machine::with_program("[ data Data 2 ]\n[ code Init ]\nLD R0, Data + 2");
    assert!(matches!(machine.run(), RunOutcome::Halted(_)));
    assert_eq!(
        machine.halted_with(),
        &VMError::InvalidMemoryAddress {
            block: "Data".into(),
            offset: 2
        }
    );
}

#[test]
fn store_to_unknown_block_halts() {
    let machine = run_and_halt("ST Missing, 1");
    assert!(matches!(
        machine.halted_with(),
        VMError::InvalidMemoryAddress { .. }
    ));
}

// ==================== Function Calls ====================

#[test]
fn nested_calls_return_in_order() {
    let machine = run(
        "CALL First
LDI R3, 3
RET
First:
LDI R0, 1
CALL Second
RET
Second:
LDI R1, 2
CALL Third
RET
Third:
LDI R2, 2
ADD R2, R1
RET",
    );
    assert_eq!(machine.reg(0), Word::Unsigned16(1));
    assert_eq!(machine.reg(1), Word::Unsigned16(2));
    assert_eq!(machine.reg(2), Word::Unsigned16(4));
    assert_eq!(machine.reg(3), Word::Unsigned16(3));
    assert!(machine.cpu.stack().is_empty());
}

#[test]
fn call_pushes_typed_return_address() {
    let mut machine = Machine::with_source("NOP\nCALL Sub\nSub:\nBRKPT");
    assert_eq!(machine.run(), RunOutcome::Breakpoint);
    assert_eq!(
        machine.cpu.stack(),
        &[StackEntry::Return(CodeAddr::new(0, 2))]
    );
    assert_eq!(
        machine.cpu.stack()[0].describe(&machine.image.code),
        "Init + 0x2"
    );
}

#[test]
fn ret_on_pushed_value_halts() {
    let machine = run_and_halt("PUSH 5\nRET");
    assert_eq!(
        machine.halted_with(),
        &VMError::InvalidCodeAddress("5u".into())
    );
}

#[test]
fn call_across_modules() {
    let mut machine = Machine::with_program(
        "[ code Init ]
CALL Lib.Double
[ code Update ]
[ code Lib ]
Double:
LDI R0, 21
MUL R0, 2
RET",
    );
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::Unsigned16(42));
}

#[test]
fn math_module_routines() {
    let machine = run(
        "LDI R0, -7s
CALL Math.Abs
LDI R3, R0
LDI R0, 4
LDI R1, 9
CALL Math.Max
LDI R4, R0
LDI R0, 15
LDI R1, 0
LDI R2, 10
CALL Math.Clamp",
    );
    assert_eq!(machine.reg(3), Word::Signed16(7));
    assert_eq!(machine.reg(4), Word::Unsigned16(9));
    assert_eq!(machine.reg(0), Word::Unsigned16(10));
}

#[test]
fn math_module_is_addressable_by_index() {
    let mut machine = Machine::with_source("");
    let min = machine
        .image
        .code
        .module(MATH_MODULE_INDEX)
        .and_then(|m| m.label("Min"))
        .unwrap();
    machine.cpu.registers.set(0, Word::Unsigned16(8)).unwrap();
    machine.cpu.registers.set(1, Word::Unsigned16(3)).unwrap();
    assert_eq!(
        machine.run_from(CodeAddr::new(MATH_MODULE_INDEX, min)),
        RunOutcome::Stopped
    );
    assert_eq!(machine.reg(0), Word::Unsigned16(3));
}

// ==================== Control Flow ====================

#[test]
fn loop_counts_down() {
    let machine = run(
        "LDI R0, 5
LDI R1, 0
Loop:
ADD R1, 2
DEC R0
JNE Loop",
    );
    assert_eq!(machine.reg(1), Word::Unsigned16(10));
}

#[test]
fn breakpoint_pauses_and_resumes() {
    let mut machine = Machine::with_source("LDI R0, 1\nBRKPT\nLDI R0, 2");
    assert_eq!(machine.run(), RunOutcome::Breakpoint);
    assert_eq!(machine.reg(0), Word::Unsigned16(1));
    assert_eq!(machine.cpu.pc(), CodeAddr::new(0, 2));
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::Unsigned16(2));
}

#[test]
fn budget_stops_endless_loop() {
    let mut machine = Machine::with_source("Loop:\nINC R0\nJ Loop");
    machine.cpu.set_budget(Some(10));
    assert_eq!(machine.run(), RunOutcome::BudgetExhausted);
    // Three full turns of tag, INC, J plus the tag of the fourth.
    assert_eq!(machine.reg(0), Word::Unsigned16(3));
    assert_eq!(machine.cpu.pc(), CodeAddr::new(0, 1));
    assert!(machine.cpu.error().is_none());
}

#[test]
fn step_executes_one_instruction() {
    let mut machine = Machine::with_source("LDI R0, 1\nJ End\nLDI R0, 2\nEnd:");
    let step = |m: &mut Machine| m.cpu.step(&mut m.image, &mut m.gcp, &mut m.host);
    assert_eq!(step(&mut machine), Ok(ExecuteResult::NextInstruction));
    assert_eq!(step(&mut machine), Ok(ExecuteResult::Jumped));
    assert_eq!(machine.cpu.pc(), CodeAddr::new(0, 3));
    assert_eq!(step(&mut machine), Ok(ExecuteResult::NextInstruction));
    assert_eq!(step(&mut machine), Ok(ExecuteResult::Stop));
}

#[test]
fn reset_clears_run_state_but_keeps_input() {
    let mut machine = Machine::with_source("LDI R0, 3\nPUSH 1\nCALLTM Later, 1.0\nBRKPT\nLater:");
    machine
        .cpu
        .set_input(InputRegister::PointerX, Word::Signed16(-4));
    assert_eq!(machine.run(), RunOutcome::Breakpoint);
    assert_eq!(machine.cpu.pending_events().len(), 1);

    machine.cpu.reset();
    assert_eq!(machine.reg(0), Word::Unsigned16(0));
    assert!(machine.cpu.stack().is_empty());
    assert!(machine.cpu.pending_events().is_empty());
    assert_eq!(machine.cpu.pc(), CodeAddr::default());
    assert_eq!(machine.reg(10), Word::Signed16(-4));
}

// ==================== Timers ====================

#[test]
fn calltm_schedules_resolved_address() {
    let mut machine = Machine::with_source("CALLTM Fire, 0.5\nRET\nFire:\nLDI R0, 7");
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(
        machine.cpu.pending_events(),
        &[TimedEvent {
            countdown_ms: 500,
            addr: CodeAddr::new(0, 2)
        }]
    );

    let mut fired = Vec::new();
    for _ in 0..40 {
        fired.extend(machine.cpu.advance_time(16));
    }
    assert_eq!(fired, vec![CodeAddr::new(0, 2)]);
    assert!(machine.cpu.pending_events().is_empty());

    assert_eq!(machine.run_from(fired[0]), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::Unsigned16(7));
}

#[test]
fn calltm_with_unknown_target_halts() {
    let machine = run_and_halt("CALLTM Nowhere, 1.0");
    assert!(matches!(
        machine.halted_with(),
        VMError::InvalidCodeAddress(_)
    ));
    assert!(machine.cpu.pending_events().is_empty());
}

#[test]
fn time_reports_elapsed_seconds() {
    let mut machine = Machine::with_source("TIME R0");
    machine.cpu.advance_time(500);
    machine.cpu.advance_time(500);
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::from_f32(1.0));
}

// ==================== Queries ====================

#[test]
fn display_size_queries() {
    let machine = run("LDRESX R0\nLDRESY R9");
    assert_eq!(machine.reg(0), Word::Unsigned16(320));
    assert_eq!(machine.reg(9), Word::Unsigned16(200));
}

#[test]
fn sprite_attribute_query() {
    let mut machine = Machine::with_source("LDSPR R0, S3, x\nLDI R1, 5\nLDSPR R1, S3, colour");
    machine.host.attributes.insert((3, "x"), 12.5);
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::from_f32(12.5));
    assert_eq!(machine.reg(1), Word::Unsigned16(5));
}

#[test]
fn sprite_position_reaches_host_before_the_frame() {
    let machine = run("SPRX S3, 40\nLDSPR R0, S3, x\nSPRY S3, 7\nLDSPR R1, S3, y");
    assert_eq!(machine.reg(0), Word::from_f32(40.0));
    assert_eq!(machine.reg(1), Word::from_f32(7.0));
    assert_eq!(machine.gcp.len(), 2);
}

// ==================== Graphics ====================

#[test]
fn rect_uses_palette_colour() {
    let machine = run("LDI R0, 1\nLDI R1, 2\nLDI R2, 30\nLDI R3, 40\nLDI R4, 1\nRECT\nLDI R4, 99\nRECT");
    let palette = &machine.image.resources.palette;
    assert_eq!(
        machine.gcp.pending(),
        &[GcpCmd::Rect {
            x: 1.0,
            y: 2.0,
            width: 30.0,
            height: 40.0,
            color: palette[1]
        }]
    );
}

#[test]
fn sprite_commands_keep_program_order() {
    let machine = run(
        "SPRX S1, 10
LDI R0, 2
SPRY R0, 20.5
SPRVIS S1, 0
SPRWRP S1, 1
SPRANM S1, 0, 3
SPRHLT S1",
    );
    assert_eq!(
        machine.gcp.pending(),
        &[
            GcpCmd::SpriteX {
                sprite: 1,
                value: 10.0
            },
            GcpCmd::SpriteY {
                sprite: 2,
                value: 20.5
            },
            GcpCmd::SpriteVisible {
                sprite: 1,
                visible: false
            },
            GcpCmd::SpriteWrap {
                sprite: 1,
                wrap: true
            },
            GcpCmd::SpriteAnimate {
                sprite: 1,
                from: 0,
                to: 3
            },
            GcpCmd::SpriteHalt { sprite: 1 },
        ]
    );
}

#[test]
fn sprite_index_out_of_range_halts_without_enqueuing() {
    let machine = run_and_halt("SPRX S300, 5");
    assert_eq!(machine.halted_with(), &VMError::InvalidSpriteIndex(300));
    assert!(machine.gcp.is_empty());
}

#[test]
fn sprite_index_from_high_register_is_rejected() {
    let machine = run_and_halt("SPRX R9, 5");
    assert_eq!(machine.halted_with(), &VMError::InvalidSpriteIndex(9));
}

#[test]
fn sprset_binds_image_group() {
    let mut machine = Machine::with_program(
        "[ images Ship 4 16x16 ]
[ code Init ]
SPRSET S0, Ship
SPRSET S1, Rock",
    );
    assert!(matches!(machine.run(), RunOutcome::Halted(_)));
    assert_eq!(machine.halted_with(), &VMError::InvalidImageGroup("Rock".into()));
    let mut ship = ImageGroup::new("Ship", 4);
    ship.width = 16;
    ship.height = 16;
    assert_eq!(
        machine.gcp.pending(),
        &[GcpCmd::SpriteSet {
            sprite: 0,
            group: ship
        }]
    );
}

#[test]
fn sprite_collision_sets_zero() {
    let mut machine = Machine::with_source("SPRCOL S2, 1\nJE Hit\nRET\nHit:\nLDI R0, 1");
    machine.host.colliding.insert((2, 1));
    assert_eq!(machine.run(), RunOutcome::Stopped);
    assert_eq!(machine.reg(0), Word::Unsigned16(1));
}

#[test]
fn layer_commands() {
    let machine = run("LYRRES L2, 160x100\nLDI R0, 7\nLYRVIS R0, 0\nSPRLYR S4, L1");
    assert_eq!(
        machine.gcp.pending(),
        &[
            GcpCmd::LayerResolution {
                layer: 2,
                width: 160,
                height: 100
            },
            GcpCmd::LayerVisible {
                layer: 7,
                visible: false
            },
            GcpCmd::SpriteLayer {
                sprite: 4,
                layer: 1
            },
        ]
    );
}

#[test]
fn layer_index_out_of_range_halts() {
    let machine = run_and_halt("LYRVIS L8, 1");
    assert_eq!(machine.halted_with(), &VMError::InvalidLayerIndex(8));
}

#[test]
fn bad_resolution_halts() {
    let machine = run_and_halt("LYRRES L0, 0x10");
    assert_eq!(
        machine.halted_with(),
        &VMError::InvalidResolution("0x10".into())
    );
}

// ==================== Text ====================

#[test]
fn text_commands() {
    let mut machine = Machine::with_program(
        "[ data Msg 4 ]
`H` `i` 0 0
[ data Num 1 ]
42
[ code Init ]
FNTSET Square, 8
LDI R0, 4
LDI R1, 8
LDI R2, 3
TXTVAL -2s
TXTMEM Msg
TXTMEM Num",
    );
    assert_eq!(machine.run(), RunOutcome::Stopped);
    let text = |t: &str| GcpCmd::Text {
        text: t.into(),
        x: 4.0,
        y: 8.0,
        color_index: 3,
    };
    assert_eq!(
        machine.gcp.pending(),
        &[
            GcpCmd::FontSet {
                name: "square".into(),
                size: 8.0
            },
            text("-2"),
            text("Hi"),
            text("42"),
        ]
    );
}

#[test]
fn unknown_font_halts() {
    let machine = run_and_halt("FNTSET Comic, 12");
    assert_eq!(machine.halted_with(), &VMError::UnknownFont("Comic".into()));
}
