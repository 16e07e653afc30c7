//! Built-in `Math` module.
//!
//! Routines take their arguments in `R0`..`R2` and return the result in `R0`.
//! They are reached with `CALL Math.<Name>` and always end in `RET`.
//!
//! | Routine | Arguments        | Result                    | Clobbers |
//! |---------|------------------|---------------------------|----------|
//! | `Abs`   | R0 (signed/float)| `abs(R0)`                 | R1       |
//! | `Min`   | R0, R1           | smaller of the two        |          |
//! | `Max`   | R0, R1           | larger of the two         |          |
//! | `Clamp` | R0, R1 lo, R2 hi | R0 limited to `[R1, R2]`  |          |

use crate::virtual_machine::assembler::assemble_module;
use crate::virtual_machine::program::{MATH_MODULE_NAME, Module};

const SOURCE: &str = "\
Abs:
LDI R1, R0
SUB R1, R0
SUB R1, R0
CMP R0, R1
JG AbsDone
LDI R0, R1
AbsDone:
RET
Min:
CMP R0, R1
JL MinDone
LDI R0, R1
MinDone:
RET
Max:
CMP R0, R1
JG MaxDone
LDI R0, R1
MaxDone:
RET
Clamp:
CMP R0, R1
JL ClampLow
CMP R0, R2
JG ClampHigh
RET
ClampLow:
LDI R0, R1
RET
ClampHigh:
LDI R0, R2
RET
";

/// Compiles the math module.
pub fn module() -> Module {
    assemble_module(SOURCE)
        .and_then(|code| Module::new(MATH_MODULE_NAME, code))
        .unwrap_or_else(|_| Module::empty(MATH_MODULE_NAME))
}
