//! Native operators
//!
//! Operators are grouped by concern, each module exporting an `OPS` table:
//!
//! - `control`: conditionals, loops, `exec`, `exit`
//! - `stopped`: `stop`/`stopped` and `.runandhide`
//! - `introspect`: exec stack snapshots, current input, job interrupts
//! - `stack`: operand stack, arithmetic, arrays and access control
//!
//! Colour operators live with the colour-space code. Internal continuations
//! (names starting with `%`) are not registered; they are only ever pushed
//! as `Step` entries.

use std::rc::Rc;

use super::colorspace;
use super::errors::PsError;
use super::types::{Obj, OpResult, Operator, Value};
use super::vm::VM;

pub mod control;
pub mod introspect;
pub mod stack;
pub mod stopped;

pub fn register(vm: &mut VM) {
    let tables: [&[Operator]; 5] = [
        control::OPS,
        stopped::OPS,
        introspect::OPS,
        stack::OPS,
        colorspace::ops::OPS,
    ];
    for table in tables {
        for op in table {
            vm.systemdict.insert(Rc::from(op.name), Obj::operator(*op));
        }
    }
    vm.systemdict.insert(Rc::from("true"), Obj::bool(true));
    vm.systemdict.insert(Rc::from("false"), Obj::bool(false));
    vm.systemdict.insert(Rc::from("null"), Obj::null());
}

/* ===================== Operand Checks ===================== */

/// Accept only executable arrays with execute access
pub fn check_proc(obj: &Obj) -> Result<(), PsError> {
    if !matches!(obj.value, Value::Array(_)) || !obj.attrs.executable {
        return Err(PsError::TypeCheck);
    }
    if !obj.attrs.can_execute() {
        return Err(PsError::InvalidAccess);
    }
    Ok(())
}

/// Composite objects without execute access cannot be executed
pub fn check_for_exec(obj: &Obj) -> Result<(), PsError> {
    if obj.uses_access() && !obj.attrs.can_execute() {
        return Err(PsError::InvalidAccess);
    }
    Ok(())
}

/// `exit` or `stop` with no scope to land in: end the job with `invalidexit`
///
/// Leaves `<operator> <code>` on the operand stack for the driver and
/// raises `Quit`.
pub fn unmatched_exit(vm: &mut VM, op: Operator) -> OpResult {
    vm.ostack.room(2)?;
    vm.ostack.push(Obj::operator(op))?;
    vm.ostack.push(Obj::int(PsError::InvalidExit.code()))?;
    Err(PsError::Quit)
}
