//! `stop`/`stopped` and `.runandhide`
//!
//! A `stopped` scope is `mark result mask %stopped_push`, with the operand's
//! `exec` pushed above it so access errors raised by `exec` itself are caught
//! by this same scope. `stop` finds the nearest scope whose mask shares a bit
//! with its own, unwinds to it and leaves the result on the operand stack;
//! normal completion reaches `%stopped_push`, which leaves the default result.

use super::control::EXEC;
use super::unmatched_exit;
use crate::interpreter::errors::PsError;
use crate::interpreter::scope;
use crate::interpreter::types::{
    Attrs, Cleanup, Entry, Obj, OpResult, Operator, ScopeKind, Signal, Value,
};
use crate::interpreter::vm::VM;

pub const STOP: Operator = Operator::new("stop", zstop);
pub const ZSTOP: Operator = Operator::new(".stop", zzstop);
pub const STOPPED: Operator = Operator::new("stopped", zstopped);
pub const ZSTOPPED: Operator = Operator::new(".stopped", zzstopped);
pub const INSTOPPED: Operator = Operator::new(".instopped", zinstopped);
pub const RUNANDHIDE: Operator = Operator::new(".runandhide", zrunandhide);

pub const OPS: &[Operator] = &[STOP, ZSTOP, STOPPED, ZSTOPPED, INSTOPPED, RUNANDHIDE];

const STOPPED_PUSH: Operator = Operator::new("%stopped_push", stopped_push);
const END_RUNANDHIDE: Operator = Operator::new("%end_runandhide", end_runandhide);
const ERR_END_RUNANDHIDE: Cleanup = Cleanup::new("%err_end_runandhide", err_end_runandhide);

/* ===================== stop ===================== */

/// `- stop -`
fn zstop(vm: &mut VM) -> OpResult {
    match scope::count_to_stopped(&vm.estack, 1) {
        Some(count) => {
            vm.ostack.room(1)?;
            scope::unwind(vm, count)?;
            vm.ostack.push(Obj::bool(true))?;
            Ok(Signal::Done)
        }
        None => unmatched_exit(vm, STOP),
    }
}

/// `<result> <mask> .stop -`
fn zzstop(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let mask = vm.ostack.top(0)?.as_int()?;
    let result = vm.ostack.top(1)?.clone();
    vm.ostack.pop_n(2)?;
    match scope::count_to_stopped(&vm.estack, mask) {
        Some(count) => {
            scope::unwind(vm, count)?;
            vm.ostack.push(result)?;
            Ok(Signal::Done)
        }
        None => unmatched_exit(vm, ZSTOP),
    }
}

/* ===================== stopped ===================== */

fn push_stopped(vm: &mut VM, result: Obj, mask: i64) -> Result<(), PsError> {
    vm.estack.check(5)?;
    scope::push_scope(
        vm,
        ScopeKind::Stopped,
        Cleanup::NONE,
        vec![result, Obj::int(mask)],
    )?;
    vm.estack.push(Entry::Step(STOPPED_PUSH))?;
    vm.estack.push(Entry::Step(EXEC))?;
    Ok(())
}

/// `<obj> stopped <bool>`
fn zstopped(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    push_stopped(vm, Obj::bool(false), 1)?;
    Ok(Signal::Suspend)
}

/// `<obj> <result> <mask> .stopped <result>`
fn zzstopped(vm: &mut VM) -> OpResult {
    vm.ostack.check(3)?;
    let mask = vm.ostack.top(0)?.as_int()?;
    let result = vm.ostack.top(1)?.clone();
    push_stopped(vm, result, mask)?;
    vm.ostack.pop_n(2)?;
    Ok(Signal::Suspend)
}

/// Normal completion: payload from the top is mask, result, mark
fn stopped_push(vm: &mut VM) -> OpResult {
    let result = vm.estack.value(1)?.clone();
    vm.ostack.push(result)?;
    vm.estack.pop_n(3);
    Ok(Signal::Done)
}

/// `<mask> .instopped false | <result> true`
fn zinstopped(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let mask = vm.ostack.top(0)?.as_int()?;
    match scope::count_to_stopped(&vm.estack, mask) {
        Some(count) => {
            let result = vm.estack.value(count - 2)?.clone();
            vm.ostack.room(1)?;
            vm.ostack.set(0, result)?;
            vm.ostack.push(Obj::bool(true))?;
        }
        None => vm.ostack.set(0, Obj::bool(false))?,
    }
    Ok(Signal::Done)
}

/* ===================== runandhide ===================== */

/// `<array> <obj> .runandhide -`
///
/// Runs `obj` with `array` moved onto the exec stack with every attribute
/// cleared, so `execstack` snapshots cannot read it. The array comes back
/// with its original attributes whether `obj` finishes normally or is
/// unwound.
fn zrunandhide(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let obj = vm.ostack.top(0)?.clone();
    let hidden = vm.ostack.top(1)?.clone();
    if !matches!(hidden.value, Value::Array(_)) {
        return Err(PsError::TypeCheck);
    }
    if !obj.attrs.executable {
        return Ok(Signal::Done);
    }
    vm.estack.check(5)?;
    let attrs = hidden.attrs;
    scope::push_scope(
        vm,
        ScopeKind::Other,
        ERR_END_RUNANDHIDE,
        vec![Obj::int(attrs.to_bits()), hidden.with_attrs(Attrs::HIDDEN)],
    )?;
    vm.estack.push(Entry::Step(END_RUNANDHIDE))?;
    vm.estack.push(Entry::Procedure(obj))?;
    vm.ostack.pop_n(2)?;
    Ok(Signal::Suspend)
}

fn restore_hidden(vm: &mut VM, attrs: &Obj, hidden: &Obj) -> Result<(), PsError> {
    let bits = attrs.as_int()?;
    let attrs = Attrs::from_bits(bits)
        .ok_or_else(|| PsError::Unknown(format!("bad saved attributes {}", bits)))?;
    vm.ostack.push(hidden.clone().with_attrs(attrs))
}

/// Normal completion: payload from the top is the hidden array, its
/// attributes, then the mark, which is left to pop on its own
fn end_runandhide(vm: &mut VM) -> OpResult {
    let hidden = vm.estack.value(0)?.clone();
    let attrs = vm.estack.value(1)?.clone();
    restore_hidden(vm, &attrs, &hidden)?;
    vm.estack.pop_n(2);
    Ok(Signal::Done)
}

fn err_end_runandhide(vm: &mut VM, scope: &[Entry]) -> Result<(), PsError> {
    let (Some(attrs), Some(hidden)) = (
        scope.first().and_then(Entry::as_value),
        scope.get(1).and_then(Entry::as_value),
    ) else {
        return Err(PsError::Unknown("runandhide scope lost its payload".to_string()));
    };
    restore_hidden(vm, attrs, hidden)
}
