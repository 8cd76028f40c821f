//! Exec stack introspection and job interrupts
//!
//! `execstack` only validates its operand; the copy is made by a pushed
//! continuation, after the driver has had a chance to bring cached state
//! (the current input) in line with the stack.

use crate::interpreter::errors::PsError;
use crate::interpreter::input::Input;
use crate::interpreter::types::{Entry, Obj, OpResult, Operator, Signal, Value};
use crate::interpreter::vm::VM;

pub const EXECSTACK: Operator = Operator::new("execstack", zexecstack);
pub const EXECSTACK2: Operator = Operator::new(".execstack", zexecstack2);
pub const COUNTEXECSTACK: Operator = Operator::new("countexecstack", zcountexecstack);
pub const COUNTEXECSTACK1: Operator = Operator::new(".countexecstack", zcountexecstack1);
pub const CURRENTFILE: Operator = Operator::new("currentfile", zcurrentfile);
pub const NEEDINPUT: Operator = Operator::new(".needinput", zneedinput);
pub const QUIT: Operator = Operator::new(".quit", zquit);

pub const OPS: &[Operator] = &[
    EXECSTACK,
    EXECSTACK2,
    COUNTEXECSTACK,
    COUNTEXECSTACK1,
    CURRENTFILE,
    NEEDINPUT,
    QUIT,
];

const EXECSTACK_CONTINUE: Operator = Operator::new("%execstack_continue", execstack_continue);
const EXECSTACK2_CONTINUE: Operator =
    Operator::new("%execstack2_continue", execstack2_continue);

/* ===================== Counting ===================== */

fn count_exec_stack(vm: &VM, include_marks: bool) -> usize {
    if include_marks {
        return vm.estack.len();
    }
    vm.estack.iter_from_top().filter(|e| !e.is_mark()).count()
}

/// `- countexecstack <int>`
fn zcountexecstack(vm: &mut VM) -> OpResult {
    let depth = count_exec_stack(vm, false);
    vm.ostack.push(Obj::int(depth as i64))?;
    Ok(Signal::Done)
}

/// `<include_marks> .countexecstack <int>`
fn zcountexecstack1(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let include_marks = vm.ostack.top(0)?.as_bool()?;
    let depth = count_exec_stack(vm, include_marks);
    vm.ostack.set(0, Obj::int(depth as i64))?;
    Ok(Signal::Done)
}

/* ===================== Snapshots ===================== */

/// `<array> execstack <subarray>`
fn zexecstack(vm: &mut VM) -> OpResult {
    push_execstack(vm, 0, false, EXECSTACK_CONTINUE)
}

/// `<array> <include_marks> .execstack <subarray>`
fn zexecstack2(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let include_marks = vm.ostack.top(0)?.as_bool()?;
    push_execstack(vm, 1, include_marks, EXECSTACK2_CONTINUE)
}

/// Validate the target array at operand `index` and defer the copy
fn push_execstack(vm: &mut VM, index: usize, include_marks: bool, cont: Operator) -> OpResult {
    vm.ostack.check(index + 1)?;
    let target = vm.ostack.top(index)?.clone();
    let arr = target.as_array()?;
    let depth = count_exec_stack(vm, include_marks);
    // Length is checked before write access
    if depth > arr.len() {
        return Err(PsError::RangeCheck);
    }
    if !target.attrs.can_write() {
        return Err(PsError::InvalidAccess);
    }
    let sub = arr.subarray(0, depth).ok_or(PsError::RangeCheck)?;
    vm.estack.check(1)?;
    vm.ostack
        .set(index, Obj::new(Value::Array(sub), target.attrs))?;
    vm.estack.push(Entry::Step(cont))?;
    Ok(Signal::Suspend)
}

fn execstack_continue(vm: &mut VM) -> OpResult {
    do_execstack(vm, 0, false)?;
    Ok(Signal::Done)
}

fn execstack2_continue(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let include_marks = vm.ostack.top(0)?.as_bool()?;
    do_execstack(vm, 1, include_marks)?;
    vm.ostack.pop()?;
    Ok(Signal::Done)
}

/// How an entry looks from PostScript
fn snapshot(entry: &Entry) -> Obj {
    match entry {
        Entry::Value(obj) | Entry::Procedure(obj) => obj.clone(),
        // Internal continuations come out as literal operators
        Entry::Step(op) => Obj::operator(*op),
        Entry::Mark(_) => Obj::exec_null(),
    }
}

/// Copy the exec stack, bottom first, into the array at operand `index`
fn do_execstack(vm: &mut VM, index: usize, include_marks: bool) -> Result<(), PsError> {
    vm.sync_input_cache();
    let target = vm.ostack.top(index)?.clone();
    let arr = target.as_array()?;
    let entries: Vec<Obj> = vm
        .estack
        .iter_from_top()
        .filter(|e| include_marks || !e.is_mark())
        .map(snapshot)
        .collect();
    if entries.len() > arr.len() {
        return Err(PsError::RangeCheck);
    }
    let depth = entries.len();
    for (i, obj) in entries.into_iter().enumerate() {
        arr.set(depth - 1 - i, obj);
    }
    let sub = arr.subarray(0, depth).ok_or(PsError::RangeCheck)?;
    vm.ostack
        .set(index, Obj::new(Value::Array(sub), target.attrs))?;
    Ok(())
}

/* ===================== Input & Interrupts ===================== */

/// `- currentfile <file>`
fn zcurrentfile(vm: &mut VM) -> OpResult {
    let input = vm.current_input().unwrap_or_else(Input::invalid);
    vm.ostack.push(Obj::literal(Value::Input(input)))?;
    Ok(Signal::Done)
}

/// `- .needinput -`
fn zneedinput(_vm: &mut VM) -> OpResult {
    Err(PsError::NeedInput)
}

/// `<obj> <code> .quit -`
fn zquit(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    vm.ostack.top(0)?.as_int()?;
    Err(PsError::Quit)
}
