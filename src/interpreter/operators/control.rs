//! Control operators
//!
//! Loops open a `Loop` scope holding their state as payload and re-arm a
//! named continuation after every iteration:
//!
//! ```text
//! for:          mark  var  incr  limit  proc        %for_*_continue
//! .for_samples: mark  i  first  count  last  proc   %for_samples_continue
//! repeat:       mark  count  proc                   %repeat_continue
//! loop:         mark  proc                          %loop_continue
//! ```
//!
//! Each continuation either pushes itself back followed by the body, or pops
//! its whole scope when the loop is over.

use super::{check_for_exec, check_proc, unmatched_exit};
use crate::interpreter::errors::PsError;
use crate::interpreter::scope::{self, ScanResult};
use crate::interpreter::types::{Cleanup, Entry, Obj, OpResult, Operator, ScopeKind, Signal, Value};
use crate::interpreter::vm::VM;

pub const IF: Operator = Operator::new("if", zif);
pub const IFELSE: Operator = Operator::new("ifelse", zifelse);
pub const FOR: Operator = Operator::new("for", zfor);
pub const REPEAT: Operator = Operator::new("repeat", zrepeat);
pub const LOOP: Operator = Operator::new("loop", zloop);
pub const EXIT: Operator = Operator::new("exit", zexit);
pub const EXEC: Operator = Operator::new("exec", zexec);
pub const EXECN: Operator = Operator::new(".execn", zexecn);
pub const COND: Operator = Operator::new(".cond", zcond);
pub const FOR_SAMPLES: Operator = Operator::new(".for_samples", zfor_samples);

pub const OPS: &[Operator] = &[
    IF, IFELSE, FOR, REPEAT, LOOP, EXIT, EXEC, EXECN, COND, FOR_SAMPLES,
];

const FOR_POS_INT_CONTINUE: Operator = Operator::new("%for_pos_int_continue", for_pos_int_continue);
const FOR_NEG_INT_CONTINUE: Operator = Operator::new("%for_neg_int_continue", for_neg_int_continue);
const FOR_REAL_CONTINUE: Operator = Operator::new("%for_real_continue", for_real_continue);
const FOR_SAMPLES_CONTINUE: Operator =
    Operator::new("%for_samples_continue", for_samples_continue);
const REPEAT_CONTINUE: Operator = Operator::new("%repeat_continue", repeat_continue);
const LOOP_CONTINUE: Operator = Operator::new("%loop_continue", loop_continue);
const COND_CONTINUE: Operator = Operator::new("%cond_continue", cond_continue);

/* ===================== Conditionals ===================== */

/// `<bool> <proc> if -`
fn zif(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let proc = vm.ostack.top(0)?.clone();
    check_proc(&proc)?;
    let cond = vm.ostack.top(1)?.as_bool()?;
    if cond {
        vm.estack.check(1)?;
        vm.ostack.pop_n(2)?;
        vm.estack.push(Entry::Procedure(proc))?;
        return Ok(Signal::Suspend);
    }
    vm.ostack.pop_n(2)?;
    Ok(Signal::Done)
}

/// `<bool> <proc_true> <proc_false> ifelse -`
fn zifelse(vm: &mut VM) -> OpResult {
    vm.ostack.check(3)?;
    let on_false = vm.ostack.top(0)?.clone();
    let on_true = vm.ostack.top(1)?.clone();
    check_proc(&on_false)?;
    check_proc(&on_true)?;
    let cond = vm.ostack.top(2)?.as_bool()?;
    vm.estack.check(1)?;
    vm.ostack.pop_n(3)?;
    let chosen = if cond { on_true } else { on_false };
    vm.estack.push(Entry::Procedure(chosen))?;
    Ok(Signal::Suspend)
}

/// `[test0 body0 test1 body1 ...] .cond -`
///
/// Runs each test in turn; the body after the first test leaving `true` runs.
fn zcond(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let clauses = vm.ostack.top(0)?.clone();
    let arr = clauses.as_array()?.clone();
    if !clauses.attrs.can_read() {
        return Err(PsError::InvalidAccess);
    }
    if arr.len() % 2 != 0 {
        return Err(PsError::RangeCheck);
    }
    vm.ostack.pop()?;
    let Some(test) = arr.get(0) else {
        return Ok(Signal::Done);
    };
    vm.estack.check(3)?;
    vm.estack.push(Entry::Value(clauses))?;
    vm.estack.push(Entry::Step(COND_CONTINUE))?;
    vm.estack.push(Entry::Procedure(test))?;
    Ok(Signal::Suspend)
}

/// Clause list tail on top: run its body, or move on to the next test
fn cond_continue(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let flag = vm.ostack.top(0)?.as_bool()?;
    let clauses = vm.estack.value(0)?.clone();
    let arr = clauses.as_array()?.clone();
    vm.ostack.pop()?;

    if flag {
        let body = arr.get(1).ok_or(PsError::RangeCheck)?;
        vm.estack.pop();
        vm.estack.push(Entry::Procedure(body))?;
        return Ok(Signal::Suspend);
    }
    if arr.len() <= 2 {
        vm.estack.pop();
        return Ok(Signal::Done);
    }
    let rest = arr
        .subarray(2, arr.len() - 2)
        .ok_or(PsError::RangeCheck)?;
    let test = rest.get(0).ok_or(PsError::RangeCheck)?;
    vm.estack
        .set_value(0, Obj::new(Value::Array(rest), clauses.attrs))?;
    vm.estack.check(2)?;
    vm.estack.push(Entry::Step(COND_CONTINUE))?;
    vm.estack.push(Entry::Procedure(test))?;
    Ok(Signal::Suspend)
}

/* ===================== Loops ===================== */

/// Re-arm `cont` and run the body stored on top of the exec stack
fn next_iteration(vm: &mut VM, cont: Operator) -> OpResult {
    let proc = vm.estack.value(0)?.clone();
    vm.estack.check(2)?;
    vm.estack.push(Entry::Step(cont))?;
    vm.estack.push(Entry::Procedure(proc))?;
    Ok(Signal::Suspend)
}

/// `<init> <step> <limit> <proc> for -`
///
/// Integer `init` and `step` count with integers (a real limit is
/// truncated); anything else counts with reals. When both `init` and `step`
/// are zero the body never runs.
fn zfor(vm: &mut VM) -> OpResult {
    vm.ostack.check(4)?;
    let init = vm.ostack.top(3)?.clone();
    let incr = vm.ostack.top(2)?.clone();
    let limit = vm.ostack.top(1)?.clone();
    let proc = vm.ostack.top(0)?.clone();

    let start = init.as_number()?;
    let step = incr.as_number()?;
    let end = limit.as_number()?;
    if start == 0.0 && step == 0.0 {
        vm.ostack.pop_n(4)?;
        return Ok(Signal::Done);
    }
    check_proc(&proc)?;
    vm.estack.check(7)?;

    if let (Value::Int(i), Value::Int(s)) = (&init.value, &incr.value) {
        let (i, s) = (*i, *s);
        let limit = match limit.value {
            Value::Int(l) => l,
            _ => end.trunc() as i64,
        };
        scope::push_scope(
            vm,
            ScopeKind::Loop,
            Cleanup::NONE,
            vec![Obj::int(i), Obj::int(s), Obj::int(limit), proc],
        )?;
        vm.ostack.pop_n(4)?;
        return if s >= 0 {
            for_pos_int_continue(vm)
        } else {
            for_neg_int_continue(vm)
        };
    }

    scope::push_scope(
        vm,
        ScopeKind::Loop,
        Cleanup::NONE,
        vec![Obj::real(start), Obj::real(step), Obj::real(end), proc],
    )?;
    vm.ostack.pop_n(4)?;
    for_real_continue(vm)
}

/// Payload from the top: proc, limit, incr, var
fn for_int_continue(vm: &mut VM, positive: bool, cont: Operator) -> OpResult {
    let var = vm.estack.int(3)?;
    let limit = vm.estack.int(1)?;
    let done = if positive { var > limit } else { var < limit };
    if done {
        vm.estack.pop_n(5);
        return Ok(Signal::Done);
    }
    vm.ostack.push(Obj::int(var))?;
    let incr = vm.estack.int(2)?;
    match var.checked_add(incr) {
        Some(next) => vm.estack.set_value(3, Obj::int(next))?,
        // The next value is past any representable limit: this pass is the last
        None if positive => vm.estack.set_value(1, Obj::int(var - 1))?,
        None => vm.estack.set_value(1, Obj::int(var + 1))?,
    }
    next_iteration(vm, cont)
}

fn for_pos_int_continue(vm: &mut VM) -> OpResult {
    for_int_continue(vm, true, FOR_POS_INT_CONTINUE)
}

fn for_neg_int_continue(vm: &mut VM) -> OpResult {
    for_int_continue(vm, false, FOR_NEG_INT_CONTINUE)
}

fn for_real_continue(vm: &mut VM) -> OpResult {
    let var = vm.estack.value(3)?.as_number()?;
    let incr = vm.estack.value(2)?.as_number()?;
    let limit = vm.estack.value(1)?.as_number()?;
    let done = if incr >= 0.0 { var > limit } else { var < limit };
    if done {
        vm.estack.pop_n(5);
        return Ok(Signal::Done);
    }
    vm.ostack.push(Obj::real(var))?;
    vm.estack.set_value(3, Obj::real(var + incr))?;
    next_iteration(vm, FOR_REAL_CONTINUE)
}

/// `<first> <count> <last> <proc> .for_samples -`
///
/// Runs `proc` on `count + 1` evenly spaced values from `first` to `last`,
/// each computed as `((count - i) * first + i * last) / count` so both ends
/// come out exact. A zero count runs once with `first`.
fn zfor_samples(vm: &mut VM) -> OpResult {
    vm.ostack.check(4)?;
    let proc = vm.ostack.top(0)?.clone();
    let last = vm.ostack.top(1)?.as_number()?;
    let count = vm.ostack.top(2)?.as_int()?;
    let first = vm.ostack.top(3)?.as_number()?;
    check_proc(&proc)?;
    vm.estack.check(8)?;
    scope::push_scope(
        vm,
        ScopeKind::Loop,
        Cleanup::NONE,
        vec![
            Obj::int(0),
            Obj::real(first),
            Obj::int(count),
            Obj::real(last),
            proc,
        ],
    )?;
    vm.ostack.pop_n(4)?;
    for_samples_continue(vm)
}

/// Payload from the top: proc, last, count, first, i
fn for_samples_continue(vm: &mut VM) -> OpResult {
    let i = vm.estack.int(4)?;
    let count = vm.estack.int(2)?;
    if i > count {
        vm.estack.pop_n(6);
        return Ok(Signal::Done);
    }
    let first = vm.estack.value(3)?.as_number()?;
    let last = vm.estack.value(1)?.as_number()?;
    let sample = if count == 0 {
        first
    } else {
        ((count - i) as f64 * first + i as f64 * last) / count as f64
    };
    vm.ostack.push(Obj::real(sample))?;
    vm.estack.set_value(4, Obj::int(i + 1))?;
    next_iteration(vm, FOR_SAMPLES_CONTINUE)
}

/// `<count> <proc> repeat -`
fn zrepeat(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let proc = vm.ostack.top(0)?.clone();
    check_proc(&proc)?;
    let count = vm.ostack.top(1)?.as_int()?;
    if count < 0 {
        return Err(PsError::RangeCheck);
    }
    vm.estack.check(5)?;
    scope::push_scope(
        vm,
        ScopeKind::Loop,
        Cleanup::NONE,
        vec![Obj::int(count), proc],
    )?;
    vm.ostack.pop_n(2)?;
    repeat_continue(vm)
}

/// Payload from the top: proc, count
fn repeat_continue(vm: &mut VM) -> OpResult {
    let count = vm.estack.int(1)? - 1;
    if count < 0 {
        vm.estack.pop_n(3);
        return Ok(Signal::Done);
    }
    vm.estack.set_value(1, Obj::int(count))?;
    next_iteration(vm, REPEAT_CONTINUE)
}

/// `<proc> loop -`
fn zloop(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let proc = vm.ostack.top(0)?.clone();
    check_proc(&proc)?;
    vm.estack.check(4)?;
    scope::push_scope(vm, ScopeKind::Loop, Cleanup::NONE, vec![proc])?;
    vm.ostack.pop()?;
    loop_continue(vm)
}

fn loop_continue(vm: &mut VM) -> OpResult {
    next_iteration(vm, LOOP_CONTINUE)
}

/// `- exit -`
fn zexit(vm: &mut VM) -> OpResult {
    match scope::scan_and_unwind(vm, scope::select_loop)? {
        ScanResult::Handled => Ok(Signal::Done),
        ScanResult::Blocked(_) => Err(PsError::InvalidExit),
        ScanResult::Unmatched => unmatched_exit(vm, EXIT),
    }
}

/* ===================== Execution ===================== */

/// `<obj> exec -`
///
/// A literal operand is left where it is.
fn zexec(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let obj = vm.ostack.top(0)?.clone();
    check_for_exec(&obj)?;
    if !obj.attrs.executable {
        return Ok(Signal::Done);
    }
    vm.estack.check(1)?;
    vm.ostack.pop()?;
    vm.estack.push(Entry::Procedure(obj))?;
    Ok(Signal::Suspend)
}

/// `<obj1> ... <objn> <n> .execn -`
///
/// Runs obj1 first. Executable nulls are skipped.
fn zexecn(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let n = vm.ostack.top(0)?.as_int()?;
    let n = usize::try_from(n).map_err(|_| PsError::RangeCheck)?;
    vm.ostack.check(n + 1)?;
    vm.estack.check(n)?;

    let mut entries = Vec::with_capacity(n);
    for i in 0..n {
        let obj = vm.ostack.top(i + 1)?.clone();
        if obj.uses_access() && obj.attrs.executable && !obj.attrs.can_execute() {
            return Err(PsError::InvalidAccess);
        }
        if obj.attrs.executable && matches!(obj.value, Value::Null) {
            continue;
        }
        entries.push(Entry::Procedure(obj));
    }
    for entry in entries {
        vm.estack.push(entry)?;
    }
    vm.ostack.pop_n(n + 1)?;
    Ok(Signal::Suspend)
}
