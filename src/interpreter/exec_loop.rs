//! Core execution loop
//!
//! This module contains the step() function - the heart of the interpreter.
//! Each step pops the top exec stack entry and acts on it; operators that
//! need to run more code push it and return, so the host stack never grows
//! with the program.
//!
//! ## Function Organization
//! 1. run_until_done() - Top-level driver (calls step repeatedly, traps errors)
//! 2. step() - Dispatches one entry
//! 3. execute() - Executes one object (names, operators, procedures, literals)

use serde::Serialize;
use tracing::{debug, debug_span, trace, warn};

use super::errors::{ErrorRecord, PsError};
use super::input::Input;
use super::scope;
use super::types::{ArrayRef, Attrs, Entry, Obj, Operator, Signal, Value};
use super::vm::VM;

/// How a run of the driver ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The exec stack is empty
    Completed,
    /// Waiting for more input; call the driver again after feeding it
    NeedInput,
    /// The job ended through `.quit`
    Quit { code: i64 },
    /// The job was abandoned; the exec stack has been unwound
    Aborted(ErrorRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Done,
}

/* ===================== Public API ===================== */

/// Run the VM until the exec stack is empty, input runs out or the job ends
pub fn run_until_done(vm: &mut VM) -> Outcome {
    let span = debug_span!("job", id = %vm.job_id);
    let _guard = span.enter();
    loop {
        match step(vm) {
            Ok(Dispatch::Continue) => continue,
            Ok(Dispatch::Done) => {
                debug!("job completed");
                return Outcome::Completed;
            }
            Err(err) => {
                if let Some(outcome) = trap(vm, err) {
                    return outcome;
                }
            }
        }
    }
}

/// Execute one exec stack entry
pub fn step(vm: &mut VM) -> Result<Dispatch, PsError> {
    let Some(entry) = vm.estack.pop() else {
        return Ok(Dispatch::Done);
    };
    vm.stats.dispatched += 1;

    match entry {
        // Reaching a mark normally just ends its scope
        Entry::Mark(_) => Ok(Dispatch::Continue),
        Entry::Value(obj) => {
            let message = format!("payload {} reached the top of the exec stack", obj);
            vm.command = Some(obj);
            Err(PsError::Unknown(message))
        }
        Entry::Step(op) => {
            trace!(step = op.name, "continue");
            vm.stats.record_step(op.name);
            vm.command = Some(Obj::operator(op));
            call(vm, op)
        }
        Entry::Procedure(obj) => enter(vm, obj),
    }
}

/// Execute an object the way the interpreter does when it meets one
///
/// `deferred` is set for objects taken from a procedure body or an input
/// stream: executable arrays found there are data and go to the operand stack.
pub fn execute(vm: &mut VM, obj: Obj, deferred: bool) -> Result<Dispatch, PsError> {
    enum Action {
        Push,
        Enter,
        Scan(Input),
        Lookup(String),
        Call(Operator),
        Nothing,
    }

    vm.command = Some(obj.clone());
    let action = if !obj.attrs.executable {
        Action::Push
    } else {
        match &obj.value {
            Value::Array(_) if deferred => Action::Push,
            Value::Array(_) | Value::Input(_) => Action::Enter,
            Value::Str(bytes) => {
                Action::Scan(Input::from_source("%string", &String::from_utf8_lossy(bytes)))
            }
            Value::Name(name) => Action::Lookup(name.to_string()),
            Value::Operator(op) => Action::Call(*op),
            Value::Null => Action::Nothing,
            _ => Action::Push,
        }
    };

    match action {
        Action::Push => vm.ostack.push(obj)?,
        Action::Enter => {
            if !obj.attrs.can_execute() {
                return Err(PsError::InvalidAccess);
            }
            vm.estack.push(Entry::Procedure(obj))?;
            vm.check_input_cache();
        }
        Action::Scan(input) => {
            if !obj.attrs.can_execute() {
                return Err(PsError::InvalidAccess);
            }
            vm.push_input(input)?;
        }
        Action::Lookup(name) => {
            let found = vm.lookup(&name).ok_or(PsError::Undefined(name))?;
            if found.attrs.executable && matches!(found.value, Value::Name(_)) {
                // A name bound to a name: let the driver resolve it
                vm.estack.push(Entry::Procedure(found))?;
            } else {
                return execute(vm, found, false);
            }
        }
        Action::Call(op) => {
            trace!(op = op.name, "call");
            return call(vm, op);
        }
        Action::Nothing => {}
    }
    Ok(Dispatch::Continue)
}

/// Abandon the job: unwind the whole exec stack, running every cleanup
pub fn abort_job(vm: &mut VM) {
    while !vm.estack.is_empty() {
        let depth = vm.estack.len();
        if let Err(err) = scope::unwind(vm, depth) {
            warn!(error = %err, "cleanup failed during job abort");
        }
    }
    vm.clear_input_cache();
}

/* ===================== Dispatch ===================== */

fn call(vm: &mut VM, op: Operator) -> Result<Dispatch, PsError> {
    if (op.func)(vm)? == Signal::Suspend {
        vm.check_input_cache();
    }
    Ok(Dispatch::Continue)
}

fn enter(vm: &mut VM, obj: Obj) -> Result<Dispatch, PsError> {
    if obj.attrs.executable {
        if let Value::Array(body) = &obj.value {
            let body = body.clone();
            return enter_body(vm, body, obj.attrs);
        }
        if let Value::Input(input) = &obj.value {
            let input = input.clone();
            return enter_input(vm, input, obj);
        }
    }
    execute(vm, obj, false)
}

/// Run the next element of a procedure body, leaving the tail on the stack
fn enter_body(vm: &mut VM, body: ArrayRef, attrs: Attrs) -> Result<Dispatch, PsError> {
    let Some((first, rest)) = body.split_first() else {
        return Ok(Dispatch::Continue);
    };
    if !rest.is_empty() {
        vm.estack
            .push(Entry::Procedure(Obj::new(Value::Array(rest), attrs)))?;
    }
    execute(vm, first, true)
}

/// Read and run one token; the stream stays on the stack until it ends
fn enter_input(vm: &mut VM, input: Input, obj: Obj) -> Result<Dispatch, PsError> {
    match input.next_token() {
        Ok(Some(token)) => {
            vm.estack.push(Entry::Procedure(obj))?;
            execute(vm, token, true)
        }
        Ok(None) => {
            vm.clear_input_cache();
            Ok(Dispatch::Continue)
        }
        Err(PsError::NeedInput) => {
            vm.estack.push(Entry::Procedure(obj))?;
            Err(PsError::NeedInput)
        }
        Err(err) => {
            input.discard();
            vm.clear_input_cache();
            vm.command = Some(obj);
            Err(err)
        }
    }
}

/* ===================== Error Trap ===================== */

/// Decide what an error does to the job; `None` means keep running
fn trap(vm: &mut VM, err: PsError) -> Option<Outcome> {
    match err {
        PsError::NeedInput => {
            debug!("suspended for input");
            Some(Outcome::NeedInput)
        }
        PsError::Quit => {
            let (code, command) = take_quit_operands(vm);
            abort_job(vm);
            if code == PsError::InvalidExit.code() {
                let record = ErrorRecord::new(&PsError::InvalidExit, command.as_ref());
                warn!(command = ?record.command, "unmatched exit, job aborted");
                vm.last_error = Some(record.clone());
                Some(Outcome::Aborted(record))
            } else {
                debug!(code, "job quit");
                Some(Outcome::Quit { code })
            }
        }
        err => {
            let record = ErrorRecord::new(&err, vm.command.as_ref());
            vm.last_error = Some(record.clone());
            if vm.config.errors.is_catchable(&err) {
                if let Some(count) = scope::count_to_stopped(&vm.estack, 1) {
                    debug!(error = err.name(), "error caught by stopped");
                    if let Err(cleanup_err) = scope::unwind(vm, count) {
                        return trap(vm, cleanup_err);
                    }
                    if let Err(push_err) = vm.ostack.push(Obj::bool(true)) {
                        return trap(vm, push_err);
                    }
                    return None;
                }
            }
            warn!(error = err.name(), command = ?record.command, "job aborted");
            abort_job(vm);
            Some(Outcome::Aborted(record))
        }
    }
}

/// `<command> <code>` left on the operand stack by `.quit` and unmatched exits
fn take_quit_operands(vm: &mut VM) -> (i64, Option<Obj>) {
    let code = vm.ostack.top(0).ok().and_then(|obj| obj.as_int().ok());
    match code {
        Some(code) => {
            let _ = vm.ostack.pop();
            (code, vm.ostack.pop().ok())
        }
        None => (0, None),
    }
}
