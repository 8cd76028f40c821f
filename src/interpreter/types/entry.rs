//! Exec stack entries
//!
//! The continuation stack holds four kinds of entries:
//!
//! - `Value`: private payload of the construct below it
//! - `Procedure`: an executable object the driver enters
//! - `Step`: a named native continuation, consumed when dispatched
//! - `Mark`: a scope boundary carrying its kind and cleanup

use std::fmt;

use super::values::Obj;
use crate::interpreter::errors::PsError;
use crate::interpreter::vm::VM;

/// What an operator or continuation asks of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Work finished; pop the next entry
    Done,
    /// New entries were pushed; run them before anything below
    Suspend,
}

pub type OpResult = Result<Signal, PsError>;

pub type OpFn = fn(&mut VM) -> OpResult;

/// A native operator or continuation bound to its name
///
/// Names starting with `%` are internal continuations; they never appear in
/// `systemdict` and lose their executable bit when copied out by `execstack`.
#[derive(Clone, Copy)]
pub struct Operator {
    pub name: &'static str,
    pub func: OpFn,
}

impl Operator {
    pub const fn new(name: &'static str, func: OpFn) -> Self {
        Operator { name, func }
    }

    pub fn is_internal(&self) -> bool {
        self.name.starts_with('%')
    }
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--{}--", self.name)
    }
}

/* ===================== Scopes ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Target of `exit`
    Loop,
    /// Target of `stop`; blocks `exit`
    Stopped,
    /// Anything else that needs a cleanup on abnormal unwind
    Other,
}

/// Called once with the entries that sat above the mark, bottom first
pub type CleanupFn = fn(&mut VM, &[Entry]) -> Result<(), PsError>;

#[derive(Clone, Copy)]
pub struct Cleanup {
    pub name: &'static str,
    pub func: CleanupFn,
}

fn no_cleanup(_vm: &mut VM, _scope: &[Entry]) -> Result<(), PsError> {
    Ok(())
}

impl Cleanup {
    pub const NONE: Cleanup = Cleanup {
        name: "%no_cleanup",
        func: no_cleanup,
    };

    pub const fn new(name: &'static str, func: CleanupFn) -> Self {
        Cleanup { name, func }
    }
}

impl PartialEq for Cleanup {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mark {
    pub kind: ScopeKind,
    pub cleanup: Cleanup,
}

/* ===================== Entries ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Obj),
    Procedure(Obj),
    Step(Operator),
    Mark(Mark),
}

impl Entry {
    pub fn mark(kind: ScopeKind, cleanup: Cleanup) -> Self {
        Entry::Mark(Mark { kind, cleanup })
    }

    pub fn as_value(&self) -> Option<&Obj> {
        match self {
            Entry::Value(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_mark(&self) -> bool {
        matches!(self, Entry::Mark(_))
    }
}
