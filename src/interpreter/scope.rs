//! Scope/mark protocol
//!
//! A construct that must be found by a later `exit`/`stop`, or that owns
//! state needing restoration, opens a scope: a [`Mark`] followed by its
//! payload. Scopes end two ways:
//!
//! - normally: the construct's own continuation pops its payload and mark
//!   (a mark reaching the top of the stack is a silent no-op)
//! - abnormally: [`unwind`] discards entries top-down and runs the cleanup of
//!   every mark it crosses, innermost first
//!
//! Cleanups see the entries that sat above their mark, bottom first, and must
//! not push exec stack entries.

use tracing::debug;

use super::errors::PsError;
use super::estack::ExecStack;
use super::types::{Cleanup, Entry, Mark, Obj, ScopeKind};
use super::vm::VM;

/// Position of a mark, valid until the stack below it changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeHandle {
    depth: usize,
}

impl ScopeHandle {
    /// Entries from the mark up to the current top, mark included
    pub fn count(&self, estack: &ExecStack) -> usize {
        (estack.len() + 1).saturating_sub(self.depth)
    }
}

/// What a scan does when it meets a mark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    Match,
    Block,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
    /// Entries from the top through the matching mark
    At(usize),
    /// A blocking mark of this kind came first
    Blocked(ScopeKind),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    Handled,
    Blocked(ScopeKind),
    Unmatched,
}

/* ===================== Opening Scopes ===================== */

pub fn push_scope(
    vm: &mut VM,
    kind: ScopeKind,
    cleanup: Cleanup,
    payload: Vec<Obj>,
) -> Result<ScopeHandle, PsError> {
    vm.estack.check(payload.len() + 1)?;
    vm.estack.push(Entry::Mark(Mark { kind, cleanup }))?;
    let handle = ScopeHandle {
        depth: vm.estack.len(),
    };
    push_payload(vm, payload)?;
    Ok(handle)
}

pub fn push_payload(vm: &mut VM, values: Vec<Obj>) -> Result<(), PsError> {
    vm.estack.check(values.len())?;
    for value in values {
        vm.estack.push(Entry::Value(value))?;
    }
    Ok(())
}

/// Schedule a procedure or a continuation to run next
///
/// Payload values and marks only go on through `push_payload` and
/// `push_scope`.
pub fn enter(vm: &mut VM, entry: Entry) -> Result<(), PsError> {
    match entry {
        Entry::Procedure(_) | Entry::Step(_) => vm.estack.push(entry),
        Entry::Value(_) | Entry::Mark(_) => Err(PsError::Unknown(
            "only procedures and steps can be entered".to_string(),
        )),
    }
}

/* ===================== Unwinding ===================== */

/// Discard the top `count` entries, running the cleanup of every mark crossed
///
/// A failing cleanup stops the unwind at once; its mark and everything above
/// it are already gone, the rest of the range stays on the stack.
pub fn unwind(vm: &mut VM, count: usize) -> Result<(), PsError> {
    let target = vm.estack.len().saturating_sub(count);
    vm.clear_input_cache();
    while vm.estack.len() > target {
        let remaining = vm.estack.len() - target;
        let above = vm
            .estack
            .iter_from_top()
            .take(remaining)
            .position(Entry::is_mark);
        let Some(above) = above else {
            vm.estack.pop_n(remaining);
            break;
        };
        let scope = vm.estack.split_top(above);
        let Some(Entry::Mark(mark)) = vm.estack.pop() else {
            return Err(PsError::Unknown("unwind lost its mark".to_string()));
        };
        debug!(kind = ?mark.kind, cleanup = mark.cleanup.name, "unwinding scope");
        (mark.cleanup.func)(vm, &scope)?;
    }
    Ok(())
}

/* ===================== Scanning ===================== */

/// Walk the stack top-down, segment by segment, consulting `select` at
/// every mark; `select` gets the mark's distance from the top
pub fn find_scope<F>(estack: &ExecStack, mut select: F) -> Found
where
    F: FnMut(usize, &Mark) -> ScanAction,
{
    let mut scanned = 0;
    for segment in estack.enumerate() {
        for entry in segment.iter().rev() {
            if let Entry::Mark(mark) = entry {
                match select(scanned, mark) {
                    ScanAction::Match => return Found::At(scanned + 1),
                    ScanAction::Block => return Found::Blocked(mark.kind),
                    ScanAction::Skip => {}
                }
            }
            scanned += 1;
        }
    }
    Found::NotFound
}

pub fn scan_and_unwind<F>(vm: &mut VM, select: F) -> Result<ScanResult, PsError>
where
    F: FnMut(usize, &Mark) -> ScanAction,
{
    match find_scope(&vm.estack, select) {
        Found::At(count) => {
            unwind(vm, count)?;
            Ok(ScanResult::Handled)
        }
        Found::Blocked(kind) => Ok(ScanResult::Blocked(kind)),
        Found::NotFound => Ok(ScanResult::Unmatched),
    }
}

/// `exit` stops at the nearest loop; a `stopped` scope in between blocks it
pub fn select_loop(_index: usize, mark: &Mark) -> ScanAction {
    match mark.kind {
        ScopeKind::Loop => ScanAction::Match,
        ScopeKind::Stopped => ScanAction::Block,
        ScopeKind::Other => ScanAction::Skip,
    }
}

/// Entries through the nearest `stopped` mark whose selector shares a bit
/// with `mask`
///
/// The `stopped` payload sits above its mark as `result`, then `mask`.
pub fn count_to_stopped(estack: &ExecStack, mask: i64) -> Option<usize> {
    let found = find_scope(estack, |index, mark| {
        if mark.kind != ScopeKind::Stopped || index < 2 {
            return ScanAction::Skip;
        }
        match estack.int(index - 2) {
            Ok(selector) if selector & mask != 0 => ScanAction::Match,
            _ => ScanAction::Skip,
        }
    });
    match found {
        Found::At(count) => Some(count),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vm: &mut VM, scope: &[Entry]) -> Result<(), PsError> {
        let tag = scope
            .first()
            .and_then(Entry::as_value)
            .cloned()
            .unwrap_or_else(Obj::null);
        vm.ostack.push(tag)
    }

    fn failing(_vm: &mut VM, _scope: &[Entry]) -> Result<(), PsError> {
        Err(PsError::RangeCheck)
    }

    const RECORD: Cleanup = Cleanup::new("%record", record);
    const FAILING: Cleanup = Cleanup::new("%failing", failing);

    fn ints(vm: &VM) -> Vec<i64> {
        vm.ostack.as_slice().iter().map(|o| o.as_int().unwrap()).collect()
    }

    #[test]
    fn test_unwind_runs_cleanups_innermost_first() {
        let mut vm = VM::default();
        push_scope(&mut vm, ScopeKind::Loop, RECORD, vec![Obj::int(1)]).unwrap();
        push_scope(&mut vm, ScopeKind::Other, RECORD, vec![Obj::int(2)]).unwrap();
        push_scope(&mut vm, ScopeKind::Other, RECORD, vec![Obj::int(3), Obj::int(99)]).unwrap();

        let depth = vm.estack.len();
        unwind(&mut vm, depth).unwrap();

        assert_eq!(ints(&vm), vec![3, 2, 1]);
        assert!(vm.estack.is_empty());
    }

    #[test]
    fn test_unwind_stops_at_failing_cleanup() {
        let mut vm = VM::default();
        push_scope(&mut vm, ScopeKind::Other, RECORD, vec![Obj::int(1)]).unwrap();
        push_scope(&mut vm, ScopeKind::Other, FAILING, vec![]).unwrap();
        push_scope(&mut vm, ScopeKind::Other, RECORD, vec![Obj::int(3)]).unwrap();

        let depth = vm.estack.len();
        let result = unwind(&mut vm, depth);

        assert_eq!(result, Err(PsError::RangeCheck));
        assert_eq!(ints(&vm), vec![3]);
        // The outer scope is still there, so its cleanup can still run
        assert_eq!(vm.estack.len(), 2);
        unwind(&mut vm, 2).unwrap();
        assert_eq!(ints(&vm), vec![3, 1]);
    }

    #[test]
    fn test_scan_crosses_segments() {
        let mut vm = VM::default();
        vm.estack = ExecStack::new(2, 100);
        let handle = push_scope(&mut vm, ScopeKind::Loop, RECORD, vec![Obj::int(7)]).unwrap();
        for i in 0..5 {
            push_scope(&mut vm, ScopeKind::Other, Cleanup::NONE, vec![Obj::int(i)]).unwrap();
        }
        assert!(vm.estack.segment_count() > 2);
        let count = handle.count(&vm.estack);

        assert_eq!(find_scope(&vm.estack, select_loop), Found::At(count));
        let result = scan_and_unwind(&mut vm, select_loop).unwrap();

        assert_eq!(result, ScanResult::Handled);
        assert_eq!(ints(&vm), vec![7]);
        assert!(vm.estack.is_empty());
    }

    #[test]
    fn test_stopped_blocks_loop_scan() {
        let mut vm = VM::default();
        push_scope(&mut vm, ScopeKind::Loop, Cleanup::NONE, vec![]).unwrap();
        push_scope(
            &mut vm,
            ScopeKind::Stopped,
            Cleanup::NONE,
            vec![Obj::bool(false), Obj::int(1)],
        )
        .unwrap();

        assert_eq!(
            scan_and_unwind(&mut vm, select_loop).unwrap(),
            ScanResult::Blocked(ScopeKind::Stopped)
        );
        assert_eq!(vm.estack.len(), 4);
    }

    #[test]
    fn test_count_to_stopped_honours_mask() {
        let mut vm = VM::default();
        push_scope(
            &mut vm,
            ScopeKind::Stopped,
            Cleanup::NONE,
            vec![Obj::bool(false), Obj::int(1)],
        )
        .unwrap();
        push_scope(
            &mut vm,
            ScopeKind::Stopped,
            Cleanup::NONE,
            vec![Obj::bool(false), Obj::int(2)],
        )
        .unwrap();

        assert_eq!(count_to_stopped(&vm.estack, 2), Some(3));
        assert_eq!(count_to_stopped(&vm.estack, 1), Some(6));
        assert_eq!(count_to_stopped(&vm.estack, 4), None);
    }

    #[test]
    fn test_enter_accepts_only_runnable_entries() {
        let mut vm = VM::default();
        enter(&mut vm, Entry::Procedure(Obj::procedure(vec![Obj::int(1)]))).unwrap();
        assert_eq!(vm.estack.len(), 1);
        assert!(enter(&mut vm, Entry::Value(Obj::int(1))).is_err());
        assert!(enter(&mut vm, Entry::mark(ScopeKind::Other, Cleanup::NONE)).is_err());
        assert_eq!(vm.estack.len(), 1);
    }
}
