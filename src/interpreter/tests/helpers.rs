//! Test helpers for interpreter tests
//!
//! Common utilities for running source and reading the operand stack

use crate::interpreter::{ErrorRecord, Outcome, VM};
use crate::interpreter::types::Value;

/// Run source on a fresh VM and require it to complete
pub fn run(source: &str) -> VM {
    let mut vm = VM::default();
    let outcome = vm.run_source(source);
    assert_eq!(outcome, Outcome::Completed, "source: {}", source);
    assert!(vm.estack.is_empty(), "exec stack left behind: {}", source);
    vm
}

/// Run source on a fresh VM and hand back whatever happened
pub fn run_outcome(source: &str) -> (VM, Outcome) {
    let mut vm = VM::default();
    let outcome = vm.run_source(source);
    (vm, outcome)
}

/// Run source that must abort, returning the error record
pub fn run_aborted(source: &str) -> (VM, ErrorRecord) {
    let (vm, outcome) = run_outcome(source);
    let Outcome::Aborted(record) = outcome else {
        unreachable!("expected abort for {}, got {:?}", source, outcome)
    };
    (vm, record)
}

/// Operand stack rendered the way `==` prints, bottom first
pub fn stack(vm: &VM) -> Vec<String> {
    vm.ostack.as_slice().iter().map(|o| o.to_string()).collect()
}

pub fn ints(vm: &VM) -> Vec<i64> {
    vm.ostack
        .as_slice()
        .iter()
        .map(|o| {
            let Value::Int(i) = o.value else {
                unreachable!("expected integer, got {}", o)
            };
            i
        })
        .collect()
}

pub fn numbers(vm: &VM) -> Vec<f64> {
    vm.ostack
        .as_slice()
        .iter()
        .map(|o| {
            o.as_number()
                .unwrap_or_else(|_| unreachable!("expected number, got {}", o))
        })
        .collect()
}

pub fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{:?} vs {:?}", actual, expected);
    }
}
