//! Tests for execstack, countexecstack and currentfile

use super::helpers::{ints, run, run_aborted, stack};
use crate::interpreter::types::Value;

#[test]
fn test_execstack_at_top_level() {
    let vm = run("10 array execstack length");
    assert_eq!(ints(&vm), vec![1]);
}

#[test]
fn test_execstack_checks_length_before_access() {
    let (_, record) = run_aborted("0 array execstack");
    assert_eq!(record.error, "rangecheck");
    let (_, record) = run_aborted("0 array readonly execstack");
    assert_eq!(record.error, "rangecheck");
    let (_, record) = run_aborted("10 array readonly execstack");
    assert_eq!(record.error, "invalidaccess");
}

#[test]
fn test_execstack_inside_stopped() {
    let vm = run("{ 10 array execstack } stopped");
    let snapshot = vm.ostack.top(1).unwrap().as_array().unwrap().to_vec();
    let rendered: Vec<String> = snapshot.iter().map(|o| o.to_string()).collect();
    assert_eq!(rendered, vec!["-file-", "false", "1", "--%stopped_push--"]);
    // internal continuations come out literal
    assert!(!snapshot[3].attrs.executable);
}

#[test]
fn test_execstack_with_marks() {
    let vm = run("{ 10 array true .execstack } stopped");
    let snapshot = vm.ostack.top(1).unwrap().as_array().unwrap().to_vec();
    assert_eq!(snapshot.len(), 5);
    assert!(matches!(snapshot[1].value, Value::Null));
    assert!(snapshot[1].attrs.executable);
    assert_eq!(stack(&vm)[1], "false");
}

#[test]
fn test_countexecstack_variants() {
    let vm = run("countexecstack false .countexecstack {true .countexecstack} stopped");
    assert_eq!(stack(&vm), vec!["1", "1", "5", "false"]);
}

#[test]
fn test_currentfile_is_running_input() {
    let vm = run("currentfile");
    let Value::Input(input) = &vm.ostack.top(0).unwrap().value else {
        unreachable!("expected a file")
    };
    assert_eq!(input.name(), "%source");
}
