//! Tests for .runandhide

use super::helpers::{run, stack};
use crate::interpreter::types::Value;

#[test]
fn test_runandhide_restores_array_after_normal_completion() {
    let vm = run("[1 2 3] readonly {4} .runandhide dup rcheck exch wcheck");
    // the body's result, then the array back with its own attributes
    assert_eq!(stack(&vm), vec!["4", "true", "false"]);
}

#[test]
fn test_runandhide_hides_array_from_execstack() {
    let vm = run("[1 2 3] { 20 array execstack } .runandhide");
    let snapshot = vm.ostack.top(1).unwrap().as_array().unwrap().to_vec();
    let rendered: Vec<String> = snapshot.iter().map(|o| o.to_string()).collect();
    assert!(rendered.contains(&"-array-".to_string()), "{:?}", rendered);
    assert!(!rendered.contains(&"[1 2 3]".to_string()), "{:?}", rendered);
    assert_eq!(vm.ostack.top(0).unwrap().to_string(), "[1 2 3]");
}

#[test]
fn test_runandhide_restores_array_on_error() {
    let vm = run("{ [1 2 3] {nosuchname} .runandhide } stopped");
    assert_eq!(stack(&vm), vec!["[1 2 3]", "true"]);
    assert!(vm.ostack.top(1).unwrap().attrs.can_read());
}

#[test]
fn test_runandhide_restores_array_on_stop() {
    let vm = run("{ [5] {stop} .runandhide } stopped exch length");
    assert_eq!(stack(&vm), vec!["true", "1"]);
}

#[test]
fn test_runandhide_requires_array() {
    let vm = run("{ 1 {2} .runandhide } stopped");
    assert_eq!(vm.last_error.as_ref().unwrap().error, "typecheck");
    assert!(matches!(vm.ostack.top(0).unwrap().value, Value::Bool(true)));
}

#[test]
fn test_stop_restores_every_nested_runandhide_innermost_first() {
    let vm = run(
        "{ [1] { [2] { [3] { 3 { stop } repeat } .runandhide } .runandhide } .runandhide } stopped",
    );
    assert_eq!(stack(&vm), vec!["[3]", "[2]", "[1]", "true"]);
    assert!(vm.estack.is_empty());
}

#[test]
fn test_exit_through_runandhide_restores_array() {
    let vm = run("{ [1] { exit } .runandhide } loop");
    assert_eq!(stack(&vm), vec!["[1]"]);
    assert!(vm.estack.is_empty());
}

#[test]
fn test_runandhide_restores_same_attributes_on_both_paths() {
    let normal = run("[1 2 3] readonly {} .runandhide dup rcheck exch wcheck");
    let failed = run(
        "{ [1 2 3] readonly {nosuchname} .runandhide } stopped pop dup rcheck exch wcheck",
    );
    assert_eq!(stack(&normal), vec!["[1 2 3]", "true", "false"]);
    assert_eq!(stack(&normal), stack(&failed));
    assert_eq!(normal.ostack.top(2).unwrap().attrs, failed.ostack.top(2).unwrap().attrs);
}
