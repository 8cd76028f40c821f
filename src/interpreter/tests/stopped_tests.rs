//! Tests for stop, stopped and their masked variants

use super::helpers::{run, run_aborted, run_outcome, stack};
use crate::config::Config;
use crate::interpreter::{Outcome, VM};

#[test]
fn test_stopped_normal_completion() {
    let vm = run("{1 2 add} stopped");
    assert_eq!(stack(&vm), vec!["3", "false"]);
}

#[test]
fn test_stop_unwinds_to_stopped() {
    let vm = run("{1 stop 2} stopped");
    assert_eq!(stack(&vm), vec!["1", "true"]);
}

#[test]
fn test_stopped_isolates_errors() {
    let vm = run("{nosuchname} stopped 7");
    assert_eq!(stack(&vm), vec!["true", "7"]);
    let record = vm.last_error.as_ref().unwrap();
    assert_eq!(record.error, "undefined");
    assert_eq!(record.command.as_deref(), Some("nosuchname"));
}

#[test]
fn test_stop_from_inside_loops() {
    let vm = run("{0 1 10 {dup 2 eq {stop} if} for} stopped");
    assert_eq!(stack(&vm), vec!["0", "1", "2", "true"]);
}

#[test]
fn test_nested_stopped() {
    let vm = run("{ {stop} stopped 5 } stopped");
    assert_eq!(stack(&vm), vec!["true", "5", "false"]);
}

#[test]
fn test_masked_stop_skips_other_masks() {
    let vm = run("{ /r 2 .stop } /default 2 .stopped");
    assert_eq!(stack(&vm), vec!["/r"]);
    let vm = run("{ { /r 2 .stop } /inner 1 .stopped } /outer 2 .stopped");
    assert_eq!(stack(&vm), vec!["/r"]);
    let vm = run("{ 1 } /default 2 .stopped");
    assert_eq!(stack(&vm), vec!["1", "/default"]);
}

#[test]
fn test_instopped_reports_enclosing_result() {
    let vm = run("{ 1 .instopped } stopped 1 .instopped");
    assert_eq!(stack(&vm), vec!["false", "true", "false", "false"]);
}

#[test]
fn test_stop_without_stopped_aborts() {
    let (vm, record) = run_aborted("stop");
    assert_eq!(record.error, "invalidexit");
    assert!(vm.estack.is_empty());
}

#[test]
fn test_needinput_passes_through_stopped() {
    let (vm, outcome) = run_outcome("{.needinput} stopped");
    assert_eq!(outcome, Outcome::NeedInput);
    assert!(!vm.estack.is_empty());
    assert!(vm.ostack.is_empty());
}

#[test]
fn test_quit_passes_through_stopped() {
    let (vm, outcome) = run_outcome("{ (bye) 7 .quit } stopped");
    assert_eq!(outcome, Outcome::Quit { code: 7 });
    assert!(vm.estack.is_empty());
}

#[test]
fn test_quit_with_invalidexit_code_aborts() {
    let (_, record) = run_aborted("(bye) -8 .quit");
    assert_eq!(record.error, "invalidexit");
    assert_eq!(record.command.as_deref(), Some("(bye)"));
}

#[test]
fn test_uncatchable_errors_abort() {
    let mut config = Config::default();
    config.errors.uncatchable = vec!["undefined".to_string()];
    let mut vm = VM::new(config);
    let outcome = vm.run_source("{nosuchname} stopped");
    let Outcome::Aborted(record) = outcome else {
        unreachable!("expected abort, got {:?}", outcome)
    };
    assert_eq!(record.error, "undefined");

    assert_eq!(vm.run_source("{1 0 div} stopped"), Outcome::Completed);
    assert_eq!(stack(&vm).last().map(String::as_str), Some("true"));
}

#[test]
fn test_errors_inside_nested_procedures_unwind_everything() {
    let vm = run("{ 3 { 1 1 5 { 4 eq { nosuchname } if } for } repeat } stopped countexecstack");
    assert_eq!(stack(&vm), vec!["true", "1"]);
}
