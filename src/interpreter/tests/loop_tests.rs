//! Tests for for, repeat, loop and exit

use super::helpers::{assert_close, ints, numbers, run, run_aborted, stack};
use crate::interpreter::Outcome;

#[test]
fn test_for_counts_inclusive() {
    let vm = run("0 1 5 {} for");
    assert_eq!(ints(&vm), vec![0, 1, 2, 3, 4, 5]);
    let vm = run("1 2 6 {} for");
    assert_eq!(ints(&vm), vec![1, 3, 5]);
    let vm = run("5 -2 0 {} for");
    assert_eq!(ints(&vm), vec![5, 3, 1]);
}

#[test]
fn test_for_empty_ranges() {
    let vm = run("1 1 0 {} for 0 -1 1 {} for");
    assert!(vm.ostack.is_empty());
}

#[test]
fn test_for_zero_init_and_step_never_runs() {
    let vm = run("0 0 10 {1} for");
    assert!(vm.ostack.is_empty());
}

#[test]
fn test_for_with_reals() {
    let vm = run("0 0.5 1 {} for");
    assert_eq!(numbers(&vm), vec![0.0, 0.5, 1.0]);
    assert_eq!(stack(&vm), vec!["0.0", "0.5", "1.0"]);
}

#[test]
fn test_for_integer_with_real_limit() {
    let vm = run("0 1 2.5 {} for");
    assert_eq!(ints(&vm), vec![0, 1, 2]);
}

#[test]
fn test_repeat_counts() {
    let vm = run("3 {1} repeat 0 {2} repeat");
    assert_eq!(ints(&vm), vec![1, 1, 1]);
}

#[test]
fn test_repeat_negative_count() {
    let (vm, record) = run_aborted("-1 {1} repeat");
    assert_eq!(record.error, "rangecheck");
    assert!(vm.estack.is_empty());
}

#[test]
fn test_loop_runs_until_exit() {
    let vm = run("0 {1 add dup 5 eq {exit} if} loop");
    assert_eq!(ints(&vm), vec![5]);
}

#[test]
fn test_exit_leaves_for_early() {
    let vm = run("0 1 10 {dup 3 eq {exit} if} for");
    assert_eq!(ints(&vm), vec![0, 1, 2, 3]);
}

#[test]
fn test_exit_leaves_innermost_loop_only() {
    let vm = run("2 {3 {1 exit} repeat} repeat");
    assert_eq!(ints(&vm), vec![1, 1]);
}

#[test]
fn test_loops_leave_exec_stack_balanced() {
    let vm = run("0 1 2 {pop} for 2 {} repeat {exit} loop countexecstack");
    assert_eq!(ints(&vm), vec![1]);
}

#[test]
fn test_count_inside_for_body() {
    // input, four loop values and the continuation; marks are not counted
    let vm = run("0 1 0 {pop countexecstack} for 0 1 0 {pop true .countexecstack} for");
    assert_eq!(ints(&vm), vec![6, 7]);
}

#[test]
fn test_exit_blocked_by_stopped() {
    let vm = run("3 { {exit} stopped } repeat");
    assert_eq!(stack(&vm), vec!["true", "true", "true"]);
    let record = vm.last_error.as_ref().unwrap();
    assert_eq!(record.error, "invalidexit");
}

#[test]
fn test_unmatched_exit_aborts_job() {
    let (mut vm, record) = run_aborted("1 exit 2");
    assert_eq!(record.error, "invalidexit");
    assert_eq!(record.command.as_deref(), Some("--exit--"));
    assert!(vm.estack.is_empty());
    assert_eq!(ints(&vm), vec![1]);

    // the next job runs normally
    assert_eq!(vm.run_source("2 3 add"), Outcome::Completed);
    assert_eq!(ints(&vm), vec![1, 5]);
}

#[test]
fn test_deep_recursion_overflows_exec_stack() {
    let vm = run("/f {f 1} def {f} stopped");
    assert_eq!(stack(&vm), vec!["true"]);
    assert_eq!(vm.last_error.as_ref().unwrap().error, "execstackoverflow");
    assert!(vm.estack.high_water() > 4000);
}

#[test]
fn test_for_ends_at_integer_range_limits() {
    let vm = run("0 9223372036854775806 1 9223372036854775807 { pop 1 add dup 5 eq {exit} if } for");
    assert_eq!(ints(&vm), vec![2]);
    let vm = run("0 -9223372036854775807 -1 -9223372036854775808 { pop 1 add dup 5 eq {exit} if } for");
    assert_eq!(ints(&vm), vec![2]);
}

#[test]
fn test_for_large_step_past_range_runs_once() {
    let vm = run("9223372036854775800 100 9223372036854775807 {} for");
    assert_eq!(ints(&vm), vec![9223372036854775800]);
}

#[test]
fn test_for_samples_hits_both_ends_exactly() {
    let vm = run("0.0 4 1.0 {} .for_samples");
    assert_close(&numbers(&vm), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    assert_eq!(numbers(&vm)[4], 1.0);
    assert!(vm.estack.is_empty());
}

#[test]
fn test_for_samples_zero_count_runs_once() {
    let vm = run("0.5 0 2.0 {} .for_samples");
    assert_eq!(numbers(&vm), vec![0.5]);
}

#[test]
fn test_exit_leaves_for_samples() {
    let vm = run("0.0 10 1.0 { 0.3 gt {exit} if } .for_samples count");
    assert_eq!(ints(&vm), vec![0]);
}
