//! Tests for colour spaces and the suspend/resume colour walks

use super::helpers::{assert_close, numbers, run, run_outcome, stack};
use crate::interpreter::colorspace::function::Function;
use crate::interpreter::colorspace::GState;
use crate::interpreter::types::Obj;
use crate::interpreter::{Outcome, VM};

fn gold_separation(tint: Obj) -> Obj {
    Obj::array(vec![
        Obj::name("Separation"),
        Obj::name("Gold"),
        Obj::name("DeviceRGB"),
        tint,
    ])
}

fn indexed(base: Obj, hival: i64, lookup: Obj) -> Obj {
    Obj::array(vec![Obj::name("Indexed"), base, Obj::int(hival), lookup])
}

/// Run `currentgray` with the given colour state installed directly
fn current_gray_of(space: Obj, color: Vec<f64>) -> VM {
    let mut vm = VM::default();
    vm.gstate = GState {
        color_space: space,
        color,
        indexed_table: None,
    };
    assert_eq!(vm.run_source("currentgray"), Outcome::Completed);
    assert!(vm.estack.is_empty());
    vm
}

#[test]
fn test_default_colour_state() {
    let vm = run("currentgray currentcolorspace 0 get");
    assert_eq!(stack(&vm), vec!["0.0", "/DeviceGray"]);
}

#[test]
fn test_device_setters_and_queries() {
    let vm = run("0.2 0.4 0.6 setrgbcolor currentrgbcolor");
    assert_close(&numbers(&vm), &[0.2, 0.4, 0.6]);

    let vm = run("1 0 0 setrgbcolor currentcmykcolor");
    assert_eq!(numbers(&vm), vec![0.0, 1.0, 1.0, 0.0]);

    let vm = run("0 0 0 1 setcmykcolor currentgray currentcolorspace 0 get");
    assert_eq!(stack(&vm), vec!["0.0", "/DeviceCMYK"]);

    let vm = run("0.2 0.4 0.6 setrgbcolor currentgray");
    assert_close(&numbers(&vm), &[0.3 * 0.2 + 0.59 * 0.4 + 0.11 * 0.6]);
}

#[test]
fn test_setgray_selects_space_through_setcolorspace() {
    let vm = run("0.5 setgray currentgray");
    assert_eq!(numbers(&vm), vec![0.5]);
    assert_eq!(vm.stats.step_count("%setdevicecolor_cont"), 2);
    assert_eq!(vm.stats.step_count("%setcolorspace_cont"), 1);
}

#[test]
fn test_setgray_clamps() {
    let vm = run("2 setgray currentcolor");
    assert_eq!(numbers(&vm), vec![1.0]);
}

#[test]
fn test_separation_with_procedure_tint() {
    let vm = run("[/Separation /Gold /DeviceRGB {dup dup}] setcolorspace currentcolor 0.5 setcolor currentrgbcolor");
    assert_eq!(numbers(&vm), vec![1.0, 0.5, 0.5, 0.5]);
    assert_eq!(vm.stats.step_count("%currentbasecolor_cont"), 2);
}

#[test]
fn test_device_colorant_skips_alternate() {
    let vm = run("[/Separation /Cyan /DeviceRGB {dup dup}] setcolorspace 0.5 setcolor currentgray");
    assert_eq!(numbers(&vm), vec![0.0]);
    assert_eq!(vm.stats.step_count("%currentbasecolor_cont"), 1);
}

#[test]
fn test_devicen_with_procedure_tint() {
    let vm = run("[/DeviceN [/Gold /Silver] /DeviceGray {add 2 div}] setcolorspace 0.2 0.6 setcolor currentgray");
    assert_close(&numbers(&vm), &[0.4]);
}

#[test]
fn test_indexed_string_lookup() {
    let vm = run("[/Indexed /DeviceRGB 1 <FF000000FF00>] setcolorspace 1 setcolor currentrgbcolor");
    assert_eq!(numbers(&vm), vec![0.0, 1.0, 0.0]);
}

#[test]
fn test_indexed_procedure_is_sampled_at_install() {
    let vm = run("[/Indexed /DeviceGray 3 {4 div}] setcolorspace 2 setcolor currentgray");
    assert_eq!(vm.stats.step_count("%indexed_cont"), 4);
    assert_eq!(vm.gstate.indexed_table, Some(vec![0.0, 0.25, 0.5, 0.75]));
    assert_eq!(numbers(&vm), vec![0.5]);
}

#[test]
fn test_cached_table_leaves_one_suspension() {
    let vm = run("[/Indexed [/Separation /Gold /DeviceRGB {dup dup}] 3 {3 div}] setcolorspace 3 setcolor currentrgbcolor");
    assert_eq!(numbers(&vm), vec![1.0, 1.0, 1.0]);
    assert_eq!(vm.stats.step_count("%currentbasecolor_cont"), 2);
}

#[test]
fn test_suspending_layers_match_synchronous_layers() {
    let bytes: Vec<u8> = (0..=255).collect();
    let identity = Function::exponential(vec![0.0; 3], vec![1.0; 3], 1.0).unwrap();
    let sync = indexed(
        gold_separation(Obj::function(identity)),
        255,
        Obj::string(&bytes),
    );
    let sync_vm = current_gray_of(sync, vec![51.0]);
    assert_eq!(sync_vm.stats.step_count("%currentbasecolor_cont"), 1);

    let tint = Obj::procedure(vec![Obj::exec_name("dup"), Obj::exec_name("dup")]);
    let lookup = Obj::procedure(vec![Obj::int(255), Obj::exec_name("div")]);
    let deferred = indexed(gold_separation(tint), 255, lookup);
    let deferred_vm = current_gray_of(deferred, vec![51.0]);
    // one dispatch to start, one per suspending layer
    assert_eq!(deferred_vm.stats.step_count("%currentbasecolor_cont"), 3);

    assert_eq!(numbers(&sync_vm), numbers(&deferred_vm));
    assert_close(&numbers(&sync_vm), &[0.2]);
}

#[test]
fn test_invalid_spaces_are_rejected() {
    let (vm, outcome) = run_outcome("{[/Indexed /DeviceRGB 300 <00>] setcolorspace} stopped");
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(vm.last_error.as_ref().unwrap().error, "rangecheck");

    let vm = run("{[/Separation /Gold [/Separation /Cyan /DeviceGray {}] {}] setcolorspace} stopped");
    assert_eq!(vm.last_error.as_ref().unwrap().error, "typecheck");
    assert_eq!(vm.gstate, GState::default());
}

#[test]
fn test_indexed_setcolor_range() {
    let vm = run("[/Indexed /DeviceGray 1 <00FF>] setcolorspace {3 setcolor} stopped");
    assert_eq!(vm.last_error.as_ref().unwrap().error, "rangecheck");
    assert_eq!(stack(&vm), vec!["3", "true"]);
}

#[test]
fn test_error_in_tint_unwinds_colour_frame() {
    let vm = run("[/Separation /Gold /DeviceRGB {pop nosuchname}] setcolorspace {currentgray} stopped countexecstack");
    assert_eq!(vm.last_error.as_ref().unwrap().error, "undefined");
    let rendered = stack(&vm);
    assert_eq!(rendered[rendered.len() - 2..], ["true", "1"]);
}
