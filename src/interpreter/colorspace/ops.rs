//! Colour operators
//!
//! Installing a space and reporting a colour in a device space both walk the
//! space's layers. Each walk keeps its position in a small frame on the exec
//! stack (`mark payload... %cont`) and re-pushes its continuation before
//! handing work to a PostScript procedure, so the procedure returns straight
//! into the next step of the walk.

use tracing::trace;

use super::{
    alternate, colorant_names, components, convert, decode_lookup, element, hival,
    initial_color, layer, validate_spaces, BaseColor, Family,
};
use crate::interpreter::errors::PsError;
use crate::interpreter::scope;
use crate::interpreter::types::{
    Cleanup, Entry, Obj, OpResult, Operator, ScopeKind, Signal, Value,
};
use crate::interpreter::vm::VM;

pub const SETCOLORSPACE: Operator = Operator::new("setcolorspace", zsetcolorspace);
pub const CURRENTCOLORSPACE: Operator = Operator::new("currentcolorspace", zcurrentcolorspace);
pub const SETCOLOR: Operator = Operator::new("setcolor", zsetcolor);
pub const CURRENTCOLOR: Operator = Operator::new("currentcolor", zcurrentcolor);
pub const SETGRAY: Operator = Operator::new("setgray", zsetgray);
pub const SETRGBCOLOR: Operator = Operator::new("setrgbcolor", zsetrgbcolor);
pub const SETCMYKCOLOR: Operator = Operator::new("setcmykcolor", zsetcmykcolor);
pub const CURRENTGRAY: Operator = Operator::new("currentgray", zcurrentgray);
pub const CURRENTRGBCOLOR: Operator = Operator::new("currentrgbcolor", zcurrentrgbcolor);
pub const CURRENTCMYKCOLOR: Operator = Operator::new("currentcmykcolor", zcurrentcmykcolor);

pub const OPS: &[Operator] = &[
    SETCOLORSPACE,
    CURRENTCOLORSPACE,
    SETCOLOR,
    CURRENTCOLOR,
    SETGRAY,
    SETRGBCOLOR,
    SETCMYKCOLOR,
    CURRENTGRAY,
    CURRENTRGBCOLOR,
    CURRENTCMYKCOLOR,
];

const SETCOLORSPACE_CONT: Operator = Operator::new("%setcolorspace_cont", setcolorspace_cont);
const INDEXED_CONT: Operator = Operator::new("%indexed_cont", indexed_cont);
const CURRENTBASECOLOR_CONT: Operator =
    Operator::new("%currentbasecolor_cont", currentbasecolor_cont);
const SETDEVICECOLOR_CONT: Operator = Operator::new("%setdevicecolor_cont", setdevicecolor_cont);

/// Colour frames hold no resources; the mark only delimits them
const COLOUR_CLEANUP: Cleanup = Cleanup::new("%colour_cleanup", colour_cleanup);

fn colour_cleanup(_vm: &mut VM, _scope: &[Entry]) -> Result<(), PsError> {
    Ok(())
}

/// Result of one layer's share of a walk
enum Progress {
    /// A procedure was pushed; the walk resumes when it returns
    Delegated,
    /// Move on to the next layer down
    Next,
    /// The walk is finished
    Terminal,
}

/// Write `stage` and `depth` back into a frame whose continuation sat at
/// `frame_top` before the layer pushed its own work
fn save_position(
    vm: &mut VM,
    frame_top: usize,
    stage: i64,
    depth: i64,
) -> Result<(), PsError> {
    let shift = vm.estack.len() - frame_top;
    vm.estack.set_value(shift + 2, Obj::int(stage))?;
    vm.estack.set_value(shift + 3, Obj::int(depth))
}

fn pop_numbers(vm: &mut VM, n: usize) -> Result<Vec<f64>, PsError> {
    vm.ostack.check(n)?;
    let values = (0..n)
        .rev()
        .map(|i| vm.ostack.top(i).and_then(Obj::as_number))
        .collect::<Result<Vec<_>, _>>()?;
    vm.ostack.pop_n(n)?;
    Ok(values)
}

fn push_reals(vm: &mut VM, values: &[f64]) -> Result<(), PsError> {
    vm.ostack.room(values.len())?;
    for v in values {
        vm.ostack.push(Obj::real(*v))?;
    }
    Ok(())
}

fn numbers_of(arr: &Obj) -> Result<Vec<f64>, PsError> {
    arr.as_array()?
        .to_vec()
        .iter()
        .map(Obj::as_number)
        .collect()
}

/* ===================== setcolorspace ===================== */

/// `<space> setcolorspace -`
///
/// Frame: `mark table depth stage space %setcolorspace_cont`. Layers are
/// installed from the innermost outwards.
fn zsetcolorspace(vm: &mut VM) -> OpResult {
    vm.ostack.check(1)?;
    let space = vm.ostack.top(0)?.clone();
    let depth = validate_spaces(&space)?;
    vm.estack.check(6)?;
    scope::push_scope(
        vm,
        ScopeKind::Other,
        COLOUR_CLEANUP,
        vec![Obj::null(), Obj::int(depth as i64), Obj::int(0), space],
    )?;
    scope::enter(vm, Entry::Step(SETCOLORSPACE_CONT))?;
    Ok(Signal::Suspend)
}

fn setcolorspace_cont(vm: &mut VM) -> OpResult {
    let space = vm.estack.value(0)?.clone();
    let mut stage = vm.estack.int(1)?;
    let mut depth = vm.estack.int(2)?;
    vm.estack.check(1)?;
    scope::enter(vm, Entry::Step(SETCOLORSPACE_CONT))?;
    let frame_top = vm.estack.len();
    while depth > 0 {
        let current = layer(&space, (depth - 1) as usize)?;
        match install_layer(vm, &current, &mut stage)? {
            Progress::Delegated => {
                save_position(vm, frame_top, stage, depth)?;
                return Ok(Signal::Suspend);
            }
            Progress::Next | Progress::Terminal => {
                depth -= 1;
                stage = 0;
            }
        }
    }
    let table = vm.estack.value(4)?.clone();
    vm.gstate.indexed_table = match table.value {
        Value::Array(_) => Some(numbers_of(&table)?),
        _ => None,
    };
    vm.gstate.color = initial_color(&space)?;
    vm.gstate.color_space = space;
    trace!(space = %vm.gstate.color_space, "colour space installed");
    vm.ostack.pop()?;
    vm.estack.pop_n(6);
    Ok(Signal::Done)
}

/// Only Indexed layers need work at install time: their lookup is sampled
/// into a table held in the frame
fn install_layer(vm: &mut VM, current: &Obj, stage: &mut i64) -> Result<Progress, PsError> {
    if Family::of(current)? != Family::Indexed {
        return Ok(Progress::Next);
    }
    let lookup = element(current, 3)?;
    let hival = hival(current)?;
    let base = element(current, 1)?;
    let ncomps = components(&base)?;
    match (*stage, &lookup.value) {
        (0, Value::Str(bytes)) => {
            let table = decode_lookup(bytes, hival as usize + 1, ncomps)?;
            let table = table.into_iter().map(Obj::real).collect();
            vm.estack.set_value(4, Obj::array(table))?;
            Ok(Progress::Next)
        }
        (0, _) => {
            *stage = 1;
            let table = Obj::array(vec![Obj::null(); (hival as usize + 1) * ncomps]);
            vm.estack.check(8)?;
            scope::push_scope(
                vm,
                ScopeKind::Other,
                COLOUR_CLEANUP,
                vec![
                    Obj::int(hival),
                    Obj::int(ncomps as i64),
                    lookup.clone(),
                    table,
                    Obj::int(-1),
                ],
            )?;
            indexed_cont(vm)?;
            Ok(Progress::Delegated)
        }
        _ => {
            // The sampler left the finished table on the operand stack
            let table = vm.ostack.pop()?;
            table.as_array()?;
            vm.estack.set_value(4, table)?;
            Ok(Progress::Next)
        }
    }
}

/// Sample an Indexed lookup procedure once per entry
///
/// Frame: `mark hival ncomps proc table index`; `index` is the entry whose
/// results are on the operand stack, -1 before the first call.
fn indexed_cont(vm: &mut VM) -> OpResult {
    let index = vm.estack.int(0)?;
    let table = vm.estack.value(1)?.clone();
    let proc = vm.estack.value(2)?.clone();
    let ncomps = vm.estack.int(3)? as usize;
    let hival = vm.estack.int(4)?;
    if index >= 0 {
        let values = pop_numbers(vm, ncomps)?;
        let arr = table.as_array()?;
        for (j, v) in values.into_iter().enumerate() {
            arr.set(index as usize * ncomps + j, Obj::real(v));
        }
    }
    if index >= hival {
        vm.ostack.push(table)?;
        vm.estack.pop_n(6);
        return Ok(Signal::Done);
    }
    let next = index + 1;
    vm.estack.set_value(0, Obj::int(next))?;
    vm.ostack.push(Obj::int(next))?;
    vm.estack.check(2)?;
    scope::enter(vm, Entry::Step(INDEXED_CONT))?;
    scope::enter(vm, Entry::Procedure(proc))?;
    Ok(Signal::Suspend)
}

/// `- currentcolorspace <array>`
fn zcurrentcolorspace(vm: &mut VM) -> OpResult {
    let space = match &vm.gstate.color_space.value {
        Value::Name(_) => Obj::array(vec![vm.gstate.color_space.clone()]),
        _ => vm.gstate.color_space.clone(),
    };
    vm.ostack.push(space)?;
    Ok(Signal::Done)
}

/* ===================== setcolor ===================== */

/// `<c1> ... <cn> setcolor -`
fn zsetcolor(vm: &mut VM) -> OpResult {
    let space = vm.gstate.color_space.clone();
    let n = components(&space)?;
    vm.ostack.check(n)?;
    let mut comps = (0..n)
        .rev()
        .map(|i| vm.ostack.top(i).and_then(Obj::as_number))
        .collect::<Result<Vec<_>, _>>()?;
    if Family::of(&space)? == Family::Indexed {
        let index = comps[0].trunc();
        if index < 0.0 || index > hival(&space)? as f64 {
            return Err(PsError::RangeCheck);
        }
        comps[0] = index;
    } else {
        for c in comps.iter_mut() {
            *c = c.clamp(0.0, 1.0);
        }
    }
    vm.ostack.pop_n(n)?;
    vm.gstate.color = comps;
    Ok(Signal::Done)
}

fn push_current_components(vm: &mut VM) -> Result<usize, PsError> {
    let indexed = Family::of(&vm.gstate.color_space)? == Family::Indexed;
    let comps = vm.gstate.color.clone();
    vm.ostack.room(comps.len())?;
    for c in &comps {
        let obj = if indexed {
            Obj::int(*c as i64)
        } else {
            Obj::real(*c)
        };
        vm.ostack.push(obj)?;
    }
    Ok(comps.len())
}

/// `- currentcolor <c1> ... <cn>`
fn zcurrentcolor(vm: &mut VM) -> OpResult {
    push_current_components(vm)?;
    Ok(Signal::Done)
}

/* ===================== Device Colour Queries ===================== */

fn zcurrentgray(vm: &mut VM) -> OpResult {
    current_base_color(vm, BaseColor::Gray)
}

fn zcurrentrgbcolor(vm: &mut VM) -> OpResult {
    current_base_color(vm, BaseColor::Rgb)
}

fn zcurrentcmykcolor(vm: &mut VM) -> OpResult {
    current_base_color(vm, BaseColor::Cmyk)
}

/// Push the current colour, then convert it layer by layer
///
/// Frame: `mark base depth stage space %currentbasecolor_cont`, with `depth`
/// counting from 1 at the outermost layer.
fn current_base_color(vm: &mut VM, base: BaseColor) -> OpResult {
    let space = vm.gstate.color_space.clone();
    vm.ostack.room(BaseColor::Cmyk.components())?;
    vm.estack.check(6)?;
    push_current_components(vm)?;
    scope::push_scope(
        vm,
        ScopeKind::Other,
        COLOUR_CLEANUP,
        vec![Obj::int(base.code()), Obj::int(1), Obj::int(0), space],
    )?;
    scope::enter(vm, Entry::Step(CURRENTBASECOLOR_CONT))?;
    Ok(Signal::Suspend)
}

fn currentbasecolor_cont(vm: &mut VM) -> OpResult {
    let space = vm.estack.value(0)?.clone();
    let mut stage = vm.estack.int(1)?;
    let mut depth = vm.estack.int(2)?;
    let base = BaseColor::from_code(vm.estack.int(3)?)?;
    if depth < 1 {
        return Err(PsError::Unknown(format!("bad colour layer depth {}", depth)));
    }
    vm.estack.check(1)?;
    scope::enter(vm, Entry::Step(CURRENTBASECOLOR_CONT))?;
    let frame_top = vm.estack.len();
    loop {
        let current = layer(&space, (depth - 1) as usize)?;
        let outermost = depth == 1 && vm.gstate.color_space == space;
        match base_transform(vm, &current, outermost, base, &mut stage)? {
            Progress::Delegated => {
                save_position(vm, frame_top, stage, depth)?;
                return Ok(Signal::Suspend);
            }
            Progress::Next => {
                depth += 1;
                stage = 0;
            }
            Progress::Terminal => break,
        }
    }
    scope::unwind(vm, 6)?;
    Ok(Signal::Done)
}

/// Colorants the device renders itself make a Separation or DeviceN layer
/// the last one
fn uses_alternate(vm: &VM, names: &[String]) -> bool {
    names
        .iter()
        .any(|n| n != "All" && n != "None" && !vm.config.device.has_colorant(n))
}

/// Replace one layer's components on the operand stack with the next
/// layer's, or with the final device components
fn base_transform(
    vm: &mut VM,
    current: &Obj,
    outermost: bool,
    base: BaseColor,
    stage: &mut i64,
) -> Result<Progress, PsError> {
    let family = Family::of(current)?;
    match family {
        Family::DeviceGray | Family::DeviceRGB | Family::DeviceCMYK => {
            let n = components(current)?;
            let comps = pop_numbers(vm, n)?;
            push_reals(vm, &convert(family, &comps, base)?)?;
            Ok(Progress::Terminal)
        }
        Family::Separation | Family::DeviceN => {
            if *stage == 1 {
                *stage = 0;
                return Ok(Progress::Next);
            }
            let names = colorant_names(current)?;
            if !uses_alternate(vm, &names) {
                pop_numbers(vm, names.len())?;
                push_reals(vm, &vec![0.0; base.components()])?;
                return Ok(Progress::Terminal);
            }
            let tint = element(current, 3)?;
            match &tint.value {
                Value::Function(f) => {
                    let inputs = pop_numbers(vm, names.len())?;
                    let outputs = f.evaluate(&inputs)?;
                    push_reals(vm, &outputs)?;
                    Ok(Progress::Next)
                }
                _ => {
                    *stage = 1;
                    vm.estack.check(1)?;
                    scope::enter(vm, Entry::Procedure(tint.clone()))?;
                    Ok(Progress::Delegated)
                }
            }
        }
        Family::Indexed => {
            if *stage == 1 {
                *stage = 0;
                return Ok(Progress::Next);
            }
            vm.ostack.check(1)?;
            let index = vm.ostack.top(0)?.as_number()?.trunc();
            let hival = hival(current)?;
            if index < 0.0 || index > hival as f64 {
                return Err(PsError::RangeCheck);
            }
            let index = index as usize;
            let ncomps = match alternate(current)? {
                Some(base_space) => components(&base_space)?,
                None => return Err(PsError::TypeCheck),
            };
            let cached = if outermost {
                vm.gstate.indexed_table.clone()
            } else {
                None
            };
            let lookup = element(current, 3)?;
            let table = match (cached, &lookup.value) {
                (Some(table), _) => table,
                (None, Value::Str(bytes)) => decode_lookup(bytes, hival as usize + 1, ncomps)?,
                (None, _) => {
                    // The index stays on the operand stack as the procedure's operand
                    *stage = 1;
                    vm.estack.check(1)?;
                    scope::enter(vm, Entry::Procedure(lookup.clone()))?;
                    return Ok(Progress::Delegated);
                }
            };
            let entry = table
                .get(index * ncomps..(index + 1) * ncomps)
                .ok_or(PsError::RangeCheck)?
                .to_vec();
            vm.ostack.pop()?;
            push_reals(vm, &entry)?;
            Ok(Progress::Next)
        }
    }
}

/* ===================== Device Colour Setters ===================== */

fn zsetgray(vm: &mut VM) -> OpResult {
    set_device_color(vm, BaseColor::Gray)
}

fn zsetrgbcolor(vm: &mut VM) -> OpResult {
    set_device_color(vm, BaseColor::Rgb)
}

fn zsetcmykcolor(vm: &mut VM) -> OpResult {
    set_device_color(vm, BaseColor::Cmyk)
}

/// Select the device space, then set the colour in it
///
/// Frame: `mark base stage %setdevicecolor_cont`. Selecting the space is a
/// full `setcolorspace`, which suspends with its own frame above this one.
fn set_device_color(vm: &mut VM, base: BaseColor) -> OpResult {
    let n = base.components();
    vm.ostack.check(n)?;
    for i in 0..n {
        let v = vm.ostack.top(i)?.as_number()?;
        vm.ostack.set(i, Obj::real(v.clamp(0.0, 1.0)))?;
    }
    vm.estack.check(4)?;
    scope::push_scope(
        vm,
        ScopeKind::Other,
        COLOUR_CLEANUP,
        vec![Obj::int(base.code()), Obj::int(0)],
    )?;
    scope::enter(vm, Entry::Step(SETDEVICECOLOR_CONT))?;
    Ok(Signal::Suspend)
}

fn setdevicecolor_cont(vm: &mut VM) -> OpResult {
    let mut stage = vm.estack.int(0)?;
    let base = BaseColor::from_code(vm.estack.int(1)?)?;
    vm.estack.check(1)?;
    scope::enter(vm, Entry::Step(SETDEVICECOLOR_CONT))?;
    loop {
        match stage {
            0 => {
                vm.estack.set_value(1, Obj::int(1))?;
                vm.ostack.room(1)?;
                vm.ostack.push(Obj::name(base.family().name()))?;
                return zsetcolorspace(vm);
            }
            1 => {
                zsetcolor(vm)?;
                stage = 2;
            }
            _ => {
                // The mark is left to pop on its own
                vm.estack.pop_n(3);
                return Ok(Signal::Done);
            }
        }
    }
}
