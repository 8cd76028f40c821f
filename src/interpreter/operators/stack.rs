//! Support operators: operand stack, arithmetic, comparison, arrays,
//! dictionary access and attributes

use std::cmp::Ordering;

use crate::interpreter::errors::PsError;
use crate::interpreter::types::{Access, Obj, OpResult, Operator, Signal, Value};
use crate::interpreter::vm::VM;

pub const OPS: &[Operator] = &[
    Operator::new("pop", zpop),
    Operator::new("exch", zexch),
    Operator::new("dup", zdup),
    Operator::new("copy", zcopy),
    Operator::new("index", zindex),
    Operator::new("roll", zroll),
    Operator::new("clear", zclear),
    Operator::new("count", zcount),
    Operator::new("mark", zmark),
    Operator::new("[", zmark),
    Operator::new("]", zendarray),
    Operator::new("cleartomark", zcleartomark),
    Operator::new("counttomark", zcounttomark),
    Operator::new("add", zadd),
    Operator::new("sub", zsub),
    Operator::new("mul", zmul),
    Operator::new("div", zdiv),
    Operator::new("idiv", zidiv),
    Operator::new("mod", zmod),
    Operator::new("neg", zneg),
    Operator::new("abs", zabs),
    Operator::new("cvi", zcvi),
    Operator::new("cvr", zcvr),
    Operator::new("eq", zeq),
    Operator::new("ne", zne),
    Operator::new("lt", zlt),
    Operator::new("le", zle),
    Operator::new("gt", zgt),
    Operator::new("ge", zge),
    Operator::new("not", znot),
    Operator::new("and", zand),
    Operator::new("or", zor),
    Operator::new("def", zdef),
    Operator::new("load", zload),
    Operator::new("array", zarray),
    Operator::new("length", zlength),
    Operator::new("get", zget),
    Operator::new("put", zput),
    Operator::new("aload", zaload),
    Operator::new("cvx", zcvx),
    Operator::new("cvlit", zcvlit),
    Operator::new("xcheck", zxcheck),
    Operator::new("rcheck", zrcheck),
    Operator::new("wcheck", zwcheck),
    Operator::new("noaccess", znoaccess),
    Operator::new("readonly", zreadonly),
    Operator::new("executeonly", zexecuteonly),
    Operator::new("=", zprint),
    Operator::new("==", zprint_repr),
];

/* ===================== Operand Stack ===================== */

fn zpop(vm: &mut VM) -> OpResult {
    vm.ostack.pop()?;
    Ok(Signal::Done)
}

fn zexch(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let top = vm.ostack.top(0)?.clone();
    let below = vm.ostack.top(1)?.clone();
    vm.ostack.set(0, below)?;
    vm.ostack.set(1, top)?;
    Ok(Signal::Done)
}

fn zdup(vm: &mut VM) -> OpResult {
    let top = vm.ostack.top(0)?.clone();
    vm.ostack.push(top)?;
    Ok(Signal::Done)
}

fn count_operand(vm: &VM) -> Result<usize, PsError> {
    let n = vm.ostack.top(0)?.as_int()?;
    usize::try_from(n).map_err(|_| PsError::RangeCheck)
}

/// `<any1> ... <anyn> <n> copy <any1> ... <anyn> <any1> ... <anyn>`
fn zcopy(vm: &mut VM) -> OpResult {
    let n = count_operand(vm)?;
    vm.ostack.check(n + 1)?;
    vm.ostack.room(n.saturating_sub(1))?;
    vm.ostack.pop()?;
    let len = vm.ostack.len();
    let copied: Vec<Obj> = vm.ostack.as_slice()[len - n..].to_vec();
    for obj in copied {
        vm.ostack.push(obj)?;
    }
    Ok(Signal::Done)
}

fn zindex(vm: &mut VM) -> OpResult {
    let n = count_operand(vm)?;
    let obj = vm.ostack.top(n + 1).map_err(|_| PsError::RangeCheck)?.clone();
    vm.ostack.set(0, obj)?;
    Ok(Signal::Done)
}

/// `<any0> ... <anyn-1> <n> <j> roll`
fn zroll(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let j = vm.ostack.top(0)?.as_int()?;
    let n = vm.ostack.top(1)?.as_int()?;
    let n = usize::try_from(n).map_err(|_| PsError::RangeCheck)?;
    vm.ostack.check(n + 2)?;
    vm.ostack.pop_n(2)?;
    if n == 0 {
        return Ok(Signal::Done);
    }
    let len = vm.ostack.len();
    let mut window: Vec<Obj> = vm.ostack.as_slice()[len - n..].to_vec();
    let shift = j.rem_euclid(n as i64) as usize;
    window.rotate_right(shift);
    vm.ostack.truncate(len - n);
    for obj in window {
        vm.ostack.push(obj)?;
    }
    Ok(Signal::Done)
}

fn zclear(vm: &mut VM) -> OpResult {
    vm.ostack.clear();
    Ok(Signal::Done)
}

fn zcount(vm: &mut VM) -> OpResult {
    let n = vm.ostack.len() as i64;
    vm.ostack.push(Obj::int(n))?;
    Ok(Signal::Done)
}

fn zmark(vm: &mut VM) -> OpResult {
    vm.ostack.push(Obj::mark())?;
    Ok(Signal::Done)
}

fn count_to_mark(vm: &VM) -> Result<usize, PsError> {
    vm.ostack
        .as_slice()
        .iter()
        .rev()
        .position(|obj| matches!(obj.value, Value::Mark))
        .ok_or(PsError::UnmatchedMark)
}

fn zendarray(vm: &mut VM) -> OpResult {
    let n = count_to_mark(vm)?;
    let len = vm.ostack.len();
    let items = vm.ostack.as_slice()[len - n..].to_vec();
    vm.ostack.truncate(len - n - 1);
    vm.ostack.push(Obj::array(items))?;
    Ok(Signal::Done)
}

fn zcleartomark(vm: &mut VM) -> OpResult {
    let n = count_to_mark(vm)?;
    vm.ostack.pop_n(n + 1)?;
    Ok(Signal::Done)
}

fn zcounttomark(vm: &mut VM) -> OpResult {
    let n = count_to_mark(vm)?;
    vm.ostack.push(Obj::int(n as i64))?;
    Ok(Signal::Done)
}

/* ===================== Arithmetic ===================== */

fn binary_numbers(vm: &VM) -> Result<(Obj, Obj), PsError> {
    vm.ostack.check(2)?;
    let b = vm.ostack.top(0)?.clone();
    let a = vm.ostack.top(1)?.clone();
    if !a.is_number() || !b.is_number() {
        return Err(PsError::TypeCheck);
    }
    Ok((a, b))
}

/// Integer result when both operands are integers and it fits, real otherwise
fn arith(
    vm: &mut VM,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> OpResult {
    let (a, b) = binary_numbers(vm)?;
    let result = match (&a.value, &b.value) {
        (Value::Int(x), Value::Int(y)) => match int_op(*x, *y) {
            Some(r) => Obj::int(r),
            None => Obj::real(real_op(*x as f64, *y as f64)),
        },
        _ => Obj::real(real_op(a.as_number()?, b.as_number()?)),
    };
    vm.ostack.pop()?;
    vm.ostack.set(0, result)?;
    Ok(Signal::Done)
}

fn zadd(vm: &mut VM) -> OpResult {
    arith(vm, i64::checked_add, |x, y| x + y)
}

fn zsub(vm: &mut VM) -> OpResult {
    arith(vm, i64::checked_sub, |x, y| x - y)
}

fn zmul(vm: &mut VM) -> OpResult {
    arith(vm, i64::checked_mul, |x, y| x * y)
}

fn zdiv(vm: &mut VM) -> OpResult {
    let (a, b) = binary_numbers(vm)?;
    let divisor = b.as_number()?;
    if divisor == 0.0 {
        return Err(PsError::UndefinedResult);
    }
    let result = Obj::real(a.as_number()? / divisor);
    vm.ostack.pop()?;
    vm.ostack.set(0, result)?;
    Ok(Signal::Done)
}

fn int_pair(vm: &VM) -> Result<(i64, i64), PsError> {
    vm.ostack.check(2)?;
    let b = vm.ostack.top(0)?.as_int()?;
    let a = vm.ostack.top(1)?.as_int()?;
    if b == 0 {
        return Err(PsError::UndefinedResult);
    }
    Ok((a, b))
}

fn zidiv(vm: &mut VM) -> OpResult {
    let (a, b) = int_pair(vm)?;
    let q = a.checked_div(b).ok_or(PsError::UndefinedResult)?;
    vm.ostack.pop()?;
    vm.ostack.set(0, Obj::int(q))?;
    Ok(Signal::Done)
}

fn zmod(vm: &mut VM) -> OpResult {
    let (a, b) = int_pair(vm)?;
    let r = a.checked_rem(b).ok_or(PsError::UndefinedResult)?;
    vm.ostack.pop()?;
    vm.ostack.set(0, Obj::int(r))?;
    Ok(Signal::Done)
}

fn unary_number(vm: &mut VM, int_op: fn(i64) -> Option<i64>, real_op: fn(f64) -> f64) -> OpResult {
    let obj = vm.ostack.top(0)?.clone();
    let result = match obj.value {
        Value::Int(i) => match int_op(i) {
            Some(r) => Obj::int(r),
            None => Obj::real(real_op(i as f64)),
        },
        Value::Real(r) => Obj::real(real_op(r)),
        _ => return Err(PsError::TypeCheck),
    };
    vm.ostack.set(0, result)?;
    Ok(Signal::Done)
}

fn zneg(vm: &mut VM) -> OpResult {
    unary_number(vm, i64::checked_neg, |x| -x)
}

fn zabs(vm: &mut VM) -> OpResult {
    unary_number(vm, i64::checked_abs, f64::abs)
}

fn zcvi(vm: &mut VM) -> OpResult {
    let n = vm.ostack.top(0)?.as_number()?;
    if !n.is_finite() || n.abs() >= i64::MAX as f64 {
        return Err(PsError::RangeCheck);
    }
    vm.ostack.set(0, Obj::int(n.trunc() as i64))?;
    Ok(Signal::Done)
}

fn zcvr(vm: &mut VM) -> OpResult {
    let n = vm.ostack.top(0)?.as_number()?;
    vm.ostack.set(0, Obj::real(n))?;
    Ok(Signal::Done)
}

/* ===================== Comparison & Logic ===================== */

fn objects_equal(a: &Obj, b: &Obj) -> bool {
    match (&a.value, &b.value) {
        (Value::Int(_) | Value::Real(_), Value::Int(_) | Value::Real(_)) => {
            a.as_number().ok() == b.as_number().ok()
        }
        (Value::Name(_) | Value::Str(_), Value::Name(_) | Value::Str(_)) => {
            a.as_name_text().ok() == b.as_name_text().ok()
        }
        (x, y) => x == y,
    }
}

fn push_comparison(vm: &mut VM, result: bool) -> OpResult {
    vm.ostack.pop()?;
    vm.ostack.set(0, Obj::bool(result))?;
    Ok(Signal::Done)
}

fn zeq(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let eq = objects_equal(vm.ostack.top(1)?, vm.ostack.top(0)?);
    push_comparison(vm, eq)
}

fn zne(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let eq = objects_equal(vm.ostack.top(1)?, vm.ostack.top(0)?);
    push_comparison(vm, !eq)
}

fn compare(vm: &VM) -> Result<Ordering, PsError> {
    vm.ostack.check(2)?;
    let b = vm.ostack.top(0)?;
    let a = vm.ostack.top(1)?;
    match (&a.value, &b.value) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => {
            let (x, y) = (a.as_number()?, b.as_number()?);
            x.partial_cmp(&y).ok_or(PsError::UndefinedResult)
        }
    }
}

fn zlt(vm: &mut VM) -> OpResult {
    let ord = compare(vm)?;
    push_comparison(vm, ord == Ordering::Less)
}

fn zle(vm: &mut VM) -> OpResult {
    let ord = compare(vm)?;
    push_comparison(vm, ord != Ordering::Greater)
}

fn zgt(vm: &mut VM) -> OpResult {
    let ord = compare(vm)?;
    push_comparison(vm, ord == Ordering::Greater)
}

fn zge(vm: &mut VM) -> OpResult {
    let ord = compare(vm)?;
    push_comparison(vm, ord != Ordering::Less)
}

fn znot(vm: &mut VM) -> OpResult {
    let obj = vm.ostack.top(0)?.clone();
    let result = match obj.value {
        Value::Bool(b) => Obj::bool(!b),
        Value::Int(i) => Obj::int(!i),
        _ => return Err(PsError::TypeCheck),
    };
    vm.ostack.set(0, result)?;
    Ok(Signal::Done)
}

fn logic(vm: &mut VM, bool_op: fn(bool, bool) -> bool, int_op: fn(i64, i64) -> i64) -> OpResult {
    vm.ostack.check(2)?;
    let b = vm.ostack.top(0)?.clone();
    let a = vm.ostack.top(1)?.clone();
    let result = match (a.value, b.value) {
        (Value::Bool(x), Value::Bool(y)) => Obj::bool(bool_op(x, y)),
        (Value::Int(x), Value::Int(y)) => Obj::int(int_op(x, y)),
        _ => return Err(PsError::TypeCheck),
    };
    vm.ostack.pop()?;
    vm.ostack.set(0, result)?;
    Ok(Signal::Done)
}

fn zand(vm: &mut VM) -> OpResult {
    logic(vm, |x, y| x && y, |x, y| x & y)
}

fn zor(vm: &mut VM) -> OpResult {
    logic(vm, |x, y| x || y, |x, y| x | y)
}

/* ===================== Dictionaries ===================== */

/// `<key> <value> def -`
fn zdef(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let value = vm.ostack.top(0)?.clone();
    let key = vm.ostack.top(1)?.as_name_text()?;
    vm.ostack.pop_n(2)?;
    vm.define(&key, value);
    Ok(Signal::Done)
}

fn zload(vm: &mut VM) -> OpResult {
    let key = vm.ostack.top(0)?.as_name_text()?;
    let value = vm.lookup(&key).ok_or(PsError::Undefined(key))?;
    vm.ostack.set(0, value)?;
    Ok(Signal::Done)
}

/* ===================== Arrays ===================== */

fn zarray(vm: &mut VM) -> OpResult {
    let n = count_operand(vm)?;
    vm.ostack.set(0, Obj::array(vec![Obj::null(); n]))?;
    Ok(Signal::Done)
}

fn zlength(vm: &mut VM) -> OpResult {
    let obj = vm.ostack.top(0)?.clone();
    let len = match &obj.value {
        Value::Array(arr) => arr.len(),
        Value::Str(s) => s.len(),
        Value::Name(n) => n.len(),
        _ => return Err(PsError::TypeCheck),
    };
    if obj.uses_access() && !obj.attrs.can_read() {
        return Err(PsError::InvalidAccess);
    }
    vm.ostack.set(0, Obj::int(len as i64))?;
    Ok(Signal::Done)
}

fn zget(vm: &mut VM) -> OpResult {
    vm.ostack.check(2)?;
    let index = vm.ostack.top(0)?.as_int()?;
    let container = vm.ostack.top(1)?.clone();
    if container.uses_access() && !container.attrs.can_read() {
        return Err(PsError::InvalidAccess);
    }
    let index = usize::try_from(index).map_err(|_| PsError::RangeCheck)?;
    let element = match &container.value {
        Value::Array(arr) => arr.get(index).ok_or(PsError::RangeCheck)?,
        Value::Str(s) => Obj::int(*s.get(index).ok_or(PsError::RangeCheck)? as i64),
        _ => return Err(PsError::TypeCheck),
    };
    vm.ostack.pop()?;
    vm.ostack.set(0, element)?;
    Ok(Signal::Done)
}

fn zput(vm: &mut VM) -> OpResult {
    vm.ostack.check(3)?;
    let value = vm.ostack.top(0)?.clone();
    let index = vm.ostack.top(1)?.as_int()?;
    let container = vm.ostack.top(2)?.clone();
    let arr = container.as_array()?;
    if !container.attrs.can_write() {
        return Err(PsError::InvalidAccess);
    }
    let index = usize::try_from(index).map_err(|_| PsError::RangeCheck)?;
    if !arr.set(index, value) {
        return Err(PsError::RangeCheck);
    }
    vm.ostack.pop_n(3)?;
    Ok(Signal::Done)
}

fn zaload(vm: &mut VM) -> OpResult {
    let container = vm.ostack.top(0)?.clone();
    let arr = container.as_array()?;
    if !container.attrs.can_read() {
        return Err(PsError::InvalidAccess);
    }
    vm.ostack.room(arr.len())?;
    vm.ostack.pop()?;
    for item in arr.to_vec() {
        vm.ostack.push(item)?;
    }
    vm.ostack.push(container)?;
    Ok(Signal::Done)
}

/* ===================== Attributes ===================== */

fn zcvx(vm: &mut VM) -> OpResult {
    let obj = vm.ostack.top(0)?.clone();
    vm.ostack.set(0, obj.executable())?;
    Ok(Signal::Done)
}

fn zcvlit(vm: &mut VM) -> OpResult {
    let obj = vm.ostack.top(0)?.clone();
    vm.ostack.set(0, obj.cvlit())?;
    Ok(Signal::Done)
}

fn zxcheck(vm: &mut VM) -> OpResult {
    let executable = vm.ostack.top(0)?.attrs.executable;
    vm.ostack.set(0, Obj::bool(executable))?;
    Ok(Signal::Done)
}

fn access_check(vm: &mut VM, check: fn(&Obj) -> bool) -> OpResult {
    let obj = vm.ostack.top(0)?.clone();
    if !obj.uses_access() {
        return Err(PsError::TypeCheck);
    }
    vm.ostack.set(0, Obj::bool(check(&obj)))?;
    Ok(Signal::Done)
}

fn zrcheck(vm: &mut VM) -> OpResult {
    access_check(vm, |obj| obj.attrs.can_read())
}

fn zwcheck(vm: &mut VM) -> OpResult {
    access_check(vm, |obj| obj.attrs.can_write())
}

/// Access only ever decreases
fn restrict(vm: &mut VM, access: Access) -> OpResult {
    let mut obj = vm.ostack.top(0)?.clone();
    if !obj.uses_access() {
        return Err(PsError::TypeCheck);
    }
    obj.attrs.access = obj.attrs.access.min(access);
    vm.ostack.set(0, obj)?;
    Ok(Signal::Done)
}

fn znoaccess(vm: &mut VM) -> OpResult {
    restrict(vm, Access::None)
}

fn zreadonly(vm: &mut VM) -> OpResult {
    restrict(vm, Access::ReadOnly)
}

fn zexecuteonly(vm: &mut VM) -> OpResult {
    restrict(vm, Access::ExecuteOnly)
}

/* ===================== Output ===================== */

/// `<any> =`: strings and names as their text
fn zprint(vm: &mut VM) -> OpResult {
    let obj = vm.ostack.pop()?;
    let text = match &obj.value {
        Value::Str(s) => String::from_utf8_lossy(s).into_owned(),
        Value::Name(n) => n.to_string(),
        _ => obj.to_string(),
    };
    vm.output.push_str(&text);
    vm.output.push('\n');
    Ok(Signal::Done)
}

/// `<any> ==`
fn zprint_repr(vm: &mut VM) -> OpResult {
    let obj = vm.ostack.pop()?;
    vm.output.push_str(&obj.to_string());
    vm.output.push('\n');
    Ok(Signal::Done)
}
