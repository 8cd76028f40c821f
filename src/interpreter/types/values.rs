//! Runtime values
//!
//! Every object the interpreter handles is an [`Obj`]: a [`Value`] plus its
//! [`Attrs`] (executable bit and access level). Composite values share their
//! storage, so copying an `Obj` never copies an array body.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::entry::Operator;
use crate::interpreter::colorspace::function::Function;
use crate::interpreter::errors::PsError;
use crate::interpreter::input::Input;

/* ===================== Attributes ===================== */

/// Access level of a composite object, ordered from most to least restricted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    None,
    ExecuteOnly,
    ReadOnly,
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attrs {
    pub executable: bool,
    pub access: Access,
}

impl Attrs {
    pub const LITERAL: Attrs = Attrs {
        executable: false,
        access: Access::Unlimited,
    };

    pub const EXECUTABLE: Attrs = Attrs {
        executable: true,
        access: Access::Unlimited,
    };

    /// Attributes with every access bit and the executable bit cleared
    pub const HIDDEN: Attrs = Attrs {
        executable: false,
        access: Access::None,
    };

    pub fn can_read(self) -> bool {
        self.access >= Access::ReadOnly
    }

    pub fn can_write(self) -> bool {
        self.access == Access::Unlimited
    }

    pub fn can_execute(self) -> bool {
        self.access >= Access::ExecuteOnly
    }

    /// Pack into an integer so the attributes can ride on the exec stack as payload
    pub fn to_bits(self) -> i64 {
        let access = match self.access {
            Access::None => 0,
            Access::ExecuteOnly => 1,
            Access::ReadOnly => 2,
            Access::Unlimited => 3,
        };
        access | if self.executable { 4 } else { 0 }
    }

    pub fn from_bits(bits: i64) -> Option<Attrs> {
        let access = match bits & 3 {
            0 => Access::None,
            1 => Access::ExecuteOnly,
            2 => Access::ReadOnly,
            _ => Access::Unlimited,
        };
        if !(0..8).contains(&bits) {
            return None;
        }
        Some(Attrs {
            executable: bits & 4 != 0,
            access,
        })
    }
}

/* ===================== Arrays ===================== */

/// A view onto shared array storage
///
/// Subarrays (procedure tails, `execstack` results) share the parent's body.
#[derive(Clone)]
pub struct ArrayRef {
    items: Rc<RefCell<Vec<Obj>>>,
    start: usize,
    len: usize,
}

impl ArrayRef {
    pub fn new(items: Vec<Obj>) -> Self {
        let len = items.len();
        ArrayRef {
            items: Rc::new(RefCell::new(items)),
            start: 0,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<Obj> {
        if index >= self.len {
            return None;
        }
        self.items.borrow().get(self.start + index).cloned()
    }

    /// Store `obj` at `index`; returns false when out of range
    pub fn set(&self, index: usize, obj: Obj) -> bool {
        if index >= self.len {
            return false;
        }
        match self.items.borrow_mut().get_mut(self.start + index) {
            Some(slot) => {
                *slot = obj;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Obj> {
        self.items.borrow()[self.start..self.start + self.len].to_vec()
    }

    pub fn subarray(&self, start: usize, len: usize) -> Option<ArrayRef> {
        if start.checked_add(len)? > self.len {
            return None;
        }
        Some(ArrayRef {
            items: Rc::clone(&self.items),
            start: self.start + start,
            len,
        })
    }

    /// First element and the remaining tail
    pub fn split_first(&self) -> Option<(Obj, ArrayRef)> {
        let first = self.get(0)?;
        let rest = self.subarray(1, self.len - 1)?;
        Some((first, rest))
    }
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.items, &other.items) && self.start == other.start && self.len == other.len
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

/* ===================== Values ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Name(Rc<str>),
    Str(Rc<[u8]>),
    Array(ArrayRef),
    Mark,
    Operator(Operator),
    Input(Input),
    Function(Rc<Function>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obj {
    pub value: Value,
    pub attrs: Attrs,
}

impl Obj {
    pub fn new(value: Value, attrs: Attrs) -> Self {
        Obj { value, attrs }
    }

    pub fn literal(value: Value) -> Self {
        Obj::new(value, Attrs::LITERAL)
    }

    pub fn null() -> Self {
        Obj::literal(Value::Null)
    }

    /// The executable null that stands in for a mark in `execstack` output
    pub fn exec_null() -> Self {
        Obj::new(Value::Null, Attrs::EXECUTABLE)
    }

    pub fn int(i: i64) -> Self {
        Obj::literal(Value::Int(i))
    }

    pub fn real(r: f64) -> Self {
        Obj::literal(Value::Real(r))
    }

    pub fn bool(b: bool) -> Self {
        Obj::literal(Value::Bool(b))
    }

    pub fn mark() -> Self {
        Obj::literal(Value::Mark)
    }

    pub fn name(name: &str) -> Self {
        Obj::literal(Value::Name(Rc::from(name)))
    }

    pub fn exec_name(name: &str) -> Self {
        Obj::new(Value::Name(Rc::from(name)), Attrs::EXECUTABLE)
    }

    pub fn string(bytes: &[u8]) -> Self {
        Obj::literal(Value::Str(Rc::from(bytes)))
    }

    pub fn array(items: Vec<Obj>) -> Self {
        Obj::literal(Value::Array(ArrayRef::new(items)))
    }

    pub fn procedure(items: Vec<Obj>) -> Self {
        Obj::new(Value::Array(ArrayRef::new(items)), Attrs::EXECUTABLE)
    }

    pub fn operator(op: Operator) -> Self {
        let executable = !op.is_internal();
        Obj::new(
            Value::Operator(op),
            Attrs {
                executable,
                access: Access::ExecuteOnly,
            },
        )
    }

    pub fn function(function: Function) -> Self {
        Obj::literal(Value::Function(Rc::new(function)))
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn executable(mut self) -> Self {
        self.attrs.executable = true;
        self
    }

    pub fn cvlit(mut self) -> Self {
        self.attrs.executable = false;
        self
    }

    /// Composite values whose access attribute is enforced
    pub fn uses_access(&self) -> bool {
        matches!(
            self.value,
            Value::Array(_) | Value::Str(_) | Value::Input(_)
        )
    }

    /// An executable array, as accepted by `if`, `for`, `repeat` and friends
    pub fn is_proc(&self) -> bool {
        matches!(self.value, Value::Array(_)) && self.attrs.executable
    }

    pub fn is_number(&self) -> bool {
        matches!(self.value, Value::Int(_) | Value::Real(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self.value {
            Value::Null => "nulltype",
            Value::Bool(_) => "booleantype",
            Value::Int(_) => "integertype",
            Value::Real(_) => "realtype",
            Value::Name(_) => "nametype",
            Value::Str(_) => "stringtype",
            Value::Array(_) => "arraytype",
            Value::Mark => "marktype",
            Value::Operator(_) => "operatortype",
            Value::Input(_) => "filetype",
            Value::Function(_) => "functiontype",
        }
    }

    pub fn as_int(&self) -> Result<i64, PsError> {
        match self.value {
            Value::Int(i) => Ok(i),
            _ => Err(PsError::TypeCheck),
        }
    }

    pub fn as_number(&self) -> Result<f64, PsError> {
        match self.value {
            Value::Int(i) => Ok(i as f64),
            Value::Real(r) => Ok(r),
            _ => Err(PsError::TypeCheck),
        }
    }

    pub fn as_bool(&self) -> Result<bool, PsError> {
        match self.value {
            Value::Bool(b) => Ok(b),
            _ => Err(PsError::TypeCheck),
        }
    }

    pub fn as_array(&self) -> Result<&ArrayRef, PsError> {
        match &self.value {
            Value::Array(arr) => Ok(arr),
            _ => Err(PsError::TypeCheck),
        }
    }

    /// Name text for names and strings, as used by colour-space families
    pub fn as_name_text(&self) -> Result<String, PsError> {
        match &self.value {
            Value::Name(n) => Ok(n.to_string()),
            Value::Str(s) => Ok(String::from_utf8_lossy(s).into_owned()),
            _ => Err(PsError::TypeCheck),
        }
    }
}

/* ===================== Rendering ===================== */

fn fmt_real(r: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if r.is_finite() && r.fract() == 0.0 && r.abs() < 1e15 {
        write!(f, "{:.1}", r)
    } else {
        write!(f, "{}", r)
    }
}

/// Renders objects the way `==` prints them
impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => fmt_real(*r, f),
            Value::Name(n) if self.attrs.executable => write!(f, "{}", n),
            Value::Name(n) => write!(f, "/{}", n),
            Value::Str(s) => write!(f, "({})", String::from_utf8_lossy(s)),
            Value::Array(arr) => {
                if !self.attrs.can_read() {
                    return write!(f, "-array-");
                }
                let (open, close) = if self.attrs.executable {
                    ("{", "}")
                } else {
                    ("[", "]")
                };
                write!(f, "{}", open)?;
                for (i, item) in arr.to_vec().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "{}", close)
            }
            Value::Mark => write!(f, "-mark-"),
            Value::Operator(op) => write!(f, "--{}--", op.name),
            Value::Input(_) => write!(f, "-file-"),
            Value::Function(_) => write!(f, "-function-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attrs_bits_restore_exactly() {
        let attrs = Attrs {
            executable: true,
            access: Access::ReadOnly,
        };
        assert_eq!(Attrs::from_bits(attrs.to_bits()), Some(attrs));
        assert_eq!(Attrs::from_bits(Attrs::HIDDEN.to_bits()), Some(Attrs::HIDDEN));
        assert_eq!(Attrs::from_bits(99), None);
    }

    #[test]
    fn test_subarray_shares_storage() {
        let arr = ArrayRef::new(vec![Obj::int(1), Obj::int(2), Obj::int(3)]);
        let tail = arr.subarray(1, 2).unwrap();
        assert!(tail.set(0, Obj::int(20)));
        assert_eq!(arr.get(1), Some(Obj::int(20)));
        assert!(arr.subarray(2, 2).is_none());
    }

    #[test]
    fn test_display_matches_double_equals() {
        let proc = Obj::procedure(vec![Obj::int(1), Obj::real(2.5), Obj::exec_name("add")]);
        assert_eq!(proc.to_string(), "{1 2.5 add}");
        assert_eq!(Obj::name("foo").to_string(), "/foo");
        assert_eq!(Obj::real(3.0).to_string(), "3.0");
        assert_eq!(Obj::string(b"hi").to_string(), "(hi)");
    }
}
