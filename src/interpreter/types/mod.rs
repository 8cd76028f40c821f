//! Type definitions for the interpreter
//!
//! - `values`: objects, attributes and shared arrays
//! - `entry`: exec stack entries, marks and native operators

pub mod entry;
pub mod values;

pub use entry::{Cleanup, CleanupFn, Entry, Mark, OpFn, OpResult, Operator, ScopeKind, Signal};
pub use values::{Access, ArrayRef, Attrs, Obj, Value};
