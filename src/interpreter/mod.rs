//! The control-flow engine
//!
//! Execution state lives in a [`VM`]: an operand stack, a segmented exec
//! stack of continuations, dictionaries and the colour state. The driver in
//! [`exec_loop`] pops one exec stack entry at a time; operators that need to
//! run PostScript push continuations and return instead of recursing.
//!
//! Structured control (loops, `stopped`, `.runandhide`, colour-space walks)
//! is built on marked scopes from [`scope`]. A scope is a mark carrying a
//! cleanup, followed by payload values and usually a continuation.

pub mod colorspace;
pub mod errors;
pub mod estack;
pub mod exec_loop;
pub mod input;
pub mod operators;
pub mod scope;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

pub use errors::{ErrorRecord, PsError};
pub use exec_loop::{run_until_done, step, Outcome};
pub use vm::VM;
