//! pscontrol: a PostScript control-flow engine
//!
//! The interpreter runs programs on an explicit exec stack of continuations,
//! so loops, `stopped` and operators that call back into PostScript never
//! recurse on the host stack and a job can suspend for input at any point.

pub mod cli;
pub mod config;
pub mod interpreter;
pub mod reader;

pub use config::Config;
pub use interpreter::{run_until_done, Outcome, VM};
