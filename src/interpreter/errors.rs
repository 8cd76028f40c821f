//! Interpreter errors
//!
//! Every error carries its PostScript name and the numeric code the original
//! engines use, so it can travel through the operand stack (`.quit`, unmatched
//! `exit`) and back.

use serde::Serialize;
use thiserror::Error;

use super::types::Obj;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PsError {
    #[error("unknownerror: {0}")]
    Unknown(String),

    #[error("execstackoverflow")]
    ExecStackOverflow,

    #[error("invalidaccess")]
    InvalidAccess,

    #[error("invalidexit")]
    InvalidExit,

    #[error("rangecheck")]
    RangeCheck,

    #[error("stackoverflow")]
    StackOverflow,

    #[error("stackunderflow")]
    StackUnderflow,

    #[error("syntaxerror: {0}")]
    SyntaxError(String),

    #[error("typecheck")]
    TypeCheck,

    #[error("undefined: {0}")]
    Undefined(String),

    #[error("undefinedresult")]
    UndefinedResult,

    #[error("unmatchedmark")]
    UnmatchedMark,

    /// Terminate the job; the code sits on the operand stack
    #[error("Quit")]
    Quit,

    /// Suspend the whole interpreter until more input arrives
    #[error("NeedInput")]
    NeedInput,
}

impl PsError {
    pub fn name(&self) -> &'static str {
        match self {
            PsError::Unknown(_) => "unknownerror",
            PsError::ExecStackOverflow => "execstackoverflow",
            PsError::InvalidAccess => "invalidaccess",
            PsError::InvalidExit => "invalidexit",
            PsError::RangeCheck => "rangecheck",
            PsError::StackOverflow => "stackoverflow",
            PsError::StackUnderflow => "stackunderflow",
            PsError::SyntaxError(_) => "syntaxerror",
            PsError::TypeCheck => "typecheck",
            PsError::Undefined(_) => "undefined",
            PsError::UndefinedResult => "undefinedresult",
            PsError::UnmatchedMark => "unmatchedmark",
            PsError::Quit => "Quit",
            PsError::NeedInput => "NeedInput",
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            PsError::Unknown(_) => -1,
            PsError::ExecStackOverflow => -5,
            PsError::InvalidAccess => -7,
            PsError::InvalidExit => -8,
            PsError::RangeCheck => -15,
            PsError::StackOverflow => -16,
            PsError::StackUnderflow => -17,
            PsError::SyntaxError(_) => -18,
            PsError::TypeCheck => -20,
            PsError::Undefined(_) => -21,
            PsError::UndefinedResult => -23,
            PsError::UnmatchedMark => -24,
            PsError::Quit => -101,
            PsError::NeedInput => -106,
        }
    }

    /// Interrupts bypass every scope on the exec stack
    pub fn is_interrupt(&self) -> bool {
        matches!(self, PsError::Quit | PsError::NeedInput)
    }
}

/// What the error trap remembers about the last error (the `$error` analogue)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub error: String,
    pub code: i64,
    pub command: Option<String>,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(err: &PsError, command: Option<&Obj>) -> Self {
        ErrorRecord {
            error: err.name().to_string(),
            code: err.code(),
            command: command.map(|c| c.to_string()),
            message: err.to_string(),
        }
    }
}
