//! Interpreter state
//!
//! The [`VM`] owns the operand stack, the exec (continuation) stack, the
//! dictionaries and the graphics state. All execution state lives here, so a
//! suspended job resumes by calling the driver again.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;
use uuid::Uuid;

use super::colorspace::GState;
use super::errors::{ErrorRecord, PsError};
use super::estack::ExecStack;
use super::exec_loop::{self, Outcome};
use super::input::Input;
use super::operators;
use super::types::{Attrs, Entry, Obj, Value};
use crate::config::Config;

/* ===================== Operand Stack ===================== */

#[derive(Debug)]
pub struct OperandStack {
    items: Vec<Obj>,
    max_depth: usize,
}

impl OperandStack {
    pub fn new(max_depth: usize) -> Self {
        OperandStack {
            items: Vec::new(),
            max_depth,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fail with `stackunderflow` unless `n` operands are present
    pub fn check(&self, n: usize) -> Result<(), PsError> {
        if self.items.len() < n {
            return Err(PsError::StackUnderflow);
        }
        Ok(())
    }

    /// Fail with `stackoverflow` unless `n` more operands fit
    pub fn room(&self, n: usize) -> Result<(), PsError> {
        if self.items.len() + n > self.max_depth {
            return Err(PsError::StackOverflow);
        }
        Ok(())
    }

    pub fn push(&mut self, obj: Obj) -> Result<(), PsError> {
        self.room(1)?;
        self.items.push(obj);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Obj, PsError> {
        self.items.pop().ok_or(PsError::StackUnderflow)
    }

    pub fn pop_n(&mut self, n: usize) -> Result<(), PsError> {
        self.check(n)?;
        self.items.truncate(self.items.len() - n);
        Ok(())
    }

    /// Operand `index` positions below the top (0 is the top)
    pub fn top(&self, index: usize) -> Result<&Obj, PsError> {
        self.items
            .len()
            .checked_sub(index + 1)
            .and_then(|at| self.items.get(at))
            .ok_or(PsError::StackUnderflow)
    }

    pub fn set(&mut self, index: usize, obj: Obj) -> Result<(), PsError> {
        let at = self
            .items
            .len()
            .checked_sub(index + 1)
            .ok_or(PsError::StackUnderflow)?;
        self.items[at] = obj;
        Ok(())
    }

    pub fn as_slice(&self) -> &[Obj] {
        &self.items
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/* ===================== Statistics ===================== */

#[derive(Debug, Default, Clone)]
pub struct ExecStats {
    /// Dispatches per continuation name
    pub steps: HashMap<&'static str, usize>,
    pub dispatched: u64,
}

impl ExecStats {
    pub fn record_step(&mut self, name: &'static str) {
        *self.steps.entry(name).or_insert(0) += 1;
    }

    pub fn step_count(&self, name: &str) -> usize {
        self.steps.get(name).copied().unwrap_or(0)
    }
}

/* ===================== VM ===================== */

pub struct VM {
    pub ostack: OperandStack,
    pub estack: ExecStack,
    pub systemdict: HashMap<Rc<str>, Obj>,
    pub userdict: HashMap<Rc<str>, Obj>,
    pub gstate: GState,
    pub config: Config,
    pub stats: ExecStats,
    pub last_error: Option<ErrorRecord>,
    /// Text written by `=` and `==`
    pub output: String,
    pub job_id: Uuid,
    /// Object being executed, reported with errors
    pub(crate) command: Option<Obj>,
    input_cache: Option<Input>,
}

impl Default for VM {
    fn default() -> Self {
        VM::new(Config::default())
    }
}

impl VM {
    pub fn new(config: Config) -> Self {
        let mut vm = VM {
            ostack: OperandStack::new(config.engine.max_operand_depth),
            estack: ExecStack::new(
                config.engine.exec_segment_size,
                config.engine.max_exec_depth,
            ),
            systemdict: HashMap::new(),
            userdict: HashMap::new(),
            gstate: GState::default(),
            config,
            stats: ExecStats::default(),
            last_error: None,
            output: String::new(),
            job_id: Uuid::new_v4(),
            command: None,
            input_cache: None,
        };
        operators::register(&mut vm);
        vm
    }

    /* ===================== Dictionaries ===================== */

    pub fn lookup(&self, name: &str) -> Option<Obj> {
        self.userdict
            .get(name)
            .or_else(|| self.systemdict.get(name))
            .cloned()
    }

    pub fn define(&mut self, name: &str, obj: Obj) {
        self.userdict.insert(Rc::from(name), obj);
    }

    /* ===================== Jobs ===================== */

    /// Start a fresh job id once the previous job has left the exec stack
    pub fn begin_job(&mut self) {
        if self.estack.is_empty() {
            self.job_id = Uuid::new_v4();
            debug!(job = %self.job_id, "job started");
        }
    }

    /// Push an open input stream as the next thing to execute
    pub fn open_input(&mut self, name: &str) -> Result<Input, PsError> {
        let input = Input::new(name);
        self.push_input(input.clone())?;
        Ok(input)
    }

    pub fn push_input(&mut self, input: Input) -> Result<(), PsError> {
        let obj = Obj::new(Value::Input(input), Attrs::EXECUTABLE);
        self.estack.push(Entry::Procedure(obj))?;
        self.check_input_cache();
        Ok(())
    }

    /// Run a complete program to the end of its job
    pub fn run_source(&mut self, source: &str) -> Outcome {
        self.begin_job();
        if let Err(err) = self.push_input(Input::from_source("%source", source)) {
            let record = ErrorRecord::new(&err, None);
            self.last_error = Some(record.clone());
            return Outcome::Aborted(record);
        }
        exec_loop::run_until_done(self)
    }

    /* ===================== Current Input ===================== */

    /// Remember the input on top of the exec stack, if that is what is there
    pub fn check_input_cache(&mut self) {
        if let Some(Entry::Procedure(obj)) = self.estack.top() {
            if let Value::Input(input) = &obj.value {
                if obj.attrs.executable {
                    self.input_cache = Some(input.clone());
                }
            }
        }
    }

    pub fn clear_input_cache(&mut self) {
        self.input_cache = None;
    }

    /// Re-derive the cached input from the exec stack
    pub fn sync_input_cache(&mut self) {
        self.input_cache = self.estack.iter_from_top().find_map(|entry| match entry {
            Entry::Procedure(obj) if obj.attrs.executable => match &obj.value {
                Value::Input(input) => Some(input.clone()),
                _ => None,
            },
            _ => None,
        });
    }

    /// Innermost input being executed
    pub fn current_input(&mut self) -> Option<Input> {
        if self.input_cache.is_none() {
            self.sync_input_cache();
        }
        self.input_cache.clone()
    }
}
