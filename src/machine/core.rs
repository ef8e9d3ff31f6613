// src/machine/core.rs
//! Core of the Horn abstract machine.
//!
//! The machine executes the indexed code store produced by the compiler. It
//! owns the register file, the binding store, the environment stack, and the
//! choice-point stack, and enumerates solutions lazily: each call to
//! [`Machine::next_solution`] drives execution until a `halt` yields a
//! solution or backtracking exhausts the choice points.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::compiler::clause::compile_query;
use crate::compiler::index::{Code, CompiledProgram, Index};
use crate::machine::cell::Cell;
use crate::machine::choice_point::{ChoicePoint, InstrAddr, MachineState, StructCursor};
use crate::machine::error_handling::MachineError;
use crate::machine::instruction::Addr;
use crate::machine::term::{Functor, Struct, Term};

/// One answer to a query: the query's variables in source order, each mapped
/// to the (possibly partially ground) term it was bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub bindings: Vec<(String, Term)>,
}

impl Solution {
    /// Looks up the binding of a query variable by name.
    pub fn get(&self, name: &str) -> Option<&Term> {
        self.bindings
            .iter()
            .find(|(var, _)| var == name)
            .map(|(_, term)| term)
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bindings.is_empty() {
            return write!(f, "true");
        }
        write!(f, "{{")?;
        for (i, (var, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", var, term)?;
        }
        write!(f, "}}")
    }
}

/// The Horn abstract machine.
#[derive(Debug)]
pub struct Machine {
    /// First-argument index per predicate.
    pub indices: HashMap<Functor, Vec<Index>>,
    /// Query variables with their environment slot, in source order.
    pub query_vars: Vec<(String, usize)>,
    /// Ref bindings, keyed by ref id. Undone through the trail.
    pub bindings: HashMap<usize, Cell>,
    /// Id of the most recently created ref. Monotonic for the whole run, so
    /// refs discarded by backtracking never collide with fresh ones.
    pub top_ref_id: usize,
    /// Mutable machine state, snapshotted by choice points.
    pub state: MachineState,
    /// Topmost choice point.
    pub choice: Option<Box<ChoicePoint>>,
    /// Instructions executed so far.
    pub iters: u64,
    /// Optional iteration budget; exceeding it is a hard error.
    pub max_iters: Option<u64>,
    exhausted: bool,
}

impl Machine {
    /// Prepares a machine to answer `query` against a compiled program.
    pub fn new(program: &CompiledProgram, query: Vec<Struct>) -> Machine {
        let (query_code, query_vars) = compile_query(&query);
        let num_regs = program.num_regs().max(query_code.num_regs);
        let functor = query_code.functor.clone();
        let codes = Rc::new(vec![Rc::new(query_code)]);
        Machine {
            indices: program.indices.clone(),
            query_vars,
            bindings: HashMap::new(),
            top_ref_id: 0,
            state: MachineState {
                instr_ptr: InstrAddr::new(functor, codes),
                regs: vec![None; num_regs],
                cursor: StructCursor::invalid(),
                continuation: None,
                env: None,
                depth: 0,
            },
            choice: None,
            iters: 0,
            max_iters: None,
            exhausted: false,
        }
    }

    /// Sets a hard budget on executed instructions.
    pub fn with_max_iters(mut self, max_iters: u64) -> Machine {
        self.max_iters = Some(max_iters);
        self
    }

    /// Drives execution until the next solution, the end of the enumeration
    /// (`Ok(None)`), or an internal error.
    pub fn next_solution(&mut self) -> Result<Option<Solution>, MachineError> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            if let Some(max) = self.max_iters {
                if self.iters >= max {
                    return Err(MachineError::MaxItersReached(max));
                }
            }
            self.iters += 1;
            let instr = self.state.instr_ptr.curr_instr()?.clone();
            debug!(
                "{}[{}]#{}: {}",
                self.state.instr_ptr.functor,
                self.state.instr_ptr.order,
                self.state.instr_ptr.instr,
                instr
            );
            match self.execute(&instr) {
                Ok(None) => {}
                Ok(Some(solution)) => {
                    // Force backtracking so the next call resumes the search
                    // at the most recent alternative.
                    if !self.backtrack_or_exhaust()? {
                        self.exhausted = true;
                    }
                    return Ok(Some(solution));
                }
                Err(MachineError::UnificationFailed(msg)) => {
                    debug!("fail: {}", msg);
                    if !self.backtrack_or_exhaust()? {
                        self.exhausted = true;
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Consumes the machine into a lazy solution iterator.
    pub fn solutions(self) -> Solutions {
        Solutions { machine: self, done: false }
    }

    /// Moves the instruction pointer to the next instruction.
    pub(crate) fn forward(&mut self) -> Result<(), MachineError> {
        self.state.instr_ptr = self.state.instr_ptr.step()?;
        Ok(())
    }

    /// Restores the most recent choice point, advancing it to its next
    /// alternative; pops it if that alternative is the last one. Returns
    /// `Ok(false)` when no choice point remains.
    fn backtrack_or_exhaust(&mut self) -> Result<bool, MachineError> {
        if self.choice.is_none() {
            return Ok(false);
        }
        self.unwind_trail();
        let choice = self.choice.as_mut().expect("choice point present");
        choice.state.instr_ptr = choice.state.instr_ptr.next_clause()?;
        if choice.state.instr_ptr.is_last_clause() {
            let choice = self.choice.take().expect("choice point present");
            self.state = choice.state;
            self.choice = choice.prev;
        } else {
            self.state = choice.state.clone();
        }
        debug!("backtracked to {}[{}]", self.state.instr_ptr.functor, self.state.instr_ptr.order);
        Ok(true)
    }

    /// Predicate dispatch: selects the applicable codes through the
    /// first-argument index, pushes a choice point if more than one applies,
    /// and jumps to the first. No applicable code is a failure.
    pub(crate) fn trampoline(&mut self, functor: &Functor) -> Result<(), MachineError> {
        let first_arg = self.state.regs.first().and_then(|slot| slot.clone());
        let codes = self.indexed_codes(functor, first_arg);
        if codes.is_empty() {
            return Err(MachineError::UnificationFailed(format!(
                "no matching clause for {}",
                functor
            )));
        }
        let multiple = codes.len() > 1;
        self.state.instr_ptr = InstrAddr::new(functor.clone(), Rc::new(codes));
        if multiple {
            self.choice = Some(Box::new(ChoicePoint {
                state: self.state.clone(),
                top_ref_id: self.top_ref_id,
                trail: Vec::new(),
                prev: self.choice.take(),
            }));
        }
        Ok(())
    }

    /// Consults the index blocks for `functor`, dereferencing the first
    /// argument at call time (so a bound variable discriminates like a
    /// literal).
    fn indexed_codes(&self, functor: &Functor, first_arg: Option<Cell>) -> Vec<Rc<Code>> {
        let indices = match self.indices.get(functor) {
            Some(indices) => indices,
            None => return Vec::new(),
        };
        let cell = first_arg.map(|cell| self.deref(&cell));
        let mut codes = Vec::new();
        for index in indices {
            match &cell {
                None | Some(Cell::Ref(_)) => codes.extend(index.by_var.iter().cloned()),
                _ if index.is_var => codes.extend(index.by_var.iter().cloned()),
                Some(Cell::Atom(name)) => {
                    if let Some(selected) = index.by_atom.get(name) {
                        codes.extend(selected.iter().cloned());
                    }
                }
                Some(Cell::Struct(s)) => {
                    if let Some(selected) = index.by_struct.get(&s.functor()) {
                        codes.extend(selected.iter().cloned());
                    }
                }
            }
        }
        codes
    }

    /// Creates a fresh unbound ref.
    pub(crate) fn new_ref(&mut self) -> Cell {
        self.top_ref_id += 1;
        Cell::Ref(self.top_ref_id)
    }

    /// Reads an address: register, environment slot, or atom literal.
    pub(crate) fn get(&self, addr: &Addr) -> Result<Cell, MachineError> {
        match addr {
            Addr::Reg(i) => self.get_reg(*i),
            Addr::Stack(i) => self.get_stack(*i),
            Addr::Atom(name) => Ok(Cell::Atom(name.clone())),
        }
    }

    /// Writes an address. Atom addresses are read-only.
    pub(crate) fn set(&mut self, addr: &Addr, cell: Cell) -> Result<(), MachineError> {
        match addr {
            Addr::Reg(i) => self.set_reg(*i, cell),
            Addr::Stack(i) => self.set_stack(*i, cell),
            Addr::Atom(name) => Err(MachineError::ReadOnlyAddress(name.clone())),
        }
    }

    pub(crate) fn get_reg(&self, reg: usize) -> Result<Cell, MachineError> {
        match self.state.regs.get(reg) {
            Some(Some(cell)) => Ok(cell.clone()),
            Some(None) => Err(MachineError::UninitializedRegister(reg)),
            None => Err(MachineError::RegisterOutOfBounds(reg)),
        }
    }

    pub(crate) fn set_reg(&mut self, reg: usize, cell: Cell) -> Result<(), MachineError> {
        match self.state.regs.get_mut(reg) {
            Some(slot) => {
                *slot = Some(cell);
                Ok(())
            }
            None => Err(MachineError::RegisterOutOfBounds(reg)),
        }
    }

    fn get_stack(&self, index: usize) -> Result<Cell, MachineError> {
        let env = self.state.env.as_ref().ok_or(MachineError::EnvironmentMissing)?;
        match env.slots.get(index) {
            Some(Some(cell)) => Ok(cell.clone()),
            Some(None) => Err(MachineError::UninitializedSlot(index)),
            None => Err(MachineError::SlotOutOfBounds(index)),
        }
    }

    fn set_stack(&mut self, index: usize, cell: Cell) -> Result<(), MachineError> {
        let env = self.state.env.as_mut().ok_or(MachineError::EnvironmentMissing)?;
        match env.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(cell);
                Ok(())
            }
            None => Err(MachineError::SlotOutOfBounds(index)),
        }
    }

    /// Reads the query's permanent variables out of the bottom-most
    /// environment (the query frame).
    pub(crate) fn solution(&self) -> Result<Solution, MachineError> {
        let env = self.state.env.as_ref().ok_or(MachineError::EnvironmentMissing)?;
        let query_env = env.bottom();
        let mut bindings = Vec::with_capacity(self.query_vars.len());
        for (name, slot) in &self.query_vars {
            let term = match query_env.slots.get(*slot).and_then(|slot| slot.as_ref()) {
                Some(cell) => self.term_of(cell)?,
                None => Term::var("_"),
            };
            bindings.push((name.clone(), term));
        }
        Ok(Solution { bindings })
    }
}

/// Lazy, restartable enumeration of the solutions of one query.
#[derive(Debug)]
pub struct Solutions {
    machine: Machine,
    done: bool,
}

impl Iterator for Solutions {
    type Item = Result<Solution, MachineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.machine.next_solution() {
            Ok(Some(solution)) => Some(Ok(solution)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
