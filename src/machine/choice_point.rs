// src/machine/choice_point.rs
//! Machine-state snapshots: instruction addresses, the struct-argument
//! cursor, and choice points for backtracking.

use std::rc::Rc;

use crate::compiler::index::Code;
use crate::machine::cell::{Cell, StructCell};
use crate::machine::error_handling::MachineError;
use crate::machine::frame::Env;
use crate::machine::instruction::Instruction;
use crate::machine::term::Functor;

/// Position of the machine inside a list of clause codes selected for one
/// predicate call: which code (`order`) and which instruction within it.
#[derive(Debug, Clone)]
pub struct InstrAddr {
    pub functor: Functor,
    pub codes: Rc<Vec<Rc<Code>>>,
    pub order: usize,
    pub instr: usize,
}

impl InstrAddr {
    pub fn new(functor: Functor, codes: Rc<Vec<Rc<Code>>>) -> InstrAddr {
        InstrAddr { functor, codes, order: 0, instr: 0 }
    }

    /// Address of the next instruction within the current code.
    pub fn step(&self) -> Result<InstrAddr, MachineError> {
        let code = &self.codes[self.order];
        if self.instr + 1 >= code.instructions.len() {
            return Err(MachineError::CodeOutOfBounds(self.functor.clone()));
        }
        Ok(InstrAddr { instr: self.instr + 1, ..self.clone() })
    }

    /// Address of the first instruction of the next alternative clause.
    pub fn next_clause(&self) -> Result<InstrAddr, MachineError> {
        if self.order + 1 >= self.codes.len() {
            return Err(MachineError::NoMoreClauses(self.functor.clone()));
        }
        Ok(InstrAddr { order: self.order + 1, instr: 0, ..self.clone() })
    }

    pub fn is_last_clause(&self) -> bool {
        self.order + 1 == self.codes.len()
    }

    pub fn curr_instr(&self) -> Result<&Instruction, MachineError> {
        self.codes[self.order]
            .instructions
            .get(self.instr)
            .ok_or_else(|| MachineError::CodeOutOfBounds(self.functor.clone()))
    }
}

/// Read/write mode of the struct-argument cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Invalid,
    Read,
    Write,
}

/// Cursor over the argument slots of the struct currently being read or
/// built. Valid only between a `get_struct`/`put_struct` and the completion
/// of the following unify sequence.
#[derive(Debug, Clone)]
pub struct StructCursor {
    pub mode: CursorMode,
    pub cell: Option<Rc<StructCell>>,
    pub index: usize,
}

impl StructCursor {
    pub fn invalid() -> StructCursor {
        StructCursor { mode: CursorMode::Invalid, cell: None, index: 0 }
    }

    pub fn read(cell: Rc<StructCell>) -> StructCursor {
        StructCursor { mode: CursorMode::Read, cell: Some(cell), index: 0 }
    }

    pub fn write(cell: Rc<StructCell>) -> StructCursor {
        StructCursor { mode: CursorMode::Write, cell: Some(cell), index: 0 }
    }
}

/// Everything a choice point must restore: instruction cursor, registers,
/// struct cursor, continuation, environment stack head, and the call depth.
#[derive(Debug, Clone)]
pub struct MachineState {
    pub instr_ptr: InstrAddr,
    pub regs: Vec<Option<Cell>>,
    pub cursor: StructCursor,
    pub continuation: Option<InstrAddr>,
    pub env: Option<Box<Env>>,
    pub depth: usize,
}

/// A saved alternative: the machine state at predicate dispatch plus the
/// trail of refs bound since. Forms a linked stack.
#[derive(Debug)]
pub struct ChoicePoint {
    pub state: MachineState,
    /// Ref high-water mark at the time this choice point was pushed. Refs
    /// with an id at or below it predate the choice point and must be
    /// trailed when bound; newer refs become unreachable on backtrack.
    pub top_ref_id: usize,
    /// Ids of refs bound after this choice point was pushed and old enough
    /// to need unbinding on backtrack.
    pub trail: Vec<usize>,
    pub prev: Option<Box<ChoicePoint>>,
}
