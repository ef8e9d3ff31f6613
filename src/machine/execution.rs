// src/machine/execution.rs
//! Execution of the individual machine instructions.

use std::cmp::Ordering;

use crate::machine::cell::{Cell, StructCell};
use crate::machine::choice_point::{CursorMode, StructCursor};
use crate::machine::core::{Machine, Solution};
use crate::machine::error_handling::MachineError;
use crate::machine::frame::Env;
use crate::machine::instruction::{Addr, Instruction};
use crate::machine::term::Functor;

impl Machine {
    /// Executes one instruction. `halt` returns the solution it yields; all
    /// other instructions return `None`.
    pub fn execute(&mut self, instr: &Instruction) -> Result<Option<Solution>, MachineError> {
        match instr {
            Instruction::GetVariable { reg, addr } => self.execute_get_variable(*reg, addr)?,
            Instruction::GetValue { reg, addr } => self.execute_get_value(*reg, addr)?,
            Instruction::GetAtom { reg, atom } => self.execute_get_atom(*reg, atom)?,
            Instruction::GetStruct { reg, functor } => self.execute_get_struct(*reg, functor)?,
            Instruction::PutVariable { reg, addr } => self.execute_put_variable(*reg, addr)?,
            Instruction::PutValue { reg, addr } => self.execute_put_value(*reg, addr)?,
            Instruction::PutAtom { reg, atom } => self.execute_put_atom(*reg, atom)?,
            Instruction::PutStruct { reg, functor } => self.execute_put_struct(*reg, functor)?,
            Instruction::UnifyVariable { .. }
            | Instruction::UnifyValue { .. }
            | Instruction::UnifyAtom { .. } => self.execute_unify_arg(instr)?,
            Instruction::Call { functor } => self.execute_call(functor)?,
            Instruction::Execute { functor } => self.execute_execute(functor)?,
            Instruction::Proceed => self.execute_proceed()?,
            Instruction::Allocate { n } => self.execute_allocate(*n)?,
            Instruction::Deallocate => self.execute_deallocate()?,
            Instruction::Builtin { name, args } => self.execute_builtin(name, args)?,
            Instruction::Halt => return self.execute_halt().map(Some),
        }
        Ok(None)
    }

    /// `get_var reg, addr`: addr := regs[reg].
    fn execute_get_variable(&mut self, reg: usize, addr: &Addr) -> Result<(), MachineError> {
        let cell = self.get_reg(reg)?;
        self.set(addr, cell)?;
        self.forward()
    }

    /// `get_val reg, addr`: unify regs[reg] with the cell at addr.
    fn execute_get_value(&mut self, reg: usize, addr: &Addr) -> Result<(), MachineError> {
        let cell = self.get_reg(reg)?;
        let other = self.get(addr)?;
        self.unify(cell, other)?;
        self.forward()
    }

    /// `get_atom reg, atom`: unify regs[reg] with the atom.
    fn execute_get_atom(&mut self, reg: usize, atom: &str) -> Result<(), MachineError> {
        let cell = self.get_reg(reg)?;
        self.read_atom(atom, &cell)?;
        self.forward()
    }

    /// `get_struct reg, functor`: enter read mode on a matching struct, or
    /// bind an unbound ref to a fresh empty struct and enter write mode.
    fn execute_get_struct(&mut self, reg: usize, functor: &Functor) -> Result<(), MachineError> {
        let cell = self.get_reg(reg)?;
        match self.deref(&cell) {
            Cell::Struct(s) => {
                if s.functor() != *functor {
                    return Err(MachineError::UnificationFailed(format!(
                        "{} != {}",
                        s.functor(),
                        functor
                    )));
                }
                self.state.cursor = StructCursor::read(s);
            }
            Cell::Ref(id) => {
                let s = StructCell::from_functor(functor);
                self.bind_ref(id, Cell::Struct(s.clone()))?;
                self.state.cursor = StructCursor::write(s);
            }
            cell => {
                return Err(MachineError::UnificationFailed(format!("{} != {}", cell, functor)));
            }
        }
        self.forward()
    }

    /// `put_var reg, addr`: a fresh unbound ref into both regs[reg] and addr.
    fn execute_put_variable(&mut self, reg: usize, addr: &Addr) -> Result<(), MachineError> {
        let fresh = self.new_ref();
        self.set_reg(reg, fresh.clone())?;
        self.set(addr, fresh)?;
        self.forward()
    }

    /// `put_val reg, addr`: regs[reg] := the cell at addr.
    fn execute_put_value(&mut self, reg: usize, addr: &Addr) -> Result<(), MachineError> {
        let cell = self.get(addr)?;
        self.set_reg(reg, cell)?;
        self.forward()
    }

    /// `put_atom reg, atom`.
    fn execute_put_atom(&mut self, reg: usize, atom: &str) -> Result<(), MachineError> {
        self.set_reg(reg, Cell::Atom(atom.to_string()))?;
        self.forward()
    }

    /// `put_struct reg, functor`: a fresh empty struct into regs[reg];
    /// the following unify sequence fills its slots in write mode.
    fn execute_put_struct(&mut self, reg: usize, functor: &Functor) -> Result<(), MachineError> {
        let s = StructCell::from_functor(functor);
        self.set_reg(reg, Cell::Struct(s.clone()))?;
        self.state.cursor = StructCursor::write(s);
        self.forward()
    }

    /// `unify_var` / `unify_val` / `unify_atom`: one argument slot of the
    /// struct under the cursor, read or write mode.
    fn execute_unify_arg(&mut self, instr: &Instruction) -> Result<(), MachineError> {
        let cursor = self.state.cursor.clone();
        let s = cursor.cell.ok_or(MachineError::InvalidCursor)?;
        if cursor.index >= s.arity() {
            return Err(MachineError::InvalidCursor);
        }
        match cursor.mode {
            CursorMode::Write => {
                let cell = match instr {
                    Instruction::UnifyVariable { addr } => {
                        let fresh = self.new_ref();
                        self.set(addr, fresh.clone())?;
                        fresh
                    }
                    Instruction::UnifyValue { addr } => self.get(addr)?,
                    Instruction::UnifyAtom { atom } => Cell::Atom(atom.clone()),
                    _ => return Err(MachineError::InvalidCursor),
                };
                s.args.borrow_mut()[cursor.index] = Some(cell);
            }
            CursorMode::Read => {
                let arg = s
                    .arg(cursor.index)
                    .ok_or_else(|| MachineError::IncompleteStruct(s.functor().to_string()))?;
                match instr {
                    Instruction::UnifyVariable { addr } => self.set(addr, arg)?,
                    Instruction::UnifyValue { addr } => {
                        let cell = self.get(addr)?;
                        self.unify(cell, arg)?;
                    }
                    Instruction::UnifyAtom { atom } => self.read_atom(atom, &arg)?,
                    _ => return Err(MachineError::InvalidCursor),
                }
            }
            CursorMode::Invalid => return Err(MachineError::InvalidCursor),
        }
        self.state.cursor.index += 1;
        if self.state.cursor.index >= s.arity() {
            self.state.cursor = StructCursor::invalid();
        }
        self.forward()
    }

    /// Unifies `arg` with an atom: matching atom succeeds, an unbound ref is
    /// bound, anything else fails.
    fn read_atom(&mut self, atom: &str, arg: &Cell) -> Result<(), MachineError> {
        match self.deref(arg) {
            Cell::Atom(name) => {
                if name == atom {
                    Ok(())
                } else {
                    Err(MachineError::UnificationFailed(format!("{} != {}", name, atom)))
                }
            }
            Cell::Ref(id) => self.bind_ref(id, Cell::Atom(atom.to_string())),
            cell => Err(MachineError::UnificationFailed(format!("{} != {}", cell, atom))),
        }
    }

    /// `call functor`: save the step successor as continuation, dispatch.
    fn execute_call(&mut self, functor: &Functor) -> Result<(), MachineError> {
        self.state.depth += 1;
        self.state.continuation = Some(self.state.instr_ptr.step()?);
        self.trampoline(functor)
    }

    /// `execute functor`: tail dispatch, reusing the caller's continuation.
    fn execute_execute(&mut self, functor: &Functor) -> Result<(), MachineError> {
        self.state.depth += 1;
        if let Some(env) = self.state.env.as_mut() {
            env.executes += 1;
        }
        self.trampoline(functor)
    }

    /// `proceed`: return to the saved continuation, retiring the call depth
    /// of the whole execute chain.
    fn execute_proceed(&mut self) -> Result<(), MachineError> {
        let executes = match self.state.env.as_mut() {
            Some(env) => std::mem::take(&mut env.executes),
            None => 0,
        };
        self.state.depth = self.state.depth.saturating_sub(executes + 1);
        let continuation = self.state.continuation.take().ok_or(MachineError::NoContinuation)?;
        self.state.instr_ptr = continuation;
        Ok(())
    }

    /// `allocate n`: push an environment of `n` unbound slots, saving the
    /// current continuation into it.
    fn execute_allocate(&mut self, n: usize) -> Result<(), MachineError> {
        let continuation = self.state.continuation.take();
        let prev = self.state.env.take();
        self.state.env = Some(Box::new(Env::new(n, continuation, prev)));
        self.forward()
    }

    /// `deallocate`: pop the innermost environment, restoring the
    /// continuation saved at allocation time.
    fn execute_deallocate(&mut self) -> Result<(), MachineError> {
        let env = self.state.env.take().ok_or(MachineError::EnvironmentMissing)?;
        self.state.continuation = env.continuation;
        self.state.env = env.prev;
        self.forward()
    }

    /// `builtin name, args...`: unification and standard-order comparisons.
    fn execute_builtin(&mut self, name: &str, args: &[Addr]) -> Result<(), MachineError> {
        let (a1, a2) = match args {
            [a1, a2] => (a1, a2),
            _ => return Err(MachineError::UnknownBuiltin(name.to_string(), args.len())),
        };
        if name == "=" {
            let c1 = self.get(a1)?;
            let c2 = self.get(a2)?;
            self.unify(c1, c2)?;
            return self.forward();
        }
        let c1 = self.get(a1)?;
        let c2 = self.get(a2)?;
        let order = self.compare_cells(&c1, &c2)?;
        let holds = match name {
            "<" => order == Ordering::Less,
            ">" => order == Ordering::Greater,
            "=<" => order != Ordering::Greater,
            ">=" => order != Ordering::Less,
            "==" => order == Ordering::Equal,
            "\\==" => order != Ordering::Equal,
            _ => return Err(MachineError::UnknownBuiltin(name.to_string(), args.len())),
        };
        if holds {
            self.forward()
        } else {
            Err(MachineError::UnificationFailed(format!(
                "{} {} {} does not hold",
                self.deref(&c1),
                name,
                self.deref(&c2)
            )))
        }
    }

    /// `halt`: yield a solution read from the query environment. The caller
    /// forces a backtrack afterwards to look for further solutions.
    fn execute_halt(&mut self) -> Result<Solution, MachineError> {
        self.solution()
    }
}
