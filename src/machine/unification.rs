// src/machine/unification.rs
//! Binding store, trail, unification, and the standard order of cells.
//!
//! Ref bindings are kept in a map from ref id to cell, outside the cells
//! themselves, so backtracking can undo them by unwinding the trail of the
//! abandoned choice point. A ref is trailed only if it is older than the
//! topmost choice point (newer refs disappear wholesale on backtrack).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, trace};

use crate::machine::cell::{Cell, StructCell};
use crate::machine::core::Machine;
use crate::machine::error_handling::MachineError;
use crate::machine::term::{Struct, Term};

impl Machine {
    /// Resolves a cell to its terminal value: follows ref bindings until an
    /// unbound ref, an atom, or a struct.
    pub fn deref(&self, cell: &Cell) -> Cell {
        let mut cell = cell.clone();
        while let Cell::Ref(id) = cell {
            match self.bindings.get(&id) {
                Some(target) => cell = target.clone(),
                None => break,
            }
        }
        cell
    }

    /// Unifies two cells, binding unbound refs as needed. Fails with
    /// `UnificationFailed` on mismatch; bindings made before the mismatch
    /// stay in place for the trail to undo. Without an occurs check, bound
    /// terms may be cyclic; a struct pair re-entered while its own walk is
    /// still in progress is reported as `CyclicTerm`.
    pub fn unify(&mut self, c1: Cell, c2: Cell) -> Result<(), MachineError> {
        enum Job {
            Pair(Cell, Cell),
            Leave(*const StructCell, *const StructCell),
        }

        let mut stack = vec![Job::Pair(c1, c2)];
        let mut in_progress: HashSet<(*const StructCell, *const StructCell)> = HashSet::new();
        while let Some(job) = stack.pop() {
            let (c1, c2) = match job {
                Job::Pair(c1, c2) => (c1, c2),
                Job::Leave(p1, p2) => {
                    in_progress.remove(&(p1, p2));
                    continue;
                }
            };
            let c1 = self.deref(&c1);
            let c2 = self.deref(&c2);
            if c1 == c2 {
                continue;
            }
            match (c1, c2) {
                (Cell::Ref(id1), Cell::Ref(id2)) => {
                    // Bind the newer ref to the older one.
                    if id1 < id2 {
                        self.bind_ref(id2, Cell::Ref(id1))?;
                    } else {
                        self.bind_ref(id1, Cell::Ref(id2))?;
                    }
                }
                (Cell::Ref(id), other) | (other, Cell::Ref(id)) => {
                    self.bind_ref(id, other)?;
                }
                (Cell::Atom(a), Cell::Atom(b)) => {
                    return Err(MachineError::UnificationFailed(format!("{} != {}", a, b)));
                }
                (Cell::Struct(s1), Cell::Struct(s2)) => {
                    if s1.functor() != s2.functor() {
                        return Err(MachineError::UnificationFailed(format!(
                            "{} != {}",
                            s1.functor(),
                            s2.functor()
                        )));
                    }
                    let pair = (Rc::as_ptr(&s1), Rc::as_ptr(&s2));
                    if !in_progress.insert(pair) {
                        return Err(MachineError::CyclicTerm);
                    }
                    // The marker pops once every argument pair below it has
                    // drained, closing this pair's walk.
                    stack.push(Job::Leave(pair.0, pair.1));
                    for i in 0..s1.arity() {
                        let a1 = s1.arg(i).ok_or_else(|| incomplete(&s1))?;
                        let a2 = s2.arg(i).ok_or_else(|| incomplete(&s2))?;
                        stack.push(Job::Pair(a1, a2));
                    }
                }
                (c1, c2) => {
                    return Err(MachineError::UnificationFailed(format!("{} != {}", c1, c2)));
                }
            }
        }
        Ok(())
    }

    /// Binds an unbound ref and records it on the topmost choice point's
    /// trail when the ref predates that choice point.
    pub fn bind_ref(&mut self, id: usize, value: Cell) -> Result<(), MachineError> {
        if self.bindings.contains_key(&id) {
            return Err(MachineError::RefRebound(id));
        }
        debug!("bind _{} := {}", id, value);
        self.bindings.insert(id, value);
        if let Some(choice) = self.choice.as_mut() {
            if id <= choice.top_ref_id {
                choice.trail.push(id);
            }
            // Newer refs are unconditional: backtracking discards them
            // along with everything that references them.
        }
        Ok(())
    }

    /// Undoes every binding recorded on the topmost choice point's trail.
    pub fn unwind_trail(&mut self) {
        if let Some(choice) = self.choice.as_mut() {
            trace!("unwinding {} trail entries", choice.trail.len());
            for id in choice.trail.drain(..) {
                self.bindings.remove(&id);
            }
        }
    }

    /// Standard order of cells: Ref < Atom < Struct; refs by id, atoms by
    /// name, structs by arity, then name, then arguments left to right.
    /// Both operands are dereferenced before their order classes compare.
    /// A struct pair re-entered while its own walk is still in progress is
    /// reported as `CyclicTerm`.
    pub fn compare_cells(&self, c1: &Cell, c2: &Cell) -> Result<Ordering, MachineError> {
        enum Job {
            Pair(Cell, Cell),
            Leave(*const StructCell, *const StructCell),
        }

        let mut stack = vec![Job::Pair(c1.clone(), c2.clone())];
        let mut in_progress: HashSet<(*const StructCell, *const StructCell)> = HashSet::new();
        while let Some(job) = stack.pop() {
            let (c1, c2) = match job {
                Job::Pair(c1, c2) => (c1, c2),
                Job::Leave(p1, p2) => {
                    in_progress.remove(&(p1, p2));
                    continue;
                }
            };
            let c1 = self.deref(&c1);
            let c2 = self.deref(&c2);
            if c1 == c2 {
                continue;
            }
            let classes = c1.order_class().cmp(&c2.order_class());
            if classes != Ordering::Equal {
                return Ok(classes);
            }
            match (c1, c2) {
                (Cell::Ref(id1), Cell::Ref(id2)) => return Ok(id1.cmp(&id2)),
                (Cell::Atom(a), Cell::Atom(b)) => {
                    let order = a.cmp(&b);
                    if order != Ordering::Equal {
                        return Ok(order);
                    }
                }
                (Cell::Struct(s1), Cell::Struct(s2)) => {
                    let order = s1
                        .arity()
                        .cmp(&s2.arity())
                        .then_with(|| s1.name.cmp(&s2.name));
                    if order != Ordering::Equal {
                        return Ok(order);
                    }
                    let pair = (Rc::as_ptr(&s1), Rc::as_ptr(&s2));
                    if !in_progress.insert(pair) {
                        return Err(MachineError::CyclicTerm);
                    }
                    // The marker pops once every argument pair below it has
                    // drained, closing this pair's walk.
                    stack.push(Job::Leave(pair.0, pair.1));
                    // Leftmost argument decides first: push in reverse.
                    for i in (0..s1.arity()).rev() {
                        let a1 = s1.arg(i).ok_or_else(|| incomplete(&s1))?;
                        let a2 = s2.arg(i).ok_or_else(|| incomplete(&s2))?;
                        stack.push(Job::Pair(a1, a2));
                    }
                }
                _ => unreachable!("order classes matched"),
            }
        }
        Ok(Ordering::Equal)
    }

    /// Materializes a cell into a surface term, iteratively. Unbound refs
    /// become fresh `_<id>` variables.
    pub fn term_of(&self, cell: &Cell) -> Result<Term, MachineError> {
        enum Walk {
            Expand(Cell),
            Build(String, usize, *const StructCell),
        }

        let mut stack = vec![Walk::Expand(cell.clone())];
        let mut terms: Vec<Term> = Vec::new();
        let mut in_progress: HashSet<*const StructCell> = HashSet::new();

        while let Some(walk) = stack.pop() {
            match walk {
                Walk::Expand(cell) => match self.deref(&cell) {
                    Cell::Ref(id) => terms.push(Term::var(format!("_{}", id))),
                    Cell::Atom(name) => terms.push(Term::Atom(name)),
                    Cell::Struct(s) => {
                        let ptr = Rc::as_ptr(&s);
                        if !in_progress.insert(ptr) {
                            return Err(MachineError::CyclicTerm);
                        }
                        stack.push(Walk::Build(s.name.clone(), s.arity(), ptr));
                        // Arguments are pushed in reverse so they pop, and
                        // therefore build, in order.
                        for i in (0..s.arity()).rev() {
                            let arg = s.arg(i).ok_or_else(|| incomplete(&s))?;
                            stack.push(Walk::Expand(arg));
                        }
                    }
                },
                Walk::Build(name, arity, ptr) => {
                    in_progress.remove(&ptr);
                    let args = terms.split_off(terms.len() - arity);
                    terms.push(Term::Struct(Struct::new(name, args)));
                }
            }
        }
        debug_assert_eq!(terms.len(), 1);
        terms.pop().ok_or(MachineError::CyclicTerm)
    }
}

fn incomplete(s: &StructCell) -> MachineError {
    MachineError::IncompleteStruct(s.functor().to_string())
}
