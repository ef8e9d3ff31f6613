// src/machine/cell.rs
//! Runtime cells of the abstract machine.
//!
//! A logic variable is a `Ref` cell identified by a monotonically increasing
//! id; its binding (if any) lives in the machine's binding store so that the
//! trail can undo it on backtracking. Struct cells are shared by reference
//! and their argument slots are filled in order while the machine is in
//! write mode.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::machine::term::Functor;

/// A runtime value: an (possibly bound) logic variable, an atom, or a
/// structure. Equality is identity: refs compare by id, structs by pointer.
#[derive(Debug, Clone)]
pub enum Cell {
    /// A logic variable, identified by id. Bindings are kept in the
    /// machine's binding store.
    Ref(usize),
    /// An atom constant.
    Atom(String),
    /// A structure, shared by reference.
    Struct(Rc<StructCell>),
}

impl Cell {
    /// Order class for the standard order of terms: Ref < Atom < Struct.
    pub fn order_class(&self) -> u8 {
        match self {
            Cell::Ref(_) => 0,
            Cell::Atom(_) => 1,
            Cell::Struct(_) => 2,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::Ref(a), Cell::Ref(b)) => a == b,
            (Cell::Atom(a), Cell::Atom(b)) => a == b,
            (Cell::Struct(a), Cell::Struct(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Ref(id) => write!(f, "_{}", id),
            Cell::Atom(name) => write!(f, "{}", name),
            Cell::Struct(s) => write!(f, "{}", s),
        }
    }
}

/// A structure cell: functor name plus argument slots. Slots are unfilled
/// (`None`) only between a `put_struct`/`get_struct` in write mode and the
/// completion of the following unify sequence.
#[derive(Debug)]
pub struct StructCell {
    pub name: String,
    pub args: RefCell<Vec<Option<Cell>>>,
}

impl StructCell {
    /// Creates an empty struct shaped after `functor`, all slots unfilled.
    pub fn from_functor(functor: &Functor) -> Rc<StructCell> {
        Rc::new(StructCell {
            name: functor.name.clone(),
            args: RefCell::new(vec![None; functor.arity]),
        })
    }

    pub fn arity(&self) -> usize {
        self.args.borrow().len()
    }

    pub fn functor(&self) -> Functor {
        Functor::new(self.name.clone(), self.arity())
    }

    /// Returns the cell in slot `index`, if filled.
    pub fn arg(&self, index: usize) -> Option<Cell> {
        self.args.borrow().get(index).and_then(|slot| slot.clone())
    }
}

impl fmt::Display for StructCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.borrow().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Some(cell) => write!(f, "{}", cell)?,
                None => write!(f, "?")?,
            }
        }
        write!(f, ")")
    }
}
