// src/machine/instruction.rs
//! The instruction set of the Horn machine.
//!
//! Operands address registers (`Xn`), permanent-variable slots in the
//! current environment (`Yn`), or read-only atom literals (`@atom`). The
//! `Display` impls render the classic one-line listing format used by the
//! compiler tests and the CLI.

use std::fmt;

use crate::machine::term::Functor;

/// An operand address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
    /// Temporary slot in the register file.
    Reg(usize),
    /// Permanent-variable slot in the current environment.
    Stack(usize),
    /// Read-only atom literal.
    Atom(String),
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Reg(i) => write!(f, "X{}", i),
            Addr::Stack(i) => write!(f, "Y{}", i),
            Addr::Atom(name) => write!(f, "@{}", name),
        }
    }
}

/// A machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    GetVariable { reg: usize, addr: Addr },
    GetValue { reg: usize, addr: Addr },
    GetAtom { reg: usize, atom: String },
    GetStruct { reg: usize, functor: Functor },
    PutVariable { reg: usize, addr: Addr },
    PutValue { reg: usize, addr: Addr },
    PutAtom { reg: usize, atom: String },
    PutStruct { reg: usize, functor: Functor },
    UnifyVariable { addr: Addr },
    UnifyValue { addr: Addr },
    UnifyAtom { atom: String },
    Call { functor: Functor },
    Execute { functor: Functor },
    Proceed,
    Allocate { n: usize },
    Deallocate,
    Builtin { name: String, args: Vec<Addr> },
    Halt,
}

impl Instruction {
    /// The largest register index mentioned by this instruction, if any.
    pub fn max_reg(&self) -> Option<usize> {
        let addr_reg = |addr: &Addr| match addr {
            Addr::Reg(i) => Some(*i),
            _ => None,
        };
        match self {
            Instruction::GetVariable { reg, addr }
            | Instruction::GetValue { reg, addr }
            | Instruction::PutVariable { reg, addr }
            | Instruction::PutValue { reg, addr } => Some((*reg).max(addr_reg(addr).unwrap_or(0))),
            Instruction::GetAtom { reg, .. }
            | Instruction::GetStruct { reg, .. }
            | Instruction::PutAtom { reg, .. }
            | Instruction::PutStruct { reg, .. } => Some(*reg),
            Instruction::UnifyVariable { addr } | Instruction::UnifyValue { addr } => addr_reg(addr),
            Instruction::Builtin { args, .. } => args.iter().filter_map(addr_reg).max(),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::GetVariable { reg, addr } => write!(f, "get_var X{}, {}", reg, addr),
            Instruction::GetValue { reg, addr } => write!(f, "get_val X{}, {}", reg, addr),
            Instruction::GetAtom { reg, atom } => write!(f, "get_atom X{}, {}", reg, atom),
            Instruction::GetStruct { reg, functor } => write!(f, "get_struct X{}, {}", reg, functor),
            Instruction::PutVariable { reg, addr } => write!(f, "put_var X{}, {}", reg, addr),
            Instruction::PutValue { reg, addr } => write!(f, "put_val X{}, {}", reg, addr),
            Instruction::PutAtom { reg, atom } => write!(f, "put_atom X{}, {}", reg, atom),
            Instruction::PutStruct { reg, functor } => write!(f, "put_struct X{}, {}", reg, functor),
            Instruction::UnifyVariable { addr } => write!(f, "unify_var {}", addr),
            Instruction::UnifyValue { addr } => write!(f, "unify_val {}", addr),
            Instruction::UnifyAtom { atom } => write!(f, "unify_atom {}", atom),
            Instruction::Call { functor } => write!(f, "call {}", functor),
            Instruction::Execute { functor } => write!(f, "execute {}", functor),
            Instruction::Proceed => write!(f, "proceed"),
            Instruction::Allocate { n } => write!(f, "allocate {}", n),
            Instruction::Deallocate => write!(f, "deallocate"),
            Instruction::Builtin { name, args } => {
                write!(f, "{} ", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                Ok(())
            }
            Instruction::Halt => write!(f, "halt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_format() {
        let instr = Instruction::GetStruct { reg: 1, functor: Functor::new(".", 2) };
        assert_eq!(instr.to_string(), "get_struct X1, ./2");
        let instr = Instruction::Builtin {
            name: "=".into(),
            args: vec![Addr::Reg(0), Addr::Stack(1)],
        };
        assert_eq!(instr.to_string(), "= X0, Y1");
    }

    #[test]
    fn test_max_reg() {
        let instr = Instruction::GetVariable { reg: 1, addr: Addr::Reg(5) };
        assert_eq!(instr.max_reg(), Some(5));
        assert_eq!(Instruction::Proceed.max_reg(), None);
    }
}
