// src/machine/error_handling.rs
//! Error handling for the Horn machine.
//!
//! `UnificationFailed` is the expected-failure signal: the machine converts
//! it into backtracking and it never escapes a run. Every other variant is a
//! programmer error (bad code object or machine misuse) and aborts the
//! enumeration with a diagnostic.

use thiserror::Error;

use crate::machine::term::Functor;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("register X{0} is out of bounds")]
    RegisterOutOfBounds(usize),
    #[error("register X{0} is uninitialized")]
    UninitializedRegister(usize),
    #[error("stack slot Y{0} is out of bounds")]
    SlotOutOfBounds(usize),
    #[error("stack slot Y{0} is uninitialized")]
    UninitializedSlot(usize),
    #[error("unification failed: {0}")]
    UnificationFailed(String),
    #[error("no environment is allocated")]
    EnvironmentMissing,
    #[error("no choice point available")]
    NoChoicePoint,
    #[error("proceed without a continuation")]
    NoContinuation,
    #[error("attempt to write to read-only address @{0}")]
    ReadOnlyAddress(String),
    #[error("ref _{0} is already bound")]
    RefRebound(usize),
    #[error("unify instruction outside a structure context")]
    InvalidCursor,
    #[error("incomplete struct {0} read before its slots were filled")]
    IncompleteStruct(String),
    #[error("unknown builtin {0}/{1}")]
    UnknownBuiltin(String, usize),
    #[error("reached the end of {0} without a proceed instruction")]
    CodeOutOfBounds(Functor),
    #[error("no further clause in {0} during backtrack")]
    NoMoreClauses(Functor),
    #[error("iteration budget of {0} exceeded")]
    MaxItersReached(u64),
    #[error("cyclic term cannot be materialized")]
    CyclicTerm,
}
