// src/lib.rs
//! Horn: a compiler and abstract-machine interpreter for a Horn-clause
//! logic language.
//!
//! A knowledge base of clauses is compiled into an indexed instruction
//! store; a machine then enumerates, lazily and in deterministic order, all
//! substitutions of a query's variables that make the query entailed by the
//! knowledge base.
//!
//! Modules:
//! - machine: terms, runtime cells, instructions, and the abstract machine.
//! - compiler: clause analysis, register allocation, code emission, and
//!   first-argument indexing.
//! - parser: the surface-syntax front end.

pub mod compiler;
pub mod machine;
pub mod parser;

// Re-export the commonly used entry points.
pub use compiler::{compile, CompiledProgram};
pub use machine::core::{Machine, Solution, Solutions};
pub use machine::error_handling::MachineError;
pub use machine::term::{Clause, Functor, Struct, Term};
