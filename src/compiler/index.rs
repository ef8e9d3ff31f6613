// src/compiler/index.rs
//! Code objects, first-argument clause indexing, and whole-package
//! compilation.
//!
//! Clauses of one predicate are partitioned into contiguous groups by the
//! shape of the head's first argument. A group of variable-headed clauses
//! must be tried on any call; a group of atom/compound-headed clauses is
//! discriminated through per-atom and per-functor maps, with the full group
//! kept as a catch-all for calls whose first argument is unbound. Source
//! order is preserved throughout, so clause selection is deterministic.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::compiler::clause::compile_clause;
use crate::machine::instruction::Instruction;
use crate::machine::term::{Clause, Functor, Term};

/// A compiled clause: its predicate, the flat instruction stream, and the
/// number of registers it touches.
#[derive(Debug)]
pub struct Code {
    pub functor: Functor,
    pub instructions: Vec<Instruction>,
    pub num_regs: usize,
}

impl Code {
    pub fn new(functor: Functor, instructions: Vec<Instruction>) -> Code {
        let num_regs = instructions
            .iter()
            .filter_map(Instruction::max_reg)
            .max()
            .map_or(0, |max| max + 1);
        Code { functor, instructions, num_regs }
    }
}

/// One contiguous group of a predicate's clauses. `by_var` holds the whole
/// group in source order; for non-variable groups, `by_atom` and
/// `by_struct` discriminate on the first argument.
#[derive(Debug, Clone)]
pub struct Index {
    pub is_var: bool,
    pub by_var: Vec<Rc<Code>>,
    pub by_atom: HashMap<String, Vec<Rc<Code>>>,
    pub by_struct: HashMap<Functor, Vec<Rc<Code>>>,
}

/// The indexed code store for a knowledge base.
#[derive(Debug)]
pub struct CompiledProgram {
    pub indices: HashMap<Functor, Vec<Index>>,
    /// Predicates in first-appearance order, for deterministic listings.
    order: Vec<Functor>,
}

impl CompiledProgram {
    /// The widest register file any compiled clause needs.
    pub fn num_regs(&self) -> usize {
        self.indices
            .values()
            .flatten()
            .flat_map(|index| index.by_var.iter())
            .map(|code| code.num_regs)
            .max()
            .unwrap_or(0)
    }

    /// Renders a deterministic instruction listing of the whole program.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for functor in &self.order {
            let _ = writeln!(out, "{}:", functor);
            let mut i = 0;
            for index in &self.indices[functor] {
                for code in &index.by_var {
                    let _ = writeln!(out, "  #{}:", i);
                    for instr in &code.instructions {
                        let _ = writeln!(out, "    {}", instr);
                    }
                    i += 1;
                }
            }
        }
        out
    }
}

/// Compiles a knowledge base into the indexed code store.
pub fn compile(clauses: &[Clause]) -> CompiledProgram {
    let mut order: Vec<Functor> = Vec::new();
    let mut grouped: HashMap<Functor, Vec<&Clause>> = HashMap::new();
    for clause in clauses {
        let functor = clause.head.functor();
        let group = grouped.entry(functor.clone()).or_default();
        if group.is_empty() {
            order.push(functor);
        }
        group.push(clause);
    }

    let mut indices = HashMap::new();
    for functor in &order {
        indices.insert(functor.clone(), index_predicate(&grouped[functor]));
    }
    CompiledProgram { indices, order }
}

/// True if the clause cannot be discriminated by its first argument:
/// zero-arity head or a variable in the first position.
fn var_like(clause: &Clause) -> bool {
    matches!(clause.head.args.first(), None | Some(Term::Var(_)))
}

/// Builds the ordered index blocks for one predicate's clauses.
fn index_predicate(clauses: &[&Clause]) -> Vec<Index> {
    let mut indices = Vec::new();
    let mut run: Vec<&Clause> = Vec::new();
    for clause in clauses {
        if let Some(prev) = run.last() {
            if var_like(prev) != var_like(clause) {
                indices.push(index_group(&run));
                run.clear();
            }
        }
        run.push(clause);
    }
    if !run.is_empty() {
        indices.push(index_group(&run));
    }
    indices
}

fn index_group(clauses: &[&Clause]) -> Index {
    let codes: Vec<Rc<Code>> = clauses
        .iter()
        .map(|clause| Rc::new(compile_clause(clause)))
        .collect();
    if var_like(clauses[0]) {
        return Index {
            is_var: true,
            by_var: codes,
            by_atom: HashMap::new(),
            by_struct: HashMap::new(),
        };
    }

    let mut by_atom: HashMap<String, Vec<Rc<Code>>> = HashMap::new();
    let mut by_struct: HashMap<Functor, Vec<Rc<Code>>> = HashMap::new();
    for (clause, code) in clauses.iter().zip(&codes) {
        match clause.head.args.first() {
            Some(Term::Atom(name)) => {
                by_atom.entry(name.clone()).or_default().push(code.clone());
            }
            Some(Term::Struct(s)) => {
                by_struct.entry(s.functor()).or_default().push(code.clone());
            }
            _ => unreachable!("variable clause in non-variable group"),
        }
    }
    Index { is_var: false, by_var: codes, by_atom, by_struct }
}
