// src/compiler/chunks.rs
//! Clause analysis: chunk splitting, variable classification, and the
//! per-chunk register sets guiding Debray's allocation.
//!
//! A chunk is a maximal goal sequence ending in one non-builtin goal (or the
//! trailing builtins of a clause); the head opens the first chunk. A
//! variable confined to a single chunk is temporary and lives in registers;
//! one that spans chunks is permanent and lives in an environment slot.

use std::collections::{BTreeSet, HashMap};

use crate::machine::term::{Clause, Functor, Struct, Term};

/// The builtin predicates. Builtins do not call user predicates and so do
/// not terminate a chunk.
pub fn is_builtin(functor: &Functor) -> bool {
    functor.arity == 2
        && matches!(functor.name.as_str(), "=" | "<" | ">" | "=<" | ">=" | "==" | "\\==")
}

/// A maximal goal sequence compiled as one register-allocation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub terms: Vec<Struct>,
}

impl Chunk {
    /// Variable names appearing in this chunk, depth-first, deduplicated,
    /// in order of first appearance.
    pub fn vars(&self) -> Vec<String> {
        let mut all = Vec::new();
        for term in &self.terms {
            term.collect_vars(&mut all);
        }
        let mut seen = BTreeSet::new();
        all.retain(|name| seen.insert(name.clone()));
        all
    }
}

/// Splits a clause into chunks: goals accumulate until a non-builtin goal
/// closes the chunk; trailing builtins form a final chunk of their own.
pub fn gen_chunks(clause: &Clause) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut terms = vec![clause.head.clone()];
    for goal in &clause.body {
        terms.push(goal.clone());
        if is_builtin(&goal.functor()) {
            continue;
        }
        chunks.push(Chunk { terms: std::mem::take(&mut terms) });
    }
    if !terms.is_empty() {
        chunks.push(Chunk { terms });
    }
    chunks
}

/// A clause partitioned into chunks, with its variables classified.
#[derive(Debug)]
pub struct ClauseChunks {
    /// Variables confined to a single chunk, in first-appearance order.
    pub temps: Vec<String>,
    /// Variables spanning several chunks, in first-appearance order.
    pub perms: Vec<String>,
    pub chunks: Vec<Chunk>,
}

impl ClauseChunks {
    pub fn from_clause(clause: &Clause) -> ClauseChunks {
        let chunks = gen_chunks(clause);

        let mut order: Vec<String> = Vec::new();
        let mut chunk_idxs: HashMap<String, BTreeSet<usize>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            for name in chunk.vars() {
                let idxs = chunk_idxs.entry(name.clone()).or_default();
                if idxs.is_empty() {
                    order.push(name);
                }
                idxs.insert(i);
            }
        }

        let mut temps = Vec::new();
        let mut perms = Vec::new();
        for name in order {
            if chunk_idxs[&name].len() == 1 {
                temps.push(name);
            } else {
                perms.push(name);
            }
        }
        ClauseChunks { temps, perms, chunks }
    }
}

/// Number of compound terms nested inside the arguments of a chunk's goals.
/// Each occurrence needs a register of its own during (de)construction.
pub fn count_nested_structs(chunk: &Chunk) -> usize {
    fn count(term: &Term) -> usize {
        match term {
            Term::Struct(s) => 1 + s.args.iter().map(count).sum::<usize>(),
            _ => 0,
        }
    }
    chunk
        .terms
        .iter()
        .flat_map(|term| term.args.iter())
        .map(count)
        .sum()
}

/// The USE/NOUSE/CONFLICT register sets of a chunk's temporaries, plus the
/// register bound for the chunk.
#[derive(Debug)]
pub struct ChunkSets {
    /// Argument registers of the head (if this is the head chunk) or of the
    /// chunk's calling goal, whichever is wider.
    pub max_args: usize,
    /// Upper bound on registers needed: arguments, temporaries, and one per
    /// nested compound.
    pub max_regs: usize,
    use_regs: HashMap<String, BTreeSet<usize>>,
    no_use: HashMap<String, BTreeSet<usize>>,
    conflict: HashMap<String, BTreeSet<usize>>,
}

impl ChunkSets {
    pub fn from_chunk(chunk: &Chunk, temps: &[String], is_head: bool) -> ChunkSets {
        let first = chunk.terms.first().expect("chunk is never empty");
        let last = chunk.terms.last().expect("chunk is never empty");

        let input_arity = if is_head { first.arity() } else { 0 };
        let output_arity = if is_builtin(&last.functor()) { 0 } else { last.arity() };
        let max_args = input_arity.max(output_arity);
        let max_regs = max_args + temps.len() + count_nested_structs(chunk);

        let is_temp = |name: &str| temps.iter().any(|t| t == name);
        let direct_temp = |arg: &Term| match arg {
            Term::Var(name) if is_temp(name) => Some(name.clone()),
            _ => None,
        };

        // USE: argument positions of the first goal (head only) and of the
        // last goal where the temporary sits as a direct argument.
        let mut use_regs: HashMap<String, BTreeSet<usize>> = HashMap::new();
        let calc_use = |term: &Struct, use_regs: &mut HashMap<String, BTreeSet<usize>>| {
            for (i, arg) in term.args.iter().enumerate() {
                if let Some(name) = direct_temp(arg) {
                    use_regs.entry(name).or_default().insert(i);
                }
            }
        };
        if is_head {
            calc_use(first, &mut use_regs);
        }
        calc_use(last, &mut use_regs);

        // NOUSE: the natural homes of the other temporaries in the last goal.
        let mut no_use: HashMap<String, BTreeSet<usize>> = HashMap::new();
        for x in temps {
            for (i, arg) in last.args.iter().enumerate() {
                if let Some(name) = direct_temp(arg) {
                    let in_use = use_regs.get(x).is_some_and(|set| set.contains(&i));
                    if name != *x && !in_use {
                        no_use.entry(x.clone()).or_default().insert(i);
                    }
                }
            }
        }

        // CONFLICT: for temporaries in the last goal, every argument
        // register of that goal holding some other term.
        let mut last_vars = Vec::new();
        last.collect_vars(&mut last_vars);
        let mut conflict: HashMap<String, BTreeSet<usize>> = HashMap::new();
        for x in temps {
            if !last_vars.iter().any(|name| name == x) {
                continue;
            }
            for (i, arg) in last.args.iter().enumerate() {
                if *arg != Term::Var(x.clone()) {
                    conflict.entry(x.clone()).or_default().insert(i);
                }
            }
        }

        ChunkSets { max_args, max_regs, use_regs, no_use, conflict }
    }

    pub fn use_of(&self, x: &str) -> BTreeSet<usize> {
        self.use_regs.get(x).cloned().unwrap_or_default()
    }

    pub fn no_use_of(&self, x: &str) -> BTreeSet<usize> {
        self.no_use.get(x).cloned().unwrap_or_default()
    }

    pub fn conflict_of(&self, x: &str) -> BTreeSet<usize> {
        self.conflict.get(x).cloned().unwrap_or_default()
    }
}
