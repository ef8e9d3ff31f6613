// src/compiler/clause.rs
//! Clause compilation: head get-sequences, builtin goals, call-argument
//! put-sequences, and the final rewriting pass that adds environment
//! management and last-call optimization.
//!
//! Register placement follows Debray's allocation: a temporary that can sit
//! in an argument register of the head or of the chunk's call is homed
//! there, so most argument passing needs no move at all. Nested compounds
//! are decomposed outside-in in heads and constructed inside-out in calls,
//! so argument slots are always filled before they are read.

use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::compiler::chunks::{is_builtin, Chunk, ChunkSets, ClauseChunks};
use crate::compiler::index::Code;
use crate::machine::instruction::{Addr, Instruction};
use crate::machine::term::{Clause, Functor, Struct, Term};

/// Compiles one clause into a flat instruction stream.
pub struct ClauseCompiler {
    pub temps: Vec<String>,
    pub perms: Vec<String>,
    pub chunks: Vec<Chunk>,
    /// Environment slot of each permanent variable, assigned on first use.
    pub perm_addrs: HashMap<String, usize>,
}

impl ClauseCompiler {
    pub fn new(clause: &Clause) -> ClauseCompiler {
        let analysis = ClauseChunks::from_clause(clause);
        ClauseCompiler {
            temps: analysis.temps,
            perms: analysis.perms,
            chunks: analysis.chunks,
            perm_addrs: HashMap::new(),
        }
    }

    /// Reclassifies every temporary as permanent. Queries use this so their
    /// solutions can be read from the environment after `halt`.
    pub fn promote_temps_to_perms(&mut self) {
        self.perms.append(&mut self.temps);
    }

    /// Emits the instruction stream for all chunks, left to right.
    pub fn compile(&mut self) -> Vec<Instruction> {
        self.perm_addrs.clear();
        let mut instructions = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let mut chunk_compiler = ChunkCompiler::new(
                chunk,
                i == 0,
                &self.temps,
                &self.perms,
                &mut self.perm_addrs,
            );
            chunk_compiler.compile();
            instructions.append(&mut chunk_compiler.instructions);
        }
        instructions
    }
}

/// Compiles a single chunk, owning its register bookkeeping.
struct ChunkCompiler<'a> {
    chunk: &'a Chunk,
    is_head: bool,
    temps: &'a [String],
    perms: &'a [String],
    perm_addrs: &'a mut HashMap<String, usize>,
    sets: ChunkSets,
    instructions: Vec<Instruction>,
    /// Nested compounds found while decomposing a head structure, deferred
    /// until the enclosing structure's arguments are consumed.
    delayed: Vec<(Struct, usize)>,
    free_regs: BTreeSet<usize>,
    top_reg: usize,
    /// Home register of each temporary seen so far in this chunk.
    var_regs: HashMap<String, usize>,
    /// Which temporary currently occupies a register.
    reg_contents: HashMap<usize, String>,
    /// True while materializing the arguments of the chunk's call; the
    /// callee's argument registers are then excluded from fallback
    /// allocation.
    in_put_seq: bool,
    last_call_arity: usize,
}

impl<'a> ChunkCompiler<'a> {
    fn new(
        chunk: &'a Chunk,
        is_head: bool,
        temps: &'a [String],
        perms: &'a [String],
        perm_addrs: &'a mut HashMap<String, usize>,
    ) -> ChunkCompiler<'a> {
        let sets = ChunkSets::from_chunk(chunk, temps, is_head);
        let free_regs = (0..sets.max_regs).collect();
        let top_reg = sets.max_args;
        ChunkCompiler {
            chunk,
            is_head,
            temps,
            perms,
            perm_addrs,
            sets,
            instructions: Vec::new(),
            delayed: Vec::new(),
            free_regs,
            top_reg,
            var_regs: HashMap::new(),
            reg_contents: HashMap::new(),
            in_put_seq: false,
            last_call_arity: 0,
        }
    }

    fn compile(&mut self) {
        let mut goals: &[Struct] = &self.chunk.terms;
        if self.is_head {
            let (head, rest) = goals.split_first().expect("chunk is never empty");
            // Head argument registers stay reserved until their get
            // instruction consumes them.
            for i in 0..head.arity() {
                self.free_regs.remove(&i);
            }
            self.compile_head(head);
            goals = rest;
        }

        let (builtin_goals, call_goal) = match goals.split_last() {
            Some((last, init)) if !is_builtin(&last.functor()) => (init, Some(last)),
            _ => (goals, None),
        };

        for goal in builtin_goals {
            let args: Vec<Addr> = goal.args.iter().map(|arg| self.term_addr(arg)).collect();
            self.instructions.push(Instruction::Builtin { name: goal.name.clone(), args });
        }

        if let Some(goal) = call_goal {
            self.in_put_seq = true;
            self.last_call_arity = goal.arity();
            for (i, arg) in goal.args.iter().enumerate() {
                self.put_term(arg, i, true);
            }
            self.instructions.push(Instruction::Call { functor: goal.functor() });
        }
    }

    /// Head arguments decompose outside-in: nested structures are queued and
    /// expanded in waves once the enclosing structure is fully consumed.
    fn compile_head(&mut self, head: &Struct) {
        for (i, arg) in head.args.iter().enumerate() {
            self.get_term(arg, i);
        }
        while !self.delayed.is_empty() {
            let wave = std::mem::take(&mut self.delayed);
            for (s, reg) in wave {
                self.get_struct_term(&s, reg);
            }
        }
    }

    fn get_term(&mut self, term: &Term, reg: usize) {
        match term {
            Term::Atom(name) => {
                self.instructions.push(Instruction::GetAtom { reg, atom: name.clone() });
                self.free_regs.insert(reg);
            }
            Term::Var(x) => {
                if self.perms.contains(x) {
                    let (slot, is_new) = self.perm_addr(x);
                    let addr = Addr::Stack(slot);
                    let instr = if is_new {
                        Instruction::GetVariable { reg, addr }
                    } else {
                        Instruction::GetValue { reg, addr }
                    };
                    self.instructions.push(instr);
                    self.free_regs.insert(reg);
                } else if let Some(&home) = self.var_regs.get(x) {
                    if home != reg {
                        self.instructions
                            .push(Instruction::GetValue { reg, addr: Addr::Reg(home) });
                        self.free_regs.insert(reg);
                    }
                    // home == reg would be a no-op move; emit nothing.
                } else {
                    // First sight of a temporary in an argument position:
                    // home it there, no instruction needed.
                    self.set_reg(reg, x);
                }
            }
            Term::Struct(s) => self.get_struct_term(s, reg),
        }
    }

    fn get_struct_term(&mut self, s: &Struct, reg: usize) {
        self.instructions.push(Instruction::GetStruct { reg, functor: s.functor() });
        self.free_regs.insert(reg);
        for arg in &s.args {
            self.unify_arg(arg);
        }
    }

    fn unify_arg(&mut self, term: &Term) {
        match term {
            Term::Atom(name) => {
                self.instructions.push(Instruction::UnifyAtom { atom: name.clone() });
            }
            Term::Var(x) => {
                let (addr, is_new) = self.var_addr(x);
                let instr = if is_new {
                    Instruction::UnifyVariable { addr }
                } else {
                    Instruction::UnifyValue { addr }
                };
                self.instructions.push(instr);
            }
            Term::Struct(s) => {
                let reg = self.alloc_struct_reg();
                self.delayed.push((s.clone(), reg));
                self.instructions.push(Instruction::UnifyVariable { addr: Addr::Reg(reg) });
            }
        }
    }

    /// Materializes `term` into `reg`. At the top level of a call's argument
    /// list, a live temporary occupying the target register is first moved
    /// to its allocated home.
    fn put_term(&mut self, term: &Term, reg: usize, top_level: bool) {
        if top_level {
            if let Some(occupant) = self.reg_contents.get(&reg).cloned() {
                if Term::Var(occupant.clone()) != *term {
                    self.unset_reg(reg, &occupant);
                    let (home, _) = self.temp_addr(&occupant);
                    if home != reg {
                        self.instructions
                            .push(Instruction::GetVariable { reg, addr: Addr::Reg(home) });
                    }
                }
            }
        }

        match term {
            Term::Atom(name) => {
                self.instructions.push(Instruction::PutAtom { reg, atom: name.clone() });
            }
            Term::Var(x) => {
                let (addr, is_new) = self.var_addr(x);
                if is_new {
                    self.instructions.push(Instruction::PutVariable { reg, addr });
                } else if addr == Addr::Reg(reg) {
                    // Value already sits in its destination register.
                } else {
                    if let Addr::Reg(src) = addr {
                        self.free_regs.insert(src);
                    }
                    self.instructions.push(Instruction::PutValue { reg, addr });
                }
            }
            Term::Struct(s) => {
                // Construction is inside-out: nested compounds are built
                // first so their registers are filled when referenced.
                let mut nested = HashMap::new();
                for (i, arg) in s.args.iter().enumerate() {
                    if let Term::Struct(inner) = arg {
                        let inner_reg = self.alloc_struct_reg();
                        self.put_term(&Term::Struct(inner.clone()), inner_reg, false);
                        nested.insert(i, inner_reg);
                    }
                }
                self.instructions.push(Instruction::PutStruct { reg, functor: s.functor() });
                for (i, arg) in s.args.iter().enumerate() {
                    match arg {
                        Term::Struct(_) => {
                            let inner_reg = nested[&i];
                            self.instructions
                                .push(Instruction::UnifyValue { addr: Addr::Reg(inner_reg) });
                        }
                        _ => self.unify_arg(arg),
                    }
                }
            }
        }
    }

    /// Address of a builtin argument, materializing compounds into a fresh
    /// register first.
    fn term_addr(&mut self, term: &Term) -> Addr {
        match term {
            Term::Atom(name) => Addr::Atom(name.clone()),
            Term::Var(x) => self.var_addr(x).0,
            Term::Struct(_) => {
                let reg = self.alloc_struct_reg();
                self.put_term(term, reg, false);
                Addr::Reg(reg)
            }
        }
    }

    fn var_addr(&mut self, x: &str) -> (Addr, bool) {
        if self.perms.iter().any(|p| p == x) {
            let (slot, is_new) = self.perm_addr(x);
            (Addr::Stack(slot), is_new)
        } else {
            let (reg, is_new) = self.temp_addr(x);
            (Addr::Reg(reg), is_new)
        }
    }

    fn perm_addr(&mut self, x: &str) -> (usize, bool) {
        if let Some(&slot) = self.perm_addrs.get(x) {
            return (slot, false);
        }
        let slot = self.perm_addrs.len();
        self.perm_addrs.insert(x.to_string(), slot);
        (slot, true)
    }

    /// Register of a temporary, allocating one on first use.
    fn temp_addr(&mut self, x: &str) -> (usize, bool) {
        if let Some(&reg) = self.var_regs.get(x) {
            return (reg, false);
        }
        let use_regs = self.sets.use_of(x);
        let mut excluded = self.sets.no_use_of(x);
        if !self.is_head {
            excluded.extend(self.sets.conflict_of(x));
        }
        if self.in_put_seq {
            excluded.extend(0..self.last_call_arity);
        }
        let reg = self.alloc_reg(&use_regs, &excluded);
        trace!("alloc X{} for {} (use {:?}, excluded {:?})", reg, x, use_regs, excluded);
        self.set_reg(reg, x);
        (reg, true)
    }

    fn alloc_struct_reg(&mut self) -> usize {
        let mut excluded = BTreeSet::new();
        if self.in_put_seq {
            excluded.extend(0..self.last_call_arity);
        }
        self.alloc_reg(&BTreeSet::new(), &excluded)
    }

    /// Picks the lowest free register out of USE, falling back to any free
    /// register outside the excluded set, and finally to a brand-new one.
    fn alloc_reg(&mut self, use_regs: &BTreeSet<usize>, excluded: &BTreeSet<usize>) -> usize {
        let candidate = self
            .free_regs
            .intersection(use_regs)
            .next()
            .copied()
            .or_else(|| self.free_regs.iter().find(|reg| !excluded.contains(*reg)).copied());
        match candidate {
            Some(reg) => {
                self.free_regs.remove(&reg);
                reg
            }
            None => {
                let reg = self.top_reg;
                self.top_reg += 1;
                reg
            }
        }
    }

    fn set_reg(&mut self, reg: usize, x: &str) {
        self.var_regs.insert(x.to_string(), reg);
        self.reg_contents.insert(reg, x.to_string());
    }

    fn unset_reg(&mut self, reg: usize, x: &str) {
        self.var_regs.remove(x);
        self.reg_contents.remove(&reg);
    }
}

/// Compiles a knowledge-base clause into a code object, applying the final
/// rewrites: environment allocation around permanent variables or non-tail
/// calls, last-call optimization, and a terminating `proceed` for clauses
/// without a trailing call.
pub fn compile_clause(clause: &Clause) -> Code {
    let mut compiler = ClauseCompiler::new(clause);
    let mut instructions = compiler.compile();
    let num_perms = compiler.perm_addrs.len();

    let non_tail_call = instructions
        .iter()
        .rev()
        .skip(1)
        .any(|instr| matches!(instr, Instruction::Call { .. }));
    let needs_env = num_perms > 0 || non_tail_call;

    match instructions.pop() {
        Some(Instruction::Call { functor }) => {
            if needs_env {
                instructions.push(Instruction::Deallocate);
            }
            instructions.push(Instruction::Execute { functor });
        }
        Some(last) => {
            instructions.push(last);
            if needs_env {
                instructions.push(Instruction::Deallocate);
            }
            instructions.push(Instruction::Proceed);
        }
        None => instructions.push(Instruction::Proceed),
    }
    if needs_env {
        instructions.insert(0, Instruction::Allocate { n: num_perms });
    }
    Code::new(clause.head.functor(), instructions)
}

/// Compiles a query into a code object plus its variables with their
/// environment slots, in classification order. All query variables are
/// permanent and the query always allocates, so `halt` can read solutions
/// from the query frame; no last-call rewriting is applied.
pub fn compile_query(query: &[Struct]) -> (Code, Vec<(String, usize)>) {
    let head = Struct::new("query__", Vec::new());
    let clause = Clause::new(head, query.to_vec());
    let mut compiler = ClauseCompiler::new(&clause);
    compiler.promote_temps_to_perms();
    let mut instructions = compiler.compile();
    instructions.insert(0, Instruction::Allocate { n: compiler.perm_addrs.len() });
    instructions.push(Instruction::Halt);

    let vars = compiler
        .perms
        .iter()
        .filter_map(|name| compiler.perm_addrs.get(name).map(|&slot| (name.clone(), slot)))
        .collect();
    (Code::new(Functor::new("query__", 0), instructions), vars)
}
