// tests/test_chunks.rs
//! Clause analysis: chunk splitting and permanent/temporary classification.

use horn::compiler::chunks::{gen_chunks, is_builtin, ChunkSets, ClauseChunks};
use horn::{Clause, Functor, Struct, Term};

fn v(name: &str) -> Term {
    Term::var(name)
}

fn a(name: &str) -> Term {
    Term::atom(name)
}

fn s(name: &str, args: Vec<Term>) -> Struct {
    Struct::new(name, args)
}

fn st(name: &str, args: Vec<Term>) -> Term {
    Term::Struct(Struct::new(name, args))
}

#[test]
fn test_builtin_table() {
    for name in ["=", "<", ">", "=<", ">=", "==", "\\=="] {
        assert!(is_builtin(&Functor::new(name, 2)));
    }
    assert!(!is_builtin(&Functor::new("=", 3)));
    assert!(!is_builtin(&Functor::new("member", 2)));
}

#[test]
fn test_builtins_extend_the_current_chunk() {
    // p(X, Y, Z) :- =(X, f(a, W)), >(Z, Y), q(W, Y, X).
    // The builtins do not close the chunk; q does.
    let clause = Clause::new(
        s("p", vec![v("X"), v("Y"), v("Z")]),
        vec![
            s("=", vec![v("X"), st("f", vec![a("a"), v("W")])]),
            s(">", vec![v("Z"), v("Y")]),
            s("q", vec![v("W"), v("Y"), v("X")]),
        ],
    );
    let chunks = gen_chunks(&clause);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].terms.len(), 4);

    // A single chunk means every variable is temporary.
    let analysis = ClauseChunks::from_clause(&clause);
    assert_eq!(analysis.temps, vec!["X", "Y", "Z", "W"]);
    assert!(analysis.perms.is_empty());
}

#[test]
fn test_non_builtin_goals_split_chunks() {
    // mul(A, B, P) :- =(s(B1), B), mul(A, B1, P1), add(B1, P1, P).
    let clause = Clause::new(
        s("mul", vec![v("A"), v("B"), v("P")]),
        vec![
            s("=", vec![st("s", vec![v("B1")]), v("B")]),
            s("mul", vec![v("A"), v("B1"), v("P1")]),
            s("add", vec![v("B1"), v("P1"), v("P")]),
        ],
    );
    let chunks = gen_chunks(&clause);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].terms.len(), 3); // head, =, mul
    assert_eq!(chunks[1].terms.len(), 1); // add

    let analysis = ClauseChunks::from_clause(&clause);
    assert_eq!(analysis.temps, vec!["A", "B"]);
    assert_eq!(analysis.perms, vec!["P", "B1", "P1"]);
}

#[test]
fn test_trailing_builtins_form_their_own_chunk() {
    // p(X) :- q(X, Y), ==(Y, a).
    let clause = Clause::new(
        s("p", vec![v("X")]),
        vec![
            s("q", vec![v("X"), v("Y")]),
            s("==", vec![v("Y"), a("a")]),
        ],
    );
    let chunks = gen_chunks(&clause);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].terms[0].name, "==");

    let analysis = ClauseChunks::from_clause(&clause);
    assert_eq!(analysis.temps, vec!["X"]);
    assert_eq!(analysis.perms, vec!["Y"]);
}

#[test]
fn test_chunk_vars_are_deduplicated_in_order() {
    let clause = Clause::new(
        s("p", vec![v("X"), st("f", vec![v("X"), v("Y")])]),
        vec![s("q", vec![v("Y"), v("X")])],
    );
    let chunks = gen_chunks(&clause);
    assert_eq!(chunks[0].vars(), vec!["X", "Y"]);
}

#[test]
fn test_use_and_nouse_sets() {
    // member(E, [H|T]) :- member_(T, E, H).
    let clause = Clause::new(
        s("member", vec![v("E"), st(".", vec![v("H"), v("T")])]),
        vec![s("member_", vec![v("T"), v("E"), v("H")])],
    );
    let analysis = ClauseChunks::from_clause(&clause);
    let sets = ChunkSets::from_chunk(&analysis.chunks[0], &analysis.temps, true);

    // E sits at head position 0 and call position 1.
    assert_eq!(sets.use_of("E").into_iter().collect::<Vec<_>>(), vec![0, 1]);
    // T and H live only in call positions 0 and 2.
    assert_eq!(sets.use_of("T").into_iter().collect::<Vec<_>>(), vec![0]);
    assert_eq!(sets.use_of("H").into_iter().collect::<Vec<_>>(), vec![2]);
    // The other temporaries' homes are excluded.
    assert_eq!(sets.no_use_of("T").into_iter().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(sets.no_use_of("E").into_iter().collect::<Vec<_>>(), vec![2]);

    // One register per argument, temporary, and nested compound.
    assert_eq!(sets.max_args, 3);
    assert_eq!(sets.max_regs, 3 + 3 + 1);
}

#[test]
fn test_conflict_set_tracks_other_arguments() {
    // p(X) :- q(Z, Y, X): X conflicts with positions 0 and 1 of q.
    let clause = Clause::new(
        s("p", vec![v("X"), v("Y"), v("Z")]),
        vec![s("q", vec![v("Z"), v("Y"), v("X")])],
    );
    let analysis = ClauseChunks::from_clause(&clause);
    let sets = ChunkSets::from_chunk(&analysis.chunks[0], &analysis.temps, true);
    assert_eq!(sets.conflict_of("X").into_iter().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(sets.conflict_of("Y").into_iter().collect::<Vec<_>>(), vec![0, 2]);
}

#[test]
fn test_builtin_only_chunk_has_no_output_arity() {
    // Trailing builtins contribute no call arguments.
    let clause = Clause::new(
        s("p", vec![v("X")]),
        vec![
            s("q", vec![v("X"), v("Y")]),
            s("==", vec![v("Y"), a("a")]),
        ],
    );
    let analysis = ClauseChunks::from_clause(&clause);
    let sets = ChunkSets::from_chunk(&analysis.chunks[1], &analysis.temps, false);
    assert_eq!(sets.max_args, 0);
}
