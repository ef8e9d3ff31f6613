// tests/test_interpreter.rs
//! End-to-end runs: compile a knowledge base, pose queries, check the
//! enumerated solutions and their order.

use horn::machine::error_handling::MachineError;
use horn::parser;
use horn::{compile, Machine, Solution, Struct, Term};

const LISTS_KB: &str = "
member(E, [H|T]) :- member_(T, E, H).
member_(_, E, E).
member_([H|T], E, _) :- member_(T, E, H).

length([], 0).
length([_|T], s(L)) :- length(T, L).

nat(0).
nat(s(X)) :- nat(X).
";

/// Replaces every variable in a term with `_`, so solutions with fresh
/// machine-named variables can be compared structurally.
fn anonymize(term: &Term) -> Term {
    match term {
        Term::Var(_) => Term::var("_"),
        Term::Atom(_) => term.clone(),
        Term::Struct(s) => Term::Struct(Struct::new(
            s.name.clone(),
            s.args.iter().map(anonymize).collect(),
        )),
    }
}

fn anonymized(solution: Solution) -> Vec<(String, Term)> {
    solution
        .bindings
        .into_iter()
        .map(|(name, term)| (name, anonymize(&term)))
        .collect()
}

fn solve_n(kb: &str, query: &str, n: usize) -> Vec<Solution> {
    let source = parser::parse_program(kb).expect("knowledge base parses");
    let program = compile(&source.clauses);
    let goals = parser::parse_query(query).expect("query parses");
    Machine::new(&program, goals)
        .solutions()
        .take(n)
        .map(|solution| solution.expect("machine runs cleanly"))
        .collect()
}

#[test]
fn test_member_of_fixed_length_list() {
    // ?- length(L, s(s(s(0)))), member(a, L).
    let solutions = solve_n(LISTS_KB, "?- length(L, s(s(s(0)))), member(a, L).", 10);
    let expected: Vec<Vec<(String, Term)>> = vec![
        vec![("L".into(), Term::list(vec![Term::atom("a"), Term::var("_"), Term::var("_")]))],
        vec![("L".into(), Term::list(vec![Term::var("_"), Term::atom("a"), Term::var("_")]))],
        vec![("L".into(), Term::list(vec![Term::var("_"), Term::var("_"), Term::atom("a")]))],
    ];
    let got: Vec<_> = solutions.into_iter().map(anonymized).collect();
    assert_eq!(got, expected);
}

#[test]
fn test_nat_generation_order() {
    // ?- nat(X). enumerates 0, s(0), s(s(0)), ... in order, forever.
    let solutions = solve_n(LISTS_KB, "?- nat(X).", 4);
    let mut expected = Term::atom("0");
    for solution in solutions {
        assert_eq!(solution.get("X"), Some(&expected));
        expected = Term::Struct(Struct::new("s", vec![expected]));
    }
}

#[test]
fn test_first_argument_indexing_filters_clauses() {
    // ?- member(f(X), [a, f(b), g(c), f(d)]).
    let solutions = solve_n(LISTS_KB, "?- member(f(X), [a, f(b), g(c), f(d)]).", 10);
    let xs: Vec<_> = solutions
        .iter()
        .map(|solution| solution.get("X").unwrap().clone())
        .collect();
    assert_eq!(xs, vec![Term::atom("b"), Term::atom("d")]);
}

#[test]
fn test_unbound_call_reaches_every_member() {
    // With an unbound element the catch-all lists keep all alternatives.
    let solutions = solve_n(LISTS_KB, "?- member(Y, [a, f(b), g(c), f(d)]).", 10);
    assert_eq!(solutions.len(), 4);
    assert_eq!(solutions[0].get("Y"), Some(&Term::atom("a")));
}

#[test]
fn test_standard_order_comparison() {
    let kb = "p(X, Y) :- X < Y.";
    // a < b holds; the ground query succeeds once with no bindings.
    let yes = solve_n(kb, "?- p(a, b).", 5);
    assert_eq!(yes.len(), 1);
    assert!(yes[0].bindings.is_empty());
    // b < a does not hold.
    let no = solve_n(kb, "?- p(b, a).", 5);
    assert!(no.is_empty());
}

#[test]
fn test_structural_identity_builtins() {
    let kb = "
eq(X, Y) :- X == Y.
neq(X, Y) :- X \\== Y.
";
    assert_eq!(solve_n(kb, "?- eq(f(a), f(a)).", 5).len(), 1);
    assert!(solve_n(kb, "?- eq(f(a), f(b)).", 5).is_empty());
    assert_eq!(solve_n(kb, "?- neq(f(a), g(a)).", 5).len(), 1);
}

#[test]
fn test_unify_builtin_binds() {
    let kb = "p(X, Z) :- X = f(a, W), q(W, Z). q(b, c).";
    let solutions = solve_n(kb, "?- p(X, Z).", 5);
    assert_eq!(solutions.len(), 1);
    assert_eq!(
        solutions[0].get("X"),
        Some(&Term::Struct(Struct::new(
            "f",
            vec![Term::atom("a"), Term::atom("b")],
        )))
    );
    assert_eq!(solutions[0].get("Z"), Some(&Term::atom("c")));
}

#[test]
fn test_solution_order_is_stable() {
    let query = "?- length(L, s(s(s(0)))), member(a, L).";
    let first: Vec<_> = solve_n(LISTS_KB, query, 10).into_iter().map(anonymized).collect();
    for _ in 0..5 {
        let again: Vec<_> = solve_n(LISTS_KB, query, 10).into_iter().map(anonymized).collect();
        assert_eq!(again, first);
    }
}

#[test]
fn test_unknown_predicate_fails_quietly() {
    let solutions = solve_n(LISTS_KB, "?- undefined(X).", 5);
    assert!(solutions.is_empty());
}

#[test]
fn test_iteration_budget_is_a_hard_error() {
    let source = parser::parse_program(LISTS_KB).unwrap();
    let program = compile(&source.clauses);
    let goals = parser::parse_query("?- nat(X).").unwrap();
    let mut machine = Machine::new(&program, goals).with_max_iters(10_000);
    // Draining an infinite enumeration must trip the budget.
    loop {
        match machine.next_solution() {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("nat/1 enumeration should not end"),
            Err(MachineError::MaxItersReached(10_000)) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}

#[test]
fn test_ground_query_yields_empty_solution() {
    let kb = "p(a).";
    let solutions = solve_n(kb, "?- p(a).", 5);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].to_string(), "true");
}

#[test]
fn test_deep_recursion_through_tail_calls() {
    // length of a 50-element list, all tail calls.
    let items: Vec<Term> = (0..50).map(|_| Term::atom("x")).collect();
    let list = Term::list(items);
    let source = parser::parse_program(LISTS_KB).unwrap();
    let program = compile(&source.clauses);
    let query = vec![Struct::new("length", vec![list, Term::var("N")])];
    let solutions: Vec<_> = Machine::new(&program, query)
        .solutions()
        .take(2)
        .map(|s| s.unwrap())
        .collect();
    assert_eq!(solutions.len(), 1);
    // The answer is s^50(0).
    let mut expected = Term::atom("0");
    for _ in 0..50 {
        expected = Term::Struct(Struct::new("s", vec![expected]));
    }
    assert_eq!(solutions[0].get("N"), Some(&expected));
}
