// tests/test_index.rs
//! First-argument index construction and the compiled-program listing.

use horn::parser;
use horn::{compile, Functor};

fn program_for(kb: &str) -> horn::CompiledProgram {
    compile(&parser::parse_program(kb).unwrap().clauses)
}

#[test]
fn test_non_variable_clauses_share_one_discriminating_group() {
    let program = program_for("nat(0). nat(s(X)) :- nat(X).");
    let indices = &program.indices[&Functor::new("nat", 1)];
    assert_eq!(indices.len(), 1);
    let index = &indices[0];
    assert!(!index.is_var);
    // The catch-all keeps both clauses in source order.
    assert_eq!(index.by_var.len(), 2);
    assert_eq!(index.by_atom["0"].len(), 1);
    assert_eq!(index.by_struct[&Functor::new("s", 1)].len(), 1);
}

#[test]
fn test_variable_headed_clauses_open_their_own_group() {
    let kb = "
member_(_, E, E).
member_([H|T], E, _) :- member_(T, E, H).
";
    let program = program_for(kb);
    let indices = &program.indices[&Functor::new("member_", 3)];
    assert_eq!(indices.len(), 2);
    assert!(indices[0].is_var);
    assert_eq!(indices[0].by_var.len(), 1);
    assert!(!indices[1].is_var);
    assert_eq!(indices[1].by_struct[&Functor::new(".", 2)].len(), 1);
}

#[test]
fn test_interleaved_groups_preserve_source_order() {
    let program = program_for("p(a). p(X) :- q(X). p(b).");
    let indices = &program.indices[&Functor::new("p", 1)];
    assert_eq!(indices.len(), 3);
    assert!(!indices[0].is_var);
    assert!(indices[1].is_var);
    assert!(!indices[2].is_var);
}

#[test]
fn test_zero_arity_predicates_are_variable_like() {
    let program = program_for("run. run :- setup.  setup.");
    let indices = &program.indices[&Functor::new("run", 0)];
    assert_eq!(indices.len(), 1);
    assert!(indices[0].is_var);
    assert_eq!(indices[0].by_var.len(), 2);
}

#[test]
fn test_atoms_missing_from_the_map_select_nothing() {
    let program = program_for("color(red). color(green).");
    let index = &program.indices[&Functor::new("color", 1)][0];
    assert!(index.by_atom.get("blue").is_none());
}

#[test]
fn test_listing_is_deterministic_and_readable() {
    let kb = "nat(0). nat(s(X)) :- nat(X). zero(0).";
    let listing = program_for(kb).listing();
    for _ in 0..5 {
        assert_eq!(program_for(kb).listing(), listing);
    }
    assert!(listing.contains("nat/1:"));
    assert!(listing.contains("zero/1:"));
    assert!(listing.contains("get_atom X0, 0"));
    assert!(listing.contains("execute nat/1"));
    // Predicates are listed in first-appearance order.
    assert!(listing.find("nat/1:").unwrap() < listing.find("zero/1:").unwrap());
}

#[test]
fn test_register_requirements_cover_all_codes() {
    let program = program_for("member(E, [H|T]) :- member_(T, E, H). member_(_, E, E).");
    assert!(program.num_regs() >= 4);
}
