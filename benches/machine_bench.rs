// benches/machine_bench.rs
//! Criterion benchmarks for compilation and query solving.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use horn::parser;
use horn::{compile, Machine};

const KB: &str = "
member(E, [H|T]) :- member_(T, E, H).
member_(_, E, E).
member_([H|T], E, _) :- member_(T, E, H).

length([], 0).
length([_|T], s(L)) :- length(T, L).

nat(0).
nat(s(X)) :- nat(X).
";

fn bench_compile(c: &mut Criterion) {
    let clauses = parser::parse_program(KB).unwrap().clauses;
    c.bench_function("compile_kb", |b| {
        b.iter(|| compile(black_box(&clauses)))
    });
}

fn bench_member_of_length_three(c: &mut Criterion) {
    let clauses = parser::parse_program(KB).unwrap().clauses;
    let program = compile(&clauses);
    let query = parser::parse_query("?- length(L, s(s(s(0)))), member(a, L).").unwrap();
    c.bench_function("member_length_3", |b| {
        b.iter(|| {
            let machine = Machine::new(&program, black_box(query.clone()));
            machine.solutions().filter_map(Result::ok).count()
        })
    });
}

fn bench_nat_enumeration(c: &mut Criterion) {
    let clauses = parser::parse_program(KB).unwrap().clauses;
    let program = compile(&clauses);
    let query = parser::parse_query("?- nat(X).").unwrap();
    c.bench_function("nat_first_32", |b| {
        b.iter(|| {
            let machine = Machine::new(&program, black_box(query.clone()));
            machine.solutions().take(32).filter_map(Result::ok).count()
        })
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_member_of_length_three,
    bench_nat_enumeration
);
criterion_main!(benches);
