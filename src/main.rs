// src/main.rs
use std::env;
use std::fs;
use std::process;

use horn::parser;
use horn::{compile, Machine};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: hornc <file.pl> [--query '?- ...'] [--listing] [--max-solutions N]");
        process::exit(1);
    }
    let filename = &args[1];

    // Collect the optional flags.
    let mut queries: Vec<String> = Vec::new();
    let mut listing = false;
    let mut max_solutions: Option<usize> = None;
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--query" | "-q" => match rest.next() {
                Some(query) => queries.push(query.clone()),
                None => {
                    eprintln!("--query expects an argument");
                    process::exit(1);
                }
            },
            "--listing" | "-l" => listing = true,
            "--max-solutions" | "-n" => {
                let n = rest.next().and_then(|n| n.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--max-solutions expects a number");
                    process::exit(1);
                });
                max_solutions = Some(n);
            }
            other => {
                eprintln!("Unknown flag: {}", other);
                process::exit(1);
            }
        }
    }

    let text = fs::read_to_string(filename).unwrap_or_else(|e| {
        eprintln!("Failed to read '{}': {}", filename, e);
        process::exit(1);
    });
    let source = parser::parse_program(&text).unwrap_or_else(|e| {
        eprintln!("Failed to parse '{}': {}", filename, e);
        process::exit(1);
    });

    let program = compile(&source.clauses);
    if listing {
        print!("{}", program.listing());
    }

    // Queries from flags run after those found in the file itself.
    let mut goals = source.queries;
    for query in &queries {
        let parsed = parser::parse_query(query).unwrap_or_else(|e| {
            eprintln!("Failed to parse query '{}': {}", query, e);
            process::exit(1);
        });
        goals.push(parsed);
    }

    for query in goals {
        let machine = Machine::new(&program, query);
        let mut found = 0usize;
        for solution in machine.solutions() {
            match solution {
                Ok(solution) => {
                    println!("{}", solution);
                    found += 1;
                    if max_solutions.is_some_and(|max| found >= max) {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Machine execution error: {}", e);
                    process::exit(1);
                }
            }
        }
        if found == 0 {
            println!("false");
        }
    }
}
