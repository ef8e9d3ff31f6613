// src/parser.rs
//! The surface-syntax front end.
//!
//! A program is a sequence of clauses (`head.` or `head :- g1, ..., gn.`)
//! and query directives (`?- g1, ..., gn.`), with `%` comments. Variables
//! begin with an uppercase letter or an underscore; atoms begin with a
//! lowercase letter or a digit, or are single-quoted. List sugar
//! `[a, b | T]` desugars to `.`/2 cells with a `[]` tail. The comparison
//! builtins may be written infix (`X < Y`) or prefix (`<(X, Y)`).
//!
//! All front-end errors (invalid variable contexts, missing periods,
//! unterminated input) are reported here and never reach the machine.

use thiserror::Error;

use crate::machine::term::{is_var_name, Clause, Struct, Term};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}, column {column}: {message}")]
    Syntax { line: usize, column: usize, message: String },
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(String),
}

/// A parsed source file: the knowledge base plus any `?-` directives, in
/// source order.
#[derive(Debug, Default, PartialEq)]
pub struct SourceFile {
    pub clauses: Vec<Clause>,
    pub queries: Vec<Vec<Struct>>,
}

/// Parses a whole program.
pub fn parse_program(input: &str) -> Result<SourceFile, ParseError> {
    let mut parser = Parser::new(input);
    let mut source = SourceFile::default();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            return Ok(source);
        }
        if parser.eat("?-") {
            source.queries.push(parser.parse_goals()?);
        } else {
            source.clauses.push(parser.parse_clause()?);
        }
    }
}

/// Parses a single query, with or without the leading `?-`.
pub fn parse_query(input: &str) -> Result<Vec<Struct>, ParseError> {
    let mut parser = Parser::new(input);
    parser.skip_whitespace();
    parser.eat("?-");
    let goals = parser.parse_goals()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("trailing input after query"));
    }
    Ok(goals)
}

/// Infix spellings of the comparison and unification builtins, longest
/// first so that `=<` is not read as `=`.
const INFIX_OPS: [&str; 7] = ["\\==", "==", "=<", ">=", "<", ">", "="];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Parser<'a> {
        Parser { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Consumes `token` if the input continues with it.
    fn eat(&mut self, token: &str) -> bool {
        if self.input[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            while let Some(c) = self.current_char() {
                if c.is_whitespace() {
                    self.pos += c.len_utf8();
                } else {
                    break;
                }
            }
            if self.current_char() == Some('%') {
                while let Some(c) = self.current_char() {
                    self.pos += c.len_utf8();
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let consumed = &self.input[..self.pos.min(self.input.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.chars().rev().take_while(|&c| c != '\n').count() + 1;
        ParseError::Syntax { line, column, message: message.into() }
    }

    fn expect(&mut self, token: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.eat(token) {
            Ok(())
        } else if self.at_end() {
            Err(ParseError::UnexpectedEof(format!("expected `{}`", token)))
        } else {
            Err(self.error(format!("expected `{}`", token)))
        }
    }

    /// clause := struct `.` | struct `:-` goals `.`
    fn parse_clause(&mut self) -> Result<Clause, ParseError> {
        let head = self.parse_term()?;
        let head = self.to_goal(head, "clause head")?;
        self.skip_whitespace();
        if self.eat(":-") {
            let body = self.parse_goals()?;
            Ok(Clause::new(head, body))
        } else {
            self.expect(".")?;
            Ok(Clause::fact(head))
        }
    }

    /// goals := goal (`,` goal)* `.`
    fn parse_goals(&mut self) -> Result<Vec<Struct>, ParseError> {
        let mut goals = vec![self.parse_goal()?];
        loop {
            self.skip_whitespace();
            if self.eat(",") {
                goals.push(self.parse_goal()?);
            } else {
                self.expect(".")?;
                return Ok(goals);
            }
        }
    }

    /// goal := term (infix-op term)?
    fn parse_goal(&mut self) -> Result<Struct, ParseError> {
        let left = self.parse_term()?;
        self.skip_whitespace();
        for op in INFIX_OPS {
            if self.eat(op) {
                let right = self.parse_term()?;
                return Ok(Struct::new(op, vec![left, right]));
            }
        }
        self.to_goal(left, "goal")
    }

    fn to_goal(&self, term: Term, context: &str) -> Result<Struct, ParseError> {
        match term {
            Term::Struct(s) => Ok(s),
            Term::Atom(name) => Ok(Struct::new(name, Vec::new())),
            Term::Var(name) => {
                Err(self.error(format!("variable {} cannot be used as a {}", name, context)))
            }
        }
    }

    /// term := var | atom | compound | list
    fn parse_term(&mut self) -> Result<Term, ParseError> {
        self.skip_whitespace();
        match self.current_char() {
            None => Err(ParseError::UnexpectedEof("expected a term".into())),
            Some('[') => self.parse_list(),
            Some('\'') => {
                let name = self.parse_quoted_atom()?;
                self.parse_compound_or_atom(name)
            }
            Some(c) if c.is_alphanumeric() || c == '_' => {
                let name = self.parse_identifier()?;
                if is_var_name(&name) {
                    Ok(Term::Var(name))
                } else {
                    self.parse_compound_or_atom(name)
                }
            }
            Some(c) => Err(self.error(format!("unexpected character `{}`", c))),
        }
    }

    /// With `name` already read: `name(args)` or the bare atom.
    fn parse_compound_or_atom(&mut self, name: String) -> Result<Term, ParseError> {
        if self.current_char() == Some('(') {
            self.pos += 1;
            let mut args = vec![self.parse_term()?];
            loop {
                self.skip_whitespace();
                if self.eat(",") {
                    args.push(self.parse_term()?);
                } else {
                    self.expect(")")?;
                    return Ok(Term::Struct(Struct::new(name, args)));
                }
            }
        } else {
            Ok(Term::Atom(name))
        }
    }

    /// list := `[]` | `[` term (`,` term)* (`|` term)? `]`
    fn parse_list(&mut self) -> Result<Term, ParseError> {
        self.expect("[")?;
        self.skip_whitespace();
        if self.eat("]") {
            return Ok(Term::atom("[]"));
        }
        let mut items = vec![self.parse_term()?];
        loop {
            self.skip_whitespace();
            if self.eat(",") {
                items.push(self.parse_term()?);
            } else if self.eat("|") {
                let tail = self.parse_term()?;
                self.expect("]")?;
                return Ok(cons_list(items, tail));
            } else {
                self.expect("]")?;
                return Ok(cons_list(items, Term::atom("[]")));
            }
        }
    }

    /// identifier := (alnum | `_`)+
    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if start == self.pos {
            Err(self.error("expected an identifier"))
        } else {
            Ok(self.input[start..self.pos].to_string())
        }
    }

    /// quoted atom := `'` ... `'`
    fn parse_quoted_atom(&mut self) -> Result<String, ParseError> {
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c == '\'' {
                let name = self.input[start..self.pos].to_string();
                self.pos += 1;
                return Ok(name);
            }
            self.pos += c.len_utf8();
        }
        Err(ParseError::UnexpectedEof("unterminated quoted atom".into()))
    }
}

fn cons_list(items: Vec<Term>, tail: Term) -> Term {
    let mut list = tail;
    for item in items.into_iter().rev() {
        list = Term::Struct(Struct::new(".", vec![item, list]));
    }
    list
}
