//! SMT-LIB2 rendering of a capacity query.
//!
//! The script asserts the variable bounds and the negated conjunction of the
//! constraints, so `sat` means "some usage within estimates violates a
//! constraint", the same question the built-in search answers.

use crate::compiler::{Comparison, Constraint, Expr, Variable};
use std::fmt::Write;

// Quoted symbols may not contain `|` or `\`. The variable index keeps
// `A.b`+`c` and `A`+`b.c` apart.
fn symbol(variable: &Variable) -> String {
    let name = variable.name().replace(['|', '\\'], "_");
    format!("|{name}#{}|", variable.id.0)
}

fn literal(n: i128) -> String {
    if n < 0 {
        format!("(- {})", -n)
    } else {
        n.to_string()
    }
}

fn term(expr: &Expr, variables: &[Variable]) -> String {
    match expr {
        Expr::Const(c) => literal(i128::from(*c)),
        Expr::Var(v) => variables
            .get(v.0)
            .map_or_else(|| format!("v{}", v.0), symbol),
        Expr::Sum(terms) => match terms.as_slice() {
            [] => "0".to_string(),
            [single] => term(single, variables),
            _ => format!(
                "(+ {})",
                terms.iter().map(|t| term(t, variables)).collect::<Vec<_>>().join(" ")
            ),
        },
        Expr::Max(terms) => extremum(terms, variables, ">="),
        Expr::Min(terms) => extremum(terms, variables, "<="),
        Expr::Scale(k, inner) => format!("(* {} {})", literal(i128::from(*k)), term(inner, variables)),
    }
}

/// `max`/`min` as nested `ite`.
fn extremum(terms: &[Expr], variables: &[Variable], keep_left: &str) -> String {
    let mut rendered = terms.iter().map(|t| term(t, variables));
    let first = rendered.next().unwrap_or_else(|| "0".to_string());
    rendered.fold(first, |acc, next| {
        format!("(ite ({keep_left} {acc} {next}) {acc} {next})")
    })
}

fn atom(constraint: &Constraint, variables: &[Variable]) -> String {
    let op = match constraint.comparison {
        Comparison::Le => "<=",
        Comparison::Lt => "<",
        Comparison::Ge => ">=",
        Comparison::Gt => ">",
        Comparison::Eq => "=",
    };
    format!(
        "({op} {} {})",
        term(&constraint.lhs, variables),
        term(&constraint.rhs, variables)
    )
}

/// Render declarations, bounds and the violation query.
#[must_use]
pub fn render(variables: &[Variable], constraints: &[Constraint]) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "(set-logic QF_LIA)");
    for v in variables {
        let name = symbol(v);
        let _ = writeln!(out, "(declare-const {name} Int)");
        let _ = writeln!(out, "(assert (and (<= {} {name}) (<= {name} {})))", v.min, v.max);
    }
    if constraints.is_empty() {
        let _ = writeln!(out, "(assert false)");
    } else {
        let _ = writeln!(out, "(assert (not (and");
        for c in constraints {
            let _ = writeln!(out, "  ; {}", c.id);
            let _ = writeln!(out, "  {}", atom(c, variables));
        }
        let _ = writeln!(out, ")))");
    }
    let _ = writeln!(out, "(check-sat)");
    let _ = writeln!(out, "(get-model)");
    out
}
