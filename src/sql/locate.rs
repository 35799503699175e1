//! WHERE-clause time-expression locator
//!
//! Walks every WHERE clause of a statement and extracts the sub-expressions
//! that filter on a named time column. A time expression is delimited by the
//! top-level boolean connectives (`AND`/`OR`) of the flattened clause, or by
//! the clause boundary itself. Consecutive connective-delimited segments that
//! each reference the column merge into a single expression, so
//! `col >= a and col < b` comes back as one span, not two.

use crate::error::Result;
use crate::sql::token::{flatten_clause, parse, Token, TokenKind};

/// Return the canonical text of every time expression in `sql`, across every
/// WHERE clause, in document order (outer clause before nested).
///
/// Matching is restricted to bare identifier tokens equal to `time_column`;
/// string literals and quoted identifiers never match.
pub fn find_time_clauses(sql: &str, time_column: &str) -> Result<Vec<String>> {
    let statement = parse(sql)?;
    let mut clauses = Vec::new();
    for clause in statement.where_clauses() {
        let mut tokens = Vec::new();
        flatten_clause(clause, &mut tokens);
        locate_in_clause(&tokens, time_column, &mut clauses);
    }
    Ok(clauses)
}

/// Scan one flattened clause. `tokens[0]` is the `WHERE` keyword; the body is
/// split into segments at each connective, segments referencing the column
/// are merged when adjacent, and each merged run is emitted as one expression.
fn locate_in_clause(tokens: &[&Token], time_column: &str, out: &mut Vec<String>) {
    if tokens.is_empty() {
        return;
    }

    // (start, end, references_time_column) over the clause body
    let mut segments: Vec<(usize, usize, bool)> = Vec::new();
    let mut start = 1;
    let mut references = false;
    for (i, token) in tokens.iter().enumerate().skip(1) {
        if token.is_connective() {
            segments.push((start, i, references));
            start = i + 1;
            references = false;
        } else if token.kind == TokenKind::Name && token.text == time_column {
            references = true;
        }
    }
    segments.push((start, tokens.len(), references));

    let mut i = 0;
    while i < segments.len() {
        if !segments[i].2 {
            i += 1;
            continue;
        }
        let span_start = segments[i].0;
        let mut j = i;
        while j + 1 < segments.len() && segments[j + 1].2 {
            j += 1;
        }
        let span_end = segments[j].1;
        out.push(render_span(&tokens[span_start..span_end]));
        i = j + 1;
    }
}

fn render_span(tokens: &[&Token]) -> String {
    let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
    text.trim().to_string()
}
