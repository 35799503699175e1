//! Clause substitution
//!
//! Replaces located time expressions with a new bounded clause. Substitution
//! is textual and exact against the canonicalized statement, which is the
//! same text the locator rendered its spans from; a clause that cannot be
//! found verbatim is a fatal integration error, never silently skipped.

use crate::error::{Error, Result};
use crate::sql::token::parse;
use crate::time::TimeRange;

/// Replace the first remaining occurrence of each located clause in `sql`
/// with `new_clause`, returning the rewritten canonical statement.
pub fn rewrite(sql: &str, clauses: &[String], new_clause: &str) -> Result<String> {
    let mut statement = parse(sql)?.canonical();
    for clause in clauses {
        if !statement.contains(clause.as_str()) {
            return Err(Error::ClauseRewriteMismatch(clause.clone()));
        }
        statement = statement.replacen(clause.as_str(), new_clause, 1);
    }
    Ok(statement)
}

/// Render the replacement expression bounding `column` to `[start, end)`
pub fn bounded_clause(column: &str, range: &TimeRange) -> String {
    format!(
        "{column} >= '{start}' and {column} < '{end}'",
        column = column,
        start = range.start_iso(),
        end = range.end_iso(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::locate::find_time_clauses;
    use chrono::{TimeZone, Utc};

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 2, 2, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_bounded_clause_is_left_closed_right_open() {
        assert_eq!(
            bounded_clause("utc_time", &range()),
            "utc_time >= '2020-02-01T00:00:00' and utc_time < '2020-02-02T00:00:00'"
        );
    }

    #[test]
    fn test_rewrite_bounds_window_and_keeps_surrounding_case() {
        let sql = "SELECT * FROM t WHERE utc_time >= '2020-01-01' AND region = 'x'";
        let clauses = find_time_clauses(sql, "utc_time").unwrap();
        let rewritten = rewrite(sql, &clauses, &bounded_clause("utc_time", &range())).unwrap();
        assert_eq!(
            rewritten,
            "SELECT * FROM t WHERE utc_time >= '2020-02-01T00:00:00' \
             and utc_time < '2020-02-02T00:00:00' AND region = 'x'"
        );
    }

    #[test]
    fn test_rewrite_leaves_other_predicates_untouched() {
        let sql = "select * from t where a = 1 and utc_time > 'x' and b = 2";
        let clauses = find_time_clauses(sql, "utc_time").unwrap();
        let rewritten = rewrite(sql, &clauses, "utc_time > 'y'").unwrap();
        assert_eq!(rewritten, "select * from t where a = 1 and utc_time > 'y' and b = 2");
    }

    #[test]
    fn test_rewritten_statement_contains_new_clause_verbatim() {
        let sql = "select * from t where utc_time >= 'a' and utc_time < 'b'";
        let clauses = find_time_clauses(sql, "utc_time").unwrap();
        let new_clause = bounded_clause("utc_time", &range());
        let rewritten = rewrite(sql, &clauses, &new_clause).unwrap();
        let located_after = find_time_clauses(&rewritten, "utc_time").unwrap();
        assert_eq!(located_after, vec![new_clause]);
    }

    #[test]
    fn test_each_located_clause_replaced_once() {
        let sql = "select * from t where utc_time > 'a' or region = 'x' or utc_time < 'b'";
        let clauses = find_time_clauses(sql, "utc_time").unwrap();
        let rewritten = rewrite(sql, &clauses, "bounded").unwrap();
        assert_eq!(rewritten, "select * from t where bounded or region = 'x' or bounded");
    }

    #[test]
    fn test_missing_clause_is_a_fatal_mismatch() {
        let err = rewrite(
            "select * from t",
            &["utc_time > 'a'".to_string()],
            "bounded",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ClauseRewriteMismatch(_)));
    }
}
