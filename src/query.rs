// src/query.rs

use rusqlite::{types::Value, Connection};
use std::fmt;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::load::table::quote_ident;
use crate::transform::currency_column;

/// Rows and column names of one read-only statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

fn render(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => format!("{:?}", f),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

impl fmt::Display for QueryResult {
    /// Plain-text table with a leading row index, like a dataframe print.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(render).collect())
            .collect();
        let idx_width = self.rows.len().saturating_sub(1).to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:idx_width$}", "", idx_width = idx_width)?;
        for (c, w) in self.columns.iter().zip(&widths) {
            write!(f, "  {:>w$}", c, w = w)?;
        }
        writeln!(f)?;
        for (i, row) in cells.iter().enumerate() {
            write!(f, "{:>idx_width$}", i, idx_width = idx_width)?;
            for (v, w) in row.iter().zip(&widths) {
                write!(f, "  {:>w$}", v, w = w)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Execute one read-only statement and collect everything it returns.
/// Statements that could write are refused before they run.
pub fn run_query(query: &str, conn: &Connection) -> Result<QueryResult> {
    let query_err = |source: rusqlite::Error| PipelineError::Query {
        query: query.to_string(),
        source,
    };

    let mut stmt = conn.prepare(query).map_err(query_err)?;
    if !stmt.readonly() {
        return Err(PipelineError::NotReadOnly(query.to_string()));
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut out = Vec::new();
    let mut rows = stmt.query([]).map_err(query_err)?;
    while let Some(row) = rows.next().map_err(query_err)? {
        let values = (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_err)?;
        out.push(values);
    }
    debug!(query, rows = out.len(), "query finished");
    Ok(QueryResult { columns, rows: out })
}

/// The three reports every run prints: the whole table, the average of one
/// converted column, and the first five names in table order.
pub fn standard_queries(table_name: &str, average_currency: &str) -> Vec<String> {
    let table = quote_ident(table_name);
    vec![
        format!("SELECT * FROM {}", table),
        format!(
            "SELECT AVG({}) FROM {}",
            currency_column(average_currency),
            table
        ),
        format!("SELECT Name FROM {} LIMIT 5", table),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::open_mem_db;

    fn seeded() -> Connection {
        let conn = open_mem_db().unwrap();
        conn.execute_batch(
            "CREATE TABLE Largest_banks (Name TEXT, MC_USD_Billion REAL, MC_GBP_Billion REAL);
             INSERT INTO Largest_banks VALUES ('A', 10.0, 8.0), ('B', 20.0, 16.0),
               ('C', 30.0, 24.0), ('D', 1.0, 0.8), ('E', 2.0, 1.6), ('F', 3.0, 2.4);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_standard_queries() {
        let conn = seeded();
        let qs = standard_queries("Largest_banks", "GBP");
        assert_eq!(qs[1], "SELECT AVG(MC_GBP_Billion) FROM \"Largest_banks\"");

        let all = run_query(&qs[0], &conn).unwrap();
        assert_eq!(all.columns, vec!["Name", "MC_USD_Billion", "MC_GBP_Billion"]);
        assert_eq!(all.rows.len(), 6);

        let avg = run_query(&qs[1], &conn).unwrap();
        match avg.scalar() {
            Some(Value::Real(v)) => assert!((v - 8.8).abs() < 1e-9),
            other => panic!("unexpected average {:?}", other),
        }

        let names = run_query(&qs[2], &conn).unwrap();
        let names: Vec<_> = names.rows.iter().map(|r| render(&r[0])).collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_write_statement_refused() {
        let conn = seeded();
        assert!(matches!(
            run_query("DELETE FROM Largest_banks", &conn),
            Err(PipelineError::NotReadOnly(_))
        ));
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM Largest_banks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 6);
    }

    #[test]
    fn test_malformed_query() {
        let conn = seeded();
        assert!(matches!(
            run_query("SELECT nope FROM Largest_banks", &conn),
            Err(PipelineError::Query { .. })
        ));
    }

    #[test]
    fn test_display_renders_header_and_index() {
        let result = QueryResult {
            columns: vec!["Name".into()],
            rows: vec![vec![Value::Text("A".into())], vec![Value::Text("Bank".into())]],
        };
        let text = result.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec!["   Name", "0     A", "1  Bank"]);
    }

    #[test]
    fn test_display_aligns_non_ascii_names() {
        let result = QueryResult {
            columns: vec!["Name".into()],
            rows: vec![
                vec![Value::Text("Société Générale".into())],
                vec![Value::Text("BNP Paribas".into())],
            ],
        };
        let text = result.to_string();
        let widths: Vec<usize> = text.lines().map(|l| l.chars().count()).collect();
        assert_eq!(widths, vec![19, 19, 19]);
        assert!(text.lines().nth(2).unwrap().ends_with("     BNP Paribas"));
    }
}
