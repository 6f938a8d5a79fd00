// src/load/table.rs

use rusqlite::{params_from_iter, types::Value, Connection};
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::extract::TABLE_ATTRIBS;
use crate::transform::{currency_column, EnrichedRow};

/// Open (or create) the SQLite file at `path`.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    Ok(conn)
}

/// SQLite in-memory database
pub fn open_mem_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    Ok(conn)
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column names in table order: the scraped attributes, then one per currency.
pub fn columns(target_currencies: &[String]) -> Vec<String> {
    TABLE_ATTRIBS
        .iter()
        .map(|s| s.to_string())
        .chain(target_currencies.iter().map(|c| currency_column(c)))
        .collect()
}

/// Drop and recreate `table_name`, then insert every row in order. All of it
/// runs in one transaction: either the whole new result set is visible or
/// the previous contents are untouched.
pub fn replace_table(
    conn: &mut Connection,
    table_name: &str,
    target_currencies: &[String],
    rows: &[EnrichedRow],
) -> Result<usize> {
    let table = quote_ident(table_name);
    let cols = columns(target_currencies);

    let col_defs = cols
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let ty = if i == 0 { "TEXT" } else { "REAL" };
            format!("{} {}", quote_ident(c), ty)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let ddl = format!(
        "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} ({col_defs});",
        table = table,
        col_defs = col_defs
    );
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        vec!["?"; cols.len()].join(", ")
    );
    debug!(%ddl, "replacing table");

    let tx = conn.transaction()?;
    tx.execute_batch(&ddl)?;
    {
        let mut stmt = tx.prepare(&insert)?;
        for row in rows {
            let mut values = vec![
                Value::Text(row.name.clone()),
                Value::Real(row.market_cap_usd),
            ];
            for code in target_currencies {
                // a row without this currency is stored as NULL
                values.push(row.converted(code).map_or(Value::Null, Value::Real));
            }
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    info!(table = table_name, rows = rows.len(), "table replaced");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Conversion;
    use tempfile::tempdir;

    fn codes() -> Vec<String> {
        vec!["GBP".into(), "EUR".into(), "INR".into()]
    }

    fn row(name: &str, usd: f64) -> EnrichedRow {
        EnrichedRow {
            name: name.into(),
            market_cap_usd: usd,
            conversions: vec![
                Conversion {
                    code: "GBP".into(),
                    value: usd / 2.0,
                },
                Conversion {
                    code: "EUR".into(),
                    value: usd / 4.0,
                },
                Conversion {
                    code: "INR".into(),
                    value: usd * 80.0,
                },
            ],
        }
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM Largest_banks", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_replace_inserts_in_order() {
        let mut conn = open_mem_db().unwrap();
        let rows = vec![row("Zeta", 3.0), row("Alpha", 1.0), row("Mid", 2.0)];
        assert_eq!(replace_table(&mut conn, "Largest_banks", &codes(), &rows).unwrap(), 3);

        let mut stmt = conn.prepare("SELECT Name, MC_GBP_Billion FROM Largest_banks").unwrap();
        let got: Vec<(String, f64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            got,
            vec![("Zeta".into(), 1.5), ("Alpha".into(), 0.5), ("Mid".into(), 1.0)]
        );
    }

    #[test]
    fn test_replace_is_not_append() {
        let tmp = tempdir().unwrap();
        let db = tmp.path().join("Banks.db");

        for _ in 0..2 {
            let mut conn = open_db(&db).unwrap();
            replace_table(&mut conn, "Largest_banks", &codes(), &[row("A", 1.0), row("B", 2.0)])
                .unwrap();
        }
        let conn = open_db(&db).unwrap();
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_schema_is_row_fields() {
        let mut conn = open_mem_db().unwrap();
        replace_table(&mut conn, "Largest_banks", &codes(), &[]).unwrap();
        let stmt = conn.prepare("SELECT * FROM Largest_banks").unwrap();
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        assert_eq!(names, columns(&codes()));
        assert_eq!(
            names,
            vec!["Name", "MC_USD_Billion", "MC_GBP_Billion", "MC_EUR_Billion", "MC_INR_Billion"]
        );
    }
}
