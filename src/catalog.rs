//! Dataset loading and the per-table `{name -> type}` catalog (spec §4.A).

use std::path::Path;

use duckdb::Connection;

use crate::error::{Error, Result};

/// The sample dataset bundled with the crate, used when no path is given.
const SAMPLE_CSV: &str = include_str!("../assets/sample.csv");

/// Semantic type bucket a column falls into (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    Temporal,
    String,
}

/// One column's name, raw DuckDB type, and semantic bucket.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub kind: ColumnType,
}

/// Buckets a DuckDB type name into the three semantic classes of spec §3.
pub fn classify_sql_type(sql_type: &str) -> ColumnType {
    let upper = sql_type.to_ascii_uppercase();
    const NUMERIC_MARKERS: &[&str] = &[
        "INT", "DOUBLE", "REAL", "DECIMAL", "NUMERIC", "FLOAT", "BIGINT",
    ];
    const TEMPORAL_MARKERS: &[&str] = &["TIMESTAMP", "DATE", "DATETIME"];

    if TEMPORAL_MARKERS.iter().any(|m| upper.contains(m)) {
        ColumnType::Temporal
    } else if NUMERIC_MARKERS.iter().any(|m| upper.contains(m)) {
        ColumnType::Numeric
    } else {
        ColumnType::String
    }
}

/// The process-wide handle to the analytical engine plus the tables loaded
/// into it.
pub struct Catalog {
    tables: indexmap::IndexMap<String, Vec<ColumnInfo>>,
}

impl Catalog {
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnInfo]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn column(&self, table: &str, name: &str) -> Option<&ColumnInfo> {
        self.columns(table)?.iter().find(|c| c.name == name)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn load_from_connection(conn: &Connection) -> Result<Self> {
        let mut tables = indexmap::IndexMap::new();
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<_>>()?;
        drop(stmt);

        for name in names {
            let mut info_stmt = conn.prepare(&format!("PRAGMA table_info({})", crate::quote::quote_ident(&name)))?;
            let columns: Vec<ColumnInfo> = info_stmt
                .query_map([], |row| {
                    let col_name: String = row.get(1)?;
                    let sql_type: String = row.get(2)?;
                    Ok(ColumnInfo {
                        kind: classify_sql_type(&sql_type),
                        name: col_name,
                        sql_type,
                    })
                })?
                .collect::<duckdb::Result<_>>()?;
            tables.insert(name, columns);
        }

        Ok(Self { tables })
    }
}

/// A dataset: the analytical engine connection plus its catalog. Lives for
/// process lifetime (spec §3 "Lifecycle").
pub struct Dataset {
    pub(crate) conn: std::sync::Mutex<Connection>,
    pub(crate) catalog: Catalog,
}

impl Dataset {
    /// Open `path` and build the catalog. `path == Some("TEST")` loads a
    /// fixed multi-table fixture; `None` loads the bundled sample CSV.
    ///
    /// # Errors
    /// Returns [`Error::DatasetNotFound`] if a file path is given but does
    /// not exist, or a database error if loading otherwise fails.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path.and_then(|p| p.to_str()) {
            Some("TEST") => Self::open_test_fixture()?,
            None => Self::open_sample()?,
            Some(_) => {
                let path = path.expect("checked above");
                if !path.exists() {
                    return Err(Error::DatasetNotFound {
                        path: path.to_path_buf(),
                    });
                }
                Self::open_path(path)?
            }
        };

        let catalog = Catalog::load_from_connection(&conn)?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            catalog,
        })
    }

    fn open_sample() -> Result<Connection> {
        let conn = Connection::open_in_memory()?;
        let dir = tempfile::tempdir()?;
        let csv_path = dir.path().join("sample.csv");
        std::fs::write(&csv_path, SAMPLE_CSV)?;
        conn.execute_batch(&format!(
            "CREATE TABLE events AS SELECT * FROM read_csv_auto('{}')",
            csv_path.display()
        ))?;
        Ok(conn)
    }

    fn open_test_fixture() -> Result<Connection> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            r"
            CREATE TABLE events (timestamp TIMESTAMP, event VARCHAR, value DOUBLE, user VARCHAR);
            INSERT INTO events VALUES
                ('2024-01-01 00:00:00', 'login', 10, 'alice'),
                ('2024-01-01 03:00:00', 'logout', 20, 'bob'),
                ('2024-01-01 12:00:00', 'login', 30, 'alice'),
                ('2024-01-02 00:00:00', 'login', 40, 'charlie'),
                ('2024-01-02 03:00:00', 'logout', 50, 'charlie');

            CREATE TABLE extra (timestamp TIMESTAMP, note VARCHAR, amount DOUBLE);
            INSERT INTO extra VALUES
                ('2024-01-01 01:00:00', 'alpha', 1.5),
                ('2024-01-01 02:00:00', 'beta', 2.5);
            ",
        )?;
        Ok(conn)
    }

    fn open_path(path: &Path) -> Result<Connection> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" => {
                let conn = Connection::open_in_memory()?;
                conn.execute_batch(&format!(
                    "CREATE TABLE events AS SELECT * FROM read_csv_auto('{}')",
                    path.display()
                ))?;
                Ok(conn)
            }
            "sqlite" | "db" | "sqlite3" => Self::open_sqlite(path),
            _ => Connection::open(path).map_err(Error::from),
        }
    }

    /// Native attach first; on failure, fall back to a row-by-row copy
    /// (spec §4.A, §9 "SQLite fallback").
    fn open_sqlite(path: &Path) -> Result<Connection> {
        let conn = Connection::open_in_memory()?;
        let attach_sql = format!(
            "INSTALL sqlite; LOAD sqlite; ATTACH '{}' AS sqlite_src (TYPE sqlite); \
             CREATE SCHEMA IF NOT EXISTS main; \
             CREATE OR REPLACE VIEW events AS SELECT * FROM sqlite_src.events;",
            path.display()
        );
        if conn.execute_batch(&attach_sql).is_ok() {
            return Ok(conn);
        }

        Self::copy_sqlite_tables(path)
    }

    fn copy_sqlite_tables(path: &Path) -> Result<Connection> {
        let src = rusqlite::Connection::open(path)
            .map_err(|e| Error::Schema(format!("failed to open sqlite fallback: {e}")))?;

        let mut table_stmt = src
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .map_err(|e| Error::Schema(e.to_string()))?;
        let table_names: Vec<String> = table_stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| Error::Schema(e.to_string()))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::Schema(e.to_string()))?;
        drop(table_stmt);

        let dest = Connection::open_in_memory()?;
        for table in table_names {
            Self::copy_one_sqlite_table(&src, &dest, &table)?;
        }
        Ok(dest)
    }

    /// Distinct values of `column` in `table` whose text contains
    /// `substring` (case-insensitive), for autocomplete (spec §4.H).
    /// Capped at 20 results. Non-string columns return empty without
    /// touching the engine.
    ///
    /// # Errors
    /// Returns [`Error::Schema`] for an unknown table/column, or
    /// [`Error::Execution`] if the lookup query fails at the engine.
    pub fn sample_values(&self, table: &str, column: &str, substring: &str) -> Result<Vec<String>> {
        let col = self
            .catalog
            .column(table, column)
            .ok_or_else(|| Error::Schema(format!("Unknown column: {column}")))?;
        if col.kind != ColumnType::String {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().expect("connection mutex poisoned");
        let sql = format!(
            "SELECT DISTINCT CAST({col} AS VARCHAR) FROM {tbl} \
             WHERE {col} IS NOT NULL AND CAST({col} AS VARCHAR) ILIKE ? \
             ORDER BY 1 LIMIT 20",
            col = crate::quote::quote_ident(column),
            tbl = crate::quote::quote_ident(table),
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::Execution {
            message: e.to_string(),
            sql: sql.clone(),
        })?;
        let pattern = format!("%{substring}%");
        let values: Vec<String> = stmt
            .query_map([pattern], |row| row.get(0))
            .map_err(|e| Error::Execution {
                message: e.to_string(),
                sql: sql.clone(),
            })?
            .collect::<duckdb::Result<_>>()
            .map_err(|e| Error::Execution {
                message: e.to_string(),
                sql,
            })?;
        Ok(values)
    }

    fn copy_one_sqlite_table(
        src: &rusqlite::Connection,
        dest: &Connection,
        table: &str,
    ) -> Result<()> {
        let mut info_stmt = src
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| Error::Schema(e.to_string()))?;
        let columns: Vec<(String, String)> = info_stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let ty: String = row.get(2)?;
                Ok((name, ty))
            })
            .map_err(|e| Error::Schema(e.to_string()))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::Schema(e.to_string()))?;

        let ddl_columns: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("{} {}", crate::quote::quote_ident(name), sqlite_type_to_duckdb(ty)))
            .collect();
        dest.execute_batch(&format!(
            "CREATE TABLE {} ({});",
            crate::quote::quote_ident(table),
            ddl_columns.join(", ")
        ))?;

        let col_list = columns
            .iter()
            .map(|(name, _)| crate::quote::quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut row_stmt = src
            .prepare(&format!("SELECT {col_list} FROM {table}"))
            .map_err(|e| Error::Schema(e.to_string()))?;
        let placeholders = vec!["?"; columns.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO {} VALUES ({placeholders})",
            crate::quote::quote_ident(table)
        );

        let mut rows = row_stmt
            .query([])
            .map_err(|e| Error::Schema(e.to_string()))?;
        while let Some(row) = rows.next().map_err(|e| Error::Schema(e.to_string()))? {
            let mut appender_params: Vec<Box<dyn duckdb::types::ToSql>> = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: rusqlite::types::Value = row
                    .get(i)
                    .map_err(|e| Error::Schema(e.to_string()))?;
                appender_params.push(sqlite_value_to_duckdb(value));
            }
            let refs: Vec<&dyn duckdb::types::ToSql> = appender_params.iter().map(AsRef::as_ref).collect();
            dest.execute(&insert_sql, refs.as_slice())?;
        }

        Ok(())
    }
}

/// Maps a SQLite declared type to a DuckDB one, per spec §4.A / §9.
fn sqlite_type_to_duckdb(sqlite_type: &str) -> &'static str {
    let upper = sqlite_type.to_ascii_uppercase();
    if upper.starts_with("LONGVARCHAR") || upper.starts_with("VARCHAR") || upper.contains("CHAR") || upper.contains("TEXT") {
        "VARCHAR"
    } else if upper.contains("BIGINT") {
        "BIGINT"
    } else if upper.contains("INT") {
        "INTEGER"
    } else if upper.contains("REAL") || upper.contains("DOUBLE") || upper.contains("FLOAT") {
        "DOUBLE"
    } else if upper.contains("BOOL") {
        "BOOLEAN"
    } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        "TIMESTAMP"
    } else if upper.contains("DATE") {
        "DATE"
    } else {
        "VARCHAR"
    }
}

fn sqlite_value_to_duckdb(value: rusqlite::types::Value) -> Box<dyn duckdb::types::ToSql> {
    use rusqlite::types::Value as V;
    match value {
        V::Null => Box::new(Option::<String>::None),
        V::Integer(i) => Box::new(i),
        V::Real(f) => Box::new(f),
        V::Text(s) => Box::new(s),
        V::Blob(b) => Box::new(b),
    }
}
