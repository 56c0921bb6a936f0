//! SQLite toolkit exposed to the agent
//!
//! Bundles a read-only database connection with the model client and
//! exposes the three tools the ReAct loop can call:
//!
//! ```text
//! sql_db_list_tables  ""                 → "dresses, sales"
//! sql_db_schema       "dresses, sales"   → CREATE TABLE ... + 3 sample rows
//! sql_db_query        "SELECT ..."       → [(1, 'red'), (2, 'blue')]
//! ```
//!
//! rusqlite is blocking, so every call hops onto `spawn_blocking`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use super::safety::{check_read_only, Rejection};
use crate::ollama::{ModelHandle, Tool};

/// Default database, relative to the working directory
pub const DEFAULT_DATABASE_URI: &str = "sqlite:///dresses.db";

/// Rows sampled per table by `sql_db_schema`
const SAMPLE_ROWS: usize = 3;

/// Shared toolkit handle held by the session store
pub type ToolkitHandle = Arc<SqlToolkit>;

/// Error type for toolkit operations
#[derive(Debug)]
pub enum ToolkitError {
    /// URI could not be parsed or names an unsupported dialect
    InvalidUri(String),
    /// Database could not be opened
    Open(rusqlite::Error),
    /// Statement failed inside SQLite
    Query(rusqlite::Error),
    /// Statement refused by the read-only guard
    Rejected(Rejection),
    /// `sql_db_schema` named tables that do not exist
    UnknownTables(Vec<String>),
    /// Agent asked for a tool the toolkit does not provide
    UnknownTool(String),
    /// Blocking task panicked or was cancelled; the connection is unusable
    Task(String),
}

impl std::fmt::Display for ToolkitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolkitError::InvalidUri(uri) => {
                write!(f, "ArgumentError: could not parse database URI '{}'", uri)
            }
            ToolkitError::Open(e) => write!(f, "OperationalError: unable to open database: {}", e),
            ToolkitError::Query(e) => write!(f, "(OperationalError) {}", e),
            ToolkitError::Rejected(r) => write!(f, "statement rejected: {}", r),
            ToolkitError::UnknownTables(names) => {
                write!(f, "table_names {{{}}} not found in database", names.join(", "))
            }
            ToolkitError::UnknownTool(name) => {
                write!(f, "toolkit has no tool named '{}'", name)
            }
            ToolkitError::Task(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for ToolkitError {}

impl ToolkitError {
    /// Fatal errors end the turn; the rest are fed back to the agent as observations
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolkitError::Task(_))
    }
}

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

/// Parse a SQLAlchemy-style SQLite URI
///
/// `sqlite:///rel/path.db` is relative, `sqlite:////abs/path.db` absolute,
/// `sqlite::memory:` and `sqlite://` are in-memory.
pub fn parse_uri(uri: &str) -> Result<DatabaseLocation, ToolkitError> {
    let trimmed = uri.trim();
    if trimmed == "sqlite::memory:" || trimmed == "sqlite://" || trimmed == "sqlite:///:memory:" {
        return Ok(DatabaseLocation::Memory);
    }
    match trimmed.strip_prefix("sqlite:///") {
        Some(path) if !path.is_empty() => Ok(DatabaseLocation::File(PathBuf::from(path))),
        _ => Err(ToolkitError::InvalidUri(uri.to_string())),
    }
}

/// The tools this toolkit provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTool {
    ListTables,
    Schema,
    Query,
}

impl SqlTool {
    pub const ALL: [SqlTool; 3] = [SqlTool::Query, SqlTool::Schema, SqlTool::ListTables];

    pub fn name(&self) -> &'static str {
        match self {
            SqlTool::ListTables => "sql_db_list_tables",
            SqlTool::Schema => "sql_db_schema",
            SqlTool::Query => "sql_db_query",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SqlTool::ListTables => {
                "Input is an empty string, output is a comma-separated list of tables in the database."
            }
            SqlTool::Schema => {
                "Input to this tool is a comma-separated list of tables, output is the schema and \
                 sample rows for those tables. Be sure that the tables actually exist by calling \
                 sql_db_list_tables first! Example Input: table1, table2, table3"
            }
            SqlTool::Query => {
                "Input to this tool is a detailed and correct SQL query, output is a result from \
                 the database. If the query is not correct, an error message will be returned. \
                 If an error is returned, rewrite the query, check the query, and try again. If \
                 you encounter an issue with Unknown column 'xxxx' in 'field list', use \
                 sql_db_schema to query the correct table fields."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<SqlTool> {
        let name = name.trim().trim_matches('`').trim_matches('"');
        SqlTool::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Native tool-calling definition
    pub fn definition(&self) -> Tool {
        let input = match self {
            SqlTool::ListTables => "Always an empty string",
            SqlTool::Schema => "Comma-separated table names",
            SqlTool::Query => "A single read-only SQL query",
        };
        Tool::single_input(self.name(), self.description(), input)
    }
}

/// Database connection plus the model client, shared by the agent's tools
pub struct SqlToolkit {
    uri: String,
    conn: Arc<Mutex<Connection>>,
    model: ModelHandle,
}

impl std::fmt::Debug for SqlToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlToolkit")
            .field("uri", &self.uri)
            .field("model", &self.model.model_name())
            .finish()
    }
}

impl SqlToolkit {
    /// Open the database named by `uri` read-only
    pub async fn connect(uri: &str, model: ModelHandle) -> Result<Self, ToolkitError> {
        let location = parse_uri(uri)?;
        let conn = tokio::task::spawn_blocking(move || match location {
            DatabaseLocation::File(path) => Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
            DatabaseLocation::Memory => Connection::open_in_memory(),
        })
        .await
        .map_err(|e| ToolkitError::Task(format!("failed to spawn blocking task: {}", e)))?
        .map_err(ToolkitError::Open)?;

        // Read-only opens are lazy; touch the schema so a missing file fails here.
        let toolkit = Self::from_connection(conn, uri, model);
        toolkit
            .run_blocking(|conn| {
                conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await
            .map_err(|e| match e {
                ToolkitError::Query(inner) => ToolkitError::Open(inner),
                other => other,
            })?;

        info!(uri = %uri, "Database toolkit connected");
        Ok(toolkit)
    }

    /// Wrap an already-open connection
    pub fn from_connection(conn: Connection, uri: impl Into<String>, model: ModelHandle) -> Self {
        Self {
            uri: uri.into(),
            conn: Arc::new(Mutex::new(conn)),
            model,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Tools in the order they are presented to the agent
    pub fn tools(&self) -> Vec<SqlTool> {
        SqlTool::ALL.to_vec()
    }

    /// Dispatch a tool call by name
    pub async fn run_tool(&self, name: &str, input: &str) -> Result<String, ToolkitError> {
        let tool = SqlTool::from_name(name)
            .ok_or_else(|| ToolkitError::UnknownTool(name.trim().to_string()))?;
        debug!(tool = tool.name(), input = %input, "Running database tool");
        match tool {
            SqlTool::ListTables => Ok(self.list_tables().await?.join(", ")),
            SqlTool::Schema => {
                let names: Vec<String> = input
                    .split(',')
                    .map(|s| s.trim().trim_matches('\'').trim_matches('"').to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                self.table_info(&names).await
            }
            SqlTool::Query => self.run_query(input).await,
        }
    }

    /// Names of all user tables, sorted
    pub async fn list_tables(&self) -> Result<Vec<String>, ToolkitError> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    /// DDL and sample rows for the named tables (all tables if none given)
    pub async fn table_info(&self, tables: &[String]) -> Result<String, ToolkitError> {
        let existing = self.list_tables().await?;
        let missing: Vec<String> = tables
            .iter()
            .filter(|t| !existing.iter().any(|e| e.eq_ignore_ascii_case(t)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ToolkitError::UnknownTables(missing));
        }

        let wanted: Vec<String> = if tables.is_empty() {
            existing
        } else {
            existing
                .into_iter()
                .filter(|e| tables.iter().any(|t| e.eq_ignore_ascii_case(t)))
                .collect()
        };

        self.run_blocking(move |conn| {
            let mut sections = Vec::with_capacity(wanted.len());
            for table in &wanted {
                let ddl: String = conn.query_row(
                    "SELECT sql FROM sqlite_master WHERE name = ?1",
                    [table],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT * FROM \"{}\" LIMIT {}",
                    table.replace('"', "\"\""),
                    SAMPLE_ROWS
                ))?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|c| c.to_string()).collect();
                let column_count = columns.len();
                let mut rows = stmt.query([])?;
                let mut sample = Vec::new();
                while let Some(row) = rows.next()? {
                    let cells = (0..column_count)
                        .map(|i| row.get_ref(i).map(render_plain))
                        .collect::<Result<Vec<_>, _>>()?;
                    sample.push(cells.join("\t"));
                }

                sections.push(format!(
                    "{}\n\n/*\n{} rows from {} table:\n{}\n{}\n*/",
                    ddl.trim(),
                    SAMPLE_ROWS,
                    table,
                    columns.join("\t"),
                    sample.join("\n")
                ));
            }
            Ok(sections.join("\n\n"))
        })
        .await
    }

    /// Run one read-only statement and render the rows
    pub async fn run_query(&self, sql: &str) -> Result<String, ToolkitError> {
        let sql = strip_code_fence(sql);
        check_read_only(&sql).map_err(ToolkitError::Rejected)?;

        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let column_count = stmt.column_count();
            let mut rows = stmt.query([])?;
            let mut rendered = Vec::new();
            while let Some(row) = rows.next()? {
                let cells = (0..column_count)
                    .map(|i| row.get_ref(i).map(render_literal))
                    .collect::<Result<Vec<_>, _>>()?;
                rendered.push(if cells.len() == 1 {
                    format!("({},)", cells[0])
                } else {
                    format!("({})", cells.join(", "))
                });
            }
            Ok(format!("[{}]", rendered.join(", ")))
        })
        .await
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R, ToolkitError>
    where
        F: FnOnce(&Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ToolkitError::Task("connection lock poisoned".to_string()))?;
            f(&guard).map_err(ToolkitError::Query)
        })
        .await
        .map_err(|e| ToolkitError::Task(format!("task execution failed: {}", e)))?
    }
}

/// Models like to wrap SQL in markdown fences
fn strip_code_fence(sql: &str) -> String {
    let trimmed = sql.trim();
    let without_open = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

/// Cell as a Python-ish literal, for query results
fn render_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => render_real(f),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "\\'")),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Floats keep a decimal point, so 45.0 does not read as an integer
fn render_real(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Cell as bare text, for schema samples
fn render_plain(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => render_real(f),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::ollama::{ChatError, ChatModel, ChatRequest, ChatResponse};

    struct NullModel;

    #[async_trait]
    impl ChatModel for NullModel {
        fn model_name(&self) -> &str {
            "null"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ChatError> {
            Err(ChatError::EmptyResponse)
        }
    }

    fn fixture() -> SqlToolkit {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE dresses (id INTEGER PRIMARY KEY, style TEXT, price REAL);
             INSERT INTO dresses (style, price) VALUES ('Casual', 19.5), ('Party', 45.0),
                 ('Sexy', 30.0), ('Brief', NULL);
             CREATE TABLE sales (dress_id INTEGER, qty INTEGER);",
        )
        .unwrap();
        SqlToolkit::from_connection(conn, "sqlite::memory:", Arc::new(NullModel))
    }

    #[test]
    fn test_parse_uri() {
        assert_eq!(
            parse_uri("sqlite:///dresses.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("dresses.db"))
        );
        assert_eq!(
            parse_uri("sqlite:////var/data/shop.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("/var/data/shop.db"))
        );
        assert_eq!(parse_uri("sqlite::memory:").unwrap(), DatabaseLocation::Memory);
        assert!(matches!(
            parse_uri("postgres://localhost/db"),
            Err(ToolkitError::InvalidUri(_))
        ));
        assert!(parse_uri("sqlite:///").is_err());
    }

    #[test]
    fn test_invalid_uri_message_mentions_argument_error() {
        let err = parse_uri("mysql://x").unwrap_err();
        assert!(err.to_string().starts_with("ArgumentError"));
    }

    #[test]
    fn test_tool_lookup() {
        assert_eq!(SqlTool::from_name("sql_db_query"), Some(SqlTool::Query));
        assert_eq!(SqlTool::from_name(" `sql_db_schema` "), Some(SqlTool::Schema));
        assert_eq!(SqlTool::from_name("drop_everything"), None);
        assert_eq!(SqlTool::Query.definition().function.name, "sql_db_query");
    }

    #[tokio::test]
    async fn test_list_tables() {
        let toolkit = fixture();
        let out = toolkit.run_tool("sql_db_list_tables", "").await.unwrap();
        assert_eq!(out, "dresses, sales");
    }

    #[tokio::test]
    async fn test_schema_includes_ddl_and_samples() {
        let toolkit = fixture();
        let out = toolkit.run_tool("sql_db_schema", "dresses").await.unwrap();
        assert!(out.contains("CREATE TABLE dresses"));
        assert!(out.contains("3 rows from dresses table:"));
        assert!(out.contains("Casual"));
        assert!(!out.contains("Brief"));
    }

    #[tokio::test]
    async fn test_schema_unknown_table() {
        let toolkit = fixture();
        let err = toolkit.run_tool("sql_db_schema", "dresses, ghosts").await.unwrap_err();
        assert!(matches!(err, ToolkitError::UnknownTables(ref t) if t == &vec!["ghosts".to_string()]));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_query_renders_rows() {
        let toolkit = fixture();
        let out = toolkit
            .run_query("```sql\nSELECT style, price FROM dresses ORDER BY id LIMIT 2\n```")
            .await
            .unwrap();
        assert_eq!(out, "[('Casual', 19.5), ('Party', 45.0)]");

        let single = toolkit.run_query("SELECT count(*) FROM dresses").await.unwrap();
        assert_eq!(single, "[(4,)]");

        let nulls = toolkit
            .run_query("SELECT price FROM dresses WHERE style = 'Brief'")
            .await
            .unwrap();
        assert_eq!(nulls, "[(None,)]");
    }

    #[tokio::test]
    async fn test_query_rejects_writes_and_reports_sql_errors() {
        let toolkit = fixture();
        let rejected = toolkit.run_query("DELETE FROM dresses").await.unwrap_err();
        assert!(matches!(rejected, ToolkitError::Rejected(_)));

        let count = toolkit.run_query("SELECT count(*) FROM dresses").await.unwrap();
        assert_eq!(count, "[(4,)]");

        let bad = toolkit.run_query("SELECT nope FROM dresses").await.unwrap_err();
        assert!(matches!(bad, ToolkitError::Query(_)));
        assert!(bad.to_string().contains("OperationalError"));
    }

    #[tokio::test]
    async fn test_replace_function_is_a_read() {
        let toolkit = fixture();
        let out = toolkit
            .run_tool(
                "sql_db_query",
                "SELECT replace(style, 'C', 'K') FROM dresses ORDER BY id LIMIT 1",
            )
            .await
            .unwrap();
        assert_eq!(out, "[('Kasual',)]");
    }

    #[tokio::test]
    async fn test_pragma_assignment_is_refused_on_writable_memory_db() {
        let toolkit = fixture();
        let err = toolkit
            .run_tool("sql_db_query", "PRAGMA user_version(7)")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Rejected(_)));

        let version = toolkit
            .run_tool("sql_db_query", "PRAGMA user_version")
            .await
            .unwrap();
        assert_eq!(version, "[(0,)]");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let toolkit = fixture();
        let err = toolkit.run_tool("sql_db_drop", "x").await.unwrap_err();
        assert!(matches!(err, ToolkitError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_connect_missing_file_is_operational_error() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("sqlite:///{}", dir.path().join("missing.db").display());
        let err = SqlToolkit::connect(&uri, Arc::new(NullModel)).await.unwrap_err();
        assert!(matches!(err, ToolkitError::Open(_)));
        assert!(err.to_string().contains("OperationalError"));
    }
}
