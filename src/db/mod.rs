//! Database collaborator
//!
//! A SQLite toolkit giving the agent table listing, schema inspection and
//! read-only query execution.

pub mod safety;
pub mod toolkit;

pub use safety::{check_read_only, Rejection};
pub use toolkit::{
    parse_uri, DatabaseLocation, SqlTool, SqlToolkit, ToolkitError, ToolkitHandle,
    DEFAULT_DATABASE_URI,
};
