//! Shared relational datasource.
//!
//! One [`Datasource`] is opened per scoring run. Every attribute invocation
//! borrows a fresh [`Cursor`] from it; the borrow ends with the invocation, so
//! a cursor can never outlive its attribute or be handed to the next one.
//! [`Datasource::close`] consumes the handle, which makes a second close
//! impossible.

mod cursor;

pub use cursor::Cursor;

use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use serde_json::Value;
use std::cell::Cell;
use std::time::Duration;
use thiserror::Error;

/// Database name that opens a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Error)]
pub enum DatasourceError {
    #[error("invalid datasource parameters: {0}")]
    InvalidParameters(#[source] serde_json::Error),

    #[error("unable to open database {database}: {source}")]
    Connect {
        database: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to close database connection: {0}")]
    Close(#[source] rusqlite::Error),
}

/// Connection parameters understood by the SQLite connector.
///
/// Keys this connector does not know about are ignored, so a config written
/// for another backend (host, user, password, ...) still parses as long as
/// `database` is present.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionParams {
    /// Path to the database file, or `:memory:`
    pub database: String,

    /// Open without write access (default: true)
    #[serde(default = "default_read_only")]
    pub read_only: bool,

    /// How long to wait on a locked database before failing a query
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

fn default_read_only() -> bool {
    true
}

impl ConnectionParams {
    /// Interpret the opaque `options.datasource` value from the config
    pub fn from_value(value: &Value) -> Result<Self, DatasourceError> {
        Self::deserialize(value).map_err(DatasourceError::InvalidParameters)
    }
}

/// The single live connection for a run
pub struct Datasource {
    conn: Connection,
    database: String,
    cursors_issued: Cell<u64>,
}

impl Datasource {
    /// Establish a connection from the raw config value
    pub fn connect(params: &Value) -> Result<Self, DatasourceError> {
        let params = ConnectionParams::from_value(params)?;
        Self::open(&params)
    }

    /// Establish a connection from parsed parameters.
    ///
    /// Never creates a database file: a path that does not exist is a
    /// connection failure. The schema is read once so that a file which is
    /// not a database fails here rather than inside the first attribute.
    pub fn open(params: &ConnectionParams) -> Result<Self, DatasourceError> {
        let connect_err = |source| DatasourceError::Connect {
            database: params.database.clone(),
            source,
        };

        let conn = if params.database == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            let access = if params.read_only {
                OpenFlags::SQLITE_OPEN_READ_ONLY
            } else {
                OpenFlags::SQLITE_OPEN_READ_WRITE
            };
            Connection::open_with_flags(
                &params.database,
                access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(connect_err)?;

        if let Some(ms) = params.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))
                .map_err(connect_err)?;
        }

        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(connect_err)?;

        tracing::debug!(database = %params.database, read_only = params.read_only, "Opened datasource");

        Ok(Self {
            conn,
            database: params.database.clone(),
            cursors_issued: Cell::new(0),
        })
    }

    /// Hand out a new cursor. Each call yields a cursor with a fresh id.
    pub fn cursor(&self) -> Cursor<'_> {
        let id = self.cursors_issued.get() + 1;
        self.cursors_issued.set(id);
        Cursor::new(&self.conn, id)
    }

    /// Number of cursors handed out so far
    pub fn cursors_issued(&self) -> u64 {
        self.cursors_issued.get()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Close the connection, reporting any error SQLite raises while doing so
    pub fn close(self) -> Result<(), DatasourceError> {
        let database = self.database;
        self.conn
            .close()
            .map_err(|(_, e)| DatasourceError::Close(e))?;
        tracing::debug!(database = %database, "Closed datasource");
        Ok(())
    }
}

impl std::fmt::Debug for Datasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datasource")
            .field("database", &self.database)
            .field("cursors_issued", &self.cursors_issued.get())
            .finish()
    }
}
