use rusqlite::{Connection, Params, Row};

/// Query handle scoped to a single attribute invocation.
///
/// Borrowed from the shared [`Datasource`](super::Datasource); it cannot
/// close the connection and cannot outlive it.
pub struct Cursor<'conn> {
    conn: &'conn Connection,
    id: u64,
    queries: u64,
}

impl<'conn> Cursor<'conn> {
    pub(super) fn new(conn: &'conn Connection, id: u64) -> Self {
        Self { conn, id, queries: 0 }
    }

    /// Identifier unique within the run (1-based, in hand-out order)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of statements issued through this cursor
    pub fn queries_issued(&self) -> u64 {
        self.queries
    }

    /// Run a query expected to return one row and map it
    pub fn query_row<T, P, F>(&mut self, sql: &str, params: P, f: F) -> rusqlite::Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.record(sql);
        self.conn.query_row(sql, params, f)
    }

    /// Run a query and collect every mapped row
    pub fn query_map<T, P, F>(&mut self, sql: &str, params: P, f: F) -> rusqlite::Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.record(sql);
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;
        rows.collect()
    }

    /// Execute a statement, returning the number of changed rows
    pub fn execute<P: Params>(&mut self, sql: &str, params: P) -> rusqlite::Result<usize> {
        self.record(sql);
        self.conn.execute(sql, params)
    }

    fn record(&mut self, sql: &str) {
        self.queries += 1;
        tracing::trace!(cursor = self.id, sql, "Issuing query");
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("queries", &self.queries)
            .finish()
    }
}
