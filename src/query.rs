use crate::types::RowValues;

/// A statement to run on a worker's connection, with its bindings and flags.
///
/// ```rust
/// use mssql_adapter::prelude::*;
///
/// let request = QueryRequest::new("SELECT name FROM sys.tables WHERE schema_id = @P1")
///     .bindings(vec![RowValues::Int(1)])
///     .fetch(true);
/// assert!(request.auto_begin);
/// # let _ = request;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// The SQL text
    pub sql: String,
    /// Positional parameters; `None` selects the driver's no-parameter path
    pub bindings: Option<Vec<RowValues>>,
    /// Begin a transaction first if none is open
    pub auto_begin: bool,
    /// Log only the first 512 characters of the statement
    pub abridge: bool,
    /// Materialize rows and column metadata in the result
    pub fetch: bool,
}

impl QueryRequest {
    /// A request with no bindings, `auto_begin` on, and the other flags off.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: None,
            auto_begin: true,
            abridge: false,
            fetch: false,
        }
    }

    #[must_use]
    pub fn bindings(mut self, bindings: Vec<RowValues>) -> Self {
        self.bindings = Some(bindings);
        self
    }

    #[must_use]
    pub fn auto_begin(mut self, auto_begin: bool) -> Self {
        self.auto_begin = auto_begin;
        self
    }

    #[must_use]
    pub fn abridge(mut self, abridge: bool) -> Self {
        self.abridge = abridge;
        self
    }

    #[must_use]
    pub fn fetch(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }
}
