//! SQL database abstraction trait.

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type, the schema and query building methods.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// DDL statements creating every table, applied in order.
    fn schema() -> &'static [&'static str];

    /// Build a SQL query string from a sea-query SELECT statement.
    fn build_select(stmt: sea_query::SelectStatement) -> String;

    /// Build a SQL query string from a sea-query INSERT statement.
    fn build_insert(stmt: sea_query::InsertStatement) -> String;

    /// Build a SQL query string from a sea-query UPDATE statement.
    fn build_update(stmt: sea_query::UpdateStatement) -> String;

    /// Build a SQL query string from a sea-query DELETE statement.
    fn build_delete(stmt: sea_query::DeleteStatement) -> String;
}

/// Select expression reading a two-decimal money column as integer cents.
pub(crate) fn cents_expr(column: &str) -> sea_query::SimpleExpr {
    sea_query::Expr::cust(format!("CAST(ROUND({} * 100) AS BIGINT)", column))
}

/// Select expression reading a timestamp column as text.
pub(crate) fn text_expr(column: &str) -> sea_query::SimpleExpr {
    sea_query::Expr::cust(format!("CAST({} AS TEXT)", column))
}
