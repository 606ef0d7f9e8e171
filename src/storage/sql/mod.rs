//! Unified SQL storage implementations.
//!
//! This module provides shared implementations for SQL-based storage backends
//! (PostgreSQL, SQLite). The implementations are parameterized by database type
//! using the `SqlDatabase` trait.

mod order_store;
mod outbox_store;
mod product_store;
mod query;

pub use order_store::SqlOrderStore;
pub use outbox_store::SqlOutboxStore;
pub use product_store::SqlProductStore;
pub use query::SqlDatabase;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;

    use crate::config::PostgresConfig;
    use crate::storage::schema::POSTGRES_SCHEMA;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        fn schema() -> &'static [&'static str] {
            POSTGRES_SCHEMA
        }

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    /// Open a connection pool.
    pub async fn connect(config: &PostgresConfig) -> crate::storage::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.uri)
            .await?;
        Ok(pool)
    }

    /// Create every table if missing.
    pub async fn init_schema(pool: &PgPool) -> crate::storage::Result<()> {
        for statement in <Postgres as super::SqlDatabase>::schema() {
            sqlx::query(statement).execute(pool).await?;
        }
        tracing::info!("Schema initialized (PostgreSQL)");
        Ok(())
    }

    /// PostgreSQL order store.
    pub type PostgresOrderStore = super::SqlOrderStore<Postgres>;

    /// PostgreSQL product store.
    pub type PostgresProductStore = super::SqlProductStore<Postgres>;

    /// PostgreSQL outbox store.
    pub type PostgresOutboxStore = super::SqlOutboxStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    use crate::config::SqliteConfig;
    use crate::storage::schema::SQLITE_SCHEMA;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        fn schema() -> &'static [&'static str] {
            SQLITE_SCHEMA
        }

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    /// Open a connection pool.
    ///
    /// An in-memory database lives inside a single connection, so the pool
    /// is pinned to one connection that never expires.
    pub async fn connect(config: &SqliteConfig) -> crate::storage::Result<SqlitePool> {
        if config.path == ":memory:" {
            return memory_pool().await;
        }

        if let Some(parent) = std::path::Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::storage::StorageError::Database(sqlx::Error::Io(e))
                })?;
            }
        }

        let pool = SqlitePool::connect(&config.url()).await?;
        Ok(pool)
    }

    /// A fresh, private in-memory database.
    pub async fn memory_pool() -> crate::storage::Result<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(pool)
    }

    /// Create every table if missing.
    pub async fn init_schema(pool: &SqlitePool) -> crate::storage::Result<()> {
        for statement in <Sqlite as super::SqlDatabase>::schema() {
            sqlx::query(statement).execute(pool).await?;
        }
        tracing::info!("Schema initialized (SQLite)");
        Ok(())
    }

    /// SQLite order store.
    pub type SqliteOrderStore = super::SqlOrderStore<Sqlite>;

    /// SQLite product store.
    pub type SqliteProductStore = super::SqlProductStore<Sqlite>;

    /// SQLite outbox store.
    pub type SqliteOutboxStore = super::SqlOutboxStore<Sqlite>;
}
