//! Unified SQL OutboxStore implementation.

use std::marker::PhantomData;

use sea_query::{Expr, Order as SortOrder, Query};

use super::SqlDatabase;
use crate::storage::schema::OutboxEvents;
use crate::storage::OutboxRecord;

/// SQL-based implementation of OutboxStore.
pub struct SqlOutboxStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlOutboxStore<DB> {
    /// Create a new SQL outbox store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }
}

macro_rules! impl_outbox_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OutboxStore for SqlOutboxStore<$db_type> {
            async fn pending(
                &self,
                limit: u64,
                max_attempts: u32,
            ) -> crate::storage::Result<Vec<OutboxRecord>> {
                use sqlx::Row;

                let stmt = Query::select()
                    .columns([
                        OutboxEvents::Id,
                        OutboxEvents::Queue,
                        OutboxEvents::Payload,
                        OutboxEvents::Attempts,
                    ])
                    .from(OutboxEvents::Table)
                    .and_where(Expr::col(OutboxEvents::Attempts).lt(i64::from(max_attempts)))
                    .order_by(OutboxEvents::Id, SortOrder::Asc)
                    .limit(limit)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| -> crate::storage::Result<OutboxRecord> {
                        Ok(OutboxRecord {
                            id: row.try_get("id")?,
                            queue: row.try_get("queue")?,
                            payload: row.try_get("payload")?,
                            attempts: row.try_get("attempts")?,
                        })
                    })
                    .collect()
            }

            async fn delete(&self, id: i64) -> crate::storage::Result<()> {
                let stmt = Query::delete()
                    .from_table(OutboxEvents::Table)
                    .and_where(Expr::col(OutboxEvents::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_delete(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn record_failure(&self, id: i64) -> crate::storage::Result<()> {
                let stmt = Query::update()
                    .table(OutboxEvents::Table)
                    .value(
                        OutboxEvents::Attempts,
                        Expr::col(OutboxEvents::Attempts).add(1),
                    )
                    .and_where(Expr::col(OutboxEvents::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }
        }
    };
}

// Generate implementations for each backend
impl_outbox_store!(super::postgres::Postgres, "postgres");
impl_outbox_store!(super::sqlite::Sqlite, "sqlite");
