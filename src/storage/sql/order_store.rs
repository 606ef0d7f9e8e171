//! Unified SQL OrderStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::collections::HashMap;
use std::marker::PhantomData;

use sea_query::{Alias, Expr, InsertStatement, Order as SortOrder, Query, SelectStatement};

use super::query::{cents_expr, text_expr};
use super::SqlDatabase;
use crate::model::{Money, NewOrder, NewOrderItem, Order, OrderItem};
use crate::storage::schema::{OrderItems, Orders, OutboxEvents};

/// SQL-based implementation of OrderStore.
pub struct SqlOrderStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlOrderStore<DB> {
    /// Create a new SQL order store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

fn select_orders() -> SelectStatement {
    Query::select()
        .column(Orders::Id)
        .column(Orders::UserId)
        .column(Orders::Status)
        .expr_as(cents_expr("total"), Alias::new("total_cents"))
        .expr_as(text_expr("created_at"), Alias::new("created_at_text"))
        .from(Orders::Table)
        .order_by(Orders::Id, SortOrder::Asc)
        .to_owned()
}

fn select_items(order_ids: Vec<i64>) -> SelectStatement {
    Query::select()
        .column(OrderItems::Id)
        .column(OrderItems::OrderId)
        .column(OrderItems::ProductId)
        .column(OrderItems::Quantity)
        .expr_as(cents_expr("price"), Alias::new("price_cents"))
        .from(OrderItems::Table)
        .and_where(Expr::col(OrderItems::OrderId).is_in(order_ids))
        .order_by(OrderItems::Id, SortOrder::Asc)
        .to_owned()
}

fn insert_order_row(order: &NewOrder) -> InsertStatement {
    Query::insert()
        .into_table(Orders::Table)
        .columns([Orders::UserId, Orders::Status, Orders::Total])
        .values_panic([
            order.user_id.into(),
            order.status.clone().into(),
            order.total.as_decimal().into(),
        ])
        .returning_col(Orders::Id)
        .to_owned()
}

fn insert_item_row(order_id: i64, item: &NewOrderItem) -> InsertStatement {
    Query::insert()
        .into_table(OrderItems::Table)
        .columns([
            OrderItems::OrderId,
            OrderItems::ProductId,
            OrderItems::Quantity,
            OrderItems::Price,
        ])
        .values_panic([
            order_id.into(),
            item.product_id.into(),
            item.quantity.into(),
            item.price.as_decimal().into(),
        ])
        .to_owned()
}

fn insert_outbox_row(queue: &str, payload: String) -> InsertStatement {
    Query::insert()
        .into_table(OutboxEvents::Table)
        .columns([OutboxEvents::Queue, OutboxEvents::Payload])
        .values_panic([queue.into(), payload.into()])
        .to_owned()
}

/// Attach item rows to their orders, preserving order and item ordering.
fn attach_items(mut orders: Vec<Order>, items: Vec<OrderItem>) -> Vec<Order> {
    let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }
    for order in &mut orders {
        order.items = by_order.remove(&order.id).unwrap_or_default();
    }
    orders
}

/// Macro to implement OrderStore for a specific SQL backend.
macro_rules! impl_order_store {
    ($db_type:ty, $row_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlOrderStore<$db_type> {
            fn order_from_row(row: &$row_type) -> crate::storage::Result<Order> {
                use sqlx::Row;

                Ok(Order {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    status: row.try_get("status")?,
                    total: Money::from_cents(row.try_get("total_cents")?),
                    created_at: row.try_get("created_at_text")?,
                    items: Vec::new(),
                })
            }

            fn item_from_row(row: &$row_type) -> crate::storage::Result<OrderItem> {
                use sqlx::Row;

                Ok(OrderItem {
                    id: row.try_get("id")?,
                    order_id: row.try_get("order_id")?,
                    product_id: row.try_get("product_id")?,
                    quantity: row.try_get("quantity")?,
                    price: Money::from_cents(row.try_get("price_cents")?),
                })
            }

            /// Run a built order select and attach each order's items.
            ///
            /// Takes SQL text: sea-query statements are not `Send`.
            async fn load_orders(&self, sql: String) -> crate::storage::Result<Vec<Order>> {
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                let orders = rows
                    .iter()
                    .map(Self::order_from_row)
                    .collect::<crate::storage::Result<Vec<_>>>()?;
                if orders.is_empty() {
                    return Ok(orders);
                }

                let ids = orders.iter().map(|o| o.id).collect();
                let sql = <$db_type>::build_select(select_items(ids));
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                let items = rows
                    .iter()
                    .map(Self::item_from_row)
                    .collect::<crate::storage::Result<Vec<_>>>()?;

                Ok(attach_items(orders, items))
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OrderStore for SqlOrderStore<$db_type> {
            async fn insert_order(
                &self,
                order: &NewOrder,
                stage_event: bool,
            ) -> crate::storage::Result<i64> {
                use sqlx::Row;

                use crate::events::{Event, OrderPlacedEvent};
                use crate::storage::StorageError;

                // Dropping the transaction on any early return rolls it back.
                let mut tx = self.pool.begin().await?;

                let sql = <$db_type>::build_insert(insert_order_row(order));
                let row = sqlx::query(&sql).fetch_one(&mut *tx).await?;
                let order_id: i64 = row.try_get("id")?;

                for item in &order.items {
                    let sql = <$db_type>::build_insert(insert_item_row(order_id, item));
                    sqlx::query(&sql).execute(&mut *tx).await?;
                }

                if stage_event {
                    let event = Event::OrderPlaced(OrderPlacedEvent::for_order(order_id, order));
                    let payload = event
                        .to_payload()
                        .map_err(|e| StorageError::Decode(e.to_string()))
                        .and_then(|bytes| {
                            String::from_utf8(bytes).map_err(|e| StorageError::Decode(e.to_string()))
                        })?;
                    let sql = <$db_type>::build_insert(insert_outbox_row(
                        event.queue().name(),
                        payload,
                    ));
                    sqlx::query(&sql).execute(&mut *tx).await?;
                }

                tx.commit().await?;

                tracing::debug!(
                    order_id,
                    items = order.items.len(),
                    staged = stage_event,
                    "Order persisted"
                );
                Ok(order_id)
            }

            async fn get_order(&self, id: i64) -> crate::storage::Result<Option<Order>> {
                let sql = <$db_type>::build_select(
                    select_orders()
                        .and_where(Expr::col(Orders::Id).eq(id))
                        .to_owned(),
                );
                Ok(self.load_orders(sql).await?.into_iter().next())
            }

            async fn list_orders_for_user(
                &self,
                user_id: i64,
            ) -> crate::storage::Result<Vec<Order>> {
                let sql = <$db_type>::build_select(
                    select_orders()
                        .and_where(Expr::col(Orders::UserId).eq(user_id))
                        .to_owned(),
                );
                self.load_orders(sql).await
            }

            async fn set_status(&self, id: i64, status: &str) -> crate::storage::Result<bool> {
                let stmt = Query::update()
                    .table(Orders::Table)
                    .value(Orders::Status, status)
                    .and_where(Expr::col(Orders::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                Ok(result.rows_affected() > 0)
            }
        }
    };
}

// Generate implementations for each backend
impl_order_store!(
    super::postgres::Postgres,
    sqlx::postgres::PgRow,
    "postgres"
);
impl_order_store!(super::sqlite::Sqlite, sqlx::sqlite::SqliteRow, "sqlite");
