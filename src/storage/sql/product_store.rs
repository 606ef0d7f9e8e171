//! Unified SQL ProductStore implementation.

use std::marker::PhantomData;

use sea_query::{Alias, Expr, Order as SortOrder, Query, SelectStatement};

use super::query::{cents_expr, text_expr};
use super::SqlDatabase;
use crate::model::{Money, Product};
use crate::storage::schema::Products;

/// SQL-based implementation of ProductStore.
pub struct SqlProductStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlProductStore<DB> {
    /// Create a new SQL product store with the given pool.
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

fn select_products() -> SelectStatement {
    Query::select()
        .column(Products::Id)
        .column(Products::Name)
        .column(Products::Description)
        .expr_as(cents_expr("price"), Alias::new("price_cents"))
        .column(Products::Inventory)
        .expr_as(text_expr("created_at"), Alias::new("created_at_text"))
        .from(Products::Table)
        .order_by(Products::Id, SortOrder::Asc)
        .to_owned()
}

macro_rules! impl_product_store {
    ($db_type:ty, $row_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlProductStore<$db_type> {
            fn product_from_row(row: &$row_type) -> crate::storage::Result<Product> {
                use sqlx::Row;

                Ok(Product {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                    price: Money::from_cents(row.try_get("price_cents")?),
                    inventory: row.try_get("inventory")?,
                    created_at: row.try_get("created_at_text")?,
                })
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::ProductStore for SqlProductStore<$db_type> {
            async fn list_products(&self) -> crate::storage::Result<Vec<Product>> {
                let sql = <$db_type>::build_select(select_products());
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                rows.iter().map(Self::product_from_row).collect()
            }

            async fn get_product(&self, id: i64) -> crate::storage::Result<Option<Product>> {
                let stmt = select_products()
                    .and_where(Expr::col(Products::Id).eq(id))
                    .to_owned();
                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
                row.as_ref().map(Self::product_from_row).transpose()
            }

            async fn create_product(
                &self,
                input: &crate::model::ProductInput,
            ) -> crate::storage::Result<Product> {
                use sqlx::Row;

                let stmt = Query::insert()
                    .into_table(Products::Table)
                    .columns([
                        Products::Name,
                        Products::Description,
                        Products::Price,
                        Products::Inventory,
                    ])
                    .values_panic([
                        input.name.clone().into(),
                        input.description.clone().into(),
                        input.price.as_decimal().into(),
                        input.inventory.into(),
                    ])
                    .returning_col(Products::Id)
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
                let id: i64 = row.try_get("id")?;

                self.get_product(id)
                    .await?
                    .ok_or(crate::storage::StorageError::NotFound {
                        entity: "product",
                        id,
                    })
            }

            async fn update_product(
                &self,
                id: i64,
                input: &crate::model::ProductInput,
            ) -> crate::storage::Result<Option<Product>> {
                let stmt = Query::update()
                    .table(Products::Table)
                    .value(Products::Name, input.name.clone())
                    .value(Products::Description, input.description.clone())
                    .value(Products::Price, input.price.as_decimal())
                    .value(Products::Inventory, input.inventory)
                    .and_where(Expr::col(Products::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                if result.rows_affected() == 0 {
                    return Ok(None);
                }
                self.get_product(id).await
            }

            async fn delete_product(&self, id: i64) -> crate::storage::Result<bool> {
                let stmt = Query::delete()
                    .from_table(Products::Table)
                    .and_where(Expr::col(Products::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_delete(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                Ok(result.rows_affected() > 0)
            }

            async fn decrement_inventory(
                &self,
                id: i64,
                quantity: i64,
            ) -> crate::storage::Result<Option<i64>> {
                use sqlx::Row;

                let stmt = Query::update()
                    .table(Products::Table)
                    .value(
                        Products::Inventory,
                        Expr::col(Products::Inventory).sub(quantity),
                    )
                    .and_where(Expr::col(Products::Id).eq(id))
                    .returning_col(Products::Inventory)
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
                match row {
                    Some(row) => Ok(Some(row.try_get("inventory")?)),
                    None => Ok(None),
                }
            }
        }
    };
}

// Generate implementations for each backend
impl_product_store!(
    super::postgres::Postgres,
    sqlx::postgres::PgRow,
    "postgres"
);
impl_product_store!(super::sqlite::Sqlite, sqlx::sqlite::SqliteRow, "sqlite");

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::model::ProductInput;
    use crate::storage::sql::sqlite::{init_schema, memory_pool, SqliteProductStore};
    use crate::storage::ProductStore;

    async fn store() -> SqliteProductStore {
        let pool = memory_pool().await.unwrap();
        init_schema(&pool).await.unwrap();
        SqliteProductStore::new(pool)
    }

    fn input(name: &str, cents: i64, inventory: i64) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            description: format!("{} description", name),
            price: Money::from_cents(cents),
            inventory,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_product() {
        let store = store().await;
        let created = store.create_product(&input("Lamp", 2450, 10)).await.unwrap();

        assert_eq!(created.name, "Lamp");
        assert_eq!(created.price, Money::from_cents(2450));
        assert_eq!(created.inventory, 10);
        assert!(!created.created_at.is_empty());
        assert_eq!(store.get_product(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_list_products_in_id_order() {
        let store = store().await;
        store.create_product(&input("A", 100, 1)).await.unwrap();
        store.create_product(&input("B", 200, 2)).await.unwrap();

        let names: Vec<String> = store
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_product() {
        let store = store().await;
        assert!(store.update_product(4, &input("X", 1, 1)).await.unwrap().is_none());
        assert!(!store.delete_product(4).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_product_replaces_fields() {
        let store = store().await;
        let created = store.create_product(&input("Mug", 800, 5)).await.unwrap();

        let updated = store
            .update_product(created.id, &input("Big Mug", 950, 6))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Big Mug");
        assert_eq!(updated.price, Money::from_cents(950));
        assert_eq!(updated.inventory, 6);
    }

    #[tokio::test]
    async fn test_decrement_inventory_returns_new_value() {
        let store = store().await;
        let p = store.create_product(&input("Pen", 150, 10)).await.unwrap();

        assert_eq!(store.decrement_inventory(p.id, 3).await.unwrap(), Some(7));
        // No floor: inventory may go negative.
        assert_eq!(store.decrement_inventory(p.id, 9).await.unwrap(), Some(-2));
        assert_eq!(store.decrement_inventory(p.id + 100, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_product() {
        let store = store().await;
        let p = store.create_product(&input("Cup", 300, 1)).await.unwrap();
        assert!(store.delete_product(p.id).await.unwrap());
        assert!(store.get_product(p.id).await.unwrap().is_none());
    }
}
