use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub count: i64,
}

/// The four business fields of a product, without an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub count: i64,
}

impl Product {
    fn has_content(&self, p: &NewProduct) -> bool {
        self.title == p.title
            && self.description == p.description
            && self.price == p.price
            && self.count == p.count
    }

    fn from_new(id: i64, p: &NewProduct) -> Self {
        Self {
            id,
            title: p.title.clone(),
            description: p.description.clone(),
            price: p.price,
            count: p.count,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Product {0} not found")]
    NotFound(i64),

    #[error("Product with the same title, description, price, and count already exists")]
    DuplicateContent,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Products in insertion order. `limit` is not capped here.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Product>, ProductError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>, ProductError>;

    /// Fails with `DuplicateContent` if a product with identical content exists.
    async fn create(&self, product: &NewProduct) -> Result<Product, ProductError>;

    /// Replaces all four fields of `id`. The record itself is excluded from
    /// the duplicate comparison, so re-saving unchanged values succeeds.
    async fn update(&self, id: i64, product: &NewProduct) -> Result<Product, ProductError>;

    async fn delete_by_id(&self, id: i64) -> Result<i64, ProductError>;

    /// Returns the number of rows removed.
    async fn delete_all(&self) -> Result<u64, ProductError>;
}

#[derive(Clone)]
pub struct PgProductStore {
    db: PgPool,
}

impl PgProductStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique_violation(err: sqlx::Error) -> ProductError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ProductError::DuplicateContent,
        _ => ProductError::Storage(err),
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Product>, ProductError> {
        let mut tx = self.db.begin().await?;
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, title, description, price, "count"
            FROM products
            ORDER BY id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>, ProductError> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, title, description, price, "count"
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, ProductError> {
        let mut tx = self.db.begin().await?;

        let duplicate: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM products
            WHERE title = $1 AND description = $2 AND price = $3 AND "count" = $4
            LIMIT 1
            "#,
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.count)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((existing,)) = duplicate {
            debug!(existing, "create rejected: duplicate content");
            return Err(ProductError::DuplicateContent);
        }

        let created = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (title, description, price, "count")
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, description, price, "count"
            "#,
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.count)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        tx.commit().await?;
        info!(product_id = created.id, "product row inserted");
        Ok(created)
    }

    async fn update(&self, id: i64, product: &NewProduct) -> Result<Product, ProductError> {
        let mut tx = self.db.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ProductError::NotFound(id));
        }

        let duplicate: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM products
            WHERE title = $1 AND description = $2 AND price = $3 AND "count" = $4
              AND id <> $5
            LIMIT 1
            "#,
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.count)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((existing,)) = duplicate {
            debug!(product_id = id, existing, "update rejected: duplicate content");
            return Err(ProductError::DuplicateContent);
        }

        let updated = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET title = $1, description = $2, price = $3, "count" = $4
            WHERE id = $5
            RETURNING id, title, description, price, "count"
            "#,
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.count)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_unique_violation)?
        .ok_or(ProductError::NotFound(id))?;

        tx.commit().await?;
        info!(product_id = id, "product row updated");
        Ok(updated)
    }

    async fn delete_by_id(&self, id: i64) -> Result<i64, ProductError> {
        let mut tx = self.db.begin().await?;
        let deleted: Option<(i64,)> = sqlx::query_as("DELETE FROM products WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let (deleted,) = deleted.ok_or(ProductError::NotFound(id))?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn delete_all(&self) -> Result<u64, ProductError> {
        let mut tx = self.db.begin().await?;
        let done = sqlx::query("DELETE FROM products")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }
}

/// Products kept in process memory, in insertion order; ids start at 1 and
/// are never reused.
#[derive(Default, Clone)]
pub struct InMemoryProductStore {
    table: Arc<RwLock<ProductTable>>,
}

#[derive(Default)]
struct ProductTable {
    last_id: i64,
    rows: Vec<Product>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Product>, ProductError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>, ProductError> {
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|p| p.id == id).cloned())
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, ProductError> {
        let mut table = self.table.write().await;
        if table.rows.iter().any(|p| p.has_content(product)) {
            return Err(ProductError::DuplicateContent);
        }
        table.last_id += 1;
        let created = Product::from_new(table.last_id, product);
        table.rows.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, product: &NewProduct) -> Result<Product, ProductError> {
        let mut table = self.table.write().await;
        let idx = table
            .rows
            .iter()
            .position(|p| p.id == id)
            .ok_or(ProductError::NotFound(id))?;
        if table
            .rows
            .iter()
            .any(|p| p.id != id && p.has_content(product))
        {
            return Err(ProductError::DuplicateContent);
        }
        let updated = Product::from_new(id, product);
        table.rows[idx] = updated.clone();
        Ok(updated)
    }

    async fn delete_by_id(&self, id: i64) -> Result<i64, ProductError> {
        let mut table = self.table.write().await;
        let idx = table
            .rows
            .iter()
            .position(|p| p.id == id)
            .ok_or(ProductError::NotFound(id))?;
        table.rows.remove(idx);
        Ok(id)
    }

    async fn delete_all(&self) -> Result<u64, ProductError> {
        let mut table = self.table.write().await;
        let removed = table.rows.len() as u64;
        table.rows.clear();
        Ok(removed)
    }
}
