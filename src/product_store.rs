use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

use crate::models::{NewProduct, Product};
use crate::utils::error::{AppError, Result};

/// Durable CRUD over tracked products.
///
/// Every operation except `scan_all` is scoped to one owner. Writes touch a
/// single record and are atomic; readers never see a partially written row.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Fails with `Duplicate` when the owner already tracks a product of that name.
    async fn create(&self, product: NewProduct) -> Result<Product>;

    async fn get(&self, owner_id: &str, product_name: &str) -> Result<Product>;

    async fn list(&self, owner_id: &str) -> Result<Vec<Product>>;

    async fn update_target(&self, owner_id: &str, product_name: &str, target: Option<Decimal>) -> Result<Product>;

    async fn delete(&self, owner_id: &str, product_name: &str) -> Result<()>;

    /// Every product of every owner. Used by the polling scheduler only.
    async fn scan_all(&self) -> Result<Vec<Product>>;
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    owner_id: String,
    store: String,
    product_name: String,
    url: String,
    price_selector: String,
    target_price: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self> {
        let target_price = row
            .target_price
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .map_err(|e| AppError::Internal(format!("stored target price for '{}' is corrupt: {}", row.product_name, e)))?;

        Ok(Product {
            id: row.id,
            owner_id: row.owner_id,
            store: row.store,
            product_name: row.product_name,
            url: row.url,
            price_selector: row.price_selector,
            target_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, owner_id, store, product_name, url, price_selector, target_price, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own database,
        // so the pool must hold exactly one connection and never recycle it.
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.max(1))
        };

        if !in_memory {
            let filename = options.clone().get_filename();
            if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Product store ready at {}", url);
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn describe(owner_id: &str, product_name: &str) -> String {
    format!("product '{}' for {}", product_name, owner_id)
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn create(&self, new_product: NewProduct) -> Result<Product> {
        new_product.check()?;
        let product = Product::new(new_product);

        let inserted = sqlx::query(
            r#"
            INSERT INTO products (
                id, owner_id, store, product_name, url, price_selector,
                target_price, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.store)
        .bind(&product.product_name)
        .bind(&product.url)
        .bind(&product.price_selector)
        .bind(product.target_price.map(|t| t.to_string()))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::debug!("Created {}", describe(&product.owner_id, &product.product_name));
                Ok(product)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::duplicate(describe(&product.owner_id, &product.product_name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, owner_id: &str, product_name: &str) -> Result<Product> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE owner_id = ? AND product_name = ?",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .bind(product_name)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::not_found(describe(owner_id, product_name)))?
            .try_into()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE owner_id = ? ORDER BY product_name",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn update_target(&self, owner_id: &str, product_name: &str, target: Option<Decimal>) -> Result<Product> {
        if target.is_some_and(|t| t.is_sign_negative() && !t.is_zero()) {
            return Err(AppError::Validation("Price must not be negative".to_string()));
        }

        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "UPDATE products SET target_price = ?, updated_at = ? \
             WHERE owner_id = ? AND product_name = ? RETURNING {}",
            SELECT_COLUMNS
        ))
        .bind(target.map(|t| t.to_string()))
        .bind(Utc::now())
        .bind(owner_id)
        .bind(product_name)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::not_found(describe(owner_id, product_name)))?
            .try_into()
    }

    async fn delete(&self, owner_id: &str, product_name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE owner_id = ? AND product_name = ?")
            .bind(owner_id)
            .bind(product_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(describe(owner_id, product_name)));
        }
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products ORDER BY owner_id, product_name",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }
}
