use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::warn;

use super::{PriceOracle, ProductExpectation};
use crate::error::CatalogError;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    price: Option<Decimal>,
    currency: Option<String>,
    seller_id: Option<String>,
    title: Option<String>,
}

/// Read-only view of the product catalog table
pub struct PgPriceOracle {
    pool: PgPool,
}

impl PgPriceOracle {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceOracle for PgPriceOracle {
    async fn resolve_expectation(&self, product_id: &str) -> Result<ProductExpectation, CatalogError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, price, currency, seller_id, title
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))?;

        let incomplete = |reason: &str| {
            warn!(product_id, reason, "catalog entry cannot be settled");
            CatalogError::Incomplete {
                product_id: product_id.to_string(),
                reason: reason.to_string(),
            }
        };

        let price = row.price.ok_or_else(|| incomplete("price is not set"))?;
        let currency = row
            .currency
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| incomplete("currency is not set"))?;
        let seller_id = row
            .seller_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| incomplete("seller is not set"))?;

        let expectation = ProductExpectation::new(row.id, price, currency, seller_id);
        Ok(match row.title {
            Some(title) => expectation.with_title(title),
            None => expectation,
        })
    }
}
