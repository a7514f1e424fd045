#[cfg(test)]
pub mod memory;
pub mod repository;

#[cfg(test)]
pub use memory::InMemoryPriceOracle;
pub use repository::PgPriceOracle;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Currency minor units used for every amount comparison
pub const PRICE_SCALE: u32 = 2;

/// What the catalog says a sale of this product must look like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductExpectation {
    pub product_id: String,
    /// Always held at `PRICE_SCALE` fractional digits
    pub expected_amount: Decimal,
    /// ISO 4217, upper case
    pub expected_currency: String,
    pub seller_id: String,
    pub title: Option<String>,
}

impl ProductExpectation {
    pub fn new(
        product_id: impl Into<String>,
        price: Decimal,
        currency: impl AsRef<str>,
        seller_id: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            expected_amount: normalize_price(price),
            expected_currency: currency.as_ref().trim().to_ascii_uppercase(),
            seller_id: seller_id.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Round a catalog price to currency minor units, half away from zero
pub fn normalize_price(price: Decimal) -> Decimal {
    let mut rounded = price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Pure read of the expected price, currency and seller for a product
    async fn resolve_expectation(&self, product_id: &str) -> Result<ProductExpectation, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_price() {
        assert_eq!(normalize_price(dec!(19.99)).to_string(), "19.99");
        assert_eq!(normalize_price(dec!(20)).to_string(), "20.00");
        assert_eq!(normalize_price(dec!(19.995)).to_string(), "20.00");
        assert_eq!(normalize_price(dec!(19.994)).to_string(), "19.99");
    }

    #[test]
    fn test_currency_is_upper_cased() {
        let p = ProductExpectation::new("p1", dec!(5), " usd ", "seller");
        assert_eq!(p.expected_currency, "USD");
        assert_eq!(p.expected_amount.to_string(), "5.00");
    }

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let oracle = InMemoryPriceOracle::new();
        oracle.insert(ProductExpectation::new("p1", dec!(19.99), "USD", "seller-1").with_title("Ebook"));

        let found = oracle.resolve_expectation("p1").await.unwrap();
        assert_eq!(found.seller_id, "seller-1");
        assert_eq!(found.title.as_deref(), Some("Ebook"));

        let missing = oracle.resolve_expectation("nope").await.unwrap_err();
        assert!(matches!(missing, CatalogError::ProductNotFound(_)));
    }
}
