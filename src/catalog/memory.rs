use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{PriceOracle, ProductExpectation};
use crate::error::CatalogError;

/// Catalog held in memory for tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceOracle {
    products: Arc<RwLock<HashMap<String, ProductExpectation>>>,
}

impl InMemoryPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, expectation: ProductExpectation) {
        self.products
            .write()
            .insert(expectation.product_id.clone(), expectation);
    }
}

#[async_trait]
impl PriceOracle for InMemoryPriceOracle {
    async fn resolve_expectation(&self, product_id: &str) -> Result<ProductExpectation, CatalogError> {
        self.products
            .read()
            .get(product_id)
            .cloned()
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))
    }
}
