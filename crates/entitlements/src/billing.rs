//! Payment-provider product ids mapped to tiers.

use std::collections::HashMap;

use keyward_core::DomainError;

use crate::{BillingPeriod, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductMapping {
    pub tier: Tier,
    pub billing_period: BillingPeriod,
}

/// Static product table, e.g. `prod_a=extended:monthly,prod_b=all_in_one:yearly`.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: HashMap<String, ProductMapping>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(
        mut self,
        product_id: impl Into<String>,
        tier: Tier,
        billing_period: BillingPeriod,
    ) -> Result<Self, DomainError> {
        if !tier.is_paid() {
            return Err(DomainError::validation(format!(
                "product cannot map to unpaid tier '{tier}'"
            )));
        }
        self.products.insert(
            product_id.into(),
            ProductMapping {
                tier,
                billing_period,
            },
        );
        Ok(self)
    }

    /// Parse the comma separated `product=tier:period` form. Blank input yields an empty catalog.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let mut catalog = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (product, mapping) = entry
                .split_once('=')
                .ok_or_else(|| DomainError::validation(format!("expected product=tier:period, got '{entry}'")))?;
            let (tier, period) = mapping
                .split_once(':')
                .ok_or_else(|| DomainError::validation(format!("expected tier:period, got '{mapping}'")))?;
            let product = product.trim();
            if product.is_empty() {
                return Err(DomainError::validation("empty product id"));
            }
            catalog = catalog.with_product(product, tier.parse()?, period.parse()?)?;
        }
        Ok(catalog)
    }

    pub fn lookup(&self, product_id: &str) -> Option<ProductMapping> {
        self.products.get(product_id.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
