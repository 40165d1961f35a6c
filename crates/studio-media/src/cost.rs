//! Approximate per-call pricing.

use std::collections::HashMap;

use tracing::debug;

/// Per-model price table with a running total.
///
/// Models without a price cost nothing.
#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    prices: HashMap<String, f64>,
    total: f64,
    operations: u32,
}

impl CostTracker {
    /// Empty price table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the known approximate prices per run, in USD.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_price(
                "stability-ai/sdxl:7762fd07cf82c948538e41f63f77d685e02b063e37e496e96eefd46c929f9bdc",
                0.0023,
            )
            .with_price("meta/meta-llama-3-8b-instruct", 0.0001)
            .with_price("gpt-4o", 0.01)
            .with_price("dall-e-3", 0.04)
            .with_price("tts-1", 0.015)
    }

    pub fn with_price(mut self, model: impl Into<String>, price: f64) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    pub fn price(&self, model: &str) -> f64 {
        self.prices.get(model).copied().unwrap_or(0.0)
    }

    /// Count one call of `model` and return its price.
    pub fn record(&mut self, model: &str) -> f64 {
        let cost = self.price(model);
        self.total += cost;
        self.operations += 1;
        debug!("Operation {} cost ${:.4}", model, cost);
        cost
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn operations(&self) -> u32 {
        self.operations
    }

    /// Fresh tracker sharing this price table.
    pub fn reset(&self) -> Self {
        Self {
            prices: self.prices.clone(),
            total: 0.0,
            operations: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut costs = CostTracker::with_defaults();
        costs.record("meta/meta-llama-3-8b-instruct");
        costs.record("dall-e-3");
        costs.record("unknown-model");

        assert_eq!(costs.operations(), 3);
        assert!((costs.total() - 0.0401).abs() < 1e-9);
    }

    #[test]
    fn test_reset_keeps_prices() {
        let mut costs = CostTracker::new().with_price("m", 0.5);
        costs.record("m");

        let fresh = costs.reset();
        assert_eq!(fresh.total(), 0.0);
        assert_eq!(fresh.price("m"), 0.5);
    }
}
