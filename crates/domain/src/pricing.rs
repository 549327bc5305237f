//! Booking price computation.
//!
//! A quote is all-or-nothing: the first invalid line rejects the whole
//! request, so callers never persist a partially priced booking. Line prices
//! are rounded to 2 decimals and the total is the rounded sum of the rounded
//! lines, which keeps the stored total equal to the sum of stored lines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::service::{BoundsError, QuantityBounds};

/// Smallest weight any booking line may request, in kilograms.
pub const MIN_LINE_QUANTITY: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("At least one service is required")]
    Empty,
    #[error("Service not found or inactive: {0}")]
    Unavailable(String),
    #[error("Quantity for {name} must be at least 0.1 kg")]
    TooSmall { name: String },
    #[error(transparent)]
    Bounds(#[from] BoundsError),
}

/// A requested `(service, kilograms)` pair as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub service_id: String,
    pub quantity: f64,
}

/// The catalog facts pricing depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub price_per_kg: f64,
    pub bounds: QuantityBounds,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub service_id: String,
    pub quantity: f64,
    pub estimated_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub total_estimated_price: f64,
}

pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn line_price(quantity: f64, price_per_kg: f64) -> f64 {
    round_currency(quantity * price_per_kg)
}

/// Sum of already rounded line prices, rounded again to absorb float drift.
pub fn total_of<'a>(prices: impl IntoIterator<Item = &'a f64>) -> f64 {
    round_currency(prices.into_iter().sum())
}

impl CatalogEntry {
    pub fn price(&self, quantity: f64) -> Result<PricedLine, PricingError> {
        if !self.is_active {
            return Err(PricingError::Unavailable(self.id.clone()));
        }
        if !quantity.is_finite() || quantity < MIN_LINE_QUANTITY {
            return Err(PricingError::TooSmall {
                name: self.name.clone(),
            });
        }
        self.bounds.check(&self.name, quantity)?;

        Ok(PricedLine {
            service_id: self.id.clone(),
            quantity,
            estimated_price: line_price(quantity, self.price_per_kg),
        })
    }
}

/// Prices every line against the catalog, rejecting the request as a whole
/// if any single line is invalid.
pub fn quote<'a, F>(lines: &[LineRequest], mut lookup: F) -> Result<Quote, PricingError>
where
    F: FnMut(&str) -> Option<&'a CatalogEntry>,
{
    if lines.is_empty() {
        return Err(PricingError::Empty);
    }

    let priced = lines
        .iter()
        .map(|line| {
            lookup(&line.service_id)
                .ok_or_else(|| PricingError::Unavailable(line.service_id.clone()))?
                .price(line.quantity)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total_estimated_price = total_of(priced.iter().map(|line| &line.estimated_price));

    Ok(Quote {
        lines: priced,
        total_estimated_price,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn entry(id: &str, price: f64, min: f64, max: f64) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            name: format!("Service {id}"),
            price_per_kg: price,
            bounds: QuantityBounds::new(min, max).unwrap(),
            is_active: true,
        }
    }

    fn catalog(entries: Vec<CatalogEntry>) -> HashMap<String, CatalogEntry> {
        entries.into_iter().map(|e| (e.id.clone(), e)).collect()
    }

    fn line(id: &str, quantity: f64) -> LineRequest {
        LineRequest {
            service_id: id.to_string(),
            quantity,
        }
    }

    #[test]
    fn total_is_sum_of_line_prices() {
        let catalog = catalog(vec![entry("a", 12.5, 1.0, 100.0), entry("b", 3.0, 1.0, 100.0)]);
        let quote = quote(&[line("a", 2.0), line("b", 4.5)], |id| catalog.get(id)).unwrap();

        assert_eq!(quote.lines[0].estimated_price, 25.0);
        assert_eq!(quote.lines[1].estimated_price, 13.5);
        assert_eq!(quote.total_estimated_price, 38.5);
    }

    #[test]
    fn rounds_each_line_to_cents() {
        let catalog = catalog(vec![entry("a", 0.333, 0.0, 100.0)]);
        let quote = quote(&[line("a", 1.0), line("a", 2.0)], |id| catalog.get(id)).unwrap();

        assert_eq!(quote.lines[0].estimated_price, 0.33);
        assert_eq!(quote.lines[1].estimated_price, 0.67);
        assert_eq!(quote.total_estimated_price, 1.0);
    }

    #[test]
    fn one_bad_line_rejects_everything() {
        let catalog = catalog(vec![entry("a", 10.0, 1.0, 100.0)]);
        let err = quote(&[line("a", 5.0), line("a", 0.05)], |id| catalog.get(id)).unwrap_err();
        assert!(matches!(err, PricingError::TooSmall { .. }));

        let err = quote(&[line("a", 5.0), line("a", 0.5)], |id| catalog.get(id)).unwrap_err();
        assert_eq!(err.to_string(), "Minimum quantity for Service a is 1 kg");

        let err = quote(&[line("a", 101.0)], |id| catalog.get(id)).unwrap_err();
        assert_eq!(err.to_string(), "Maximum quantity for Service a is 100 kg");
    }

    #[test]
    fn unknown_and_inactive_services_are_unavailable() {
        let mut inactive = entry("b", 1.0, 1.0, 10.0);
        inactive.is_active = false;
        let catalog = catalog(vec![entry("a", 1.0, 1.0, 10.0), inactive]);

        assert_eq!(
            quote(&[line("missing", 2.0)], |id| catalog.get(id)).unwrap_err(),
            PricingError::Unavailable("missing".to_string())
        );
        assert_eq!(
            quote(&[line("b", 2.0)], |id| catalog.get(id)).unwrap_err(),
            PricingError::Unavailable("b".to_string())
        );
    }

    #[test]
    fn empty_request_is_rejected() {
        let catalog: HashMap<String, CatalogEntry> = HashMap::new();
        assert_eq!(quote(&[], |id| catalog.get(id)).unwrap_err(), PricingError::Empty);
    }

    #[test]
    fn non_finite_quantity_is_rejected() {
        let catalog = catalog(vec![entry("a", 1.0, 0.0, 10.0)]);
        assert!(quote(&[line("a", f64::NAN)], |id| catalog.get(id)).is_err());
    }
}
