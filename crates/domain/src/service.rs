use serde::{Deserialize, Serialize};
use thiserror::Error;

wire_enum! {
    /// Waste types a pickup service can collect.
    pub enum ServiceCategory as "category" {
        PaperCardboard => "Paper & Cardboard",
        Plastic => "Plastic",
        Metal => "Metal",
        Glass => "Glass",
        ElectronicWaste => "Electronic Waste",
        OrganicWaste => "Organic Waste",
        Textile => "Textile",
        MixedWaste => "Mixed Waste",
        BulkPickup => "Bulk Pickup",
    }
}

pub const DEFAULT_MINIMUM_QUANTITY: f64 = 1.0;
pub const DEFAULT_MAXIMUM_QUANTITY: f64 = 1000.0;
pub const DEFAULT_PROCESSING_TIME: &str = "24-48 hours";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    #[error("Minimum quantity cannot be negative")]
    NegativeMinimum,
    #[error("Maximum quantity must be at least 1")]
    MaximumTooSmall,
    #[error("Maximum quantity must be greater than minimum quantity")]
    Inverted,
    #[error("Minimum quantity for {name} is {min} kg")]
    BelowMinimum { name: String, min: f64 },
    #[error("Maximum quantity for {name} is {max} kg")]
    AboveMaximum { name: String, max: f64 },
}

/// Inclusive kilogram range a single booking line may request.
///
/// Construction enforces `maximum > minimum`, so a value of this type is
/// always a usable range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBounds")]
pub struct QuantityBounds {
    minimum_quantity: f64,
    maximum_quantity: f64,
}

impl QuantityBounds {
    pub fn new(minimum: f64, maximum: f64) -> Result<Self, BoundsError> {
        if minimum.is_nan() || minimum < 0.0 {
            return Err(BoundsError::NegativeMinimum);
        }
        if maximum.is_nan() || maximum < 1.0 {
            return Err(BoundsError::MaximumTooSmall);
        }
        if maximum <= minimum {
            return Err(BoundsError::Inverted);
        }
        Ok(Self {
            minimum_quantity: minimum,
            maximum_quantity: maximum,
        })
    }

    pub fn minimum(&self) -> f64 {
        self.minimum_quantity
    }

    pub fn maximum(&self) -> f64 {
        self.maximum_quantity
    }

    pub fn check(&self, service_name: &str, quantity: f64) -> Result<(), BoundsError> {
        if quantity < self.minimum_quantity {
            return Err(BoundsError::BelowMinimum {
                name: service_name.to_string(),
                min: self.minimum_quantity,
            });
        }
        if quantity > self.maximum_quantity {
            return Err(BoundsError::AboveMaximum {
                name: service_name.to_string(),
                max: self.maximum_quantity,
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBounds {
    minimum_quantity: f64,
    maximum_quantity: f64,
}

impl TryFrom<RawBounds> for QuantityBounds {
    type Error = BoundsError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Self::new(raw.minimum_quantity, raw.maximum_quantity)
    }
}

impl Default for QuantityBounds {
    fn default() -> Self {
        Self {
            minimum_quantity: DEFAULT_MINIMUM_QUANTITY,
            maximum_quantity: DEFAULT_MAXIMUM_QUANTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_and_equal_bounds() {
        assert_eq!(QuantityBounds::new(10.0, 10.0), Err(BoundsError::Inverted));
        assert_eq!(QuantityBounds::new(10.0, 5.0), Err(BoundsError::Inverted));
        assert_eq!(
            QuantityBounds::new(-1.0, 5.0),
            Err(BoundsError::NegativeMinimum)
        );
        assert_eq!(
            QuantityBounds::new(0.0, 0.5),
            Err(BoundsError::MaximumTooSmall)
        );
    }

    #[test]
    fn check_is_inclusive() {
        let bounds = QuantityBounds::new(1.0, 50.0).unwrap();
        assert!(bounds.check("Plastic", 1.0).is_ok());
        assert!(bounds.check("Plastic", 50.0).is_ok());
        let err = bounds.check("Plastic", 0.05).unwrap_err();
        assert_eq!(err.to_string(), "Minimum quantity for Plastic is 1 kg");
        let err = bounds.check("Plastic", 51.0).unwrap_err();
        assert_eq!(err.to_string(), "Maximum quantity for Plastic is 50 kg");
    }

    #[test]
    fn category_round_trips_display_names() {
        for category in ServiceCategory::ALL {
            assert_eq!(category.as_str().parse::<ServiceCategory>().unwrap(), *category);
        }
        assert_eq!(
            serde_json::to_string(&ServiceCategory::PaperCardboard).unwrap(),
            "\"Paper & Cardboard\""
        );
    }

    #[test]
    fn deserializing_enforces_the_invariant() {
        let ok: QuantityBounds =
            serde_json::from_str(r#"{"minimumQuantity":2,"maximumQuantity":20}"#).unwrap();
        assert_eq!((ok.minimum(), ok.maximum()), (2.0, 20.0));
        assert!(serde_json::from_str::<QuantityBounds>(
            r#"{"minimumQuantity":20,"maximumQuantity":2}"#
        )
        .is_err());
    }
}
