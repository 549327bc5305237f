//! Business rules shared by the TrashToCash server and client.
//!
//! Everything here is synchronous and free of I/O: closed enums for every
//! role and status field, service quantity bounds, booking pricing, the
//! booking status machine and the field validators used before any write.

use thiserror::Error;

/// Defines a closed enum whose variants map one-to-one onto wire strings.
///
/// Generates serde renames, `as_str`, `ALL`, `Display` and `FromStr`.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $label:literal {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($wire => Ok($name::$variant),)+
                    other => Err($crate::UnknownVariant {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub mod booking;
pub mod contact;
pub mod pricing;
pub mod service;
pub mod user;
pub mod validate;

pub use booking::{
    authorize_transition, ensure_feedback_allowed, earliest_pickup_date, BookingStatus, Feedback,
    FeedbackError, PaymentMethod, PaymentStatus, TimeSlot, TransitionError,
};
pub use contact::{ContactCategory, ContactPriority, ContactStatus};
pub use pricing::{quote, round_currency, CatalogEntry, LineRequest, PricedLine, PricingError, Quote};
pub use service::{BoundsError, QuantityBounds, ServiceCategory};
pub use user::Role;

/// A string that does not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
