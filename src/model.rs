//! Domain records flowing through the pipeline.

use std::time::{Duration, Instant};

/// An order record, read from the order store and enriched with shipping
/// address data fetched from the address service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Storage identifier.
    pub id: u64,

    /// Caller-facing correlation key, e.g. `ORDER-1`.
    pub order_number: String,

    /// Postal code used for the address lookup.
    pub postal_code: String,

    /// Shipping state, populated by enrichment.
    pub shipping_state: Option<String>,

    /// Shipping city, populated by enrichment.
    pub shipping_city: Option<String>,
}

impl Order {
    /// Creates an order with no shipping data yet.
    pub fn new(id: u64, order_number: &str, postal_code: &str) -> Self {
        Self {
            id,
            order_number: order_number.to_string(),
            postal_code: postal_code.to_string(),
            shipping_state: None,
            shipping_city: None,
        }
    }
}

/// Success payload of the address service: `GET /addresses/{postalCode}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Address record identifier.
    pub id: u64,

    /// Postal code the address was looked up by.
    pub postal_code: String,

    /// State component of the address.
    pub state: String,

    /// City component of the address.
    pub city: String,
}

/// Identifies one logical request for the duration of a single pipeline
/// traversal.
///
/// The context owns the duration timer: it is created when the traversal
/// starts and read exactly once when the terminal outcome is recorded,
/// so there is no per-call timer map keyed by correlation string to leak
/// or collide.
#[derive(Debug)]
pub struct CallContext {
    /// Correlation key for this traversal.
    pub order_number: String,

    started_at: Instant,
}

impl CallContext {
    /// Starts a new context (and its timer) for one traversal.
    pub fn new(order_number: &str) -> Self {
        Self {
            order_number: order_number.to_string(),
            started_at: Instant::now(),
        }
    }

    /// Time elapsed since the traversal started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
