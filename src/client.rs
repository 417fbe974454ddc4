//! The unit of work every policy wraps: repository read plus outbound
//! address call.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::chaos::FaultInjector;
use crate::error::CallError;
use crate::metrics::MetricSink;
use crate::model::{Address, CallContext, Order};

/// Read access to order records.
pub trait OrderStore: Send + Sync + 'static {
    /// Looks up an order by its correlation key.
    fn find_by_order_number(&self, order_number: &str) -> Option<Order>;
}

/// Outbound call to the address service: `GET /addresses/{postalCode}`.
///
/// `Ok(None)` models a success response with no body: the order is
/// returned without enrichment, degraded but successful.
pub trait AddressClient: Send + Sync + 'static {
    /// Fetches the address for a postal code.
    fn fetch(&self, postal_code: &str) -> Result<Option<Address>, CallError>;
}

/// In-memory order store for demos and tests.
pub struct InMemoryOrderStore {
    orders: RwLock<AHashMap<String, Order>>,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(AHashMap::new()),
        }
    }

    /// Inserts (or replaces) an order, keyed by its order number.
    pub fn insert(&self, order: Order) {
        self.orders
            .write()
            .insert(order.order_number.clone(), order);
    }

    /// Removes every order.
    pub fn clear(&self) {
        self.orders.write().clear();
    }
}

impl OrderStore for InMemoryOrderStore {
    fn find_by_order_number(&self, order_number: &str) -> Option<Order> {
        self.orders.read().get(order_number).cloned()
    }
}

/// Performs one enrichment: read the order, pass the fault injector, call
/// the address service, fold the address into the order.
pub struct DependencyClient {
    store: Arc<dyn OrderStore>,
    addresses: Arc<dyn AddressClient>,
    injector: FaultInjector,
    sink: Arc<dyn MetricSink>,
}

impl DependencyClient {
    /// Wires the client to its collaborators.
    pub fn new(
        store: Arc<dyn OrderStore>,
        addresses: Arc<dyn AddressClient>,
        injector: FaultInjector,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            store,
            addresses,
            injector,
            sink,
        }
    }

    /// Executes the unit of work for one call context.
    pub fn enrich(&self, ctx: &CallContext) -> Result<Order, CallError> {
        let mut order = self
            .store
            .find_by_order_number(&ctx.order_number)
            .ok_or_else(|| {
                error!(order_number = %ctx.order_number, "order not found");
                CallError::OrderNotFound(ctx.order_number.clone())
            })?;

        self.sink
            .incr("orders.by_postal_code", Some(&order.postal_code));

        // Injected faults surface here, before the real call, so retry
        // and breaker see them exactly as real faults.
        self.injector.inject()?;

        debug!(
            order_number = %ctx.order_number,
            postal_code = %order.postal_code,
            "calling address service"
        );

        match self.addresses.fetch(&order.postal_code)? {
            Some(address) => {
                info!(
                    order_number = %ctx.order_number,
                    city = %address.city,
                    state = %address.state,
                    "successfully retrieved address"
                );
                order.shipping_state = Some(address.state);
                order.shipping_city = Some(address.city);
            }
            None => {
                warn!(
                    order_number = %ctx.order_number,
                    postal_code = %order.postal_code,
                    "address service returned empty body"
                );
            }
        }

        Ok(order)
    }
}
