//! Pickup cart.
//!
//! Lines are keyed by service id and kept in insertion order. Totals are a
//! derived cache: every mutation rebuilds them from the lines and writes the
//! whole snapshot to the store, so they can never drift from the items.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trashtocash_domain::{
    pricing::{line_price, total_of},
    BoundsError, LineRequest, QuantityBounds,
};

use crate::storage::SnapshotStore;

const CART_KEY: &str = "cart";

/// The catalog fields the cart needs, as returned by `GET /api/services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub id: String,
    pub name: String,
    pub price_per_kg: f64,
    #[serde(flatten)]
    pub bounds: QuantityBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub service: ServiceSnapshot,
    pub quantity: f64,
    pub estimated_price: f64,
}

impl CartItem {
    fn new(service: ServiceSnapshot, quantity: f64) -> Self {
        let estimated_price = line_price(quantity, service.price_per_kg);
        Self {
            service,
            quantity,
            estimated_price,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub total_items: f64,
    pub total_price: f64,
}

impl CartSnapshot {
    fn from_items(items: Vec<CartItem>) -> Self {
        let total_items = items.iter().map(|item| item.quantity).sum();
        let total_price = total_of(items.iter().map(|item| &item.estimated_price));
        Self {
            items,
            total_items,
            total_price,
        }
    }
}

/// Why a cart mutation was ignored. The cart is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CartWarning {
    #[error("Quantity must be greater than 0")]
    NonPositive,
    #[error(transparent)]
    OutOfBounds(#[from] BoundsError),
    #[error("Item not found in cart")]
    NotInCart(String),
}

pub struct Cart<S> {
    state: CartSnapshot,
    store: S,
}

impl<S: SnapshotStore> Cart<S> {
    /// Restores the last saved cart. A snapshot that cannot be read is
    /// discarded and the cart starts empty.
    pub fn open(mut store: S) -> Self {
        let saved = match store.load(CART_KEY) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("Failed to read saved cart: {e}");
                None
            }
        };

        let state = match saved.map(|raw| serde_json::from_str::<CartSnapshot>(&raw)) {
            Some(Ok(snapshot)) => {
                let items = snapshot
                    .items
                    .into_iter()
                    .map(|item| CartItem::new(item.service, item.quantity))
                    .collect();
                CartSnapshot::from_items(items)
            }
            Some(Err(e)) => {
                tracing::warn!("Error loading cart from storage: {e}");
                if let Err(e) = store.remove(CART_KEY) {
                    tracing::warn!("Failed to discard saved cart: {e}");
                }
                CartSnapshot::default()
            }
            None => CartSnapshot::default(),
        };

        Self { state, store }
    }

    pub fn snapshot(&self) -> &CartSnapshot {
        &self.state
    }

    pub fn items(&self) -> &[CartItem] {
        &self.state.items
    }

    pub fn total_items(&self) -> f64 {
        self.state.total_items
    }

    pub fn total_price(&self) -> f64 {
        self.state.total_price
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds `quantity` kg of `service`, merging into an existing line.
    pub fn add_item(&mut self, service: ServiceSnapshot, quantity: f64) -> Result<(), CartWarning> {
        if quantity.is_nan() || quantity <= 0.0 {
            return warn(CartWarning::NonPositive);
        }

        let mut items = self.state.items.clone();
        match items.iter().position(|item| item.service.id == service.id) {
            Some(index) => {
                let merged = items[index].quantity + quantity;
                if let Err(e) = service.bounds.check(&service.name, merged) {
                    return warn(e.into());
                }
                items[index] = CartItem::new(service, merged);
            }
            None => {
                if let Err(e) = service.bounds.check(&service.name, quantity) {
                    return warn(e.into());
                }
                items.push(CartItem::new(service, quantity));
            }
        }

        self.commit(items);
        Ok(())
    }

    pub fn remove_item(&mut self, service_id: &str) {
        let items = self
            .state
            .items
            .iter()
            .filter(|item| item.service.id != service_id)
            .cloned()
            .collect();
        self.commit(items);
    }

    /// Sets a line's quantity. Zero or less removes the line.
    pub fn update_quantity(&mut self, service_id: &str, quantity: f64) -> Result<(), CartWarning> {
        let Some(index) = self
            .state
            .items
            .iter()
            .position(|item| item.service.id == service_id)
        else {
            return warn(CartWarning::NotInCart(service_id.to_string()));
        };

        if quantity.is_nan() {
            return warn(CartWarning::NonPositive);
        }
        if quantity <= 0.0 {
            self.remove_item(service_id);
            return Ok(());
        }

        let service = self.state.items[index].service.clone();
        if let Err(e) = service.bounds.check(&service.name, quantity) {
            return warn(e.into());
        }

        let mut items = self.state.items.clone();
        items[index] = CartItem::new(service, quantity);
        self.commit(items);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.state = CartSnapshot::default();
        if let Err(e) = self.store.remove(CART_KEY) {
            tracing::warn!("Failed to clear saved cart: {e}");
        }
    }

    pub fn item_quantity(&self, service_id: &str) -> f64 {
        self.state
            .items
            .iter()
            .find(|item| item.service.id == service_id)
            .map_or(0.0, |item| item.quantity)
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.state
            .items
            .iter()
            .any(|item| item.service.id == service_id)
    }

    /// The `services` array of a booking submission.
    pub fn booking_lines(&self) -> Vec<LineRequest> {
        self.state
            .items
            .iter()
            .map(|item| LineRequest {
                service_id: item.service.id.clone(),
                quantity: item.quantity,
            })
            .collect()
    }

    fn commit(&mut self, items: Vec<CartItem>) {
        self.state = CartSnapshot::from_items(items);
        let persisted = serde_json::to_string(&self.state)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.store.save(CART_KEY, &raw).map_err(|e| e.to_string()));
        if let Err(e) = persisted {
            tracing::warn!("Failed to save cart: {e}");
        }
    }
}

fn warn(warning: CartWarning) -> Result<(), CartWarning> {
    tracing::warn!("{warning}");
    Err(warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn service(id: &str, price: f64, min: f64, max: f64) -> ServiceSnapshot {
        ServiceSnapshot {
            id: id.to_string(),
            name: format!("Service {id}"),
            price_per_kg: price,
            bounds: QuantityBounds::new(min, max).unwrap(),
        }
    }

    fn saved(cart: &Cart<MemoryStore>) -> Option<CartSnapshot> {
        cart.store()
            .get(CART_KEY)
            .map(|raw| serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn adding_same_service_merges_lines() {
        let mut cart = Cart::open(MemoryStore::new());
        let plastic = service("plastic", 8.0, 1.0, 100.0);

        cart.add_item(plastic.clone(), 2.0).unwrap();
        cart.add_item(plastic, 3.0).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 5.0);
        assert_eq!(cart.items()[0].estimated_price, 40.0);
        assert_eq!(cart.total_items(), 5.0);
        assert_eq!(cart.total_price(), 40.0);
        assert_eq!(saved(&cart).as_ref(), Some(cart.snapshot()));
    }

    #[test]
    fn out_of_bounds_add_is_a_warning_and_a_no_op() {
        let mut cart = Cart::open(MemoryStore::new());
        let metal = service("metal", 20.0, 1.0, 10.0);

        assert!(matches!(
            cart.add_item(metal.clone(), 0.5),
            Err(CartWarning::OutOfBounds(BoundsError::BelowMinimum { .. }))
        ));
        assert_eq!(cart.add_item(metal.clone(), 0.0), Err(CartWarning::NonPositive));
        assert!(cart.is_empty());

        cart.add_item(metal.clone(), 6.0).unwrap();
        assert!(matches!(
            cart.add_item(metal, 6.0),
            Err(CartWarning::OutOfBounds(BoundsError::AboveMaximum { .. }))
        ));
        assert_eq!(cart.item_quantity("metal"), 6.0);
    }

    #[test]
    fn update_to_zero_removes_the_line() {
        let mut cart = Cart::open(MemoryStore::new());
        cart.add_item(service("glass", 2.0, 1.0, 50.0), 4.0).unwrap();
        cart.add_item(service("paper", 5.0, 1.0, 50.0), 2.0).unwrap();
        assert_eq!(cart.total_items(), 6.0);
        assert_eq!(cart.total_price(), 18.0);

        cart.update_quantity("glass", 0.0).unwrap();

        assert!(!cart.contains("glass"));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_items(), 2.0);
        assert_eq!(cart.total_price(), 10.0);
    }

    #[test]
    fn update_respects_bounds_and_unknown_ids() {
        let mut cart = Cart::open(MemoryStore::new());
        cart.add_item(service("glass", 2.0, 1.0, 50.0), 4.0).unwrap();

        assert!(cart.update_quantity("glass", 60.0).is_err());
        assert_eq!(cart.item_quantity("glass"), 4.0);
        assert_eq!(
            cart.update_quantity("nope", 3.0),
            Err(CartWarning::NotInCart("nope".to_string()))
        );

        cart.update_quantity("glass", 10.0).unwrap();
        assert_eq!(cart.total_price(), 20.0);
    }

    #[test]
    fn clear_empties_and_forgets_the_snapshot() {
        let mut cart = Cart::open(MemoryStore::new());
        cart.add_item(service("glass", 2.0, 1.0, 50.0), 4.0).unwrap();
        cart.clear();

        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), 0.0);
        assert_eq!(saved(&cart), None);
    }

    #[test]
    fn reopening_restores_items_and_recomputes_totals() {
        let mut store = MemoryStore::new();
        let tampered = serde_json::json!({
            "items": [{
                "service": {
                    "id": "paper", "name": "Paper", "pricePerKg": 5.0,
                    "minimumQuantity": 1.0, "maximumQuantity": 50.0
                },
                "quantity": 3.0,
                "estimatedPrice": 1.0
            }],
            "totalItems": 99.0,
            "totalPrice": 1.0
        });
        store.save(CART_KEY, &tampered.to_string()).unwrap();

        let cart = Cart::open(store);

        assert_eq!(cart.items()[0].estimated_price, 15.0);
        assert_eq!(cart.total_items(), 3.0);
        assert_eq!(cart.total_price(), 15.0);
    }

    #[test]
    fn corrupt_snapshot_is_discarded() {
        let mut store = MemoryStore::new();
        store.save(CART_KEY, "{not json").unwrap();

        let cart = Cart::open(store);

        assert!(cart.is_empty());
        assert_eq!(cart.store().get(CART_KEY), None);
    }

    #[test]
    fn booking_lines_follow_cart_order() {
        let mut cart = Cart::open(MemoryStore::new());
        cart.add_item(service("b", 1.0, 1.0, 50.0), 2.0).unwrap();
        cart.add_item(service("a", 1.0, 1.0, 50.0), 3.0).unwrap();

        let lines = cart.booking_lines();
        assert_eq!(lines[0].service_id, "b");
        assert_eq!(lines[1].quantity, 3.0);
    }
}
