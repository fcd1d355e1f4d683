use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::a001_product::{Product, ProductId};
use crate::domain::a002_offer::{Offer, OfferId, OfferProduct};
use crate::domain::common::{AggregateRoot, EntityMetadata};

/// Offer line in a cart. Totals are for the whole line (already multiplied
/// by quantity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartOfferItem {
    pub offer_id: OfferId,
    pub name: String,
    pub quantity: i32,
    pub original_total: i64,
    pub discounted_total: i64,
    pub total_savings: i64,
    pub products: Vec<OfferProduct>,
    pub added_at: DateTime<Utc>,
}

impl CartOfferItem {
    pub fn from_offer(offer: &Offer, quantity: i32, now: DateTime<Utc>) -> Self {
        let q = i64::from(quantity);
        Self {
            offer_id: offer.id,
            name: offer.name.clone(),
            quantity,
            original_total: offer.original_total * q,
            discounted_total: offer.discounted_total * q,
            total_savings: offer.total_savings * q,
            products: offer.products.clone(),
            added_at: now,
        }
    }
}

/// Product line in a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProductItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
    pub image_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartProductItem {
    pub fn from_product(product: &Product, quantity: i32, now: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            quantity,
            unit_price: product.base_price,
            total_price: product.base_price * i64::from(quantity),
            image_url: product.image_url.clone(),
            added_at: now,
        }
    }
}

/// One cart per user. `total == subtotal` always holds; delivery fee and tax
/// are only applied when an order is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: String,
    pub offers: Vec<CartOfferItem>,
    pub products: Vec<CartProductItem>,
    pub subtotal: i64,
    pub total_savings: i64,
    pub total: i64,
    pub has_invalid_items: bool,
    pub invalid_offer_ids: BTreeSet<OfferId>,
    #[serde(flatten)]
    pub metadata: EntityMetadata,
}

impl Cart {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            offers: Vec::new(),
            products: Vec::new(),
            subtotal: 0,
            total_savings: 0,
            total: 0,
            has_invalid_items: false,
            invalid_offer_ids: BTreeSet::new(),
            metadata: EntityMetadata::at(now),
        }
    }

    /// Merge into an existing line for the same offer, or append
    pub fn add_offer(&mut self, item: CartOfferItem) {
        match self.offers.iter_mut().find(|o| o.offer_id == item.offer_id) {
            Some(existing) => {
                existing.quantity += item.quantity;
                existing.original_total += item.original_total;
                existing.discounted_total += item.discounted_total;
                existing.total_savings += item.total_savings;
            }
            None => self.offers.push(item),
        }
        self.recalculate_totals();
    }

    /// Merge into an existing line for the same product, or append
    pub fn add_product(&mut self, item: CartProductItem) {
        match self
            .products
            .iter_mut()
            .find(|p| p.product_id == item.product_id)
        {
            Some(existing) => {
                existing.quantity += item.quantity;
                existing.total_price += item.total_price;
            }
            None => self.products.push(item),
        }
        self.recalculate_totals();
    }

    /// Set the quantity of the line with `item_id` (offer or product id).
    /// A quantity of zero or less removes the line. Returns `false` when no
    /// line matches.
    pub fn update_quantity(&mut self, item_id: Uuid, quantity: i32) -> bool {
        if quantity <= 0 {
            return self.remove(item_id);
        }
        let q = i64::from(quantity);

        if let Some(offer) = self.offers.iter_mut().find(|o| o.offer_id.0 == item_id) {
            let current = i64::from(offer.quantity.max(1));
            let unit_original = div_round(offer.original_total, current);
            let unit_discounted = div_round(offer.discounted_total, current);
            offer.quantity = quantity;
            offer.original_total = unit_original * q;
            offer.discounted_total = unit_discounted * q;
            offer.total_savings = offer.original_total - offer.discounted_total;
        } else if let Some(product) = self
            .products
            .iter_mut()
            .find(|p| p.product_id.0 == item_id)
        {
            let current = i64::from(product.quantity.max(1));
            let unit = div_round(product.total_price, current);
            product.quantity = quantity;
            product.unit_price = unit;
            product.total_price = unit * q;
        } else {
            return false;
        }

        self.recalculate_totals();
        true
    }

    /// Remove the line with `item_id`. Removing an offer also drops it from
    /// the invalid set.
    pub fn remove(&mut self, item_id: Uuid) -> bool {
        let offers_before = self.offers.len();
        self.offers.retain(|o| o.offer_id.0 != item_id);
        let removed_offer = self.offers.len() != offers_before;

        let products_before = self.products.len();
        self.products.retain(|p| p.product_id.0 != item_id);
        let removed_product = self.products.len() != products_before;

        if removed_offer {
            self.invalid_offer_ids.remove(&OfferId(item_id));
            if self.invalid_offer_ids.is_empty() {
                self.has_invalid_items = false;
            }
        }

        if removed_offer || removed_product {
            self.recalculate_totals();
            true
        } else {
            false
        }
    }

    pub fn recalculate_totals(&mut self) {
        let offers: i64 = self.offers.iter().map(|o| o.discounted_total).sum();
        let products: i64 = self.products.iter().map(|p| p.total_price).sum();
        self.subtotal = offers + products;
        self.total_savings = self
            .offers
            .iter()
            .map(|o| o.original_total - o.discounted_total)
            .sum();
        self.total = self.subtotal;
    }

    /// Record which offers in the cart can no longer be bought. Ids of
    /// offers that are not in the cart are ignored.
    pub fn mark_invalid_offers(&mut self, ids: impl IntoIterator<Item = OfferId>) {
        self.invalid_offer_ids = ids
            .into_iter()
            .filter(|id| self.offers.iter().any(|o| o.offer_id == *id))
            .collect();
        self.has_invalid_items = !self.invalid_offer_ids.is_empty();
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty() && self.products.is_empty()
    }

    pub fn offer_quantity(&self, id: OfferId) -> i32 {
        self.offers
            .iter()
            .find(|o| o.offer_id == id)
            .map_or(0, |o| o.quantity)
    }

    pub fn product_quantity(&self, id: ProductId) -> i32 {
        self.products
            .iter()
            .find(|p| p.product_id == id)
            .map_or(0, |p| p.quantity)
    }
}

impl AggregateRoot for Cart {
    type Id = String;

    fn id(&self) -> Self::Id {
        self.user_id.clone()
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }

    fn element_name() -> &'static str {
        "Cart"
    }
}

/// Integer division rounded half-up (non-negative operands)
fn div_round(value: i64, divisor: i64) -> i64 {
    (value + divisor / 2) / divisor
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOfferRequest {
    pub offer_id: OfferId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProductRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_item(id: OfferId, original: i64, discounted: i64, quantity: i32) -> CartOfferItem {
        CartOfferItem {
            offer_id: id,
            name: "Bundle".into(),
            quantity,
            original_total: original,
            discounted_total: discounted,
            total_savings: original - discounted,
            products: Vec::new(),
            added_at: Utc::now(),
        }
    }

    fn product_item(id: ProductId, unit: i64, quantity: i32) -> CartProductItem {
        CartProductItem {
            product_id: id,
            name: "Apples".into(),
            quantity,
            unit_price: unit,
            total_price: unit * i64::from(quantity),
            image_url: None,
            added_at: Utc::now(),
        }
    }

    fn assert_totals_consistent(cart: &Cart) {
        let expected: i64 = cart.offers.iter().map(|o| o.discounted_total).sum::<i64>()
            + cart.products.iter().map(|p| p.total_price).sum::<i64>();
        assert_eq!(cart.subtotal, expected);
        assert_eq!(cart.total, cart.subtotal);
    }

    #[test]
    fn offer_and_product_totals() {
        let mut cart = Cart::new("user-1", Utc::now());
        cart.add_offer(offer_item(OfferId::new_v4(), 1000, 850, 1));
        cart.add_product(product_item(ProductId::new_v4(), 300, 1));

        assert_eq!(cart.subtotal, 1150);
        assert_eq!(cart.total_savings, 150);
        assert_eq!(cart.total, 1150);
    }

    #[test]
    fn adding_same_offer_merges_line() {
        let id = OfferId::new_v4();
        let mut cart = Cart::new("user-1", Utc::now());
        cart.add_offer(offer_item(id, 1000, 850, 1));
        cart.add_offer(offer_item(id, 2000, 1700, 2));

        assert_eq!(cart.offers.len(), 1);
        assert_eq!(cart.offers[0].quantity, 3);
        assert_eq!(cart.offers[0].discounted_total, 2550);
        assert_eq!(cart.total_savings, 450);
        assert_totals_consistent(&cart);
    }

    #[test]
    fn update_quantity_rescales_line_from_unit_price() {
        let offer_id = OfferId::new_v4();
        let product_id = ProductId::new_v4();
        let mut cart = Cart::new("user-1", Utc::now());
        cart.add_offer(offer_item(offer_id, 2000, 1700, 2));
        cart.add_product(product_item(product_id, 250, 4));

        assert!(cart.update_quantity(offer_id.0, 5));
        assert_eq!(cart.offers[0].original_total, 5000);
        assert_eq!(cart.offers[0].discounted_total, 4250);
        assert_eq!(cart.offers[0].total_savings, 750);

        assert!(cart.update_quantity(product_id.0, 1));
        assert_eq!(cart.products[0].total_price, 250);
        assert_eq!(cart.subtotal, 4500);
        assert_totals_consistent(&cart);
    }

    #[test]
    fn zero_quantity_removes_line() {
        let product_id = ProductId::new_v4();
        let mut cart = Cart::new("user-1", Utc::now());
        cart.add_product(product_item(product_id, 250, 4));

        assert!(cart.update_quantity(product_id.0, 0));
        assert!(cart.is_empty());
        assert_eq!(cart.total, 0);
        assert!(!cart.update_quantity(Uuid::new_v4(), 3));
    }

    #[test]
    fn removing_invalid_offer_clears_flag() {
        let stale = OfferId::new_v4();
        let fresh = OfferId::new_v4();
        let mut cart = Cart::new("user-1", Utc::now());
        cart.add_offer(offer_item(stale, 1000, 800, 1));
        cart.add_offer(offer_item(fresh, 500, 450, 1));
        cart.mark_invalid_offers([stale, OfferId::new_v4()]);

        assert!(cart.has_invalid_items);
        assert_eq!(cart.invalid_offer_ids.len(), 1);

        assert!(cart.remove(stale.0));
        assert!(!cart.has_invalid_items);
        assert!(cart.invalid_offer_ids.is_empty());
        assert_eq!(cart.total, 450);
        assert_eq!(cart.total_savings, 50);
    }

    #[test]
    fn totals_hold_across_mixed_mutations() {
        let offers: Vec<OfferId> = (0..3).map(|_| OfferId::new_v4()).collect();
        let products: Vec<ProductId> = (0..3).map(|_| ProductId::new_v4()).collect();
        let mut cart = Cart::new("user-1", Utc::now());

        for (i, id) in offers.iter().enumerate() {
            let n = i as i64 + 1;
            cart.add_offer(offer_item(*id, 1000 * n, 900 * n, 1));
            assert_totals_consistent(&cart);
        }
        for (i, id) in products.iter().enumerate() {
            cart.add_product(product_item(*id, 199, i as i32 + 1));
            assert_totals_consistent(&cart);
        }
        cart.update_quantity(offers[1].0, 3);
        assert_totals_consistent(&cart);
        cart.remove(products[0].0);
        assert_totals_consistent(&cart);
        cart.update_quantity(products[2].0, -1);
        assert_totals_consistent(&cart);
        cart.add_product(product_item(products[1], 199, 1));
        assert_totals_consistent(&cart);
        assert_eq!(cart.product_quantity(products[1]), 3);
    }
}
