use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::a003_cart::{Cart, CartOfferItem, CartProductItem};
use crate::domain::common::{AggregateRoot, EntityMetadata};

crate::uuid_aggregate_id!(
    /// Unique order identifier
    OrderId
);

// ============================================================================
// Status state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    ReadyForPickup,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn code(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::all().into_iter().find(|s| s.code() == code)
    }

    pub fn all() -> Vec<OrderStatus> {
        vec![
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
            OrderStatus::ReadyForPickup,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ]
    }

    /// Fixed transition table, before filtering by fulfillment method
    pub fn transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[OutForDelivery, ReadyForPickup, Cancelled],
            OutForDelivery => &[Completed, Cancelled],
            ReadyForPickup => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.transitions().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMethod {
    Delivery,
    Pickup,
}

impl FulfillmentMethod {
    pub fn code(&self) -> &'static str {
        match self {
            FulfillmentMethod::Delivery => "delivery",
            FulfillmentMethod::Pickup => "pickup",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "delivery" => Some(FulfillmentMethod::Delivery),
            "pickup" => Some(FulfillmentMethod::Pickup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ============================================================================
// Aggregate Root
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetails {
    pub address: String,
    pub instructions: Option<String>,
    pub preferred_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupDetails {
    pub location: String,
    pub pickup_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub offers: Vec<CartOfferItem>,
    pub products: Vec<CartProductItem>,
    pub subtotal: i64,
    pub total_savings: i64,
    pub delivery_fee: i64,
    pub tax: i64,
    pub total: i64,
    pub fulfillment_method: FulfillmentMethod,
    pub delivery_details: Option<DeliveryDetails>,
    pub pickup_details: Option<PickupDetails>,
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub completed_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub metadata: EntityMetadata,
}

impl Order {
    /// Build a pending order from the cart contents at checkout time
    pub fn from_cart(
        cart: &Cart,
        request: &CheckoutRequest,
        pricing: &PricingRules,
        now: DateTime<Utc>,
    ) -> Self {
        let id = OrderId::new_v4();
        let delivery_fee = pricing.delivery_fee(request.fulfillment_method, cart.subtotal);
        let tax = pricing.tax(cart.subtotal);

        Self {
            id,
            order_number: Self::make_number(id, now),
            user_id: cart.user_id.clone(),
            customer_name: request.customer_name.trim().to_string(),
            customer_email: request.customer_email.trim().to_lowercase(),
            customer_phone: request.customer_phone.trim().to_string(),
            offers: cart.offers.clone(),
            products: cart.products.clone(),
            subtotal: cart.subtotal,
            total_savings: cart.total_savings,
            delivery_fee,
            tax,
            total: cart.subtotal + delivery_fee + tax,
            fulfillment_method: request.fulfillment_method,
            delivery_details: match request.fulfillment_method {
                FulfillmentMethod::Delivery => request.delivery_details.clone(),
                FulfillmentMethod::Pickup => None,
            },
            pickup_details: match request.fulfillment_method {
                FulfillmentMethod::Pickup => request.pickup_details.clone(),
                FulfillmentMethod::Delivery => None,
            },
            status: OrderStatus::Pending,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Pending,
                timestamp: now,
                note: None,
            }],
            completed_at: None,
            invoice_url: None,
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            metadata: EntityMetadata::at(now),
        }
    }

    /// `ORD-YYYYMMDD-XXXXXX`
    pub fn make_number(id: OrderId, now: DateTime<Utc>) -> String {
        let suffix: String = id.0.simple().to_string().chars().take(6).collect();
        format!("ORD-{}-{}", now.format("%Y%m%d"), suffix.to_uppercase())
    }

    /// Transitions allowed from the current status for this order's
    /// fulfillment method
    pub fn available_transitions(&self) -> Vec<OrderStatus> {
        self.status
            .transitions()
            .iter()
            .copied()
            .filter(|s| match s {
                OrderStatus::OutForDelivery => {
                    self.fulfillment_method == FulfillmentMethod::Delivery
                }
                OrderStatus::ReadyForPickup => {
                    self.fulfillment_method == FulfillmentMethod::Pickup
                }
                _ => true,
            })
            .collect()
    }

    pub fn can_transition_to(&self, status: OrderStatus) -> bool {
        self.available_transitions().contains(&status)
    }

    /// Move to `new_status`, appending to the history. On error the order is
    /// left untouched.
    pub fn apply_transition(
        &mut self,
        new_status: OrderStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.can_transition_to(new_status) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        // History must never go backwards, even if the clock does.
        let timestamp = self
            .status_history
            .last()
            .map_or(now, |last| last.timestamp.max(now));

        self.status = new_status;
        self.status_history.push(StatusHistoryEntry {
            status: new_status,
            timestamp,
            note: note.filter(|n| !n.trim().is_empty()),
        });
        self.metadata.touch_at(timestamp);
        if new_status == OrderStatus::Completed {
            self.completed_at = Some(timestamp);
        }
        Ok(())
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }

    fn element_name() -> &'static str {
        "Order"
    }
}

/// Fees applied when an order is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRules {
    pub delivery_fee: i64,
    /// Subtotal at or above which delivery is free
    pub free_delivery_threshold: Option<i64>,
    /// Tax rate in basis points (1/100 of a percent)
    pub tax_rate_bps: i64,
}

impl PricingRules {
    pub fn delivery_fee(&self, method: FulfillmentMethod, subtotal: i64) -> i64 {
        match method {
            FulfillmentMethod::Pickup => 0,
            FulfillmentMethod::Delivery => match self.free_delivery_threshold {
                Some(threshold) if subtotal >= threshold => 0,
                _ => self.delivery_fee,
            },
        }
    }

    pub fn tax(&self, subtotal: i64) -> i64 {
        (subtotal * self.tax_rate_bps + 5_000) / 10_000
    }
}

// ============================================================================
// Forms / DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub fulfillment_method: FulfillmentMethod,
    pub delivery_details: Option<DeliveryDetails>,
    pub pickup_details: Option<PickupDetails>,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_name.trim().is_empty() {
            return Err("Customer name is required".into());
        }
        let email = self.customer_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err("A valid customer email is required".into());
        }
        if self.customer_phone.trim().is_empty() {
            return Err("Customer phone is required".into());
        }
        match self.fulfillment_method {
            FulfillmentMethod::Delivery => match &self.delivery_details {
                Some(d) if !d.address.trim().is_empty() => Ok(()),
                _ => Err("Delivery orders need a delivery address".into()),
            },
            FulfillmentMethod::Pickup => match &self.pickup_details {
                Some(p) if !p.location.trim().is_empty() => Ok(()),
                _ => Err("Pickup orders need a pickup location".into()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
    /// Cancelling is destructive and must be confirmed explicitly
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub fulfillment_method: Option<FulfillmentMethod>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInvoiceRequest {
    pub invoice_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionsResponse {
    pub current: OrderStatus,
    pub available: Vec<OrderStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a002_offer::OfferId;
    use chrono::Duration;

    fn pricing() -> PricingRules {
        PricingRules {
            delivery_fee: 499,
            free_delivery_threshold: Some(5_000),
            tax_rate_bps: 800,
        }
    }

    fn request(method: FulfillmentMethod) -> CheckoutRequest {
        CheckoutRequest {
            customer_name: "Ada Lovelace".into(),
            customer_email: "Ada@Example.com".into(),
            customer_phone: "+15551234567".into(),
            fulfillment_method: method,
            delivery_details: Some(DeliveryDetails {
                address: "12 Analytical Way".into(),
                instructions: None,
                preferred_time: None,
            }),
            pickup_details: Some(PickupDetails {
                location: "Main St store".into(),
                pickup_time: None,
            }),
            notes: None,
        }
    }

    fn cart() -> Cart {
        let mut cart = Cart::new("user-1", Utc::now());
        cart.add_offer(CartOfferItem {
            offer_id: OfferId::new_v4(),
            name: "Bundle".into(),
            quantity: 1,
            original_total: 1000,
            discounted_total: 850,
            total_savings: 150,
            products: Vec::new(),
            added_at: Utc::now(),
        });
        cart
    }

    fn order(method: FulfillmentMethod) -> Order {
        Order::from_cart(&cart(), &request(method), &pricing(), Utc::now())
    }

    fn assert_history_consistent(order: &Order) {
        assert!(!order.status_history.is_empty());
        for pair in order.status_history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert_eq!(order.status_history.last().unwrap().status, order.status);
    }

    #[test]
    fn checkout_applies_fee_and_tax() {
        let order = order(FulfillmentMethod::Delivery);
        assert_eq!(order.subtotal, 850);
        assert_eq!(order.delivery_fee, 499);
        assert_eq!(order.tax, 68);
        assert_eq!(order.total, 850 + 499 + 68);
        assert_eq!(order.customer_email, "ada@example.com");
        assert!(order.pickup_details.is_none());
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.order_number.len(), "ORD-YYYYMMDD-XXXXXX".len());
        assert_history_consistent(&order);
    }

    #[test]
    fn pickup_and_large_orders_ship_free() {
        let rules = pricing();
        assert_eq!(rules.delivery_fee(FulfillmentMethod::Pickup, 100), 0);
        assert_eq!(rules.delivery_fee(FulfillmentMethod::Delivery, 5_000), 0);
        assert_eq!(rules.delivery_fee(FulfillmentMethod::Delivery, 4_999), 499);
    }

    #[test]
    fn fulfillment_method_filters_transitions() {
        let mut pickup = order(FulfillmentMethod::Pickup);
        let mut delivery = order(FulfillmentMethod::Delivery);
        for o in [&mut pickup, &mut delivery] {
            o.apply_transition(OrderStatus::Confirmed, None, Utc::now()).unwrap();
            o.apply_transition(OrderStatus::Preparing, None, Utc::now()).unwrap();
        }
        assert_eq!(
            pickup.available_transitions(),
            vec![OrderStatus::ReadyForPickup, OrderStatus::Cancelled]
        );
        assert_eq!(
            delivery.available_transitions(),
            vec![OrderStatus::OutForDelivery, OrderStatus::Cancelled]
        );
    }

    #[test]
    fn transitions_never_offer_wrong_fulfillment_step() {
        for method in [FulfillmentMethod::Delivery, FulfillmentMethod::Pickup] {
            for status in OrderStatus::all() {
                let mut o = order(method);
                o.status = status;
                let available = o.available_transitions();
                if method == FulfillmentMethod::Pickup {
                    assert!(!available.contains(&OrderStatus::OutForDelivery));
                } else {
                    assert!(!available.contains(&OrderStatus::ReadyForPickup));
                }
            }
        }
    }

    #[test]
    fn pickup_order_cannot_go_out_for_delivery() {
        let mut o = order(FulfillmentMethod::Pickup);
        let before = o.clone();
        let err = o
            .apply_transition(OrderStatus::OutForDelivery, None, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::OutForDelivery
            }
        );
        assert_eq!(o, before);
    }

    #[test]
    fn completing_sets_completed_at_and_terminal_has_no_exits() {
        let mut o = order(FulfillmentMethod::Delivery);
        let t0 = Utc::now();
        o.apply_transition(OrderStatus::Confirmed, None, t0).unwrap();
        o.apply_transition(OrderStatus::Preparing, None, t0).unwrap();
        o.apply_transition(OrderStatus::OutForDelivery, None, t0).unwrap();
        assert!(o.completed_at.is_none());
        o.apply_transition(OrderStatus::Completed, Some("left at door".into()), t0)
            .unwrap();

        assert_eq!(o.completed_at, Some(o.status_history.last().unwrap().timestamp));
        assert!(o.available_transitions().is_empty());
        assert!(o
            .apply_transition(OrderStatus::Cancelled, None, t0)
            .is_err());
        assert_eq!(o.status_history.len(), 5);
        assert_history_consistent(&o);
    }

    #[test]
    fn history_stays_ordered_when_clock_goes_back() {
        let mut o = order(FulfillmentMethod::Pickup);
        let earlier = o.status_history[0].timestamp - Duration::minutes(5);
        o.apply_transition(OrderStatus::Cancelled, None, earlier).unwrap();
        assert_history_consistent(&o);
        assert!(o.completed_at.is_none());
    }

    #[test]
    fn checkout_request_requires_details_for_method() {
        let mut req = request(FulfillmentMethod::Delivery);
        assert!(req.validate().is_ok());
        req.delivery_details = None;
        assert!(req.validate().is_err());

        let mut req = request(FulfillmentMethod::Pickup);
        req.pickup_details = None;
        assert!(req.validate().is_err());

        let mut req = request(FulfillmentMethod::Pickup);
        req.customer_email = "nope".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn status_codes_round_trip_wire_names() {
        assert_eq!(OrderStatus::from_code("out_for_delivery"), Some(OrderStatus::OutForDelivery));
        assert_eq!(
            serde_json::to_string(&OrderStatus::ReadyForPickup).unwrap(),
            "\"ready_for_pickup\""
        );
        assert_eq!(OrderStatus::from_code("shipped"), None);
    }
}
