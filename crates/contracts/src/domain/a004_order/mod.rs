pub mod aggregate;

pub use aggregate::{
    CheckoutRequest, DeliveryDetails, FulfillmentMethod, Order, OrderId, OrderListFilter,
    OrderStatus, PickupDetails, PricingRules, SetInvoiceRequest, StatusHistoryEntry,
    TransitionError, TransitionsResponse, UpdateStatusRequest,
};
