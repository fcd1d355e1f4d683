pub mod a001_product;
pub mod a002_offer;
pub mod a003_cart;
pub mod a004_order;
pub mod common;
