pub mod aggregate;

pub use aggregate::{
    AddOfferRequest, AddProductRequest, Cart, CartOfferItem, CartProductItem,
    UpdateQuantityRequest,
};
