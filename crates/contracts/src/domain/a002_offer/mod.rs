pub mod aggregate;

pub use aggregate::{Offer, OfferDto, OfferId, OfferProduct, OfferProductInput, OfferStatus};
