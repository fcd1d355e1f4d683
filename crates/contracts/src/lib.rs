//! Wire types and domain rules shared by the grocery backend and its clients.

pub mod domain;
pub mod shared;
pub mod system;
