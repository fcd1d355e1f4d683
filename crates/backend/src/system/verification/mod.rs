pub mod service;
pub mod sms;
