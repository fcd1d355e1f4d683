pub mod middleware;
pub mod repository;
pub mod service;
