pub mod bootstrap_service;

pub use bootstrap_service::*;
