pub mod config;
pub mod database;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
