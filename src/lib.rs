pub mod api;
pub mod clients;
pub mod config;
pub mod errors;
pub mod models;
pub mod providers;
pub mod publisher;
pub mod utils;
pub mod worker;
