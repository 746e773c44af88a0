pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod media;
pub mod models;
pub mod observability;
pub mod state;
pub mod store;
