pub mod auth;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod registry;
pub mod services;
pub mod state;
pub mod store;
pub mod types;
