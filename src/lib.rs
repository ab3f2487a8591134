// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Relay core
pub mod auth;
pub mod broadcast;
pub mod events;
pub mod hub;
pub mod store;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;
