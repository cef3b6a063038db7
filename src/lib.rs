// Ambient infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Core: connection registry and broadcast fan-out
pub mod broadcast;
pub mod connection_manager;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
