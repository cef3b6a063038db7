//! API layer - HTTP endpoint handlers.

mod connection;
mod health;
mod metrics;
mod routes;

pub use connection::{get_connection, list_connections, ConnectionListResponse};
pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
