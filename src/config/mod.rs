mod settings;

pub use settings::{
    BroadcastConfig, OtelConfig, ServerConfig, Settings, ShutdownSettings, TelemetryConfig,
    WebSocketConfig,
};
