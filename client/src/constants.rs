pub const DEFAULT_WS_URL: &str = "ws://localhost:3005/ws";

/// Environment variable overriding the sync server endpoint
pub const SERVER_URL_ENV: &str = "LOCKSTEP_SERVER_URL";

/// Current application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
