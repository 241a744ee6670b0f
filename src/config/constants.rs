// Project-wide constants
//
// Centralised here so port numbers and other magic values have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Default port for a node's request service.
pub const DEFAULT_NODE_PORT: u16 = 9000;

/// Default port for the directory service.
pub const DEFAULT_DIRECTORY_PORT: u16 = 8001;

/// Default bind host for both servers (all interfaces).
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Seconds between two announcements of the same node.
pub const DEFAULT_ANNOUNCE_INTERVAL_SECS: u64 = 1600;

/// Age after which a directory entry is no longer discoverable.
pub const DEFAULT_REGISTRY_TTL_SECS: u64 = 3600;

/// Number of api_key characters exposed as `SID` by `/discover`.
pub const SID_PREFIX_LEN: usize = 7;

/// Length of a directory API key (hex characters).
pub const API_KEY_LEN: usize = 64;

/// Echo service returning the caller's public IP as plain text.
pub const DEFAULT_PUBLIC_IP_URL: &str = "http://ip.42.pl/raw";

/// Default request body limit for `/predict` (volumes can be large).
pub const DEFAULT_MAX_BODY_MB: usize = 256;

/// `Access-Control-Max-Age` sent on every CORS response (42 minutes).
pub const CORS_MAX_AGE_SECS: u64 = 2520;
