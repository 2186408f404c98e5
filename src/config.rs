//! Application configuration constants.
//!
//! This module centralizes all configurable values so the coordinator,
//! policy, and API client never hardcode them inline.

use serde::Deserialize;

// ==================== Backend Configuration ====================

/// Configuration file structure for config.toml
#[derive(Debug, Deserialize)]
struct AppConfig {
    backend: Option<BackendConfig>,
}

#[derive(Debug, Deserialize)]
struct BackendConfig {
    base_url: Option<String>,
}

/// Load backend base URL with priority: config.toml > .env > default
pub fn load_backend_base_url() -> String {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Priority 1: config.toml
    if let Ok(contents) = std::fs::read_to_string("config.toml") {
        if let Ok(config) = toml::from_str::<AppConfig>(&contents) {
            if let Some(backend) = config.backend {
                if let Some(url) = backend.base_url {
                    tracing::info!("Using backend from config.toml: {}", url);
                    return url;
                }
            }
        }
    }

    // Priority 2: .env CLOVE_API_BASE_URL
    if let Ok(url) = std::env::var("CLOVE_API_BASE_URL") {
        tracing::info!("Using backend from CLOVE_API_BASE_URL env: {}", url);
        return url;
    }

    // Default
    let default = "http://localhost:8000/api".to_string();
    tracing::info!("Using default backend base URL: {}", default);
    default
}

// ==================== Take Configuration ====================

/// Number of challenges in one take (a single visit to a subtopic's
/// challenge flow)
pub const CHALLENGES_PER_TAKE: u32 = 5;

/// Fallback timer duration in seconds when a challenge carries none
pub const DEFAULT_TIMER_DURATION_SECS: u32 = 300;

/// Fallback point value when a challenge carries none
pub const DEFAULT_CHALLENGE_POINTS: u32 = 10;

// ==================== Adaptive Policy Configuration ====================

/// How many recent attempts the adaptive policy inspects
pub const ADAPTIVE_HISTORY_WINDOW: u32 = 2;

/// Trailing streak length that flips a feature flag
pub const ADAPTIVE_STREAK_THRESHOLD: u32 = 2;

// ==================== Timer Configuration ====================

/// Tick granularity of the countdown clock in milliseconds
pub const TIMER_TICK_MILLIS: u64 = 1000;

// ==================== Submission Configuration ====================

/// Warning shown by the browser-level unload hook while a challenge is in
/// flight. Fire-and-forget; no network call may accompany it.
pub const UNLOAD_WARNING: &str = "If you leave now, this challenge will be counted as wrong.";
