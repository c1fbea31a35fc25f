//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunables for the screen-reader engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Process-wide deadline for every accessibility round-trip, in seconds.
    pub element_timeout_secs: f32,

    /// Second lock-key press within this window toggles the lock state.
    pub double_tap_window_ms: u64,

    /// Where element dumps are written.
    pub dump_dir: PathBuf,

    /// Start with browse mode (sticky capture) enabled.
    pub browse_mode_at_startup: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            element_timeout_secs: 5.0,
            double_tap_window_ms: 250,
            dump_dir: default_dump_dir(),
            browse_mode_at_startup: false,
        }
    }
}

/// The user's download directory, falling back to the working directory.
pub fn default_dump_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.element_timeout_secs, 5.0);
        assert_eq!(config.double_tap_window_ms, 250);
        assert!(!config.browse_mode_at_startup);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.double_tap_window_ms, config.double_tap_window_ms);
        assert_eq!(back.dump_dir, config.dump_dir);
    }
}
