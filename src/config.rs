use serde::Deserialize;

// ==================== Constants ====================
pub const DEFAULT_ELEMENT_ID: &str = "canvas";
pub const DEFAULT_LOGICAL_WIDTH: u32 = 640;
pub const DEFAULT_LOGICAL_HEIGHT: u32 = 480;
/// milliseconds waited between ticks when the caller doesn't say
pub const DEFAULT_TICK_INTERVAL_MS: u32 = 30;

/// Startup settings for an Eidolon instance
/// - every field is optional when decoded, missing ones fall back to defaults
/// - `logical_*` is the game resolution; the canvas element keeps its own
///   size and the difference becomes the composite scale
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EidolonConfig {
    pub element_id: String,
    pub logical_width: u32,
    pub logical_height: u32,
    pub tick_interval_ms: u32,
    pub log_level: String,
}

impl Default for EidolonConfig {
    fn default() -> Self {
        Self {
            element_id: DEFAULT_ELEMENT_ID.to_string(),
            logical_width: DEFAULT_LOGICAL_WIDTH,
            logical_height: DEFAULT_LOGICAL_HEIGHT,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            log_level: "info".to_string(),
        }
    }
}

impl EidolonConfig {
    /// Unknown level names fall back to `Info` rather than failing startup.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info)
    }
}
