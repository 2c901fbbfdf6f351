use std::str::FromStr;
use std::time::Duration;

use propmap_shared::viewport::{MAX_OVERLAY_SCALE, MIN_OVERLAY_SCALE};
use serde::{Deserialize, Serialize};

/// Tunables for the engine. Defaults match the map view's observed timings;
/// a few can be overridden through the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of cached entity and document snapshots.
    pub entity_ttl_ms: i64,
    /// Surface readiness checks after the first one.
    pub surface_retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_step_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Cache polls while waiting for an explicitly named entity.
    pub lookup_attempts_by_id: u32,
    /// Cache polls while waiting for a free-text address match.
    pub lookup_attempts_by_address: u32,
    pub lookup_interval_ms: u64,
    /// Deferred selections older than this are dropped instead of replayed.
    pub pending_max_age_ms: i64,
    /// Outside clicks within this window after a marker or overlay click are ignored.
    pub click_guard_ms: i64,
    pub recenter_debounce_ms: i64,
    pub center_duration_ms: u64,
    pub zoom_duration_ms: u64,
    pub recenter_duration_ms: u64,
    /// Pause after the zoom phase before the overlay is mounted.
    pub overlay_settle_ms: u64,
    pub detail_zoom: f64,
    pub overlay_width_px: f64,
    pub overlay_height_px: f64,
    pub detail_panel_gap_px: f64,
    pub detail_panel_width_px: f64,
    pub detail_panel_height_px: f64,
    pub min_overlay_scale: f64,
    pub max_overlay_scale: f64,
    pub recent_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            entity_ttl_ms: 30 * 60 * 1000,
            surface_retry_attempts: 5,
            retry_initial_delay_ms: 50,
            retry_step_ms: 50,
            retry_max_delay_ms: 200,
            lookup_attempts_by_id: 20,
            lookup_attempts_by_address: 6,
            lookup_interval_ms: 100,
            pending_max_age_ms: 3_000,
            click_guard_ms: 150,
            recenter_debounce_ms: 500,
            center_duration_ms: 600,
            zoom_duration_ms: 1_200,
            recenter_duration_ms: 300,
            overlay_settle_ms: 50,
            detail_zoom: 16.0,
            overlay_width_px: 280.0,
            overlay_height_px: 180.0,
            detail_panel_gap_px: 12.0,
            detail_panel_width_px: 320.0,
            detail_panel_height_px: 240.0,
            min_overlay_scale: MIN_OVERLAY_SCALE,
            max_overlay_scale: MAX_OVERLAY_SCALE,
            recent_capacity: 8,
        }
    }
}

impl EngineConfig {
    /// Defaults with `PROPMAP_*` environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        EngineConfig {
            entity_ttl_ms: env_or("PROPMAP_ENTITY_TTL_MS", defaults.entity_ttl_ms),
            surface_retry_attempts: env_or("PROPMAP_SURFACE_RETRIES", defaults.surface_retry_attempts),
            detail_zoom: env_or("PROPMAP_DETAIL_ZOOM", defaults.detail_zoom),
            ..defaults
        }
    }

    /// Delay before readiness retry `attempt` (0-based): linear growth, capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let linear = self
            .retry_initial_delay_ms
            .saturating_add(self.retry_step_ms.saturating_mul(u64::from(attempt)));
        Duration::from_millis(linear.min(self.retry_max_delay_ms))
    }

    /// Worst-case time spent waiting for the surface before giving up.
    pub fn surface_retry_budget(&self) -> Duration {
        (0..self.surface_retry_attempts).map(|a| self.retry_delay(a)).sum()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
