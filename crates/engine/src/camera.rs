use std::sync::Arc;
use std::time::Duration;

use propmap_shared::models::Coordinates;
use propmap_shared::viewport::{camera_offset, Viewport};

use crate::config::EngineConfig;
use crate::surface::{CameraTarget, RenderSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightOutcome {
    Completed,
    /// A newer selection took over while the camera was moving.
    Superseded,
}

/// Why a panel-resize recenter was not animated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecenterSkip {
    /// An entity flight is still running.
    InFlight,
    /// Another recenter ran within the debounce window.
    Debounced,
}

/// Timing guard for recenter animations: the time of the last recenter and
/// the generation of the entity flight in progress, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecenterGate {
    last_recenter_ms: Option<i64>,
    flight: Option<u64>,
}

impl RecenterGate {
    pub fn begin_flight(&mut self, generation: u64) {
        self.flight = Some(generation);
    }

    /// Only the flight that began last can clear the flag.
    pub fn end_flight(&mut self, generation: u64) {
        if self.flight == Some(generation) {
            self.flight = None;
        }
    }

    pub fn in_flight(&self) -> bool {
        self.flight.is_some()
    }

    /// Claim the right to animate a recenter at `now_ms`.
    pub fn try_recenter(&mut self, now_ms: i64, debounce_ms: i64) -> Result<(), RecenterSkip> {
        if self.flight.is_some() {
            return Err(RecenterSkip::InFlight);
        }
        if let Some(last) = self.last_recenter_ms {
            if now_ms - last < debounce_ms {
                return Err(RecenterSkip::Debounced);
            }
        }
        self.last_recenter_ms = Some(now_ms);
        Ok(())
    }
}

/// Sequences camera moves as awaited phases: each phase starts only after
/// the surface reports the previous one finished.
pub struct CameraSequencer<S> {
    surface: Arc<S>,
    config: EngineConfig,
}

impl<S: RenderSurface> CameraSequencer<S> {
    pub fn new(surface: Arc<S>, config: EngineConfig) -> Self {
        CameraSequencer { surface, config }
    }

    /// Phase one: centre on the entity in the visible area, keeping the zoom.
    pub fn center_target(&self, coordinates: Coordinates, viewport: &Viewport) -> CameraTarget {
        CameraTarget {
            center: coordinates,
            zoom: self.surface.zoom(),
            offset: camera_offset(viewport, self.config.overlay_height_px),
            duration_ms: self.config.center_duration_ms,
        }
    }

    /// Phase two: zoom in to the detail level, same centre and offset.
    pub fn zoom_target(&self, coordinates: Coordinates, viewport: &Viewport) -> CameraTarget {
        CameraTarget {
            center: coordinates,
            zoom: self.config.detail_zoom,
            offset: camera_offset(viewport, self.config.overlay_height_px),
            duration_ms: self.config.zoom_duration_ms,
        }
    }

    /// Centre, then zoom, then wait for the surface to settle. `still_current`
    /// is checked between phases; a stale flight stops before the next phase.
    pub async fn fly_to_entity(
        &self,
        coordinates: Coordinates,
        viewport: &Viewport,
        still_current: impl Fn() -> bool,
    ) -> FlightOutcome {
        self.surface.fly_to(self.center_target(coordinates, viewport)).await;
        if !still_current() {
            return FlightOutcome::Superseded;
        }

        self.surface.fly_to(self.zoom_target(coordinates, viewport)).await;
        if !still_current() {
            return FlightOutcome::Superseded;
        }

        tokio::time::sleep(Duration::from_millis(self.config.overlay_settle_ms)).await;
        if !still_current() {
            return FlightOutcome::Superseded;
        }
        FlightOutcome::Completed
    }

    /// Single short move that re-centres the selection after the visible area
    /// changed. Zoom is left alone.
    pub async fn recenter(&self, coordinates: Coordinates, viewport: &Viewport) {
        let target = CameraTarget {
            duration_ms: self.config.recenter_duration_ms,
            ..self.center_target(coordinates, viewport)
        };
        self.surface.fly_to(target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSurface;
    use propmap_shared::viewport::{PixelOffset, ScreenSize};

    fn sequencer() -> (CameraSequencer<FakeSurface>, Arc<FakeSurface>) {
        let surface = Arc::new(FakeSurface::new(true));
        (CameraSequencer::new(surface.clone(), EngineConfig::default()), surface)
    }

    fn viewport(side_panel: f64) -> Viewport {
        Viewport::new(
            ScreenSize {
                width: 1200.0,
                height: 800.0,
            },
            side_panel,
            0.0,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_phase_flight_in_order() {
        let (camera, surface) = sequencer();
        let at = Coordinates::new(51.45, -2.59);
        let start = tokio::time::Instant::now();
        let outcome = camera.fly_to_entity(at, &viewport(0.0), || true).await;
        assert_eq!(outcome, FlightOutcome::Completed);
        assert_eq!(start.elapsed(), Duration::from_millis(600 + 1_200 + 50));

        let flights = surface.fly_to_calls();
        assert_eq!(flights.len(), 2);
        assert_eq!(flights[0].zoom, 12.0);
        assert_eq!(flights[0].duration_ms, 600);
        assert_eq!(flights[1].zoom, 16.0);
        assert_eq!(flights[1].duration_ms, 1_200);
        assert_eq!(flights[0].offset, PixelOffset { x: 0.0, y: 90.0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_centres_in_visible_area() {
        let (camera, _) = sequencer();
        let target = camera.center_target(Coordinates::new(0.0, 0.0), &viewport(400.0));
        assert_eq!(target.offset, PixelOffset { x: 200.0, y: 90.0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_flight_skips_zoom_phase() {
        let (camera, surface) = sequencer();
        let outcome = camera
            .fly_to_entity(Coordinates::new(1.0, 1.0), &viewport(0.0), || false)
            .await;
        assert_eq!(outcome, FlightOutcome::Superseded);
        assert_eq!(surface.fly_to_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recenter_is_single_short_phase() {
        let (camera, surface) = sequencer();
        camera.recenter(Coordinates::new(1.0, 1.0), &viewport(400.0)).await;
        let flights = surface.fly_to_calls();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].duration_ms, 300);
        assert_eq!(flights[0].zoom, 12.0);
        assert_eq!(flights[0].offset.x, 200.0);
    }

    #[test]
    fn test_gate_debounces() {
        let mut gate = RecenterGate::default();
        assert_eq!(gate.try_recenter(1_000, 500), Ok(()));
        assert_eq!(gate.try_recenter(1_400, 500), Err(RecenterSkip::Debounced));
        assert_eq!(gate.try_recenter(1_500, 500), Ok(()));
    }

    #[test]
    fn test_gate_blocks_during_flight() {
        let mut gate = RecenterGate::default();
        gate.begin_flight(1);
        assert_eq!(gate.try_recenter(0, 500), Err(RecenterSkip::InFlight));
        gate.begin_flight(2);
        gate.end_flight(1);
        assert!(gate.in_flight());
        gate.end_flight(2);
        assert_eq!(gate.try_recenter(0, 500), Ok(()));
    }
}
