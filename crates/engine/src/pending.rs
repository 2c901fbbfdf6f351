use propmap_shared::models::{Coordinates, EntityRef};

/// A request to select an entity, from a pin, the host or a deep link.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub target: EntityRef,
    /// Coordinates the caller already knows; used for an immediate placeholder.
    pub coordinates: Option<Coordinates>,
    /// Fly the camera there without showing an overlay.
    pub navigation_only: bool,
}

impl SelectRequest {
    pub fn id(id: impl Into<String>) -> Self {
        SelectRequest {
            target: EntityRef::Id(id.into()),
            coordinates: None,
            navigation_only: false,
        }
    }

    pub fn address(address: impl Into<String>) -> Self {
        SelectRequest {
            target: EntityRef::Address(address.into()),
            coordinates: None,
            navigation_only: false,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates).filter(Coordinates::is_valid);
        self
    }

    pub fn navigation_only(mut self) -> Self {
        self.navigation_only = true;
        self
    }
}

/// A select request deferred until the surface and data are ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSelection {
    pub request: SelectRequest,
    pub recorded_at_ms: i64,
}

/// Holds at most one deferred selection; a newer request replaces an older one.
#[derive(Debug, Default)]
pub struct PendingSlot {
    pending: Option<PendingSelection>,
}

impl PendingSlot {
    pub fn record(&mut self, request: SelectRequest, now_ms: i64) {
        if let Some(previous) = &self.pending {
            tracing::debug!(replaced = %previous.request.target, "replacing pending selection");
        }
        self.pending = Some(PendingSelection {
            request,
            recorded_at_ms: now_ms,
        });
    }

    /// Remove the pending selection for replay, unless it is older than `max_age_ms`.
    pub fn take(&mut self, now_ms: i64, max_age_ms: i64) -> Option<SelectRequest> {
        let pending = self.pending.take()?;
        if now_ms - pending.recorded_at_ms > max_age_ms {
            tracing::warn!(target_ref = %pending.request.target, "dropping stale pending selection");
            return None;
        }
        Some(pending.request)
    }

    pub fn peek(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let req = SelectRequest::id("42")
            .with_coordinates(Coordinates::new(51.45, -2.59))
            .navigation_only();
        assert_eq!(req.target, EntityRef::Id("42".to_string()));
        assert_eq!(req.coordinates, Some(Coordinates::new(51.45, -2.59)));
        assert!(req.navigation_only);
    }

    #[test]
    fn test_invalid_coordinates_are_dropped() {
        let req = SelectRequest::address("1 High St").with_coordinates(Coordinates::new(f64::NAN, 0.0));
        assert!(req.coordinates.is_none());
    }

    #[test]
    fn test_take_consumes_once() {
        let mut slot = PendingSlot::default();
        slot.record(SelectRequest::id("42"), 0);
        assert!(slot.peek().is_some());
        assert_eq!(slot.take(500, 10_000), Some(SelectRequest::id("42")));
        assert_eq!(slot.take(600, 10_000), None);
    }

    #[test]
    fn test_newer_request_replaces_older() {
        let mut slot = PendingSlot::default();
        slot.record(SelectRequest::id("1"), 0);
        slot.record(SelectRequest::id("2"), 10);
        assert_eq!(slot.take(20, 10_000), Some(SelectRequest::id("2")));
    }

    #[test]
    fn test_stale_request_is_dropped() {
        let mut slot = PendingSlot::default();
        slot.record(SelectRequest::id("1"), 0);
        assert_eq!(slot.take(10_001, 10_000), None);
        assert!(slot.peek().is_none());
    }
}
