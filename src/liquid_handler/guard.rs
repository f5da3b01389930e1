//! Scoped disabling of every tracker.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::{LiquidHandler, TrackerRef};

/// Disables every tracker reachable from a handler while alive.
///
/// Created by [`LiquidHandler::without_tracking`]. Dereferences to the
/// handler. Trackers that appear inside the scope (tips mounted, resources
/// assigned) start disabled as well.
///
/// On drop, each tracker gets back the override it had on entry, including
/// when the scope is left through `?` or a panic. Trackers that no longer
/// exist are skipped; trackers created inside the scope lose their override.
pub struct TrackingGuard<'a> {
    handler: &'a mut LiquidHandler,
    saved: Vec<(TrackerRef, Option<bool>)>,
    was_suspended: bool,
}

impl LiquidHandler {
    /// Disable tracking until the returned guard is dropped.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use liquid_handling::backend::SimulatorBackend;
    /// # use liquid_handling::config::EngineConfig;
    /// # use liquid_handling::liquid_handler::LiquidHandler;
    /// # use liquid_handling::resources::Resource;
    /// let mut lh = LiquidHandler::new(
    ///     Arc::new(SimulatorBackend::new(8)),
    ///     Resource::deck("deck", 1000.0, 600.0, 500.0),
    ///     Arc::new(EngineConfig::tracking()),
    /// )?;
    /// {
    ///     let guard = lh.without_tracking();
    ///     assert_eq!(guard.num_channels(), 8);
    /// }
    /// # Ok::<(), liquid_handling::error::LhError>(())
    /// ```
    pub fn without_tracking(&mut self) -> TrackingGuard<'_> {
        let mut saved = Vec::new();
        for tracker in self.tracker_refs() {
            if let Ok(t) = self.tracker_mut(tracker) {
                saved.push((tracker, t.enabled_override()));
                t.set_enabled_override(Some(false));
            }
        }
        let was_suspended = self.tree.set_tracking_suspended(true);
        debug!(trackers = saved.len(), "Tracking disabled");
        TrackingGuard {
            handler: self,
            saved,
            was_suspended,
        }
    }

    /// Run `f` with tracking disabled.
    pub fn with_tracking_disabled<R>(&mut self, f: impl FnOnce(&mut LiquidHandler) -> R) -> R {
        let mut guard = self.without_tracking();
        f(&mut guard)
    }
}

impl Deref for TrackingGuard<'_> {
    type Target = LiquidHandler;

    fn deref(&self) -> &LiquidHandler {
        self.handler
    }
}

impl DerefMut for TrackingGuard<'_> {
    fn deref_mut(&mut self) -> &mut LiquidHandler {
        self.handler
    }
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        let known: HashSet<TrackerRef> = self.saved.iter().map(|(t, _)| *t).collect();
        // An enclosing scope keeps new trackers disabled.
        let fresh = if self.was_suspended { Some(false) } else { None };
        let mut created = 0;
        for tracker in self.handler.tracker_refs() {
            if known.contains(&tracker) {
                continue;
            }
            if let Ok(t) = self.handler.tracker_mut(tracker) {
                t.set_enabled_override(fresh);
                created += 1;
            }
        }

        let count = self.saved.len();
        for (tracker, previous) in self.saved.drain(..) {
            if let Ok(t) = self.handler.tracker_mut(tracker) {
                t.set_enabled_override(previous);
            }
        }
        self.handler.tree.set_tracking_suspended(self.was_suspended);
        debug!(trackers = count, created, "Tracking restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatorBackend;
    use crate::config::EngineConfig;
    use crate::coordinate::Coordinate;
    use crate::resources::Resource;
    use crate::tracking::Tracker;
    use std::sync::Arc;

    fn handler() -> LiquidHandler {
        let mut lh = LiquidHandler::new(
            Arc::new(SimulatorBackend::new(2)),
            Resource::deck("deck", 1000.0, 600.0, 500.0),
            Arc::new(EngineConfig::tracking()),
        )
        .unwrap();
        let deck = lh.deck();
        lh.tree_mut()
            .assign_child(
                deck,
                Resource::trough("trough", 19.0, 90.0, 40.0, 25000.0),
                Coordinate::ZERO,
                false,
            )
            .unwrap();
        lh
    }

    #[test]
    fn test_guard_disables_and_restores() {
        let mut lh = handler();
        let trough = lh.tree().get("trough").unwrap();
        lh.tree_mut()
            .volume_tracker_mut(trough)
            .unwrap()
            .set_enabled_override(Some(true));
        {
            let guard = lh.without_tracking();
            let config = guard.config().clone();
            assert!(!guard.tree().volume_tracker(trough).unwrap().is_enabled(&config));
            assert!(!guard.head().channel(1).unwrap().tip_tracker().is_enabled(&config));
        }
        assert_eq!(
            lh.tree().volume_tracker(trough).unwrap().enabled_override(),
            Some(true)
        );
        assert_eq!(
            lh.head().channel(1).unwrap().tip_tracker().enabled_override(),
            None
        );
    }

    #[test]
    fn test_closure_variant_restores() {
        let mut lh = handler();
        let trough = lh.tree().get("trough").unwrap();
        let seen = lh.with_tracking_disabled(|lh| {
            lh.tree().volume_tracker(trough).unwrap().enabled_override()
        });
        assert_eq!(seen, Some(false));
        assert_eq!(lh.tree().volume_tracker(trough).unwrap().enabled_override(), None);
    }

    #[test]
    fn test_removed_resources_are_skipped() {
        let mut lh = handler();
        let trough = lh.tree().get("trough").unwrap();
        let detached = {
            let mut guard = lh.without_tracking();
            guard.tree_mut().unassign_child(trough).unwrap()
        };
        assert_eq!(detached.name(), "trough");
        assert!(!lh.tree().contains("trough"));
    }
}
