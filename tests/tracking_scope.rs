//! Disabling trackers: scoped guard, instance overrides and config defaults.

mod common;

use common::{handler, handler_with, spot, well};
use liquid_handling::backend::SimulatorBackend;
use liquid_handling::tracking::Tracker;
use liquid_handling::{
    BackendParams, ChannelBatch, Coordinate, EngineConfig, LhError, LhResult, LiquidHandler,
    LiquidTarget, Resource, ResourceId, TipTarget,
};

fn one(channel: usize, target: ResourceId) -> ChannelBatch<TipTarget> {
    ChannelBatch::new(8).with(channel, TipTarget::new(target)).unwrap()
}

#[tokio::test]
async fn test_disabled_scope_allows_double_pickup() {
    let mut lh = handler().await;
    let params = BackendParams::new();
    let (a1, a2) = (spot(&lh, "A1"), spot(&lh, "A2"));
    {
        let mut guard = lh.without_tracking();
        guard.pick_up_tips(&one(0, a1), &params).await.unwrap();
        guard.pick_up_tips(&one(0, a2), &params).await.unwrap();
    }

    // Occupancy followed the operations, history did not.
    assert!(!lh.tree().tip_tracker(a1).unwrap().has_tip());
    assert!(lh.tree().tip_tracker(a1).unwrap().history().is_empty());
    let channel = lh.head().channel(0).unwrap();
    assert_eq!(channel.tip().map(|t| t.name.as_str()), Some("tips_A2_tip"));
    assert!(channel.tip_tracker().history().is_empty());

    // Restored: tracking is back on.
    assert_eq!(lh.tree().tip_tracker(a1).unwrap().enabled_override(), None);
    assert_eq!(channel.tip_tracker().enabled_override(), None);
    let a3 = spot(&lh, "A3");
    let err = lh.pick_up_tips(&one(0, a3), &params).await.unwrap_err();
    assert!(matches!(err, LhError::ChannelHasTip(_)));
}

async fn fails_inside_scope(lh: &mut LiquidHandler) -> LhResult<()> {
    let mut guard = lh.without_tracking();
    let plate = guard.tree().get("plate")?;
    guard.pick_up_tips(&one(0, plate), &BackendParams::new()).await?;
    Ok(())
}

#[tokio::test]
async fn test_scope_restores_on_error() {
    let mut lh = handler().await;
    let a1 = spot(&lh, "A1");
    lh.tree_mut()
        .tip_tracker_mut(a1)
        .unwrap()
        .set_enabled_override(Some(true));

    let err = fails_inside_scope(&mut lh).await.unwrap_err();

    assert!(matches!(err, LhError::WrongResourceKind { .. }));
    assert_eq!(lh.tree().tip_tracker(a1).unwrap().enabled_override(), Some(true));
    assert_eq!(lh.head().channel(0).unwrap().tip_tracker().enabled_override(), None);
}

#[tokio::test]
async fn test_instance_override_beats_config_default() {
    // Config default off, one spot forced on.
    let mut lh = handler_with(SimulatorBackend::new(8), EngineConfig::default()).await;
    let params = BackendParams::new();
    let (a1, a2) = (spot(&lh, "A1"), spot(&lh, "A2"));
    lh.tree_mut()
        .tip_tracker_mut(a1)
        .unwrap()
        .set_enabled_override(Some(true));

    lh.pick_up_tips(&one(0, a1), &params).await.unwrap();
    assert_eq!(lh.tree().tip_tracker(a1).unwrap().history().len(), 1);

    // Channel 0 is untracked, so a second pickup is allowed.
    lh.pick_up_tips(&one(0, a2), &params).await.unwrap();
    assert!(lh.tree().tip_tracker(a2).unwrap().history().is_empty());

    // A1 is tracked and empty.
    let err = lh.pick_up_tips(&one(1, a1), &params).await.unwrap_err();
    assert!(matches!(err, LhError::TipSpotHasNoTip(_)));
}

#[tokio::test]
async fn test_config_is_read_at_call_time() {
    let mut lh = handler_with(SimulatorBackend::new(8), EngineConfig::default()).await;
    let params = BackendParams::new();
    let (a1, a2) = (spot(&lh, "A1"), spot(&lh, "A2"));
    lh.pick_up_tips(&one(0, a1), &params).await.unwrap();

    lh.config().set_tip_tracking(true);
    let err = lh.pick_up_tips(&one(0, a2), &params).await.unwrap_err();
    assert!(matches!(err, LhError::ChannelHasTip(_)));
}

#[tokio::test]
async fn test_closure_variant() {
    let mut lh = handler().await;
    let a1 = spot(&lh, "A1");
    let config = lh.config().clone();
    lh.with_tracking_disabled(|lh| {
        let tracker = lh.tree_mut().tip_tracker_mut(a1).unwrap();
        let tip = tracker.tip().cloned().unwrap();
        tracker.pick_up(&tip, None, &config).unwrap();
        tracker.pick_up(&tip, None, &config).unwrap();
    });
    let tracker = lh.tree().tip_tracker(a1).unwrap();
    assert!(!tracker.has_tip());
    assert!(tracker.history().is_empty());
    assert!(tracker.is_enabled(&config));
}

fn liquid(channel: usize, target: ResourceId, volume: f64) -> ChannelBatch<LiquidTarget> {
    ChannelBatch::new(8)
        .with(channel, LiquidTarget::new(target, volume))
        .unwrap()
}

#[tokio::test]
async fn test_tip_mounted_in_scope_is_permissive() {
    let mut lh = handler().await;
    let params = BackendParams::new();
    let (a1, w1) = (spot(&lh, "A1"), well(&lh, "A1"));
    {
        let mut guard = lh.without_tracking();
        guard.pick_up_tips(&one(0, a1), &params).await.unwrap();
        // Empty tip dispenses, then takes up more than it holds.
        guard.dispense(&liquid(0, w1, 100.0), &params).await.unwrap();
        guard.aspirate(&liquid(0, w1, 500.0), &params).await.unwrap();

        let tip = guard.head().channel(0).unwrap().volume_tracker().unwrap();
        assert_eq!(tip.enabled_override(), Some(false));
        assert_eq!(tip.get_used_volume(), 400.0);
        assert!(tip.history().is_empty());
        assert!(guard.tree().volume_tracker(w1).unwrap().history().is_empty());
    }

    // The tip's tracker follows the config default again.
    let tip = lh.head().channel(0).unwrap().volume_tracker().unwrap();
    assert_eq!(tip.enabled_override(), None);
    let err = lh.aspirate(&liquid(0, w1, 10.0), &params).await.unwrap_err();
    assert!(matches!(err, LhError::WellTooLittleLiquid { .. }));
}

#[tokio::test]
async fn test_resource_assigned_in_scope_is_permissive() {
    let mut lh = handler().await;
    let params = BackendParams::new();
    let a1 = spot(&lh, "A1");
    lh.pick_up_tips(&one(0, a1), &params).await.unwrap();
    let deck = lh.deck();
    let trough = {
        let mut guard = lh.without_tracking();
        let trough = guard
            .tree_mut()
            .assign_child(
                deck,
                Resource::trough("trough2", 19.0, 90.0, 40.0, 25000.0),
                Coordinate::new(600.0, 100.0, 0.0),
                false,
            )
            .unwrap();
        guard.aspirate(&liquid(0, trough, 50.0), &params).await.unwrap();
        assert!(guard.tree().volume_tracker(trough).unwrap().history().is_empty());
        trough
    };

    assert!(!lh.tree().tracking_suspended());
    let tracker = lh.tree().volume_tracker(trough).unwrap();
    assert_eq!(tracker.enabled_override(), None);
    assert!(tracker.is_enabled(lh.config()));
}

#[tokio::test]
async fn test_nested_scope_keeps_new_trackers_disabled() {
    let mut lh = handler().await;
    let params = BackendParams::new();
    let a1 = spot(&lh, "A1");
    let mut outer = lh.without_tracking();
    {
        let mut inner = outer.without_tracking();
        inner.pick_up_tips(&one(0, a1), &params).await.unwrap();
    }
    assert!(outer.tree().tracking_suspended());
    let tip = outer.head().channel(0).unwrap().volume_tracker().unwrap();
    assert_eq!(tip.enabled_override(), Some(false));
    drop(outer);

    let tip = lh.head().channel(0).unwrap().volume_tracker().unwrap();
    assert_eq!(tip.enabled_override(), None);
    assert!(!lh.tree().tracking_suspended());
}
