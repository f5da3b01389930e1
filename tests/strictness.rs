//! Protocol legality under STRICT, WARN and IGNORE.

mod common;

use common::{handler_with, spot};
use liquid_handling::backend::SimulatorBackend;
use liquid_handling::{
    BackendParams, ChannelBatch, EngineConfig, ErrorCategory, LhError, LiquidHandler, Strictness,
    TipTarget,
};
use std::sync::Arc;

fn params(keys: &[&str]) -> BackendParams {
    keys.iter()
        .map(|k| (k.to_string(), serde_json::json!(1)))
        .collect()
}

fn three_tips(lh: &LiquidHandler) -> ChannelBatch<TipTarget> {
    let targets = ["A1", "A2", "A3"]
        .iter()
        .map(|a| TipTarget::new(spot(lh, a)))
        .collect();
    ChannelBatch::sequential(8, targets).unwrap()
}

async fn limited(strictness: Strictness) -> (SimulatorBackend, LiquidHandler) {
    let sim = SimulatorBackend::new(8)
        .with_max_channels_per_command(2)
        .with_supported_params(&["speed"]);
    let config = EngineConfig::tracking();
    config.set_strictness(strictness);
    let lh = handler_with(sim.clone(), config).await;
    (sim, lh)
}

#[tokio::test]
async fn test_strict_rejects_before_any_commit() {
    let (sim, mut lh) = limited(Strictness::Strict).await;
    let targets = three_tips(&lh);

    let err = lh.pick_up_tips(&targets, &BackendParams::new()).await.unwrap_err();

    assert!(matches!(err, LhError::Legality { operation: "pick_up_tips", .. }));
    assert_eq!(err.category(), ErrorCategory::ProtocolLegality);
    assert!(lh.head_state().iter().all(Option::is_none));
    assert!(lh.tree().tip_tracker(spot(&lh, "A1")).unwrap().has_tip());
    assert!(sim.executed().is_empty());
}

#[tokio::test]
async fn test_strict_rejects_unsupported_params() {
    let (_, mut lh) = limited(Strictness::Strict).await;
    let targets = ChannelBatch::new(8).with(0, TipTarget::new(spot(&lh, "A1"))).unwrap();
    assert!(lh.pick_up_tips(&targets, &params(&["speed"])).await.is_ok());

    let targets = ChannelBatch::new(8).with(1, TipTarget::new(spot(&lh, "A2"))).unwrap();
    let err = lh
        .pick_up_tips(&targets, &params(&["speed", "swirl"]))
        .await
        .unwrap_err();
    assert!(matches!(err, LhError::Legality { ref message, .. } if message.contains("swirl")));
}

#[tokio::test]
async fn test_warn_proceeds() {
    let (sim, mut lh) = limited(Strictness::Warn).await;
    let targets = three_tips(&lh);
    lh.pick_up_tips(&targets, &BackendParams::new()).await.unwrap();
    assert_eq!(lh.head().channels_with_tips(), vec![0, 1, 2]);
    assert_eq!(sim.executed().len(), 1);
}

#[tokio::test]
async fn test_ignore_proceeds() {
    let (sim, mut lh) = limited(Strictness::Ignore).await;
    let targets = three_tips(&lh);
    lh.pick_up_tips(&targets, &params(&["swirl"])).await.unwrap();
    assert_eq!(sim.executed().len(), 1);
}

#[tokio::test]
async fn test_strictness_is_read_fresh() {
    let (_, mut lh) = limited(Strictness::Ignore).await;
    let config = Arc::clone(lh.config());
    config.set_strictness(Strictness::Strict);
    let targets = three_tips(&lh);
    assert!(lh.pick_up_tips(&targets, &BackendParams::new()).await.is_err());
}

#[tokio::test]
async fn test_operations_before_setup() {
    let config = EngineConfig::tracking();
    config.set_strictness(Strictness::Strict);
    let mut lh = LiquidHandler::new(
        Arc::new(SimulatorBackend::new(8)),
        common::deck(),
        Arc::new(config),
    )
    .unwrap();
    let targets = ChannelBatch::new(8).with(0, TipTarget::new(spot(&lh, "A1"))).unwrap();
    let err = lh.pick_up_tips(&targets, &BackendParams::new()).await.unwrap_err();
    assert!(matches!(err, LhError::Legality { ref message, .. } if message.contains("set up")));

    lh.setup().await.unwrap();
    lh.pick_up_tips(&targets, &BackendParams::new()).await.unwrap();
}
