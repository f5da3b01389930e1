//! Shared deck setup for integration tests.
#![allow(dead_code)]

use liquid_handling::backend::SimulatorBackend;
use liquid_handling::resources::GridLayout;
use liquid_handling::{Coordinate, EngineConfig, LiquidHandler, Resource, ResourceId, Tip};
use std::sync::Arc;

pub fn tip() -> Tip {
    Tip::new("standard", false, 59.9, 300.0, 8.0)
}

/// Deck with a full 96 tip rack, a 96 plate, a trough and a trash.
pub fn deck() -> Resource {
    Resource::deck("deck", 1360.0, 653.5, 900.0)
        .with_child(
            Resource::tip_rack("tips", 122.4, 82.6, 20.0, GridLayout::standard_96(), tip(), true),
            Coordinate::new(100.0, 100.0, 0.0),
        )
        .with_child(
            Resource::plate("plate", 127.0, 85.0, 14.0, GridLayout::standard_96(), 300.0),
            Coordinate::new(300.0, 100.0, 0.0),
        )
        .with_child(
            Resource::trough("trough", 19.0, 90.0, 40.0, 25000.0),
            Coordinate::new(500.0, 100.0, 0.0),
        )
        .with_child(
            Resource::trash("trash", 80.0, 120.0, 10.0),
            Coordinate::new(800.0, 100.0, 0.0),
        )
}

pub async fn handler_with(sim: SimulatorBackend, config: EngineConfig) -> LiquidHandler {
    let mut lh = LiquidHandler::new(Arc::new(sim), deck(), Arc::new(config)).unwrap();
    lh.setup().await.unwrap();
    lh
}

/// Eight channels, a 96 head, tracking on.
pub async fn handler() -> LiquidHandler {
    handler_with(SimulatorBackend::new(8).with_head96(), EngineConfig::tracking()).await
}

pub fn spot(lh: &LiquidHandler, address: &str) -> ResourceId {
    let rack = lh.tree().get("tips").unwrap();
    lh.tree().get_item(rack, address).unwrap()
}

pub fn well(lh: &LiquidHandler, address: &str) -> ResourceId {
    let plate = lh.tree().get("plate").unwrap();
    lh.tree().get_item(plate, address).unwrap()
}
