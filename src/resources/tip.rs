//! Disposable pipette tips.

use serde::{Deserialize, Serialize};

/// A pipette tip.
///
/// Tips are not nodes in the resource tree. They live inside tip trackers:
/// a [`TipSpot`](super::ResourceKind::TipSpot) hands out copies of its
/// prototype, channels hold whatever they picked up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    /// Identity of this tip, usually derived from the spot it was made in
    pub name: String,
    /// Whether the tip has an aerosol filter
    pub has_filter: bool,
    /// Overall length in mm
    pub total_tip_length: f64,
    /// Capacity in uL
    pub maximal_volume: f64,
    /// Length that goes onto the channel, in mm
    pub fitting_depth: f64,
    /// Liquid in the tip, in uL. Channels keep the live value in their
    /// volume tracker; the tip carries it while sitting in a spot.
    #[serde(default)]
    pub liquid_volume: f64,
}

impl Tip {
    /// An empty tip.
    pub fn new(
        name: impl Into<String>,
        has_filter: bool,
        total_tip_length: f64,
        maximal_volume: f64,
        fitting_depth: f64,
    ) -> Self {
        Self {
            name: name.into(),
            has_filter,
            total_tip_length,
            maximal_volume,
            fitting_depth,
            liquid_volume: 0.0,
        }
    }

    /// Same tip geometry under a different name, empty.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            liquid_volume: 0.0,
            ..self.clone()
        }
    }

    /// This tip holding `volume` uL.
    pub fn with_liquid(&self, volume: f64) -> Self {
        Self {
            liquid_volume: volume,
            ..self.clone()
        }
    }
}
