//! Standard-form operations handed to backends.
//!
//! By the time an operation reaches this form, names are resolved, absolute
//! locations are computed and trackers have already committed. Backends only
//! translate these into their own command sets.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::resources::Tip;

/// One channel picking up or dropping a tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTip {
    /// Channel index
    pub channel: usize,
    /// Tip spot or trash
    pub resource_name: String,
    /// Absolute location of the resource
    pub location: Coordinate,
    /// Offset from `location`
    pub offset: Coordinate,
    /// Tip on the channel
    pub tip: Tip,
}

/// One channel aspirating or dispensing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLiquid {
    /// Channel index
    pub channel: usize,
    /// Container
    pub resource_name: String,
    /// Absolute location of the resource
    pub location: Coordinate,
    /// Offset from `location`
    pub offset: Coordinate,
    /// Tip on the channel
    pub tip: Tip,
    /// uL
    pub volume: f64,
    /// uL/s, backend default when absent
    pub flow_rate: Option<f64>,
    /// mm above the container bottom
    pub liquid_height: Option<f64>,
    /// uL
    pub blow_out_air_volume: Option<f64>,
}

/// The 96 head picking up or dropping a full rack of tips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadTips {
    /// Tip rack or trash
    pub resource_name: String,
    /// Absolute location of the first grid position (A1)
    pub location: Coordinate,
    /// Offset from `location`
    pub offset: Coordinate,
    /// One entry per head position, row-major
    pub tips: Vec<Tip>,
}

/// The 96 head aspirating from or dispensing into a plate or a single container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadLiquid {
    /// 96 wells row-major, or a single container shared by every position
    pub resource_names: Vec<String>,
    /// Absolute location of the resource
    pub location: Coordinate,
    /// Offset from `location`
    pub offset: Coordinate,
    /// One entry per head position, row-major
    pub tips: Vec<Tip>,
    /// uL per position
    pub volume: f64,
    /// uL/s
    pub flow_rate: Option<f64>,
    /// mm above the container bottom
    pub liquid_height: Option<f64>,
    /// uL
    pub blow_out_air_volume: Option<f64>,
}

/// A backend-agnostic command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Mount tips on independent channels
    PickUpTips {
        /// One entry per participating channel
        ops: Vec<ChannelTip>,
    },
    /// Remove tips from independent channels
    DropTips {
        /// One entry per participating channel
        ops: Vec<ChannelTip>,
    },
    /// Draw liquid into the channels' tips
    Aspirate {
        /// One entry per participating channel
        ops: Vec<ChannelLiquid>,
    },
    /// Push liquid out of the channels' tips
    Dispense {
        /// One entry per participating channel
        ops: Vec<ChannelLiquid>,
    },
    /// Mount a full rack on the 96 head
    PickUpTips96(HeadTips),
    /// Drop all 96 head tips
    DropTips96(HeadTips),
    /// Aspirate with the 96 head
    Aspirate96(HeadLiquid),
    /// Dispense with the 96 head
    Dispense96(HeadLiquid),
}

impl Operation {
    /// snake_case name, as in the serialized tag.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::PickUpTips { .. } => "pick_up_tips",
            Operation::DropTips { .. } => "drop_tips",
            Operation::Aspirate { .. } => "aspirate",
            Operation::Dispense { .. } => "dispense",
            Operation::PickUpTips96(_) => "pick_up_tips96",
            Operation::DropTips96(_) => "drop_tips96",
            Operation::Aspirate96(_) => "aspirate96",
            Operation::Dispense96(_) => "dispense96",
        }
    }

    /// Channels taking part; empty for 96-head operations.
    pub fn use_channels(&self) -> Vec<usize> {
        match self {
            Operation::PickUpTips { ops } | Operation::DropTips { ops } => {
                ops.iter().map(|op| op.channel).collect()
            }
            Operation::Aspirate { ops } | Operation::Dispense { ops } => {
                ops.iter().map(|op| op.channel).collect()
            }
            _ => Vec::new(),
        }
    }
}
