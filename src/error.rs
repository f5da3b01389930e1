//! Custom error types for the engine.
//!
//! This module defines the primary error type, `LhError`, for the entire crate.
//! Using the `thiserror` crate, it provides a single place where every failure
//! the engine can raise is named, from tree bookkeeping mistakes to tracker
//! violations and opaque backend failures.
//!
//! ## Error Hierarchy
//!
//! Every variant belongs to one [`ErrorCategory`]:
//!
//! - **Structural**: the request does not make sense against the resource tree
//!   (duplicate names, filled slots, unknown resources, bad addresses).
//! - **Physical consistency**: the request contradicts what the trackers say the
//!   hardware holds (a channel that already has a tip, a well without enough liquid).
//! - **Protocol legality**: raised only when strictness is `Strict`; under `Warn`
//!   and `Ignore` the same condition is logged and the call proceeds.
//! - **Backend**: whatever the backend returned, surfaced unchanged. Tracker state
//!   is never rolled back when this happens.
//! - **Configuration**: loading or validating engine settings failed.

use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type LhResult<T> = std::result::Result<T, LhError>;

/// Broad classification of an [`LhError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Tree shape, naming or addressing problems.
    Structural,
    /// Tip or volume state contradicts the request.
    PhysicalConsistency,
    /// Protocol rule violated under strict mode.
    ProtocolLegality,
    /// Failure reported by the backend.
    Backend,
    /// Settings could not be loaded or are invalid.
    Configuration,
}

/// Every failure the engine reports.
///
/// Variants carrying `owner` name the tracker that refused the change: a tip
/// name for tip errors, a container name for well errors.
#[derive(Error, Debug)]
pub enum LhError {
    /// A name is already attached to the tree.
    #[error("Resource with name '{0}' already exists in the tree")]
    DuplicateName(String),

    /// A holder already holds a resource.
    #[error("Slot '{slot}' is already occupied by '{occupant}'")]
    OccupiedSlot {
        /// The holder
        slot: String,
        /// What sits in it
        occupant: String,
    },

    /// No attached resource has this name or handle.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// The root, or an already detached resource, cannot be unassigned.
    #[error("Resource '{0}' is not assigned to a parent")]
    NotAssigned(String),

    /// Linear index past the end of an item grid.
    #[error("Item {index} is out of range for '{resource}' ({count} items)")]
    ItemOutOfRange {
        /// Plate or rack
        resource: String,
        /// Requested index
        index: usize,
        /// Number of items
        count: usize,
    },

    /// Address or range that does not parse or does not fit the grid.
    #[error("Invalid address '{address}' for '{resource}'")]
    InvalidAddress {
        /// Plate or rack
        resource: String,
        /// The offending address
        address: String,
    },

    /// The resource kind does not support the operation.
    #[error("Resource '{resource}' is a {actual}, expected {expected}")]
    WrongResourceKind {
        /// Offending resource
        resource: String,
        /// Kind the operation needs
        expected: &'static str,
        /// Kind it has
        actual: &'static str,
    },

    /// Channel index or batch shape does not fit the head.
    #[error("Invalid channel {channel}: {reason}")]
    InvalidChannel {
        /// Offending index
        channel: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Negative or non-finite volume.
    #[error("Invalid volume {0} uL")]
    InvalidVolume(f64),

    /// The backend cannot move there.
    #[error("Location of '{resource}' is not reachable by {by}")]
    Unreachable {
        /// Target resource
        resource: String,
        /// Channel or head that was asked
        by: String,
    },

    /// Channel holds no tip with a known origin.
    #[error("Channel {0} has no recorded tip origin to return to")]
    NoTipToReturn(usize),

    /// Dropping onto a spot that is occupied.
    #[error("Tip spot '{0}' already has a tip")]
    TipSpotHasTip(String),

    /// Picking up from an empty spot.
    #[error("Tip spot '{0}' has no tip")]
    TipSpotHasNoTip(String),

    /// Picking up with a channel that already has a tip.
    #[error("Channel '{0}' already has a tip")]
    ChannelHasTip(String),

    /// The operation needs a mounted tip.
    #[error("Channel '{0}' has no tip")]
    ChannelHasNoTip(String),

    /// Dispensing more than the tip holds.
    #[error("Tip '{owner}' holds {available} uL, cannot dispense {requested} uL")]
    TipTooLittleLiquid {
        /// Tip name
        owner: String,
        /// uL
        requested: f64,
        /// uL
        available: f64,
    },

    /// Aspirating past the tip's capacity.
    #[error("Tip '{owner}' has {available} uL free, cannot aspirate {requested} uL")]
    TipTooLittleVolume {
        /// Tip name
        owner: String,
        /// uL
        requested: f64,
        /// uL
        available: f64,
    },

    /// Aspirating more than the container holds.
    #[error("Container '{owner}' holds {available} uL, cannot aspirate {requested} uL")]
    WellTooLittleLiquid {
        /// Container name
        owner: String,
        /// uL
        requested: f64,
        /// uL
        available: f64,
    },

    /// Dispensing past the container's capacity.
    #[error("Container '{owner}' has {available} uL free, cannot dispense {requested} uL")]
    WellTooLittleVolume {
        /// Container name
        owner: String,
        /// uL
        requested: f64,
        /// uL
        available: f64,
    },

    /// Protocol rule violated while strictness is `Strict`.
    #[error("Protocol violation in {operation}: {message}")]
    Legality {
        /// Operation name, e.g. `pick_up_tips`
        operation: &'static str,
        /// The violated rule
        message: String,
    },

    /// Failure reported by the backend.
    #[error("Backend error: {0}")]
    Backend(#[source] anyhow::Error),

    /// Settings could not be extracted.
    #[error("Configuration load error: {0}")]
    Config(#[from] figment::Error),

    /// Settings or serialized state are invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl LhError {
    /// Classify this error according to the engine's error taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LhError::DuplicateName(_)
            | LhError::OccupiedSlot { .. }
            | LhError::UnknownResource(_)
            | LhError::NotAssigned(_)
            | LhError::ItemOutOfRange { .. }
            | LhError::InvalidAddress { .. }
            | LhError::WrongResourceKind { .. }
            | LhError::InvalidChannel { .. }
            | LhError::InvalidVolume(_)
            | LhError::Unreachable { .. }
            | LhError::NoTipToReturn(_) => ErrorCategory::Structural,
            LhError::TipSpotHasTip(_)
            | LhError::TipSpotHasNoTip(_)
            | LhError::ChannelHasTip(_)
            | LhError::ChannelHasNoTip(_)
            | LhError::TipTooLittleLiquid { .. }
            | LhError::TipTooLittleVolume { .. }
            | LhError::WellTooLittleLiquid { .. }
            | LhError::WellTooLittleVolume { .. } => ErrorCategory::PhysicalConsistency,
            LhError::Legality { .. } => ErrorCategory::ProtocolLegality,
            LhError::Backend(_) => ErrorCategory::Backend,
            LhError::Config(_) | LhError::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}
