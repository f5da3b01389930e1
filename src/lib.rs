//! Resource and state tracking engine for laboratory liquid handlers.
//!
//! The crate models the deck as a tree of resources, tracks tips and liquid
//! volumes per tip spot, container and channel, validates multi-channel
//! batches before committing anything, and hands standard-form operations to
//! an interchangeable [`backend::Backend`].
//!
//! - [`resources`] - resource tree, labware shapes, serialization and events
//! - [`tracking`] - tip and volume trackers with two-phase updates
//! - [`liquid_handler`] - channel heads, batch operations, scoped tracking bypass
//! - [`validation`] - strictness gate for protocol legality
//! - [`backend`] - dispatch interface, simulator and logging passthrough
//! - [`config`] - engine settings and the live configuration object

pub mod backend;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod liquid_handler;
pub mod logging;
pub mod resources;
pub mod standard;
pub mod tracking;
pub mod validation;

pub use config::{EngineConfig, EngineSettings};
pub use coordinate::Coordinate;
pub use error::{ErrorCategory, LhError, LhResult};
pub use liquid_handler::{ChannelBatch, LiquidHandler, LiquidTarget, TipTarget};
pub use resources::{Resource, ResourceId, ResourceTree, Tip};
pub use validation::{BackendParams, Strictness};
