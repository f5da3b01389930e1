//! Spatial resource hierarchy.
//!
//! A [`Resource`] is an owned subtree: a named box with a location relative
//! to its parent and an ordered list of children. Labware is built detached
//! (a plate comes with its wells, a tip rack with its spots) and then moved
//! into a [`ResourceTree`], which owns every attached node, enforces unique
//! names and hands out [`ResourceId`] handles.
//!
//! Unassigning a subtree from the tree gives the owned [`Resource`] back;
//! dropping it tears the whole subtree down.
//!
//! # Kinds
//!
//! | Kind             | Children                    | Trackers          |
//! |------------------|-----------------------------|-------------------|
//! | `Plate`          | wells, row-major grid       | -                 |
//! | `TipRack`        | tip spots, row-major grid   | -                 |
//! | `Carrier`        | `ResourceHolder` sites      | -                 |
//! | `ResourceHolder` | at most one                 | -                 |
//! | `Well`/`Tube`/`Trough` | -                     | volume            |
//! | `TipSpot`        | -                           | tip               |

pub mod itemized;
pub mod serialize;
pub mod tip;
pub mod tree;

pub use itemized::{Grid, GridLayout, ItemIdentifier};
pub use serialize::{SerializedKind, SerializedResource, TreeEvent};
pub use tip::Tip;
pub use tree::{ResourceId, ResourceNode, ResourceTree};

use crate::coordinate::Coordinate;
use crate::tracking::{TipTracker, VolumeTracker};

/// State carried by a tip spot.
#[derive(Debug, Clone)]
pub struct TipSpotState {
    /// Geometry of the tips this spot holds
    pub prototype: Tip,
    /// Whether the spot holds a tip
    pub tracker: TipTracker,
}

/// Behaviour attached to a resource node.
#[derive(Debug, Clone)]
pub enum ResourceKind {
    /// Plain resource without behaviour
    Resource,
    /// Root of the tree
    Deck,
    /// Grid of wells
    Plate(Grid),
    /// Grid of tip spots
    TipRack(Grid),
    /// Holds resources in fixed sites
    Carrier,
    /// Carrier site; holds at most one resource
    ResourceHolder,
    /// Plate well
    Well(VolumeTracker),
    /// Free-standing tube
    Tube(VolumeTracker),
    /// Reservoir shared by many channels
    Trough(VolumeTracker),
    /// Tip rack position
    TipSpot(TipSpotState),
    /// Tip waste
    Trash,
}

impl ResourceKind {
    /// Type name used in serialized trees.
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Resource => "Resource",
            ResourceKind::Deck => "Deck",
            ResourceKind::Plate(_) => "Plate",
            ResourceKind::TipRack(_) => "TipRack",
            ResourceKind::Carrier => "Carrier",
            ResourceKind::ResourceHolder => "ResourceHolder",
            ResourceKind::Well(_) => "Well",
            ResourceKind::Tube(_) => "Tube",
            ResourceKind::Trough(_) => "Trough",
            ResourceKind::TipSpot(_) => "TipSpot",
            ResourceKind::Trash => "Trash",
        }
    }

    /// Item grid of plates and tip racks.
    pub fn grid(&self) -> Option<&Grid> {
        match self {
            ResourceKind::Plate(grid) | ResourceKind::TipRack(grid) => Some(grid),
            _ => None,
        }
    }

    /// Volume tracker of wells, tubes and troughs.
    pub fn volume_tracker(&self) -> Option<&VolumeTracker> {
        match self {
            ResourceKind::Well(t) | ResourceKind::Tube(t) | ResourceKind::Trough(t) => Some(t),
            _ => None,
        }
    }

    /// Mutable volume tracker of wells, tubes and troughs.
    pub fn volume_tracker_mut(&mut self) -> Option<&mut VolumeTracker> {
        match self {
            ResourceKind::Well(t) | ResourceKind::Tube(t) | ResourceKind::Trough(t) => Some(t),
            _ => None,
        }
    }

    /// Tip spot state, if this is a spot.
    pub fn tip_spot(&self) -> Option<&TipSpotState> {
        match self {
            ResourceKind::TipSpot(state) => Some(state),
            _ => None,
        }
    }

    /// Mutable tip spot state, if this is a spot.
    pub fn tip_spot_mut(&mut self) -> Option<&mut TipSpotState> {
        match self {
            ResourceKind::TipSpot(state) => Some(state),
            _ => None,
        }
    }

    /// Whether this kind holds liquid.
    pub fn is_container(&self) -> bool {
        self.volume_tracker().is_some()
    }
}

/// A detached resource subtree.
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) name: String,
    pub(crate) size_x: f64,
    pub(crate) size_y: f64,
    pub(crate) size_z: f64,
    pub(crate) location: Option<Coordinate>,
    pub(crate) category: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) kind: ResourceKind,
    pub(crate) children: Vec<Resource>,
}

impl Resource {
    /// A resource of the given kind without children.
    pub fn with_kind(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        kind: ResourceKind,
    ) -> Self {
        Self {
            name: name.into(),
            size_x,
            size_y,
            size_z,
            location: None,
            category: None,
            model: None,
            kind,
            children: Vec::new(),
        }
    }

    /// A plain resource.
    pub fn new(name: impl Into<String>, size_x: f64, size_y: f64, size_z: f64) -> Self {
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::Resource)
    }

    /// Free-form category, kept in serialized trees.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Free-form model name, kept in serialized trees.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Append a child at `location` relative to this resource.
    pub fn with_child(mut self, mut child: Resource, location: Coordinate) -> Self {
        child.location = Some(location);
        self.children.push(child);
        self
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind and attached trackers.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Location relative to the parent, `None` while detached.
    pub fn location(&self) -> Option<Coordinate> {
        self.location
    }

    /// Size in mm as `(x, y, z)`.
    pub fn size(&self) -> (f64, f64, f64) {
        (self.size_x, self.size_y, self.size_z)
    }

    /// Direct children.
    pub fn children(&self) -> &[Resource] {
        &self.children
    }

    /// Names of this resource and all descendants, depth first.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        for child in &self.children {
            names.extend(child.names());
        }
        names
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Root of a robot's work area.
    pub fn deck(name: impl Into<String>, size_x: f64, size_y: f64, size_z: f64) -> Self {
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::Deck).with_category("deck")
    }

    /// A single well.
    pub fn well(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        max_volume: f64,
    ) -> Self {
        let name = name.into();
        let tracker = VolumeTracker::container(name.clone(), max_volume);
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::Well(tracker))
            .with_category("well")
    }

    /// A free-standing tube.
    pub fn tube(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        max_volume: f64,
    ) -> Self {
        let name = name.into();
        let tracker = VolumeTracker::container(name.clone(), max_volume);
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::Tube(tracker))
            .with_category("tube")
    }

    /// A reservoir that every channel can reach at once.
    pub fn trough(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        max_volume: f64,
    ) -> Self {
        let name = name.into();
        let tracker = VolumeTracker::container(name.clone(), max_volume);
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::Trough(tracker))
            .with_category("trough")
    }

    /// A tip spot, occupied by a copy of `prototype` unless `has_tip` is false.
    pub fn tip_spot(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        prototype: Tip,
        has_tip: bool,
    ) -> Self {
        let name = name.into();
        let tip = has_tip.then(|| prototype.renamed(format!("{}_tip", name)));
        let tracker = TipTracker::spot(name.clone(), tip);
        Self::with_kind(
            name,
            size_x,
            size_y,
            size_z,
            ResourceKind::TipSpot(TipSpotState { prototype, tracker }),
        )
        .with_category("tip_spot")
    }

    /// Tip waste.
    pub fn trash(name: impl Into<String>, size_x: f64, size_y: f64, size_z: f64) -> Self {
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::Trash).with_category("trash")
    }

    /// A slot that holds at most one resource.
    pub fn holder(name: impl Into<String>, size_x: f64, size_y: f64, size_z: f64) -> Self {
        Self::with_kind(name, size_x, size_y, size_z, ResourceKind::ResourceHolder)
            .with_category("resource_holder")
    }

    /// A carrier with one holder per entry of `sites` (location, size).
    ///
    /// Sites are named `<carrier>_site_<i>`.
    pub fn carrier(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        sites: &[(Coordinate, (f64, f64, f64))],
    ) -> Self {
        let name = name.into();
        let mut carrier = Self::with_kind(name.clone(), size_x, size_y, size_z, ResourceKind::Carrier)
            .with_category("carrier");
        for (i, (location, (sx, sy, sz))) in sites.iter().enumerate() {
            let site = Resource::holder(format!("{}_site_{}", name, i), *sx, *sy, *sz);
            carrier = carrier.with_child(site, *location);
        }
        carrier
    }

    /// A plate with a `layout` grid of wells named `<plate>_<A1>`.
    pub fn plate(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        layout: GridLayout,
        well_max_volume: f64,
    ) -> Self {
        let name = name.into();
        let grid = layout.grid();
        let mut plate = Self::with_kind(name.clone(), size_x, size_y, size_z, ResourceKind::Plate(grid))
            .with_category("plate");
        for (index, location) in layout.item_locations().into_iter().enumerate() {
            let address = grid.address_of(index);
            let well = Resource::well(
                format!("{}_{}", name, address),
                layout.item_size_x,
                layout.item_size_y,
                layout.item_size_z,
                well_max_volume,
            );
            plate = plate.with_child(well, location);
        }
        plate
    }

    /// A tip rack with a `layout` grid of spots named `<rack>_<A1>`.
    pub fn tip_rack(
        name: impl Into<String>,
        size_x: f64,
        size_y: f64,
        size_z: f64,
        layout: GridLayout,
        tip: Tip,
        with_tips: bool,
    ) -> Self {
        let name = name.into();
        let grid = layout.grid();
        let mut rack = Self::with_kind(name.clone(), size_x, size_y, size_z, ResourceKind::TipRack(grid))
            .with_category("tip_rack");
        for (index, location) in layout.item_locations().into_iter().enumerate() {
            let address = grid.address_of(index);
            let spot = Resource::tip_spot(
                format!("{}_{}", name, address),
                layout.item_size_x,
                layout.item_size_y,
                layout.item_size_z,
                tip.clone(),
                with_tips,
            );
            rack = rack.with_child(spot, location);
        }
        rack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_builder_names_wells_row_major() {
        let plate = Resource::plate(
            "plate",
            127.0,
            85.0,
            14.0,
            GridLayout::standard_96(),
            360.0,
        );
        assert_eq!(plate.children().len(), 96);
        assert_eq!(plate.children()[0].name(), "plate_A1");
        assert_eq!(plate.children()[1].name(), "plate_A2");
        assert_eq!(plate.children()[12].name(), "plate_B1");
        assert_eq!(plate.children()[95].name(), "plate_H12");
    }

    #[test]
    fn test_tip_spot_defaults_to_occupied() {
        let tip = Tip::new("tip", false, 59.9, 300.0, 8.0);
        let spot = Resource::tip_spot("spot", 9.0, 9.0, 0.0, tip.clone(), true);
        let state = spot.kind().tip_spot().unwrap();
        assert!(state.tracker.has_tip());
        assert_eq!(state.tracker.tip().unwrap().name, "spot_tip");

        let empty = Resource::tip_spot("empty", 9.0, 9.0, 0.0, tip, false);
        assert!(!empty.kind().tip_spot().unwrap().tracker.has_tip());
    }

    #[test]
    fn test_container_defaults_to_empty() {
        let well = Resource::well("w", 9.0, 9.0, 10.0, 572.56);
        let tracker = well.kind().volume_tracker().unwrap();
        assert_eq!(tracker.get_used_volume(), 0.0);
        assert_eq!(tracker.max_volume(), 572.56);
    }

    #[test]
    fn test_carrier_sites() {
        let carrier = Resource::carrier(
            "carrier",
            135.0,
            497.0,
            130.0,
            &[
                (Coordinate::new(4.0, 8.5, 86.15), (127.0, 86.0, 0.0)),
                (Coordinate::new(4.0, 104.5, 86.15), (127.0, 86.0, 0.0)),
            ],
        );
        assert_eq!(carrier.names(), vec!["carrier", "carrier_site_0", "carrier_site_1"]);
        assert_eq!(
            carrier.children()[1].location(),
            Some(Coordinate::new(4.0, 104.5, 86.15))
        );
    }
}
