//! Serialized tree format and the incremental event stream.
//!
//! A serialized resource is a nested object:
//!
//! ```text
//! { "name": "plate", "type": "Plate", "num_items_x": 12, "num_items_y": 8,
//!   "location": {"x": 0.0, "y": 0.0, "z": 0.0},
//!   "size_x": 127.0, "size_y": 85.0, "size_z": 14.0,
//!   "category": "plate", "model": null,
//!   "children": [...], "parent_name": "deck" }
//! ```
//!
//! Field order is fixed, so serialize -> deserialize -> serialize is
//! byte-identical. Tracker state (tips present, volumes) is not part of this
//! format; it travels separately through `set_state` events and
//! [`ResourceTree::serialize_all_state`](super::ResourceTree::serialize_all_state).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::itemized::Grid;
use super::{Resource, ResourceKind, Tip, TipSpotState};
use crate::coordinate::Coordinate;
use crate::error::{LhError, LhResult};
use crate::tracking::{TipTracker, VolumeTracker};

/// Kind-specific part of a serialized resource, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SerializedKind {
    /// Plain resource
    Resource,
    /// Tree root
    Deck,
    /// Grid of wells
    Plate {
        /// Columns
        num_items_x: usize,
        /// Rows
        num_items_y: usize,
    },
    /// Grid of tip spots
    TipRack {
        /// Columns
        num_items_x: usize,
        /// Rows
        num_items_y: usize,
    },
    /// Carrier
    Carrier,
    /// Carrier site
    ResourceHolder,
    /// Plate well
    Well {
        /// Capacity in uL
        max_volume: f64,
    },
    /// Tube
    Tube {
        /// Capacity in uL
        max_volume: f64,
    },
    /// Trough
    Trough {
        /// Capacity in uL
        max_volume: f64,
    },
    /// Tip rack position
    TipSpot {
        /// Tip the spot produces when filled
        prototype_tip: Tip,
    },
    /// Tip waste
    Trash,
}

impl From<&ResourceKind> for SerializedKind {
    fn from(kind: &ResourceKind) -> Self {
        match kind {
            ResourceKind::Resource => SerializedKind::Resource,
            ResourceKind::Deck => SerializedKind::Deck,
            ResourceKind::Plate(grid) => SerializedKind::Plate {
                num_items_x: grid.num_items_x,
                num_items_y: grid.num_items_y,
            },
            ResourceKind::TipRack(grid) => SerializedKind::TipRack {
                num_items_x: grid.num_items_x,
                num_items_y: grid.num_items_y,
            },
            ResourceKind::Carrier => SerializedKind::Carrier,
            ResourceKind::ResourceHolder => SerializedKind::ResourceHolder,
            ResourceKind::Well(t) => SerializedKind::Well {
                max_volume: t.max_volume(),
            },
            ResourceKind::Tube(t) => SerializedKind::Tube {
                max_volume: t.max_volume(),
            },
            ResourceKind::Trough(t) => SerializedKind::Trough {
                max_volume: t.max_volume(),
            },
            ResourceKind::TipSpot(state) => SerializedKind::TipSpot {
                prototype_tip: state.prototype.clone(),
            },
            ResourceKind::Trash => SerializedKind::Trash,
        }
    }
}

impl SerializedKind {
    /// Fresh kind with default tracker state: spots occupied, containers empty.
    fn instantiate(&self, name: &str) -> ResourceKind {
        match self {
            SerializedKind::Resource => ResourceKind::Resource,
            SerializedKind::Deck => ResourceKind::Deck,
            SerializedKind::Plate {
                num_items_x,
                num_items_y,
            } => ResourceKind::Plate(Grid::new(*num_items_x, *num_items_y)),
            SerializedKind::TipRack {
                num_items_x,
                num_items_y,
            } => ResourceKind::TipRack(Grid::new(*num_items_x, *num_items_y)),
            SerializedKind::Carrier => ResourceKind::Carrier,
            SerializedKind::ResourceHolder => ResourceKind::ResourceHolder,
            SerializedKind::Well { max_volume } => {
                ResourceKind::Well(VolumeTracker::container(name, *max_volume))
            }
            SerializedKind::Tube { max_volume } => {
                ResourceKind::Tube(VolumeTracker::container(name, *max_volume))
            }
            SerializedKind::Trough { max_volume } => {
                ResourceKind::Trough(VolumeTracker::container(name, *max_volume))
            }
            SerializedKind::TipSpot { prototype_tip } => {
                let tip = prototype_tip.renamed(format!("{}_tip", name));
                ResourceKind::TipSpot(TipSpotState {
                    prototype: prototype_tip.clone(),
                    tracker: TipTracker::spot(name, Some(tip)),
                })
            }
            SerializedKind::Trash => ResourceKind::Trash,
        }
    }
}

/// Nested serialized form of a resource subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedResource {
    /// Unique name
    pub name: String,
    /// Type tag and kind-specific fields
    #[serde(flatten)]
    pub kind: SerializedKind,
    /// Relative to the parent
    pub location: Option<Coordinate>,
    /// mm
    pub size_x: f64,
    /// mm
    pub size_y: f64,
    /// mm
    pub size_z: f64,
    /// Free-form category
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form model name
    #[serde(default)]
    pub model: Option<String>,
    /// Nested children
    #[serde(default)]
    pub children: Vec<SerializedResource>,
    /// Name of the parent, when attached
    #[serde(default)]
    pub parent_name: Option<String>,
}

impl SerializedResource {
    /// Render as JSON.
    pub fn to_json(&self) -> LhResult<String> {
        serde_json::to_string(self)
            .map_err(|e| LhError::Configuration(format!("Cannot serialize '{}': {}", self.name, e)))
    }

    /// Parse from JSON.
    pub fn from_json(text: &str) -> LhResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| LhError::Configuration(format!("Invalid serialized resource: {}", e)))
    }
}

impl Resource {
    /// Serialize a detached subtree. `parent_name` is what the root reports.
    pub fn serialize(&self, parent_name: Option<&str>) -> SerializedResource {
        SerializedResource {
            name: self.name.clone(),
            kind: (&self.kind).into(),
            location: self.location,
            size_x: self.size_x,
            size_y: self.size_y,
            size_z: self.size_z,
            category: self.category.clone(),
            model: self.model.clone(),
            children: self
                .children
                .iter()
                .map(|c| c.serialize(Some(&self.name)))
                .collect(),
            parent_name: parent_name.map(str::to_string),
        }
    }

    /// Rebuild a detached subtree. Trackers start in their default state.
    pub fn deserialize(data: &SerializedResource) -> LhResult<Resource> {
        let kind = data.kind.instantiate(&data.name);
        if let Some(grid) = kind.grid() {
            if data.children.len() < grid.count() {
                return Err(LhError::Configuration(format!(
                    "'{}' declares {} items but has {} children",
                    data.name,
                    grid.count(),
                    data.children.len()
                )));
            }
        }
        Ok(Resource {
            name: data.name.clone(),
            size_x: data.size_x,
            size_y: data.size_y,
            size_z: data.size_z,
            location: data.location,
            category: data.category.clone(),
            model: data.model.clone(),
            kind,
            children: data
                .children
                .iter()
                .map(Resource::deserialize)
                .collect::<LhResult<Vec<_>>>()?,
        })
    }
}

/// Incremental change notification for mirrors of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TreeEvent {
    /// A subtree was attached.
    ResourceAssigned {
        /// The attached subtree
        resource: SerializedResource,
        /// Where it was attached
        parent_name: String,
    },
    /// A subtree was detached.
    ResourceUnassigned {
        /// Root of the detached subtree
        resource_name: String,
        /// Its former parent
        parent_name: String,
    },
    /// Committed tracker state changed, keyed by resource name.
    SetState {
        /// Serialized tracker state per resource
        states: BTreeMap<String, serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{GridLayout, ResourceTree};

    fn sample_tree() -> ResourceTree {
        let tip = Tip::new("tip", true, 59.9, 300.0, 8.0);
        let mut tree = ResourceTree::new(Resource::deck("deck", 1360.0, 653.5, 900.0)).unwrap();
        let root = tree.root();
        let carrier = Resource::carrier(
            "carrier",
            135.0,
            497.0,
            130.0,
            &[(Coordinate::new(4.0, 8.5, 86.15), (127.0, 86.0, 0.0))],
        );
        tree.assign_child(root, carrier, Coordinate::new(100.0, 63.0, 0.0), false)
            .unwrap();
        let site = tree.get("carrier_site_0").unwrap();
        let rack = Resource::tip_rack(
            "tips",
            122.4,
            82.6,
            20.0,
            GridLayout::standard_96(),
            tip,
            true,
        )
        .with_model("generic_300ul");
        tree.assign_child(site, rack, Coordinate::ZERO, false).unwrap();
        tree.assign_child(
            root,
            Resource::trough("trough", 19.0, 90.0, 40.0, 25000.0),
            Coordinate::new(500.0, 100.0, 0.0),
            false,
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_json_roundtrip_is_byte_exact() {
        let tree = sample_tree();
        let first = tree.serialize(tree.root()).unwrap().to_json().unwrap();
        let parsed = SerializedResource::from_json(&first).unwrap();
        let rebuilt = ResourceTree::new(Resource::deserialize(&parsed).unwrap()).unwrap();
        let second = rebuilt.serialize(rebuilt.root()).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_child_order_and_parent_names() {
        let tree = sample_tree();
        let rack = tree.serialize(tree.get("tips").unwrap()).unwrap();
        assert_eq!(rack.parent_name.as_deref(), Some("carrier_site_0"));
        assert_eq!(rack.children[0].name, "tips_A1");
        assert_eq!(rack.children[1].name, "tips_A2");
        assert_eq!(rack.children[0].parent_name.as_deref(), Some("tips"));
        assert_eq!(
            rack.kind,
            SerializedKind::TipRack {
                num_items_x: 12,
                num_items_y: 8
            }
        );
    }

    #[test]
    fn test_type_tag_is_inline() {
        let trough = Resource::trough("trough", 19.0, 90.0, 40.0, 25000.0);
        let value = serde_json::to_value(trough.serialize(None)).unwrap();
        assert_eq!(value["type"], "Trough");
        assert_eq!(value["max_volume"], 25000.0);
        assert!(value["location"].is_null());
    }

    #[test]
    fn test_deserialized_defaults() {
        let tree = sample_tree();
        let data = tree.serialize(tree.root()).unwrap();
        let rebuilt = ResourceTree::new(Resource::deserialize(&data).unwrap()).unwrap();
        let spot = rebuilt.get("tips_H12").unwrap();
        assert!(rebuilt.tip_tracker(spot).unwrap().has_tip());
        let trough = rebuilt.get("trough").unwrap();
        assert_eq!(rebuilt.volume_tracker(trough).unwrap().get_used_volume(), 0.0);
    }

    #[test]
    fn test_event_encoding() {
        let event = TreeEvent::ResourceUnassigned {
            resource_name: "plate".into(),
            parent_name: "deck".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "resource_unassigned");
        assert_eq!(value["resource_name"], "plate");
    }
}
