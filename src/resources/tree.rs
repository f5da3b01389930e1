//! Arena-backed resource tree.
//!
//! The tree owns every attached node. Handles are plain indices that are
//! never reused, so a handle to a removed node reports `UnknownResource`
//! instead of silently pointing at something else.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::broadcast;
use tracing::debug;

use super::serialize::{SerializedResource, TreeEvent};
use super::{Resource, ResourceKind, TipSpotState};
use crate::coordinate::Coordinate;
use crate::error::{LhError, LhResult};
use crate::tracking::{TipTracker, Tracker, VolumeTracker};

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 1024;

/// Handle to a node in a [`ResourceTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(usize);

/// An attached resource.
#[derive(Debug)]
pub struct ResourceNode {
    pub(crate) name: String,
    pub(crate) size_x: f64,
    pub(crate) size_y: f64,
    pub(crate) size_z: f64,
    pub(crate) location: Option<Coordinate>,
    pub(crate) category: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) kind: ResourceKind,
    pub(crate) parent: Option<ResourceId>,
    pub(crate) children: Vec<ResourceId>,
}

impl ResourceNode {
    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind and attached trackers.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Location relative to the parent.
    pub fn location(&self) -> Option<Coordinate> {
        self.location
    }

    /// Size in mm as `(x, y, z)`.
    pub fn size(&self) -> (f64, f64, f64) {
        (self.size_x, self.size_y, self.size_z)
    }

    /// Free-form category.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Free-form model name.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Parent handle, `None` for the root.
    pub fn parent(&self) -> Option<ResourceId> {
        self.parent
    }

    /// Children in assignment order.
    pub fn children(&self) -> &[ResourceId] {
        &self.children
    }

    /// Volume or tip tracker of this node, if it has one.
    pub fn tracker(&self) -> Option<&dyn Tracker> {
        match &self.kind {
            ResourceKind::TipSpot(state) => Some(&state.tracker),
            kind => kind.volume_tracker().map(|t| t as &dyn Tracker),
        }
    }

    pub(crate) fn tracker_mut(&mut self) -> Option<&mut dyn Tracker> {
        match &mut self.kind {
            ResourceKind::TipSpot(state) => Some(&mut state.tracker),
            kind => kind.volume_tracker_mut().map(|t| t as &mut dyn Tracker),
        }
    }

    fn wrong_kind(&self, expected: &'static str) -> LhError {
        LhError::WrongResourceKind {
            resource: self.name.clone(),
            expected,
            actual: self.kind.type_name(),
        }
    }
}

/// Spatial ownership hierarchy for one control instance.
#[derive(Debug)]
pub struct ResourceTree {
    nodes: Vec<Option<ResourceNode>>,
    names: HashMap<String, ResourceId>,
    root: ResourceId,
    events: broadcast::Sender<TreeEvent>,
    /// New trackers start disabled while set.
    tracking_suspended: bool,
}

impl ResourceTree {
    /// Build a tree with `root` (and its subtree) attached.
    pub fn new(root: Resource) -> LhResult<Self> {
        check_unique_names(&root)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut tree = Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            root: ResourceId(0),
            events,
            tracking_suspended: false,
        };
        tree.root = tree.insert(root, None);
        Ok(tree)
    }

    /// Handle of the root.
    pub fn root(&self) -> ResourceId {
        self.root
    }

    /// Whether trackers attached from now on start disabled.
    pub fn tracking_suspended(&self) -> bool {
        self.tracking_suspended
    }

    /// Returns the previous value.
    pub(crate) fn set_tracking_suspended(&mut self, suspended: bool) -> bool {
        std::mem::replace(&mut self.tracking_suspended, suspended)
    }

    /// Number of attached resources.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Never true for a built tree.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Look up a resource by name.
    pub fn get(&self, name: &str) -> LhResult<ResourceId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| LhError::UnknownResource(name.to_string()))
    }

    /// Whether `name` is attached.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Names of all attached resources, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Node for `id`, `UnknownResource` once detached.
    pub fn node(&self, id: ResourceId) -> LhResult<&ResourceNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| LhError::UnknownResource(format!("{:?}", id)))
    }

    pub(crate) fn node_mut(&mut self, id: ResourceId) -> LhResult<&mut ResourceNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| LhError::UnknownResource(format!("{:?}", id)))
    }

    /// Name of `id`.
    pub fn name(&self, id: ResourceId) -> LhResult<&str> {
        Ok(self.node(id)?.name())
    }

    /// Parent of `id`.
    pub fn parent(&self, id: ResourceId) -> LhResult<Option<ResourceId>> {
        Ok(self.node(id)?.parent)
    }

    /// Children of `id` in assignment order.
    pub fn children(&self, id: ResourceId) -> LhResult<&[ResourceId]> {
        Ok(&self.node(id)?.children)
    }

    /// Whether `ancestor` is `id` or lies on the path from `id` to the root.
    pub fn is_ancestor_or_self(&self, ancestor: ResourceId, id: ResourceId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.nodes.get(c.0).and_then(Option::as_ref).and_then(|n| n.parent);
        }
        false
    }

    /// Sum of locations along the path from `id` to the root.
    pub fn get_absolute_location(&self, id: ResourceId) -> LhResult<Coordinate> {
        let mut total = Coordinate::ZERO;
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.node(c)?;
            total += node.location.unwrap_or(Coordinate::ZERO);
            current = node.parent;
        }
        Ok(total)
    }

    /// Subscribe to the incremental event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: TreeEvent) {
        // No subscribers is the normal case.
        let _ = self.events.send(event);
    }

    /// Emit a `set_state` event for the given nodes' trackers.
    pub fn emit_state(&self, ids: &[ResourceId]) {
        if ids.is_empty() || self.events.receiver_count() == 0 {
            return;
        }
        let mut states = BTreeMap::new();
        for id in ids {
            if let Ok(node) = self.node(*id) {
                if let Some(tracker) = node.tracker() {
                    states.insert(node.name.clone(), tracker.serialize_state());
                }
            }
        }
        if !states.is_empty() {
            self.emit(TreeEvent::SetState { states });
        }
    }

    fn insert(&mut self, resource: Resource, parent: Option<ResourceId>) -> ResourceId {
        let id = ResourceId(self.nodes.len());
        let Resource {
            name,
            size_x,
            size_y,
            size_z,
            location,
            category,
            model,
            kind,
            children,
        } = resource;
        self.names.insert(name.clone(), id);
        self.nodes.push(Some(ResourceNode {
            name,
            size_x,
            size_y,
            size_z,
            location,
            category,
            model,
            kind,
            parent,
            children: Vec::with_capacity(children.len()),
        }));
        if self.tracking_suspended {
            if let Some(tracker) = self.nodes[id.0].as_mut().and_then(|n| n.tracker_mut()) {
                tracker.set_enabled_override(Some(false));
            }
        }
        for child in children {
            let child_id = self.insert(child, Some(id));
            if let Some(node) = self.nodes[id.0].as_mut() {
                node.children.push(child_id);
            }
        }
        id
    }

    fn take(&mut self, id: ResourceId) -> Option<Resource> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        self.names.remove(&node.name);
        let children = node
            .children
            .iter()
            .filter_map(|child| self.take(*child))
            .collect();
        Some(Resource {
            name: node.name,
            size_x: node.size_x,
            size_y: node.size_y,
            size_z: node.size_z,
            location: node.location,
            category: node.category,
            model: node.model,
            kind: node.kind,
            children,
        })
    }

    /// Attach `child` under `parent` at `location`.
    ///
    /// Fails with `DuplicateName` when any name in the incoming subtree is
    /// already attached, and with `OccupiedSlot` when `parent` is a holder
    /// that already holds something. With `replace`, the conflicting
    /// resources are unassigned and destroyed first.
    pub fn assign_child(
        &mut self,
        parent: ResourceId,
        mut child: Resource,
        location: Coordinate,
        replace: bool,
    ) -> LhResult<ResourceId> {
        check_unique_names(&child)?;
        let parent_node = self.node(parent)?;

        let mut to_remove: Vec<ResourceId> = Vec::new();
        for name in child.names() {
            if let Some(existing) = self.names.get(name).copied() {
                if !replace || self.is_ancestor_or_self(existing, parent) {
                    return Err(LhError::DuplicateName(name.to_string()));
                }
                to_remove.push(existing);
            }
        }

        if matches!(parent_node.kind, ResourceKind::ResourceHolder) {
            if let Some(occupant) = parent_node.children.first().copied() {
                if !replace {
                    return Err(LhError::OccupiedSlot {
                        slot: parent_node.name.clone(),
                        occupant: self.name(occupant)?.to_string(),
                    });
                }
                to_remove.push(occupant);
            }
        }

        for existing in to_remove {
            if self.nodes.get(existing.0).map_or(false, Option::is_some) {
                debug!(resource = %self.name(existing)?, "replacing resource");
                drop(self.unassign_child(existing)?);
            }
        }

        child.location = Some(location);
        let id = self.insert(child, Some(parent));
        self.node_mut(parent)?.children.push(id);

        let parent_name = self.name(parent)?.to_string();
        debug!(resource = %self.name(id)?, parent = %parent_name, "resource assigned");
        if self.events.receiver_count() > 0 {
            let resource = self.serialize(id)?;
            self.emit(TreeEvent::ResourceAssigned {
                resource,
                parent_name,
            });
        }
        Ok(id)
    }

    /// Detach `id` and its subtree, returning it without destroying it.
    pub fn unassign_child(&mut self, id: ResourceId) -> LhResult<Resource> {
        let node = self.node(id)?;
        let parent = node
            .parent
            .ok_or_else(|| LhError::NotAssigned(node.name.clone()))?;
        self.node_mut(parent)?.children.retain(|c| *c != id);

        let mut resource = self
            .take(id)
            .ok_or_else(|| LhError::UnknownResource(format!("{:?}", id)))?;
        resource.location = None;

        let parent_name = self.name(parent)?.to_string();
        debug!(resource = %resource.name, parent = %parent_name, "resource unassigned");
        self.emit(TreeEvent::ResourceUnassigned {
            resource_name: resource.name.clone(),
            parent_name,
        });
        Ok(resource)
    }

    /// Serialize the subtree rooted at `id`.
    pub fn serialize(&self, id: ResourceId) -> LhResult<SerializedResource> {
        let node = self.node(id)?;
        let parent_name = match node.parent {
            Some(parent) => Some(self.name(parent)?.to_string()),
            None => None,
        };
        let children = node
            .children
            .iter()
            .map(|child| self.serialize(*child))
            .collect::<LhResult<Vec<_>>>()?;
        Ok(SerializedResource {
            name: node.name.clone(),
            kind: (&node.kind).into(),
            location: node.location,
            size_x: node.size_x,
            size_y: node.size_y,
            size_z: node.size_z,
            category: node.category.clone(),
            model: node.model.clone(),
            children,
            parent_name,
        })
    }

    // ------------------------------------------------------------------
    // Trackers
    // ------------------------------------------------------------------

    /// Tip spot state of `id`, `WrongResourceKind` otherwise.
    pub fn tip_spot(&self, id: ResourceId) -> LhResult<&TipSpotState> {
        let node = self.node(id)?;
        node.kind.tip_spot().ok_or_else(|| node.wrong_kind("TipSpot"))
    }

    /// Mutable counterpart of `tip_spot`.
    pub fn tip_spot_mut(&mut self, id: ResourceId) -> LhResult<&mut TipSpotState> {
        let node = self.node_mut(id)?;
        if node.kind.tip_spot().is_none() {
            return Err(node.wrong_kind("TipSpot"));
        }
        node.kind.tip_spot_mut().ok_or_else(|| LhError::UnknownResource(format!("{:?}", id)))
    }

    /// Tip tracker of a tip spot.
    pub fn tip_tracker(&self, id: ResourceId) -> LhResult<&TipTracker> {
        Ok(&self.tip_spot(id)?.tracker)
    }

    /// Mutable counterpart of `tip_tracker`.
    pub fn tip_tracker_mut(&mut self, id: ResourceId) -> LhResult<&mut TipTracker> {
        Ok(&mut self.tip_spot_mut(id)?.tracker)
    }

    /// Volume tracker of a well, tube or trough.
    pub fn volume_tracker(&self, id: ResourceId) -> LhResult<&VolumeTracker> {
        let node = self.node(id)?;
        node.kind
            .volume_tracker()
            .ok_or_else(|| node.wrong_kind("container"))
    }

    /// Mutable counterpart of `volume_tracker`.
    pub fn volume_tracker_mut(&mut self, id: ResourceId) -> LhResult<&mut VolumeTracker> {
        let node = self.node_mut(id)?;
        if !node.kind.is_container() {
            return Err(node.wrong_kind("container"));
        }
        node.kind
            .volume_tracker_mut()
            .ok_or_else(|| LhError::UnknownResource(format!("{:?}", id)))
    }

    /// Generic tracker access, used by batch commit and rollback.
    pub(crate) fn tracker_mut(&mut self, id: ResourceId) -> LhResult<&mut dyn Tracker> {
        let node = self.node_mut(id)?;
        if node.tracker().is_none() {
            return Err(node.wrong_kind("tracked resource"));
        }
        node.tracker_mut()
            .ok_or_else(|| LhError::UnknownResource(format!("{:?}", id)))
    }

    /// Every attached node that carries a tracker.
    pub fn tracked_ids(&self) -> Vec<ResourceId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().filter(|n| n.tracker().is_some()).map(|_| ResourceId(i)))
            .collect()
    }

    /// Committed tracker state of one node, `None` for untracked kinds.
    pub fn serialize_state(&self, id: ResourceId) -> LhResult<Option<serde_json::Value>> {
        Ok(self.node(id)?.tracker().map(|t| t.serialize_state()))
    }

    /// Committed tracker state of every tracked node, keyed by name.
    pub fn serialize_all_state(&self) -> BTreeMap<String, serde_json::Value> {
        self.nodes
            .iter()
            .flatten()
            .filter_map(|n| n.tracker().map(|t| (n.name.clone(), t.serialize_state())))
            .collect()
    }

    /// Load tracker state produced by [`serialize_all_state`](Self::serialize_all_state).
    pub fn load_all_state(&mut self, states: &BTreeMap<String, serde_json::Value>) -> LhResult<()> {
        let mut touched = Vec::with_capacity(states.len());
        for (name, state) in states {
            let id = self.get(name)?;
            let node = self.node_mut(id)?;
            match &mut node.kind {
                ResourceKind::TipSpot(spot) => spot.tracker.load_state(state)?,
                kind => match kind.volume_tracker_mut() {
                    Some(tracker) => tracker.load_state(state)?,
                    None => return Err(node.wrong_kind("tracked resource")),
                },
            }
            touched.push(id);
        }
        self.emit_state(&touched);
        Ok(())
    }
}

fn check_unique_names(resource: &Resource) -> LhResult<()> {
    let mut seen = HashSet::new();
    for name in resource.names() {
        if !seen.insert(name) {
            return Err(LhError::DuplicateName(name.to_string()));
        }
    }
    Ok(())
}
