//! Grid addressing for plates and tip racks.
//!
//! Items are the first `num_items_x * num_items_y` children of an itemized
//! resource, stored row-major: `A1, A2, ..., A12, B1, ...`. An item can be
//! addressed by linear index, by `<row letters><column number>` or by an
//! inclusive rectangle `A1:B3`, which resolves row-major as well.

use serde::{Deserialize, Serialize};

use super::tree::{ResourceId, ResourceTree};
use super::ResourceKind;
use crate::config::EngineConfig;
use crate::coordinate::Coordinate;
use crate::error::{LhError, LhResult};
use crate::tracking::Tracker;

/// Dimensions of an item grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    /// Columns
    pub num_items_x: usize,
    /// Rows
    pub num_items_y: usize,
}

impl Grid {
    /// Grid with `num_items_x` columns and `num_items_y` rows.
    pub fn new(num_items_x: usize, num_items_y: usize) -> Self {
        Self {
            num_items_x,
            num_items_y,
        }
    }

    /// Number of items.
    pub fn count(&self) -> usize {
        self.num_items_x * self.num_items_y
    }

    /// Linear index of (row, column), both zero based.
    pub fn index_of(&self, row: usize, column: usize) -> usize {
        row * self.num_items_x + column
    }

    /// `<row letters><column number>` for a linear index.
    pub fn address_of(&self, index: usize) -> String {
        let row = index / self.num_items_x.max(1);
        let column = index % self.num_items_x.max(1);
        format!("{}{}", row_letters(row), column + 1)
    }

    /// Parse a single address into zero-based (row, column).
    pub fn parse_address(&self, address: &str) -> Option<(usize, usize)> {
        let address = address.trim();
        let split = address.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, digits) = address.split_at(split);
        if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let mut row = 0usize;
        for c in letters.chars() {
            let value = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            row = row.checked_mul(26)?.checked_add(value)?;
        }
        let column: usize = digits.parse().ok()?;
        if column == 0 {
            return None;
        }
        let (row, column) = (row - 1, column - 1);
        (row < self.num_items_y && column < self.num_items_x).then_some((row, column))
    }

    /// Resolve an identifier to linear indices, row-major.
    pub fn resolve(&self, resource: &str, identifier: &ItemIdentifier) -> LhResult<Vec<usize>> {
        let invalid = |address: &str| LhError::InvalidAddress {
            resource: resource.to_string(),
            address: address.to_string(),
        };
        match identifier {
            ItemIdentifier::Index(index) => {
                if *index >= self.count() {
                    return Err(LhError::ItemOutOfRange {
                        resource: resource.to_string(),
                        index: *index,
                        count: self.count(),
                    });
                }
                Ok(vec![*index])
            }
            ItemIdentifier::Address(address) => match address.split_once(':') {
                None => {
                    let (row, column) = self.parse_address(address).ok_or_else(|| invalid(address))?;
                    Ok(vec![self.index_of(row, column)])
                }
                Some((start, end)) => {
                    let (r0, c0) = self.parse_address(start).ok_or_else(|| invalid(address))?;
                    let (r1, c1) = self.parse_address(end).ok_or_else(|| invalid(address))?;
                    let (rows, columns) = (r0.min(r1)..=r0.max(r1), c0.min(c1)..=c0.max(c1));
                    Ok(rows
                        .flat_map(|r| columns.clone().map(move |c| (r, c)))
                        .map(|(r, c)| self.index_of(r, c))
                        .collect())
                }
            },
        }
    }
}

fn row_letters(mut row: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (row % 26) as u8) as char);
        if row < 26 {
            break;
        }
        row = row / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// How to address an item in a grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemIdentifier {
    /// Row-major linear index
    Index(usize),
    /// `A1` or `A1:H12`
    Address(String),
}

impl From<usize> for ItemIdentifier {
    fn from(index: usize) -> Self {
        ItemIdentifier::Index(index)
    }
}

impl From<&str> for ItemIdentifier {
    fn from(address: &str) -> Self {
        ItemIdentifier::Address(address.to_string())
    }
}

impl From<String> for ItemIdentifier {
    fn from(address: String) -> Self {
        ItemIdentifier::Address(address)
    }
}

/// Geometry of an equally spaced item grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    /// Columns
    pub num_items_x: usize,
    /// Rows
    pub num_items_y: usize,
    /// Offset of the bottom-left item from the parent origin
    pub dx: f64,
    /// See `dx`
    pub dy: f64,
    /// See `dx`
    pub dz: f64,
    /// Pitch between items
    pub item_dx: f64,
    /// See `item_dx`
    pub item_dy: f64,
    /// Item footprint and height, mm
    pub item_size_x: f64,
    /// See `item_size_x`
    pub item_size_y: f64,
    /// See `item_size_x`
    pub item_size_z: f64,
}

impl GridLayout {
    /// SBS 8x12 layout with 9 mm pitch.
    pub fn standard_96() -> Self {
        Self {
            num_items_x: 12,
            num_items_y: 8,
            dx: 10.07,
            dy: 7.52,
            dz: 1.0,
            item_dx: 9.0,
            item_dy: 9.0,
            item_size_x: 6.96,
            item_size_y: 6.96,
            item_size_z: 10.67,
        }
    }

    /// Dimensions without geometry.
    pub fn grid(&self) -> Grid {
        Grid::new(self.num_items_x, self.num_items_y)
    }

    /// Item locations, row-major, row A at the back (highest y).
    pub fn item_locations(&self) -> Vec<Coordinate> {
        let mut locations = Vec::with_capacity(self.num_items_x * self.num_items_y);
        for row in 0..self.num_items_y {
            for column in 0..self.num_items_x {
                locations.push(Coordinate::new(
                    self.dx + column as f64 * self.item_dx,
                    self.dy + (self.num_items_y - row - 1) as f64 * self.item_dy,
                    self.dz,
                ));
            }
        }
        locations
    }
}

impl ResourceTree {
    /// Item grid of an itemized resource.
    pub fn grid(&self, id: ResourceId) -> LhResult<Grid> {
        let node = self.node(id)?;
        node.kind().grid().copied().ok_or_else(|| LhError::WrongResourceKind {
            resource: node.name().to_string(),
            expected: "itemized resource",
            actual: node.kind().type_name(),
        })
    }

    /// Resolve `identifier` to exactly one item.
    pub fn get_item(&self, id: ResourceId, identifier: impl Into<ItemIdentifier>) -> LhResult<ResourceId> {
        let identifier = identifier.into();
        let items = self.get_items(id, identifier.clone())?;
        match items.as_slice() {
            [item] => Ok(*item),
            _ => Err(LhError::InvalidAddress {
                resource: self.name(id)?.to_string(),
                address: format!("{:?}", identifier),
            }),
        }
    }

    /// Resolve `identifier` to items, row-major.
    pub fn get_items(
        &self,
        id: ResourceId,
        identifier: impl Into<ItemIdentifier>,
    ) -> LhResult<Vec<ResourceId>> {
        let grid = self.grid(id)?;
        let node = self.node(id)?;
        let indices = grid.resolve(node.name(), &identifier.into())?;
        indices
            .into_iter()
            .map(|i| {
                node.children().get(i).copied().ok_or_else(|| LhError::ItemOutOfRange {
                    resource: node.name().to_string(),
                    index: i,
                    count: node.children().len(),
                })
            })
            .collect()
    }

    /// All items in row-major order.
    pub fn get_all_items(&self, id: ResourceId) -> LhResult<Vec<ResourceId>> {
        let grid = self.grid(id)?;
        Ok(self.children(id)?.iter().take(grid.count()).copied().collect())
    }

    fn tip_rack_items(&self, id: ResourceId) -> LhResult<Vec<ResourceId>> {
        let node = self.node(id)?;
        if !matches!(node.kind(), ResourceKind::TipRack(_)) {
            return Err(LhError::WrongResourceKind {
                resource: node.name().to_string(),
                expected: "TipRack",
                actual: node.kind().type_name(),
            });
        }
        self.get_all_items(id)
    }

    /// Whether the addressed spot of a tip rack holds a tip.
    pub fn has_tip(&self, rack: ResourceId, identifier: impl Into<ItemIdentifier>) -> LhResult<bool> {
        let spot = self.get_item(rack, identifier)?;
        Ok(self.tip_tracker(spot)?.has_tip())
    }

    /// Set occupancy of every spot, row-major.
    ///
    /// Changes go through the spot trackers, so enabled trackers record them.
    pub fn set_tip_state(&mut self, rack: ResourceId, tips: &[bool], config: &EngineConfig) -> LhResult<()> {
        let spots = self.tip_rack_items(rack)?;
        if tips.len() != spots.len() {
            return Err(LhError::InvalidAddress {
                resource: self.name(rack)?.to_string(),
                address: format!("{} states for {} spots", tips.len(), spots.len()),
            });
        }
        let mut changed = Vec::new();
        for (spot, wanted) in spots.into_iter().zip(tips.iter().copied()) {
            let state = self.tip_spot_mut(spot)?;
            let tip = state.prototype.renamed(format!("{}_tip", state.tracker.thing()));
            match (state.tracker.has_tip(), wanted) {
                (true, false) => state.tracker.pick_up(&tip, None, config)?,
                (false, true) => state.tracker.drop(&tip, config)?,
                _ => continue,
            }
            changed.push(spot);
        }
        self.emit_state(&changed);
        Ok(())
    }

    /// Put a tip in every spot of a tip rack.
    pub fn fill(&mut self, rack: ResourceId, config: &EngineConfig) -> LhResult<()> {
        let count = self.tip_rack_items(rack)?.len();
        self.set_tip_state(rack, &vec![true; count], config)
    }

    /// Remove the tip from every spot of a tip rack.
    pub fn empty(&mut self, rack: ResourceId, config: &EngineConfig) -> LhResult<()> {
        let count = self.tip_rack_items(rack)?.len();
        self.set_tip_state(rack, &vec![false; count], config)
    }

    /// Seed used volumes of a plate's wells, row-major.
    pub fn set_volumes(&mut self, plate: ResourceId, volumes: &[f64], config: &EngineConfig) -> LhResult<()> {
        let wells = self.get_all_items(plate)?;
        if volumes.len() != wells.len() {
            return Err(LhError::InvalidAddress {
                resource: self.name(plate)?.to_string(),
                address: format!("{} volumes for {} wells", volumes.len(), wells.len()),
            });
        }
        for (well, volume) in wells.iter().zip(volumes) {
            self.volume_tracker_mut(*well)?.set_used_volume(*volume, config);
        }
        self.emit_state(&wells);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Resource, Tip};

    fn rack_tree() -> (ResourceTree, ResourceId) {
        let mut tree = ResourceTree::new(Resource::deck("deck", 1000.0, 600.0, 500.0)).unwrap();
        let tip = Tip::new("tip", false, 59.9, 300.0, 8.0);
        let rack = Resource::tip_rack("rack", 122.4, 82.6, 20.0, GridLayout::standard_96(), tip, true);
        let id = tree.assign_child(tree.root(), rack, Coordinate::ZERO, false).unwrap();
        (tree, id)
    }

    fn occupancy(tree: &ResourceTree, rack: ResourceId) -> Vec<bool> {
        tree.get_all_items(rack)
            .unwrap()
            .into_iter()
            .map(|s| tree.tip_tracker(s).unwrap().has_tip())
            .collect()
    }

    #[test]
    fn test_addresses() {
        let grid = Grid::new(12, 8);
        assert_eq!(grid.parse_address("A1"), Some((0, 0)));
        assert_eq!(grid.parse_address("h12"), Some((7, 11)));
        assert_eq!(grid.parse_address("I1"), None);
        assert_eq!(grid.parse_address("A13"), None);
        assert_eq!(grid.parse_address("A0"), None);
        assert_eq!(grid.parse_address("1A"), None);
        assert_eq!(grid.address_of(0), "A1");
        assert_eq!(grid.address_of(13), "B2");
        assert_eq!(grid.address_of(95), "H12");
        assert_eq!(row_letters(26), "AA");
    }

    #[test]
    fn test_ranges_resolve_row_major() {
        let grid = Grid::new(12, 8);
        let range = grid.resolve("plate", &"A1:B3".into()).unwrap();
        assert_eq!(range, vec![0, 1, 2, 12, 13, 14]);
        assert_eq!(grid.resolve("plate", &"B3:A1".into()).unwrap(), range);
        assert!(matches!(
            grid.resolve("plate", &ItemIdentifier::Index(96)),
            Err(LhError::ItemOutOfRange { index: 96, count: 96, .. })
        ));
        assert!(matches!(
            grid.resolve("plate", &"A1:Z9".into()),
            Err(LhError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_get_item_by_index_and_address() {
        let (tree, rack) = rack_tree();
        let by_index = tree.get_item(rack, 13usize).unwrap();
        let by_name = tree.get_item(rack, "B2").unwrap();
        assert_eq!(by_index, by_name);
        assert_eq!(tree.name(by_name).unwrap(), "rack_B2");
        assert!(tree.get_item(rack, "A1:A2").is_err());
        assert_eq!(tree.get_items(rack, "A1:H1").unwrap().len(), 8);
    }

    #[test]
    fn test_fill_empty_fill_matches_fill() {
        let config = EngineConfig::tracking();
        let (mut tree, rack) = rack_tree();
        tree.fill(rack, &config).unwrap();
        let once = occupancy(&tree, rack);

        tree.empty(rack, &config).unwrap();
        assert!(occupancy(&tree, rack).iter().all(|t| !t));
        tree.fill(rack, &config).unwrap();
        assert_eq!(occupancy(&tree, rack), once);
        assert!(once.iter().all(|t| *t));
    }

    #[test]
    fn test_set_tip_state_pattern() {
        let config = EngineConfig::tracking();
        let (mut tree, rack) = rack_tree();
        let pattern: Vec<bool> = (0..96).map(|i| i % 2 == 0).collect();
        tree.set_tip_state(rack, &pattern, &config).unwrap();
        assert_eq!(occupancy(&tree, rack), pattern);
        assert!(tree.has_tip(rack, "A1").unwrap());
        assert!(!tree.has_tip(rack, "A2").unwrap());
        assert!(tree.set_tip_state(rack, &[true], &config).is_err());
    }
}
