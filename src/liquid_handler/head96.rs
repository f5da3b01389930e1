//! 96-head operations.
//!
//! The head is one rigid unit: reachability is checked once, at the first
//! grid position, before anything per position. Positions then go through
//! the same queue-all, commit-all discipline as independent channels.

use super::channels::Head96;
use super::operations::{check_volume, queue_transfer, Direction};
use super::{LiquidHandler, LiquidTarget, TrackerRef};
use crate::coordinate::Coordinate;
use crate::error::{LhError, LhResult};
use crate::resources::{ResourceId, ResourceKind, Tip};
use crate::standard::{HeadLiquid, HeadTips, Operation};
use crate::validation::BackendParams;

impl LiquidHandler {
    /// Items of a 96-item resource, row-major.
    fn items96(&self, id: ResourceId) -> LhResult<Vec<ResourceId>> {
        let grid = self.tree.grid(id)?;
        let head_grid = self.head96_ref()?.grid();
        if grid != head_grid {
            return Err(LhError::InvalidAddress {
                resource: self.tree.name(id)?.to_string(),
                address: format!(
                    "{}x{} grid does not match the {}x{} head",
                    grid.num_items_y, grid.num_items_x, head_grid.num_items_y, head_grid.num_items_x
                ),
            });
        }
        let items = self.tree.get_all_items(id)?;
        if items.len() != Head96::POSITIONS {
            return Err(LhError::ItemOutOfRange {
                resource: self.tree.name(id)?.to_string(),
                index: items.len(),
                count: Head96::POSITIONS,
            });
        }
        Ok(items)
    }

    fn tip_rack96(&self, rack: ResourceId) -> LhResult<Vec<ResourceId>> {
        let node = self.tree.node(rack)?;
        if !matches!(node.kind(), ResourceKind::TipRack(_)) {
            return Err(LhError::WrongResourceKind {
                resource: node.name().to_string(),
                expected: "TipRack",
                actual: node.kind().type_name(),
            });
        }
        self.items96(rack)
    }

    /// Pick up a full rack of tips with the 96 head.
    pub async fn pick_up_tips96(
        &mut self,
        rack: ResourceId,
        offset: Coordinate,
        params: &BackendParams,
    ) -> LhResult<()> {
        const OPERATION: &str = "pick_up_tips96";
        let spots = self.tip_rack96(rack)?;
        let location = self.reach(None, spots[0])?;
        self.check_legality(OPERATION, None, params)?;

        let mut tips = Vec::with_capacity(Head96::POSITIONS);
        let mut origins = Vec::with_capacity(Head96::POSITIONS);
        for spot in &spots {
            tips.push(self.spot_tip(*spot)?);
            origins.push(self.tree.name(*spot)?.to_string());
        }

        self.run_batch(|lh, batch| {
            for (i, spot) in spots.iter().enumerate() {
                lh.tree
                    .tip_tracker_mut(*spot)?
                    .queue_pick_up(&tips[i], None, &lh.config)?;
                batch.touch(TrackerRef::Resource(*spot));
                let config = lh.config.clone();
                lh.head96_mut()?.position_mut(i)?.tips.queue_pick_up(
                    &tips[i],
                    Some(&origins[i]),
                    &config,
                )?;
                batch.touch(TrackerRef::Head96(i));
            }
            Ok(())
        })?;

        let operation = Operation::PickUpTips96(HeadTips {
            resource_name: self.tree.name(rack)?.to_string(),
            location,
            offset,
            tips,
        });
        self.dispatch(operation, params).await
    }

    /// Drop every tip on the 96 head into a tip rack or a trash.
    pub async fn drop_tips96(
        &mut self,
        target: ResourceId,
        offset: Coordinate,
        params: &BackendParams,
    ) -> LhResult<()> {
        const OPERATION: &str = "drop_tips96";
        self.head96_ref()?;
        let spots = match self.tree.node(target)?.kind() {
            ResourceKind::Trash => None,
            _ => Some(self.tip_rack96(target)?),
        };
        let anchor = spots.as_ref().map_or(target, |s| s[0]);
        let location = self.reach(None, anchor)?;
        self.check_legality(OPERATION, None, params)?;

        let mut tips = Vec::with_capacity(Head96::POSITIONS);
        for i in 0..Head96::POSITIONS {
            let position = self.head96_ref()?.position(i)?;
            let tip = match (position.tip_with_liquid(), &spots) {
                (Some(tip), _) => tip,
                (None, Some(spots)) => self.spot_tip(spots[i])?,
                (None, None) => position.require_tip()?,
            };
            tips.push(tip);
        }

        self.run_batch(|lh, batch| {
            let config = lh.config.clone();
            for (i, tip) in tips.iter().enumerate() {
                lh.head96_mut()?
                    .position_mut(i)?
                    .tips
                    .queue_drop(tip, &config)?;
                batch.touch(TrackerRef::Head96(i));
                if let Some(spots) = &spots {
                    lh.tree.tip_tracker_mut(spots[i])?.queue_drop(tip, &config)?;
                    batch.touch(TrackerRef::Resource(spots[i]));
                }
            }
            Ok(())
        })?;

        let operation = Operation::DropTips96(HeadTips {
            resource_name: self.tree.name(target)?.to_string(),
            location,
            offset,
            tips,
        });
        self.dispatch(operation, params).await
    }

    /// Put the 96 head's tips back into the rack they came from.
    pub async fn return_tips96(&mut self, params: &BackendParams) -> LhResult<()> {
        let origin = self
            .head96_ref()?
            .position(0)?
            .origin()
            .ok_or(LhError::NoTipToReturn(0))?
            .to_string();
        let spot = self.tree.get(&origin)?;
        let rack = self
            .tree
            .parent(spot)?
            .ok_or_else(|| LhError::NotAssigned(origin.clone()))?;
        self.drop_tips96(rack, Coordinate::ZERO, params).await
    }

    /// Aspirate with all 96 positions from a 96 plate or a single container.
    pub async fn aspirate96(&mut self, target: &LiquidTarget, params: &BackendParams) -> LhResult<()> {
        self.transfer96(Direction::Aspirate, target, params).await
    }

    /// Dispense with all 96 positions into a 96 plate or a single container.
    pub async fn dispense96(&mut self, target: &LiquidTarget, params: &BackendParams) -> LhResult<()> {
        self.transfer96(Direction::Dispense, target, params).await
    }

    async fn transfer96(
        &mut self,
        direction: Direction,
        target: &LiquidTarget,
        params: &BackendParams,
    ) -> LhResult<()> {
        let operation = direction.name(true);
        self.head96_ref()?;
        check_volume(target.volume)?;
        let containers = if self.tree.node(target.resource)?.kind().is_container() {
            vec![target.resource; Head96::POSITIONS]
        } else {
            self.items96(target.resource)?
        };
        let location = self.reach(None, containers[0])?;
        self.check_legality(operation, None, params)?;

        let mut tips: Vec<Tip> = Vec::with_capacity(Head96::POSITIONS);
        for position in self.head96_ref()?.iter() {
            tips.push(position.require_tip()?);
        }
        for container in &containers {
            self.tree.volume_tracker(*container)?;
        }

        self.run_batch(|lh, batch| {
            for (i, container) in containers.iter().enumerate() {
                let tip = TrackerRef::Head96Liquid(i);
                queue_transfer(lh, batch, direction, *container, tip, target.volume)?;
            }
            Ok(())
        })?;

        let resource_names = if containers.iter().all(|c| *c == containers[0]) {
            vec![self.tree.name(containers[0])?.to_string()]
        } else {
            containers
                .iter()
                .map(|c| self.tree.name(*c).map(str::to_string))
                .collect::<LhResult<Vec<_>>>()?
        };
        let liquid = HeadLiquid {
            resource_names,
            location,
            offset: target.offset,
            tips,
            volume: target.volume,
            flow_rate: target.flow_rate,
            liquid_height: target.liquid_height,
            blow_out_air_volume: target.blow_out_air_volume,
        };
        let operation = match direction {
            Direction::Aspirate => Operation::Aspirate96(liquid),
            Direction::Dispense => Operation::Dispense96(liquid),
        };
        self.dispatch(operation, params).await
    }
}
