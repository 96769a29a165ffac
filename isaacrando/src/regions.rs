use anyhow::{bail, Context, Result};
use isaacrando_game::{
    GameData, ItemIdx, LocationCode, ProgressType, RegionData, RegionExit, RegionIdx,
    Requirement, BABY_CATEGORY, CHALLENGE_CATEGORY, VICTORY_LOCATION,
};
use log::info;

use crate::settings::{
    GameMode, IncludeChallenges, IncludeGreedMode, RandomizerSettings, CONSUMABLE_LOCATION,
    GREED_DONATION_LOCATION, SHOP_DONATION_LOCATION,
};

const GREED_MODE_REGION: &str = "Greed Mode";
const GREEDIER_MODE_REGION: &str = "Greedier Mode";
const ALL_MARKS_CATEGORY: &str = "All Marks";

#[derive(Clone, Debug)]
pub struct Location {
    pub name: String,
    pub base_name: String,
    pub code: LocationCode,
    pub region_idx: RegionIdx,
    pub categories: Vec<String>,
    pub repetitions: usize,
    pub progress_type: ProgressType,
    pub requirement: Requirement,
    // Item fixed in place before filling (the Victory marker).
    pub locked_item: Option<ItemIdx>,
}

impl Location {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|x| x == category)
    }

    pub fn is_fillable(&self) -> bool {
        self.locked_item.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct Region {
    pub name: String,
    pub exits: Vec<RegionExit>,
    pub location_idxs: Vec<usize>, // Indices into RegionGraph.locations
}

/// Regions, exits and the locations attached to them, for a single generation run.
#[derive(Clone, Debug)]
pub struct RegionGraph {
    pub regions: Vec<Region>,
    pub locations: Vec<Location>,
    pub root: RegionIdx,
}

impl RegionGraph {
    pub fn from_parts(
        regions: Vec<RegionData>,
        locations: Vec<Location>,
        root: RegionIdx,
    ) -> Result<RegionGraph> {
        if root >= regions.len() {
            bail!("Root region index {root} out of range");
        }
        let num_regions = regions.len();
        let mut out_regions: Vec<Region> = Vec::with_capacity(num_regions);
        for region in regions {
            for exit in &region.exits {
                if exit.to >= num_regions {
                    bail!("Exit from region {} leads to unknown region", region.name);
                }
            }
            out_regions.push(Region {
                name: region.name,
                exits: region.exits,
                location_idxs: vec![],
            });
        }
        for (i, loc) in locations.iter().enumerate() {
            let region = out_regions
                .get_mut(loc.region_idx)
                .with_context(|| format!("Location {} is in an unknown region", loc.name))?;
            region.location_idxs.push(i);
        }
        Ok(RegionGraph {
            regions: out_regions,
            locations,
            root,
        })
    }

    pub fn build(game_data: &GameData, settings: &RandomizerSettings) -> Result<RegionGraph> {
        let greed_mode_idx = game_data.region_idx(GREED_MODE_REGION)?;
        let greedier_mode_idx = game_data.region_idx(GREEDIER_MODE_REGION)?;
        let victory_idx = game_data.location_idx(VICTORY_LOCATION)?;

        let mut locations: Vec<Location> = game_data
            .locations
            .iter()
            .map(|x| Location {
                name: x.name.clone(),
                base_name: x.base_name.clone(),
                code: x.code,
                region_idx: x.region_idx,
                categories: x.categories.clone(),
                repetitions: x.repetitions,
                progress_type: x.progress_type,
                requirement: x.requirement.clone(),
                locked_item: None,
            })
            .collect();

        if settings.game_mode == GameMode::BabyHunt {
            locations[victory_idx].requirement = Requirement::HasGroup {
                items: game_data.items_in_category(BABY_CATEGORY),
                count: settings.required_babies(),
            };
        }
        locations[victory_idx].locked_item = Some(game_data.victory_item_idx);

        let mut removed = vec![false; locations.len()];
        let greed = settings.include_greed_mode;
        for (i, loc) in locations.iter_mut().enumerate() {
            if loc.has_category(CHALLENGE_CATEGORY) {
                match settings.include_challenges {
                    IncludeChallenges::Include => {}
                    IncludeChallenges::Exclude => loc.progress_type = ProgressType::Excluded,
                    IncludeChallenges::Remove => removed[i] = true,
                }
            }

            let in_greed = loc.region_idx == greed_mode_idx;
            let in_greedier = loc.region_idx == greedier_mode_idx;
            if greed != IncludeGreedMode::GreedAndGreedier
                && (in_greed || in_greedier || loc.has_category(ALL_MARKS_CATEGORY))
            {
                if in_greed && greed == IncludeGreedMode::GreedModeOnly {
                    continue;
                }
                if in_greedier && greed == IncludeGreedMode::GreedierModeOnly {
                    continue;
                }
                loc.progress_type = ProgressType::Excluded;
            }
        }

        for (base_name, keep) in [
            (SHOP_DONATION_LOCATION, settings.shop_donations),
            (GREED_DONATION_LOCATION, settings.greed_donations),
            (CONSUMABLE_LOCATION, settings.consumable_locations),
        ] {
            for (i, loc) in locations.iter().enumerate() {
                if loc.base_name == base_name && loc.repetitions > keep {
                    removed[i] = true;
                }
            }
        }

        let locations: Vec<Location> = locations
            .into_iter()
            .zip(removed)
            .filter(|(_, r)| !r)
            .map(|(loc, _)| loc)
            .collect();
        let graph = RegionGraph::from_parts(
            game_data.regions.clone(),
            locations,
            game_data.menu_region_idx,
        )?;
        info!(
            "Region graph: {} regions, {} locations ({} fillable, {} excluded)",
            graph.regions.len(),
            graph.locations.len(),
            graph.fillable_location_count(),
            graph
                .locations
                .iter()
                .filter(|x| x.progress_type == ProgressType::Excluded)
                .count()
        );
        Ok(graph)
    }

    /// Locations that still need an item from the pool.
    pub fn fillable_location_count(&self) -> usize {
        self.locations.iter().filter(|x| x.is_fillable()).count()
    }

    /// Fillable locations that may hold progression items.
    pub fn included_location_count(&self) -> usize {
        self.locations
            .iter()
            .filter(|x| x.is_fillable() && x.progress_type == ProgressType::Default)
            .count()
    }

    pub fn location_idx(&self, name: &str) -> Result<usize> {
        self.locations
            .iter()
            .position(|x| x.name == name)
            .with_context(|| format!("Unknown location: {name}"))
    }

    pub fn region_idx(&self, name: &str) -> Result<RegionIdx> {
        self.regions
            .iter()
            .position(|x| x.name == name)
            .with_context(|| format!("Unknown region: {name}"))
    }
}
