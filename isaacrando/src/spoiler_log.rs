use isaacrando_game::{ItemClassification, ItemPool, LocationCode, ProgressType};
use serde::{Deserialize, Serialize};

use crate::settings::RandomizerSettings;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerItem {
    pub name: String,
    pub classification: ItemClassification,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerLocation {
    pub name: String,
    pub code: LocationCode,
    pub region: String,
    pub progress_type: ProgressType,
    pub locked_item: Option<String>,
    // Reachable with only the starting character and default-owned items.
    pub reachable_at_start: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerLog {
    pub seed: usize,
    pub settings: RandomizerSettings,
    pub item_pool: Vec<SpoilerItem>,
    pub default_items: Vec<String>,
    pub locations: Vec<SpoilerLocation>,
    pub item_pools: Vec<ItemPool>,
}

impl SpoilerLog {
    pub fn num_progression_items(&self) -> usize {
        self.item_pool
            .iter()
            .filter(|x| x.classification.is_progression())
            .map(|x| x.count)
            .sum()
    }
}
