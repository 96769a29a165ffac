use anyhow::{bail, Context, Result};
use hashbrown::{HashMap, HashSet};
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::ToOwned;
use std::collections::VecDeque;
use std::hash::Hash;
use std::path::Path;
use strum_macros::{Display, EnumString, VariantNames};

pub type ItemIdx = usize; // Index into GameData.item_isv.keys: distinct item names
pub type RegionIdx = usize; // Index into GameData.region_isv.keys: distinct region names
pub type LocationIdx = usize; // Index into GameData.locations (after expanding repeated locations)
pub type ItemCode = u64; // Item ID shared with the game mod and the multiworld server
pub type LocationCode = u64; // Location ID shared with the game mod and the multiworld server
pub type InternalId = usize; // ID of an item inside the game (collectible, trinket or card number)

pub const MENU_REGION: &str = "Menu";
pub const VICTORY_ITEM: &str = "Victory";
pub const VICTORY_LOCATION: &str = "Victory";
pub const BABY_CATEGORY: &str = "Co-Op Baby";
pub const CHALLENGE_CATEGORY: &str = "Challenge";
pub const TRAP_CATEGORY: &str = "Trap";
pub const FILLER_CATEGORY: &str = "Filler";

// Categories of consumable cards, which the game keys as a single "Card" type:
const CARD_CATEGORIES: [&str; 6] = ["Tarot", "Suit", "Rune", "Reverse", "Special", "Object"];

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
pub enum ItemClassification {
    Progression,
    ProgressionSkipBalancing,
    Useful,
    Filler,
    Trap,
}

impl ItemClassification {
    pub fn is_progression(self) -> bool {
        matches!(
            self,
            ItemClassification::Progression | ItemClassification::ProgressionSkipBalancing
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub name: String,
    pub code: ItemCode,
    pub classification: ItemClassification,
    pub categories: Vec<String>,
    #[serde(default = "default_amount")]
    pub amount: usize,
    #[serde(default)]
    pub internal_id: Option<InternalId>,
    #[serde(default)]
    pub quality: Option<u8>,
    // Achievement that unlocks the item in the unmodified game; without one, the item starts unlocked.
    #[serde(default)]
    pub achievement: Option<String>,
}

fn default_amount() -> usize {
    1
}

impl ItemData {
    pub fn primary_category(&self) -> &str {
        self.categories.first().map(|x| x.as_str()).unwrap_or("")
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|x| x == category)
    }

    /// Key used by the game mod to track whether an item is unlocked.
    ///
    /// Items with an internal ID are keyed as `Category-InternalID` (all card-like
    /// categories collapse to `Card`); anything else is keyed by its name.
    pub fn state_key(&self) -> String {
        match self.internal_id {
            Some(id) => {
                let mut cat = self.primary_category();
                if CARD_CATEGORIES.contains(&cat) {
                    cat = "Card";
                }
                format!("{cat}-{id}")
            }
            None => self.name.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ProgressType {
    #[default]
    Default,
    // Only filler or trap items may be placed here.
    Excluded,
}

/// Access rule as written in the data files, referring to items and regions by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleSpec {
    Always(bool),
    Has {
        item: String,
        #[serde(default = "default_amount")]
        count: usize,
    },
    HasAll(Vec<String>),
    HasAny(Vec<String>),
    HasGroup {
        category: String,
        count: usize,
    },
    RegionReachable(String),
    And(Vec<RuleSpec>),
    Or(Vec<RuleSpec>),
}

/// Access rule resolved against the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    Free,
    Never,
    Has { item: ItemIdx, count: usize },
    HasAll(Vec<ItemIdx>),
    HasAny(Vec<ItemIdx>),
    // Total copies owned among a group of items; default-owned items do not count.
    HasGroup { items: Vec<ItemIdx>, count: usize },
    RegionReachable(RegionIdx),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
}

impl Requirement {
    pub fn always(value: bool) -> Requirement {
        if value {
            Requirement::Free
        } else {
            Requirement::Never
        }
    }

    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                return Requirement::Never;
            } else if let Requirement::Free = req {
                continue;
            } else if let Requirement::And(and_reqs) = req {
                out_reqs.extend(and_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.is_empty() {
            Requirement::Free
        } else if out_reqs.len() == 1 {
            out_reqs.pop().unwrap_or(Requirement::Free)
        } else {
            Requirement::And(out_reqs)
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                continue;
            } else if let Requirement::Free = req {
                return Requirement::Free;
            } else if let Requirement::Or(or_reqs) = req {
                out_reqs.extend(or_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.is_empty() {
            Requirement::Never
        } else if out_reqs.len() == 1 {
            out_reqs.pop().unwrap_or(Requirement::Never)
        } else {
            Requirement::Or(out_reqs)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub name: String,
    pub code: LocationCode,
    pub region: String,
    #[serde(default)]
    pub categories: Vec<String>,
    // Expands into `count` locations with repetitions 1..=count (milestone checks).
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub progress_type: ProgressType,
    #[serde(default)]
    pub requires: Option<RuleSpec>,
}

#[derive(Clone, Debug)]
pub struct LocationData {
    pub name: String,
    pub base_name: String,
    pub code: LocationCode,
    pub region_idx: RegionIdx,
    pub categories: Vec<String>,
    pub repetitions: usize,
    pub progress_type: ProgressType,
    pub requirement: Requirement,
}

impl LocationData {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|x| x == category)
    }
}

pub fn get_location_name(base_name: &str, repetitions: usize) -> String {
    if repetitions > 1 {
        format!("{base_name} ({repetitions}x)")
    } else {
        base_name.to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitRecord {
    pub to: String,
    #[serde(default)]
    pub requires: Option<RuleSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRecord {
    pub name: String,
    #[serde(default)]
    pub exits: Vec<ExitRecord>,
    // Applied to every exit leading into this region.
    #[serde(default)]
    pub entrance_requires: Option<RuleSpec>,
}

#[derive(Clone, Debug)]
pub struct RegionExit {
    pub to: RegionIdx,
    pub requirement: Requirement,
}

#[derive(Clone, Debug)]
pub struct RegionData {
    pub name: String,
    pub exits: Vec<RegionExit>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolEntryRecord {
    pub id: InternalId,
    pub weight: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemPoolRecord {
    pub name: String,
    pub items: Vec<PoolEntryRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub pool: String,
    pub internal_id: InternalId,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemPool {
    pub name: String,
    pub entries: Vec<PoolEntry>,
}

#[derive(Deserialize)]
struct ItemsFile {
    items: Vec<ItemData>,
}

#[derive(Deserialize)]
struct LocationsFile {
    locations: Vec<LocationRecord>,
}

#[derive(Deserialize)]
struct RegionsFile {
    regions: Vec<RegionRecord>,
}

#[derive(Deserialize)]
struct ItemPoolsFile {
    pools: Vec<ItemPoolRecord>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json_str = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let data = serde_json::from_str(&json_str)
        .with_context(|| format!("unable to parse {}", path.display()))?;
    Ok(data)
}

// Read-only template data, shared by all generation runs:
#[derive(Clone, Debug)]
pub struct GameData {
    pub item_isv: IndexedVec<String>,
    pub items: Vec<ItemData>, // Corresponds to item_isv.keys
    pub region_isv: IndexedVec<String>,
    pub regions: Vec<RegionData>, // Corresponds to region_isv.keys
    pub locations: Vec<LocationData>,
    pub location_idx_by_name: HashMap<String, LocationIdx>,
    pub item_pools: Vec<ItemPool>,
    pub trap_items: Vec<ItemIdx>,
    pub filler_items: Vec<ItemIdx>,
    pub victory_item_idx: ItemIdx,
    pub menu_region_idx: RegionIdx,
}

impl GameData {
    pub fn load(data_path: &Path) -> Result<GameData> {
        let items: ItemsFile = read_json(&data_path.join("items.json"))?;
        let locations: LocationsFile = read_json(&data_path.join("locations.json"))?;
        let regions: RegionsFile = read_json(&data_path.join("regions.json"))?;
        let item_pools: ItemPoolsFile = read_json(&data_path.join("item_pools.json"))?;
        let game_data = GameData::new(
            items.items,
            locations.locations,
            regions.regions,
            item_pools.pools,
        )
        .with_context(|| format!("invalid game data in {}", data_path.display()))?;
        info!(
            "Loaded {} items, {} locations, {} regions, {} item pools",
            game_data.items.len(),
            game_data.locations.len(),
            game_data.regions.len(),
            game_data.item_pools.len()
        );
        Ok(game_data)
    }

    pub fn new(
        items: Vec<ItemData>,
        locations: Vec<LocationRecord>,
        regions: Vec<RegionRecord>,
        item_pools: Vec<ItemPoolRecord>,
    ) -> Result<GameData> {
        let mut game_data = GameData {
            item_isv: IndexedVec::default(),
            items: vec![],
            region_isv: IndexedVec::default(),
            regions: vec![],
            locations: vec![],
            location_idx_by_name: HashMap::new(),
            item_pools: vec![],
            trap_items: vec![],
            filler_items: vec![],
            victory_item_idx: 0,
            menu_region_idx: 0,
        };
        game_data.load_items(items)?;
        game_data.load_regions(regions)?;
        game_data.load_locations(locations)?;
        game_data.load_item_pools(item_pools)?;
        game_data.check_connectivity()?;
        Ok(game_data)
    }

    fn load_items(&mut self, items: Vec<ItemData>) -> Result<()> {
        let mut codes: HashSet<ItemCode> = HashSet::new();
        for item in items {
            if self.item_isv.index_by_key.contains_key(&item.name) {
                bail!("Duplicate item name: {}", item.name);
            }
            if !codes.insert(item.code) {
                bail!("Duplicate item code {} for item {}", item.code, item.name);
            }
            if item.categories.is_empty() {
                bail!("Item {} has no categories", item.name);
            }
            let idx = self.item_isv.add(&item.name);
            match item.primary_category() {
                TRAP_CATEGORY => self.trap_items.push(idx),
                FILLER_CATEGORY => self.filler_items.push(idx),
                _ => {}
            }
            self.items.push(item);
        }
        if self.trap_items.is_empty() || self.filler_items.is_empty() {
            bail!("Item table must contain at least one trap item and one filler item");
        }
        self.victory_item_idx = self.item_idx(VICTORY_ITEM)?;
        Ok(())
    }

    fn load_regions(&mut self, regions: Vec<RegionRecord>) -> Result<()> {
        // Register all names first, since exits may refer to regions declared later:
        for region in &regions {
            if self.region_isv.index_by_key.contains_key(&region.name) {
                bail!("Duplicate region name: {}", region.name);
            }
            self.region_isv.add(&region.name);
        }
        self.menu_region_idx = self.region_idx(MENU_REGION)?;

        let mut entrance_reqs: Vec<Requirement> = Vec::with_capacity(regions.len());
        for region in &regions {
            let req = match &region.entrance_requires {
                Some(spec) => self
                    .resolve_rule(spec)
                    .with_context(|| format!("Entrance rule of region {}", region.name))?,
                None => Requirement::Free,
            };
            entrance_reqs.push(req);
        }

        for region in &regions {
            let mut exits: Vec<RegionExit> = vec![];
            for exit in &region.exits {
                let to = self
                    .region_idx(&exit.to)
                    .with_context(|| format!("Exit from region {}", region.name))?;
                let exit_req = match &exit.requires {
                    Some(spec) => self.resolve_rule(spec).with_context(|| {
                        format!("Exit rule from {} to {}", region.name, exit.to)
                    })?,
                    None => Requirement::Free,
                };
                exits.push(RegionExit {
                    to,
                    requirement: Requirement::make_and(vec![exit_req, entrance_reqs[to].clone()]),
                });
            }
            self.regions.push(RegionData {
                name: region.name.clone(),
                exits,
            });
        }
        Ok(())
    }

    fn load_locations(&mut self, locations: Vec<LocationRecord>) -> Result<()> {
        let mut codes: HashSet<LocationCode> = HashSet::new();
        for record in locations {
            let region_idx = self
                .region_idx(&record.region)
                .with_context(|| format!("Location {}", record.name))?;
            let requirement = match &record.requires {
                Some(spec) => self
                    .resolve_rule(spec)
                    .with_context(|| format!("Access rule of location {}", record.name))?,
                None => Requirement::Free,
            };
            let count = record.count.unwrap_or(1);
            if count == 0 {
                bail!("Location {} has a count of zero", record.name);
            }
            for repetitions in 1..=count {
                let name = get_location_name(&record.name, repetitions);
                let code = record.code + (repetitions - 1) as LocationCode;
                if self.location_idx_by_name.contains_key(&name) {
                    bail!("Duplicate location name: {name}");
                }
                if !codes.insert(code) {
                    bail!("Duplicate location code {code} for location {name}");
                }
                self.location_idx_by_name
                    .insert(name.clone(), self.locations.len());
                self.locations.push(LocationData {
                    name,
                    base_name: record.name.clone(),
                    code,
                    region_idx,
                    categories: record.categories.clone(),
                    repetitions,
                    progress_type: record.progress_type,
                    requirement: requirement.clone(),
                });
            }
        }
        self.location_idx(VICTORY_LOCATION)?;
        Ok(())
    }

    fn load_item_pools(&mut self, item_pools: Vec<ItemPoolRecord>) -> Result<()> {
        let mut names: HashSet<String> = HashSet::new();
        for record in item_pools {
            if !names.insert(record.name.clone()) {
                bail!("Duplicate item pool name: {}", record.name);
            }
            let mut seen: HashSet<InternalId> = HashSet::new();
            let mut entries: Vec<PoolEntry> = vec![];
            for entry in record.items {
                if !seen.insert(entry.id) {
                    bail!("Item {} appears twice in item pool {}", entry.id, record.name);
                }
                if !(entry.weight > 0.0) {
                    bail!(
                        "Item {} in item pool {} has non-positive weight {}",
                        entry.id,
                        record.name,
                        entry.weight
                    );
                }
                entries.push(PoolEntry {
                    pool: record.name.clone(),
                    internal_id: entry.id,
                    weight: entry.weight,
                });
            }
            self.item_pools.push(ItemPool {
                name: record.name,
                entries,
            });
        }
        Ok(())
    }

    // Every region must be reachable from Menu when all rules are ignored.
    fn check_connectivity(&self) -> Result<()> {
        let mut visited = vec![false; self.regions.len()];
        let mut queue: VecDeque<RegionIdx> = VecDeque::new();
        visited[self.menu_region_idx] = true;
        queue.push_back(self.menu_region_idx);
        while let Some(src) = queue.pop_front() {
            for exit in &self.regions[src].exits {
                if !visited[exit.to] {
                    visited[exit.to] = true;
                    queue.push_back(exit.to);
                }
            }
        }
        let unreachable: Vec<&str> = self
            .regions
            .iter()
            .zip(visited.iter())
            .filter(|(_, &v)| !v)
            .map(|(r, _)| r.name.as_str())
            .collect();
        if !unreachable.is_empty() {
            bail!("Regions not connected to {MENU_REGION}: {:?}", unreachable);
        }
        Ok(())
    }

    pub fn item_idx(&self, name: &str) -> Result<ItemIdx> {
        self.item_isv
            .index_by_key
            .get(name)
            .copied()
            .with_context(|| format!("Unknown item: {name}"))
    }

    pub fn region_idx(&self, name: &str) -> Result<RegionIdx> {
        self.region_isv
            .index_by_key
            .get(name)
            .copied()
            .with_context(|| format!("Unknown region: {name}"))
    }

    pub fn location_idx(&self, name: &str) -> Result<LocationIdx> {
        self.location_idx_by_name
            .get(name)
            .copied()
            .with_context(|| format!("Unknown location: {name}"))
    }

    pub fn items_in_category(&self, category: &str) -> Vec<ItemIdx> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.has_category(category))
            .map(|(i, _)| i)
            .collect()
    }

    /// Highest repetition count among the locations sharing a base name (0 if there are none).
    pub fn max_repetitions(&self, base_name: &str) -> usize {
        self.locations
            .iter()
            .filter(|x| x.base_name == base_name)
            .map(|x| x.repetitions)
            .max()
            .unwrap_or(0)
    }

    pub fn resolve_rule(&self, spec: &RuleSpec) -> Result<Requirement> {
        let resolve_items = |names: &[String]| -> Result<Vec<ItemIdx>> {
            names.iter().map(|x| self.item_idx(x)).collect()
        };
        Ok(match spec {
            RuleSpec::Always(value) => Requirement::always(*value),
            RuleSpec::Has { item, count } => Requirement::Has {
                item: self.item_idx(item)?,
                count: *count,
            },
            RuleSpec::HasAll(items) => Requirement::HasAll(resolve_items(items)?),
            RuleSpec::HasAny(items) => Requirement::HasAny(resolve_items(items)?),
            RuleSpec::HasGroup { category, count } => {
                let items = self.items_in_category(category);
                if items.is_empty() {
                    bail!("Unknown item category: {category}");
                }
                Requirement::HasGroup {
                    items,
                    count: *count,
                }
            }
            RuleSpec::RegionReachable(region) => {
                Requirement::RegionReachable(self.region_idx(region)?)
            }
            RuleSpec::And(specs) => Requirement::make_and(
                specs
                    .iter()
                    .map(|x| self.resolve_rule(x))
                    .collect::<Result<Vec<_>>>()?,
            ),
            RuleSpec::Or(specs) => Requirement::make_or(
                specs
                    .iter()
                    .map(|x| self.resolve_rule(x))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}
