pub mod pool_rando;

use anyhow::{bail, Context, Result};
use hashbrown::HashSet;
use isaacrando_game::{
    GameData, ItemClassification, ItemCode, ItemIdx, ItemPool, BABY_CATEGORY, CHALLENGE_CATEGORY,
    FILLER_CATEGORY, TRAP_CATEGORY, VICTORY_ITEM,
};
use isaacrando_logic::{CollectionState, DefaultItems};
use log::{debug, info};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    regions::RegionGraph,
    settings::{GameMode, IncludeChallenges, RandomizerSettings},
    spoiler_log::{SpoilerItem, SpoilerLocation, SpoilerLog},
    traverse::Traverser,
};
use pool_rando::shuffle_item_pools;

// Probability that a top-up slot receives a trap rather than plain filler.
const TRAP_PROBABILITY: f64 = 0.25;

/// Item multiset produced for a single generation run, indexed by ItemIdx.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedPool {
    pub counts: Vec<usize>,
    // Per-run copy of the catalog classifications, after promotions and demotions.
    pub classifications: Vec<ItemClassification>,
}

impl GeneratedPool {
    fn new(classifications: Vec<ItemClassification>) -> Self {
        GeneratedPool {
            counts: vec![0; classifications.len()],
            classifications,
        }
    }

    fn add(&mut self, item: ItemIdx, count: usize) {
        self.counts[item] += count;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn count(&self, item: ItemIdx) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }

    pub fn progression_count(&self) -> usize {
        self.counts
            .iter()
            .zip(self.classifications.iter())
            .filter(|(_, cls)| cls.is_progression())
            .map(|(&cnt, _)| cnt)
            .sum()
    }

    /// Items with a positive count, in catalog order.
    pub fn items(&self) -> Vec<(ItemIdx, usize)> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &cnt)| cnt > 0)
            .map(|(i, &cnt)| (i, cnt))
            .collect()
    }
}

fn is_pool_candidate(game_data: &GameData, item: ItemIdx) -> bool {
    !matches!(
        game_data.items[item].primary_category(),
        VICTORY_ITEM | TRAP_CATEGORY | FILLER_CATEGORY
    )
}

/// Builds the item multiset for a run. The total count always equals `location_count`.
pub fn generate_item_pool<R: Rng>(
    game_data: &GameData,
    location_count: usize,
    included_location_count: usize,
    excluded_items: &[&str],
    settings: &RandomizerSettings,
    rng: &mut R,
) -> Result<GeneratedPool> {
    if location_count == 0 {
        bail!("No fillable locations");
    }
    let mut classifications: Vec<ItemClassification> = game_data
        .items
        .iter()
        .map(|x| x.classification)
        .collect();

    if settings.game_mode == GameMode::BabyHunt {
        let mut babies = game_data.items_in_category(BABY_CATEGORY);
        babies.shuffle(rng);
        for &baby in babies.iter().take(settings.max_babies) {
            classifications[baby] = ItemClassification::ProgressionSkipBalancing;
        }
    }

    if settings.include_challenges == IncludeChallenges::Remove {
        for item in game_data.items_in_category(CHALLENGE_CATEGORY) {
            classifications[item] = ItemClassification::Filler;
        }
    }

    let excluded: HashSet<ItemIdx> = excluded_items
        .iter()
        .map(|x| game_data.item_idx(x))
        .collect::<Result<_>>()?;
    let filtered: Vec<ItemIdx> = (0..game_data.items.len())
        .filter(|i| !excluded.contains(i) && is_pool_candidate(game_data, *i))
        .collect();

    let mut pool = GeneratedPool::new(classifications);
    let mandatory: Vec<ItemIdx> = filtered
        .iter()
        .copied()
        .filter(|&i| pool.classifications[i].is_progression())
        .collect();
    let mandatory_count: usize = mandatory.iter().map(|&i| game_data.items[i].amount).sum();
    if mandatory_count > location_count {
        bail!(
            "Configuration requires {mandatory_count} progression items but only {location_count} locations are fillable"
        );
    }
    // Progression items may not be placed at excluded locations.
    if mandatory_count > included_location_count {
        bail!(
            "Configuration requires {mandatory_count} progression items but only {included_location_count} locations may hold progression"
        );
    }
    for &item in &mandatory {
        pool.add(item, game_data.items[item].amount);
    }
    let mut remaining = location_count - mandatory_count;
    let mut remaining_included = included_location_count - mandatory_count;

    let mut shuffle_items: Vec<ItemIdx> = filtered
        .iter()
        .copied()
        .filter(|&i| {
            let item = &game_data.items[i];
            pool.classifications[i] == ItemClassification::Filler
                && !item.has_category(BABY_CATEGORY)
                && (settings.lock_all_items || item.achievement.is_some())
        })
        .collect();

    // Promote some high-quality items so they count as progression.
    let higher_tier: Vec<ItemIdx> = shuffle_items
        .iter()
        .copied()
        .filter(|&i| game_data.items[i].quality.is_some_and(|q| q >= 3))
        .collect();
    let num_promote = included_location_count / 4;
    let promoted: Vec<ItemIdx> = higher_tier
        .choose_multiple(rng, num_promote)
        .copied()
        .collect();
    for item in promoted {
        let Some(pos) = shuffle_items.iter().position(|&x| x == item) else {
            continue;
        };
        let amount = game_data.items[item].amount;
        if amount > remaining.min(remaining_included) {
            debug!(
                "Skipping promotion of {}: no room left",
                game_data.items[item].name
            );
            continue;
        }
        shuffle_items.remove(pos);
        pool.classifications[item] = ItemClassification::Progression;
        pool.add(item, amount);
        remaining -= amount;
        remaining_included -= amount;
    }

    shuffle_items.shuffle(rng);
    for &item in &shuffle_items {
        if remaining == 0 {
            break;
        }
        let amount = game_data.items[item].amount;
        if amount == 0 || amount > remaining {
            continue;
        }
        pool.add(item, amount);
        remaining -= amount;
    }

    let mut num_traps = 0;
    let mut num_filler = 0;
    while remaining > 0 {
        let item = if rng.gen_bool(TRAP_PROBABILITY) {
            num_traps += 1;
            game_data.trap_items.choose(rng)
        } else {
            num_filler += 1;
            game_data.filler_items.choose(rng)
        };
        let item = *item.context("Item table has no trap or filler items")?;
        pool.add(item, 1);
        remaining -= 1;
    }

    info!(
        "Item pool: {} items ({} progression, {} top-up filler, {} traps)",
        pool.total(),
        pool.progression_count(),
        num_filler,
        num_traps
    );
    Ok(pool)
}

/// Items owned from the start of a run: the starting character, plus every catalog
/// item that could have been placed but was left out of the pool.
pub fn get_default_items(
    game_data: &GameData,
    pool: &GeneratedPool,
    starting_character: ItemIdx,
) -> DefaultItems {
    let mut default_items = DefaultItems::none(game_data.items.len());
    default_items.insert(starting_character);
    for item in 0..game_data.items.len() {
        if is_pool_candidate(game_data, item) && pool.count(item) == 0 {
            default_items.insert(item);
        }
    }
    default_items
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStateEntry {
    pub key: String,
    pub locked: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemKeyEntry {
    pub code: ItemCode,
    pub key: String,
}

#[derive(Clone, Debug)]
pub struct Randomization {
    pub seed: usize,
    pub settings: RandomizerSettings,
    pub item_pool: GeneratedPool,
    pub default_items: DefaultItems,
    pub item_pools: Vec<ItemPool>,
    // Unlock state the game mod starts from, by item key.
    pub item_state: Vec<ItemStateEntry>,
    pub item_keys: Vec<ItemKeyEntry>,
}

pub struct Randomizer<'a> {
    pub game_data: &'a GameData,
    pub settings: &'a RandomizerSettings,
    pub graph: RegionGraph,
}

impl<'a> Randomizer<'a> {
    pub fn new(game_data: &'a GameData, settings: &'a RandomizerSettings) -> Result<Self> {
        settings.validate(game_data)?;
        let graph = RegionGraph::build(game_data, settings)?;
        Ok(Randomizer {
            game_data,
            settings,
            graph,
        })
    }

    fn get_item_state(&self, default_items: &DefaultItems) -> Vec<ItemStateEntry> {
        (0..self.game_data.items.len())
            .filter(|&i| is_pool_candidate(self.game_data, i))
            .map(|i| ItemStateEntry {
                key: self.game_data.items[i].state_key(),
                locked: !default_items.contains(i),
            })
            .collect()
    }

    fn get_item_keys(&self) -> Vec<ItemKeyEntry> {
        self.game_data
            .items
            .iter()
            .map(|x| ItemKeyEntry {
                code: x.code,
                key: x.state_key(),
            })
            .collect()
    }

    fn get_spoiler_log(
        &self,
        seed: usize,
        pool: &GeneratedPool,
        default_items: &DefaultItems,
        item_pools: &[ItemPool],
    ) -> SpoilerLog {
        let traverser = Traverser::new(&self.graph, default_items);
        let start_state = CollectionState::for_game(self.game_data);
        let reachable_at_start: HashSet<usize> = traverser
            .reachable_locations(&start_state)
            .into_iter()
            .collect();
        SpoilerLog {
            seed,
            settings: self.settings.clone(),
            item_pool: pool
                .items()
                .into_iter()
                .map(|(i, count)| SpoilerItem {
                    name: self.game_data.items[i].name.clone(),
                    classification: pool.classifications[i],
                    count,
                })
                .collect(),
            default_items: (0..self.game_data.items.len())
                .filter(|&i| default_items.contains(i))
                .map(|i| self.game_data.items[i].name.clone())
                .collect(),
            locations: self
                .graph
                .locations
                .iter()
                .enumerate()
                .map(|(i, loc)| SpoilerLocation {
                    name: loc.name.clone(),
                    code: loc.code,
                    region: self.graph.regions[loc.region_idx].name.clone(),
                    progress_type: loc.progress_type,
                    locked_item: loc
                        .locked_item
                        .map(|x| self.game_data.items[x].name.clone()),
                    reachable_at_start: reachable_at_start.contains(&i),
                })
                .collect(),
            item_pools: item_pools.to_vec(),
        }
    }

    pub fn randomize(&self, seed: usize) -> Result<(Randomization, SpoilerLog)> {
        let mut rng_seed = [0u8; 32];
        rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
        let mut rng = rand::rngs::StdRng::from_seed(rng_seed);

        let starting_character_name = self.settings.starting_character.item_name();
        let starting_character = self.game_data.item_idx(starting_character_name)?;
        let pool = generate_item_pool(
            self.game_data,
            self.graph.fillable_location_count(),
            self.graph.included_location_count(),
            &[starting_character_name, VICTORY_ITEM],
            self.settings,
            &mut rng,
        )?;
        if pool.total() != self.graph.fillable_location_count() {
            bail!(
                "[seed {seed}] Item pool has {} items for {} locations",
                pool.total(),
                self.graph.fillable_location_count()
            );
        }
        if pool.progression_count() > self.graph.included_location_count() {
            bail!(
                "[seed {seed}] Item pool has {} progression items for {} non-excluded locations",
                pool.progression_count(),
                self.graph.included_location_count()
            );
        }
        let default_items = get_default_items(self.game_data, &pool, starting_character);
        let item_pools = shuffle_item_pools(self.game_data, self.settings.pool_rando, &mut rng)?;

        let traverser = Traverser::new(&self.graph, &default_items);
        let start_state = CollectionState::for_game(self.game_data);
        if !traverser
            .reachable_locations(&start_state)
            .iter()
            .any(|&i| self.graph.locations[i].is_fillable())
        {
            bail!("[seed {seed}] No location is reachable from the start");
        }
        let mut full_state = CollectionState::for_game(self.game_data);
        for (item, count) in pool.items() {
            full_state.collect_many(item, count);
        }
        if !traverser.can_beat_game(&full_state, self.game_data.victory_item_idx) {
            bail!("[seed {seed}] Game is not beatable with the generated item pool");
        }

        let spoiler_log = self.get_spoiler_log(seed, &pool, &default_items, &item_pools);
        let randomization = Randomization {
            seed,
            settings: self.settings.clone(),
            item_state: self.get_item_state(&default_items),
            item_keys: self.get_item_keys(),
            item_pool: pool,
            default_items,
            item_pools,
        };
        info!(
            "[seed {seed}] Generated {} items for {} locations ({} included)",
            randomization.item_pool.total(),
            self.graph.fillable_location_count(),
            self.graph.included_location_count()
        );
        Ok((randomization, spoiler_log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaacrando_game::{ExitRecord, ItemData, LocationRecord, RegionRecord};
    use rand::rngs::StdRng;

    fn item(name: &str, code: ItemCode, cls: ItemClassification, cat: &str) -> ItemData {
        ItemData {
            name: name.to_string(),
            code,
            classification: cls,
            categories: vec![cat.to_string()],
            amount: 1,
            internal_id: None,
            quality: None,
            achievement: None,
        }
    }

    fn collectible(name: &str, code: ItemCode, quality: u8) -> ItemData {
        ItemData {
            internal_id: Some(code as usize),
            quality: Some(quality),
            achievement: Some(format!("Unlock {name}")),
            ..item(name, code, ItemClassification::Filler, "Collectible")
        }
    }

    fn test_game_data() -> GameData {
        let mut items = vec![
            item("Victory", 1, ItemClassification::Progression, "Victory"),
            item("Isaac", 2, ItemClassification::Progression, "Character"),
            item("Cellar", 3, ItemClassification::Progression, "Stage"),
            item("Caves", 4, ItemClassification::Progression, "Stage"),
            item("Fool Trap", 5, ItemClassification::Trap, "Trap"),
            item("Three Coins", 6, ItemClassification::Filler, "Filler"),
            item("Baby A", 7, ItemClassification::Filler, "Co-Op Baby"),
            item("Baby B", 8, ItemClassification::Filler, "Co-Op Baby"),
        ];
        items[4].amount = 0;
        items[5].amount = 0;
        for i in 0..4 {
            items.push(collectible(&format!("Great Item {i}"), 20 + i, 4));
        }
        for i in 0..4 {
            items.push(collectible(&format!("Plain Item {i}"), 30 + i, 1));
        }
        let regions = vec![RegionRecord {
            name: "Menu".to_string(),
            exits: Vec::<ExitRecord>::new(),
            entrance_requires: None,
        }];
        let locations = vec![LocationRecord {
            name: "Victory".to_string(),
            code: 100,
            region: "Menu".to_string(),
            categories: vec![],
            count: None,
            progress_type: Default::default(),
            requires: None,
        }];
        GameData::new(items, locations, regions, vec![]).unwrap()
    }

    fn rng(seed: u8) -> StdRng {
        StdRng::from_seed([seed; 32])
    }

    #[test]
    fn test_scenario_two_mandatory_eight_included() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        for seed in 0..20 {
            let pool = generate_item_pool(
                &game_data,
                10,
                8,
                &["Isaac", "Victory"],
                &settings,
                &mut rng(seed),
            )
            .unwrap();
            assert_eq!(pool.total(), 10);
            assert_eq!(pool.progression_count(), 4);
            assert_eq!(pool.count(game_data.item_idx("Cellar").unwrap()), 1);
            assert_eq!(pool.count(game_data.item_idx("Caves").unwrap()), 1);
        }
    }

    #[test]
    fn test_pool_size_matches_location_count() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        for location_count in [2, 3, 7, 25, 100] {
            let pool = generate_item_pool(
                &game_data,
                location_count,
                location_count,
                &["Isaac", "Victory"],
                &settings,
                &mut rng(1),
            )
            .unwrap();
            assert_eq!(pool.total(), location_count);
        }
    }

    #[test]
    fn test_too_few_locations_is_an_error() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        let err = generate_item_pool(
            &game_data,
            1,
            1,
            &["Isaac", "Victory"],
            &settings,
            &mut rng(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("progression"));
        assert!(
            generate_item_pool(&game_data, 0, 0, &[], &settings, &mut rng(0)).is_err()
        );
    }

    #[test]
    fn test_progression_must_fit_included_locations() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        let err = generate_item_pool(
            &game_data,
            10,
            1,
            &["Isaac", "Victory"],
            &settings,
            &mut rng(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("may hold progression"));
    }

    #[test]
    fn test_promotion_is_capped_by_included_locations() {
        let game_data = test_game_data();
        let settings = RandomizerSettings {
            game_mode: GameMode::BabyHunt,
            max_babies: 2,
            ..Default::default()
        };
        for seed in 0..10 {
            // Four mandatory items fill all four included locations, leaving no room to promote.
            let pool = generate_item_pool(
                &game_data,
                10,
                4,
                &["Isaac", "Victory"],
                &settings,
                &mut rng(seed),
            )
            .unwrap();
            assert_eq!(pool.total(), 10);
            assert_eq!(pool.progression_count(), 4);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        let mut rng_a = rng(7);
        let mut rng_b = rng(7);
        let a = generate_item_pool(&game_data, 30, 20, &["Isaac"], &settings, &mut rng_a).unwrap();
        let b = generate_item_pool(&game_data, 30, 20, &["Isaac"], &settings, &mut rng_b).unwrap();
        assert_eq!(a, b);
        assert_eq!(rng_a.gen::<u64>(), rng_b.gen::<u64>());
    }

    #[test]
    fn test_excluded_items_are_left_out() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        let pool = generate_item_pool(
            &game_data,
            12,
            4,
            &["Isaac", "Victory", "Caves", "Great Item 0"],
            &settings,
            &mut rng(3),
        )
        .unwrap();
        assert_eq!(pool.count(game_data.item_idx("Isaac").unwrap()), 0);
        assert_eq!(pool.count(game_data.item_idx("Victory").unwrap()), 0);
        assert_eq!(pool.count(game_data.item_idx("Caves").unwrap()), 0);
        assert_eq!(pool.count(game_data.item_idx("Great Item 0").unwrap()), 0);
    }

    #[test]
    fn test_baby_hunt_promotes_babies() {
        let game_data = test_game_data();
        let settings = RandomizerSettings {
            game_mode: GameMode::BabyHunt,
            max_babies: 1,
            ..Default::default()
        };
        let pool = generate_item_pool(
            &game_data,
            10,
            3,
            &["Isaac", "Victory"],
            &settings,
            &mut rng(5),
        )
        .unwrap();
        let babies = game_data.items_in_category(BABY_CATEGORY);
        let placed: usize = babies.iter().map(|&b| pool.count(b)).sum();
        assert_eq!(placed, 1);
        assert_eq!(pool.progression_count(), 3);
    }

    #[test]
    fn test_default_items_cover_unplaced_items() {
        let game_data = test_game_data();
        let settings = RandomizerSettings::default();
        let pool = generate_item_pool(
            &game_data,
            5,
            2,
            &["Isaac", "Victory"],
            &settings,
            &mut rng(2),
        )
        .unwrap();
        let isaac = game_data.item_idx("Isaac").unwrap();
        let defaults = get_default_items(&game_data, &pool, isaac);
        assert!(defaults.contains(isaac));
        // Babies are never placed outside Baby Hunt, so they start unlocked.
        assert!(defaults.contains(game_data.item_idx("Baby A").unwrap()));
        assert!(!defaults.contains(game_data.item_idx("Cellar").unwrap()));
        assert!(!defaults.contains(game_data.item_idx("Fool Trap").unwrap()));
    }
}
