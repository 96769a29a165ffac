use std::path::Path;

use anyhow::{bail, Context, Result};
use isaacrando::{
    randomize::Randomizer,
    regions::RegionGraph,
    settings::{GameMode, IncludeChallenges, IncludeGreedMode, PoolRandoMode, RandomizerSettings},
};
use isaacrando_game::{GameData, ItemClassification, ProgressType, CHALLENGE_CATEGORY};

fn load_game_data() -> Result<GameData> {
    GameData::load(Path::new("../data"))
}

#[test]
fn test_shipped_catalog_loads() -> Result<()> {
    let game_data = load_game_data()?;
    assert!(!game_data.trap_items.is_empty());
    assert!(!game_data.filler_items.is_empty());
    assert_eq!(game_data.max_repetitions("Shop Donation"), 50);
    assert_eq!(
        game_data.location_idx("Shop Donation (50x)")?,
        game_data.location_idx("Shop Donation")? + 49
    );
    Ok(())
}

const GAME_MODES: [GameMode; 2] = [GameMode::Standard, GameMode::BabyHunt];
const CHALLENGE_OPTIONS: [IncludeChallenges; 3] = [
    IncludeChallenges::Include,
    IncludeChallenges::Exclude,
    IncludeChallenges::Remove,
];
const GREED_OPTIONS: [IncludeGreedMode; 4] = [
    IncludeGreedMode::None,
    IncludeGreedMode::GreedModeOnly,
    IncludeGreedMode::GreedierModeOnly,
    IncludeGreedMode::GreedAndGreedier,
];

// Number of progression items a configuration must place.
fn mandatory_progression(game_data: &GameData, settings: &RandomizerSettings) -> usize {
    let catalog: usize = game_data
        .items
        .iter()
        .filter(|x| {
            x.classification == ItemClassification::Progression
                && x.primary_category() != "Victory"
                && x.name != settings.starting_character.item_name()
                && !(settings.include_challenges == IncludeChallenges::Remove
                    && x.has_category(CHALLENGE_CATEGORY))
        })
        .map(|x| x.amount)
        .sum();
    match settings.game_mode {
        GameMode::Standard => catalog,
        GameMode::BabyHunt => catalog + settings.max_babies,
    }
}

fn check_randomization(game_data: &GameData, settings: &RandomizerSettings) -> Result<()> {
    let randomizer = Randomizer::new(game_data, settings)?;
    let (randomization, spoiler_log) = randomizer.randomize(12345)?;
    let pool = &randomization.item_pool;
    let graph = &randomizer.graph;
    if pool.total() != graph.fillable_location_count() {
        bail!(
            "{} items for {} locations",
            pool.total(),
            graph.fillable_location_count()
        );
    }
    if pool.progression_count() > graph.included_location_count() {
        bail!(
            "{} progression items for {} non-excluded locations",
            pool.progression_count(),
            graph.included_location_count()
        );
    }
    // Includes catalog progression, chosen babies and quality-promoted items.
    for (i, item) in game_data.items.iter().enumerate() {
        if pool.classifications[i].is_progression()
            && item.primary_category() != "Victory"
            && item.name != settings.starting_character.item_name()
            && pool.count(i) < item.amount
        {
            bail!("Progression item {} missing from the pool", item.name);
        }
    }
    assert_eq!(spoiler_log.seed, 12345);
    Ok(())
}

#[test]
fn test_all_configurations_generate() -> Result<()> {
    let game_data = load_game_data()?;
    for game_mode in GAME_MODES {
        for include_challenges in CHALLENGE_OPTIONS {
            for include_greed_mode in GREED_OPTIONS {
                let settings = RandomizerSettings {
                    game_mode,
                    include_challenges,
                    include_greed_mode,
                    shop_donations: 25,
                    consumable_locations: 25,
                    ..Default::default()
                };
                check_randomization(&game_data, &settings).context(format!(
                    "{game_mode:?}/{include_challenges:?}/{include_greed_mode:?}"
                ))?;
            }
        }
    }
    Ok(())
}

#[test]
fn test_zero_donation_locations() -> Result<()> {
    let game_data = load_game_data()?;
    for game_mode in GAME_MODES {
        for include_challenges in CHALLENGE_OPTIONS {
            for include_greed_mode in GREED_OPTIONS {
                let settings = RandomizerSettings {
                    game_mode,
                    include_challenges,
                    include_greed_mode,
                    shop_donations: 0,
                    greed_donations: 0,
                    consumable_locations: 0,
                    ..Default::default()
                };
                let graph = RegionGraph::build(&game_data, &settings)?;
                let fits = mandatory_progression(&game_data, &settings)
                    <= graph.included_location_count();
                let result = check_randomization(&game_data, &settings);
                if fits != result.is_ok() {
                    bail!(
                        "{game_mode:?}/{include_challenges:?}/{include_greed_mode:?}: fits={fits}, result={result:?}"
                    );
                }
            }
        }
    }

    // Challenges stay progression but only 65 locations may hold it.
    let settings = RandomizerSettings {
        include_challenges: IncludeChallenges::Exclude,
        include_greed_mode: IncludeGreedMode::None,
        shop_donations: 0,
        greed_donations: 0,
        consumable_locations: 0,
        ..Default::default()
    };
    let randomizer = Randomizer::new(&game_data, &settings)?;
    assert_eq!(randomizer.graph.included_location_count(), 65);
    assert!(randomizer.randomize(1).is_err());
    Ok(())
}

#[test]
fn test_generation_is_deterministic() -> Result<()> {
    let game_data = load_game_data()?;
    let settings = RandomizerSettings {
        game_mode: GameMode::BabyHunt,
        pool_rando: PoolRandoMode::Shuffle,
        ..Default::default()
    };
    let randomizer = Randomizer::new(&game_data, &settings)?;
    let (a, _) = randomizer.randomize(7)?;
    let (b, _) = randomizer.randomize(7)?;
    assert_eq!(a.item_pool, b.item_pool);
    assert_eq!(a.item_pools, b.item_pools);
    assert_eq!(a.item_state, b.item_state);
    let (c, _) = randomizer.randomize(8)?;
    assert_eq!(c.item_pool.total(), a.item_pool.total());
    Ok(())
}

#[test]
fn test_challenge_and_greed_filtering() -> Result<()> {
    let game_data = load_game_data()?;
    let settings = RandomizerSettings {
        include_challenges: IncludeChallenges::Exclude,
        include_greed_mode: IncludeGreedMode::None,
        shop_donations: 3,
        ..Default::default()
    };
    let graph = RegionGraph::build(&game_data, &settings)?;
    for loc in &graph.locations {
        if loc.has_category(CHALLENGE_CATEGORY) {
            assert_eq!(loc.progress_type, ProgressType::Excluded);
        }
    }
    let greed_idx = graph.region_idx("Greed Mode")?;
    assert!(graph
        .locations
        .iter()
        .filter(|x| x.region_idx == greed_idx)
        .all(|x| x.progress_type == ProgressType::Excluded));
    assert!(graph.location_idx("Shop Donation (3x)").is_ok());
    assert!(graph.location_idx("Shop Donation (4x)").is_err());

    let settings = RandomizerSettings {
        include_challenges: IncludeChallenges::Remove,
        ..Default::default()
    };
    let graph = RegionGraph::build(&game_data, &settings)?;
    assert!(!graph
        .locations
        .iter()
        .any(|x| x.has_category(CHALLENGE_CATEGORY)));
    assert_eq!(
        graph.locations[graph.location_idx("Ultra Greed Defeated")?].progress_type,
        ProgressType::Default
    );
    assert_eq!(
        graph.locations[graph.location_idx("Ultra Greedier Defeated")?].progress_type,
        ProgressType::Excluded
    );
    Ok(())
}

#[test]
fn test_pool_shuffle_keeps_pool_sizes() -> Result<()> {
    let game_data = load_game_data()?;
    let settings = RandomizerSettings {
        pool_rando: PoolRandoMode::Shuffle,
        ..Default::default()
    };
    let randomizer = Randomizer::new(&game_data, &settings)?;
    let (randomization, _) = randomizer.randomize(99)?;
    let vanilla_sizes: Vec<usize> = game_data
        .item_pools
        .iter()
        .map(|x| x.entries.len())
        .collect();
    let sizes: Vec<usize> = randomization
        .item_pools
        .iter()
        .map(|x| x.entries.len())
        .collect();
    assert_eq!(sizes, vanilla_sizes);
    Ok(())
}

#[test]
fn test_invalid_settings_are_rejected() -> Result<()> {
    let game_data = load_game_data()?;
    let settings = RandomizerSettings {
        game_mode: GameMode::BabyHunt,
        max_babies: 1000,
        ..Default::default()
    };
    assert!(Randomizer::new(&game_data, &settings).is_err());
    let settings = RandomizerSettings {
        greed_donations: 51,
        ..Default::default()
    };
    assert!(Randomizer::new(&game_data, &settings).is_err());
    Ok(())
}
