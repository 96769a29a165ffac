use anyhow::{Context, Result};
use clap::Parser;
use isaacrando::randomize::{ItemKeyEntry, ItemStateEntry, Randomizer};
use isaacrando::settings::{parse_settings, RandomizerSettings};
use isaacrando_game::GameData;
use log::info;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "../data")]
    data: PathBuf,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    random_seed: Option<usize>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,

    // Item unlock state and item code table consumed by the game mod.
    #[arg(long)]
    output_item_state: Option<PathBuf>,
}

#[derive(Serialize)]
struct ItemStateOutput<'a> {
    seed: usize,
    item_state: &'a [ItemStateEntry],
    item_keys: &'a [ItemKeyEntry],
}

fn load_settings(path: Option<&Path>) -> Result<RandomizerSettings> {
    match path {
        Some(path) => {
            let settings_str = std::fs::read_to_string(path)
                .with_context(|| format!("Unable to read settings from {}", path.display()))?;
            parse_settings(&settings_str)
        }
        None => Ok(RandomizerSettings::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let game_data = GameData::load(&args.data)?;
    let settings = load_settings(args.settings.as_deref())?;
    let seed = match args.random_seed {
        Some(s) => s,
        None => (rand::rngs::StdRng::from_entropy().next_u64() & 0xFFFFFFFF) as usize,
    };

    let randomizer = Randomizer::new(&game_data, &settings)?;
    let (randomization, spoiler_log) = randomizer.randomize(seed)?;
    info!(
        "Seed {seed}: {} progression items, {} default-owned items",
        spoiler_log.num_progression_items(),
        spoiler_log.default_items.len()
    );

    if let Some(output_spoiler_log_path) = &args.output_spoiler_log {
        println!(
            "Writing spoiler log to {}",
            output_spoiler_log_path.display()
        );
        let spoiler_str = serde_json::to_string_pretty(&spoiler_log)?;
        std::fs::write(output_spoiler_log_path, spoiler_str)?;
    }

    if let Some(output_item_state_path) = &args.output_item_state {
        println!(
            "Writing item state to {}",
            output_item_state_path.display()
        );
        let output = ItemStateOutput {
            seed: randomization.seed,
            item_state: &randomization.item_state,
            item_keys: &randomization.item_keys,
        };
        std::fs::write(output_item_state_path, serde_json::to_string_pretty(&output)?)?;
    }

    Ok(())
}
