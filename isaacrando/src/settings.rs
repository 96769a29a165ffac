use anyhow::{bail, Context, Result};
use isaacrando_game::{GameData, BABY_CATEGORY};
use serde::{Deserialize, Serialize};
use strum::VariantNames;
use strum_macros::{EnumString, VariantNames};

pub const SHOP_DONATION_LOCATION: &str = "Shop Donation";
pub const GREED_DONATION_LOCATION: &str = "Greed Donation";
pub const CONSUMABLE_LOCATION: &str = "AP Consumable";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RandomizerSettings {
    pub name: Option<String>,
    pub game_mode: GameMode,
    // Baby Hunt: how many Co-Op Babies are placed, and the percentage of them needed to win.
    pub max_babies: usize,
    pub baby_ratio_required: usize,
    pub include_challenges: IncludeChallenges,
    pub include_greed_mode: IncludeGreedMode,
    // If false, only items that are unlocked by an achievement in the unmodified game are placed.
    pub lock_all_items: bool,
    pub pool_rando: PoolRandoMode,
    pub starting_character: StartingCharacter,
    pub shop_donations: usize,
    pub greed_donations: usize,
    pub consumable_locations: usize,
}

impl Default for RandomizerSettings {
    fn default() -> Self {
        RandomizerSettings {
            name: None,
            game_mode: GameMode::Standard,
            max_babies: 15,
            baby_ratio_required: 80,
            include_challenges: IncludeChallenges::Include,
            include_greed_mode: IncludeGreedMode::GreedModeOnly,
            lock_all_items: false,
            pool_rando: PoolRandoMode::Off,
            starting_character: StartingCharacter::Isaac,
            shop_donations: 10,
            greed_donations: 10,
            consumable_locations: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, EnumString, VariantNames)]
pub enum GameMode {
    // Defeat both The Lamb (Dark Room) and Blue Baby (The Chest).
    Standard,
    BabyHunt,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, EnumString, VariantNames)]
pub enum IncludeChallenges {
    Include,
    // Challenge locations only receive filler.
    Exclude,
    // Challenge locations are dropped and challenge items become filler.
    Remove,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, EnumString, VariantNames)]
pub enum IncludeGreedMode {
    None,
    GreedModeOnly,
    GreedierModeOnly,
    GreedAndGreedier,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, EnumString, VariantNames)]
pub enum PoolRandoMode {
    Off,
    Shuffle,
    Chaos,
}

// Note: the ordering of these variants is significant; it must correspond to CHARACTER_ITEMS.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, EnumString, VariantNames)]
#[repr(usize)]
pub enum StartingCharacter {
    Isaac,
    Magdalene,
    Cain,
    Judas,
    BlueBaby,
    Eve,
    Samson,
    Azazel,
    Lazarus,
    Eden,
    Lost,
    Lilith,
    Keeper,
    Apollyon,
    Forgotten,
    Bethany,
    JacobAndEsau,
    TaintedIsaac,
    TaintedMagdalene,
    TaintedCain,
    TaintedJudas,
    TaintedBlueBaby,
    TaintedEve,
    TaintedSamson,
    TaintedAzazel,
    TaintedLazarus,
    TaintedEden,
    TaintedLost,
    TaintedLilith,
    TaintedKeeper,
    TaintedApollyon,
    TaintedForgotten,
    TaintedBethany,
    TaintedJacobAndEsau,
}

pub const CHARACTER_ITEMS: [&str; 34] = [
    "Isaac",
    "Magdalene",
    "Cain",
    "Judas",
    "???",
    "Eve",
    "Samson",
    "Azazel",
    "Lazarus",
    "Eden",
    "Lost",
    "Lilith",
    "Keeper",
    "Apollyon",
    "Forgotten",
    "Bethany",
    "Jacob and Esau",
    "The Broken",
    "The Dauntless",
    "The Hoarder",
    "The Deceiver",
    "The Soiled",
    "The Curdled",
    "The Savage",
    "The Benighted",
    "The Enigma",
    "The Capricious",
    "The Baleful",
    "The Harlot",
    "The Miser",
    "The Empty",
    "The Fettered",
    "The Zealot",
    "The Deserter",
];

impl StartingCharacter {
    pub fn item_name(self) -> &'static str {
        CHARACTER_ITEMS[self as usize]
    }
}

impl RandomizerSettings {
    /// Number of Co-Op Babies that must be found to win in Baby Hunt.
    pub fn required_babies(&self) -> usize {
        self.max_babies * self.baby_ratio_required / 100
    }

    pub fn validate(&self, game_data: &GameData) -> Result<()> {
        game_data
            .item_idx(self.starting_character.item_name())
            .with_context(|| {
                format!(
                    "Invalid starting_character {:?}",
                    self.starting_character
                )
            })?;
        if self.game_mode == GameMode::BabyHunt {
            let num_babies = game_data.items_in_category(BABY_CATEGORY).len();
            if self.max_babies == 0 || self.max_babies > num_babies {
                bail!(
                    "Invalid max_babies {}: must be between 1 and {num_babies}",
                    self.max_babies
                );
            }
        }
        if self.baby_ratio_required == 0 || self.baby_ratio_required > 100 {
            bail!(
                "Invalid baby_ratio_required {}: must be between 1 and 100",
                self.baby_ratio_required
            );
        }
        for (field, value, location) in [
            ("shop_donations", self.shop_donations, SHOP_DONATION_LOCATION),
            ("greed_donations", self.greed_donations, GREED_DONATION_LOCATION),
            (
                "consumable_locations",
                self.consumable_locations,
                CONSUMABLE_LOCATION,
            ),
        ] {
            let max = game_data.max_repetitions(location);
            if value > max {
                bail!("Invalid {field} {value}: must be at most {max}");
            }
        }
        Ok(())
    }
}

pub fn parse_settings(settings_str: &str) -> Result<RandomizerSettings> {
    serde_json::from_str(settings_str).with_context(|| {
        format!(
            "Unable to parse settings (game modes: {:?}, pool rando modes: {:?})",
            GameMode::VARIANTS,
            PoolRandoMode::VARIANTS
        )
    })
}
