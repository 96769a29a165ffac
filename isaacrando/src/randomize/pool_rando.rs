use anyhow::{bail, Result};
use isaacrando_game::{GameData, ItemPool, PoolEntry};
use log::info;
use rand::{seq::SliceRandom, Rng};

use crate::settings::PoolRandoMode;

const MAX_SHUFFLE_ATTEMPTS: usize = 100;

/// Redistributes in-game item pool membership. Each entry keeps its weight.
pub fn shuffle_item_pools<R: Rng>(
    game_data: &GameData,
    mode: PoolRandoMode,
    rng: &mut R,
) -> Result<Vec<ItemPool>> {
    let pools = match mode {
        PoolRandoMode::Off => return Ok(game_data.item_pools.clone()),
        PoolRandoMode::Shuffle => shuffle_pools(&game_data.item_pools, rng)?,
        PoolRandoMode::Chaos => chaos_pools(&game_data.item_pools, rng),
    };
    info!(
        "Pool rando ({mode:?}): {} entries over {} pools",
        pools.iter().map(|x| x.entries.len()).sum::<usize>(),
        pools.len()
    );
    Ok(pools)
}

fn all_entries(pools: &[ItemPool]) -> Vec<PoolEntry> {
    pools.iter().flat_map(|x| x.entries.iter().cloned()).collect()
}

fn assemble(pools: &[ItemPool], dealt: Vec<Vec<PoolEntry>>) -> Vec<ItemPool> {
    pools
        .iter()
        .zip(dealt)
        .map(|(pool, entries)| ItemPool {
            name: pool.name.clone(),
            entries: entries
                .into_iter()
                .map(|e| PoolEntry {
                    pool: pool.name.clone(),
                    ..e
                })
                .collect(),
        })
        .collect()
}

// Pool sizes are kept, and an item never lands twice in the same pool.
fn shuffle_pools<R: Rng>(pools: &[ItemPool], rng: &mut R) -> Result<Vec<ItemPool>> {
    let mut entries = all_entries(pools);
    for attempt_num in 0..MAX_SHUFFLE_ATTEMPTS {
        entries.shuffle(rng);
        let mut dealt: Vec<Vec<PoolEntry>> = vec![];
        let mut it = entries.iter().cloned();
        for pool in pools {
            dealt.push(it.by_ref().take(pool.entries.len()).collect());
        }
        if repair_duplicates(&mut dealt) {
            return Ok(assemble(pools, dealt));
        }
        info!("[attempt {attempt_num}] Unable to separate duplicate pool entries, retrying");
    }
    bail!("Unable to shuffle item pools after {MAX_SHUFFLE_ATTEMPTS} attempts");
}

fn contains_id(entries: &[PoolEntry], internal_id: usize) -> bool {
    entries.iter().any(|e| e.internal_id == internal_id)
}

// Swaps each duplicate with an entry of another pool, such that neither pool ends up
// with a duplicate. Returns false if some duplicate has no valid swap partner.
fn repair_duplicates(pools: &mut [Vec<PoolEntry>]) -> bool {
    for p in 0..pools.len() {
        for i in 0..pools[p].len() {
            let id = pools[p][i].internal_id;
            if !contains_id(&pools[p][..i], id) {
                continue;
            }
            let mut partner: Option<(usize, usize)> = None;
            'search: for q in 0..pools.len() {
                if q == p || contains_id(&pools[q], id) {
                    continue;
                }
                for j in 0..pools[q].len() {
                    if !contains_id(&pools[p], pools[q][j].internal_id) {
                        partner = Some((q, j));
                        break 'search;
                    }
                }
            }
            let Some((q, j)) = partner else {
                return false;
            };
            let moved = pools[q][j].clone();
            pools[q][j] = pools[p][i].clone();
            pools[p][i] = moved;
        }
    }
    true
}

// Every entry goes to a uniformly chosen pool; pool sizes are not kept.
fn chaos_pools<R: Rng>(pools: &[ItemPool], rng: &mut R) -> Vec<ItemPool> {
    let mut dealt: Vec<Vec<PoolEntry>> = vec![vec![]; pools.len()];
    if pools.is_empty() {
        return vec![];
    }
    for entry in all_entries(pools) {
        let p = rng.gen_range(0..pools.len());
        dealt[p].push(entry);
    }
    assemble(pools, dealt)
}
