use std::cell::RefCell;

use isaacrando_game::{GameData, ItemIdx};
use serde::{Deserialize, Serialize};

/// Items that count as permanently owned for a generation run, independent of any
/// collection state (the starting character and anything left out of the item pool).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultItems {
    pub items: Vec<bool>,
}

impl DefaultItems {
    pub fn none(num_items: usize) -> Self {
        DefaultItems {
            items: vec![false; num_items],
        }
    }

    pub fn from_indices(num_items: usize, indices: &[ItemIdx]) -> Self {
        let mut out = DefaultItems::none(num_items);
        for &i in indices {
            out.items[i] = true;
        }
        out
    }

    pub fn insert(&mut self, item: ItemIdx) {
        self.items[item] = true;
    }

    pub fn contains(&self, item: ItemIdx) -> bool {
        self.items.get(item).copied().unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
struct ReachableCache {
    // Identifies the traversal context (graph and default items) the regions were computed for.
    context_id: u64,
    version: u64,
    regions: Vec<bool>,
}

/// The items a hypothetical player currently owns.
///
/// Collection is monotonic: items are only ever added. Each addition bumps a version
/// stamp, which together with a traversal context id keys the memoized reachable-region
/// set. The memo uses interior mutability, so a state must not be shared between threads.
#[derive(Clone, Debug)]
pub struct CollectionState {
    owned: Vec<usize>,
    version: u64,
    reachable_cache: RefCell<Option<ReachableCache>>,
}

impl CollectionState {
    pub fn new(num_items: usize) -> Self {
        CollectionState {
            owned: vec![0; num_items],
            version: 0,
            reachable_cache: RefCell::new(None),
        }
    }

    pub fn for_game(game_data: &GameData) -> Self {
        CollectionState::new(game_data.items.len())
    }

    pub fn collect(&mut self, item: ItemIdx) {
        self.collect_many(item, 1);
    }

    pub fn collect_many(&mut self, item: ItemIdx, count: usize) {
        if count == 0 {
            return;
        }
        self.owned[item] += count;
        self.version += 1;
        *self.reachable_cache.get_mut() = None;
    }

    pub fn count(&self, item: ItemIdx) -> usize {
        self.owned.get(item).copied().unwrap_or(0)
    }

    pub fn has(&self, item: ItemIdx, count: usize, default_items: &DefaultItems) -> bool {
        default_items.contains(item) || self.count(item) >= count
    }

    pub fn has_all(&self, items: &[ItemIdx], default_items: &DefaultItems) -> bool {
        items.iter().all(|&x| self.has(x, 1, default_items))
    }

    pub fn has_any(&self, items: &[ItemIdx], default_items: &DefaultItems) -> bool {
        items.iter().any(|&x| self.has(x, 1, default_items))
    }

    pub fn group_count(&self, items: &[ItemIdx]) -> usize {
        items.iter().map(|&x| self.count(x)).sum()
    }

    pub fn cached_reachable_regions(&self, context_id: u64) -> Option<Vec<bool>> {
        let cache = self.reachable_cache.borrow();
        match cache.as_ref() {
            Some(c) if c.version == self.version && c.context_id == context_id => {
                Some(c.regions.clone())
            }
            _ => None,
        }
    }

    pub fn store_reachable_regions(&self, context_id: u64, regions: Vec<bool>) {
        *self.reachable_cache.borrow_mut() = Some(ReachableCache {
            context_id,
            version: self.version,
            regions,
        });
    }
}
