use isaacrando_game::{ItemIdx, RegionIdx, Requirement};
use isaacrando_logic::{CollectionState, DefaultItems};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::regions::RegionGraph;

/// Evaluates a rule against a state, using `reachable` as the set of regions
/// proven reachable so far. Regions not (yet) in the set evaluate false.
pub fn is_requirement_satisfied(
    req: &Requirement,
    state: &CollectionState,
    default_items: &DefaultItems,
    reachable: &[bool],
) -> bool {
    match req {
        Requirement::Free => true,
        Requirement::Never => false,
        Requirement::Has { item, count } => state.has(*item, *count, default_items),
        Requirement::HasAll(items) => state.has_all(items, default_items),
        Requirement::HasAny(items) => state.has_any(items, default_items),
        Requirement::HasGroup { items, count } => state.group_count(items) >= *count,
        Requirement::RegionReachable(r) => reachable.get(*r).copied().unwrap_or(false),
        Requirement::And(reqs) => reqs
            .iter()
            .all(|x| is_requirement_satisfied(x, state, default_items, reachable)),
        Requirement::Or(reqs) => reqs
            .iter()
            .any(|x| is_requirement_satisfied(x, state, default_items, reachable)),
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct Traverser<'a> {
    pub graph: &'a RegionGraph,
    pub default_items: &'a DefaultItems,
    // Distinguishes this traverser's results in a state's reachable-region memo.
    context_id: u64,
}

impl<'a> Traverser<'a> {
    pub fn new(graph: &'a RegionGraph, default_items: &'a DefaultItems) -> Self {
        Traverser {
            graph,
            default_items,
            context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Reachable regions for the state, indexed by RegionIdx. Memoized in the state.
    pub fn reachable_regions(&self, state: &CollectionState) -> Vec<bool> {
        if let Some(regions) = state.cached_reachable_regions(self.context_id) {
            return regions;
        }
        let regions = self.compute_reachable_regions(state);
        state.store_reachable_regions(self.context_id, regions.clone());
        regions
    }

    fn compute_reachable_regions(&self, state: &CollectionState) -> Vec<bool> {
        let num_regions = self.graph.regions.len();
        let mut reachable = vec![false; num_regions];
        let mut queue: VecDeque<RegionIdx> = VecDeque::new();
        // Exits that failed their rule, as (source region, exit index):
        let mut deferred: Vec<(RegionIdx, usize)> = vec![];

        reachable[self.graph.root] = true;
        queue.push_back(self.graph.root);
        loop {
            while let Some(src) = queue.pop_front() {
                for (i, exit) in self.graph.regions[src].exits.iter().enumerate() {
                    if reachable[exit.to] {
                        continue;
                    }
                    if is_requirement_satisfied(
                        &exit.requirement,
                        state,
                        self.default_items,
                        &reachable,
                    ) {
                        reachable[exit.to] = true;
                        queue.push_back(exit.to);
                    } else {
                        deferred.push((src, i));
                    }
                }
            }

            // Frontier drained: retry deferred exits, since RegionReachable rules may now hold.
            let mut progress = false;
            let mut still_deferred: Vec<(RegionIdx, usize)> = vec![];
            for (src, i) in deferred {
                let exit = &self.graph.regions[src].exits[i];
                if reachable[exit.to] {
                    continue;
                }
                if is_requirement_satisfied(&exit.requirement, state, self.default_items, &reachable)
                {
                    reachable[exit.to] = true;
                    queue.push_back(exit.to);
                    progress = true;
                } else {
                    still_deferred.push((src, i));
                }
            }
            deferred = still_deferred;
            if !progress {
                break;
            }
        }
        reachable
    }

    /// Indices (into RegionGraph.locations) of locations reachable with the state, in declaration order.
    pub fn reachable_locations(&self, state: &CollectionState) -> Vec<usize> {
        let regions = self.reachable_regions(state);
        let mut out: Vec<usize> = vec![];
        for (region_idx, region) in self.graph.regions.iter().enumerate() {
            if !regions[region_idx] {
                continue;
            }
            for &loc_idx in &region.location_idxs {
                let loc = &self.graph.locations[loc_idx];
                if is_requirement_satisfied(&loc.requirement, state, self.default_items, &regions) {
                    out.push(loc_idx);
                }
            }
        }
        out.sort();
        out
    }

    pub fn can_reach_region(&self, region_idx: RegionIdx, state: &CollectionState) -> bool {
        self.reachable_regions(state)
            .get(region_idx)
            .copied()
            .unwrap_or(false)
    }

    pub fn can_reach_location(&self, location_idx: usize, state: &CollectionState) -> bool {
        let loc = &self.graph.locations[location_idx];
        let regions = self.reachable_regions(state);
        regions[loc.region_idx]
            && is_requirement_satisfied(&loc.requirement, state, self.default_items, &regions)
    }

    /// Collects the items locked at reachable locations until nothing new is found,
    /// returning the resulting state.
    pub fn sweep_locked_items(&self, state: &CollectionState) -> CollectionState {
        let mut state = state.clone();
        let mut swept = vec![false; self.graph.locations.len()];
        loop {
            let mut found = false;
            for loc_idx in self.reachable_locations(&state) {
                if swept[loc_idx] {
                    continue;
                }
                if let Some(item) = self.graph.locations[loc_idx].locked_item {
                    swept[loc_idx] = true;
                    state.collect(item);
                    found = true;
                }
            }
            if !found {
                return state;
            }
        }
    }

    /// Completion check: the victory item is obtainable with the given state.
    pub fn can_beat_game(&self, state: &CollectionState, victory_item: ItemIdx) -> bool {
        let swept = self.sweep_locked_items(state);
        swept.has(victory_item, 1, self.default_items)
    }
}
