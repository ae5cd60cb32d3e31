use hashbrown::{HashMap, HashSet};
use itemrando_game::{
    Access, EntranceId, Item, Location, LocationId, LogicView, RegionId, World,
};
use log::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Spot {
    Region(RegionId),
    Entrance(EntranceId),
    Location(LocationId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SweepMode {
    Events { key_only: bool },
    Placements,
}

#[derive(Clone, Debug)]
struct SweptLocation {
    location_id: LocationId,
    recorded: Option<String>, // Name actually added to prog_items, if any
}

/// Collected progress plus a cache of which regions that progress opens up.
///
/// Region reachability only grows while items are collected, so collecting just marks
/// the cache stale and the next query extends it in place. Removing an item resets it.
#[derive(Clone, Debug)]
pub struct CollectionState {
    prog_items: HashMap<String, usize>,
    region_reachable: Vec<bool>,
    stale: bool,
    swept: Vec<SweptLocation>,
    swept_locations: HashSet<LocationId>,
    sweep_modes: Vec<SweepMode>, // Every mode swept with so far
}

struct StateView<'a> {
    prog_items: &'a HashMap<String, usize>,
    region_reachable: &'a [bool],
}

impl<'a> LogicView for StateView<'a> {
    fn item_count(&self, name: &str) -> usize {
        self.prog_items.get(name).copied().unwrap_or(0)
    }

    fn can_reach_region(&self, region_id: RegionId) -> bool {
        self.region_reachable.get(region_id).copied().unwrap_or(false)
    }
}

impl CollectionState {
    pub fn new(world: &World) -> Self {
        let mut state = CollectionState {
            prog_items: HashMap::new(),
            region_reachable: vec![false; world.regions.len()],
            stale: true,
            swept: vec![],
            swept_locations: HashSet::new(),
            sweep_modes: vec![],
        };
        for item in &world.precollected {
            state.record(world, item, true);
        }
        state
    }

    fn view(&self) -> StateView<'_> {
        StateView {
            prog_items: &self.prog_items,
            region_reachable: &self.region_reachable,
        }
    }

    pub fn item_count(&self, name: &str) -> usize {
        self.prog_items.get(name).copied().unwrap_or(0)
    }

    pub fn has(&self, name: &str) -> bool {
        self.item_count(name) > 0
    }

    // Adds the item to the multiset without sweeping. Returns the name actually counted:
    // the next tier for progressive items, None if nothing was counted.
    fn record(&mut self, world: &World, item: &Item, event: bool) -> Option<String> {
        if !event && !world.is_progression(item) {
            return None;
        }
        let name = match world.progressive.get(&item.name) {
            Some(tiers) => tiers.iter().find(|tier| !self.has(tier))?.clone(),
            None => item.name.clone(),
        };
        let count = self.prog_items.entry(name.clone()).or_insert(0);
        if let Some(&limit) = world.collect_limits.get(&name) {
            if *count >= limit {
                return None;
            }
        }
        *count += 1;
        self.stale = true;
        Some(name)
    }

    fn decrement(&mut self, name: &str) -> bool {
        match self.prog_items.get_mut(name) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.prog_items.remove(name);
                }
                true
            }
            _ => false,
        }
    }

    /// Collects an item. Event collects always count the item; otherwise only
    /// progression items count, and then any newly reachable events are swept in.
    pub fn collect(&mut self, world: &World, item: &Item, event: bool) -> bool {
        let changed = self.record(world, item, event).is_some();
        if changed && !event {
            self.sweep_for_events(world, false);
        }
        changed
    }

    /// Undoes a prior collect of `item`. Swept items are retracted and swept again in every
    /// mode used so far, so only what depended on `item` stays out.
    pub fn remove(&mut self, world: &World, item: &Item) {
        for swept in std::mem::take(&mut self.swept) {
            if let Some(name) = swept.recorded {
                self.decrement(&name);
            }
        }
        self.swept_locations.clear();

        let name = match world.progressive.get(&item.name) {
            Some(tiers) => tiers.iter().rev().find(|tier| self.has(tier)).cloned(),
            None => Some(item.name.clone()),
        };
        if let Some(name) = name {
            self.decrement(&name);
        }

        self.region_reachable.iter_mut().for_each(|r| *r = false);
        self.stale = true;

        for mode in self.sweep_modes.clone() {
            self.sweep(world, mode);
        }
    }

    fn update_reachability(&mut self, world: &World) {
        if !self.stale {
            return;
        }
        if self.region_reachable.len() != world.regions.len() {
            self.region_reachable = vec![false; world.regions.len()];
        }
        self.region_reachable[world.start_region] = true;
        // Entrance rules may themselves ask about other regions, so keep expanding until
        // a full pass over the entrances adds nothing.
        loop {
            let newly_reached: Vec<RegionId> = {
                let view = self.view();
                world
                    .entrances
                    .iter()
                    .filter(|e| {
                        view.region_reachable[e.from]
                            && !view.region_reachable[e.to]
                            && e.access.evaluate(&view)
                    })
                    .map(|e| e.to)
                    .collect()
            };
            if newly_reached.is_empty() {
                break;
            }
            for region_id in newly_reached {
                self.region_reachable[region_id] = true;
            }
        }
        self.stale = false;
    }

    pub fn can_reach_region(&mut self, world: &World, region_id: RegionId) -> bool {
        self.update_reachability(world);
        self.region_reachable[region_id]
    }

    pub fn can_reach_entrance(&mut self, world: &World, entrance_id: EntranceId) -> bool {
        self.update_reachability(world);
        let entrance = &world.entrances[entrance_id];
        self.region_reachable[entrance.from] && entrance.access.evaluate(&self.view())
    }

    pub fn can_reach_location(&mut self, world: &World, location_id: LocationId) -> bool {
        self.update_reachability(world);
        let location = &world.locations[location_id];
        self.region_reachable[location.region] && location.access.evaluate(&self.view())
    }

    pub fn can_reach(&mut self, world: &World, spot: Spot) -> bool {
        match spot {
            Spot::Region(id) => self.can_reach_region(world, id),
            Spot::Entrance(id) => self.can_reach_entrance(world, id),
            Spot::Location(id) => self.can_reach_location(world, id),
        }
    }

    pub fn evaluate(&mut self, world: &World, access: &Access) -> bool {
        self.update_reachability(world);
        access.evaluate(&self.view())
    }

    pub fn has_beaten_game(&mut self, world: &World) -> bool {
        self.evaluate(world, &world.goal)
    }

    fn note_mode(&mut self, mode: SweepMode) {
        if let Err(i) = self.sweep_modes.binary_search(&mode) {
            self.sweep_modes.insert(i, mode);
        }
    }

    // Collects the items at every location reachable right now that `mode` considers.
    // Returns how many.
    fn sweep_once(&mut self, world: &World, mode: SweepMode) -> usize {
        self.update_reachability(world);
        let found: Vec<LocationId> = {
            let view = self.view();
            world
                .locations
                .iter()
                .enumerate()
                .filter(|(i, loc)| {
                    !self.swept_locations.contains(i)
                        && loc.item.as_ref().is_some_and(|item| sweeps(world, mode, loc, item))
                        && view.region_reachable[loc.region]
                        && loc.access.evaluate(&view)
                })
                .map(|(i, _)| i)
                .collect()
        };
        for &location_id in &found {
            let recorded = match &world.locations[location_id].item {
                Some(item) => self.record(world, item, true),
                None => None,
            };
            self.swept_locations.insert(location_id);
            self.swept.push(SweptLocation {
                location_id,
                recorded,
            });
        }
        found.len()
    }

    fn sweep(&mut self, world: &World, mode: SweepMode) -> usize {
        self.note_mode(mode);
        let mut total = 0;
        loop {
            let n = self.sweep_once(world, mode);
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    }

    /// Collects the items of all reachable event locations, repeating until no more
    /// become reachable. With `key_only`, only event locations holding keys are considered.
    pub fn sweep_for_events(&mut self, world: &World, key_only: bool) -> usize {
        let n = self.sweep(world, SweepMode::Events { key_only });
        if n > 0 {
            debug!("Swept {} event locations (key_only={})", n, key_only);
        }
        n
    }

    /// Like `sweep_for_events`, but also collects progression items and keys already
    /// placed in ordinary locations.
    pub fn sweep_for_placements(&mut self, world: &World) -> usize {
        self.sweep(world, SweepMode::Placements)
    }

    /// Locations whose items have been collected by sweeps.
    pub fn swept_locations(&self) -> Vec<LocationId> {
        self.swept.iter().map(|s| s.location_id).collect()
    }

    pub fn reachable_locations(
        &mut self,
        world: &World,
        locations: &[LocationId],
    ) -> Vec<LocationId> {
        locations
            .iter()
            .copied()
            .filter(|&loc| self.can_reach_location(world, loc))
            .collect()
    }

    pub fn reachable_unfilled_locations(&mut self, world: &World) -> Vec<LocationId> {
        let unfilled = world.unfilled_locations();
        self.reachable_locations(world, &unfilled)
    }
}

// Keys count even when they are not progression: outside keysanity they sit in their
// own dungeon and are what the dungeon's rules test for.
fn counts_for_progress(world: &World, location: &Location, item: &Item) -> bool {
    location.event || world.is_progression(item) || item.is_key()
}

fn sweeps(world: &World, mode: SweepMode, location: &Location, item: &Item) -> bool {
    match mode {
        SweepMode::Events { key_only } => location.event && (!key_only || item.is_key()),
        SweepMode::Placements => counts_for_progress(world, location, item),
    }
}

/// State holding every item still in the pool (plus undistributed dungeon items when
/// `keys` is set), swept for events.
pub fn get_all_state(world: &World, keys: bool) -> CollectionState {
    let mut state = CollectionState::new(world);
    for item in &world.itempool {
        state.record(world, item, true);
    }
    if keys {
        for dungeon in &world.dungeons {
            for item in dungeon.all_items() {
                state.record(world, item, true);
            }
        }
    }
    state.sweep_for_events(world, false);
    state
}

/// Searches sphere by sphere through the placed items, starting from `starting_state`
/// (or a fresh state), and stops as soon as the goal holds.
pub fn can_beat_game(world: &World, starting_state: Option<&CollectionState>) -> bool {
    let mut state = match starting_state {
        Some(s) => s.clone(),
        None => CollectionState::new(world),
    };
    state.note_mode(SweepMode::Placements);
    loop {
        if state.has_beaten_game(world) {
            return true;
        }
        if state.sweep_once(world, SweepMode::Placements) == 0 {
            return false;
        }
    }
}

/// Whether collecting `item` would make some currently unreachable unfilled location reachable.
pub fn unlocks_new_location(world: &World, state: &CollectionState, item: &Item) -> bool {
    let mut before = state.clone();
    let mut after = state.clone();
    if !after.collect(world, item, true) {
        return false;
    }
    world
        .unfilled_locations()
        .into_iter()
        .any(|loc| after.can_reach_location(world, loc) && !before.can_reach_location(world, loc))
}
