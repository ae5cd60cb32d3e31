use crate::error::{RandomizeError, Result};
use crate::settings::{Accessibility, PruneOrder};
use itemrando_game::{Item, LocationId, World};
use itemrando_logic::CollectionState;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SphereEntry {
    pub location: String,
    pub item: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Playthrough {
    pub spheres: Vec<Vec<SphereEntry>>,
    pub required_locations: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct PlaythroughOptions {
    pub keysanity: bool, // Keys are ordinary progression: full sweeps, keys appear in spheres
    pub accessibility: Accessibility,
    pub prune_order: PruneOrder,
}

impl Default for PlaythroughOptions {
    fn default() -> Self {
        PlaythroughOptions {
            keysanity: false,
            accessibility: Accessibility::Full,
            prune_order: PruneOrder::LatestSphereFirst,
        }
    }
}

/// A single pending removal of a location's item. Either `rollback` puts the item back,
/// or `commit` makes the removal permanent.
#[must_use]
pub struct ItemRemoval {
    location_id: LocationId,
    item: Option<Item>,
}

impl ItemRemoval {
    pub fn take(world: &mut World, location_id: LocationId) -> ItemRemoval {
        ItemRemoval {
            location_id,
            item: world.locations[location_id].item.take(),
        }
    }

    pub fn rollback(self, world: &mut World) {
        world.locations[self.location_id].item = self.item;
    }

    pub fn commit(self) -> Option<Item> {
        self.item
    }
}

fn is_sphere_candidate(world: &World, location_id: LocationId, keysanity: bool) -> bool {
    let location = &world.locations[location_id];
    match &location.item {
        // Event locations the sweep already collects never show up as sphere entries.
        Some(item) => {
            world.is_progression(item) && !(location.event && (keysanity || item.is_key()))
        }
        None => false,
    }
}

fn entry(world: &World, location_id: LocationId) -> SphereEntry {
    let location = &world.locations[location_id];
    SphereEntry {
        location: location.name.clone(),
        item: location
            .item
            .as_ref()
            .map(|item| item.name.clone())
            .unwrap_or_default(),
    }
}

fn sphere_candidates(world: &World, keysanity: bool) -> Vec<LocationId> {
    (0..world.locations.len())
        .filter(|&loc| is_sphere_candidate(world, loc, keysanity))
        .collect()
}

/// Splits the placed progression items of `world` into spheres: each sphere holds the
/// candidate locations reachable with everything collected in the spheres before it.
/// The spheres cover every candidate at most once; candidates left over are unreachable,
/// which is only accepted when the goal is met without them.
pub fn compute_spheres(world: &World, keysanity: bool) -> Result<Vec<Vec<LocationId>>> {
    // Keysanity runs the full event sweep, so event locations are collected silently
    // and never listed; otherwise only key events are.
    let key_only = !keysanity;
    let mut state = CollectionState::new(world);
    let mut prog_locations = sphere_candidates(world, keysanity);
    let mut spheres: Vec<Vec<LocationId>> = vec![];

    while !prog_locations.is_empty() {
        state.sweep_for_events(world, key_only);
        let sphere: Vec<LocationId> = state.reachable_locations(world, &prog_locations);
        if sphere.is_empty() {
            if state.has_beaten_game(world) {
                warn!(
                    "Not all progression items reachable ({} left). Game beatable anyway.",
                    prog_locations.len()
                );
                break;
            }
            return Err(unreachable_failure(
                world,
                &prog_locations,
                "Not all progression items reachable",
            ));
        }
        prog_locations.retain(|loc| !sphere.contains(loc));
        for &location_id in &sphere {
            if let Some(item) = &world.locations[location_id].item {
                state.collect(world, item, true);
            }
        }
        debug!("Sphere {}: {} locations", spheres.len(), sphere.len());
        spheres.push(sphere);
    }
    state.sweep_for_events(world, key_only);
    if !state.has_beaten_game(world) {
        return Err(unreachable_failure(
            world,
            &prog_locations,
            "Cannot beat game after collecting every reachable progression item",
        ));
    }
    Ok(spheres)
}

/// Computes the spheres, then strips every placement that `win_condition` shows the game
/// can do without. Works on a copy of the world.
pub fn create_playthrough(
    world: &World,
    options: &PlaythroughOptions,
    win_condition: &dyn Fn(&World) -> bool,
) -> Result<Playthrough> {
    let mut world = world.clone();
    world.keysanity = options.keysanity;
    if options.accessibility == Accessibility::BeatableOnly && !win_condition(&world) {
        let mut state = CollectionState::new(&world);
        state.sweep_for_placements(&world);
        let candidates = sphere_candidates(&world, options.keysanity);
        let reachable = state.reachable_locations(&world, &candidates);
        let unreached: Vec<LocationId> = candidates
            .into_iter()
            .filter(|loc| !reachable.contains(loc))
            .collect();
        return Err(unreachable_failure(&world, &unreached, "Game not beatable"));
    }

    let spheres = compute_spheres(&world, options.keysanity)?;

    let sphere_order: Vec<usize> = match options.prune_order {
        PruneOrder::LatestSphereFirst => (0..spheres.len()).rev().collect(),
        PruneOrder::EarliestSphereFirst => (0..spheres.len()).collect(),
    };
    let mut pruned: Vec<Vec<SphereEntry>> = vec![vec![]; spheres.len()];
    for num in sphere_order {
        for &location_id in &spheres[num] {
            let removal = ItemRemoval::take(&mut world, location_id);
            if win_condition(&world) {
                let item = removal.commit();
                debug!(
                    "{:?} at {} is not required",
                    item.map(|i| i.name),
                    world.locations[location_id].name
                );
            } else {
                removal.rollback(&mut world);
                pruned[num].push(entry(&world, location_id));
            }
        }
    }
    pruned.retain(|sphere| !sphere.is_empty());

    let required_locations: Vec<String> = pruned
        .iter()
        .flat_map(|sphere| sphere.iter().map(|e| e.location.clone()))
        .collect();
    info!(
        "Playthrough: {} spheres, {} required locations",
        pruned.len(),
        required_locations.len()
    );
    Ok(Playthrough {
        spheres: pruned,
        required_locations,
    })
}

fn unreachable_failure(
    world: &World,
    prog_locations: &[LocationId],
    message: &str,
) -> RandomizeError {
    RandomizeError::ConsistencyFailure {
        message: message.to_string(),
        unreached: world.location_names(prog_locations),
        uncollected: prog_locations
            .iter()
            .filter_map(|&loc| world.locations[loc].item.as_ref())
            .map(|item| item.name.clone())
            .collect(),
    }
}
