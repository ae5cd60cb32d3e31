use crate::error::{RandomizeError, Result};
use crate::settings::Accessibility;
use hashbrown::HashMap;
use itemrando_game::{Item, ItemType, LocationId, World};
use itemrando_logic::{can_beat_game, get_all_state, unlocks_new_location, CollectionState};
use log::{debug, info, warn};
use rand::{seq::SliceRandom, Rng};

const MAX_DUNGEON_ATTEMPTS: usize = 10;

fn can_fill(
    world: &World,
    state: &mut CollectionState,
    location_id: LocationId,
    item: &Item,
    check_access: bool,
) -> bool {
    world.locations[location_id].item.is_none()
        && world.item_allowed(location_id, item)
        && (!check_access || state.can_reach_location(world, location_id))
}

fn all_locations_reachable(world: &World, state: &mut CollectionState) -> bool {
    (0..world.locations.len()).all(|loc| state.can_reach_location(world, loc))
}

/// Assumed fill: each item is placed somewhere reachable assuming every item still left
/// in `itempool` has been collected. Items are taken from the end of `itempool`, and the
/// first suitable entry of `locations` is used. Returns the filled locations in placement
/// order.
pub fn fill_restrictive(
    world: &mut World,
    base_state: &CollectionState,
    locations: &mut Vec<LocationId>,
    itempool: &mut Vec<Item>,
    accessibility: Accessibility,
) -> Result<Vec<LocationId>> {
    let mut placed: Vec<LocationId> = vec![];
    while let Some(item) = itempool.pop() {
        let mut exploration_state = base_state.clone();
        for remaining in itempool.iter() {
            exploration_state.collect(world, remaining, true);
        }
        exploration_state.sweep_for_placements(world);

        let check_access = match accessibility {
            Accessibility::Full => true,
            Accessibility::BeatableOnly => !exploration_state.has_beaten_game(world),
        };
        let spot = locations
            .iter()
            .position(|&loc| can_fill(world, &mut exploration_state, loc, &item, check_access));
        match spot {
            Some(i) => {
                let location_id = locations.remove(i);
                debug!(
                    "Placing {} at {}",
                    item.name, world.locations[location_id].name
                );
                world.push_item(location_id, item);
                placed.push(location_id);
            }
            None => {
                return Err(RandomizeError::GenerationFailure(format!(
                    "No more spots to place {}",
                    item.name
                )));
            }
        }
    }
    Ok(placed)
}

/// Places items from the end of `itempool` into locations from the end of
/// `fill_locations`, ignoring reachability. Item rules still apply.
pub fn fast_fill(
    world: &mut World,
    itempool: &mut Vec<Item>,
    fill_locations: &mut Vec<LocationId>,
) -> Result<()> {
    while !fill_locations.is_empty() {
        let Some(item) = itempool.pop() else {
            break;
        };
        let Some(i) = fill_locations
            .iter()
            .rposition(|&loc| world.item_allowed(loc, &item))
        else {
            return Err(RandomizeError::GenerationFailure(format!(
                "No allowed location left for {}",
                item.name
            )));
        };
        let location_id = fill_locations.remove(i);
        world.push_item(location_id, item);
    }
    Ok(())
}

pub fn distribute_items_restrictive<R: Rng>(
    world: &mut World,
    state: &mut CollectionState,
    trash_count: usize,
    fill_locations: Option<Vec<LocationId>>,
    accessibility: Accessibility,
    rng: &mut R,
) -> Result<()> {
    let mut fill_locations = fill_locations.unwrap_or_else(|| world.unfilled_locations());
    fill_locations.shuffle(rng);

    let pool = std::mem::take(&mut world.itempool);
    let mut progitempool: Vec<Item> = vec![];
    let mut prioitempool: Vec<Item> = vec![];
    let mut restitempool: Vec<Item> = vec![];
    for item in pool {
        if world.is_progression(&item) {
            progitempool.push(item);
        } else if item.is_priority() {
            prioitempool.push(item);
        } else {
            restitempool.push(item);
        }
    }

    if trash_count > 0 {
        let mut trash_locations: Vec<LocationId> = fill_locations
            .iter()
            .copied()
            .filter(|&loc| world.trash_regions.contains(&world.locations[loc].region))
            .collect();
        trash_locations.shuffle(rng);
        let mut trash_placed = 0;
        while trash_placed < trash_count {
            let Some(location_id) = trash_locations.pop() else {
                break;
            };
            let Some(i) = restitempool
                .iter()
                .rposition(|item| world.item_allowed(location_id, item))
            else {
                continue;
            };
            let item = restitempool.remove(i);
            world.push_item(location_id, item);
            fill_locations.retain(|&loc| loc != location_id);
            trash_placed += 1;
        }
        info!("Placed {trash_placed} filler items in trash regions");
    }

    fill_locations.shuffle(rng);
    fill_locations.reverse();
    let result = fill_restrictive(
        world,
        state,
        &mut fill_locations,
        &mut progitempool,
        accessibility,
    )
    .and_then(|_| {
        fill_locations.shuffle(rng);
        fast_fill(world, &mut prioitempool, &mut fill_locations)
    })
    .and_then(|_| fast_fill(world, &mut restitempool, &mut fill_locations));

    world.itempool.extend(progitempool);
    world.itempool.extend(prioitempool);
    world.itempool.extend(restitempool);
    result?;
    state.sweep_for_placements(world);
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct FillProgress {
    pub total_advancement: usize,
    pub placed_advancement: usize,
    pub progress_done: bool,
    pub advancement_placed: bool,
}

enum Selection {
    Place { index: usize, unlocking: bool },
    Stuck { candidate: Option<usize> },
}

fn select_item(
    world: &World,
    state: &CollectionState,
    itempool: &[Item],
    progress: &FillProgress,
) -> Selection {
    let mut candidate = None;
    for (i, item) in itempool.iter().enumerate() {
        if progress.advancement_placed
            || (progress.progress_done && (world.is_progression(item) || item.is_priority()))
        {
            return Selection::Place {
                index: i,
                unlocking: false,
            };
        }
        if world.is_progression(item) {
            candidate = Some(i);
            if unlocks_new_location(world, state, item) {
                return Selection::Place {
                    index: i,
                    unlocking: true,
                };
            }
        }
    }
    Selection::Stuck { candidate }
}

// Handles running out of progress with the goal already reachable.
fn finish_beatable(
    world: &mut World,
    itempool: &mut Vec<Item>,
    accessibility: Accessibility,
    reason: &str,
) -> Result<()> {
    match accessibility {
        Accessibility::Full => Err(RandomizeError::GenerationFailure(format!(
            "{reason}; not all locations reachable"
        ))),
        Accessibility::BeatableOnly => {
            warn!("{reason}. Game beatable anyway.");
            let mut fill_locations = world.unfilled_locations();
            fast_fill(world, itempool, &mut fill_locations)
        }
    }
}

fn forward_fill<R, F>(
    world: &mut World,
    state: &mut CollectionState,
    itempool: &mut Vec<Item>,
    accessibility: Accessibility,
    rng: &mut R,
    mut choose_spot: F,
) -> Result<()>
where
    R: Rng,
    F: FnMut(&World, &mut CollectionState, &[LocationId], &Item, &FillProgress, &mut R) -> Option<LocationId>,
{
    let mut fill_locations = world.unfilled_locations();
    fill_locations.shuffle(rng);
    let mut progress = FillProgress {
        total_advancement: itempool.iter().filter(|i| world.is_progression(i)).count(),
        ..Default::default()
    };
    state.sweep_for_events(world, false);

    while !itempool.is_empty() && !fill_locations.is_empty() {
        let (index, unlocking) = match select_item(world, state, itempool, &progress) {
            Selection::Place { index, unlocking } => (index, unlocking),
            Selection::Stuck { candidate } => {
                if !progress.progress_done && all_locations_reachable(world, state) {
                    progress.progress_done = true;
                    continue;
                }
                if progress.progress_done {
                    progress.advancement_placed = true;
                    continue;
                }
                match candidate {
                    // All new locations may need more than one item; place any progression item.
                    Some(i) => (i, false),
                    None => {
                        if can_beat_game(world, None) {
                            return finish_beatable(
                                world,
                                itempool,
                                accessibility,
                                "No progression items left",
                            );
                        }
                        return Err(RandomizeError::GenerationFailure(
                            "No more progression items to reach remaining locations".to_string(),
                        ));
                    }
                }
            }
        };

        let item = itempool[index].clone();
        match choose_spot(&*world, &mut *state, &fill_locations[..], &item, &progress, &mut *rng) {
            Some(location_id) => {
                if unlocking {
                    progress.placed_advancement += 1;
                }
                itempool.remove(index);
                fill_locations.retain(|&loc| loc != location_id);
                world.push_item(location_id, item.clone());
                state.collect(world, &item, false);
            }
            None => {
                if can_beat_game(world, None) {
                    return finish_beatable(
                        world,
                        itempool,
                        accessibility,
                        &format!("No reachable spot left for {}", item.name),
                    );
                }
                return Err(RandomizeError::GenerationFailure(format!(
                    "No more spots to place {}",
                    item.name
                )));
            }
        }
    }
    debug!(
        "Unplaced items: {:?} - Unfilled locations: {:?}",
        itempool.iter().map(|i| &i.name).collect::<Vec<_>>(),
        world.location_names(&fill_locations)
    );
    Ok(())
}

// Runs a fill over the world's pool, handing back whatever it could not place.
fn with_itempool<T>(world: &mut World, f: impl FnOnce(&mut World, &mut Vec<Item>) -> T) -> T {
    let mut itempool = std::mem::take(&mut world.itempool);
    let out = f(world, &mut itempool);
    world.itempool.extend(itempool);
    out
}

/// Forward fill that walks the location list front to back until `cutoff_rate` of the
/// progression items have been placed, and back to front after that.
pub fn distribute_items_cutoff<R: Rng>(
    world: &mut World,
    state: &mut CollectionState,
    cutoff_rate: f32,
    accessibility: Accessibility,
    rng: &mut R,
) -> Result<()> {
    with_itempool(world, |world, itempool| {
        forward_fill(
            world,
            state,
            itempool,
            accessibility,
            rng,
            |world, state, fill_locations, item, progress, _rng| {
                let rate = if progress.total_advancement == 0 {
                    1.0
                } else {
                    progress.placed_advancement as f32 / progress.total_advancement as f32
                };
                if rate < cutoff_rate {
                    fill_locations
                        .iter()
                        .copied()
                        .find(|&loc| can_fill(world, state, loc, item, true))
                } else {
                    fill_locations
                        .iter()
                        .rev()
                        .copied()
                        .find(|&loc| can_fill(world, state, loc, item, true))
                }
            },
        )
    })
}

/// Forward fill that skips, with growing probability, locations found unreachable on
/// earlier passes, so that long-blocked locations don't soak up progression items.
pub fn distribute_items_staleness<R: Rng>(
    world: &mut World,
    state: &mut CollectionState,
    accessibility: Accessibility,
    rng: &mut R,
) -> Result<()> {
    let mut staleness: HashMap<LocationId, usize> = HashMap::new();
    with_itempool(world, |world, itempool| {
        forward_fill(
            world,
            state,
            itempool,
            accessibility,
            rng,
            |world, state, fill_locations, item, progress, rng| {
                for &loc in fill_locations {
                    let stale_count = staleness.get(&loc).copied().unwrap_or(0);
                    if !progress.progress_done && rng.gen_range(0..=stale_count) > 2 {
                        continue;
                    }
                    if can_fill(world, state, loc, item, true) {
                        return Some(loc);
                    }
                    *staleness.entry(loc).or_insert(0) += 1;
                }
                // Too many may have been skipped; try again without the staleness check.
                fill_locations
                    .iter()
                    .copied()
                    .find(|&loc| can_fill(world, state, loc, item, true))
            },
        )
    })
}

/// Places the front of the pool anywhere reachable. When nothing fits, swaps a reachable
/// filler item out for a progression item that opens up new locations.
pub fn flood_items<R: Rng>(
    world: &mut World,
    state: &mut CollectionState,
    accessibility: Accessibility,
    rng: &mut R,
) -> Result<()> {
    with_itempool(world, |world, itempool| {
        flood_fill(world, state, itempool, accessibility, rng)
    })
}

fn flood_fill<R: Rng>(
    world: &mut World,
    state: &mut CollectionState,
    itempool: &mut Vec<Item>,
    accessibility: Accessibility,
    rng: &mut R,
) -> Result<()> {
    state.sweep_for_events(world, false);
    loop {
        let mut location_list = world.unfilled_locations();
        if itempool.is_empty() || location_list.is_empty() {
            return Ok(());
        }
        location_list.shuffle(rng);
        let item = itempool[0].clone();
        if let Some(location_id) = location_list
            .iter()
            .copied()
            .find(|&loc| can_fill(world, state, loc, &item, true))
        {
            itempool.remove(0);
            world.push_item(location_id, item.clone());
            state.collect(world, &item, false);
            continue;
        }

        if all_locations_reachable(world, state) {
            return fast_fill(world, itempool, &mut location_list);
        }

        let progress = FillProgress::default();
        let index = match select_item(world, state, itempool, &progress) {
            Selection::Place { index, .. } => index,
            Selection::Stuck {
                candidate: Some(index),
            } => index,
            Selection::Stuck { candidate: None } => {
                if can_beat_game(world, None) {
                    return finish_beatable(
                        world,
                        itempool,
                        accessibility,
                        "No progression items left",
                    );
                }
                return Err(RandomizeError::GenerationFailure(
                    "No more progression items to reach remaining locations".to_string(),
                ));
            }
        };
        let item_to_place = itempool[index].clone();

        let filled = world.filled_locations();
        let mut reachable = state.reachable_locations(world, &filled);
        reachable.shuffle(rng);
        let replaceable = reachable.into_iter().find(|&loc| {
            let location = &world.locations[loc];
            !location.event
                && world.item_allowed(loc, &item_to_place)
                && location.item.as_ref().is_some_and(|placed| {
                    !world.is_progression(placed)
                        && !placed.is_priority()
                        && !placed.is_key()
                        && !placed.is_event()
                })
        });
        let Some(location_id) = replaceable else {
            return Err(RandomizeError::GenerationFailure(format!(
                "No filler item left to displace for {}",
                item_to_place.name
            )));
        };
        let replaced = world.locations[location_id].item.take();
        debug!(
            "Displacing {:?} at {} with {}",
            replaced.as_ref().map(|i| &i.name),
            world.locations[location_id].name,
            item_to_place.name
        );
        itempool.remove(index);
        itempool.extend(replaced);
        world.push_item(location_id, item_to_place.clone());
        state.collect(world, &item_to_place, false);
    }
}

fn dungeon_item_order(item: &Item) -> usize {
    match item.item_type {
        Some(ItemType::BigKey) => 3,
        Some(ItemType::SmallKey) => 2,
        _ => 1,
    }
}

/// Places each dungeon's keys inside that dungeon: the big key first, then the small keys
/// one at a time where the keys placed so far can reach. The key locations become event
/// locations. Maps, compasses and the like go into the dungeon's remaining locations.
pub fn fill_dungeons<R: Rng>(world: &mut World, rng: &mut R) -> Result<()> {
    let all_state_base = get_all_state(world, false);
    for dungeon_id in 0..world.dungeons.len() {
        let mut placed = false;
        for attempt in 0..MAX_DUNGEON_ATTEMPTS {
            let filled = try_fill_dungeon(world, &all_state_base, dungeon_id, rng);
            if filled {
                placed = true;
                break;
            }
            debug!(
                "Retrying key placement in {} (attempt {})",
                world.dungeons[dungeon_id].name,
                attempt + 1
            );
        }
        if !placed {
            return Err(RandomizeError::GenerationFailure(format!(
                "Unable to place keys in {}",
                world.dungeons[dungeon_id].name
            )));
        }
        world.dungeons[dungeon_id].take_items();
    }
    Ok(())
}

// On failure every placement made by this call is undone.
fn try_fill_dungeon<R: Rng>(
    world: &mut World,
    all_state_base: &CollectionState,
    dungeon_id: usize,
    rng: &mut R,
) -> bool {
    let dungeon = world.dungeons[dungeon_id].clone();
    let mut dungeon_locations: Vec<LocationId> = world
        .unfilled_locations()
        .into_iter()
        .filter(|&loc| world.location_dungeon(loc) == Some(dungeon_id))
        .collect();
    dungeon_locations.shuffle(rng);
    let mut placed: Vec<LocationId> = vec![];
    let mut all_state = all_state_base.clone();

    let mut place_key = |world: &mut World,
                         all_state: &mut CollectionState,
                         dungeon_locations: &mut Vec<LocationId>,
                         key: &Item|
     -> bool {
        all_state.sweep_for_placements(world);
        let spot = dungeon_locations
            .iter()
            .position(|&loc| can_fill(world, all_state, loc, key, true));
        match spot {
            Some(i) => {
                let location_id = dungeon_locations.remove(i);
                world.push_item(location_id, key.clone());
                world.locations[location_id].event = true;
                placed.push(location_id);
                true
            }
            None => false,
        }
    };

    let mut ok = true;
    if let Some(big_key) = &dungeon.big_key {
        // The big key only has to be reachable once every small key is in hand.
        let mut bk_state = all_state.clone();
        for small_key in &dungeon.small_keys {
            bk_state.collect(world, small_key, true);
        }
        ok = place_key(world, &mut bk_state, &mut dungeon_locations, big_key);
    }
    for small_key in dungeon.small_keys.iter().rev() {
        if !ok {
            break;
        }
        ok = place_key(world, &mut all_state, &mut dungeon_locations, small_key);
    }
    if ok {
        for dungeon_item in &dungeon.dungeon_items {
            let Some(i) = dungeon_locations
                .iter()
                .rposition(|&loc| world.item_allowed(loc, dungeon_item))
            else {
                ok = false;
                break;
            };
            let location_id = dungeon_locations.remove(i);
            world.push_item(location_id, dungeon_item.clone());
            placed.push(location_id);
        }
    }

    if !ok {
        for location_id in placed {
            world.locations[location_id].item = None;
            world.locations[location_id].event = false;
        }
    }
    ok
}

/// Restrictive fill of every dungeon item into `shuffled_locations`, big keys before small
/// keys before the rest. Item rules keep each item inside its own dungeon.
pub fn fill_dungeons_restrictive(
    world: &mut World,
    shuffled_locations: &mut Vec<LocationId>,
    accessibility: Accessibility,
) -> Result<()> {
    let all_state_base = get_all_state(world, false);
    let mut dungeon_items: Vec<Item> = world
        .dungeons
        .iter_mut()
        .flat_map(|dungeon| dungeon.take_items())
        .collect();
    // Items are placed from the end of the list.
    dungeon_items.sort_by_key(dungeon_item_order);
    let num_items = dungeon_items.len();

    let unfilled_before: Vec<LocationId> = shuffled_locations.clone();
    fill_restrictive(
        world,
        &all_state_base,
        shuffled_locations,
        &mut dungeon_items,
        accessibility,
    )?;
    for location_id in unfilled_before {
        let location = &mut world.locations[location_id];
        if location.item.as_ref().is_some_and(|item| item.is_key()) {
            location.event = true;
        }
    }
    info!("Placed {num_items} dungeon items");
    Ok(())
}

/// Fills the prize locations (e.g. dungeon bosses) with the prize items, then turns them
/// into event locations.
pub fn fill_prizes<R: Rng>(
    world: &mut World,
    accessibility: Accessibility,
    rng: &mut R,
) -> Result<()> {
    if world.prize_items.is_empty() {
        return Ok(());
    }
    let all_state = get_all_state(world, true);
    let mut prize_locations: Vec<LocationId> = world
        .prize_locations
        .iter()
        .copied()
        .filter(|&loc| world.locations[loc].item.is_none())
        .collect();
    prize_locations.shuffle(rng);
    let mut prizes = std::mem::take(&mut world.prize_items);
    let result = fill_restrictive(
        world,
        &all_state,
        &mut prize_locations,
        &mut prizes,
        accessibility,
    );
    world.prize_items = prizes;
    result?;
    for &location_id in &world.prize_locations {
        if world.locations[location_id].item.is_some() {
            world.locations[location_id].event = true;
        }
    }
    Ok(())
}
