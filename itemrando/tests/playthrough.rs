use anyhow::Result;
use itemrando::error::RandomizeError;
use itemrando::playthrough::{
    compute_spheres, create_playthrough, Playthrough, PlaythroughOptions, SphereEntry,
};
use itemrando::settings::{Accessibility, PruneOrder};
use itemrando_game::{World, WorldDef};
use itemrando_logic::can_beat_game;
use serde_json::json;

fn world_from(value: serde_json::Value) -> Result<World> {
    let def: WorldDef = serde_json::from_value(value)?;
    World::from_def(&def)
}

fn place(world: &mut World, location: &str, item: &str) -> Result<()> {
    let location_id = world.get_location_id(location)?;
    let item = world.create_item(item)?;
    world.push_item(location_id, item);
    Ok(())
}

fn beatable(world: &World) -> bool {
    can_beat_game(world, None)
}

fn names(playthrough: &Playthrough) -> Vec<Vec<(&str, &str)>> {
    playthrough
        .spheres
        .iter()
        .map(|sphere| {
            sphere
                .iter()
                .map(|e| (e.location.as_str(), e.item.as_str()))
                .collect()
        })
        .collect()
}

fn capacity_world() -> Result<World> {
    let mut world = world_from(json!({
        "name": "capacity",
        "start_region": "Start",
        "regions": ["Start"],
        "locations": [
            {"name": "L1", "region": "Start"},
            {"name": "L2", "region": "Start"},
            {"name": "Boss", "region": "Start", "rule": {"has": "Capacity Upgrade"}}
        ],
        "items": [
            {"name": "Capacity Upgrade", "classification": "advancement"},
            {"name": "Triforce", "classification": "advancement", "type": "event"}
        ],
        "events": [{"location": "Boss", "item": "Triforce"}],
        "goal": {"has": "Triforce"}
    }))?;
    place(&mut world, "L1", "Capacity Upgrade")?;
    place(&mut world, "L2", "Capacity Upgrade")?;
    Ok(world)
}

// Shelf and Rack are open; High Shelf needs the sword from the rack. Both shelves hold
// a capacity upgrade, and the boss needs one of them.
fn duplicate_world() -> Result<World> {
    let mut world = world_from(json!({
        "name": "duplicates",
        "start_region": "Start",
        "regions": ["Start"],
        "locations": [
            {"name": "Shelf", "region": "Start"},
            {"name": "High Shelf", "region": "Start", "rule": {"has": "Sword"}},
            {"name": "Rack", "region": "Start"},
            {"name": "Boss", "region": "Start", "rule": {"has": "Capacity Upgrade"}}
        ],
        "items": [
            {"name": "Capacity Upgrade", "classification": "advancement"},
            {"name": "Sword", "classification": "advancement"},
            {"name": "Triforce", "classification": "advancement", "type": "event"}
        ],
        "events": [{"location": "Boss", "item": "Triforce"}],
        "goal": {"has": "Triforce"}
    }))?;
    place(&mut world, "Shelf", "Capacity Upgrade")?;
    place(&mut world, "High Shelf", "Capacity Upgrade")?;
    place(&mut world, "Rack", "Sword")?;
    Ok(world)
}

// Room i holds the key to room i + 1; the last room holds the goal.
fn chain_world(keys_in_order: bool) -> Result<World> {
    let mut world = world_from(json!({
        "name": "chain",
        "start_region": "Room 0",
        "regions": ["Room 0", "Room 1", "Room 2", "Room 3"],
        "entrances": [
            {"name": "Door 1", "from": "Room 0", "to": "Room 1", "rule": {"has": "Key 1"}},
            {"name": "Door 2", "from": "Room 1", "to": "Room 2", "rule": {"has": "Key 2"}},
            {"name": "Door 3", "from": "Room 2", "to": "Room 3", "rule": {"has": "Key 3"}}
        ],
        "locations": [
            {"name": "Chest 0", "region": "Room 0"},
            {"name": "Chest 1", "region": "Room 1"},
            {"name": "Chest 2", "region": "Room 2"},
            {"name": "Pot 0", "region": "Room 0"},
            {"name": "Crown Room", "region": "Room 3"}
        ],
        "items": [
            {"name": "Key 1", "classification": "advancement"},
            {"name": "Key 2", "classification": "advancement"},
            {"name": "Key 3", "classification": "advancement"},
            {"name": "Rupee", "classification": "filler"},
            {"name": "Crown", "classification": "advancement", "type": "event"}
        ],
        "events": [{"location": "Crown Room", "item": "Crown"}],
        "goal": {"has": "Crown"}
    }))?;
    place(&mut world, "Chest 0", "Key 1")?;
    if keys_in_order {
        place(&mut world, "Chest 1", "Key 2")?;
        place(&mut world, "Chest 2", "Key 3")?;
    } else {
        place(&mut world, "Chest 1", "Key 3")?;
        place(&mut world, "Chest 2", "Key 2")?;
    }
    place(&mut world, "Pot 0", "Rupee")?;
    Ok(world)
}

#[test]
fn redundant_duplicate_is_pruned() -> Result<()> {
    let world = capacity_world()?;
    let playthrough = create_playthrough(&world, &PlaythroughOptions::default(), &beatable)?;
    assert_eq!(
        names(&playthrough),
        vec![
            vec![("L2", "Capacity Upgrade")],
            vec![("Boss", "Triforce")]
        ]
    );
    assert_eq!(playthrough.required_locations, vec!["L2", "Boss"]);

    // The analysis works on a copy; the input keeps both upgrades.
    assert!(world.locations.iter().all(|loc| loc.item.is_some()));
    assert!(beatable(&world));
    Ok(())
}

#[test]
fn prune_order_decides_which_duplicate_stays() -> Result<()> {
    let world = duplicate_world()?;

    let latest_first = create_playthrough(&world, &PlaythroughOptions::default(), &beatable)?;
    assert_eq!(
        names(&latest_first),
        vec![
            vec![("Shelf", "Capacity Upgrade")],
            vec![("Boss", "Triforce")]
        ]
    );

    let options = PlaythroughOptions {
        prune_order: PruneOrder::EarliestSphereFirst,
        ..Default::default()
    };
    let earliest_first = create_playthrough(&world, &options, &beatable)?;
    assert_eq!(
        names(&earliest_first),
        vec![
            vec![("Rack", "Sword")],
            vec![("High Shelf", "Capacity Upgrade"), ("Boss", "Triforce")]
        ]
    );
    Ok(())
}

#[test]
fn spheres_follow_unlock_order() -> Result<()> {
    let world = chain_world(true)?;
    let playthrough = create_playthrough(&world, &PlaythroughOptions::default(), &beatable)?;
    assert_eq!(
        playthrough.spheres,
        vec![
            vec![SphereEntry {
                location: "Chest 0".to_string(),
                item: "Key 1".to_string()
            }],
            vec![SphereEntry {
                location: "Chest 1".to_string(),
                item: "Key 2".to_string()
            }],
            vec![SphereEntry {
                location: "Chest 2".to_string(),
                item: "Key 3".to_string()
            }],
            vec![SphereEntry {
                location: "Crown Room".to_string(),
                item: "Crown".to_string()
            }],
        ]
    );
    Ok(())
}

#[test]
fn pruned_playthrough_is_minimal_and_stable() -> Result<()> {
    for world in [capacity_world()?, duplicate_world()?, chain_world(true)?] {
        let options = PlaythroughOptions::default();
        let playthrough = create_playthrough(&world, &options, &beatable)?;
        let again = create_playthrough(&world, &options, &beatable)?;
        assert_eq!(playthrough, again);

        // Rebuild the pruned world: progression left only where the playthrough needs it.
        let mut pruned = world.clone();
        for location in pruned.locations.iter_mut() {
            let progression = location.item.as_ref().is_some_and(|i| i.is_advancement());
            if progression && !playthrough.required_locations.contains(&location.name) {
                location.item = None;
            }
        }
        assert!(beatable(&pruned));

        let mut seen = vec![];
        for location in &playthrough.required_locations {
            assert!(!seen.contains(location), "{location} listed twice");
            seen.push(location.clone());

            let mut without = pruned.clone();
            let location_id = without.get_location_id(location)?;
            without.locations[location_id].item = None;
            assert!(!beatable(&without), "{location} was not required");
        }
    }
    Ok(())
}

#[test]
fn unbeatable_world_is_a_consistency_failure() -> Result<()> {
    // Key 3 sits behind door 2, and key 2 behind door 3.
    let world = chain_world(false)?;
    let result = create_playthrough(&world, &PlaythroughOptions::default(), &beatable);
    match result {
        Err(RandomizeError::ConsistencyFailure {
            unreached,
            uncollected,
            ..
        }) => {
            assert_eq!(unreached, vec!["Chest 2", "Crown Room"]);
            assert_eq!(uncollected, vec!["Key 2", "Crown"]);
        }
        other => panic!("expected a consistency failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn beatable_only_failure_lists_unreached_locations() -> Result<()> {
    let world = chain_world(false)?;
    let options = PlaythroughOptions {
        accessibility: Accessibility::BeatableOnly,
        ..Default::default()
    };
    match create_playthrough(&world, &options, &beatable) {
        Err(RandomizeError::ConsistencyFailure {
            unreached,
            uncollected,
            ..
        }) => {
            assert_eq!(unreached, vec!["Chest 2", "Crown Room"]);
            assert_eq!(uncollected, vec!["Key 2", "Crown"]);
        }
        other => panic!("expected a consistency failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn spheres_cover_each_progress_location_once() -> Result<()> {
    let world = duplicate_world()?;
    let spheres = compute_spheres(&world, false)?;
    let sphere_names: Vec<Vec<String>> = spheres
        .iter()
        .map(|sphere| world.location_names(sphere))
        .collect();
    assert_eq!(
        sphere_names,
        vec![vec!["Shelf", "Rack"], vec!["High Shelf", "Boss"]]
    );

    for world in [capacity_world()?, duplicate_world()?, chain_world(true)?] {
        let spheres = compute_spheres(&world, false)?;
        let mut covered: Vec<usize> = spheres.iter().flatten().copied().collect();
        let total = covered.len();
        covered.sort();
        covered.dedup();
        assert_eq!(covered.len(), total, "a location appears in two spheres");

        let progress: Vec<usize> = (0..world.locations.len())
            .filter(|&loc| {
                world.locations[loc]
                    .item
                    .as_ref()
                    .is_some_and(|item| item.is_advancement())
            })
            .collect();
        assert_eq!(covered, progress);
    }
    Ok(())
}

#[test]
fn keys_are_swept_or_listed_by_mode() -> Result<()> {
    let definition = json!({
        "name": "keys",
        "start_region": "Start",
        "regions": ["Start", "Dungeon"],
        "entrances": [
            {"name": "Dungeon Door", "from": "Start", "to": "Dungeon", "rule": {"has": "Small Key"}}
        ],
        "locations": [
            {"name": "Key Ledge", "region": "Start"},
            {"name": "Altar", "region": "Dungeon"}
        ],
        "items": [
            {"name": "Small Key", "classification": "filler", "type": "small_key"},
            {"name": "Crown", "classification": "advancement", "type": "event"}
        ],
        "events": [{"location": "Altar", "item": "Crown"}],
        "goal": {"has": "Crown"}
    });

    // Pre-placed key: an event location collected by the key sweep.
    let mut world = world_from(definition.clone())?;
    place(&mut world, "Key Ledge", "Small Key")?;
    let key_ledge = world.get_location_id("Key Ledge")?;
    world.locations[key_ledge].event = true;
    let standard = create_playthrough(&world, &PlaythroughOptions::default(), &beatable)?;
    assert_eq!(names(&standard), vec![vec![("Altar", "Crown")]]);

    // Shuffled key: ordinary progression that shows up in the spheres, while every event
    // is left to the full sweep.
    let mut world = world_from(definition)?;
    world.keysanity = true;
    place(&mut world, "Key Ledge", "Small Key")?;
    let options = PlaythroughOptions {
        keysanity: true,
        ..Default::default()
    };
    let keysanity = create_playthrough(&world, &options, &beatable)?;
    assert_eq!(names(&keysanity), vec![vec![("Key Ledge", "Small Key")]]);
    assert_eq!(keysanity.required_locations, vec!["Key Ledge"]);
    Ok(())
}
