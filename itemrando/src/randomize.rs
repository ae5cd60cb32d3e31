use crate::error::{RandomizeError, Result};
use crate::fill::{
    distribute_items_cutoff, distribute_items_restrictive, distribute_items_staleness,
    fill_dungeons, fill_dungeons_restrictive, fill_prizes, flood_items,
};
use crate::playthrough::{create_playthrough, Playthrough, PlaythroughOptions};
use crate::settings::{FillAlgorithm, RandomizerSettings};
use crate::spoiler_log::SpoilerLog;
use itemrando_game::{Item, LocationId, World};
use itemrando_logic::{can_beat_game, CollectionState};
use log::info;
use rand::{seq::SliceRandom, SeedableRng};

pub struct Randomizer<'a> {
    pub world: &'a World,
    pub settings: &'a RandomizerSettings,
}

#[derive(Clone, Debug)]
pub struct Randomization {
    pub world: World,
    pub placements: Vec<(String, String)>, // (location name, item name) for every filled location
    pub playthrough: Playthrough,
    pub spoiler_log: SpoilerLog,
    pub seed: usize,
}

impl<'a> Randomizer<'a> {
    pub fn new(world: &'a World, settings: &'a RandomizerSettings) -> Result<Randomizer<'a>> {
        settings.validate()?;
        Ok(Randomizer { world, settings })
    }

    fn check_conservation(world: &World) -> Option<String> {
        let unfilled = world.unfilled_locations().len();
        let pool = world.itempool.len();
        if unfilled != pool {
            Some(format!(
                "{unfilled} unfilled locations but {pool} items in the pool"
            ))
        } else {
            None
        }
    }

    /// One generation attempt. A `GenerationFailure` means this seed didn't work out and
    /// another one may; every other error is final.
    pub fn randomize(&self, attempt_num_rando: usize, seed: usize) -> Result<Randomization> {
        let mut rng_seed = [0u8; 32];
        rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
        let mut rng = rand::rngs::StdRng::from_seed(rng_seed);
        let settings = self.settings;

        let mut world = self.world.clone();
        world.keysanity = settings.keysanity;
        if settings.keysanity {
            let dungeon_items: Vec<Item> = world
                .dungeons
                .iter_mut()
                .flat_map(|dungeon| dungeon.take_items())
                .collect();
            info!(
                "[attempt {attempt_num_rando}] Moving {} dungeon items into the item pool",
                dungeon_items.len()
            );
            world.itempool.extend(dungeon_items);
        }

        fill_prizes(&mut world, settings.accessibility, &mut rng)?;

        let mut fill_locations: Option<Vec<LocationId>> = None;
        if settings.shuffle_dungeon_items {
            let mut shuffled_locations = world.unfilled_locations();
            shuffled_locations.shuffle(&mut rng);
            fill_dungeons_restrictive(&mut world, &mut shuffled_locations, settings.accessibility)?;
            fill_locations = Some(shuffled_locations);
        } else if !settings.keysanity {
            fill_dungeons(&mut world, &mut rng)?;
        }

        if let Some(msg) = Self::check_conservation(&world) {
            return Err(RandomizeError::InvalidConfiguration(msg));
        }
        info!(
            "[attempt {attempt_num_rando}] Filling {} locations using {} algorithm",
            world.itempool.len(),
            settings.algorithm
        );

        world.itempool.shuffle(&mut rng);
        let mut state = CollectionState::new(&world);
        match settings.algorithm {
            FillAlgorithm::Restrictive => {
                let trash_count = settings.trash_fill.count(&mut rng);
                distribute_items_restrictive(
                    &mut world,
                    &mut state,
                    trash_count,
                    fill_locations,
                    settings.accessibility,
                    &mut rng,
                )?;
            }
            FillAlgorithm::Cutoff => {
                distribute_items_cutoff(
                    &mut world,
                    &mut state,
                    settings.cutoff_rate,
                    settings.accessibility,
                    &mut rng,
                )?;
            }
            FillAlgorithm::Staleness => {
                distribute_items_staleness(&mut world, &mut state, settings.accessibility, &mut rng)?;
            }
            FillAlgorithm::Flood => {
                flood_items(&mut world, &mut state, settings.accessibility, &mut rng)?;
            }
        }

        if !world.itempool.is_empty() || !world.unfilled_locations().is_empty() {
            return Err(RandomizeError::GenerationFailure(format!(
                "[attempt {attempt_num_rando}] {} items left unplaced, {} locations left unfilled",
                world.itempool.len(),
                world.unfilled_locations().len()
            )));
        }

        let options = PlaythroughOptions {
            keysanity: settings.keysanity,
            accessibility: settings.accessibility,
            prune_order: settings.prune_order,
        };
        let playthrough = create_playthrough(&world, &options, &|w: &World| {
            can_beat_game(w, None)
        })?;
        info!(
            "[attempt {attempt_num_rando}] Playthrough has {} spheres",
            playthrough.spheres.len()
        );

        let placements: Vec<(String, String)> = world
            .locations
            .iter()
            .filter_map(|loc| {
                loc.item
                    .as_ref()
                    .map(|item| (loc.name.clone(), item.name.clone()))
            })
            .collect();
        let spoiler_log = SpoilerLog::new(seed, &world, settings, &playthrough);
        Ok(Randomization {
            world,
            placements,
            playthrough,
            spoiler_log,
            seed,
        })
    }
}
