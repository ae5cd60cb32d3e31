use anyhow::{Context, Result};
use itemrando_game::World;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    playthrough::{Playthrough, SphereEntry},
    settings::RandomizerSettings,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilerLog {
    pub seed: usize,
    pub world: String,
    pub settings: RandomizerSettings,
    pub locations: Vec<SpoilerLocation>,
    pub playthrough: Vec<SpoilerSphere>,
    pub required_locations: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilerLocation {
    pub location: String,
    pub region: String,
    pub item: Option<String>,
    pub event: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilerSphere {
    pub sphere: usize,
    pub items: Vec<SphereEntry>,
}

impl SpoilerLog {
    pub fn new(
        seed: usize,
        world: &World,
        settings: &RandomizerSettings,
        playthrough: &Playthrough,
    ) -> SpoilerLog {
        let locations = world
            .locations
            .iter()
            .map(|loc| SpoilerLocation {
                location: loc.name.clone(),
                region: world.regions[loc.region].name.clone(),
                item: loc.item.as_ref().map(|item| item.name.clone()),
                event: loc.event,
            })
            .collect();
        let playthrough_spheres = playthrough
            .spheres
            .iter()
            .enumerate()
            .map(|(i, items)| SpoilerSphere {
                sphere: i + 1,
                items: items.clone(),
            })
            .collect();
        SpoilerLog {
            seed,
            world: world.name.clone(),
            settings: settings.clone(),
            locations,
            playthrough: playthrough_spheres,
            required_locations: playthrough.required_locations.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Unable to serialize spoiler log")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Unable to write spoiler log to {}", path.display()))
    }
}
