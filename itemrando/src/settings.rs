use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use strum_macros::{EnumString, VariantNames};

use crate::error::{RandomizeError, Result};

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FillAlgorithm {
    Flood,
    Cutoff,
    Staleness,
    Restrictive,
}

impl fmt::Display for FillAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FillAlgorithm::Flood => "flood",
            FillAlgorithm::Cutoff => "cutoff",
            FillAlgorithm::Staleness => "staleness",
            FillAlgorithm::Restrictive => "restrictive",
        };
        write!(f, "{}", s)
    }
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Accessibility {
    // Every location must be reachable:
    Full,
    // Only the goal must be reachable; once it is, remaining placements are unconstrained:
    BeatableOnly,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PruneOrder {
    LatestSphereFirst,
    EarliestSphereFirst,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrashFill {
    None,
    Fixed(usize),
    Random { max: usize },
}

impl TrashFill {
    pub fn count<R: Rng>(&self, rng: &mut R) -> usize {
        match *self {
            TrashFill::None => 0,
            TrashFill::Fixed(n) => n,
            TrashFill::Random { max } => rng.gen_range(0..=max),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RandomizerSettings {
    pub algorithm: FillAlgorithm,
    pub cutoff_rate: f32, // Fraction of advancement items placed before the cutoff fill walks backwards
    pub accessibility: Accessibility,
    pub keysanity: bool,
    pub shuffle_dungeon_items: bool,
    pub trash_fill: TrashFill,
    pub prune_order: PruneOrder,
    pub max_attempts: usize,
}

impl Default for RandomizerSettings {
    fn default() -> Self {
        RandomizerSettings {
            algorithm: FillAlgorithm::Restrictive,
            cutoff_rate: 0.66,
            accessibility: Accessibility::Full,
            keysanity: false,
            shuffle_dungeon_items: false,
            trash_fill: TrashFill::None,
            prune_order: PruneOrder::LatestSphereFirst,
            max_attempts: 100,
        }
    }
}

impl RandomizerSettings {
    pub fn load(path: &Path) -> anyhow::Result<RandomizerSettings> {
        let settings_str = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read settings file at {}", path.display()))?;
        let settings: RandomizerSettings = serde_json::from_str(&settings_str)
            .with_context(|| format!("Unable to parse settings file at {}", path.display()))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cutoff_rate > 0.0 && self.cutoff_rate <= 1.0) {
            return Err(RandomizeError::InvalidConfiguration(format!(
                "cutoff_rate must be in (0, 1], got {}",
                self.cutoff_rate
            )));
        }
        if self.max_attempts == 0 {
            return Err(RandomizeError::InvalidConfiguration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.trash_fill != TrashFill::None && self.algorithm != FillAlgorithm::Restrictive {
            return Err(RandomizeError::InvalidConfiguration(format!(
                "trash_fill is only supported by the restrictive algorithm, not {}",
                self.algorithm
            )));
        }
        if self.keysanity && self.shuffle_dungeon_items {
            return Err(RandomizeError::InvalidConfiguration(
                "shuffle_dungeon_items has no effect with keysanity; enable only one".to_string(),
            ));
        }
        Ok(())
    }
}
