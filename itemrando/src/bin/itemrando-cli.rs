use anyhow::{bail, Context, Result};
use clap::Parser;
use itemrando::randomize::{Randomization, Randomizer};
use itemrando::settings::{FillAlgorithm, RandomizerSettings};
use itemrando_game::World;
use log::info;
use rand::{RngCore, SeedableRng};
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    world: PathBuf,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    algorithm: Option<FillAlgorithm>,

    #[arg(long)]
    keysanity: bool,

    #[arg(long)]
    random_seed: Option<usize>,

    #[arg(long)]
    item_placement_seed: Option<usize>,

    #[arg(long)]
    max_attempts: Option<usize>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,
}

fn get_randomization(args: &Args, randomizer: &Randomizer) -> Result<Randomization> {
    let root_seed = match args.random_seed {
        Some(s) => s,
        None => (rand::rngs::StdRng::from_entropy().next_u64() & 0xFFFFFFFF) as usize,
    };
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&root_seed.to_le_bytes());
    let mut rng = rand::rngs::StdRng::from_seed(rng_seed);
    let max_attempts = if args.item_placement_seed.is_some() {
        1
    } else {
        args.max_attempts.unwrap_or(randomizer.settings.max_attempts)
    };
    for attempt_num in 1..=max_attempts {
        let item_seed = match args.item_placement_seed {
            Some(s) => s,
            None => (rng.next_u64() & 0xFFFFFFFF) as usize,
        };
        info!("Attempt {attempt_num}/{max_attempts}: item placement seed={item_seed}");
        match randomizer.randomize(attempt_num, item_seed) {
            Ok(randomization) => {
                return Ok(randomization);
            }
            Err(e) if e.is_recoverable() => {
                info!(
                    "Attempt {attempt_num}/{max_attempts}: Randomization failed: {}",
                    e
                );
            }
            Err(e) => {
                return Err(e).context(format!("Attempt {attempt_num}/{max_attempts}"));
            }
        }
    }
    bail!("Exhausted randomization attempts");
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let world = World::load(&args.world)?;
    let mut settings = match &args.settings {
        Some(path) => RandomizerSettings::load(path)?,
        None => RandomizerSettings::default(),
    };
    if let Some(algorithm) = args.algorithm {
        settings.algorithm = algorithm;
    }
    if args.keysanity {
        settings.keysanity = true;
    }

    let randomizer = Randomizer::new(&world, &settings)?;
    let randomization = get_randomization(&args, &randomizer)?;

    for (i, sphere) in randomization.playthrough.spheres.iter().enumerate() {
        let entries: Vec<String> = sphere
            .iter()
            .map(|e| format!("{}: {}", e.location, e.item))
            .collect();
        println!("Sphere {}: {}", i + 1, entries.join(", "));
    }

    if let Some(output_spoiler_log_path) = &args.output_spoiler_log {
        println!(
            "Writing spoiler log to {}",
            output_spoiler_log_path.display()
        );
        randomization.spoiler_log.save(output_spoiler_log_path)?;
    }

    Ok(())
}
