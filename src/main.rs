//! Stimsearch CLI - Run a closed-loop search from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use stimsearch::compute::optimizer::GeneticOptimizer;
use stimsearch::compute::{
    Aggregate, CyclicSource, Experiment, Generator, IdentityRenderer, MaskTemplate,
    ProjectionSubject, Reduction, Scorer, ScoringUnits, StimulusBatch,
};
use stimsearch::schema::ExperimentConfig;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [iterations]", args[0]);
        eprintln!();
        eprintln!("Run a closed-loop stimulus search from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to run configuration file");
        eprintln!("  iterations   Override the configured generation count");
        eprintln!();
        eprintln!("An example configuration is printed with --example.");
        return ExitCode::FAILURE;
    }

    if args[1] == "--example" {
        print_example_config();
        return ExitCode::SUCCESS;
    }

    let config_path = PathBuf::from(&args[1]);

    let config_str = match fs::read_to_string(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading config file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut config: ExperimentConfig = match serde_json::from_str(&config_str) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error parsing config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(iterations) = args.get(2).and_then(|s| s.parse().ok()) {
        config.iterations = iterations;
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&config, &config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ExperimentConfig, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let code_dim = config.optimizer.code_dim;

    // Reference subject with seeded projections.
    let layer_specs: Vec<(&str, usize)> = config
        .subject_layers
        .iter()
        .map(|l| (l.name.as_str(), l.units))
        .collect();
    let subject = ProjectionSubject::new(code_dim, &layer_specs, config.subject_seed.unwrap_or(0));

    // Score every unit of every subject layer, mean within and across layers.
    let targets = config
        .subject_layers
        .iter()
        .map(|l| {
            (
                l.name.clone(),
                ScoringUnits::uniform((0..l.units).collect()),
            )
        })
        .collect();
    let scorer = Scorer::max_activity(targets, Reduction::Mean, Aggregate::Mean);

    let optimizer = GeneticOptimizer::new(config.optimizer.clone())?;

    let mask_template = MaskTemplate::parse(&config.mask_template, config.shuffle_mask)?;

    // When the template interleaves naturals, cycle over a small bank of
    // fixed noise stimuli standing in for a reference dataset.
    let mut generator = Generator::new(IdentityRenderer);
    if config.mask_template.contains('F') {
        generator = generator.with_natural_source(Box::new(noise_bank(code_dim)?));
    }

    println!("Stimsearch");
    println!("==========");
    println!("Code dimension:  {}", code_dim);
    println!("Population:      {}", config.optimizer.population_size);
    println!("Generations:     {}", config.iterations);
    println!("Scoring units:   {}", scorer.optimizing_units());
    println!();

    let mut experiment = Experiment::new(
        generator,
        subject,
        scorer,
        optimizer,
        mask_template,
        config.iterations,
        config.mask_seed,
    );

    let start = Instant::now();
    experiment.run(None)?;
    let elapsed = start.elapsed().as_secs_f64();

    let message = experiment.message();
    let stats = message.stats_gen()?;

    println!("Finished in {:.2}s", elapsed);
    println!();
    println!(
        "Best score:      {:.4} (generation {}, individual {})",
        stats.best_score, stats.best_generation, stats.best_index
    );
    println!(
        "Final mean:      {:.4} +/- {:.4}",
        stats.mean_per_generation[stats.mean_per_generation.len() - 1],
        stats.sem_per_generation[stats.sem_per_generation.len() - 1],
    );
    if let Some(best_nat) = experiment.best_natural() {
        println!(
            "Best natural:    {:.4} (generation {}, label {:?})",
            best_nat.score, best_nat.generation, best_nat.label
        );
    }

    // Persist the statistics artifact next to the config.
    let record = message.run_record()?;
    let out_path = config_path.with_extension("stats.json");
    record.save(&out_path)?;
    println!();
    println!("Statistics written to {}", out_path.display());

    Ok(())
}

/// Deterministic noise stimuli standing in for natural reference images.
fn noise_bank(code_dim: usize) -> Result<CyclicSource, Box<dyn std::error::Error>> {
    use rand::prelude::*;

    let count = 32;
    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<f32> = (0..count * code_dim)
        .map(|_| rng.sample::<f32, _>(rand_distr::StandardNormal))
        .collect();
    let stimuli = StimulusBatch::new(data, vec![code_dim], count)?;
    Ok(CyclicSource::new(stimuli, (0..count as u32).collect())?)
}

fn print_example_config() {
    let example = r#"{
  "iterations": 200,
  "optimizer": {
    "code_dim": 64,
    "population_size": 30,
    "mutation_rate": 0.3,
    "mutation_size": 0.1,
    "temperature": 1.0,
    "num_parents": 2,
    "elite_count": 2,
    "distribution": "normal",
    "random_seed": 31415
  },
  "mask_template": "TTF",
  "shuffle_mask": true,
  "mask_seed": 0,
  "subject_layers": [
    { "name": "conv", "units": 128 },
    { "name": "fc", "units": 32 }
  ],
  "subject_seed": 0
}"#;
    println!("{}", example);
}
