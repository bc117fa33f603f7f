// Harmonia generator: CLI entry point.
//
// Generates one chord progression and writes it to MIDI. The pipeline:
// seed → extension attempts → quality selection → chord decoding → MIDI.
//
// Usage:
//   cargo run -p harmonia_music -- [--config FILE] [--predictor WEIGHTS.json]
//     [--catalog metadata.csv] [--attempts N] [--temperature T]
//     [--seed-length N] [--total-length N] [--bands N] [--tempo BPM]
//     [--seed N] [--output FILE.mid] [--sequence-out FILE.{npy,json}]
//
// Flags override the config file, which overrides built-in defaults.
// Without --predictor an untrained recurrent predictor is built from the
// RNG so the pipeline still runs end to end. Log level follows RUST_LOG
// (default `info`); logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use harmonia_music::npy::write_npy;
use harmonia_music::{Generator, GeneratorConfig, RecurrentPredictor, TimeFrequencyMatrix};
use harmonia_prng::HarmoniaRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Generate a chord progression and write it as a MIDI file.
#[derive(Parser)]
#[command(name = "harmonia-generate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON generator config
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON recurrent predictor weights
    #[arg(long)]
    predictor: Option<PathBuf>,

    /// CSV catalog of reference spectrograms used for seeds
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Number of extension attempts
    #[arg(long)]
    attempts: Option<usize>,

    /// Temperature of the first attempt
    #[arg(long)]
    temperature: Option<f64>,

    /// Seed length in timesteps
    #[arg(long)]
    seed_length: Option<usize>,

    /// Generated length in timesteps, seed included
    #[arg(long)]
    total_length: Option<usize>,

    /// Frequency bins per timestep
    #[arg(long)]
    bands: Option<usize>,

    /// Tempo of the output track
    #[arg(long)]
    tempo: Option<u32>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Output MIDI path
    #[arg(short, long, default_value = "generated/new_progression.mid")]
    output: PathBuf,

    /// Also save the winning matrix (.npy, otherwise JSON)
    #[arg(long)]
    sequence_out: Option<PathBuf>,
}

impl Cli {
    fn resolve_config(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => GeneratorConfig::default(),
        };
        if let Some(path) = &self.predictor {
            config.predictor_path = Some(path.clone());
        }
        if let Some(path) = &self.catalog {
            config.catalog_path = Some(path.clone());
        }
        if let Some(n) = self.attempts {
            config.attempts = n;
        }
        if let Some(t) = self.temperature {
            config.base_temperature = t;
        }
        if let Some(n) = self.seed_length {
            config.seed_length = n;
        }
        if let Some(n) = self.total_length {
            config.total_length = n;
        }
        if let Some(n) = self.bands {
            config.band_count = n;
        }
        if let Some(bpm) = self.tempo {
            config.tempo_bpm = bpm;
        }
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        Ok(config)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
    }
    Ok(())
}

fn save_sequence(sequence: &TimeFrequencyMatrix, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    if path.extension().is_some_and(|e| e == "npy") {
        let shape = [sequence.timesteps(), sequence.bins()];
        write_npy(&mut writer, &shape, sequence.values())?;
    } else {
        serde_json::to_writer(&mut writer, sequence)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let mut rng = match config.rng_seed {
        Some(seed) => HarmoniaRng::new(seed),
        None => HarmoniaRng::from_entropy(),
    };

    let predictor = match &config.predictor_path {
        Some(path) => RecurrentPredictor::load(path)
            .with_context(|| format!("loading predictor {}", path.display()))?,
        None => {
            info!(
                bands = config.band_count,
                hidden = config.untrained_hidden_size,
                "no predictor weights given, using an untrained predictor"
            );
            let hidden = config.untrained_hidden_size;
            RecurrentPredictor::untrained(config.band_count, hidden, &mut rng)
        }
    };

    let generator = Generator::new(predictor, config)?;
    let outcome = generator.generate(&mut rng)?;

    ensure_parent(&cli.output)?;
    outcome
        .track
        .write(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    if let Some(path) = &cli.sequence_out {
        save_sequence(&outcome.selection.best.sequence, path)?;
    }

    let best = &outcome.selection.best;
    println!("=== Harmonia ===");
    for (i, attempt) in outcome.selection.history.iter().enumerate() {
        println!(
            "  Attempt {}: temperature {:.1}, score {:.3}",
            i + 1,
            attempt.temperature,
            attempt.score
        );
    }
    println!(
        "Best: attempt {} (score {:.3}), {} chords",
        best.index + 1,
        best.score,
        outcome.track.events().len()
    );
    let symbols: Vec<&str> = outcome
        .track
        .events()
        .iter()
        .map(|e| e.symbol.as_str())
        .collect();
    println!("Progression: {}", symbols.join(" "));
    println!("Wrote {}", cli.output.display());
    Ok(())
}
