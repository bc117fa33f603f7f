// Integration tests for the full generator: catalog-backed seeds, weight
// files on disk, and the exported MIDI file.

use harmonia_music::decode::{DecoderParams, decode};
use harmonia_music::midi::{NoteKind, NoteTimeline};
use harmonia_music::npy::write_npy;
use harmonia_music::predictor::RecurrentWeights;
use harmonia_music::seed::{SeedProvider, SeedSource};
use harmonia_music::{
    GenerateError, Generator, GeneratorConfig, Predictor, PredictorError, RecurrentPredictor,
    TimeFrequencyMatrix,
};
use harmonia_prng::HarmoniaRng;
use std::fs::File;
use std::path::Path;

const BANDS: usize = 24;

fn config() -> GeneratorConfig {
    GeneratorConfig {
        seed_length: 32,
        total_length: 64,
        band_count: BANDS,
        attempts: 4,
        ..GeneratorConfig::default()
    }
}

/// A catalog with one reference spectrogram of `timesteps` steps.
fn write_fixture(dir: &Path, timesteps: usize) -> std::path::PathBuf {
    std::fs::create_dir_all(dir.join("refs")).unwrap();
    let mut rng = HarmoniaRng::new(100);
    let data: Vec<f32> = (0..BANDS * timesteps).map(|_| rng.next_f32()).collect();
    let mut file = File::create(dir.join("refs/piece.npy")).unwrap();
    write_npy(&mut file, &[BANDS, timesteps], &data).unwrap();
    let catalog = dir.join("metadata.csv");
    std::fs::write(&catalog, "id,title,feature_path\n1,piece,refs/piece.npy\n").unwrap();
    catalog
}

#[test]
fn test_generation_with_catalog_seeds() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_fixture(dir.path(), 80);
    let config = GeneratorConfig {
        catalog_path: Some(catalog),
        ..config()
    };
    let predictor = RecurrentPredictor::untrained(BANDS, 16, &mut HarmoniaRng::new(1));
    let generator = Generator::new(predictor, config).unwrap();

    let outcome = generator.generate(&mut HarmoniaRng::new(5)).unwrap();
    let best = &outcome.selection.best;
    assert_eq!(best.sequence.shape(), (64, BANDS));
    // Real seeds are non-negative reference energy.
    let seed_part = &best.sequence.values()[..32 * BANDS];
    assert!(seed_part.iter().all(|&v| (0.0..1.0).contains(&v)));
    assert_eq!(outcome.track.events().len(), 16);
}

#[test]
fn test_corrupt_catalog_still_generates() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("metadata.csv");
    std::fs::write(&catalog, "id,title,feature_path\n1,piece,refs/missing.npy\n").unwrap();
    let provider = SeedProvider::new(SeedSource::CatalogFile(catalog));
    let predictor = RecurrentPredictor::untrained(BANDS, 8, &mut HarmoniaRng::new(2));
    let generator = Generator::with_seed_provider(predictor, config(), provider).unwrap();

    let outcome = generator.generate(&mut HarmoniaRng::new(9)).unwrap();
    assert_eq!(outcome.selection.best.sequence.shape(), (64, BANDS));
    assert_eq!(outcome.selection.history.len(), 4);
}

#[test]
fn test_exported_midi_matches_track() {
    let predictor = RecurrentPredictor::untrained(BANDS, 8, &mut HarmoniaRng::new(3));
    let generator = Generator::new(predictor, config()).unwrap();
    let outcome = generator.generate(&mut HarmoniaRng::new(4)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progression.mid");
    outcome.track.write(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let parsed = NoteTimeline::from_smf_bytes(&bytes).unwrap();
    assert_eq!(parsed, outcome.track.timeline());
    assert_eq!(NoteTimeline::tempo_bpm(&bytes).unwrap(), Some(120));

    // Each note-off comes strictly after the matching note-on.
    let mut open: Vec<(u8, u64)> = Vec::new();
    for note in &parsed.notes {
        match note.kind {
            NoteKind::On => open.push((note.pitch, note.tick)),
            NoteKind::Off => {
                let i = open.iter().position(|&(p, _)| p == note.pitch).unwrap();
                let (_, on_tick) = open.remove(i);
                assert!(note.tick > on_tick);
                assert!(note.tick - on_tick >= 60);
            }
        }
    }
    assert!(open.is_empty());
}

#[test]
fn test_weights_file_round_trip_and_errors() {
    let dir = tempfile::tempdir().unwrap();
    let untrained = RecurrentPredictor::untrained(6, 4, &mut HarmoniaRng::new(8));
    let path = dir.path().join("weights.json");
    std::fs::write(&path, serde_json::to_string(untrained.weights()).unwrap()).unwrap();
    let loaded = RecurrentPredictor::load(&path).unwrap();
    assert_eq!(loaded.band_count(), 6);

    let mut broken: RecurrentWeights = untrained.weights().clone();
    broken.b_out.pop();
    std::fs::write(&path, serde_json::to_string(&broken).unwrap()).unwrap();
    assert!(matches!(
        RecurrentPredictor::load(&path),
        Err(PredictorError::WeightShape { .. })
    ));

    // Mismatched predictor width is rejected before any work.
    let config = GeneratorConfig {
        band_count: 8,
        ..config()
    };
    assert!(matches!(
        Generator::new(loaded, config),
        Err(GenerateError::InvalidRequest(_))
    ));
}

#[test]
fn test_config_file_drives_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let json = r#"{ "decoder": { "window_steps": 8 }, "tempo_bpm": 90 }"#;
    std::fs::write(&path, json).unwrap();
    let loaded = GeneratorConfig::load(&path).unwrap();
    let m = TimeFrequencyMatrix::zeros(64, 36).unwrap();
    let mut rng = HarmoniaRng::new(1);
    let track = decode(&m, loaded.tempo_bpm, &loaded.decoder, &mut rng).unwrap();
    assert_eq!(track.events().len(), 8);
    assert_eq!(track.tempo_bpm(), 90);
    let mut rng = HarmoniaRng::new(1);
    let default_track = decode(&m, 120, &DecoderParams::default(), &mut rng).unwrap();
    assert_eq!(default_track.events().len(), 16);
}
