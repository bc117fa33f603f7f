// Request and response shapes for a host serving the generator.
//
// Plain serde types plus handler functions; no transport. A host maps
// these onto whatever protocol it speaks. The handlers call into the
// pipeline and the symbol helpers:
//
// - generate: up to `REQUEST_ATTEMPT_LIMIT` attempts, then the winning
//   matrix is read off as chord symbols.
// - export:   chord symbols → stand-in spectrogram → decoded track →
//   base64 MIDI.
// - analyze:  chord symbols → named progressions found.
// - health:   liveness plus whether a trained predictor is loaded.

use crate::decode::{DecoderParams, decode};
use crate::error::GenerateError;
use crate::pipeline::Generator;
use crate::predictor::Predictor;
use crate::symbols::{
    PatternMatch, chords_to_spectrogram, find_jazz_patterns, sequence_to_chord_symbols,
};
use harmonia_prng::HarmoniaRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Attempt cap for interactive generation requests.
pub const REQUEST_ATTEMPT_LIMIT: usize = 3;

/// Tempo of exported MIDI.
pub const EXPORT_TEMPO_BPM: u32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub temperature: f64,
    /// Number of chord symbols to return.
    pub length: usize,
    /// Accepted for compatibility; not used to condition generation.
    pub input_chords: Vec<String>,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        GenerateRequest {
            temperature: 1.2,
            length: 8,
            input_chords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub chords: Vec<String>,
    pub quality_score: f64,
    pub temperature: f64,
    pub length: usize,
    /// `[bins, timesteps]` of the winning matrix.
    pub sequence_shape: [usize; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub chords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Standard MIDI File bytes, base64-encoded.
    pub midi_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeRequest {
    pub chords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: Vec<PatternMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

/// Run a generation request against `generator`.
pub fn handle_generate<P: Predictor>(
    generator: &Generator<P>,
    request: &GenerateRequest,
    rng: &mut HarmoniaRng,
) -> Result<GenerateResponse, GenerateError> {
    info!(
        temperature = request.temperature,
        length = request.length,
        "generate request"
    );
    if !request.input_chords.is_empty() {
        debug!(input_chords = ?request.input_chords, "input chords ignored");
    }
    let attempts = generator.config().attempts.min(REQUEST_ATTEMPT_LIMIT);
    let selection = generator.select(attempts, request.temperature, rng)?;
    let best = &selection.best;
    info!(score = best.score, "best sequence");
    Ok(GenerateResponse {
        chords: sequence_to_chord_symbols(&best.sequence, request.length),
        quality_score: best.score,
        temperature: request.temperature,
        length: request.length,
        sequence_shape: [best.sequence.bins(), best.sequence.timesteps()],
    })
}

/// Render chord symbols to base64 MIDI.
pub fn handle_export(
    request: &ExportRequest,
    params: &DecoderParams,
    rng: &mut HarmoniaRng,
) -> Result<ExportResponse, GenerateError> {
    params.validate().map_err(GenerateError::InvalidRequest)?;
    let spectrogram = chords_to_spectrogram(&request.chords, rng);
    let track = decode(&spectrogram, EXPORT_TEMPO_BPM, params, rng)?;
    Ok(ExportResponse {
        midi_data: track.to_base64()?,
    })
}

pub fn handle_analyze(request: &AnalyzeRequest) -> AnalyzeResponse {
    AnalyzeResponse {
        analysis: find_jazz_patterns(&request.chords),
    }
}

pub fn health(model_loaded: bool) -> HealthStatus {
    HealthStatus {
        status: "healthy".to_string(),
        model_loaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::midi::NoteTimeline;
    use crate::predictor::EchoPredictor;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_generate_request_defaults() {
        let req: GenerateRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req, GenerateRequest::default());
        assert!((req.temperature - 1.2).abs() < 1e-12);
        assert_eq!(req.length, 8);
        let req: GenerateRequest = serde_json::from_str(r#"{"length": 4}"#).unwrap();
        assert_eq!(req.length, 4);
    }

    #[test]
    fn test_handle_generate_caps_attempts() {
        let config = GeneratorConfig {
            seed_length: 10,
            total_length: 30,
            band_count: 36,
            attempts: 5,
            ..GeneratorConfig::default()
        };
        let generator = Generator::new(EchoPredictor { bands: 36 }, config).unwrap();
        let request = GenerateRequest {
            temperature: 0.9,
            length: 6,
            input_chords: vec!["Dm7".to_string()],
        };
        let response = handle_generate(&generator, &request, &mut HarmoniaRng::new(2)).unwrap();
        assert_eq!(response.chords.len(), 6);
        assert_eq!(response.sequence_shape, [36, 30]);
        assert_eq!(response.temperature, 0.9);
        assert!(response.quality_score.is_finite());

        // Same seed, explicit cap: identical winner.
        let capped = generator.select(3, 0.9, &mut HarmoniaRng::new(2)).unwrap();
        assert_eq!(capped.history.len(), 3);
        assert_eq!(capped.best.score, response.quality_score);
    }

    #[test]
    fn test_handle_export() {
        let request = ExportRequest {
            chords: vec!["Dm7".into(), "G7".into(), "Cmaj7".into()],
        };
        let params = DecoderParams::default();
        let response = handle_export(&request, &params, &mut HarmoniaRng::new(8)).unwrap();
        let bytes = STANDARD.decode(response.midi_data).unwrap();
        assert_eq!(NoteTimeline::tempo_bpm(&bytes).unwrap(), Some(120));
        // 3 chords × 8 timesteps / 4 per window.
        let notes = NoteTimeline::from_smf_bytes(&bytes).unwrap().notes;
        let chord_starts: std::collections::BTreeSet<u64> = notes
            .iter()
            .filter(|n| n.kind == crate::midi::NoteKind::On)
            .map(|n| n.tick)
            .collect();
        assert_eq!(chord_starts.len(), 6);
    }

    #[test]
    fn test_handle_export_rejects_bad_params() {
        let request = ExportRequest {
            chords: vec!["G7".into()],
        };
        let params = DecoderParams {
            velocity_min: 100,
            velocity_max: 50,
            ..DecoderParams::default()
        };
        let err = handle_export(&request, &params, &mut HarmoniaRng::new(1)).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidRequest(_)));
    }

    #[test]
    fn test_analyze_and_health() {
        let request: AnalyzeRequest =
            serde_json::from_str(r#"{"chords": ["Dm7", "G7", "Cmaj7"]}"#).unwrap();
        let response = handle_analyze(&request);
        assert_eq!(response.analysis.len(), 1);
        assert_eq!(response.analysis[0].name, "ii-V-I");

        let json = serde_json::to_value(health(false)).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["model_loaded"], false);
    }
}
