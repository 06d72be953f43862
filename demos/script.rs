use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::Instant;

use script_tts::{
    AudioBuffer, CancellationToken, PipelineConfig, ScriptSynthesizer, SynthesisError,
    SynthesisRequest, Synthesizer, VoiceCatalog,
};

/// Stand-in backend: one tone per voice, 60ms per character.
struct ToneSynthesizer {
    catalog: VoiceCatalog,
}

impl Synthesizer for ToneSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<AudioBuffer, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let position = self
            .catalog
            .list()
            .iter()
            .position(|v| *v == voice)
            .ok_or_else(|| SynthesisError::UnknownVoice(voice.to_string()))?;

        let sample_rate = 24000;
        let freq = 180.0 + 40.0 * position as f32;
        let frames = (text.chars().count() as f32 * 0.06 / speed.max(0.1) * sample_rate as f32) as usize;
        let samples = (0..frames)
            .map(|i| 0.3 * (TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        Ok(AudioBuffer::mono(samples, sample_rate))
    }
}

const SAMPLE_SCRIPT: &str = "\
NARRATOR: The story begins on a dark night.
JOHN: Hello, is anyone there?
SARAH: Yes, I'm here. Don't be afraid.
[WIZARD] I cast a spell!
(WARRIOR) I charge!
**NARRATOR** And so it ended.";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let script = match args.next() {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE_SCRIPT.to_string(),
    };
    let output = PathBuf::from(args.next().unwrap_or_else(|| "script_audio.wav".to_string()));

    let catalog = VoiceCatalog::kokoro();
    let engine = ToneSynthesizer {
        catalog: catalog.clone(),
    };
    let synth = ScriptSynthesizer::new(engine, catalog, PipelineConfig::default())?;

    println!("Available voices: {:?}", synth.voices().list());
    for stats in synth.parser().detect_speakers(&script) {
        println!("  {} ({} lines)", stats.speaker, stats.lines);
    }

    let request = SynthesisRequest::default();
    for assignment in synth.suggest_voices(&script, &request.voice_mappings)?.iter() {
        println!("  {} -> {}", assignment.speaker, assignment.voice);
    }

    let synth_start = Instant::now();
    let track = synth.synthesize_script(&script, &request, &CancellationToken::new())?;
    println!(
        "Synthesized {:.2}s audio from {} segments in {:.2?}",
        track.duration_secs(),
        track.timings().len(),
        synth_start.elapsed()
    );

    track.write_wav(&output)?;
    println!("Saved to {}", output.display());
    Ok(())
}
