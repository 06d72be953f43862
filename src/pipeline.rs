//! End-to-end script synthesis: parse, resolve voices, synthesize every
//! segment on a worker pool, then splice the results in script order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::audio::{AssembledTrack, Assembler, AssemblerConfig};
use crate::error::ScriptError;
use crate::script::{distinct_speakers, ParserConfig, ScriptParser, Segment};
use crate::voices::{ResolverConfig, VoiceCatalog, VoiceMappingTable, VoiceResolver};
use crate::{AudioBuffer, Synthesizer};

/// Configuration for a [`ScriptSynthesizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct PipelineConfig {
    pub parser: ParserConfig,
    pub resolver: ResolverConfig,
    pub assembler: AssemblerConfig,
    /// Synthesis worker threads. `None` uses the available CPU parallelism.
    #[builder(setter(strip_option))]
    pub workers: Option<usize>,
    /// Extra attempts for a segment whose synthesis failed transiently.
    pub synthesis_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            resolver: ResolverConfig::default(),
            assembler: AssemblerConfig::default(),
            workers: None,
            synthesis_retries: 1,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(json)
            .map_err(|e| ScriptError::Config(format!("Failed to parse JSON: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct SynthesisRequest {
    /// Explicit speaker → voice overrides. Speaker names are normalized
    /// before matching.
    pub voice_mappings: BTreeMap<String, String>,
    /// Forwarded to every synthesis call.
    pub speed: f32,
    /// Crossfade between segments; 0 inserts a silence gap instead.
    pub crossfade_ms: u64,
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            voice_mappings: BTreeMap::new(),
            speed: 1.0,
            crossfade_ms: 50,
        }
    }
}

impl SynthesisRequest {
    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }
}

/// Shared flag that aborts a running request. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a [`Synthesizer`] over whole scripts.
///
/// The parser, resolver, catalog and worker pool are read-only and shared by
/// all requests; each request owns its segments, voice table and buffers.
pub struct ScriptSynthesizer<S> {
    engine: S,
    catalog: VoiceCatalog,
    parser: ScriptParser,
    resolver: VoiceResolver,
    assembler: Assembler,
    pool: rayon::ThreadPool,
    retries: u32,
}

impl<S: Synthesizer> ScriptSynthesizer<S> {
    pub fn new(
        engine: S,
        catalog: VoiceCatalog,
        config: PipelineConfig,
    ) -> Result<Self, ScriptError> {
        let workers = config.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("script-tts-{i}"))
            .build()?;
        log::info!(
            "Script synthesizer ready: {} voices, {} workers",
            catalog.len(),
            pool.current_num_threads()
        );

        Ok(Self {
            engine,
            catalog,
            parser: ScriptParser::new(config.parser),
            resolver: VoiceResolver::new(config.resolver),
            assembler: Assembler::new(config.assembler),
            pool,
            retries: config.synthesis_retries,
        })
    }

    pub fn engine(&self) -> &S {
        &self.engine
    }

    pub fn voices(&self) -> &VoiceCatalog {
        &self.catalog
    }

    pub fn parser(&self) -> &ScriptParser {
        &self.parser
    }

    pub fn parse(&self, text: &str) -> Vec<Segment> {
        self.parser.parse(text)
    }

    /// Resolve the voices a script would use, without synthesizing.
    pub fn suggest_voices(
        &self,
        text: &str,
        voice_mappings: &BTreeMap<String, String>,
    ) -> Result<VoiceMappingTable, ScriptError> {
        let segments = self.parser.parse(text);
        self.resolver
            .resolve(&distinct_speakers(&segments), voice_mappings, &self.catalog)
    }

    /// Synthesize a whole script into one track.
    ///
    /// Mapping errors are reported before any synthesis starts. Any failed
    /// segment or a cancellation aborts the request without a partial track.
    pub fn synthesize_script(
        &self,
        text: &str,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<AssembledTrack, ScriptError> {
        let segments = self.parser.parse(text);
        let table = self.resolver.resolve(
            &distinct_speakers(&segments),
            &request.voice_mappings,
            &self.catalog,
        )?;

        let pairs = self.synthesize_segments(segments, &table, request.speed, cancel)?;
        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }
        self.assembler.assemble(pairs, request.crossfade())
    }

    /// Synthesize several scripts with shared options. The first failure
    /// aborts the batch.
    pub fn synthesize_batch<T: AsRef<str>>(
        &self,
        texts: &[T],
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssembledTrack>, ScriptError> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                log::info!("Batch script {}/{}", i + 1, texts.len());
                self.synthesize_script(text.as_ref(), request, cancel)
            })
            .collect()
    }

    /// Synthesize all segments in parallel and return them in
    /// `sequence_index` order. Returns only after every job has finished.
    fn synthesize_segments(
        &self,
        segments: Vec<Segment>,
        table: &VoiceMappingTable,
        speed: f32,
        cancel: &CancellationToken,
    ) -> Result<Vec<(Segment, AudioBuffer)>, ScriptError> {
        let jobs = segments
            .into_iter()
            .map(|segment| match table.voice_for(&segment.speaker) {
                Some(voice) => Ok((segment, voice)),
                None => Err(ScriptError::UnresolvedSpeaker {
                    index: segment.sequence_index,
                    speaker: segment.speaker,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total = jobs.len();
        self.pool.install(|| {
            jobs.into_par_iter()
                .map(|(segment, voice)| -> Result<(Segment, AudioBuffer), ScriptError> {
                    log::debug!(
                        "Segment {}/{}: voice={voice}, text_length={}",
                        segment.sequence_index + 1,
                        total,
                        segment.text.len()
                    );
                    let buffer = self.synthesize_one(&segment, voice, speed, cancel)?;
                    Ok((segment, buffer))
                })
                .collect()
        })
    }

    fn synthesize_one(
        &self,
        segment: &Segment,
        voice: &str,
        speed: f32,
        cancel: &CancellationToken,
    ) -> Result<AudioBuffer, ScriptError> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ScriptError::Cancelled);
            }
            match self.engine.synthesize(&segment.text, voice, speed) {
                Ok(buffer) => return Ok(buffer),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    log::warn!(
                        "Segment {} ({}): {err}, retrying ({attempt}/{})",
                        segment.sequence_index,
                        segment.speaker,
                        self.retries
                    );
                }
                Err(source) => {
                    log::error!(
                        "Segment {} ({}) failed: {source}",
                        segment.sequence_index,
                        segment.speaker
                    );
                    return Err(ScriptError::Synthesis {
                        index: segment.sequence_index,
                        speaker: segment.speaker.clone(),
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SynthesisError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const RATE: u32 = 24_000;

    /// Produces `frames_per_char` frames of a per-voice constant for every
    /// character of text, and records every call.
    #[derive(Default)]
    struct FakeSynth {
        calls: Mutex<Vec<(String, String, f32)>>,
        fail_on: Option<String>,
        transient_failures: AtomicUsize,
        cancel_on_call: Option<CancellationToken>,
    }

    impl FakeSynth {
        fn level(voice: &str) -> f32 {
            (voice.len() % 7) as f32 / 10.0 + 0.1
        }
    }

    impl Synthesizer for FakeSynth {
        fn synthesize(
            &self,
            text: &str,
            voice: &str,
            speed: f32,
        ) -> Result<AudioBuffer, SynthesisError> {
            if text.trim().is_empty() {
                return Err(SynthesisError::EmptyText);
            }
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), voice.to_string(), speed));
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            if self.fail_on.as_deref().is_some_and(|t| text.contains(t)) {
                return Err(SynthesisError::backend("unsupported characters"));
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SynthesisError::transient("backend busy"));
            }
            Ok(AudioBuffer::mono(
                vec![Self::level(voice); text.len() * 10],
                RATE,
            ))
        }
    }

    fn synth(fake: FakeSynth) -> ScriptSynthesizer<FakeSynth> {
        let config = PipelineConfigBuilder::default()
            .workers(2)
            .synthesis_retries(1)
            .build()
            .unwrap();
        ScriptSynthesizer::new(fake, VoiceCatalog::kokoro(), config).unwrap()
    }

    fn no_crossfade() -> SynthesisRequest {
        SynthesisRequest {
            crossfade_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn synthesizes_segments_in_script_order() {
        let s = synth(FakeSynth::default());
        let script = "NARRATOR: Hello.\nJOHN: Hi there.\nSARAH: Welcome back.\nJOHN: Thanks.";
        let track = s
            .synthesize_script(script, &no_crossfade(), &CancellationToken::new())
            .unwrap();

        let timings = track.timings();
        let order: Vec<usize> = timings.iter().map(|t| t.sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert!(timings.windows(2).all(|w| w[0].end < w[1].start));

        let text_frames: usize = ["Hello.", "Hi there.", "Welcome back.", "Thanks."]
            .iter()
            .map(|t| t.len() * 10)
            .sum();
        assert_eq!(track.frames(), text_frames + 3 * 3_600);

        let calls = s.engine().calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let john: Vec<&str> = calls
            .iter()
            .filter(|(text, _, _)| text.starts_with("Hi") || text.starts_with("Thanks"))
            .map(|(_, voice, _)| voice.as_str())
            .collect();
        assert_eq!(john, vec!["am_adam", "am_adam"]);
    }

    #[test]
    fn speed_and_explicit_mappings_reach_the_engine() {
        let s = synth(FakeSynth::default());
        let mut request = SynthesisRequest {
            speed: 1.3,
            ..Default::default()
        };
        request
            .voice_mappings
            .insert("wizard".to_string(), "bm_george".to_string());

        s.synthesize_script("[WIZARD] I cast a spell!", &request, &CancellationToken::new())
            .unwrap();
        let calls = s.engine().calls.lock().unwrap();
        assert_eq!(
            calls[0],
            ("I cast a spell!".to_string(), "bm_george".to_string(), 1.3)
        );
    }

    #[test]
    fn bad_mapping_fails_before_any_synthesis() {
        let s = synth(FakeSynth::default());
        let mut request = SynthesisRequest::default();
        request
            .voice_mappings
            .insert("JOHN".to_string(), "am_nobody".to_string());

        let err = s
            .synthesize_script("JOHN: Hi.", &request, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Configuration { .. }));
        assert!(s.engine().calls.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_segment_aborts_with_index_and_speaker() {
        let s = synth(FakeSynth {
            fail_on: Some("@@".to_string()),
            ..Default::default()
        });
        let err = s
            .synthesize_script(
                "JOHN: Fine.\nSARAH: Broken @@ line.",
                &SynthesisRequest::default(),
                &CancellationToken::new(),
            )
            .unwrap_err();
        match err {
            ScriptError::Synthesis { index, speaker, source } => {
                assert_eq!(index, 1);
                assert_eq!(speaker.as_str(), "SARAH");
                assert!(!source.is_transient());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn transient_failure_is_retried_once() {
        let s = synth(FakeSynth {
            transient_failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let track = s
            .synthesize_script("JOHN: Hi.", &SynthesisRequest::default(), &CancellationToken::new())
            .unwrap();
        assert!(!track.is_empty());
        assert_eq!(s.engine().calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn repeated_transient_failure_is_surfaced() {
        let s = synth(FakeSynth {
            transient_failures: AtomicUsize::new(2),
            ..Default::default()
        });
        let err = s
            .synthesize_script("JOHN: Hi.", &SynthesisRequest::default(), &CancellationToken::new())
            .unwrap_err();
        match err {
            ScriptError::Synthesis { source, .. } => assert!(source.is_transient()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelled_request_returns_no_track() {
        let token = CancellationToken::new();
        token.cancel();
        let s = synth(FakeSynth::default());
        let err = s
            .synthesize_script("JOHN: Hi.\nSARAH: Hey.", &SynthesisRequest::default(), &token)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Cancelled));
        assert!(s.engine().calls.lock().unwrap().is_empty());
    }

    #[test]
    fn cancellation_during_synthesis_discards_results() {
        let token = CancellationToken::new();
        let s = synth(FakeSynth {
            cancel_on_call: Some(token.clone()),
            ..Default::default()
        });
        let err = s
            .synthesize_script("JOHN: Hi.", &SynthesisRequest::default(), &token)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Cancelled));
    }

    #[test]
    fn empty_script_is_zero_length_track() {
        let s = synth(FakeSynth::default());
        let track = s
            .synthesize_script("   \n\n", &SynthesisRequest::default(), &CancellationToken::new())
            .unwrap();
        assert!(track.is_empty());
        assert_eq!(track.total_duration(), Duration::ZERO);
    }

    #[test]
    fn suggest_voices_without_synthesis() {
        let s = synth(FakeSynth::default());
        let table = s
            .suggest_voices("NARRATOR: Hi.\nJOHN: Yo.\nZORG: Bleep.", &BTreeMap::new())
            .unwrap();
        let mappings = table.to_mappings();
        assert_eq!(mappings["NARRATOR"], "af_heart");
        assert_eq!(mappings["JOHN"], "am_adam");
        assert_eq!(mappings["ZORG"], "af_bella");
        assert!(s.engine().calls.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_returns_one_track_per_script() {
        let s = synth(FakeSynth::default());
        let tracks = s
            .synthesize_batch(
                &["JOHN: One.", "SARAH: Two.\nJOHN: Three.", ""],
                &no_crossfade(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].frames(), "One.".len() * 10);
        assert_eq!(tracks[1].timings().len(), 2);
        assert!(tracks[2].is_empty());
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"workers": 3, "assembler": {"silence_gap_ms": 200}, "parser": {"max_label_words": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.assembler.silence_gap_ms, 200);
        assert_eq!(config.assembler.empty_sample_rate, 24_000);
        assert_eq!(config.parser.max_label_words, 2);
        assert_eq!(config.parser.default_speaker, "NARRATOR");
        assert_eq!(config.synthesis_retries, 1);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(
            PipelineConfig::from_json_str("[1, 2]"),
            Err(ScriptError::Config(_))
        ));
    }

    #[test]
    fn request_deserializes_like_the_http_body() {
        let request: SynthesisRequest = serde_json::from_str(
            r#"{"voice_mappings": {"JOHN": "am_adam"}, "speed": 0.9}"#,
        )
        .unwrap();
        assert_eq!(request.voice_mappings["JOHN"], "am_adam");
        assert_eq!(request.speed, 0.9);
        assert_eq!(request.crossfade(), Duration::from_millis(50));
    }
}
