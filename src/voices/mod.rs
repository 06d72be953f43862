//! Voice catalog and speaker-to-voice resolution.
//!
//! The catalog is an ordered, read-only list of voices the synthesizer
//! understands. [`VoiceResolver`] assigns each speaker of a script one
//! catalog voice, in priority order:
//!
//! 1. an explicit caller mapping,
//! 2. the narrator voice for narrator aliases,
//! 3. the next unused voice of the speaker's gender pool (name lists),
//! 4. the next unused voice of the default pool.
//!
//! # Kokoro Voice Naming Convention
//!
//! Kokoro voices follow the pattern `{language}{gender}_{name}`, e.g.
//! `af_heart` (American English, female) or `bm_george` (British English,
//! male). [`VoiceEntry::from_kokoro_id`] derives gender and locale from it.

pub mod catalog;
pub mod resolver;

pub use catalog::{Gender, VoiceCatalog, VoiceEntry};
pub use resolver::{
    AssignmentSource, ResolverConfig, ResolverConfigBuilder, VoiceAssignment, VoiceMappingTable,
    VoiceResolver,
};
