use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// Gender class of a voice, used to pick voices for classified speakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Neutral,
}

/// One voice the synthesizer understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub id: String,
    pub gender: Gender,
    pub locale: String,
}

impl VoiceEntry {
    pub fn new(id: impl Into<String>, gender: Gender, locale: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gender,
            locale: locale.into(),
        }
    }

    /// Build an entry from a Kokoro voice name such as `"bm_george"`.
    pub fn from_kokoro_id(id: &str) -> Self {
        Self::new(id, kokoro_gender(id), kokoro_locale(id))
    }
}

/// Map a Kokoro voice prefix to its locale.
///
/// Unknown prefixes fall back to American English.
pub fn kokoro_locale(voice: &str) -> &'static str {
    let prefix = voice.get(..1).unwrap_or_default();
    match prefix {
        "a" => "en-us",
        "b" => "en-gb",
        "e" => "es",
        "f" => "fr",
        "h" => "hi",
        "i" => "it",
        "j" => "ja",
        "p" => "pt-br",
        "z" => "cmn",
        _ => "en-us",
    }
}

/// Second character of a Kokoro voice name: `f` female, `m` male.
pub fn kokoro_gender(voice: &str) -> Gender {
    match voice.get(1..2) {
        Some("f") => Gender::Female,
        Some("m") => Gender::Male,
        _ => Gender::Neutral,
    }
}

/// Catalog entry as written in a JSON catalog file. Missing gender and
/// locale are derived from the Kokoro naming convention.
#[derive(Debug, Deserialize)]
struct RawEntry {
    id: String,
    gender: Option<Gender>,
    locale: Option<String>,
}

/// Ordered, read-only list of available voices.
///
/// Catalog order drives round-robin assignment, so the same catalog always
/// yields the same assignments.
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    entries: Vec<VoiceEntry>,
    index: HashMap<String, usize>,
}

impl VoiceCatalog {
    /// Build a catalog. Fails on an empty list or duplicate voice ids.
    pub fn new(entries: Vec<VoiceEntry>) -> Result<Self, ScriptError> {
        if entries.is_empty() {
            return Err(ScriptError::Catalog("catalog has no voices".to_string()));
        }
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(ScriptError::Catalog(format!("entry {i} has an empty voice id")));
            }
            if index.insert(entry.id.clone(), i).is_some() {
                return Err(ScriptError::Catalog(format!(
                    "voice '{}' is listed more than once",
                    entry.id
                )));
            }
        }
        Ok(Self { entries, index })
    }

    /// The English Kokoro-82M voices.
    pub fn kokoro() -> Self {
        const IDS: &[&str] = &[
            "af_heart",
            "af_bella",
            "af_sarah",
            "af_sky",
            "af_nicole",
            "am_adam",
            "am_michael",
            "bf_emma",
            "bf_isabella",
            "bm_george",
            "bm_lewis",
        ];
        let entries: Vec<VoiceEntry> = IDS.iter().map(|id| VoiceEntry::from_kokoro_id(id)).collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// Parse a catalog from JSON: an array of `{"id", "gender", "locale"}`
    /// objects in catalog order.
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        let raw: Vec<RawEntry> = serde_json::from_str(json)
            .map_err(|e| ScriptError::Catalog(format!("Failed to parse JSON: {e}")))?;
        let entries = raw
            .into_iter()
            .map(|r| {
                let gender = r.gender.unwrap_or_else(|| kokoro_gender(&r.id));
                let locale = r.locale.unwrap_or_else(|| kokoro_locale(&r.id).to_string());
                VoiceEntry::new(r.id, gender, locale)
            })
            .collect();
        Self::new(entries)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content)?;
        log::info!("Loaded {} voices from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.index.contains_key(voice)
    }

    pub fn get(&self, voice: &str) -> Option<&VoiceEntry> {
        self.index.get(voice).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[VoiceEntry] {
        &self.entries
    }

    /// All voice ids in catalog order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Voices of one gender in catalog order.
    pub fn by_gender(&self, gender: Gender) -> Vec<&VoiceEntry> {
        self.entries.iter().filter(|e| e.gender == gender).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
