use std::collections::{BTreeMap, HashMap, HashSet};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use super::catalog::{Gender, VoiceCatalog, VoiceEntry};
use crate::error::ScriptError;
use crate::script::SpeakerId;

/// Heuristic tables for voice assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct ResolverConfig {
    /// Speaker names that always get the narrator voice. Any speaker whose
    /// first word starts with `NARR` counts as well.
    pub narrator_aliases: Vec<String>,
    pub narrator_voice: String,
    pub male_names: Vec<String>,
    pub female_names: Vec<String>,
    /// Names known to be neither; these draw from the catalog's neutral
    /// voices when it has any.
    pub neutral_names: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            narrator_aliases: words(&["NARRATOR", "NARRATION", "VOICEOVER", "VOICE OVER", "V.O."]),
            narrator_voice: "af_heart".to_string(),
            male_names: words(&[
                "john", "mike", "david", "james", "robert", "michael", "william", "joseph",
                "thomas", "charles", "daniel", "paul", "mark", "george", "peter", "alex", "adam",
                "steve", "jack", "tom", "bob", "henry", "knox", "bernard", "mclain", "sims",
                "wizard", "king", "father", "man", "boy",
            ]),
            female_names: words(&[
                "sarah", "mary", "jennifer", "linda", "patricia", "barbara", "elizabeth", "susan",
                "jessica", "karen", "nancy", "lisa", "betty", "margaret", "sandra", "ashley",
                "emily", "donna", "bella", "emma", "sophia", "isabella", "shirley", "queen",
                "mother", "woman", "girl",
            ]),
            neutral_names: words(&["robot", "computer", "ai", "announcer", "host", "chorus"]),
        }
    }
}

/// How a speaker's voice was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentSource {
    Explicit,
    Narrator,
    Gender(Gender),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceAssignment {
    pub speaker: SpeakerId,
    pub voice: String,
    pub source: AssignmentSource,
}

/// Resolved speaker → voice assignment for one request, in speaker
/// discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VoiceMappingTable {
    assignments: Vec<VoiceAssignment>,
    #[serde(skip)]
    index: HashMap<SpeakerId, usize>,
}

impl VoiceMappingTable {
    pub fn voice_for(&self, speaker: &SpeakerId) -> Option<&str> {
        self.get(speaker).map(|a| a.voice.as_str())
    }

    pub fn get(&self, speaker: &SpeakerId) -> Option<&VoiceAssignment> {
        self.index.get(speaker).map(|&i| &self.assignments[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoiceAssignment> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Plain speaker → voice map, usable as explicit mappings of a later
    /// request.
    pub fn to_mappings(&self) -> BTreeMap<String, String> {
        self.assignments
            .iter()
            .map(|a| (a.speaker.to_string(), a.voice.clone()))
            .collect()
    }

    fn insert(&mut self, assignment: VoiceAssignment) {
        self.index
            .insert(assignment.speaker.clone(), self.assignments.len());
        self.assignments.push(assignment);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PoolKind {
    Male,
    Female,
    Neutral,
    Default,
}

/// Mutable per-request assignment state: one round-robin cursor per pool and
/// the set of voices already handed out.
#[derive(Debug, Default)]
struct AssignmentState {
    cursors: HashMap<PoolKind, usize>,
    used: HashSet<String>,
}

impl AssignmentState {
    /// Next voice of `pool` not yet used by any speaker of this request,
    /// searching from the pool's cursor. When every voice is taken the pool
    /// is cycled.
    fn next_voice(&mut self, kind: PoolKind, pool: &[&VoiceEntry]) -> String {
        let n = pool.len();
        let cursor = self.cursors.entry(kind).or_insert(0);

        let unused = (0..n)
            .map(|offset| (*cursor + offset) % n)
            .find(|&i| !self.used.contains(&pool[i].id));
        let chosen = unused.unwrap_or(*cursor % n);
        *cursor = chosen + 1;

        let voice = pool[chosen].id.clone();
        self.used.insert(voice.clone());
        voice
    }
}

/// Assigns catalog voices to speakers. Read-only after construction and
/// safe to share between requests.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    config: ResolverConfig,
    narrator_aliases: HashSet<SpeakerId>,
    male: HashSet<String>,
    female: HashSet<String>,
    neutral: HashSet<String>,
}

impl Default for VoiceResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl VoiceResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let names = |list: &[String]| -> HashSet<String> {
            list.iter().map(|n| SpeakerId::new(n).to_string()).collect()
        };
        Self {
            narrator_aliases: config
                .narrator_aliases
                .iter()
                .map(|a| SpeakerId::new(a))
                .collect(),
            male: names(&config.male_names),
            female: names(&config.female_names),
            neutral: names(&config.neutral_names),
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Assign a voice to every speaker in `speakers`.
    ///
    /// Every explicit mapping is checked against the catalog first, so a bad
    /// mapping fails the request even if its speaker never talks. Keys that
    /// normalize to nothing, or two keys naming one speaker with different
    /// voices, are rejected as well.
    pub fn resolve(
        &self,
        speakers: &[SpeakerId],
        explicit_mappings: &BTreeMap<String, String>,
        catalog: &VoiceCatalog,
    ) -> Result<VoiceMappingTable, ScriptError> {
        let mut explicit: HashMap<SpeakerId, &str> =
            HashMap::with_capacity(explicit_mappings.len());
        for (key, voice) in explicit_mappings {
            if !catalog.contains(voice) {
                return Err(ScriptError::Configuration {
                    speaker: key.clone(),
                    voice: voice.clone(),
                });
            }
            let speaker = SpeakerId::new(key);
            if speaker.is_empty() {
                return Err(ScriptError::Config(format!(
                    "voice mapping key {key:?} is not a speaker name"
                )));
            }
            match explicit.insert(speaker.clone(), voice.as_str()) {
                Some(previous) if previous != voice.as_str() => {
                    return Err(ScriptError::Config(format!(
                        "speaker {speaker} is mapped to both '{previous}' and '{voice}'"
                    )));
                }
                _ => {}
            }
        }

        let male_pool = catalog.by_gender(Gender::Male);
        let female_pool = catalog.by_gender(Gender::Female);
        let neutral_pool = catalog.by_gender(Gender::Neutral);
        let default_pool = if neutral_pool.is_empty() {
            catalog.entries().iter().collect()
        } else {
            neutral_pool.clone()
        };

        let narrator_voice = catalog
            .get(&self.config.narrator_voice)
            .map(|e| e.id.as_str());
        if narrator_voice.is_none() {
            log::warn!(
                "Narrator voice '{}' is not in the catalog, narrators use the default pool",
                self.config.narrator_voice
            );
        }

        let mut state = AssignmentState::default();
        // Explicit voices are taken before any heuristic pick.
        state
            .used
            .extend(explicit.values().map(|v| v.to_string()));

        let mut table = VoiceMappingTable::default();
        for speaker in speakers {
            if table.get(speaker).is_some() {
                continue;
            }

            let (voice, source) = if let Some(voice) = explicit.get(speaker) {
                (voice.to_string(), AssignmentSource::Explicit)
            } else if let (true, Some(voice)) = (self.is_narrator(speaker), narrator_voice) {
                state.used.insert(voice.to_string());
                (voice.to_string(), AssignmentSource::Narrator)
            } else {
                match self.classify(speaker) {
                    Some(Gender::Male) if !male_pool.is_empty() => (
                        state.next_voice(PoolKind::Male, &male_pool),
                        AssignmentSource::Gender(Gender::Male),
                    ),
                    Some(Gender::Female) if !female_pool.is_empty() => (
                        state.next_voice(PoolKind::Female, &female_pool),
                        AssignmentSource::Gender(Gender::Female),
                    ),
                    Some(Gender::Neutral) if !neutral_pool.is_empty() => (
                        state.next_voice(PoolKind::Neutral, &neutral_pool),
                        AssignmentSource::Gender(Gender::Neutral),
                    ),
                    _ => (
                        state.next_voice(PoolKind::Default, &default_pool),
                        AssignmentSource::Default,
                    ),
                }
            };

            log::debug!("Speaker {speaker} -> {voice} ({source:?})");
            table.insert(VoiceAssignment {
                speaker: speaker.clone(),
                voice,
                source,
            });
        }

        log::info!("Resolved voices for {} speakers", table.len());
        Ok(table)
    }

    fn is_narrator(&self, speaker: &SpeakerId) -> bool {
        self.narrator_aliases.contains(speaker) || speaker.first_token().starts_with("NARR")
    }

    /// Gender class from the name lists: the full name first, then its
    /// first word.
    fn classify(&self, speaker: &SpeakerId) -> Option<Gender> {
        let lookup = |name: &str| {
            if self.male.contains(name) {
                Some(Gender::Male)
            } else if self.female.contains(name) {
                Some(Gender::Female)
            } else if self.neutral.contains(name) {
                Some(Gender::Neutral)
            } else {
                None
            }
        };
        lookup(speaker.as_str()).or_else(|| lookup(speaker.first_token()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speakers(names: &[&str]) -> Vec<SpeakerId> {
        names.iter().map(|n| SpeakerId::new(n)).collect()
    }

    fn resolve(names: &[&str]) -> VoiceMappingTable {
        VoiceResolver::default()
            .resolve(&speakers(names), &BTreeMap::new(), &VoiceCatalog::kokoro())
            .unwrap()
    }

    fn voice<'a>(table: &'a VoiceMappingTable, name: &str) -> &'a str {
        table.voice_for(&SpeakerId::new(name)).unwrap()
    }

    #[test]
    fn explicit_mapping_wins_over_heuristics() {
        let mut mappings = BTreeMap::new();
        mappings.insert("john".to_string(), "bm_lewis".to_string());
        let table = VoiceResolver::default()
            .resolve(&speakers(&["JOHN"]), &mappings, &VoiceCatalog::kokoro())
            .unwrap();
        assert_eq!(voice(&table, "JOHN"), "bm_lewis");
        assert_eq!(
            table.get(&SpeakerId::new("JOHN")).unwrap().source,
            AssignmentSource::Explicit
        );
    }

    #[test]
    fn unknown_explicit_voice_is_configuration_error() {
        let mut mappings = BTreeMap::new();
        mappings.insert("JOHN".to_string(), "am_nobody".to_string());
        let err = VoiceResolver::default()
            .resolve(&speakers(&["JOHN"]), &mappings, &VoiceCatalog::kokoro())
            .unwrap_err();
        match err {
            ScriptError::Configuration { speaker, voice } => {
                assert_eq!(speaker, "JOHN");
                assert_eq!(voice, "am_nobody");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_explicit_voice_fails_even_for_absent_speaker() {
        let mut mappings = BTreeMap::new();
        mappings.insert("GHOST".to_string(), "xx_none".to_string());
        let result =
            VoiceResolver::default().resolve(&speakers(&["JOHN"]), &mappings, &VoiceCatalog::kokoro());
        assert!(matches!(result, Err(ScriptError::Configuration { .. })));
    }

    #[test]
    fn narrator_aliases_share_the_narrator_voice() {
        let table = resolve(&["NARRATOR", "Narration", "V.O.", "NARRATOR 2"]);
        for name in ["NARRATOR", "NARRATION", "V O", "NARRATOR 2"] {
            assert_eq!(voice(&table, name), "af_heart", "speaker {name}");
        }
    }

    #[test]
    fn gendered_names_draw_from_their_pool() {
        let table = resolve(&["NARRATOR", "JOHN", "SARAH", "MIKE", "EMMA"]);
        assert_eq!(voice(&table, "JOHN"), "am_adam");
        assert_eq!(voice(&table, "MIKE"), "am_michael");
        // af_heart is already the narrator's
        assert_eq!(voice(&table, "SARAH"), "af_bella");
        assert_eq!(voice(&table, "EMMA"), "af_sarah");
    }

    #[test]
    fn first_token_classifies_full_names() {
        let table = resolve(&["MARY JANE", "JOHN SMITH"]);
        assert_eq!(
            table.get(&SpeakerId::new("MARY JANE")).unwrap().source,
            AssignmentSource::Gender(Gender::Female)
        );
        assert_eq!(voice(&table, "JOHN SMITH"), "am_adam");
    }

    #[test]
    fn exhausted_pool_cycles_in_catalog_order() {
        let table = resolve(&["JOHN", "MIKE", "DAVID", "JAMES", "ROBERT", "PAUL"]);
        let voices: Vec<&str> = table.iter().map(|a| a.voice.as_str()).collect();
        assert_eq!(
            voices,
            vec!["am_adam", "am_michael", "bm_george", "bm_lewis", "am_adam", "am_michael"]
        );
    }

    #[test]
    fn unclassified_speakers_use_default_pool_round_robin() {
        let table = resolve(&["ZORG", "QUUX"]);
        assert_eq!(voice(&table, "ZORG"), "af_heart");
        assert_eq!(voice(&table, "QUUX"), "af_bella");
        assert_eq!(
            table.get(&SpeakerId::new("ZORG")).unwrap().source,
            AssignmentSource::Default
        );
    }

    #[test]
    fn default_pool_prefers_neutral_voices() {
        let catalog = VoiceCatalog::new(vec![
            VoiceEntry::from_kokoro_id("am_adam"),
            VoiceEntry::new("robot_a", Gender::Neutral, "en-us"),
            VoiceEntry::new("robot_b", Gender::Neutral, "en-us"),
        ])
        .unwrap();
        let table = VoiceResolver::default()
            .resolve(&speakers(&["ZORG", "QUUX", "BLIP"]), &BTreeMap::new(), &catalog)
            .unwrap();
        assert_eq!(voice(&table, "ZORG"), "robot_a");
        assert_eq!(voice(&table, "QUUX"), "robot_b");
        assert_eq!(voice(&table, "BLIP"), "robot_a");
    }

    #[test]
    fn neutral_names_draw_from_neutral_voices() {
        let catalog = VoiceCatalog::new(vec![
            VoiceEntry::from_kokoro_id("am_adam"),
            VoiceEntry::from_kokoro_id("af_sky"),
            VoiceEntry::new("robot_a", Gender::Neutral, "en-us"),
            VoiceEntry::new("robot_b", Gender::Neutral, "en-us"),
        ])
        .unwrap();
        let table = VoiceResolver::default()
            .resolve(&speakers(&["COMPUTER", "ZORG"]), &BTreeMap::new(), &catalog)
            .unwrap();
        let computer = table.get(&SpeakerId::new("COMPUTER")).unwrap();
        assert_eq!(computer.voice, "robot_a");
        assert_eq!(computer.source, AssignmentSource::Gender(Gender::Neutral));
        let zorg = table.get(&SpeakerId::new("ZORG")).unwrap();
        assert_eq!(zorg.voice, "robot_b");
        assert_eq!(zorg.source, AssignmentSource::Default);
    }

    #[test]
    fn neutral_names_without_neutral_voices_use_default_pool() {
        let table = resolve(&["COMPUTER"]);
        let computer = table.get(&SpeakerId::new("COMPUTER")).unwrap();
        assert_eq!(computer.voice, "af_heart");
        assert_eq!(computer.source, AssignmentSource::Default);
    }

    #[test]
    fn conflicting_explicit_keys_are_rejected() {
        let mut mappings = BTreeMap::new();
        mappings.insert("JOHN".to_string(), "am_adam".to_string());
        mappings.insert("john".to_string(), "bm_lewis".to_string());
        let result =
            VoiceResolver::default().resolve(&speakers(&["JOHN"]), &mappings, &VoiceCatalog::kokoro());
        assert!(matches!(result, Err(ScriptError::Config(_))));

        // the same voice under two spellings is harmless
        mappings.insert("john".to_string(), "am_adam".to_string());
        let table = VoiceResolver::default()
            .resolve(&speakers(&["JOHN"]), &mappings, &VoiceCatalog::kokoro())
            .unwrap();
        assert_eq!(voice(&table, "JOHN"), "am_adam");
    }

    #[test]
    fn empty_explicit_key_is_rejected() {
        let mut mappings = BTreeMap::new();
        mappings.insert("***".to_string(), "am_adam".to_string());
        let result =
            VoiceResolver::default().resolve(&speakers(&["JOHN"]), &mappings, &VoiceCatalog::kokoro());
        assert!(matches!(result, Err(ScriptError::Config(_))));
    }

    #[test]
    fn missing_gender_pool_falls_back_to_default() {
        let catalog = VoiceCatalog::new(vec![VoiceEntry::from_kokoro_id("af_sky")]).unwrap();
        let table = VoiceResolver::default()
            .resolve(&speakers(&["JOHN"]), &BTreeMap::new(), &catalog)
            .unwrap();
        assert_eq!(voice(&table, "JOHN"), "af_sky");
        assert_eq!(
            table.get(&SpeakerId::new("JOHN")).unwrap().source,
            AssignmentSource::Default
        );
    }

    #[test]
    fn missing_narrator_voice_falls_back_to_pools() {
        let catalog = VoiceCatalog::new(vec![VoiceEntry::from_kokoro_id("bm_george")]).unwrap();
        let table = VoiceResolver::default()
            .resolve(&speakers(&["NARRATOR"]), &BTreeMap::new(), &catalog)
            .unwrap();
        assert_eq!(voice(&table, "NARRATOR"), "bm_george");
    }

    #[test]
    fn heuristics_skip_explicitly_mapped_voices() {
        let mut mappings = BTreeMap::new();
        mappings.insert("BOSS".to_string(), "am_adam".to_string());
        let table = VoiceResolver::default()
            .resolve(&speakers(&["BOSS", "JOHN"]), &mappings, &VoiceCatalog::kokoro())
            .unwrap();
        assert_eq!(voice(&table, "JOHN"), "am_michael");
    }

    #[test]
    fn resolution_is_deterministic() {
        let names = ["NARRATOR", "JOHN", "ZORG", "SARAH", "QUUX", "MIKE", "BLIP"];
        let first = resolve(&names);
        for _ in 0..5 {
            assert_eq!(resolve(&names), first);
        }
    }

    #[test]
    fn duplicate_speakers_get_one_entry() {
        let table = resolve(&["JOHN", "john", "JOHN"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_round_trips_into_mappings() {
        let table = resolve(&["NARRATOR", "JOHN"]);
        let mappings = table.to_mappings();
        assert_eq!(mappings.get("JOHN").map(String::as_str), Some("am_adam"));
        let again = VoiceResolver::default()
            .resolve(&speakers(&["NARRATOR", "JOHN"]), &mappings, &VoiceCatalog::kokoro())
            .unwrap();
        assert_eq!(again.voice_for(&SpeakerId::new("JOHN")), Some("am_adam"));
    }
}
