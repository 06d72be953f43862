use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use super::segment::{normalize_label, Segment, SpeakerId};

/// Tunables for speaker-label detection.
///
/// The false-positive filters for colon labels (word limit, reporting verbs)
/// are best-effort heuristics, not a grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct ParserConfig {
    /// Speaker for text that appears before any label.
    pub default_speaker: String,
    /// Longest accepted label, in characters.
    pub max_label_chars: usize,
    /// Colon labels with more words than this are read as prose.
    pub max_label_words: usize,
    /// A colon label ending in one of these words is prose ("She said: hi").
    pub reporting_verbs: Vec<String>,
    /// Colon prefixes that introduce prose rather than a speaker
    /// ("Note: the door is locked").
    pub non_speaker_words: Vec<String>,
    /// Screenplay directions that are never speakers.
    pub scene_keywords: Vec<String>,
    /// Drop unlabeled scene directions and parenthetical action lines
    /// instead of reading them aloud.
    pub skip_scene_directions: bool,
    /// Read a line holding only an upper-case name (`JOHN`) as a screenplay
    /// character cue for the lines that follow.
    pub screenplay_cues: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            default_speaker: "NARRATOR".to_string(),
            max_label_chars: 40,
            max_label_words: 4,
            reporting_verbs: words(&[
                "said", "says", "say", "asked", "asks", "replied", "replies", "answered",
                "answers", "shouted", "shouts", "whispered", "whispers", "yelled", "yells",
                "added", "adds", "explained", "explains", "told", "tells", "cried", "exclaimed",
                "muttered", "wrote", "writes", "announced", "declared",
            ]),
            non_speaker_words: words(&[
                "NOTE", "NOTES", "N.B.", "NB", "P.S.", "PS", "WARNING", "CAUTION", "IMPORTANT",
                "TIP", "HINT", "REMINDER", "EDIT", "UPDATE", "SUMMARY", "EXAMPLE", "DISCLAIMER",
                "SOURCE", "SUBJECT",
            ]),
            scene_keywords: words(&[
                "INT", "EXT", "FADE IN", "FADE OUT", "CUT TO", "DISSOLVE TO", "CONTINUED",
                "SCENE", "LOCATION", "NIGHT", "DAY", "MORNING", "EVENING", "LATER",
                "MEANWHILE", "FLASHBACK", "MONTAGE",
            ]),
            skip_scene_directions: false,
            screenplay_cues: false,
        }
    }
}

/// Notation a speaker label was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// `NAME: dialogue`
    Colon,
    /// `[NAME] dialogue`
    Bracket,
    /// `(NAME) dialogue`
    Paren,
    /// `**NAME** dialogue`
    Bold,
    /// `NAME` alone on its line, screenplay style
    Cue,
}

/// Splits a trimmed line into (candidate name, dialogue).
type Splitter = fn(&str) -> Option<(&str, &str)>;

/// Label notations in precedence order. The first accepted label wins.
const LABEL_MATCHERS: [(LabelStyle, Splitter); 4] = [
    (LabelStyle::Colon, split_colon),
    (LabelStyle::Bracket, split_bracket),
    (LabelStyle::Paren, split_paren),
    (LabelStyle::Bold, split_bold),
];

/// Characters that belong to the enclosed notations and never appear in a
/// colon label.
const ENCLOSING_CHARS: &[char] = &['[', ']', '(', ')', '{', '}', '*', '"'];

#[derive(Debug)]
struct Label<'a> {
    speaker: SpeakerId,
    raw: &'a str,
    dialogue: &'a str,
    style: LabelStyle,
}

/// Per-speaker line counts reported by [`ScriptParser::detect_speakers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerStats {
    pub speaker: SpeakerId,
    /// The label as first written in the script.
    pub label: String,
    /// Number of labeled lines.
    pub lines: usize,
}

/// Converts raw script text into ordered [`Segment`]s.
///
/// Parsing is total: malformed input degrades to a single segment for the
/// default speaker.
#[derive(Debug, Clone)]
pub struct ScriptParser {
    config: ParserConfig,
    default_speaker: SpeakerId,
    reporting_verbs: HashSet<String>,
    non_speaker_words: HashSet<String>,
    scene_keywords: HashSet<String>,
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl ScriptParser {
    pub fn new(config: ParserConfig) -> Self {
        let mut default_speaker = SpeakerId::new(&config.default_speaker);
        if default_speaker.is_empty() {
            log::warn!(
                "Default speaker {:?} normalizes to nothing, using NARRATOR",
                config.default_speaker
            );
            default_speaker = SpeakerId::new("NARRATOR");
        }
        let reporting_verbs = config
            .reporting_verbs
            .iter()
            .map(|v| v.to_lowercase())
            .collect();
        let normalized = |list: &[String]| -> HashSet<String> {
            list.iter()
                .map(|k| normalize_label(k))
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            default_speaker,
            reporting_verbs,
            non_speaker_words: normalized(&config.non_speaker_words),
            scene_keywords: normalized(&config.scene_keywords),
            config,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn default_speaker(&self) -> &SpeakerId {
        &self.default_speaker
    }

    /// Parse a script into segments in encounter order.
    pub fn parse(&self, raw_text: &str) -> Vec<Segment> {
        let text = normalize_line_endings(raw_text);
        let mut acc = Accumulator::default();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match self.extract_label(line) {
                Some(label) => {
                    if self.config.skip_scene_directions
                        && label.style == LabelStyle::Paren
                        && label.dialogue.is_empty()
                    {
                        log::debug!("Skipping parenthetical direction: {line:?}");
                        continue;
                    }
                    log::debug!("{:?} label {:?} -> {}", label.style, label.raw, label.speaker);
                    acc.switch_to(label.speaker);
                    acc.push(label.dialogue);
                }
                None => {
                    if self.config.skip_scene_directions && self.is_scene_direction(line) {
                        log::debug!("Skipping scene direction: {line:?}");
                        continue;
                    }
                    if acc.current.is_none() {
                        acc.switch_to(self.default_speaker.clone());
                    }
                    acc.push(line);
                }
            }
        }

        let segments = acc.finish();
        log::info!("Parsed {} dialogue segments", segments.len());
        segments
    }

    /// List the labeled speakers of a script with their line counts, in
    /// first-appearance order.
    pub fn detect_speakers(&self, raw_text: &str) -> Vec<SpeakerStats> {
        let text = normalize_line_endings(raw_text);
        let mut stats: Vec<SpeakerStats> = Vec::new();
        let mut index: HashMap<SpeakerId, usize> = HashMap::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some(label) = self.extract_label(line) else {
                continue;
            };
            match index.get(&label.speaker) {
                Some(&i) => stats[i].lines += 1,
                None => {
                    index.insert(label.speaker.clone(), stats.len());
                    stats.push(SpeakerStats {
                        speaker: label.speaker,
                        label: label.raw.trim().to_string(),
                        lines: 1,
                    });
                }
            }
        }

        log::info!("Detected {} speakers", stats.len());
        stats
    }

    fn extract_label<'a>(&self, line: &'a str) -> Option<Label<'a>> {
        LABEL_MATCHERS
            .iter()
            .find_map(|&(style, split)| {
                let (raw, dialogue) = split(line)?;
                let speaker = self.accept_name(raw, style, dialogue.is_empty())?;
                Some(Label {
                    speaker,
                    raw,
                    dialogue,
                    style,
                })
            })
            .or_else(|| self.cue_label(line))
    }

    fn cue_label<'a>(&self, line: &'a str) -> Option<Label<'a>> {
        if !self.config.screenplay_cues || !looks_like_cue(line) || self.is_scene_direction(line) {
            return None;
        }
        let speaker = self.accept_name(line, LabelStyle::Cue, true)?;
        Some(Label {
            speaker,
            raw: line,
            dialogue: "",
            style: LabelStyle::Cue,
        })
    }

    /// Decide whether a candidate name is a speaker label.
    fn accept_name(&self, raw: &str, style: LabelStyle, label_only: bool) -> Option<SpeakerId> {
        let name = raw.trim();
        if name.is_empty() || name.chars().count() > self.config.max_label_chars {
            return None;
        }
        if !name.chars().any(char::is_alphabetic) || ends_sentence(name) {
            return None;
        }

        // A bare `(beat)` or `[pause]` is a stage direction, not a name.
        if label_only
            && matches!(style, LabelStyle::Bracket | LabelStyle::Paren | LabelStyle::Bold)
            && name.chars().any(char::is_lowercase)
        {
            return None;
        }

        if matches!(style, LabelStyle::Colon | LabelStyle::Cue) {
            if name.contains(ENCLOSING_CHARS) {
                return None;
            }
            let words: Vec<&str> = name.split_whitespace().collect();
            if words.len() > self.config.max_label_words {
                return None;
            }
            let last = words.last()?.to_lowercase();
            if self.reporting_verbs.contains(&last) {
                return None;
            }
            if self.non_speaker_words.contains(normalize_label(name).as_str()) {
                return None;
            }
        }

        let speaker = SpeakerId::new(name);
        if speaker.is_empty() || self.scene_keywords.contains(speaker.as_str()) {
            return None;
        }
        Some(speaker)
    }

    fn is_scene_direction(&self, line: &str) -> bool {
        if line.starts_with('(') && line.ends_with(')') {
            return true;
        }
        let upper = normalize_label(line);
        self.scene_keywords.iter().any(|kw| {
            upper
                .strip_prefix(kw.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
        })
    }
}

/// Running state of the line scan: the active speaker and their not yet
/// emitted text.
#[derive(Debug, Default)]
struct Accumulator {
    current: Option<SpeakerId>,
    pending: String,
    segments: Vec<Segment>,
}

impl Accumulator {
    fn switch_to(&mut self, speaker: SpeakerId) {
        if self.current.as_ref() == Some(&speaker) {
            return;
        }
        self.flush();
        self.current = Some(speaker);
    }

    fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.pending.is_empty() {
            self.pending.push(' ');
        }
        self.pending.push_str(text);
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if let Some(speaker) = &self.current {
            let sequence_index = self.segments.len();
            self.segments.push(Segment {
                speaker: speaker.clone(),
                text: std::mem::take(&mut self.pending),
                sequence_index,
            });
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }
}

fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// True when a name reads like the end of a sentence. Short dotted words
/// (`Dr.`, `Mrs.`, `V.O.`) are abbreviations, not sentence ends.
fn ends_sentence(name: &str) -> bool {
    name.split_whitespace().any(|word| {
        word.contains(['!', '?', '…', ';'])
            || (word.ends_with('.') && word.chars().filter(|c| c.is_alphanumeric()).count() > 3)
    })
}

/// Upper-case letters, spaces, apostrophes, hyphens and dots only, starting
/// with a letter and at least three characters long.
fn looks_like_cue(line: &str) -> bool {
    line.chars().count() >= 3
        && line.starts_with(char::is_alphabetic)
        && line.chars().all(|c| {
            (c.is_alphabetic() && !c.is_lowercase())
                || c.is_whitespace()
                || matches!(c, '\'' | '-' | '.')
        })
}

fn split_colon(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    let (name, rest) = (&line[..idx], &line[idx + 1..]);
    if name.is_empty() || name.ends_with(char::is_whitespace) {
        return None;
    }
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    Some((name, rest.trim()))
}

fn split_enclosed<'a>(line: &'a str, open: &str, close: &str) -> Option<(&'a str, &'a str)> {
    let inner = line.strip_prefix(open)?;
    let end = inner.find(close)?;
    let name = inner[..end].trim().trim_end_matches(':').trim_end();
    let rest = inner[end + close.len()..].trim_start();
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    Some((name, rest.trim()))
}

fn split_bracket(line: &str) -> Option<(&str, &str)> {
    split_enclosed(line, "[", "]")
}

fn split_paren(line: &str) -> Option<(&str, &str)> {
    split_enclosed(line, "(", ")")
}

fn split_bold(line: &str) -> Option<(&str, &str)> {
    split_enclosed(line, "**", "**")
}
