//! Script parsing.
//!
//! A script is plain text in which each line may open with a speaker label.
//! Four label notations are recognized, tried in this order:
//!
//! | Notation | Example |
//! |---|---|
//! | colon | `JOHN: Hello there.` |
//! | bracket | `[JOHN] Hello there.` |
//! | parenthesis | `(JOHN) Hello there.` |
//! | bold | `**JOHN** Hello there.` |
//!
//! Lines without a label continue the previous speaker's utterance, or are
//! given to the default speaker (`NARRATOR`) when nobody has spoken yet.
//!
//! # Examples
//!
//! ```rust
//! use script_tts::ScriptParser;
//!
//! let parser = ScriptParser::default();
//! let segments = parser.parse("NARRATOR: Hello.\nJOHN: Hi there.\nJOHN: Good to see you.");
//!
//! assert_eq!(segments.len(), 2);
//! assert_eq!(segments[1].speaker.as_str(), "JOHN");
//! assert_eq!(segments[1].text, "Hi there. Good to see you.");
//! ```

pub mod parser;
pub mod segment;

pub use parser::{LabelStyle, ParserConfig, ParserConfigBuilder, ScriptParser, SpeakerStats};
pub use segment::{distinct_speakers, normalize_label, Segment, SpeakerId};
