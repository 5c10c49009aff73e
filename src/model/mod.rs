//! Core data models for the lookup-to-flashcard pipeline.
//!
//! Records flow through the pipeline in this order:
//! - [`RawLookup`] - one vocabulary lookup as stored by the reading device
//! - [`CandidateUnit`] - the lexical unit worth learning from that lookup
//! - [`SenseRecord`] - the unit with one disambiguated meaning
//! - [`EnrichedCard`] - the finished flashcard handed to the sink
//!
//! [`Watermark`] records how far the incremental import has progressed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smallvec::SmallVec;
use std::fmt;

use crate::text;

/// Tag applied to every card produced by this tool.
pub const BASE_TAG: &str = "lexicard";

/// Minimum cloze-suitability score (0-10) for a card to get a cloze variant.
pub const CLOZE_SCORE_THRESHOLD: u8 = 7;

/// Placeholder substituted for the looked-up expression in cloze sentences.
pub const CLOZE_MARKER: &str = "<b>[...]</b>";

/// Card tag set. Most cards carry three tags.
pub type Tags = SmallVec<[String; 4]>;

/// One vocabulary lookup as recorded by the reading device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLookup {
    /// Source-assigned identifier, stable across reads
    pub id: String,
    /// The word as the reader selected it (inflected)
    pub word: String,
    /// Device-provided stem, if any
    pub stem: Option<String>,
    /// Sentence the word was looked up in
    pub sentence: String,
    /// Language code of the book ("pl", "de", ...)
    pub language: String,
    /// Title of the book
    pub book_title: String,
    /// Device location marker inside the book
    pub location: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// High-water mark of processed lookups (milliseconds since the Unix epoch).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Watermark(pub i64);

impl Watermark {
    /// Nothing imported yet.
    pub const ORIGIN: Watermark = Watermark(0);

    /// Whether a lookup at `timestamp` was already handled.
    pub fn covers(&self, timestamp: i64) -> bool {
        timestamp <= self.0
    }

    pub fn millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ORIGIN {
            return write!(f, "never");
        }
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(time) => write!(f, "{} ({})", time.to_rfc3339(), self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Kind of lexical unit extracted from a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// A single word in dictionary form
    #[default]
    #[serde(alias = "word", alias = "single_word")]
    Lemma,
    /// A verb with its reflexive particle ("bać się")
    Reflexive,
    Idiom,
    #[serde(alias = "phrasal")]
    PhrasalVerb,
    Collocation,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lemma => "lemma",
            Self::Reflexive => "reflexive",
            Self::Idiom => "idiom",
            Self::PhrasalVerb => "phrasal_verb",
            Self::Collocation => "collocation",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of a card. New cards always start as `Raw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    #[default]
    Raw,
    Reviewed,
    Rejected,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Reviewed => "reviewed",
            Self::Rejected => "rejected",
        }
    }
}

/// The lexical unit judged worth learning from a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUnit {
    /// Exact text of the unit in the sentence
    pub surface: String,
    /// Dictionary form
    pub lemma: String,
    pub part_of_speech: String,
    /// Verb aspect ("perf"/"impf"), empty when not applicable
    pub aspect: String,
    pub unit_type: UnitType,
}

/// A candidate unit with one resolved meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenseRecord {
    pub unit: CandidateUnit,
    /// Definition in the learner's language
    pub definition: String,
    /// Definition in the book's language
    pub secondary_definition: String,
    /// Context sentence with the unit replaced by [`CLOZE_MARKER`]
    pub cloze_sentence: String,
    /// How well the sentence works as a cloze (0-10)
    pub cloze_score: u8,
    /// Usage frequency tier, 1 (rare) to 5 (everyday)
    pub usage_level: Option<u8>,
}

/// Names of the card fields, in delivery order.
pub const CARD_FIELDS: [&str; 20] = [
    "UID",
    "Expression",
    "Original_Form",
    "Part_Of_Speech",
    "Definition",
    "Secondary_Definition",
    "Context_Sentence",
    "Context_Sentence_Cloze",
    "Context_Translation",
    "Collocations",
    "Source_Language_Hint",
    "Notes",
    "Source_Book",
    "Location",
    "Status",
    "Cloze_Enabled",
    "Usage_Level",
    "Aspect",
    "Unit_Type",
    "Tags",
];

/// A finished flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCard {
    /// Deterministic identifier, see [`card_uid`]
    pub uid: String,
    /// Lookup this card was built from
    pub lookup_id: String,
    /// Timestamp of that lookup
    pub timestamp: i64,
    pub language: String,

    pub expression: String,
    pub original_form: String,
    pub part_of_speech: String,
    pub definition: String,
    pub secondary_definition: String,
    pub context_sentence: String,
    pub context_cloze: String,
    pub context_translation: String,
    pub collocations: Vec<String>,
    pub language_hint: String,
    pub notes: String,
    pub source_book: String,
    pub location: String,
    pub status: CardStatus,
    pub cloze_enabled: bool,
    pub usage_level: Option<u8>,
    pub aspect: String,
    pub unit_type: UnitType,
    pub tags: Tags,
}

impl EnrichedCard {
    /// Combine a resolved sense with the later stage outputs.
    pub fn assemble(
        lookup: &RawLookup,
        sense: SenseRecord,
        context_translation: String,
        collocations: Vec<String>,
        language_hint: String,
    ) -> Self {
        let location = format!("loc_{}", lookup.location);
        let uid = card_uid(
            &sense.unit.lemma,
            &sense.definition,
            &lookup.book_title,
            &location,
        );
        let cloze_enabled = sense.cloze_score >= CLOZE_SCORE_THRESHOLD
            && !sense.cloze_sentence.is_empty();

        Self {
            uid,
            lookup_id: lookup.id.clone(),
            timestamp: lookup.timestamp,
            language: lookup.language.clone(),
            expression: sense.unit.lemma,
            original_form: sense.unit.surface,
            part_of_speech: sense.unit.part_of_speech,
            definition: sense.definition,
            secondary_definition: sense.secondary_definition,
            context_sentence: lookup.sentence.clone(),
            context_cloze: sense.cloze_sentence,
            context_translation,
            collocations,
            language_hint,
            notes: String::new(),
            source_book: lookup.book_title.clone(),
            location,
            status: CardStatus::Raw,
            cloze_enabled,
            usage_level: sense.usage_level,
            aspect: sense.unit.aspect,
            unit_type: sense.unit.unit_type,
            tags: card_tags(&lookup.language, &lookup.book_title),
        }
    }

    /// Field values in [`CARD_FIELDS`] order, rendered for the flashcard app.
    pub fn field_values(&self) -> [String; 20] {
        [
            self.uid.clone(),
            self.expression.clone(),
            self.original_form.clone(),
            self.part_of_speech.clone(),
            self.definition.clone(),
            self.secondary_definition.clone(),
            html_lines(&highlight(&self.context_sentence, &self.original_form)),
            html_lines(&self.context_cloze),
            self.context_translation.clone(),
            self.collocations.join(", "),
            self.language_hint.clone(),
            self.notes.clone(),
            self.source_book.clone(),
            self.location.clone(),
            self.status.as_str().to_string(),
            if self.cloze_enabled { "True" } else { "" }.to_string(),
            self.usage_level.map(|l| l.to_string()).unwrap_or_default(),
            self.aspect.clone(),
            self.unit_type.as_str().to_string(),
            self.tags.join(" "),
        ]
    }

    /// Append tags from another card that this card does not carry yet.
    ///
    /// Existing tags keep their position, so a merged card still starts with
    /// the base, language and book tags in [`card_tags`] order.
    pub fn merge_tags<'a>(&mut self, other: impl IntoIterator<Item = &'a String>) {
        for tag in other {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
    }
}

/// Deterministic card identifier.
///
/// Pure function of (expression, definition, source, location), insensitive
/// to case and Unicode composition differences in its inputs.
pub fn card_uid(expression: &str, definition: &str, source: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [expression, definition, source, location] {
        hasher.update(text::fold_key(part).as_bytes());
        hasher.update([0x1f]);
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}_{}", text::uid_slug(expression, 10), &digest[..12])
}

/// Tags for a new card: base tag, language, book slug.
pub fn card_tags(language: &str, book_title: &str) -> Tags {
    let mut tags = Tags::new();
    tags.push(BASE_TAG.to_string());
    let language = text::fold_key(language);
    if !language.is_empty() {
        tags.push(language);
    }
    if let Some(book) = text::book_tag(book_title) {
        tags.push(book);
    }
    tags
}

/// Replace the first occurrence of `surface` with [`CLOZE_MARKER`].
///
/// Returns an empty string when the surface form is not in the sentence.
pub fn cloze_markup(sentence: &str, surface: &str) -> String {
    if surface.is_empty() || !sentence.contains(surface) {
        return String::new();
    }
    sentence.replacen(surface, CLOZE_MARKER, 1)
}

/// Bold the first occurrence of `surface` in the sentence.
pub fn highlight(sentence: &str, surface: &str) -> String {
    if surface.is_empty() || !sentence.contains(surface) {
        return sentence.to_string();
    }
    sentence.replacen(surface, &format!("<b>{}</b>", surface), 1)
}

fn html_lines(text: &str) -> String {
    text.replace('\r', "").replace('\n', "<br>")
}
