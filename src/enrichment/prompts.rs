//! Versioned prompt templates for the chat-completion runtime.
//!
//! Templates reference request fields as `{field}`. Fields holding a language
//! code (`language`, `*_language`) are also available as `{field_name}` with
//! the English language name. Editing a template means adding a new version:
//! the version is part of every cache key, so old answers are never replayed
//! for a new prompt.

use serde::Serialize;
use serde_json::Value;

use super::domain::{ProviderError, TaskId};

/// Version used when the config does not name one.
pub const DEFAULT_VERSION: &str = "v1";

const LUI_V1: &str = r#"You help a language learner decide what to memorize.

Language: {language_name}
Looked-up word: {word}
Sentence: {sentence}

Identify the lexical unit the looked-up word belongs to in this sentence.
Return one JSON object with these keys:
- "lemma": dictionary form (verbs in the infinitive, nouns in the nominative singular). For reflexive verbs include the particle. For idioms and phrasal verbs give the full citation form.
- "part_of_speech": one of verb, noun, adj, adv, prep, conj, pron, num, part, interj, phrase
- "aspect": "perf" or "impf" for verbs in languages that mark aspect, otherwise ""
- "surface_lexical_unit": the exact substring of the sentence that forms the unit
- "unit_type": one of "lemma", "reflexive", "idiom", "phrasal_verb", "collocation"

Prefer the smallest unit that keeps the meaning. Respond with JSON only."#;

const WSD_V1: &str = r#"You are a bilingual lexicographer ({source_language_name} to {target_language_name}).

Word as it appears: {word}
Dictionary form: {lemma} ({part_of_speech})
Sentence: {sentence}

Give the meaning of the word in THIS sentence only.
Return one JSON object with these keys:
- "definition": short {target_language_name} definition of this sense, a few words, no examples
- "original_language_definition": short {source_language_name} definition of the same sense
- "cloze_deletion_score": integer 0-10, how well the sentence lets a learner guess the word if it is blanked out
- "usage_level": integer 1-5, how common this sense is (1 rare, 5 everyday)

Respond with JSON only."#;

const TRANSLATION_V1: &str = r#"Translate this {source_language_name} sentence into natural {target_language_name}.

Sentence: {sentence}
The word "{word}" is used in the sense: {definition}

Return one JSON object: {"translation": "..."}. Respond with JSON only."#;

const COLLOCATION_V1: &str = r#"List common {language_name} collocations for the {part_of_speech} "{lemma}".

Return one JSON object: {"collocations": ["...", "..."]} with 3 to 5 short, frequent word combinations in {language_name}. Respond with JSON only."#;

const HINT_V1: &str = r#"Write a very short {source_language_name} grammar hint for a learner about "{lemma}" ({part_of_speech}), meaning "{definition}".

Mention only what helps recognition: gender for nouns, the aspect partner for verbs, or register if it is unusual. At most ten words, written in {target_language_name}.
Return one JSON object: {"hint": "..."}. Respond with JSON only."#;

/// Look up a template by stage and version.
pub fn template(task: TaskId, version: &str) -> Option<&'static str> {
    match (task, version) {
        (TaskId::Candidate, "v1") => Some(LUI_V1),
        (TaskId::Sense, "v1") => Some(WSD_V1),
        (TaskId::Translation, "v1") => Some(TRANSLATION_V1),
        (TaskId::Collocation, "v1") => Some(COLLOCATION_V1),
        (TaskId::Hint, "v1") => Some(HINT_V1),
        _ => None,
    }
}

/// Fill a template with the fields of a request.
pub fn render<R: Serialize>(template: &str, request: &R) -> Result<String, ProviderError> {
    let value =
        serde_json::to_value(request).map_err(|e| ProviderError::Unsupported(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ProviderError::Unsupported(
            "request must serialize to an object".to_string(),
        ));
    };

    let mut prompt = template.to_string();
    for (key, value) in &fields {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        };
        if key == "language" || key.ends_with("_language") {
            prompt = prompt.replace(&format!("{{{}_name}}", key), language_name(&text));
        }
        prompt = prompt.replace(&format!("{{{}}}", key), &text);
    }
    Ok(prompt)
}

/// English name for an ISO 639-1 code; unknown codes are returned unchanged.
pub fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "pl" => "Polish",
        "en" => "English",
        "de" => "German",
        "es" => "Spanish",
        "fr" => "French",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "sv" => "Swedish",
        "cs" => "Czech",
        "sk" => "Slovak",
        "ru" => "Russian",
        "uk" => "Ukrainian",
        "ja" => "Japanese",
        "zh" => "Chinese",
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::domain::{CandidateRequest, SenseRequest};

    #[test]
    fn test_every_task_has_a_default_template() {
        for task in [
            TaskId::Candidate,
            TaskId::Sense,
            TaskId::Translation,
            TaskId::Collocation,
            TaskId::Hint,
        ] {
            assert!(template(task, DEFAULT_VERSION).is_some(), "missing {}", task);
        }
        assert!(template(TaskId::Sense, "v0").is_none());
    }

    #[test]
    fn test_render_candidate_prompt() {
        let request = CandidateRequest {
            word: "Zamek".to_string(),
            sentence: "Zamek na wzgórzu.".to_string(),
            language: "pl".to_string(),
        };
        let prompt = render(template(TaskId::Candidate, "v1").unwrap(), &request).unwrap();
        assert!(prompt.contains("Language: Polish"));
        assert!(prompt.contains("Looked-up word: Zamek"));
        assert!(prompt.contains("Sentence: Zamek na wzgórzu."));
        assert!(!prompt.contains("{word}"));
    }

    #[test]
    fn test_render_keeps_json_braces() {
        let request = SenseRequest {
            word: "zamku".to_string(),
            lemma: "zamek".to_string(),
            part_of_speech: "noun".to_string(),
            sentence: "W zamku było zimno.".to_string(),
            source_language: "pl".to_string(),
            target_language: "en".to_string(),
        };
        let prompt = render(template(TaskId::Sense, "v1").unwrap(), &request).unwrap();
        assert!(prompt.contains("(Polish to English)"));
        assert!(prompt.contains("zamek (noun)"));
        assert!(!prompt.contains("{lemma}"));

        let translation = render(TRANSLATION_V1, &request).unwrap();
        assert!(translation.contains(r#"{"translation": "..."}"#));
    }

    #[test]
    fn test_language_name_fallback() {
        assert_eq!(language_name("PL"), "Polish");
        assert_eq!(language_name("eo"), "eo");
    }
}
