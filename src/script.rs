//! Narration scripts and the LLM-backed generator that writes them.
//!
//! The model is asked for JSON of the form
//! `{"script": [{"Speaker": "..."}, ...]}`; each entry becomes one
//! [`Segment`].  Length targets are conveyed through the prompt only, the
//! answer is not checked against the requested duration.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GenerationError;
use crate::llm::LanguageModel;
use crate::text::{ensure_terminal, word_count};

/// Words per minute used for duration estimates.
const WORDS_PER_MINUTE: f32 = 150.0;

// ─────────────────────────────────────────────────────────────────────────────
// Style / duration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Conversational,
    Interview,
    Debate,
    Educational,
}

impl Style {
    pub const ALL: [Style; 4] =
        [Style::Conversational, Style::Interview, Style::Debate, Style::Educational];

    pub fn as_str(self) -> &'static str {
        match self {
            Style::Conversational => "conversational",
            Style::Interview => "interview",
            Style::Debate => "debate",
            Style::Educational => "educational",
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Style::Conversational => "Create a natural, engaging narration by a single speaker discussing the document in a friendly, conversational tone.",
            Style::Educational => "Create an educational narration where the speaker explains concepts clearly and thoroughly for listeners.",
            Style::Interview => "Create a narrative format where the speaker presents information as if sharing insights from an interview or discussion.",
            Style::Debate => "Create a thoughtful narration where the speaker explores different perspectives and viewpoints on the topics.",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown style '{s}'"))
    }
}

/// Requested podcast length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TargetDuration {
    Five,
    #[default]
    Ten,
    Fifteen,
    Twenty,
}

impl TargetDuration {
    pub fn minutes(self) -> u32 {
        match self {
            TargetDuration::Five => 5,
            TargetDuration::Ten => 10,
            TargetDuration::Fifteen => 15,
            TargetDuration::Twenty => 20,
        }
    }

    fn guideline(self) -> &'static str {
        match self {
            TargetDuration::Five => "Keep the narration concise, focusing on 3-4 main points with brief explanations.",
            TargetDuration::Ten => "Cover the key topics thoroughly with good explanations and examples.",
            TargetDuration::Fifteen => "Provide comprehensive coverage with detailed discussions and multiple examples.",
            TargetDuration::Twenty => "Create an in-depth exploration with extensive analysis and supporting details.",
        }
    }
}

impl TryFrom<u32> for TargetDuration {
    type Error = String;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            5 => Ok(TargetDuration::Five),
            10 => Ok(TargetDuration::Ten),
            15 => Ok(TargetDuration::Fifteen),
            20 => Ok(TargetDuration::Twenty),
            m => Err(format!("unsupported duration {m} min (expected 5, 10, 15 or 20)")),
        }
    }
}

impl From<TargetDuration> for u32 {
    fn from(d: TargetDuration) -> u32 {
        d.minutes()
    }
}

impl FromStr for TargetDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_end_matches("minutes").trim_end_matches("min").trim();
        let minutes: u32 = digits.parse().map_err(|_| format!("invalid duration '{s}'"))?;
        TargetDuration::try_from(minutes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Script
// ─────────────────────────────────────────────────────────────────────────────

/// One narration unit.  `index` is its position in the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub source_id: String,
    pub style: Style,
    pub duration_minutes: u32,
    pub segment_count: usize,
}

/// Ordered narration segments plus metadata.
///
/// Built only through [`Script::new`], which numbers segments `0..n` and keeps
/// `metadata.segment_count == segments.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    segments: Vec<Segment>,
    metadata: ScriptMetadata,
}

impl Script {
    pub fn new(
        source_id: &str,
        style: Style,
        duration: TargetDuration,
        lines: impl IntoIterator<Item = String>,
    ) -> Self {
        let segments: Vec<Segment> = lines
            .into_iter()
            .enumerate()
            .map(|(index, text)| Segment { index, text })
            .collect();
        let metadata = ScriptMetadata {
            source_id: source_id.to_string(),
            style,
            duration_minutes: duration.minutes(),
            segment_count: segments.len(),
        };
        Self { segments, metadata }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn metadata(&self) -> &ScriptMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Spoken length at a typical narration pace.
    pub fn estimated_minutes(&self) -> f32 {
        let words: usize = self.segments.iter().map(|s| word_count(&s.text)).sum();
        words as f32 / WORDS_PER_MINUTE
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// Deserialisation goes through `Script::new` so a hand-edited file cannot
// break the numbering invariant.
impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            segments: Vec<Segment>,
            metadata: ScriptMetadata,
        }
        let mut raw = Raw::deserialize(d)?;
        raw.segments.sort_by_key(|s| s.index);
        let duration = TargetDuration::try_from(raw.metadata.duration_minutes)
            .map_err(serde::de::Error::custom)?;
        Ok(Script::new(
            &raw.metadata.source_id,
            raw.metadata.style,
            duration,
            raw.segments.into_iter().map(|s| s.text),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt and response handling
// ─────────────────────────────────────────────────────────────────────────────

fn build_prompt(document: &str, style: Style, duration: TargetDuration, max_chars: usize) -> String {
    let document: String = document.chars().take(max_chars).collect();
    let minutes = duration.minutes();
    format!(
        r#"Using the following document, create a podcast script for a single speaker narration.

STYLE GUIDELINES:
{style}

DURATION GUIDELINES:
{guide}

NARRATION RULES:
1. Break the content into natural segments (2-4 sentences each)
2. The narration should flow naturally with smooth transitions
3. Use engaging, conversational language that's easy to understand
4. Include a brief introduction at the start and wrap-up at the end
5. Break down complex concepts into digestible explanations
6. Maintain professional grammar and punctuation throughout
7. Make it engaging for listeners who haven't read the document

RESPONSE FORMAT:
Respond with a valid JSON object containing a 'script' array. Each array element should be an object with 'Speaker' as the key and the narration segment as the value.

Example format:
{{
  "script": [
    {{"Speaker": "Welcome to this podcast! Today we're diving into some fascinating insights from this document..."}},
    {{"Speaker": "Let's start by exploring the first key concept. This is particularly interesting because..."}}
  ]
}}

DOCUMENT CONTENT:
{document}

Generate an engaging {minutes} minutes podcast script now:"#,
        style = style.instruction(),
        guide = duration.guideline(),
    )
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's answer into cleaned segment texts.
///
/// Entries that are not one-key objects with a string value, or whose text
/// is blank, are dropped.  Every kept text ends with terminal punctuation.
pub fn parse_script_response(raw: &str) -> Result<Vec<String>, GenerationError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| GenerationError::Malformed(format!("not valid JSON ({e})")))?;

    let items = value
        .get("script")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::Malformed("missing 'script' array".into()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object().filter(|o| o.len() == 1)?;
            let text = obj.values().next()?.as_str()?.trim();
            (!text.is_empty()).then(|| ensure_terminal(text))
        })
        .collect())
}

/// No segments at all, or a lone one-word segment.
fn is_degenerate(lines: &[String]) -> bool {
    match lines {
        [] => true,
        [only] => word_count(only) <= 1,
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generator
// ─────────────────────────────────────────────────────────────────────────────

/// Turns source text into a [`Script`] through a [`LanguageModel`].
pub struct ScriptGenerator<L> {
    llm: L,
    max_source_chars: usize,
}

impl<L: LanguageModel> ScriptGenerator<L> {
    pub fn new(llm: L, max_source_chars: usize) -> Self {
        Self { llm, max_source_chars }
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    /// Ask the model for a script.  A malformed or degenerate answer is
    /// retried once; transport errors are returned immediately.
    pub fn generate(
        &self,
        source_id: &str,
        source_text: &str,
        style: Style,
        duration: TargetDuration,
    ) -> Result<Script, GenerationError> {
        tracing::info!(source_id, %style, minutes = duration.minutes(), "generating script");
        let prompt = build_prompt(source_text, style, duration, self.max_source_chars);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let raw = self.llm.complete(&prompt)?;
            let outcome = parse_script_response(&raw).and_then(|lines| {
                if is_degenerate(&lines) {
                    Err(GenerationError::Degenerate(format!("{} usable segment(s)", lines.len())))
                } else {
                    Ok(lines)
                }
            });

            match outcome {
                Ok(lines) => {
                    let script = Script::new(source_id, style, duration, lines);
                    tracing::info!(
                        segments = script.len(),
                        estimated_minutes = script.estimated_minutes(),
                        "script ready"
                    );
                    return Ok(script);
                }
                Err(e) if attempt < 2 => {
                    tracing::warn!(error = %e, "unusable model output, retrying once");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Scripted {
        replies: Vec<&'static str>,
        calls: Cell<usize>,
    }

    impl LanguageModel for Scripted {
        fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            let i = self.calls.get();
            self.calls.set(i + 1);
            Ok(self.replies[i.min(self.replies.len() - 1)].to_string())
        }
    }

    fn scripted(replies: Vec<&'static str>) -> ScriptGenerator<Scripted> {
        ScriptGenerator::new(Scripted { replies, calls: Cell::new(0) }, 8000)
    }

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain = r#"{"script":[{"Speaker":"Hello there"},{"Speaker":"Bye!"}]}"#;
        assert_eq!(parse_script_response(plain).unwrap(), vec!["Hello there.", "Bye!"]);

        let fenced = format!("```json\n{plain}\n```");
        assert_eq!(parse_script_response(&fenced).unwrap().len(), 2);

        let bare_fence = format!("```\n{plain}\n```");
        assert_eq!(parse_script_response(&bare_fence).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_drops_bad_entries() {
        let raw = r#"{"script":[
            {"Speaker":"  First point.  "},
            {"Speaker":"   "},
            {"Host":"Any key is fine"},
            {"A":"x","B":"y"},
            "not an object",
            {"Speaker": 42}
        ]}"#;
        assert_eq!(parse_script_response(raw).unwrap(), vec!["First point.", "Any key is fine."]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_script_response("sorry, I can't"), Err(GenerationError::Malformed(_))));
        assert!(matches!(
            parse_script_response(r#"{"lines":[]}"#),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_generate_numbers_segments() {
        let gen = scripted(vec![r#"{"script":[{"Speaker":"The sun is a star."},{"Speaker":"It is hot."}]}"#]);
        let script = gen.generate("src-1", "The sun is a star.", Style::Educational, TargetDuration::Five).unwrap();

        assert_eq!(script.metadata().segment_count, script.len());
        assert_eq!(script.metadata().duration_minutes, 5);
        assert_eq!(script.metadata().style, Style::Educational);
        for (i, seg) in script.segments().iter().enumerate() {
            assert_eq!(seg.index, i);
            assert!(!seg.text.is_empty());
        }
    }

    #[test]
    fn test_single_segment_is_accepted() {
        let gen = scripted(vec![r#"{"script":[{"Speaker":"The sun is a star."}]}"#]);
        let script = gen.generate("s", "x", Style::Conversational, TargetDuration::Ten).unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(gen.llm().calls.get(), 1);
    }

    #[test]
    fn test_degenerate_retried_once() {
        let gen = scripted(vec![
            r#"{"script":[{"Speaker":"Hi"}]}"#,
            r#"{"script":[{"Speaker":"Proper first."},{"Speaker":"Proper second."}]}"#,
        ]);
        let script = gen.generate("s", "x", Style::Debate, TargetDuration::Ten).unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(gen.llm().calls.get(), 2);
    }

    #[test]
    fn test_gives_up_after_second_bad_answer() {
        let gen = scripted(vec!["not json", r#"{"script":[]}"#]);
        let err = gen.generate("s", "x", Style::Debate, TargetDuration::Ten).unwrap_err();
        assert!(matches!(err, GenerationError::Degenerate(_)));
        assert_eq!(gen.llm().calls.get(), 2);
    }

    #[test]
    fn test_transport_error_not_retried() {
        let calls = Cell::new(0);
        let llm = |_: &str| {
            calls.set(calls.get() + 1);
            Err::<String, _>(GenerationError::Transport("connection refused".into()))
        };
        let gen = ScriptGenerator::new(llm, 8000);
        let err = gen.generate("s", "x", Style::Debate, TargetDuration::Ten).unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_prompt_contents() {
        let long = "a".repeat(10_000);
        let p = build_prompt(&long, Style::Interview, TargetDuration::Twenty, 8000);
        assert!(p.contains("interview or discussion"));
        assert!(p.contains("in-depth exploration"));
        assert!(p.contains("Generate an engaging 20 minutes podcast script now:"));
        assert!(p.contains(&"a".repeat(8000)));
        assert!(!p.contains(&"a".repeat(8001)));
    }

    #[test]
    fn test_style_and_duration_parsing() {
        assert_eq!("Educational".parse::<Style>().unwrap(), Style::Educational);
        assert!("lecture".parse::<Style>().is_err());
        assert_eq!("15".parse::<TargetDuration>().unwrap(), TargetDuration::Fifteen);
        assert_eq!("5 minutes".parse::<TargetDuration>().unwrap(), TargetDuration::Five);
        assert!("7".parse::<TargetDuration>().is_err());
    }

    #[test]
    fn test_script_json_layout() {
        let script = Script::new(
            "src-1",
            Style::Educational,
            TargetDuration::Five,
            vec!["One.".to_string(), "Two.".to_string()],
        );
        let v: Value = serde_json::from_str(&script.to_json().unwrap()).unwrap();
        assert_eq!(v["segments"][1]["index"], 1);
        assert_eq!(v["segments"][1]["text"], "Two.");
        assert_eq!(v["metadata"]["source_id"], "src-1");
        assert_eq!(v["metadata"]["style"], "educational");
        assert_eq!(v["metadata"]["duration_minutes"], 5);
        assert_eq!(v["metadata"]["segment_count"], 2);

        let back: Script = serde_json::from_value(v).unwrap();
        assert_eq!(back, script);
    }
}
