//! Prompt assembly and response parsing for the LLM synthesizer.
//!
//! Passages are shown to the model numbered from 1. Responses are JSON; the
//! model may wrap them in prose or code fences, so the outermost object is
//! extracted before parsing. Citations may be passage numbers or explicit
//! `{sutta_uid, segment_range}` objects.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;

use super::{Judgment, Synthesis};
use crate::memory::types::truncate_chars;
use crate::retrieval::{EvidenceKey, RetrievedChunk};

const PASSAGE_CHARS: usize = 1500;

pub const SYSTEM_PROMPT: &str = "You are a careful scholar of the Pali Canon. \
You answer only from the sutta passages you are given, quote the texts where it helps, \
and never invent suttas, passages or references. When the passages do not settle a \
question, say so plainly.";

pub fn format_passages(evidence: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in evidence.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {} ({}, {})\n{}\n",
            i + 1,
            chunk.title,
            chunk.sutta_uid,
            chunk.segment_range,
            truncate_chars(&chunk.text, PASSAGE_CHARS)
        );
    }
    out
}

pub fn judge_prompt(question: &str, evidence: &[RetrievedChunk]) -> String {
    format!(
        "Question: {question}\n\n\
         Passages retrieved so far:\n\n{passages}\
         Do these passages contain enough to answer the question well? \
         If not, propose one short search query that would find the missing material.\n\n\
         Respond with JSON only:\n\
         {{\"sufficient\": true|false, \"follow_up_query\": \"...\"}}",
        passages = if evidence.is_empty() {
            "(none)\n\n".to_string()
        } else {
            format_passages(evidence)
        },
    )
}

pub fn synthesis_prompt(question: &str, evidence: &[RetrievedChunk]) -> String {
    format!(
        "Question: {question}\n\n\
         Passages:\n\n{passages}\
         Write a clear answer grounded in these passages. Refer to passages by their \
         sutta id. List the passage numbers you relied on, most important first.\n\n\
         Respond with JSON only:\n\
         {{\"answer\": \"...\", \"citations\": [1, 2]}}",
        passages = format_passages(evidence),
    )
}

/// The outermost `{...}` in `text`, ignoring code fences and surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Deserialize)]
struct RawJudgment {
    sufficient: bool,
    #[serde(default)]
    follow_up_query: Option<String>,
}

pub fn parse_judgment(text: &str) -> Result<Judgment> {
    let json = extract_json_object(text).ok_or_else(|| anyhow!("no JSON object in judgment"))?;
    let raw: RawJudgment = serde_json::from_str(json).context("malformed judgment JSON")?;
    Ok(Judgment {
        sufficient: raw.sufficient,
        follow_up_query: raw.follow_up_query.unwrap_or_default().trim().to_string(),
    })
}

#[derive(Deserialize)]
struct RawSynthesis {
    answer: String,
    #[serde(default)]
    citations: Vec<Value>,
}

/// Map one cited entry onto an evidence key. Accepts a 1-based passage number
/// (integer, integral float, `"2"` or `"[2]"`) or a
/// `{sutta_uid, segment_range}` object.
fn cited_key(cited: &Value, evidence: &[RetrievedChunk]) -> Option<EvidenceKey> {
    let number = match cited {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim()
            .parse::<u64>()
            .ok(),
        Value::Object(obj) => {
            let field = |name: &str| obj.get(name).and_then(Value::as_str);
            return match (field("sutta_uid"), field("segment_range")) {
                (Some(uid), Some(range)) => Some(EvidenceKey::new(uid, range)),
                _ => None,
            };
        }
        _ => None,
    }?;
    usize::try_from(number)
        .ok()?
        .checked_sub(1)
        .and_then(|i| evidence.get(i))
        .map(RetrievedChunk::key)
}

pub fn parse_synthesis(text: &str, evidence: &[RetrievedChunk]) -> Result<Synthesis> {
    let json = extract_json_object(text).ok_or_else(|| anyhow!("no JSON object in answer"))?;
    let raw: RawSynthesis = serde_json::from_str(json).context("malformed answer JSON")?;
    if raw.answer.trim().is_empty() {
        bail!("model returned an empty answer");
    }

    let cited_evidence_keys = raw
        .citations
        .iter()
        .filter_map(|cited| {
            let key = cited_key(cited, evidence);
            if key.is_none() {
                tracing::debug!(%cited, "ignoring unusable citation");
            }
            key
        })
        .collect();

    Ok(Synthesis {
        answer_text: raw.answer.trim().to_string(),
        cited_evidence_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(uid: &str, range: &str) -> RetrievedChunk {
        RetrievedChunk {
            sutta_uid: uid.into(),
            title: format!("{uid} title"),
            nikaya: None,
            segment_range: range.into(),
            text: "passage text".into(),
            score: 0.5,
        }
    }

    #[test]
    fn passages_are_numbered_from_one() {
        let text = format_passages(&[chunk("sn12.1", "1.1-1.3"), chunk("sn12.2", "2.1")]);
        assert!(text.starts_with("[1] sn12.1 title (sn12.1, 1.1-1.3)"));
        assert!(text.contains("[2] sn12.2 title"));
    }

    #[test]
    fn judge_prompt_marks_empty_evidence() {
        assert!(judge_prompt("Q?", &[]).contains("(none)"));
    }

    #[test]
    fn parses_fenced_judgment() {
        let reply = "Sure.\n```json\n{\"sufficient\": false, \"follow_up_query\": \" twelve links \"}\n```";
        assert_eq!(parse_judgment(reply).unwrap(), Judgment::search_more("twelve links"));
        assert!(parse_judgment("{\"sufficient\": true}").unwrap().sufficient);
    }

    #[test]
    fn rejects_malformed_judgment() {
        assert!(parse_judgment("I think so").is_err());
        assert!(parse_judgment("{\"enough\": \"yes\"}").is_err());
    }

    #[test]
    fn synthesis_maps_numbers_and_keys() {
        let evidence = vec![chunk("sn12.1", "a"), chunk("sn12.2", "b")];
        let reply = r#"{"answer": "It is...", "citations": [2, 9, 0, {"sutta_uid": "mn38", "segment_range": "c"}]}"#;
        let synthesis = parse_synthesis(reply, &evidence).unwrap();
        assert_eq!(synthesis.answer_text, "It is...");
        assert_eq!(
            synthesis.cited_evidence_keys,
            vec![EvidenceKey::new("sn12.2", "b"), EvidenceKey::new("mn38", "c")]
        );
    }

    #[test]
    fn stray_citation_entries_are_skipped() {
        let evidence = vec![chunk("sn12.1", "a"), chunk("sn12.2", "b"), chunk("sn12.3", "c")];
        let reply = r#"{"answer": "Dependent origination is...",
            "citations": [1, "sn12.1", 2.0, "[3]", " 2 ", 1.5, -1, null, {"sutta_uid": "mn38"}, true]}"#;
        let synthesis = parse_synthesis(reply, &evidence).unwrap();
        assert_eq!(synthesis.answer_text, "Dependent origination is...");
        assert_eq!(
            synthesis.cited_evidence_keys,
            vec![
                EvidenceKey::new("sn12.1", "a"),
                EvidenceKey::new("sn12.2", "b"),
                EvidenceKey::new("sn12.3", "c"),
                EvidenceKey::new("sn12.2", "b"),
            ]
        );
    }

    #[test]
    fn synthesis_requires_answer_text() {
        assert!(parse_synthesis(r#"{"answer": "  ", "citations": []}"#, &[]).is_err());
        assert!(parse_synthesis("no json here", &[]).is_err());
    }
}
