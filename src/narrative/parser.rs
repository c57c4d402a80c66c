//! Parsing of the narrative model's response.

use crate::error::NarrativeError;
use crate::models::{NarrativeSummary, Priority, SynthesizedIssue};
use crate::privacy::sanitizer::truncate_chars;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Pull a JSON object or issue array out of a model response.
///
/// Accepts a ```json fence, a bare fence, raw JSON, or an object embedded
/// in surrounding prose.
pub fn extract_json_from_response(response: &str) -> Option<String> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim().to_string());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let body = &trimmed[start + 3..];
        // Skip a language tag on the opening fence.
        let body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or(body);
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') || inner.starts_with('[') {
                return Some(inner.to_string());
            }
        }
    }

    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    {
        return Some(trimmed.to_string());
    }

    extract_json_object(trimmed)
}

/// Find the first complete `{...}` object in the text.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escape {
            escape = false;
            continue;
        }
        if b == b'\\' && in_string {
            escape = true;
            continue;
        }
        if b == b'"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a response into a narrative.
///
/// The response is either an object with `summary` and `issues`, or a
/// bare array of issues. `related_insight_ids` are kept only when they
/// name a selected insight.
/// At most `max_issues` issues are kept.
pub fn parse_narrative(
    raw: &str,
    selected_ids: &[String],
    max_issues: usize,
) -> Result<NarrativeSummary, NarrativeError> {
    let parse_error = |message: String| NarrativeError::ResponseParse {
        message,
        raw: raw.to_string(),
    };

    let json_str = extract_json_from_response(raw)
        .ok_or_else(|| parse_error("No JSON object found in response".to_string()))?;
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| parse_error(format!("Invalid JSON: {}", e)))?;

    let (summary, items) = match &value {
        Value::Object(obj) => {
            let summary = obj
                .get("summary")
                .or_else(|| obj.get("narrative"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let items = obj.get("issues").and_then(Value::as_array);
            (summary, items)
        }
        Value::Array(items) => (None, Some(items)),
        _ => {
            return Err(parse_error(
                "Response JSON is neither an object nor an array".to_string(),
            ))
        }
    };

    let known: HashSet<&str> = selected_ids.iter().map(String::as_str).collect();
    let issues: Vec<SynthesizedIssue> = items
        .map(|items| {
            items
                .iter()
                .filter_map(|item| json_to_issue(item, &known))
                .take(max_issues)
                .collect()
        })
        .unwrap_or_default();

    if summary.is_none() && issues.is_empty() {
        return Err(parse_error(
            "Response has neither a summary nor any issues".to_string(),
        ));
    }

    debug!("Parsed narrative with {} issues", issues.len());
    Ok(NarrativeSummary { summary, issues })
}

fn json_to_issue(json: &Value, known: &HashSet<&str>) -> Option<SynthesizedIssue> {
    let title = json["title"].as_str()?.trim();
    if title.is_empty() {
        return None;
    }

    let related_insight_ids = json
        .get("related_insight_ids")
        .or_else(|| json.get("insight_ids"))
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .filter(|id| known.contains(id))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(SynthesizedIssue {
        title: truncate_chars(title, MAX_TITLE_LENGTH),
        description: truncate_chars(
            json["description"].as_str().unwrap_or("").trim(),
            MAX_DESCRIPTION_LENGTH,
        ),
        priority: Priority::parse_lenient(json["priority"].as_str().unwrap_or("medium")),
        category: json["category"].as_str().unwrap_or("general").to_string(),
        affected_count: json["affected_count"].as_u64().unwrap_or(0) as usize,
        related_insight_ids,
        cluster_title: json["cluster_title"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}
