//! Parsing of structured classification payloads.
//!
//! Models often wrap JSON in Markdown fences; those are removed before
//! parsing. Anything that still is not the expected JSON shape is a
//! [`ServiceError::MalformedResponse`].

use litscreen_shared::{BatchDecision, DocumentVerdict, RowId};
use serde_json::Value;
use tracing::warn;

use crate::ServiceError;

/// Category used when the service omits one.
const MISSING_CATEGORY: &str = "Unknown";

/// Reason used when a batch decision omits one.
const MISSING_REASON: &str = "Unknown";

/// Remove Markdown code fences (```` ```json ```` and ```` ``` ````) and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse a batch response: a JSON array of `{"ID", "Included", "Reason"}`.
///
/// Elements without a usable id are dropped with a warning; the rest of
/// the batch still counts.
pub fn parse_batch_decisions(text: &str) -> Result<Vec<BatchDecision>, ServiceError> {
    let cleaned = strip_code_fences(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let Value::Array(elements) = value else {
        return Err(ServiceError::MalformedResponse(
            "expected a JSON array of decisions".into(),
        ));
    };

    let mut decisions = Vec::with_capacity(elements.len());
    for element in &elements {
        let Some(id) = field(element, &["ID", "id", "Id"]).and_then(parse_id) else {
            warn!(element = %element, "decision without a usable ID, ignoring");
            continue;
        };
        let included = field(element, &["Included", "included"])
            .map(parse_bool)
            .unwrap_or(false);
        let reason = field(element, &["Reason", "reason"])
            .and_then(value_text)
            .unwrap_or_else(|| MISSING_REASON.to_string());
        decisions.push(BatchDecision {
            id,
            included,
            reason,
        });
    }
    Ok(decisions)
}

/// Parse a document response: a JSON object with a category and a reason.
///
/// The category is read from `methodology` or `category`.
pub fn parse_document_verdict(text: &str) -> Result<DocumentVerdict, ServiceError> {
    let cleaned = strip_code_fences(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(ServiceError::MalformedResponse(
            "expected a JSON object".into(),
        ));
    }

    let category = field(&value, &["methodology", "category", "Methodology", "Category"])
        .and_then(value_text)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| MISSING_CATEGORY.to_string());
    let reason = field(&value, &["reason", "Reason"])
        .and_then(value_text)
        .unwrap_or_default();

    Ok(DocumentVerdict { category, reason })
}

fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k)).filter(|v| !v.is_null())
}

fn parse_id(value: &Value) -> Option<RowId> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| RowId(n as usize)),
        Value::String(s) => s.trim().parse::<usize>().ok().map(RowId),
        _ => None,
    }
}

fn parse_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn parses_fenced_batch() {
        let text = "```json\n[\n  {\"ID\": 0, \"Included\": true, \"Reason\": \"on topic\"},\n  {\"ID\": \"2\", \"Included\": false, \"Reason\": \"off topic\"}\n]\n```";
        let decisions = parse_batch_decisions(text).expect("parse");
        assert_eq!(
            decisions,
            vec![
                BatchDecision {
                    id: RowId(0),
                    included: true,
                    reason: "on topic".into()
                },
                BatchDecision {
                    id: RowId(2),
                    included: false,
                    reason: "off topic".into()
                },
            ]
        );
    }

    #[test]
    fn missing_fields_get_defaults() {
        let decisions = parse_batch_decisions(r#"[{"ID": 5}]"#).unwrap();
        assert_eq!(decisions[0].id, RowId(5));
        assert!(!decisions[0].included);
        assert_eq!(decisions[0].reason, "Unknown");
    }

    #[test]
    fn elements_without_id_are_skipped() {
        let decisions =
            parse_batch_decisions(r#"[{"Included": true}, {"ID": -1}, {"ID": 1, "Included": "true"}]"#)
                .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].id, RowId(1));
        assert!(decisions[0].included);
    }

    #[test]
    fn non_array_batch_is_malformed() {
        let err = parse_batch_decisions(r#"{"ID": 1}"#).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));

        let err = parse_batch_decisions("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn parses_document_verdict() {
        let verdict =
            parse_document_verdict("```json\n{\"methodology\": \"Category A\", \"reason\": \"Uses A.\"}\n```")
                .unwrap();
        assert_eq!(verdict.category, "Category A");
        assert_eq!(verdict.reason, "Uses A.");
    }

    #[test]
    fn document_verdict_accepts_category_key_and_defaults() {
        let verdict = parse_document_verdict(r#"{"category": "Other"}"#).unwrap();
        assert_eq!(verdict.category, "Other");
        assert_eq!(verdict.reason, "");

        let verdict = parse_document_verdict(r#"{"reason": "unclear"}"#).unwrap();
        assert_eq!(verdict.category, "Unknown");
    }

    #[test]
    fn non_object_document_is_malformed() {
        let err = parse_document_verdict("[]").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }
}
