//! Shape enforcement for structured model output.
//!
//! The model answers validation and classification requests with loose JSON.
//! Nothing past this module ever sees that JSON: [`coerce_verdict`] maps it
//! into an [`AnswerVerdict`] whose value shape is guaranteed to match the
//! question kind, and [`parse_compliance_verdict`] does the same for
//! classification output. Shape mismatches become `Invalid`/clean verdicts,
//! never panics.

use serde_json::Value;
use switchboard_types::{
    AnswerValue, AnswerVerdict, CompanyEntity, ComplianceVerdict, KnownCompanyPolicy,
    QuestionKind,
};

/// Coerces raw validation output into a typed verdict for `kind`.
///
/// Expected raw shape: `{"valid": bool, "value": ..., "feedback": string?}`.
/// A `valid: true` whose value cannot be coerced to the kind's shape is
/// treated as invalid; the model does not get to override the contract.
pub fn coerce_verdict(
    kind: QuestionKind,
    raw: &Value,
    companies: &KnownCompanyPolicy,
) -> AnswerVerdict {
    let feedback = raw
        .get("feedback")
        .and_then(|f| f.as_str())
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(String::from);

    let claimed_valid = raw.get("valid").and_then(|v| v.as_bool()).unwrap_or(false);
    if !claimed_valid {
        return AnswerVerdict::Invalid { feedback };
    }

    let value = raw.get("value").unwrap_or(&Value::Null);

    let coerced = match kind {
        QuestionKind::Name => non_empty_text(value).map(AnswerValue::Text),
        QuestionKind::YesNo => yes_no_literal(value).map(AnswerValue::Text),
        QuestionKind::Scale1To10 => scale_value(value).map(AnswerValue::Integer),
        QuestionKind::TopicText => non_empty_text(value).map(AnswerValue::Text),
        QuestionKind::TopicEntity => entity_value(value, companies).map(AnswerValue::Entity),
    };

    match coerced {
        Some(value) => AnswerVerdict::Valid(value),
        None => AnswerVerdict::Invalid { feedback },
    }
}

/// Parses raw classification output into a [`ComplianceVerdict`].
///
/// Expected raw shape: `{"violation": bool, "phrases": [string, ...]}`.
/// Missing or malformed fields degrade to the clean verdict.
pub fn parse_compliance_verdict(raw: &Value) -> ComplianceVerdict {
    let violation = raw
        .get("violation")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let phrases = raw
        .get("phrases")
        .and_then(|p| p.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ComplianceVerdict { violation, phrases }
}

fn non_empty_text(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn yes_no_literal(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim().to_lowercase();
    match text.as_str() {
        "yes" | "no" => Some(text),
        _ => None,
    }
}

fn scale_value(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        // Models occasionally quote the number.
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (1..=10).contains(&n).then_some(n)
}

fn entity_value(value: &Value, companies: &KnownCompanyPolicy) -> Option<CompanyEntity> {
    let name = match value {
        Value::Object(map) => map.get("name").and_then(non_empty_text)?,
        Value::String(_) => non_empty_text(value)?,
        _ => return None,
    };
    let is_known = companies.is_known(&name);
    Some(CompanyEntity { name, is_known })
}
