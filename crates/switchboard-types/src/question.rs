//! The static questionnaire model.

use serde::{Deserialize, Serialize};

/// How a question's raw answer is validated and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// A person name must be extractable; normalized to that name.
    Name,
    /// Intent must be unambiguously yes or no; normalized to the literal
    /// `"yes"` or `"no"`.
    YesNo,
    /// An integer in [1, 10] must be unambiguously implied.
    #[serde(rename = "scale_1_10")]
    Scale1To10,
    /// Free text that must be topically related to the question.
    TopicText,
    /// A company entity must be extractable; normalized to
    /// `{name, isKnown}`.
    TopicEntity,
}

/// One questionnaire question. The question list is fixed and ordered for
/// the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier used as the key in the persisted answer map.
    pub id: String,
    /// The text spoken to the caller.
    pub prompt: String,
    pub kind: QuestionKind,
}

impl Question {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            kind,
        }
    }

    /// The built-in intake questionnaire, used when the config file does not
    /// supply its own question list.
    pub fn default_intake() -> Vec<Question> {
        vec![
            Question::new("name", "To get started, could you tell me your name?", QuestionKind::Name),
            Question::new(
                "consent",
                "Do you agree to this call being recorded for quality purposes? Please answer yes or no.",
                QuestionKind::YesNo,
            ),
            Question::new(
                "satisfaction",
                "On a scale of one to ten, how satisfied are you with our service?",
                QuestionKind::Scale1To10,
            ),
            Question::new(
                "feedback",
                "What could we improve about your experience?",
                QuestionKind::TopicText,
            ),
            Question::new(
                "company",
                "Which company are you calling on behalf of?",
                QuestionKind::TopicEntity,
            ),
        ]
    }
}

/// Equality policy for matching an extracted company name against the
/// allow-list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Exact string equality.
    #[default]
    Exact,
    /// Unicode-lowercased equality.
    CaseInsensitive,
}

/// The allow-list of companies considered "known", with its match policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownCompanyPolicy {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

impl KnownCompanyPolicy {
    /// Whether `name` matches the allow-list under the configured policy.
    pub fn is_known(&self, name: &str) -> bool {
        match self.match_policy {
            MatchPolicy::Exact => self.names.iter().any(|n| n == name),
            MatchPolicy::CaseInsensitive => {
                let lowered = name.to_lowercase();
                self.names.iter().any(|n| n.to_lowercase() == lowered)
            }
        }
    }
}
