use serde::{Deserialize, Serialize};
use validator::Validate;

/// Option labels in presentation order. A question carries between two and
/// four options; labels are assigned by position.
pub const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];

pub fn option_index(label: &str) -> Option<usize> {
    OPTION_LABELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(label))
}

/// One prompt within a quiz. Immutable once the session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub image: Option<String>,
    pub options: Vec<String>,
    pub correct_option: String,
    pub time_limit_seconds: u32,
}

impl Question {
    pub fn correct_index(&self) -> Option<usize> {
        option_index(&self.correct_option)
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }
}

/// Wire payload pushed to clients when a question opens. Field names match
/// the web client; the correct option is never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    pub id: String,
    pub question_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub option_a: String,
    pub option_b: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_c: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_d: Option<String>,
    pub time_limit: u32,
}

impl From<&Question> for QuestionPayload {
    fn from(q: &Question) -> Self {
        QuestionPayload {
            id: q.id.clone(),
            question_text: q.text.clone(),
            image: q.image.clone(),
            option_a: q.options.first().cloned().unwrap_or_default(),
            option_b: q.options.get(1).cloned().unwrap_or_default(),
            option_c: q.options.get(2).cloned(),
            option_d: q.options.get(3).cloned(),
            time_limit: q.time_limit_seconds,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100), nested)]
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    pub id: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    pub image: Option<String>,
    #[validate(length(min = 2, max = 4))]
    pub options: Vec<String>,
    pub correct_option: String,
    #[validate(range(min = 5, max = 600))]
    pub time_limit_seconds: u32,
}
