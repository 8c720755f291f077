//! Quiz state as exposed by the quiz page's own render info object.

use serde::Deserialize;

use harvest_browser::Page;

use crate::error::{ActivityError, Result};

/// Script evaluated in the quiz page; returns null when the info object
/// has not been attached yet.
pub const QUIZ_STATE_SCRIPT: &str = r#"(() => {
  const info = window._w && window._w.rewardsQuizRenderInfo;
  if (!info) { return null; }
  return {
    maxQuestions: info.maxQuestions,
    currentQuestionNumber: info.currentQuestionNumber,
    numberOfOptions: info.numberOfOptions,
    correctAnswer: info.correctAnswer === undefined ? null : String(info.correctAnswer)
  };
})()"#;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QuizState {
    #[serde(rename = "maxQuestions")]
    pub max_questions: u32,
    #[serde(rename = "currentQuestionNumber")]
    pub current_question_number: u32,
    #[serde(rename = "numberOfOptions", default)]
    pub number_of_options: u32,
    #[serde(rename = "correctAnswer", default)]
    pub correct_answer: Option<String>,
}

pub async fn read(page: &dyn Page) -> Result<QuizState> {
    let value = page.evaluate(QUIZ_STATE_SCRIPT).await?;
    if value.is_null() {
        return Err(ActivityError::MissingQuizData);
    }
    serde_json::from_value(value).map_err(|_| ActivityError::MissingQuizData)
}

pub fn option_selector(index: u32) -> String {
    format!("#rqAnswerOption{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialises_render_info() {
        let value = serde_json::json!({
            "maxQuestions": 3,
            "currentQuestionNumber": 1,
            "numberOfOptions": 4,
            "correctAnswer": "Mount Everest"
        });
        let state: QuizState = serde_json::from_value(value).unwrap();
        assert_eq!(state.max_questions, 3);
        assert_eq!(state.correct_answer.as_deref(), Some("Mount Everest"));
    }

    #[test]
    fn tolerates_missing_answer() {
        let value = serde_json::json!({"maxQuestions": 10, "currentQuestionNumber": 4});
        let state: QuizState = serde_json::from_value(value).unwrap();
        assert_eq!(state.number_of_options, 0);
        assert!(state.correct_answer.is_none());
    }
}
