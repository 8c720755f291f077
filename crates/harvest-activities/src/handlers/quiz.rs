//! Standard quiz. Two page variants: the 8-option board marks correct
//! tiles with an `iscorrectoption` attribute; the 2–4-option board names
//! the correct answer in the quiz state and the matching option carries
//! it in `data-option`.

use std::time::Duration;
use tracing::debug;

use harvest_browser::{smart_wait_for, Page};
use harvest_types::ActivityKind;

use crate::error::{ActivityError, Result};
use crate::handlers::quiz_state::{self, option_selector, QuizState};
use crate::{ActivityCtx, ActivityOutcome};

const START_BUTTON: &str = "#rqStartQuiz";

pub async fn run(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<ActivityOutcome> {
    if page.is_visible(START_BUTTON).await? {
        page.click(START_BUTTON).await?;
        tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
    }

    let mut state = quiz_state::read(page).await?;
    let total = state.max_questions;
    debug!(total, options = state.number_of_options, "quiz starting");

    while state.current_question_number <= total {
        let before = state.current_question_number;
        if state.number_of_options == 8 {
            answer_eight_option(ctx, page).await?;
        } else {
            answer_listed_option(ctx, page, &state).await?;
        }

        let refreshed = wait_for_refresh(page, before).await?;
        if !refreshed {
            return Err(ActivityError::RefreshFailed(format!(
                "stuck on question {before} of {total}"
            )));
        }
        state = match quiz_state::read(page).await {
            Ok(state) => state,
            // State object gone: the quiz rendered its results panel.
            Err(ActivityError::MissingQuizData) => break,
            Err(err) => return Err(err),
        };
        if state.current_question_number == before {
            break;
        }
    }

    Ok(ActivityOutcome::done(ActivityKind::Quiz))
}

/// 8-option board: pre-scan every tile for the marker, then click each
/// correct one in order.
async fn answer_eight_option(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<()> {
    let mut correct: Vec<String> = Vec::new();
    for index in 0..8 {
        let selector = option_selector(index);
        if let Some(value) = page.attribute(&selector, "iscorrectoption").await? {
            if value.eq_ignore_ascii_case("true") {
                correct.push(selector);
            }
        }
    }
    debug!(count = correct.len(), "correct tiles identified");
    for selector in correct {
        if page.is_visible(&selector).await? {
            page.click(&selector).await?;
            tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
        }
    }
    Ok(())
}

/// 2–4-option board: find the option whose `data-option` matches the
/// correct answer named by the page state.
async fn answer_listed_option(
    ctx: &ActivityCtx<'_>,
    page: &dyn Page,
    state: &QuizState,
) -> Result<()> {
    let Some(correct) = state.correct_answer.as_deref() else {
        return Err(ActivityError::MissingQuizData);
    };
    let options = state.number_of_options.clamp(2, 4);
    for index in 0..options {
        let selector = option_selector(index);
        if let Some(value) = page.attribute(&selector, "data-option").await? {
            if value == correct {
                page.click(&selector).await?;
                tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
                return Ok(());
            }
        }
    }
    Err(ActivityError::RefreshFailed("no option matches the correct answer".into()))
}

async fn wait_for_refresh(page: &dyn Page, before: u32) -> Result<bool> {
    smart_wait_for(
        || async {
            match quiz_state::read(page).await {
                Ok(state) => Ok(state.current_question_number != before),
                Err(ActivityError::MissingQuizData) => Ok(true),
                Err(ActivityError::Browser(e)) => Err(e),
                Err(_) => Ok(false),
            }
        },
        Duration::from_millis(800),
        Duration::from_secs(3),
    )
    .await
    .map_err(ActivityError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::quiz_state::QUIZ_STATE_SCRIPT;
    use crate::test_support::{delay, session_with_tabs};
    use harvest_browser::scripted::PageStateBuilder;
    use harvest_rand::SecureRng;
    use harvest_types::Activity;
    use serde_json::json;

    #[tokio::test]
    async fn four_option_quiz_clicks_the_marked_answer() {
        let url = "https://rewards.bing.com/quiz/q";
        let tab = vec![
            PageStateBuilder::new(url)
                .visible("#rqAnswerOption0")
                .visible("#rqAnswerOption1")
                .visible("#rqAnswerOption2")
                .visible("#rqAnswerOption3")
                .attr("#rqAnswerOption0", "data-option", "Pacific")
                .attr("#rqAnswerOption1", "data-option", "Atlantic")
                .attr("#rqAnswerOption2", "data-option", "Arctic")
                .attr("#rqAnswerOption3", "data-option", "Indian")
                .eval(
                    QUIZ_STATE_SCRIPT,
                    json!({"maxQuestions": 1, "currentQuestionNumber": 1,
                           "numberOfOptions": 4, "correctAnswer": "Atlantic"}),
                )
                .on("click:#rqAnswerOption1", 1)
                .build(),
            PageStateBuilder::new(url)
                .eval(QUIZ_STATE_SCRIPT, serde_json::Value::Null)
                .build(),
        ];
        let (driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "quiz".into(),
            point_progress_max: 30,
            destination_url: url.into(),
            ..Default::default()
        };
        let outcome = crate::run_activity(&ctx, &activity).await.unwrap();
        assert!(outcome.completed);

        let actions = driver.last_context().unwrap().pages()[1].actions();
        assert!(actions.contains(&"click:#rqAnswerOption1".to_string()));
        assert!(!actions.contains(&"click:#rqAnswerOption0".to_string()));
    }

    #[tokio::test]
    async fn eight_option_quiz_clicks_every_marked_tile() {
        let url = "https://rewards.bing.com/quiz/q8";
        let mut first = PageStateBuilder::new(url).eval(
            QUIZ_STATE_SCRIPT,
            json!({"maxQuestions": 1, "currentQuestionNumber": 1,
                   "numberOfOptions": 8, "correctAnswer": null}),
        );
        for i in 0..8 {
            first = first.visible(format!("#rqAnswerOption{i}"));
        }
        let tab = vec![
            first
                .attr("#rqAnswerOption2", "iscorrectoption", "True")
                .attr("#rqAnswerOption5", "iscorrectoption", "True")
                .attr("#rqAnswerOption0", "iscorrectoption", "False")
                .on("click:#rqAnswerOption5", 1)
                .build(),
            PageStateBuilder::new(url)
                .eval(QUIZ_STATE_SCRIPT, serde_json::Value::Null)
                .build(),
        ];
        let (driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "quiz".into(),
            point_progress_max: 30,
            destination_url: url.into(),
            ..Default::default()
        };
        let outcome = crate::run_activity(&ctx, &activity).await.unwrap();
        assert!(outcome.completed);

        let actions = driver.last_context().unwrap().pages()[1].actions();
        assert!(actions.contains(&"click:#rqAnswerOption2".to_string()));
        assert!(actions.contains(&"click:#rqAnswerOption5".to_string()));
        assert!(!actions.contains(&"click:#rqAnswerOption0".to_string()));
    }

    #[tokio::test]
    async fn stuck_quiz_is_a_refresh_failure() {
        let url = "https://rewards.bing.com/quiz/q";
        let tab = vec![PageStateBuilder::new(url)
            .visible("#rqAnswerOption0")
            .visible("#rqAnswerOption1")
            .attr("#rqAnswerOption0", "data-option", "A")
            .attr("#rqAnswerOption1", "data-option", "B")
            .eval(
                QUIZ_STATE_SCRIPT,
                json!({"maxQuestions": 2, "currentQuestionNumber": 1,
                       "numberOfOptions": 2, "correctAnswer": "A"}),
            )
            .build()];
        let (_driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "quiz".into(),
            point_progress_max: 30,
            destination_url: url.into(),
            ..Default::default()
        };
        let err = crate::run_activity(&ctx, &activity).await.unwrap_err();
        assert!(matches!(err, ActivityError::RefreshFailed(_)));
    }
}
