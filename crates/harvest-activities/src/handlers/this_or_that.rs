//! This-or-that: binary choices for a fixed number of rounds. Progress is
//! detected by the question number changing in the page's own state.

use std::time::Duration;
use tracing::debug;

use harvest_browser::{smart_wait_for, Page};
use harvest_types::ActivityKind;

use crate::error::{ActivityError, Result};
use crate::handlers::quiz_state::{self, option_selector};
use crate::{ActivityCtx, ActivityOutcome};

const START_BUTTON: &str = "#rqStartQuiz";

pub async fn run(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<ActivityOutcome> {
    if page.is_visible(START_BUTTON).await? {
        page.click(START_BUTTON).await?;
        tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
    }

    let state = quiz_state::read(page).await?;
    let rounds = state.max_questions.saturating_sub(state.current_question_number) + 1;
    debug!(rounds, "this-or-that starting");

    let mut current = state.current_question_number;
    for _ in 0..rounds {
        let choice = option_selector(if ctx.rng.chance(0.5) { 0 } else { 1 });
        if !page.is_visible(&choice).await? {
            break;
        }
        page.click(&choice).await?;
        tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;

        // The quiz page refreshes in place; done when the number moves or
        // the state object goes away at the end.
        let refreshed = smart_wait_for(
            || async {
                match quiz_state::read(page).await {
                    Ok(next) => Ok(next.current_question_number != current),
                    Err(ActivityError::MissingQuizData) => Ok(true),
                    Err(ActivityError::Browser(e)) => Err(e),
                    Err(_) => Ok(false),
                }
            },
            Duration::from_millis(800),
            Duration::from_secs(3),
        )
        .await?;
        if !refreshed {
            return Err(ActivityError::RefreshFailed("question number never advanced".into()));
        }
        match quiz_state::read(page).await {
            Ok(next) => current = next.current_question_number,
            Err(ActivityError::MissingQuizData) => break,
            Err(err) => return Err(err),
        }
    }

    Ok(ActivityOutcome::done(ActivityKind::ThisOrThat))
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

    fn state_json(current: u32) -> serde_json::Value {
        json!({
            "maxQuestions": 2,
            "currentQuestionNumber": current,
            "numberOfOptions": 2,
            "correctAnswer": null
        })
    }

    #[tokio::test]
    async fn plays_every_round() {
        let url = "https://rewards.bing.com/quiz/tot";
        // Each answer advances the question number in the page state.
        let tab = vec![
            PageStateBuilder::new(url)
                .visible("#rqAnswerOption0")
                .visible("#rqAnswerOption1")
                .eval(QUIZ_STATE_SCRIPT, state_json(1))
                .on("click:#rqAnswerOption0", 1)
                .on("click:#rqAnswerOption1", 1)
                .build(),
            PageStateBuilder::new(url)
                .visible("#rqAnswerOption0")
                .visible("#rqAnswerOption1")
                .eval(QUIZ_STATE_SCRIPT, state_json(2))
                .on("click:#rqAnswerOption0", 2)
                .on("click:#rqAnswerOption1", 2)
                .build(),
            PageStateBuilder::new(url)
                .eval(QUIZ_STATE_SCRIPT, serde_json::Value::Null)
                .build(),
        ];
        let (_driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "quiz".into(),
            point_progress_max: 50,
            destination_url: url.into(),
            ..Default::default()
        };
        let outcome = crate::run_activity(&ctx, &activity).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.kind, ActivityKind::ThisOrThat);
    }

    #[tokio::test]
    async fn missing_state_is_an_error() {
        let url = "https://rewards.bing.com/quiz/tot";
        let tab = vec![PageStateBuilder::new(url)
            .eval(QUIZ_STATE_SCRIPT, serde_json::Value::Null)
            .build()];
        let (_driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "quiz".into(),
            point_progress_max: 50,
            destination_url: url.into(),
            ..Default::default()
        };
        let err = crate::run_activity(&ctx, &activity).await.unwrap_err();
        assert!(matches!(err, ActivityError::MissingQuizData));
    }
}
